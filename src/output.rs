use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    CatalogResult, FetchResult, IdsResult, KeysResult, MetadataResult, ProgressEvent,
    ProgressSink, ReleasesResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable output; progress goes to stderr so stdout stays pipeable.
pub struct TextOutput;

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.2?})", event.message, elapsed),
            None => eprintln!("{}", event.message),
        }
    }
}

impl TextOutput {
    pub fn print_catalog(result: &CatalogResult) {
        println!(
            "Elapsed time: {:.2} seconds",
            result.elapsed_ms as f64 / 1000.0
        );
        println!("Discovered {} releases", result.releases);
        println!("Catalog written to {}", result.catalog_path);
    }

    pub fn print_releases(result: &ReleasesResult) {
        for entry in &result.releases {
            let upgrades = if entry.record.upgrade_ids.is_empty() {
                "-".to_string()
            } else {
                entry
                    .record
                    .upgrade_ids
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            println!("{:<28} upgrades: {upgrades}", entry.key);
        }
        println!("{} releases in {}", result.releases.len(), result.catalog_path);
    }

    pub fn print_ids(result: &IdsResult) {
        for id in &result.buildings {
            println!(
                "{:07} {}_{}_{}_{} upgrade={}",
                id.bldg_id,
                id.res_com.short(),
                id.release_year,
                id.weather,
                id.release_number,
                id.upgrade_id
            );
        }
    }

    pub fn print_fetch(result: &FetchResult) {
        for item in &result.items {
            println!("{:07} ({}) -> {}", item.bldg_id, item.action, item.path);
            if let Some(path) = &item.extracted_path {
                println!("         extracted: {path}");
            }
        }
        println!("Downloaded files: {}", result.items.len());
    }

    pub fn print_metadata(result: &MetadataResult) {
        for item in &result.items {
            let label = item
                .upgrade_id
                .map(|upgrade| format!("upgrade {upgrade}"))
                .unwrap_or_else(|| "all".to_string());
            println!("{} {label} ({}) -> {}", result.release, item.action, item.path);
            if let Some(projection) = &item.projection {
                println!(
                    "         {} rows, columns: {}",
                    projection.rows,
                    projection.columns.join(", ")
                );
                if !projection.missing_columns.is_empty() {
                    println!("         missing: {}", projection.missing_columns.join(", "));
                }
            }
        }
    }

    pub fn print_keys(result: &KeysResult) {
        println!("First {} building energy model keys:", result.sample.len());
        for key in &result.sample {
            println!("{key}");
        }
        println!("{} keys written to {}", result.count, result.output_path);
    }
}

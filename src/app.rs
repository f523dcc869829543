use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::buildings::{BuildingId, ModelArtifact, fetch_bldg_ids};
use crate::catalog::{Catalog, build_catalog};
use crate::config::DatasetLocation;
use crate::domain::{CatalogKey, ReleaseRecord, StateCode};
use crate::download::DownloadClient;
use crate::error::FetchError;
use crate::fs_util;
use crate::listing::{ListingClient, list_keys};
use crate::locator::MODEL_DIR_MARKER;
use crate::metadata::{COLUMNS_TO_KEEP, TableProjection, metadata_files, project_table};
use crate::store::{Store, persist_file, utf8_path, write_bytes_atomic};

pub const DEFAULT_KEY_SAMPLE_PAGES: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub force: bool,
    pub extract: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResult {
    pub catalog_path: String,
    pub releases: usize,
    pub keys: Vec<String>,
    pub elapsed_ms: u128,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleasesResult {
    pub catalog_path: String,
    pub releases: Vec<ReleaseEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseEntry {
    pub key: String,
    #[serde(flatten)]
    pub record: ReleaseRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdsResult {
    pub state: String,
    pub buildings: Vec<BuildingId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub bldg_id: u32,
    pub upgrade_id: u32,
    pub url: String,
    pub path: String,
    pub action: String,
    pub bytes: Option<u64>,
    pub extracted_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataResult {
    pub release: String,
    pub items: Vec<MetadataItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataItemResult {
    pub upgrade_id: Option<u32>,
    pub url: String,
    pub path: String,
    pub action: String,
    pub bytes: Option<u64>,
    pub projection: Option<TableProjection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeysResult {
    pub output_path: String,
    pub count: usize,
    pub sample: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn notify(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

#[derive(Clone)]
pub struct App<L: ListingClient, D: DownloadClient> {
    store: Store,
    location: DatasetLocation,
    listing: L,
    downloader: D,
}

impl<L: ListingClient, D: DownloadClient> App<L, D> {
    pub fn new(store: Store, location: DatasetLocation, listing: L, downloader: D) -> Self {
        Self {
            store,
            location,
            listing,
            downloader,
        }
    }

    /// Full re-crawl; the catalog file is rewritten only if the crawl succeeds.
    pub fn build_catalog(&self, sink: &dyn ProgressSink) -> Result<CatalogResult, FetchError> {
        notify(
            sink,
            format!(
                "phase=Crawl; listing {}/{}",
                self.location.bucket, self.location.root_prefix
            ),
        );
        let start = Instant::now();
        let catalog = build_catalog(
            &self.listing,
            &self.location.bucket,
            &self.location.root_prefix,
            self.store.catalog_path(),
        )?;
        let elapsed = start.elapsed();
        sink.event(ProgressEvent {
            message: format!("phase=Store; wrote {} releases", catalog.len()),
            elapsed: Some(elapsed),
        });

        Ok(CatalogResult {
            catalog_path: self.store.catalog_path().to_string(),
            releases: catalog.len(),
            keys: catalog.keys().map(str::to_string).collect(),
            elapsed_ms: elapsed.as_millis(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn load_catalog(&self) -> Result<Catalog, FetchError> {
        Catalog::load(self.store.catalog_path())
    }

    pub fn releases(&self, sink: &dyn ProgressSink) -> Result<ReleasesResult, FetchError> {
        notify(sink, format!("phase=Resolve; reading {}", self.store.catalog_path()));
        let catalog = self.load_catalog()?;
        Ok(ReleasesResult {
            catalog_path: self.store.catalog_path().to_string(),
            releases: catalog
                .iter()
                .map(|(key, record)| ReleaseEntry {
                    key: key.to_string(),
                    record: record.clone(),
                })
                .collect(),
        })
    }

    pub fn building_ids(
        &self,
        state: &StateCode,
        release: Option<&CatalogKey>,
        upgrade_id: Option<u32>,
    ) -> Result<IdsResult, FetchError> {
        let mut buildings = fetch_bldg_ids(state)?;
        match release {
            Some(key) => {
                let catalog = self.load_catalog()?;
                let record = catalog.lookup(key)?;
                buildings = buildings
                    .into_iter()
                    .map(|id| BuildingId::for_release(record, id.bldg_id, upgrade_id.unwrap_or(0)))
                    .collect::<Result<Vec<_>, FetchError>>()?;
            }
            None => {
                if let Some(upgrade_id) = upgrade_id {
                    for id in &mut buildings {
                        id.upgrade_id = upgrade_id;
                    }
                }
            }
        }
        Ok(IdsResult {
            state: state.to_string(),
            buildings,
        })
    }

    pub fn fetch_buildings(
        &self,
        ids: &[BuildingId],
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, FetchError> {
        if !options.dry_run {
            self.store.ensure_data_dir()?;
        }
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.fetch_building(id, options, sink)?);
        }
        Ok(FetchResult { items })
    }

    fn fetch_building(
        &self,
        id: &BuildingId,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, FetchError> {
        let url = id.download_url(&self.location);
        let path = self.store.building_path(id);
        let mut item = FetchItemResult {
            bldg_id: id.bldg_id,
            upgrade_id: id.upgrade_id,
            url: url.clone(),
            path: path.to_string(),
            action: "download".to_string(),
            bytes: None,
            extracted_path: None,
        };

        if options.dry_run {
            item.action = "planned".to_string();
            return Ok(item);
        }
        if !options.force && path.as_std_path().exists() {
            notify(sink, format!("phase=Store; {} already present", path));
            item.action = "exists".to_string();
        } else {
            notify(sink, format!("phase=Fetch; {url}"));
            let bytes = self.download_to(&url, &path, id.artifact() == ModelArtifact::Zip)?;
            tracing::info!(bldg_id = id.bldg_id, upgrade_id = id.upgrade_id, bytes, "downloaded building model");
            item.bytes = Some(bytes);
        }

        if options.extract {
            let target = self.store.building_extract_path(id);
            notify(sink, format!("phase=Verify; extracting to {target}"));
            match id.artifact() {
                ModelArtifact::Zip => {
                    fs_util::extract_zip(path.as_std_path(), target.as_std_path())?;
                }
                ModelArtifact::OsmGz => {
                    fs_util::gunzip_file(path.as_std_path(), target.as_std_path())?;
                }
            }
            item.extracted_path = Some(target.to_string());
        }
        Ok(item)
    }

    pub fn fetch_metadata(
        &self,
        key: &CatalogKey,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<MetadataResult, FetchError> {
        let catalog = self.load_catalog()?;
        let record = catalog.lookup(key)?;
        let release = key.to_string();
        if !options.dry_run {
            self.store.ensure_data_dir()?;
        }

        let mut items = Vec::new();
        for file in metadata_files(record) {
            let url = self.location.object_url(&file.relative_key);
            let path = self.store.metadata_path(&release, file.upgrade_id);
            let mut item = MetadataItemResult {
                upgrade_id: file.upgrade_id,
                url: url.clone(),
                path: path.to_string(),
                action: "download".to_string(),
                bytes: None,
                projection: None,
            };
            if options.dry_run {
                item.action = "planned".to_string();
            } else if !options.force && path.as_std_path().exists() {
                item.action = "exists".to_string();
            } else {
                notify(sink, format!("phase=Fetch; {url}"));
                let (bytes, projection) = self.download_table(&url, &path)?;
                tracing::info!(
                    release = %release,
                    rows = projection.rows,
                    columns = projection.columns.len(),
                    "stored metadata table"
                );
                item.bytes = Some(bytes);
                item.projection = Some(projection);
            }
            items.push(item);
        }
        Ok(MetadataResult { release, items })
    }

    pub fn sample_model_keys(
        &self,
        max_pages: usize,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<KeysResult, FetchError> {
        let root = self.location.root_prefix.trim_matches('/');
        notify(sink, format!("phase=Crawl; sampling {max_pages} pages under {root}"));
        let keys: Vec<String> = list_keys(&self.listing, &self.location.bucket, root, Some(max_pages))?
            .into_iter()
            .filter(|key| key.contains(MODEL_DIR_MARKER))
            .filter_map(|key| {
                let relative = key.strip_prefix(root).unwrap_or(&key).trim_start_matches('/');
                (!relative.is_empty()).then(|| relative.to_string())
            })
            .collect();

        let mut json = serde_json::to_string_pretty(&keys)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        json.push('\n');
        write_bytes_atomic(output, json.as_bytes())?;

        Ok(KeysResult {
            output_path: output.to_string(),
            count: keys.len(),
            sample: keys.iter().take(5).cloned().collect(),
        })
    }

    fn download_to(&self, url: &str, path: &Utf8Path, is_zip: bool) -> Result<u64, FetchError> {
        let temp = Store::temp_file_for(path)?;
        let temp_path = utf8_path(temp.path())?;
        let bytes = self.downloader.download(url, temp_path.as_std_path())?;
        if is_zip {
            fs_util::validate_zip(temp_path.as_std_path())?;
        }
        persist_file(temp, path)?;
        Ok(bytes)
    }

    fn download_table(
        &self,
        url: &str,
        path: &Utf8Path,
    ) -> Result<(u64, TableProjection), FetchError> {
        let raw = Store::temp_file_for(path)?;
        let bytes = self.downloader.download(url, raw.path())?;
        let reduced = Store::temp_file_for(path)?;
        let projection = project_table(raw.path(), reduced.path(), COLUMNS_TO_KEEP)?;
        persist_file(reduced, path)?;
        Ok((bytes, projection))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::listing::MemoryListing;
    use crate::metadata::fixtures::write_metadata_table;
    use crate::output::JsonOutput;

    #[derive(Default)]
    struct RecordingDownloader {
        urls: Mutex<Vec<String>>,
    }

    impl DownloadClient for RecordingDownloader {
        fn download(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
            self.urls.lock().unwrap().push(url.to_string());
            write_metadata_table(destination, &[(7, "MA", 10.0, Some("G2500170"))]);
            Ok(std::fs::metadata(destination).unwrap().len())
        }
    }

    fn app(dir: &Path, keys: &[&str]) -> App<MemoryListing, RecordingDownloader> {
        let root = Utf8PathBuf::from_path_buf(dir.to_path_buf()).unwrap();
        let store = Store::new(root.join("data"), root.join("releases.json"));
        let location = DatasetLocation {
            base_url: "http://mirror".to_string(),
            bucket: "b".to_string(),
            root_prefix: "root".to_string(),
        };
        App::new(
            store,
            location,
            MemoryListing::new(keys.iter().copied()),
            RecordingDownloader::default(),
        )
    }

    #[test]
    fn metadata_fetch_skips_existing_files() {
        let temp = tempfile::tempdir().unwrap();
        let app = app(
            temp.path(),
            &[
                "root/2022/resstock_tmy3_release_1/building_energy_models/upgrade=0/",
                "root/2022/resstock_tmy3_release_1/building_energy_models/upgrade=2/",
            ],
        );
        app.build_catalog(&JsonOutput).unwrap();
        let key: CatalogKey = "res_2022_tmy3_1".parse().unwrap();

        let first = app.fetch_metadata(&key, &FetchOptions::default(), &JsonOutput).unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.items.iter().all(|item| item.action == "download"));
        assert_eq!(
            first.items[1].url,
            "http://mirror/b/root/2022/resstock_tmy3_release_1/metadata/upgrade02.parquet"
        );
        let projection = first.items[0].projection.as_ref().unwrap();
        assert_eq!(projection.columns, vec!["bldg_id", "in.state", "in.county"]);
        assert_eq!(projection.rows, 1);
        assert!(temp.path().join("data/res_2022_tmy3_1_upgrade02.parquet").exists());

        let second = app.fetch_metadata(&key, &FetchOptions::default(), &JsonOutput).unwrap();
        assert!(second.items.iter().all(|item| item.action == "exists"));
        assert_eq!(app.downloader.urls.lock().unwrap().len(), 2);
    }

    #[test]
    fn sample_keys_filters_and_strips_root() {
        let temp = tempfile::tempdir().unwrap();
        let app = app(
            temp.path(),
            &[
                "root/2021/resstock_tmy3_release_1/building_energy_models/bldg0000001-up00.osm.gz",
                "root/2021/resstock_tmy3_release_1/metadata/metadata.parquet",
            ],
        );
        let output = Utf8PathBuf::from_path_buf(temp.path().join("urls.json")).unwrap();
        let result = app.sample_model_keys(5, &output, &JsonOutput).unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(
            result.sample,
            vec!["2021/resstock_tmy3_release_1/building_energy_models/bldg0000001-up00.osm.gz"]
        );
        let written = std::fs::read_to_string(output.as_std_path()).unwrap();
        assert!(written.ends_with("]\n"));
    }
}

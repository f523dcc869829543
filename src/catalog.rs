use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{BuildingType, CatalogKey, ReleaseIdentity, ReleaseRecord};
use crate::error::FetchError;
use crate::listing::{ListingClient, directory_prefix, list_directories};
use crate::locator::{DirectoryLocator, directory_name};
use crate::store::write_bytes_atomic;

pub const RELEASE_DIR_PATTERN: &str = r"^(?P<year>\d{4})/(?P<variant>res|com)stock_(?P<weather>\w+)_release_(?P<release>\d+(?:\.\d+)?)(?:/|$)";
pub const UPGRADE_DIR_PATTERN: &str = r"^upgrade=(?P<id>\d+)$";

static RELEASE_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RELEASE_DIR_PATTERN).expect("valid release pattern"));
static UPGRADE_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(UPGRADE_DIR_PATTERN).expect("valid upgrade pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseMatch {
    Matched(ReleaseIdentity),
    Skipped,
}

pub fn parse_release_dir(relative: &str) -> ReleaseMatch {
    let Some(caps) = RELEASE_DIR_RE.captures(relative) else {
        return ReleaseMatch::Skipped;
    };
    let Some(variant) = BuildingType::from_short(&caps["variant"]) else {
        return ReleaseMatch::Skipped;
    };
    ReleaseMatch::Matched(ReleaseIdentity {
        release_year: caps["year"].to_string(),
        variant,
        weather_dataset: caps["weather"].to_string(),
        release_number: caps["release"].to_string(),
    })
}

/// `upgrade=<digits>` → id; anything else, including ids that overflow, is ignored.
pub fn parse_upgrade_dir(name: &str) -> Option<u32> {
    UPGRADE_DIR_RE
        .captures(name)
        .and_then(|caps| caps["id"].parse().ok())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<(String, ReleaseRecord)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ReleaseRecord> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, record)| record)
    }

    pub fn lookup(&self, key: &CatalogKey) -> Result<&ReleaseRecord, FetchError> {
        let key = key.to_string();
        self.get(&key).ok_or(FetchError::ReleaseNotFound(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReleaseRecord)> {
        self.entries
            .iter()
            .map(|(key, record)| (key.as_str(), record))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn insert(&mut self, record: ReleaseRecord) -> bool {
        let key = record.catalog_key().to_string();
        if self.get(&key).is_some() {
            return false;
        }
        self.entries.push((key, record));
        true
    }

    /// Pretty JSON, non-ASCII kept as-is, one trailing newline.
    pub fn to_json_string(&self) -> Result<String, FetchError> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|err| FetchError::CatalogParse(err.to_string()))?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json_str(content: &str) -> Result<Self, FetchError> {
        serde_json::from_str(content).map_err(|err| FetchError::CatalogParse(err.to_string()))
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), FetchError> {
        let json = self.to_json_string()?;
        write_bytes_atomic(path, json.as_bytes())
    }

    pub fn load(path: &Utf8Path) -> Result<Self, FetchError> {
        if !path.as_std_path().exists() {
            return Err(FetchError::MissingCatalog(path.as_std_path().to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("read {path}: {err}")))?;
        Self::from_json_str(&content)
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CatalogVisitor;

        impl<'de> Visitor<'de> for CatalogVisitor {
            type Value = Catalog;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of catalog keys to release records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Catalog, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, record)) = access.next_entry::<String, ReleaseRecord>()? {
                    entries.push((key, record));
                }
                Ok(Catalog { entries })
            }
        }

        deserializer.deserialize_map(CatalogVisitor)
    }
}

#[derive(Default)]
struct CrawlState {
    seen: HashSet<ReleaseIdentity>,
    catalog: Catalog,
}

pub struct CatalogBuilder<'a, L: ListingClient + ?Sized> {
    client: &'a L,
    bucket: &'a str,
    root_prefix: String,
}

impl<'a, L: ListingClient + ?Sized> CatalogBuilder<'a, L> {
    pub fn new(client: &'a L, bucket: &'a str, root_prefix: &str) -> Self {
        Self {
            client,
            bucket,
            root_prefix: directory_prefix(root_prefix),
        }
    }

    pub fn build(&self) -> Result<Catalog, FetchError> {
        let mut state = CrawlState::default();
        for year_dir in list_directories(self.client, self.bucket, &self.root_prefix)? {
            for release_dir in list_directories(self.client, self.bucket, &year_dir)? {
                self.visit_release_dir(&release_dir, &mut state)?;
            }
        }
        Ok(state.catalog)
    }

    fn visit_release_dir(&self, release_dir: &str, state: &mut CrawlState) -> Result<(), FetchError> {
        let relative = release_dir
            .strip_prefix(&self.root_prefix)
            .unwrap_or(release_dir)
            .trim_start_matches('/');
        let identity = match parse_release_dir(relative) {
            ReleaseMatch::Matched(identity) => identity,
            ReleaseMatch::Skipped => {
                tracing::debug!(relative, "skipping unrecognized release directory");
                return Ok(());
            }
        };
        if !state.seen.insert(identity.clone()) {
            tracing::debug!(relative, "skipping duplicate release");
            return Ok(());
        }

        let upgrade_ids = self.discover_upgrades(release_dir)?;
        let record = ReleaseRecord::new(identity, upgrade_ids);
        tracing::info!(
            key = %record.catalog_key(),
            upgrades = record.upgrade_ids.len(),
            "discovered release"
        );
        state.catalog.insert(record);
        Ok(())
    }

    fn discover_upgrades(&self, release_dir: &str) -> Result<Vec<u32>, FetchError> {
        let locator = DirectoryLocator::new(self.client, self.bucket);
        let Some(model_dir) = locator.locate(release_dir)? else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<u32> = list_directories(self.client, self.bucket, &model_dir.prefix)?
            .iter()
            .filter_map(|child| parse_upgrade_dir(directory_name(child)))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Crawls `root_prefix` in `bucket` and overwrites `output_path` with the
/// result. Nothing is written if the crawl fails.
pub fn build_catalog<L: ListingClient + ?Sized>(
    client: &L,
    bucket: &str,
    root_prefix: &str,
    output_path: &Utf8Path,
) -> Result<Catalog, FetchError> {
    let catalog = CatalogBuilder::new(client, bucket, root_prefix).build()?;
    catalog.write(output_path)?;
    Ok(catalog)
}

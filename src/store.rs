use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::buildings::BuildingId;
use crate::config::ResolvedConfig;
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct Store {
    data_dir: Utf8PathBuf,
    catalog_path: Utf8PathBuf,
}

impl Store {
    pub fn new(data_dir: Utf8PathBuf, catalog_path: Utf8PathBuf) -> Self {
        Self {
            data_dir,
            catalog_path,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.data_dir.clone(), config.catalog_path.clone())
    }

    pub fn catalog_path(&self) -> &Utf8Path {
        &self.catalog_path
    }

    pub fn with_catalog_path(mut self, catalog_path: Utf8PathBuf) -> Self {
        self.catalog_path = catalog_path;
        self
    }

    pub fn ensure_data_dir(&self) -> Result<(), FetchError> {
        fs::create_dir_all(self.data_dir.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))
    }

    /// `{data_dir}/{bldg_id:07}_upgrade{upgrade_id}.{zip|osm.gz}`
    pub fn building_path(&self, id: &BuildingId) -> Utf8PathBuf {
        self.data_dir
            .join(format!("{}.{}", id.file_stem(), id.artifact().extension()))
    }

    pub fn building_extract_path(&self, id: &BuildingId) -> Utf8PathBuf {
        match id.artifact() {
            crate::buildings::ModelArtifact::Zip => self.data_dir.join(id.file_stem()),
            crate::buildings::ModelArtifact::OsmGz => {
                self.data_dir.join(format!("{}.osm", id.file_stem()))
            }
        }
    }

    /// `{data_dir}/{key}_baseline.parquet` or `{data_dir}/{key}_upgrade{nn}.parquet`.
    pub fn metadata_path(&self, catalog_key: &str, upgrade_id: Option<u32>) -> Utf8PathBuf {
        let suffix = match upgrade_id {
            None | Some(0) => "baseline".to_string(),
            Some(upgrade) => format!("upgrade{upgrade:02}"),
        };
        self.data_dir
            .join(format!("{catalog_key}_{suffix}.parquet"))
    }

    pub fn temp_file_for(dest: &Utf8Path) -> Result<NamedTempFile, FetchError> {
        let parent = dest
            .parent()
            .ok_or_else(|| FetchError::Filesystem("invalid destination path".to_string()))?;
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        tempfile::Builder::new()
            .prefix("buildstock-fetch")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))
    }
}

pub fn persist_file(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), FetchError> {
    temp.persist(dest.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FetchError> {
    let temp = Store::temp_file_for(path)?;
    fs::write(temp.path(), content).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    persist_file(temp, path)
}

pub fn utf8_path(path: &Path) -> Result<Utf8PathBuf, FetchError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|_| FetchError::Filesystem(format!("non-utf8 path: {}", path.display())))
}

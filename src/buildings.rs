use serde::{Deserialize, Serialize};

use crate::config::DatasetLocation;
use crate::domain::{BuildingType, ReleaseRecord, StateCode};
use crate::error::FetchError;

/// Release year whose models sit directly in `building_energy_models/` as `.osm.gz`.
pub const FLAT_LAYOUT_YEAR: &str = "2021";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelArtifact {
    Zip,
    OsmGz,
}

impl ModelArtifact {
    pub fn extension(self) -> &'static str {
        match self {
            ModelArtifact::Zip => "zip",
            ModelArtifact::OsmGz => "osm.gz",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingId {
    pub bldg_id: u32,
    pub release_number: String,
    pub release_year: String,
    pub res_com: BuildingType,
    pub weather: String,
    pub upgrade_id: u32,
}

impl BuildingId {
    pub fn new(bldg_id: u32) -> Self {
        Self {
            bldg_id,
            release_number: "1".to_string(),
            release_year: "2022".to_string(),
            res_com: BuildingType::Resstock,
            weather: "tmy3".to_string(),
            upgrade_id: 0,
        }
    }

    /// Retargets `bldg_id` at a catalogued release. Upgrade 0 is the baseline
    /// and always allowed; other upgrades must be listed in the record.
    pub fn for_release(
        record: &ReleaseRecord,
        bldg_id: u32,
        upgrade_id: u32,
    ) -> Result<Self, FetchError> {
        if upgrade_id != 0 && !record.upgrade_ids.contains(&upgrade_id) {
            return Err(FetchError::UpgradeNotAvailable {
                release: record.catalog_key().to_string(),
                upgrade: upgrade_id,
            });
        }
        Ok(Self {
            bldg_id,
            release_number: record.release_number.clone(),
            release_year: record.release_year.clone(),
            res_com: record.variant,
            weather: record.weather_dataset.clone(),
            upgrade_id,
        })
    }

    pub fn artifact(&self) -> ModelArtifact {
        if self.release_year == FLAT_LAYOUT_YEAR {
            ModelArtifact::OsmGz
        } else {
            ModelArtifact::Zip
        }
    }

    /// `{bldg_id:07}_upgrade{upgrade_id}`
    pub fn file_stem(&self) -> String {
        format!("{:07}_upgrade{}", self.bldg_id, self.upgrade_id)
    }

    pub fn relative_key(&self) -> String {
        let release_dir = format!(
            "{}/{}_{}_release_{}/building_energy_models",
            self.release_year, self.res_com, self.weather, self.release_number
        );
        let file = format!(
            "bldg{:07}-up{:02}.{}",
            self.bldg_id,
            self.upgrade_id,
            self.artifact().extension()
        );
        match self.artifact() {
            ModelArtifact::OsmGz => format!("{release_dir}/{file}"),
            ModelArtifact::Zip => format!("{release_dir}/upgrade={}/{file}", self.upgrade_id),
        }
    }

    pub fn download_url(&self, location: &DatasetLocation) -> String {
        location.object_url(&self.relative_key())
    }

    pub fn to_json(&self) -> Result<String, FetchError> {
        serde_json::to_string(self).map_err(|err| FetchError::Filesystem(err.to_string()))
    }
}

pub fn fetch_bldg_ids(state: &StateCode) -> Result<Vec<BuildingId>, FetchError> {
    match state.as_str() {
        "MA" => Ok([7, 8, 9].into_iter().map(BuildingId::new).collect()),
        other => Err(FetchError::UnsupportedState(other.to_string())),
    }
}

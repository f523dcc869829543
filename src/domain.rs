use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingType {
    Resstock,
    Comstock,
}

impl BuildingType {
    pub fn from_short(value: &str) -> Option<Self> {
        match value {
            "res" => Some(BuildingType::Resstock),
            "com" => Some(BuildingType::Comstock),
            _ => None,
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            BuildingType::Resstock => "res",
            BuildingType::Comstock => "com",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildingType::Resstock => "resstock",
            BuildingType::Comstock => "comstock",
        }
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseIdentity {
    pub release_year: String,
    pub variant: BuildingType,
    pub weather_dataset: String,
    pub release_number: String,
}

impl ReleaseIdentity {
    pub fn catalog_key(&self) -> CatalogKey {
        CatalogKey {
            variant: self.variant,
            release_year: self.release_year.clone(),
            weather_dataset: self.weather_dataset.clone(),
            release_number: self.release_number.clone(),
        }
    }
}

/// One release as stored in the catalog file. Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub release_year: String,
    #[serde(rename = "res_com")]
    pub variant: BuildingType,
    #[serde(rename = "weather")]
    pub weather_dataset: String,
    pub release_number: String,
    pub upgrade_ids: Vec<u32>,
}

impl ReleaseRecord {
    pub fn new(identity: ReleaseIdentity, mut upgrade_ids: Vec<u32>) -> Self {
        upgrade_ids.sort_unstable();
        Self {
            release_year: identity.release_year,
            variant: identity.variant,
            weather_dataset: identity.weather_dataset,
            release_number: identity.release_number,
            upgrade_ids,
        }
    }

    pub fn identity(&self) -> ReleaseIdentity {
        ReleaseIdentity {
            release_year: self.release_year.clone(),
            variant: self.variant,
            weather_dataset: self.weather_dataset.clone(),
            release_number: self.release_number.clone(),
        }
    }

    pub fn catalog_key(&self) -> CatalogKey {
        self.identity().catalog_key()
    }

    pub fn release_dir(&self) -> String {
        format!(
            "{}/{}_{}_release_{}",
            self.release_year, self.variant, self.weather_dataset, self.release_number
        )
    }
}

/// `{res|com}_{year}_{weather}_{release}`, e.g. `res_2022_tmy3_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    pub variant: BuildingType,
    pub release_year: String,
    pub weather_dataset: String,
    pub release_number: String,
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.variant.short(),
            self.release_year,
            self.weather_dataset,
            self.release_number
        )
    }
}

impl FromStr for CatalogKey {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FetchError::InvalidCatalogKey(value.to_string());
        let trimmed = value.trim();
        let (short, rest) = trimmed.split_once('_').ok_or_else(invalid)?;
        let variant = BuildingType::from_short(short).ok_or_else(invalid)?;
        let (year, rest) = rest.split_once('_').ok_or_else(invalid)?;
        let (weather, release) = rest.rsplit_once('_').ok_or_else(invalid)?;

        let year_ok = year.len() == 4 && year.chars().all(|ch| ch.is_ascii_digit());
        let weather_ok = !weather.is_empty()
            && weather
                .chars()
                .all(|ch| ch.is_alphanumeric() || ch == '_');
        if !year_ok || !weather_ok || !is_release_number(release) {
            return Err(invalid());
        }

        Ok(Self {
            variant,
            release_year: year.to_string(),
            weather_dataset: weather.to_string(),
            release_number: release.to_string(),
        })
    }
}

fn is_release_number(value: &str) -> bool {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };
    let digits = |part: &str| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit());
    digits(whole) && fraction.map(digits).unwrap_or(true)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateCode(String);

impl StateCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StateCode {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid =
            normalized.len() == 2 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());
        if !is_valid {
            return Err(FetchError::InvalidStateCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

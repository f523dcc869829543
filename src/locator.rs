use std::collections::VecDeque;

use crate::error::FetchError;
use crate::listing::{ListingClient, directory_prefix, list_directories};

pub const MODEL_DIR_MARKER: &str = "building_energy_model";
pub const MAX_LOCATE_DEPTH: usize = 3;
/// Releases from this year publish models without upgrade directories.
pub const EXCLUDED_RELEASE_YEAR: &str = "2021";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPath {
    pub prefix: String,
    pub depth: usize,
}

impl DirectoryPath {
    pub fn new(prefix: impl Into<String>, depth: usize) -> Self {
        Self {
            prefix: prefix.into(),
            depth,
        }
    }

    pub fn name(&self) -> &str {
        directory_name(&self.prefix)
    }
}

pub fn directory_name(prefix: &str) -> &str {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

pub struct DirectoryLocator<'a, L: ListingClient + ?Sized> {
    client: &'a L,
    bucket: &'a str,
}

impl<'a, L: ListingClient + ?Sized> DirectoryLocator<'a, L> {
    pub fn new(client: &'a L, bucket: &'a str) -> Self {
        Self { client, bucket }
    }

    /// Shallowest, earliest-listed directory under `start_prefix` whose name
    /// contains [`MODEL_DIR_MARKER`], at most [`MAX_LOCATE_DEPTH`] levels down.
    pub fn locate(&self, start_prefix: &str) -> Result<Option<DirectoryPath>, FetchError> {
        let start = directory_prefix(start_prefix);
        if is_excluded_era(&start) {
            tracing::debug!(start_prefix, "skipping model lookup for excluded release year");
            return Ok(None);
        }

        let mut queue = VecDeque::from([DirectoryPath::new(start, 0)]);
        while let Some(node) = queue.pop_front() {
            if is_model_dir(node.name()) {
                tracing::debug!(prefix = %node.prefix, depth = node.depth, "found model directory");
                return Ok(Some(node));
            }
            if node.depth >= MAX_LOCATE_DEPTH {
                continue;
            }
            for child in list_directories(self.client, self.bucket, &node.prefix)? {
                queue.push_back(DirectoryPath::new(child, node.depth + 1));
            }
        }
        Ok(None)
    }
}

fn is_model_dir(name: &str) -> bool {
    name.to_lowercase().contains(MODEL_DIR_MARKER)
}

fn is_excluded_era(prefix: &str) -> bool {
    prefix
        .split('/')
        .any(|segment| segment == EXCLUDED_RELEASE_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::MemoryListing;

    #[test]
    fn directory_name_ignores_trailing_slash() {
        assert_eq!(directory_name("a/b/upgrade=01/"), "upgrade=01");
        assert_eq!(directory_name("single"), "single");
        assert_eq!(directory_name(""), "");
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        assert!(is_model_dir("Building_Energy_Models"));
        assert!(!is_model_dir("metadata"));
    }

    #[test]
    fn prefers_shallowest_match() {
        let listing = MemoryListing::new([
            "r/2022/rel/a/building_energy_models/upgrade=0/",
            "r/2022/rel/building_energy_models/upgrade=1/",
        ]);
        let found = DirectoryLocator::new(&listing, "b")
            .locate("r/2022/rel/")
            .unwrap()
            .unwrap();
        assert_eq!(found.prefix, "r/2022/rel/building_energy_models/");
        assert_eq!(found.depth, 1);
    }

    #[test]
    fn stops_listing_once_found() {
        let listing = MemoryListing::new([
            "r/2022/rel/building_energy_models/upgrade=0/",
            "r/2022/rel/zzz/deep/deeper/",
        ]);
        DirectoryLocator::new(&listing, "b")
            .locate("r/2022/rel/")
            .unwrap();
        assert_eq!(listing.requests(), vec!["r/2022/rel/"]);
    }

    #[test]
    fn start_prefix_is_treated_as_a_directory() {
        let listing = MemoryListing::new(["r/2022/rel/building_energy_models/upgrade=0/"]);
        DirectoryLocator::new(&listing, "b")
            .locate("r/2022/rel")
            .unwrap();
        assert_eq!(listing.requests(), vec!["r/2022/rel/"]);
    }
}

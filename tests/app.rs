use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;
use zip::write::SimpleFileOptions;

use buildstock_fetch::app::{App, FetchOptions};
use buildstock_fetch::buildings::BuildingId;
use buildstock_fetch::config::DatasetLocation;
use buildstock_fetch::domain::{CatalogKey, StateCode};
use buildstock_fetch::download::DownloadClient;
use buildstock_fetch::error::FetchError;
use buildstock_fetch::listing::MemoryListing;
use buildstock_fetch::output::JsonOutput;
use buildstock_fetch::store::Store;

const KEYS: &[&str] = &[
    "root/2021/resstock_tmy3_release_1/building_energy_models/bldg0000007-up00.osm.gz",
    "root/2022/resstock_tmy3_release_1/building_energy_models/upgrade=0/bldg0000007-up00.zip",
    "root/2022/resstock_tmy3_release_1/building_energy_models/upgrade=1/bldg0000007-up01.zip",
];

/// Serves a fixed body for every URL and records what was requested.
struct StaticDownloader {
    body: Vec<u8>,
    urls: Mutex<Vec<String>>,
}

impl StaticDownloader {
    fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            urls: Mutex::new(Vec::new()),
        }
    }
}

impl DownloadClient for StaticDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        std::fs::write(destination, &self.body).unwrap();
        Ok(self.body.len() as u64)
    }
}

fn model_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("in.osm", options).unwrap();
    writer.write_all(b"OS:Version,\n  3.5.0;\n").unwrap();
    writer.finish().unwrap().into_inner()
}

fn model_gz() -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"OS:Version,\n  3.2.1;\n").unwrap();
    encoder.finish().unwrap()
}

fn app(dir: &Path, body: Vec<u8>) -> App<MemoryListing, StaticDownloader> {
    let root = Utf8PathBuf::from_path_buf(dir.to_path_buf()).unwrap();
    let store = Store::new(root.join("data"), root.join("buildstock_releases.json"));
    let location = DatasetLocation {
        base_url: "https://mirror.example".to_string(),
        bucket: "oedi-data-lake".to_string(),
        root_prefix: "root".to_string(),
    };
    App::new(
        store,
        location,
        MemoryListing::new(KEYS.iter().copied()),
        StaticDownloader::new(body),
    )
}

fn ma() -> StateCode {
    "ma".parse().unwrap()
}

#[test]
fn catalog_then_releases() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), Vec::new());

    let built = app.build_catalog(&JsonOutput).unwrap();
    assert_eq!(built.keys, vec!["res_2021_tmy3_1", "res_2022_tmy3_1"]);

    let listed = app.releases(&JsonOutput).unwrap();
    assert_eq!(listed.releases.len(), 2);
    assert!(listed.releases[0].record.upgrade_ids.is_empty());
    assert_eq!(listed.releases[1].record.upgrade_ids, vec![0, 1]);
}

#[test]
fn releases_without_catalog() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), Vec::new());
    let err = app.releases(&JsonOutput).unwrap_err();
    assert_matches!(err, FetchError::MissingCatalog(_));
}

#[test]
fn ids_for_catalogued_release_and_upgrade() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), Vec::new());
    app.build_catalog(&JsonOutput).unwrap();

    let key: CatalogKey = "res_2022_tmy3_1".parse().unwrap();
    let result = app.building_ids(&ma(), Some(&key), Some(1)).unwrap();
    assert_eq!(result.state, "MA");
    assert_eq!(
        result.buildings.iter().map(|id| id.bldg_id).collect::<Vec<_>>(),
        vec![7, 8, 9]
    );
    assert!(result.buildings.iter().all(|id| id.upgrade_id == 1));

    let err = app.building_ids(&ma(), Some(&key), Some(4)).unwrap_err();
    assert_matches!(err, FetchError::UpgradeNotAvailable { upgrade: 4, .. });

    let unknown: CatalogKey = "com_2024_amy2018_2".parse().unwrap();
    let err = app.building_ids(&ma(), Some(&unknown), None).unwrap_err();
    assert_matches!(err, FetchError::ReleaseNotFound(_));
}

#[test]
fn unsupported_state() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), Vec::new());
    let state: StateCode = "TX".parse().unwrap();
    assert_matches!(
        app.building_ids(&state, None, None),
        Err(FetchError::UnsupportedState(_))
    );
}

#[test]
fn dry_run_plans_without_downloading() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), model_zip());
    let ids = app.building_ids(&ma(), None, None).unwrap().buildings;

    let options = FetchOptions {
        dry_run: true,
        ..FetchOptions::default()
    };
    let result = app.fetch_buildings(&ids, &options, &JsonOutput).unwrap();
    assert_eq!(result.items.len(), 3);
    assert!(result.items.iter().all(|item| item.action == "planned"));
    assert_eq!(
        result.items[0].url,
        "https://mirror.example/oedi-data-lake/root/2022/resstock_tmy3_release_1/building_energy_models/upgrade=0/bldg0000007-up00.zip"
    );
    assert!(!temp.path().join("data").exists());
}

#[test]
fn fetch_and_extract_zip_models() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), model_zip());
    let ids = vec![BuildingId::new(7)];
    let options = FetchOptions {
        extract: true,
        ..FetchOptions::default()
    };

    let first = app.fetch_buildings(&ids, &options, &JsonOutput).unwrap();
    assert_eq!(first.items[0].action, "download");
    assert!(temp.path().join("data/0000007_upgrade0.zip").exists());
    let extracted = temp.path().join("data/0000007_upgrade0/in.osm");
    assert_eq!(
        std::fs::read_to_string(extracted).unwrap(),
        "OS:Version,\n  3.5.0;\n"
    );

    let second = app.fetch_buildings(&ids, &options, &JsonOutput).unwrap();
    assert_eq!(second.items[0].action, "exists");
}

#[test]
fn flat_layout_models_are_gunzipped() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), model_gz());
    let mut id = BuildingId::new(7);
    id.release_year = "2021".to_string();
    let options = FetchOptions {
        extract: true,
        ..FetchOptions::default()
    };

    let result = app.fetch_buildings(&[id], &options, &JsonOutput).unwrap();
    assert!(result.items[0].url.ends_with("building_energy_models/bldg0000007-up00.osm.gz"));
    assert_eq!(
        std::fs::read_to_string(temp.path().join("data/0000007_upgrade0.osm")).unwrap(),
        "OS:Version,\n  3.2.1;\n"
    );
}

#[test]
fn corrupt_zip_is_not_kept() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), b"<Error>AccessDenied</Error>".to_vec());
    let err = app
        .fetch_buildings(&[BuildingId::new(8)], &FetchOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, FetchError::Archive(_));
    assert!(!temp.path().join("data/0000008_upgrade0.zip").exists());
}

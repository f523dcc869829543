use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use buildstock_fetch::config::{
    Config, ConfigLoader, DEFAULT_BUCKET, DEFAULT_ROOT_PREFIX, DatasetLocation,
};
use buildstock_fetch::error::FetchError;

#[test]
fn load_explicit_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("buildstock-fetch.json");
    std::fs::write(
        &path,
        r#"{
  "bucket": "oedi-mirror",
  "base_url": "http://localhost:9000",
  "catalog_path": "out/releases.json",
  "timeout_secs": 5
}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.location.bucket, "oedi-mirror");
    assert_eq!(resolved.location.base_url, "http://localhost:9000");
    assert_eq!(resolved.location.root_prefix, DEFAULT_ROOT_PREFIX);
    assert_eq!(resolved.catalog_path, Utf8PathBuf::from("out/releases.json"));
    assert_eq!(resolved.data_dir, Utf8PathBuf::from("data"));
    assert_eq!(resolved.timeout, Duration::from_secs(5));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FetchError::ConfigRead(_));
}

#[test]
fn malformed_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("bad.json");
    std::fs::write(&path, "{ bucket: ").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FetchError::ConfigParse(_));
}

#[test]
fn defaults_point_at_public_bucket() {
    let resolved = ConfigLoader::resolve_config(Config::default());
    assert_eq!(resolved.location, DatasetLocation::default());
    assert_eq!(resolved.location.bucket, DEFAULT_BUCKET);
    assert_eq!(
        resolved.location.object_url("2022/resstock_tmy3_release_1/metadata/baseline.parquet"),
        "https://s3.us-west-2.amazonaws.com/oedi-data-lake/nrel-pds-building-stock/end-use-load-profiles-for-us-building-stock/2022/resstock_tmy3_release_1/metadata/baseline.parquet"
    );
}

use std::time::Duration;

use assert_matches::assert_matches;
use mockito::Matcher;

use buildstock_fetch::error::FetchError;
use buildstock_fetch::listing::{S3HttpLister, list_directories, list_keys};

fn page(prefixes: &[&str], token: Option<&str>) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\n",
    );
    match token {
        Some(token) => body.push_str(&format!(
            "<IsTruncated>true</IsTruncated><NextContinuationToken>{token}</NextContinuationToken>\n"
        )),
        None => body.push_str("<IsTruncated>false</IsTruncated>\n"),
    }
    for prefix in prefixes {
        body.push_str(&format!(
            "<CommonPrefixes><Prefix>{prefix}</Prefix></CommonPrefixes>\n"
        ));
    }
    body.push_str("</ListBucketResult>");
    body
}

fn lister(server: &mockito::Server) -> S3HttpLister {
    S3HttpLister::new(&server.url(), Duration::from_secs(5)).unwrap()
}

#[test]
fn drains_every_page_of_directories() {
    let mut server = mockito::Server::new();
    let first = server
        .mock("GET", "/oedi-data-lake")
        .match_query(Matcher::Regex(
            "^list-type=2&prefix=root%2F&delimiter=%2F$".to_string(),
        ))
        .with_status(200)
        .with_body(page(&["root/2021/", "root/2022/"], Some("tok-2")))
        .expect(1)
        .create();
    let second = server
        .mock("GET", "/oedi-data-lake")
        .match_query(Matcher::Regex("continuation-token=tok-2$".to_string()))
        .with_status(200)
        .with_body(page(&["root/2023/"], None))
        .expect(1)
        .create();

    let dirs = list_directories(&lister(&server), "oedi-data-lake", "root/").unwrap();
    assert_eq!(dirs, vec!["root/2021/", "root/2022/", "root/2023/"]);
    first.assert();
    second.assert();
}

#[test]
fn key_listing_omits_delimiter() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/b")
        .match_query(Matcher::Regex("^list-type=2&prefix=root$".to_string()))
        .with_status(200)
        .with_body(
            "<ListBucketResult><IsTruncated>false</IsTruncated>\
             <Contents><Key>root/2021/resstock_tmy3_release_1/building_energy_models/bldg0000001-up00.osm.gz</Key></Contents>\
             </ListBucketResult>",
        )
        .create();

    let keys = list_keys(&lister(&server), "b", "root", Some(5)).unwrap();
    assert_eq!(keys.len(), 1);
    mock.assert();
}

#[test]
fn error_status_is_not_retried() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/b")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body("<Error><Code>AccessDenied</Code></Error>")
        .expect(1)
        .create();

    let err = list_directories(&lister(&server), "b", "root/").unwrap_err();
    assert_matches!(err, FetchError::ListingStatus { status: 403, .. });
    mock.assert();
}

#[test]
fn non_listing_body_is_a_parse_fault() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/b")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create();

    let err = list_directories(&lister(&server), "b", "root/").unwrap_err();
    assert_matches!(err, FetchError::ListingParse(_));
}

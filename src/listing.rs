use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use quick_xml::events::Event;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::error::FetchError;

pub const DEFAULT_LISTING_URL: &str = "https://s3.us-west-2.amazonaws.com";
pub const DIRECTORY_DELIMITER: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    pub delimiter: Option<&'a str>,
    pub continuation_token: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub keys: Vec<String>,
    pub next_continuation_token: Option<String>,
}

pub trait ListingClient: Send + Sync {
    fn list_page(&self, request: &ListRequest<'_>) -> Result<ListPage, FetchError>;
}

impl<T: ListingClient + ?Sized> ListingClient for &T {
    fn list_page(&self, request: &ListRequest<'_>) -> Result<ListPage, FetchError> {
        (**self).list_page(request)
    }
}

pub fn list_directories<L: ListingClient + ?Sized>(
    client: &L,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<String>, FetchError> {
    let mut directories = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = client.list_page(&ListRequest {
            bucket,
            prefix,
            delimiter: Some(DIRECTORY_DELIMITER),
            continuation_token: token.as_deref(),
        })?;
        directories.extend(page.common_prefixes);
        match page.next_continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    tracing::debug!(prefix, count = directories.len(), "listed directories");
    Ok(directories)
}

pub fn list_keys<L: ListingClient + ?Sized>(
    client: &L,
    bucket: &str,
    prefix: &str,
    max_pages: Option<usize>,
) -> Result<Vec<String>, FetchError> {
    let mut keys = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;
    loop {
        if max_pages.is_some_and(|limit| pages >= limit) {
            break;
        }
        let page = client.list_page(&ListRequest {
            bucket,
            prefix,
            delimiter: None,
            continuation_token: token.as_deref(),
        })?;
        pages += 1;
        keys.extend(page.keys);
        match page.next_continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    tracing::debug!(prefix, pages, count = keys.len(), "listed keys");
    Ok(keys)
}

#[derive(Clone)]
pub struct S3HttpLister {
    client: Client,
    base_url: String,
}

impl S3HttpLister {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("buildstock-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::ListingHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::ListingHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.base_url, bucket)
    }
}

impl ListingClient for S3HttpLister {
    fn list_page(&self, request: &ListRequest<'_>) -> Result<ListPage, FetchError> {
        let mut query: Vec<(&str, &str)> = vec![("list-type", "2"), ("prefix", request.prefix)];
        if let Some(delimiter) = request.delimiter {
            query.push(("delimiter", delimiter));
        }
        if let Some(token) = request.continuation_token {
            query.push(("continuation-token", token));
        }

        let response = self
            .client
            .get(self.bucket_url(request.bucket))
            .query(&query)
            .send()
            .map_err(|err| FetchError::ListingHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "listing request failed".to_string());
            return Err(FetchError::ListingStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| FetchError::ListingHttp(err.to_string()))?;
        parse_list_response(&body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
    #[serde(default)]
    contents: Vec<ObjectEntry>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

pub fn parse_list_response(body: &str) -> Result<ListPage, FetchError> {
    let root = root_element(body)?;
    if root != "ListBucketResult" {
        return Err(FetchError::ListingParse(format!(
            "expected ListBucketResult, got {root}"
        )));
    }
    let result: ListBucketResult =
        quick_xml::de::from_str(body).map_err(|err| FetchError::ListingParse(err.to_string()))?;

    let next_continuation_token = match (result.is_truncated, result.next_continuation_token) {
        (false, _) => None,
        (true, Some(token)) if !token.is_empty() => Some(token),
        (true, _) => {
            return Err(FetchError::ListingParse(
                "truncated page without continuation token".to_string(),
            ));
        }
    };

    Ok(ListPage {
        common_prefixes: result
            .common_prefixes
            .into_iter()
            .map(|entry| entry.prefix)
            .collect(),
        keys: result.contents.into_iter().map(|entry| entry.key).collect(),
        next_continuation_token,
    })
}

fn root_element(body: &str) -> Result<String, FetchError> {
    let mut reader = quick_xml::Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                return Ok(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => {
                return Err(FetchError::ListingParse("empty listing response".to_string()));
            }
            Ok(_) => continue,
            Err(err) => return Err(FetchError::ListingParse(err.to_string())),
        }
    }
}

/// `a/b` and `a/b/` both become `a/b/`; an empty prefix stays empty.
pub fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

pub struct MemoryListing {
    keys: BTreeSet<String>,
    page_size: usize,
    requests: Mutex<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Entry {
    Prefix(String),
    Key(String),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Prefix(value) | Entry::Key(value) => value,
        }
    }
}

impl MemoryListing {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            page_size: 1000,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    fn entries(&self, prefix: &str, delimiter: Option<&str>) -> Vec<Entry> {
        let mut entries = BTreeSet::new();
        for key in self.keys.iter().filter(|key| key.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            let split = delimiter
                .filter(|delimiter| !delimiter.is_empty())
                .and_then(|delimiter| rest.find(delimiter).map(|idx| idx + delimiter.len()));
            match split {
                Some(end) => entries.insert(Entry::Prefix(format!("{prefix}{}", &rest[..end]))),
                None => entries.insert(Entry::Key(key.clone())),
            };
        }
        let mut entries: Vec<Entry> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }
}

impl ListingClient for MemoryListing {
    fn list_page(&self, request: &ListRequest<'_>) -> Result<ListPage, FetchError> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.prefix.to_string());
        }
        let start = match request.continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| FetchError::ListingParse(format!("bad continuation token {token}")))?,
            None => 0,
        };

        let entries = self.entries(request.prefix, request.delimiter);
        let end = (start + self.page_size).min(entries.len());
        let mut page = ListPage::default();
        for entry in entries.get(start..end).unwrap_or_default() {
            match entry {
                Entry::Prefix(value) => page.common_prefixes.push(value.clone()),
                Entry::Key(value) => page.keys.push(value.clone()),
            }
        }
        if end < entries.len() {
            page.next_continuation_token = Some(end.to_string());
        }
        Ok(page)
    }
}

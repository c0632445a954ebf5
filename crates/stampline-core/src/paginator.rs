//! Paged endpoint traversal.
//!
//! An [`Endpoint`] describes how to address one page for a work item and
//! where the records and the continuation signal live in the JSON body.
//! A [`Paginator`] walks the pages of one work item lazily, strictly in
//! order, and stops at the first error.

use std::marker::PhantomData;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, FetchError};
use crate::http::HttpClient;

/// Placeholder substituted with the work item id in endpoint templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// How an endpoint signals that more pages exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStyle {
    /// `?page=N&pageSize=K`; continue while `(N - 1) * K < total`
    Counted { page_size: usize, total_at: String },
    /// `?page=N`; continue while `N <= totalPages`
    TotalPages { total_pages_at: String },
    /// One request, no page parameters
    Single,
}

/// Remote endpoint description.
#[derive(Debug, Clone)]
pub struct Endpoint {
    template: String,
    id_param: Option<String>,
    records_at: String,
    style: PageStyle,
    query: Vec<(String, String)>,
}

impl Endpoint {
    /// Counted family: body `{data: {list: [...], total: N}}`
    pub fn counted(template: impl Into<String>, page_size: usize) -> Self {
        Self {
            template: template.into(),
            id_param: None,
            records_at: "/data/list".to_string(),
            style: PageStyle::Counted {
                page_size,
                total_at: "/data/total".to_string(),
            },
            query: Vec::new(),
        }
    }

    /// Total-pages family: body `{data: [...], totalPages: N}`
    pub fn total_pages(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            id_param: None,
            records_at: "/data".to_string(),
            style: PageStyle::TotalPages {
                total_pages_at: "/totalPages".to_string(),
            },
            query: Vec::new(),
        }
    }

    /// Single-shot endpoint with records at the JSON pointer `records_at`
    pub fn single(template: impl Into<String>, records_at: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            id_param: None,
            records_at: records_at.into(),
            style: PageStyle::Single,
            query: Vec::new(),
        }
    }

    /// Pass the work item id as query parameter `name` instead of `{id}`
    pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = Some(name.into());
        self
    }

    /// Fixed extra query parameter sent with every page
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Override the JSON pointer of the record list
    pub fn with_records_at(mut self, pointer: impl Into<String>) -> Self {
        self.records_at = pointer.into();
        self
    }

    pub fn style(&self) -> &PageStyle {
        &self.style
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Check the template is a usable URL and page sizes are non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PageStyle::Counted { page_size: 0, .. } = self.style {
            return Err(ConfigError::Zero("page_size"));
        }
        self.page_url("item", 1)
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidEndpoint {
                url: self.template.clone(),
                message: e.message,
            })
    }

    /// Build the request URL for `item`, page `page` (1-based).
    pub fn page_url(&self, item: &str, page: usize) -> Result<Url, FetchError> {
        let raw = self.template.replace(ID_PLACEHOLDER, item);
        let mut url = Url::parse(&raw)
            .map_err(|e| FetchError::malformed(format!("bad URL {raw}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
            if let Some(param) = &self.id_param {
                pairs.append_pair(param, item);
            }
            match &self.style {
                PageStyle::Counted { page_size, .. } => {
                    pairs.append_pair("page", &page.to_string());
                    pairs.append_pair("pageSize", &page_size.to_string());
                }
                PageStyle::TotalPages { .. } => {
                    pairs.append_pair("page", &page.to_string());
                }
                PageStyle::Single => {}
            }
        }
        // query_pairs_mut leaves a dangling '?' when nothing was appended
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    /// Split a page body into its record list and whether page `page + 1` exists.
    fn parse_page(&self, mut body: Value, page: usize) -> Result<(Value, bool), FetchError> {
        let more = match &self.style {
            PageStyle::Counted {
                page_size,
                total_at,
            } => {
                let total = count_at(&body, total_at)?;
                (page as u64) * (*page_size as u64) < total
            }
            PageStyle::TotalPages { total_pages_at } => {
                let total_pages = count_at(&body, total_pages_at)?;
                (page as u64) < total_pages
            }
            PageStyle::Single => false,
        };
        let records = body
            .pointer_mut(&self.records_at)
            .map(Value::take)
            .ok_or_else(|| FetchError::malformed(format!("missing {}", self.records_at)))?;
        if !records.is_array() {
            return Err(FetchError::malformed(format!(
                "{} is not a list",
                self.records_at
            )));
        }
        Ok((records, more))
    }
}

/// Read a non-negative count; servers sometimes send it as a string.
fn count_at(body: &Value, pointer: &str) -> Result<u64, FetchError> {
    let value = body
        .pointer(pointer)
        .ok_or_else(|| FetchError::malformed(format!("missing {pointer}")))?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| FetchError::malformed(format!("{pointer} is not a count: {value}")))
}

/// One decoded page of records.
#[derive(Debug)]
pub struct Page<R> {
    /// 1-based page number
    pub number: usize,
    pub records: Vec<R>,
}

/// Lazy, finite sequence of pages for one work item.
///
/// Yields `Ok(Page)` per page; the first error is yielded once and ends the
/// sequence. A page with no records also ends it, whatever the server's
/// count says.
pub struct Paginator<'a, R> {
    client: &'a HttpClient,
    endpoint: &'a Endpoint,
    item: &'a str,
    next_page: usize,
    max_pages: Option<usize>,
    done: bool,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R: DeserializeOwned> Paginator<'a, R> {
    pub fn new(client: &'a HttpClient, endpoint: &'a Endpoint, item: &'a str) -> Self {
        Self {
            client,
            endpoint,
            item,
            next_page: 1,
            max_pages: None,
            done: false,
            _record: PhantomData,
        }
    }

    /// Stop after `max_pages` pages even if the server reports more
    pub fn max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Drain every page into one list, or return the first error.
    ///
    /// Records from pages before a failing page are discarded with it.
    pub fn fetch_all(self) -> Result<Vec<R>, FetchError> {
        let mut records = Vec::new();
        for page in self {
            records.extend(page?.records);
        }
        Ok(records)
    }

    fn fetch_page(&self, page: usize) -> Result<(Vec<R>, bool), FetchError> {
        let url = self.endpoint.page_url(self.item, page)?;
        log::debug!("{}: fetching page {page}", self.item);
        let body = self.client.get_json(&url)?;
        let (records, more) = self.endpoint.parse_page(body, page)?;
        let records: Vec<R> = serde_json::from_value(records)
            .map_err(|e| FetchError::malformed(format!("page {page}: {e}")))?;
        Ok((records, more))
    }
}

impl<R: DeserializeOwned> Iterator for Paginator<'_, R> {
    type Item = Result<Page<R>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.max_pages.is_some_and(|max| self.next_page > max) {
            log::debug!("{}: reached max_pages", self.item);
            self.done = true;
            return None;
        }

        let number = self.next_page;
        match self.fetch_page(number) {
            Ok((records, more)) => {
                self.next_page += 1;
                if !more || records.is_empty() {
                    self.done = true;
                }
                Some(Ok(Page { number, records }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use crate::http::{HttpConfig, SHARED_RUNTIME};
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        address: String,
    }

    fn rows(prefix: &str, n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({ "address": format!("{prefix}{i}") }))
            .collect()
    }

    fn client() -> HttpClient {
        HttpClient::new(&HttpConfig::default()).unwrap()
    }

    fn received(server: &MockServer) -> usize {
        SHARED_RUNTIME
            .block_on(server.received_requests())
            .map_or(0, |r| r.len())
    }

    /// Counted endpoint answering `total` items in pages of `page_size`
    fn counted_server(total: usize, page_size: usize) -> MockServer {
        SHARED_RUNTIME.block_on(async {
            let server = MockServer::start().await;
            let pages = total.div_ceil(page_size).max(1);
            for page in 1..=pages {
                let n = page_size.min(total - (page - 1) * page_size);
                Mock::given(method("GET"))
                    .and(path("/holders"))
                    .and(query_param("tick", "kevin"))
                    .and(query_param("page", page.to_string()))
                    .and(query_param("pageSize", page_size.to_string()))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "data": { "list": rows(&format!("p{page}-"), n), "total": total }
                    })))
                    .mount(&server)
                    .await;
            }
            server
        })
    }

    #[test]
    fn page_url_counted_with_id_param() {
        let ep = Endpoint::counted("https://api.example/holders", 500).with_id_param("tick");
        let url = ep.page_url("$viva", 2).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example/holders?tick=%24viva&page=2&pageSize=500"
        );
    }

    #[test]
    fn page_url_path_placeholder_and_extra_query() {
        let ep = Endpoint::total_pages("https://api.example/src20/tick/{id}").with_query("limit", "5000");
        let url = ep.page_url("STMAP", 3).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example/src20/tick/STMAP?limit=5000&page=3"
        );
    }

    #[test]
    fn page_url_single_has_no_query() {
        let ep = Endpoint::single("https://api.example/stamps/{id}", "/data/holders");
        let url = ep.page_url("A123", 1).unwrap();
        assert_eq!(url.as_str(), "https://api.example/stamps/A123");
    }

    #[test]
    fn validate_rejects_zero_page_size_and_bad_url() {
        assert!(matches!(
            Endpoint::counted("https://api.example/h", 0).validate(),
            Err(ConfigError::Zero("page_size"))
        ));
        assert!(matches!(
            Endpoint::single("not a url/{id}", "/data").validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(Endpoint::counted("https://api.example/h", 10).validate().is_ok());
    }

    #[test]
    fn counted_total_235_takes_three_requests() {
        let server = counted_server(235, 100);
        let ep = Endpoint::counted(format!("{}/holders", server.uri()), 100).with_id_param("tick");
        let client = client();

        let pages: Vec<Page<Row>> = Paginator::new(&client, &ep, "kevin")
            .collect::<Result<_, _>>()
            .unwrap();

        let sizes: Vec<usize> = pages.iter().map(|p| p.records.len()).collect();
        assert_eq!(sizes, vec![100, 100, 35]);
        assert_eq!(pages[2].number, 3);
        assert_eq!(received(&server), 3);
    }

    #[test]
    fn counted_exact_multiple_stops_without_extra_request() {
        let server = counted_server(200, 100);
        let ep = Endpoint::counted(format!("{}/holders", server.uri()), 100).with_id_param("tick");
        let client = client();

        let records: Vec<Row> = Paginator::new(&client, &ep, "kevin").fetch_all().unwrap();
        assert_eq!(records.len(), 200);
        assert_eq!(received(&server), 2);
    }

    #[test]
    fn max_pages_caps_requests() {
        let server = counted_server(235, 100);
        let ep = Endpoint::counted(format!("{}/holders", server.uri()), 100).with_id_param("tick");
        let client = client();

        let records: Vec<Row> = Paginator::new(&client, &ep, "kevin")
            .max_pages(Some(2))
            .fetch_all()
            .unwrap();
        assert_eq!(records.len(), 200);
        assert_eq!(received(&server), 2);
    }

    #[test]
    fn total_pages_family() {
        let server = SHARED_RUNTIME.block_on(async {
            let server = MockServer::start().await;
            for page in 1..=2 {
                Mock::given(method("GET"))
                    .and(path("/tick/STMAP"))
                    .and(query_param("page", page.to_string()))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "data": rows(&format!("p{page}-"), 3),
                        "totalPages": 2
                    })))
                    .mount(&server)
                    .await;
            }
            server
        });
        let ep = Endpoint::total_pages(format!("{}/tick/{{id}}", server.uri()));
        let client = client();

        let records: Vec<Row> = Paginator::new(&client, &ep, "STMAP").fetch_all().unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[3].address, "p2-0");
        assert_eq!(received(&server), 2);
    }

    #[test]
    fn single_endpoint_one_request() {
        let server = SHARED_RUNTIME.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/stamps/A1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "data": { "stamp": 1, "holders": rows("h", 4) }
                })))
                .mount(&server)
                .await;
            server
        });
        let ep = Endpoint::single(format!("{}/stamps/{{id}}", server.uri()), "/data/holders");
        let client = client();

        let records: Vec<Row> = Paginator::new(&client, &ep, "A1").fetch_all().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(received(&server), 1);
    }

    #[test]
    fn error_ends_sequence_and_is_reported() {
        let server = SHARED_RUNTIME.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(query_param("page", "1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "data": { "list": rows("a", 10), "total": 30 }
                })))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(query_param("page", "2"))
                .respond_with(ResponseTemplate::new(502))
                .mount(&server)
                .await;
            server
        });
        let ep = Endpoint::counted(format!("{}/holders", server.uri()), 10).with_id_param("tick");
        let client = client();

        let mut pages = Paginator::<Row>::new(&client, &ep, "kevin");
        assert!(pages.next().unwrap().is_ok());
        let err = pages.next().unwrap().unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Status(502));
        assert!(pages.next().is_none());
        assert_eq!(received(&server), 2);
    }

    #[test]
    fn missing_key_is_malformed() {
        let server = SHARED_RUNTIME.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({ "data": { "items": [] } })),
                )
                .mount(&server)
                .await;
            server
        });
        let ep = Endpoint::counted(format!("{}/holders", server.uri()), 10);
        let client = client();

        let err = Paginator::<Row>::new(&client, &ep, "x")
            .fetch_all()
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::MalformedBody);
        assert!(err.message.contains("/data/total"));
    }

    #[test]
    fn parse_page_accepts_string_total() {
        let ep = Endpoint::counted("https://api.example/h", 2);
        let body = json!({ "data": { "list": [{"address": "a"}], "total": "3" } });
        let (records, more) = ep.parse_page(body, 1).unwrap();
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert!(more);
    }

    #[test]
    fn parse_page_records_not_a_list() {
        let ep = Endpoint::single("https://api.example/h", "/data");
        let err = ep.parse_page(json!({ "data": { "error": "x" } }), 1).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::MalformedBody);
    }
}

//! Spring-style pageable query parameters and the pagination headers
//! returned with every list and search page.

use application::{ApplicationError, Relations};
use axum::http::{HeaderMap, HeaderValue, Uri};
use domain::{Page, PageRequest, Sort};
use url::form_urlencoded;

use crate::config::ApiConfig;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Query parameters shared by the list and search endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct PageParams {
    pub page: PageRequest,
    pub sort: Sort,
    pub relations: Relations,
    pub query: Option<String>,
}

impl PageParams {
    /// Parses `page`, `size`, repeated `sort`, `eagerload` and `query`.
    /// Sizes above the configured maximum are clamped.
    pub fn from_query(raw: Option<&str>, config: &ApiConfig) -> Result<Self, ApplicationError> {
        let mut page = 0;
        let mut size = config.default_page_size;
        let mut sorts: Vec<String> = Vec::new();
        let mut relations = Relations::Eager;
        let mut query = None;

        for (key, value) in form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "page" => page = parse_number("page", &value)?,
                "size" => size = parse_number("size", &value)?,
                "sort" if !value.trim().is_empty() => sorts.push(value.into_owned()),
                "eagerload" => {
                    relations = match value.trim() {
                        "" | "true" => Relations::Eager,
                        "false" => Relations::Lazy,
                        other => {
                            return Err(ApplicationError::InvalidInput(format!(
                                "eagerload must be true or false, got '{}'",
                                other
                            )));
                        }
                    }
                }
                "query" => query = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            page: PageRequest::new(page, size.min(config.max_page_size))?,
            sort: Sort::parse_all(sorts.iter().map(String::as_str))?,
            relations,
            query,
        })
    }
}

fn parse_number(name: &str, value: &str) -> Result<usize, ApplicationError> {
    value.trim().parse().map_err(|_| {
        ApplicationError::InvalidInput(format!("{} must be a non-negative integer", name))
    })
}

/// Builds `X-Total-Count` and the `Link` header for `page`, served at `uri`.
pub fn pagination_headers<T>(uri: &Uri, page: &Page<T>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(page.total_elements));

    let last = page.total_pages().saturating_sub(1);
    let mut links = Vec::with_capacity(4);
    if page.has_next() {
        links.push(link(uri, page.number + 1, page.size, "next"));
    }
    if page.has_previous() {
        links.push(link(uri, page.number - 1, page.size, "prev"));
    }
    links.push(link(uri, last, page.size, "last"));
    links.push(link(uri, 0, page.size, "first"));

    if let Ok(value) = HeaderValue::from_str(&links.join(",")) {
        headers.insert(axum::http::header::LINK, value);
    }
    headers
}

/// `<path?other-params&page=N&size=S>; rel="…"`, keeping every query
/// parameter other than `page` and `size`.
fn link(uri: &Uri, page: usize, size: usize, rel: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes()) {
        if key != "page" && key != "size" {
            query.append_pair(&key, &value);
        }
    }
    query.append_pair("page", &page.to_string());
    query.append_pair("size", &size.to_string());
    format!("<{}?{}>; rel=\"{}\"", uri.path(), query.finish(), rel)
}

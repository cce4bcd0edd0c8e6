use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://zootool.com";
const ITEMS_PATH: &str = "/api/users/items/";

/// Page size used against the items endpoint; the API caps pages at 100.
pub const PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum ZootoolError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct ZootoolClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl ZootoolClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ZootoolError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, ZootoolError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            api_key: api_key.into(),
        })
    }

    /// Fetch one page of a user's saved items.
    pub async fn list_items(
        &self,
        username: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Item>, ZootoolError> {
        let mut url = self.endpoint(ITEMS_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("apikey", &self.api_key);
            query.append_pair("username", username);
            query.append_pair("limit", &limit.to_string());
            query.append_pair("offset", &offset.to_string());
        }
        let response = self.http.get(url).send().await?;
        Self::handle_response(response).await
    }

    /// Lazy pager over a user's items, starting from offset zero.
    pub fn item_pages(&self, username: &str, page_size: u32) -> ItemPages<'_> {
        ItemPages {
            client: self,
            username: username.to_string(),
            page_size: page_size.max(1),
            offset: 0,
            done: false,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ZootoolError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ZootoolError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ZootoolError::Api { status, body })
        }
    }
}

/// Offset-based pagination over the items endpoint.
///
/// A page shorter than `page_size` is the last one; an empty page ends the
/// sequence without being yielded. There is no server-side cursor, so remote
/// mutation during a run can skip or repeat items.
pub struct ItemPages<'a> {
    client: &'a ZootoolClient,
    username: String,
    page_size: u32,
    offset: u32,
    done: bool,
}

impl ItemPages<'_> {
    pub async fn next_page(&mut self) -> Result<Option<Vec<Item>>, ZootoolError> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .client
            .list_items(&self.username, self.page_size, self.offset)
            .await?;
        if (page.len() as u32) < self.page_size {
            self.done = true;
        }
        self.offset += self.page_size;
        if page.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }
}

/// One saved item as returned by the items endpoint.
///
/// Only `uid` and `url` are required; the rest defaults so a sparse record
/// still parses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Item {
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub added: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub referer: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Item {
    pub fn is_image(&self) -> bool {
        self.kind == "image"
    }
}

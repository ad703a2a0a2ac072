//! Wire format of the extranet's jqGrid endpoint and the transports that fetch it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cafsync_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};

pub const DEFAULT_GRID_URL: &str =
    "https://extranet-clubalpin.com/app/ActivitesFormations/jx_jqGrid.php";

/// Page-independent part of a grid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridQuery {
    pub def: &'static str,
    pub mode: &'static str,
    pub sidx: &'static str,
    pub sord: &'static str,
}

impl GridQuery {
    /// A list-mode query sorted ascending on `sidx`.
    pub const fn liste(def: &'static str, sidx: &'static str) -> Self {
        Self {
            def,
            mode: "liste",
            sidx,
            sord: "asc",
        }
    }

    pub fn params(&self, session_id: &str, rows_per_page: u32, page: u32) -> Vec<(String, String)> {
        [
            ("sid", session_id.to_string()),
            ("_search", "false".to_string()),
            ("rows", rows_per_page.to_string()),
            ("page", page.to_string()),
            ("def", self.def.to_string()),
            ("mode", self.mode.to_string()),
            ("sidx", self.sidx.to_string()),
            ("sord", self.sord.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridResponse {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub page: u32,
    /// Number of pages.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total: u32,
    /// Number of rows across all pages.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub records: u32,
    #[serde(default)]
    pub rows: Vec<GridRow>,
    #[serde(default, rename = "userData")]
    pub user_data: Option<JsonValue>,
}

impl GridResponse {
    /// The `userData.caliData` object, when the page carries one. The server sends an
    /// empty array instead of an empty object, which is treated as absent.
    pub fn cali_data(&self) -> Option<&Map<String, JsonValue>> {
        self.user_data
            .as_ref()
            .and_then(|user_data| user_data.get("caliData"))
            .and_then(JsonValue::as_object)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GridRow {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub cell: BTreeMap<String, JsonValue>,
}

impl GridRow {
    /// Trimmed text of `col_<idx>`; missing and null cells read as empty.
    pub fn cell(&self, idx: usize) -> String {
        self.cell
            .get(&format!("col_{idx}"))
            .map(json_text)
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Membership number of the row's member.
    pub fn member(&self) -> String {
        self.cell(0)
    }
}

/// Scalar JSON as text: strings verbatim, numbers and booleans printed, null empty.
pub fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match &value {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(json_text(&value))
}

/// Decodes a page body. An HTML document where JSON is expected is how the extranet
/// reports an expired session.
pub fn decode_grid_body(body: &str, page: u32) -> Result<GridResponse, FetchError> {
    let head: String = body.trim_start().chars().take(16).collect::<String>().to_ascii_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return Err(FetchError::SessionExpired);
    }
    serde_json::from_str(body).map_err(|source| FetchError::InvalidBody { page, source })
}

/// Source of raw grid pages.
#[async_trait]
pub trait GridTransport: Send + Sync {
    async fn fetch_page(&self, query: &GridQuery, page: u32) -> Result<String, FetchError>;
}

/// Fetches grid pages from the extranet with the session id of a logged-in operator.
#[derive(Debug, Clone)]
pub struct HttpGridTransport {
    http: HttpFetcher,
    base_url: String,
    session_id: String,
    rows_per_page: u32,
}

impl HttpGridTransport {
    pub fn new(
        http: HttpFetcher,
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        rows_per_page: u32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session_id: session_id.into(),
            rows_per_page: rows_per_page.max(1),
        }
    }
}

#[async_trait]
impl GridTransport for HttpGridTransport {
    async fn fetch_page(&self, query: &GridQuery, page: u32) -> Result<String, FetchError> {
        let params = query.params(&self.session_id, self.rows_per_page, page);
        let response = self.http.get(&self.base_url, &params).await?;
        Ok(response.text())
    }
}

//! Google Sheets row source.
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::config::{Credentials, Sheets};
use crate::model::RawRow;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/";

/// Header plus data rows of one sheet range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRows {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<SheetRows>;
}

#[derive(Deserialize, Debug)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// First row is the header; later rows are padded to its width. Blank lines
/// are skipped.
pub fn rows_from_values(values: &[Vec<Value>]) -> Result<SheetRows> {
    let (first, rest) = values
        .split_first()
        .ok_or_else(|| anyhow!("no data returned from sheet"))?;
    let header: Vec<String> = first.iter().map(|v| cell_text(v).trim().to_string()).collect();
    if header.iter().all(String::is_empty) {
        bail!("sheet header row is empty");
    }

    let mut rows = Vec::with_capacity(rest.len());
    for (i, line) in rest.iter().enumerate() {
        let cells: Vec<String> = line.iter().map(cell_text).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        if cells.len() > header.len() {
            warn!(line = i + 2, extra = cells.len() - header.len(), "row wider than header");
        }
        rows.push(RawRow::from_header(&header, &cells));
    }
    Ok(SheetRows { header, rows })
}

#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: Url,
    spreadsheet_id: String,
    range: String,
    credentials: Credentials,
}

impl fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsClient")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl SheetsClient {
    pub fn from_config(cfg: &Sheets) -> Self {
        let base_url = Url::parse(SHEETS_API_BASE).expect("valid default Sheets URL");
        Self::with_base_url(cfg, base_url)
    }

    pub fn with_base_url(cfg: &Sheets, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent(concat!("praylist/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            spreadsheet_id: cfg.spreadsheet_id.clone(),
            range: cfg.range.clone(),
            credentials: cfg.credentials.clone(),
        }
    }

    pub fn values_url(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", self.range.as_str()]);
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        match &self.credentials.access_token_file {
            Some(path) => {
                let token = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read token file {}", path.display()))?;
                Ok(Some(token.trim().to_string()))
            }
            None => Ok(None),
        }
    }

    pub fn build_request(&self, bearer: Option<&str>) -> Result<reqwest::Request> {
        let mut builder = self.http.get(self.values_url()?);
        if let Some(key) = &self.credentials.api_key {
            builder = builder.header("x-goog-api-key", key);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder.build().context("failed to build Sheets request")
    }
}

#[async_trait]
impl RowSource for SheetsClient {
    #[instrument(skip_all, fields(range = %self.range))]
    async fn fetch_rows(&self) -> Result<SheetRows> {
        let bearer = self.bearer_token().await?;
        let request = self.build_request(bearer.as_deref())?;
        debug!(url = %request.url().path(), "fetching sheet values");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to reach Google Sheets")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Google Sheets: {}", body);
            return Err(anyhow!("received 429 from Google Sheets: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("sheets error {}: {}", status, body));
        }

        let range: ValueRange = res
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("invalid Sheets response")?;
        rows_from_values(&range.values)
    }
}

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::notion::blocks::BlockNode;
use crate::notion::model::{Block, Created, ListResp, Page, RetrieveDatabaseResp};
use crate::publish::SectionPublisher;

pub mod blocks;
pub mod model;

const NOTION_API_BASE: &str = "https://api.notion.com/";
/// Notion accepts at most this many children per append request.
pub const MAX_CHILDREN_PER_REQUEST: usize = 100;

/// The Notion endpoints the publisher and the calendar use.
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// Every child block of `block_id`, following pagination.
    async fn list_children(&self, block_id: &str) -> Result<Vec<Block>>;
    async fn delete_block(&self, block_id: &str) -> Result<()>;
    /// Append up to `MAX_CHILDREN_PER_REQUEST` blocks; returns their new ids
    /// in order.
    async fn append_children(&self, parent_id: &str, children: Vec<Value>) -> Result<Vec<String>>;
    /// All pages of `database_id` matching `filter` (pass `Value::Null` for none).
    async fn query_database(&self, database_id: &str, filter: Value) -> Result<Vec<Page>>;
    async fn create_page(&self, body: &Value) -> Result<String>;
    async fn update_page(&self, page_id: &str, body: &Value) -> Result<()>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
    page_id: String,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("page_id", &self.page_id)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String, page_id: String) -> Self {
        let base_url = Url::parse(NOTION_API_BASE).expect("valid default Notion URL");
        Self::with_base_url(token, version, page_id, base_url)
    }

    pub fn with_base_url(token: String, version: String, page_id: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent(concat!("praylist/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            version,
            page_id,
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid Notion base URL")?;
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version);
        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .json(body);
        }
        builder.build().context("failed to build Notion request")
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let request = self.build_request(method, path, body)?;
        debug!(method = %request.method(), url = %request.url(), "sending notion request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Notion")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Notion: {}", body);
            return Err(anyhow!("received 429 from Notion: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("notion error {}: {}", status, body));
        }

        res.json::<T>().await.context("invalid Notion response")
    }

    pub async fn retrieve_database(&self, database_id: &str) -> Result<RetrieveDatabaseResp> {
        self.execute(Method::GET, &format!("v1/databases/{}", database_id), None)
            .await
            .with_context(|| format!("failed to retrieve database {}", database_id))
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn list_children(&self, block_id: &str) -> Result<Vec<Block>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("v1/blocks/{}/children?page_size=100", block_id);
            if let Some(c) = &cursor {
                path.push_str("&start_cursor=");
                path.push_str(c);
            }
            let page: ListResp<Block> = self
                .execute(Method::GET, &path, None)
                .await
                .with_context(|| format!("failed to list children of {}", block_id))?;
            out.extend(page.results);
            match page.next_cursor.filter(|_| page.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(out)
    }

    async fn delete_block(&self, block_id: &str) -> Result<()> {
        let _: Value = self
            .execute(Method::DELETE, &format!("v1/blocks/{}", block_id), None)
            .await
            .with_context(|| format!("failed to delete block {}", block_id))?;
        Ok(())
    }

    async fn append_children(&self, parent_id: &str, children: Vec<Value>) -> Result<Vec<String>> {
        let body = json!({ "children": children });
        let resp: ListResp<Created> = self
            .execute(
                Method::PATCH,
                &format!("v1/blocks/{}/children", parent_id),
                Some(&body),
            )
            .await
            .with_context(|| format!("failed to append children to {}", parent_id))?;
        Ok(resp.results.into_iter().map(|c| c.id).collect())
    }

    async fn query_database(&self, database_id: &str, filter: Value) -> Result<Vec<Page>> {
        let path = format!("v1/databases/{}/query", database_id);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": 100 });
            if !filter.is_null() {
                body["filter"] = filter.clone();
            }
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let page: ListResp<Page> = self
                .execute(Method::POST, &path, Some(&body))
                .await
                .with_context(|| format!("failed to query database {}", database_id))?;
            out.extend(page.results);
            match page.next_cursor.filter(|_| page.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(out)
    }

    async fn create_page(&self, body: &Value) -> Result<String> {
        let created: Created = self
            .execute(Method::POST, "v1/pages", Some(body))
            .await
            .context("failed to create Notion page")?;
        Ok(created.id)
    }

    async fn update_page(&self, page_id: &str, body: &Value) -> Result<()> {
        let _: Value = self
            .execute(Method::PATCH, &format!("v1/pages/{}", page_id), Some(body))
            .await
            .with_context(|| format!("failed to update page {}", page_id))?;
        Ok(())
    }
}

/// Append a block tree one level at a time so neither the per-request
/// child limit nor the nesting-depth limit is hit.
pub async fn append_tree(api: &dyn NotionApi, parent_id: &str, nodes: &[BlockNode]) -> Result<usize> {
    let mut queue: VecDeque<(String, &[BlockNode])> = VecDeque::new();
    queue.push_back((parent_id.to_string(), nodes));
    let mut appended = 0;

    while let Some((parent, level)) = queue.pop_front() {
        for chunk in level.chunks(MAX_CHILDREN_PER_REQUEST) {
            let payload = chunk.iter().map(|n| n.block.clone()).collect();
            let ids = api.append_children(&parent, payload).await?;
            if ids.len() != chunk.len() {
                return Err(anyhow!(
                    "notion returned {} ids for {} appended blocks",
                    ids.len(),
                    chunk.len()
                ));
            }
            appended += ids.len();
            for (id, node) in ids.into_iter().zip(chunk) {
                if !node.children.is_empty() {
                    queue.push_back((id, node.children.as_slice()));
                }
            }
        }
    }
    Ok(appended)
}

/// Which existing blocks a section replacement removes, and whether the
/// marker heading has to be recreated.
pub fn plan_replacement<'b>(existing: &'b [Block], marker: &str) -> (Vec<&'b str>, bool) {
    match existing
        .iter()
        .position(|b| b.is_heading() && b.plain_text().trim() == marker.trim())
    {
        Some(pos) => (existing[pos + 1..].iter().map(|b| b.id.as_str()).collect(), false),
        None => (existing.iter().map(|b| b.id.as_str()).collect(), true),
    }
}

/// Replace everything below `marker` on `page_id` with `content`.
pub async fn replace_section(
    api: &dyn NotionApi,
    page_id: &str,
    marker: &str,
    content: &[BlockNode],
) -> Result<()> {
    let existing = api.list_children(page_id).await?;
    let (stale, needs_marker) = plan_replacement(&existing, marker);
    info!(
        existing = existing.len(),
        deleting = stale.len(),
        needs_marker,
        "replacing section"
    );
    for id in stale {
        api.delete_block(id).await?;
    }

    let mut nodes = Vec::with_capacity(content.len() + 1);
    if needs_marker {
        nodes.push(BlockNode::leaf(blocks::heading_1(marker, Some("blue"))));
    }
    nodes.extend_from_slice(content);
    let appended = append_tree(api, page_id, &nodes).await?;
    info!(appended, "section published");
    Ok(())
}

#[async_trait]
impl SectionPublisher for NotionClient {
    #[instrument(skip_all, fields(page_id = %self.page_id))]
    async fn replace_section(&self, marker: &str, content: &[BlockNode]) -> Result<()> {
        replace_section(self, &self.page_id, marker, content).await
    }
}

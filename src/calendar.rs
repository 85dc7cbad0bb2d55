//! Mirrors dated records into a Notion calendar database.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::Calendar;
use crate::model::ProcessedBatch;
use crate::notion::blocks::{paragraph, rich_text};
use crate::notion::model::Page;
use crate::notion::{NotionApi, NotionClient};
use crate::publish::record_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: String,
    pub date: NaiveDate,
    pub body: String,
    pub batch_id: String,
}

#[async_trait]
pub trait CalendarSink: Send + Sync {
    async fn upsert_event(&self, event: &CalendarEvent) -> Result<()>;
    /// Archive every entry written by an earlier run; returns how many.
    async fn archive_stale(&self, batch_id: &str) -> Result<usize>;
}

/// One event per record that carries an event date, in batch order.
pub fn events(batch: &ProcessedBatch, batch_id: &str) -> Vec<CalendarEvent> {
    batch
        .records()
        .filter_map(|r| {
            r.event_date.map(|date| CalendarEvent {
                title: format!("{} ({})", r.target_name, r.submitter),
                date,
                body: record_text(r),
                batch_id: batch_id.to_string(),
            })
        })
        .collect()
}

/// Push every dated record, then archive leftovers from earlier runs.
/// A failing event is logged and skipped, and the archive pass is then left
/// out so that event's previous entry survives. Returns how many were written.
pub async fn sync_events(
    sink: &dyn CalendarSink,
    batch_id: &str,
    events: &[CalendarEvent],
) -> Result<usize> {
    let mut written = 0;
    let mut failed = 0;
    for event in events {
        match sink.upsert_event(event).await {
            Ok(()) => written += 1,
            Err(err) => {
                failed += 1;
                warn!(title = %event.title, date = %event.date, "calendar upsert failed: {:#}", err)
            }
        }
    }
    if failed > 0 {
        warn!(written, failed, "skipping calendar archive pass");
        return Ok(written);
    }
    let archived = sink.archive_stale(batch_id).await?;
    info!(written, archived, "calendar synced");
    Ok(written)
}

/// Live pages tagged by another run. Untagged pages were not written by the
/// pipeline and are left alone.
pub fn stale_pages<'p>(pages: &'p [Page], tag_property: &str, batch_id: &str) -> Vec<&'p Page> {
    pages
        .iter()
        .filter(|p| {
            let tag = p.text_property(tag_property);
            !p.archived && !tag.trim().is_empty() && tag.trim() != batch_id
        })
        .collect()
}

pub struct NotionCalendar<A = NotionClient> {
    client: A,
    cfg: Calendar,
}

impl<A: NotionApi> NotionCalendar<A> {
    pub fn new(client: A, cfg: Calendar) -> Self {
        Self { client, cfg }
    }

    fn tag(&self, batch_id: &str) -> Value {
        json!({ "rich_text": rich_text(batch_id, None) })
    }

    fn new_page_body(&self, event: &CalendarEvent) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(
            self.cfg.title_property.clone(),
            json!({ "title": rich_text(&event.title, None) }),
        );
        properties.insert(
            self.cfg.date_property.clone(),
            json!({ "date": { "start": event.date.format("%Y-%m-%d").to_string() } }),
        );
        properties.insert(self.cfg.tag_property.clone(), self.tag(&event.batch_id));
        json!({
            "parent": { "database_id": self.cfg.database_id },
            "properties": properties,
            "children": [paragraph(&event.body)]
        })
    }

    fn match_filter(&self, event: &CalendarEvent) -> Value {
        json!({
            "and": [
                { "property": self.cfg.title_property, "title": { "equals": event.title } },
                { "property": self.cfg.date_property, "date": { "equals": event.date.format("%Y-%m-%d").to_string() } }
            ]
        })
    }
}

#[async_trait]
impl<A: NotionApi> CalendarSink for NotionCalendar<A> {
    #[instrument(skip_all, fields(title = %event.title))]
    async fn upsert_event(&self, event: &CalendarEvent) -> Result<()> {
        let existing = self
            .client
            .query_database(&self.cfg.database_id, self.match_filter(event))
            .await?;
        match existing.into_iter().find(|p| !p.archived) {
            Some(page) => {
                debug!(page_id = %page.id, "updating calendar entry");
                let mut properties = serde_json::Map::new();
                properties.insert(self.cfg.tag_property.clone(), self.tag(&event.batch_id));
                self.client
                    .update_page(&page.id, &json!({ "properties": properties }))
                    .await
            }
            None => {
                let id = self
                    .client
                    .create_page(&self.new_page_body(event))
                    .await
                    .context("failed to create calendar entry")?;
                debug!(page_id = %id, "created calendar entry");
                Ok(())
            }
        }
    }

    #[instrument(skip_all)]
    async fn archive_stale(&self, batch_id: &str) -> Result<usize> {
        let pages = self
            .client
            .query_database(&self.cfg.database_id, Value::Null)
            .await?;
        let stale = stale_pages(&pages, &self.cfg.tag_property, batch_id);
        for page in &stale {
            self.client
                .update_page(&page.id, &json!({ "archived": true }))
                .await?;
        }
        Ok(stale.len())
    }
}

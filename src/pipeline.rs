//! One pass: fetch rows, build the batch, publish, mirror dates, report.
use chrono::Local;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::assignment::AssignmentRouter;
use crate::calendar::{self, CalendarSink};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::model::ProcessedBatch;
use crate::notion::blocks::BlockNode;
use crate::publish::{layout, SectionPublisher};
use crate::records::{check_headers, PrayerRecordBuilder};
use crate::report::{summarize, Report};
use crate::sheets::RowSource;

#[derive(Debug)]
pub struct RunOutcome {
    pub batch_id: String,
    pub batch: ProcessedBatch,
    pub blocks: Vec<BlockNode>,
    pub report: Report,
    pub published: bool,
    /// Calendar entries written, when a calendar is configured and the run
    /// was not a dry run.
    pub calendar_written: Option<usize>,
}

pub struct Pipeline<'a> {
    cfg: &'a Config,
    router: &'a AssignmentRouter,
    source: &'a dyn RowSource,
    publisher: &'a dyn SectionPublisher,
    calendar: Option<&'a dyn CalendarSink>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a Config,
        router: &'a AssignmentRouter,
        source: &'a dyn RowSource,
        publisher: &'a dyn SectionPublisher,
    ) -> Self {
        Self {
            cfg,
            router,
            source,
            publisher,
            calendar: None,
        }
    }

    pub fn with_calendar(mut self, calendar: &'a dyn CalendarSink) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Log table entries that will publish the same records twice.
    pub fn warn_duplicates(&self) {
        for (submitter, managers) in self.router.duplicates() {
            warn!(
                submitter,
                managers = %managers.join(", "),
                "submitter listed under several managers without a split; each receives every record"
            );
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, dry_run: bool) -> Result<RunOutcome> {
        let started = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        info!(%batch_id, "pipeline run started");

        let source = self.source;
        let sheet = self
            .cfg
            .sheets
            .retry
            .run("fetch sheet rows", |_| source.fetch_rows())
            .await
            .map_err(PipelineError::Connection)?;
        info!(rows = sheet.rows.len(), "fetched sheet rows");

        let missing = check_headers(&sheet.header, &self.cfg.validation.required_columns);
        if !missing.is_empty() {
            return Err(PipelineError::Processing(format!(
                "sheet is missing required columns: {}",
                missing.join(", ")
            )));
        }

        let batch = PrayerRecordBuilder::new(&self.cfg.columns, &self.cfg.validation)
            .build(&sheet.rows, Local::now());
        let mut report = summarize(&batch, self.router)?;
        for submitter in &report.unmapped {
            warn!(submitter = %submitter, "submitter has no manager");
        }
        let blocks = layout(&batch, self.router, self.cfg.notion.common_prayers.as_deref())?;
        info!(
            records = batch.total_records(),
            submitters = batch.groups.len(),
            blocks = blocks.iter().map(BlockNode::count).sum::<usize>(),
            "batch built"
        );

        if dry_run {
            info!("dry run: skipping Notion");
            report.elapsed = started.elapsed();
            info!("\n{}", report);
            return Ok(RunOutcome {
                batch_id,
                batch,
                blocks,
                report,
                published: false,
                calendar_written: None,
            });
        }

        let publisher = self.publisher;
        let marker = self.cfg.notion.section_marker.as_str();
        let blocks_ref = &blocks;
        let published = self
            .cfg
            .notion
            .retry
            .run("publish section", |_| publisher.replace_section(marker, blocks_ref))
            .await;
        if let Err(err) = published {
            report.elapsed = started.elapsed();
            info!("\n{}", report);
            return Err(PipelineError::Connection(err));
        }

        let calendar_written = match self.calendar {
            Some(sink) => {
                let events = calendar::events(&batch, &batch_id);
                match calendar::sync_events(sink, &batch_id, &events).await {
                    Ok(n) => Some(n),
                    Err(err) => {
                        warn!("calendar sync failed: {:#}", err);
                        None
                    }
                }
            }
            None => None,
        };

        report.elapsed = started.elapsed();
        info!("\n{}", report);
        Ok(RunOutcome {
            batch_id,
            batch,
            blocks,
            report,
            published: true,
            calendar_written,
        })
    }
}

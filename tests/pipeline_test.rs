use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use praylist::calendar::{CalendarEvent, CalendarSink};
use praylist::config::{self, Config};
use praylist::model::RawRow;
use praylist::notion::blocks::{plain_text, BlockNode};
use praylist::publish::SectionPublisher;
use praylist::retry::RetryPolicy;
use praylist::sheets::{RowSource, SheetRows};
use praylist::{Pipeline, PipelineError};

const HEADER: [&str; 9] = [
    "타임스탬프",
    "이름",
    "교회",
    "이름(구도자)",
    "성별",
    "나이 (출생연도로 기입 부탁드립니다 ex. 98년생)",
    "관계 (ex 사촌동생, 학교 친구, 직장 동료, 본인)",
    "구체적인 기도제목 (가능한 경우 1. 2. 등 번호로 기입)",
    "날짜",
];

fn sheet(lines: &[[&str; 9]]) -> SheetRows {
    let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
    let rows = lines
        .iter()
        .map(|l| {
            let values: Vec<String> = l.iter().map(|v| v.to_string()).collect();
            RawRow::from_header(&header, &values)
        })
        .collect();
    SheetRows { header, rows }
}

fn line<'a>(submitter: &'a str, target: &'a str, date: &'a str) -> [&'a str; 9] {
    [
        "2025. 3. 28 오후 11:24:19",
        submitter,
        "서울교회",
        target,
        "여",
        "98년생",
        "친구",
        "1. 건강을 위해\n\n\n2. 가정을 위해",
        date,
    ]
}

fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.sheets.retry = RetryPolicy::new(3, 1, 1.0);
    cfg.notion.retry = RetryPolicy::new(2, 1, 1.0);
    cfg
}

#[derive(Clone, Default)]
struct RecordingSource {
    responses: Arc<Mutex<VecDeque<Result<SheetRows>>>>,
    calls: Arc<Mutex<usize>>,
}

impl RecordingSource {
    fn with_responses(responses: Vec<Result<SheetRows>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait::async_trait]
impl RowSource for RecordingSource {
    async fn fetch_rows(&self) -> Result<SheetRows> {
        *self.calls.lock().await += 1;
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response")))
    }
}

#[derive(Clone, Default)]
struct RecordingPublisher {
    failures: Arc<Mutex<VecDeque<anyhow::Error>>>,
    calls: Arc<Mutex<Vec<(String, Vec<BlockNode>)>>>,
}

impl RecordingPublisher {
    fn failing(times: usize) -> Self {
        Self {
            failures: Arc::new(Mutex::new(
                (0..times).map(|i| anyhow!("notion down {}", i)).collect(),
            )),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<(String, Vec<BlockNode>)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl SectionPublisher for RecordingPublisher {
    async fn replace_section(&self, marker: &str, content: &[BlockNode]) -> Result<()> {
        self.calls
            .lock()
            .await
            .push((marker.to_string(), content.to_vec()));
        match self.failures.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingCalendar {
    upserts: Arc<Mutex<Vec<CalendarEvent>>>,
    archived_for: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl CalendarSink for RecordingCalendar {
    async fn upsert_event(&self, event: &CalendarEvent) -> Result<()> {
        self.upserts.lock().await.push(event.clone());
        Ok(())
    }

    async fn archive_stale(&self, batch_id: &str) -> Result<usize> {
        self.archived_for.lock().await.push(batch_id.to_string());
        Ok(0)
    }
}

fn text(node: &BlockNode) -> String {
    let typ = node.block_type().to_string();
    plain_text(&node.block[typ.as_str()]["rich_text"])
}

fn manager<'a>(blocks: &'a [BlockNode], name: &str) -> &'a BlockNode {
    blocks
        .iter()
        .find(|b| b.block_type() == "toggle" && text(b) == format!("📌 {}", name))
        .unwrap()
}

#[tokio::test]
async fn publishes_routed_sections_and_calendar() {
    let cfg = test_config();
    let router = cfg.router().unwrap();
    let rows = sheet(&[
        line("손승아", "가", ""),
        line("박민성", "나", "2025. 5. 4."),
        line("박민성", "다", ""),
        line("박민성", "라", ""),
        line("모르는사람", "마", ""),
        line("김가온", "", "someday"),
    ]);
    let source = RecordingSource::with_responses(vec![Ok(rows)]);
    let publisher = RecordingPublisher::default();
    let calendar = RecordingCalendar::default();

    let outcome = Pipeline::new(&cfg, &router, &source, &publisher)
        .with_calendar(&calendar)
        .run(false)
        .await
        .unwrap();

    assert!(outcome.published);
    assert_eq!(outcome.calendar_written, Some(1));
    assert_eq!(outcome.report.total_records, 6);
    assert_eq!(outcome.report.unmapped, vec!["모르는사람"]);
    assert_eq!(outcome.report.flagged.len(), 1);
    assert_eq!(outcome.report.flagged[0].submitter, "김가온");

    let calls = publisher.calls().await;
    assert_eq!(calls.len(), 1);
    let (marker, blocks) = &calls[0];
    assert_eq!(marker, "📖 담당자별 기도제목");
    assert_eq!(blocks, &outcome.blocks);
    assert_eq!(text(&blocks[2]), "✝️ 공통 기도제목");

    let first = manager(blocks, "이소원");
    let titles: Vec<String> = first.children.iter().map(text).collect();
    assert_eq!(titles, vec!["🙏 박민성님의 기도제목 (1/2)"]);
    assert_eq!(first.children[0].children.len(), 2);
    let second = manager(blocks, "김나경");
    assert_eq!(text(&second.children[0]), "🙏 박민성님의 기도제목 (2/2)");
    assert_eq!(second.children[0].children.len(), 1);
    assert!(text(&second.children[0].children[0]).contains("🙏 구도자: 라 (여, 98년생)"));
    assert!(text(&second.children[0].children[0]).contains("1. 건강을 위해\n\n2. 가정을 위해"));
    assert!(manager(blocks, "조용훈").children.is_empty());

    let upserts = calendar.upserts.lock().await.clone();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].title, "나 (박민성)");
    assert_eq!(upserts[0].batch_id, outcome.batch_id);
    assert_eq!(*calendar.archived_for.lock().await, vec![outcome.batch_id.clone()]);
}

#[tokio::test]
async fn source_failures_are_retried() {
    let cfg = test_config();
    let router = cfg.router().unwrap();
    let source = RecordingSource::with_responses(vec![
        Err(anyhow!("timeout")),
        Err(anyhow!("503")),
        Ok(sheet(&[line("손승아", "가", "")])),
    ]);
    let publisher = RecordingPublisher::default();

    let outcome = Pipeline::new(&cfg, &router, &source, &publisher)
        .run(false)
        .await
        .unwrap();
    assert_eq!(source.calls().await, 3);
    assert_eq!(outcome.report.total_records, 1);
    assert_eq!(outcome.calendar_written, None);
}

#[tokio::test]
async fn source_gives_up_with_connection_error() {
    let cfg = test_config();
    let router = cfg.router().unwrap();
    let source = RecordingSource::with_responses(vec![
        Err(anyhow!("timeout 1")),
        Err(anyhow!("timeout 2")),
        Err(anyhow!("timeout 3")),
    ]);
    let publisher = RecordingPublisher::default();

    let err = Pipeline::new(&cfg, &router, &source, &publisher)
        .run(false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Connection(_)));
    assert!(err.to_string().contains("timeout 3"));
    assert_eq!(source.calls().await, 3);
    assert!(publisher.calls().await.is_empty());
}

#[tokio::test]
async fn missing_columns_stop_before_publishing() {
    let cfg = test_config();
    let router = cfg.router().unwrap();
    let header = vec!["타임스탬프".to_string(), "교회".to_string()];
    let source = RecordingSource::with_responses(vec![Ok(SheetRows {
        header,
        rows: Vec::new(),
    })]);
    let publisher = RecordingPublisher::default();

    let err = Pipeline::new(&cfg, &router, &source, &publisher)
        .run(false)
        .await
        .unwrap_err();
    match err {
        PipelineError::Processing(msg) => {
            assert!(msg.contains("이름, 이름(구도자)"), "{}", msg)
        }
        other => panic!("expected processing error, got {:?}", other),
    }
    assert_eq!(source.calls().await, 1);
    assert!(publisher.calls().await.is_empty());
}

#[tokio::test]
async fn publish_is_retried_then_fails() {
    let cfg = test_config();
    let router = cfg.router().unwrap();
    let source = RecordingSource::with_responses(vec![Ok(sheet(&[line("손승아", "가", "")]))]);

    let flaky = RecordingPublisher::failing(1);
    Pipeline::new(&cfg, &router, &source, &flaky)
        .run(false)
        .await
        .unwrap();
    assert_eq!(flaky.calls().await.len(), 2);

    let source = RecordingSource::with_responses(vec![Ok(sheet(&[line("손승아", "가", "")]))]);
    let down = RecordingPublisher::failing(5);
    let calendar = RecordingCalendar::default();
    let err = Pipeline::new(&cfg, &router, &source, &down)
        .with_calendar(&calendar)
        .run(false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Connection(_)));
    assert_eq!(down.calls().await.len(), 2);
    assert!(calendar.upserts.lock().await.is_empty());
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let cfg = test_config();
    let router = cfg.router().unwrap();
    let source = RecordingSource::with_responses(vec![Ok(sheet(&[line("박민성", "가", "2025-05-04")]))]);
    let publisher = RecordingPublisher::default();
    let calendar = RecordingCalendar::default();

    let outcome = Pipeline::new(&cfg, &router, &source, &publisher)
        .with_calendar(&calendar)
        .run(true)
        .await
        .unwrap();
    assert!(!outcome.published);
    assert!(publisher.calls().await.is_empty());
    assert!(calendar.upserts.lock().await.is_empty());
    assert!(!outcome.blocks.is_empty());
    assert_eq!(outcome.batch.total_records(), 1);
    assert_eq!(outcome.report.run_at, outcome.batch.last_updated);
    assert!(outcome.report.elapsed > std::time::Duration::ZERO);
}

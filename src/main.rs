use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use praylist::calendar::NotionCalendar;
use praylist::config;
use praylist::logging;
use praylist::notion::blocks::BlockNode;
use praylist::notion::NotionClient;
use praylist::sheets::SheetsClient;
use praylist::{Pipeline, PipelineError};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Fetch, build and report without touching Notion; prints the block tree
    #[arg(long)]
    dry_run: bool,

    /// Stay resident and run once a day at this local time (HH:MM)
    #[arg(long, value_parser = parse_daily_at)]
    daily_at: Option<NaiveTime>,

    /// Print an example configuration and exit
    #[arg(long)]
    print_example_config: bool,
}

fn parse_daily_at(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}

/// Next local instant at `at`, strictly after `now`.
fn next_run(now: DateTime<Local>, at: NaiveTime) -> DateTime<Local> {
    let mut day = now.date_naive();
    loop {
        let candidate = day.and_time(at);
        // a wall-clock time skipped by a DST jump resolves to the next day
        if let Some(t) = Local.from_local_datetime(&candidate).earliest() {
            if t > now {
                return t;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => return now + ChronoDuration::days(1),
        }
    }
}

async fn run_once(pipeline: &Pipeline<'_>, dry_run: bool) -> bool {
    match pipeline.run(dry_run).await {
        Ok(outcome) => {
            if dry_run {
                let tree: Vec<Value> = outcome.blocks.iter().map(BlockNode::to_json).collect();
                match serde_json::to_string_pretty(&tree) {
                    Ok(json) => println!("{}", json),
                    Err(err) => error!(?err, "failed to render block tree"),
                }
            }
            info!(
                batch_id = %outcome.batch_id,
                published = outcome.published,
                calendar = ?outcome.calendar_written,
                "pipeline finished"
            );
            true
        }
        Err(err) => {
            error!("pipeline failed: {}", err);
            false
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    if args.print_example_config {
        print!("{}", config::example());
        return ExitCode::SUCCESS;
    }

    let cfg = match config::load(Some(&args.config)) {
        Ok(cfg) => cfg,
        Err(err) => {
            if let Err(log_err) = logging::init(&config::Logging::default()) {
                eprintln!("{:#}", log_err);
            }
            error!("{}", PipelineError::from(err));
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = match logging::init(&cfg.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("{:#}", err);
            return ExitCode::FAILURE;
        }
    };
    let router = match cfg.router() {
        Ok(router) => router,
        Err(err) => {
            error!("{}", PipelineError::from(err));
            return ExitCode::FAILURE;
        }
    };

    let source = SheetsClient::from_config(&cfg.sheets);
    let notion = NotionClient::new(
        cfg.notion.token.clone(),
        cfg.notion.version.clone(),
        cfg.notion.page_id.clone(),
    );
    let calendar = cfg
        .notion
        .calendar
        .clone()
        .map(|cal| NotionCalendar::new(notion.clone(), cal));

    let mut pipeline = Pipeline::new(&cfg, &router, &source, &notion);
    if let Some(cal) = &calendar {
        pipeline = pipeline.with_calendar(cal);
    }
    pipeline.warn_duplicates();

    let Some(at) = args.daily_at else {
        return if run_once(&pipeline, args.dry_run).await {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    };

    info!(at = %at.format("%H:%M"), "starting daily scheduler");
    loop {
        let now = Local::now();
        let next = next_run(now, at);
        info!(next = %next.format("%Y-%m-%d %H:%M"), "waiting for next run");
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        run_once(&pipeline, args.dry_run).await;
    }
}

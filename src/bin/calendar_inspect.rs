use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use praylist::config;
use praylist::notion::{NotionApi, NotionClient};
use serde_json::Value;

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Database ID to inspect; defaults to notion.calendar.database_id
    #[arg(long)]
    db_id: Option<String>,

    /// How many pages to list
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let calendar = cfg.notion.calendar.as_ref();
    let db_id = args
        .db_id
        .or_else(|| calendar.map(|c| c.database_id.clone()))
        .ok_or_else(|| anyhow!("pass --db-id or configure notion.calendar"))?;

    let client = NotionClient::new(
        cfg.notion.token.clone(),
        cfg.notion.version.clone(),
        cfg.notion.page_id.clone(),
    );

    let db = client.retrieve_database(&db_id).await?;
    println!("Database ID: {}", db.id);
    println!("Properties:");
    for (name, prop) in &db.properties {
        println!("  {} -> {{ id: {}, type: {} }}", name, prop.id, prop.typ);
    }
    if let Some(cal) = calendar {
        for name in [&cal.title_property, &cal.date_property, &cal.tag_property] {
            if !db.properties.contains_key(name) {
                println!("  ! configured property '{}' is missing", name);
            }
        }
    }

    let pages = client.query_database(&db_id, Value::Null).await?;
    println!("Pages ({} total):", pages.len());
    for page in pages.iter().take(args.limit) {
        let title = calendar
            .map(|c| page.text_property(&c.title_property))
            .unwrap_or_default();
        let tag = calendar
            .map(|c| page.text_property(&c.tag_property))
            .unwrap_or_default();
        println!("  {} {:?} batch={:?} archived={}", page.id, title, tag, page.archived);
    }
    Ok(())
}

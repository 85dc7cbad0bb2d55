//! Configuration loader and validator for the prayer-list pipeline.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::assignment::{Assignment, AssignmentRouter, SplitAssignment};
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration:\n{0}")]
    Invalid(Problems),
}

/// Every validation problem found in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problems(pub Vec<String>);

impl fmt::Display for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {}", p)?;
        }
        Ok(())
    }
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub sheets: Sheets,
    #[serde(default)]
    pub notion: Notion,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub columns: Columns,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub splits: Vec<SplitAssignment>,
}

/// Google Sheets source. Identifiers may be left out of the file and
/// supplied through the environment; `validate` reports whatever is still
/// missing after overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sheets {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "sheets_retry")]
    pub retry: RetryPolicy,
}

impl Default for Sheets {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            range: String::new(),
            credentials: Credentials::default(),
            retry: sheets_retry(),
        }
    }
}

/// Exactly one of `api_key` / `access_token_file` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub access_token_file: Option<PathBuf>,
}

/// Notion target page and optional calendar database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notion {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub page_id: String,
    #[serde(default = "default_section_marker")]
    pub section_marker: String,
    #[serde(default)]
    pub common_prayers: Option<String>,
    #[serde(default)]
    pub calendar: Option<Calendar>,
    #[serde(default = "notion_retry")]
    pub retry: RetryPolicy,
}

impl Default for Notion {
    fn default() -> Self {
        Self {
            token: String::new(),
            version: String::new(),
            page_id: String::new(),
            section_marker: default_section_marker(),
            common_prayers: None,
            calendar: None,
            retry: notion_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Calendar {
    pub database_id: String,
    pub title_property: String,
    pub date_property: String,
    pub tag_property: String,
}

/// Log level and optional rolling log file. Console output is always on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Logging {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub rotation: Rotation,
    /// Rotated files kept next to the active one.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            rotation: Rotation::default(),
            max_files: default_max_files(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Sheet header names for each record field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Columns {
    pub timestamp: String,
    pub submitter: String,
    pub church: String,
    pub target_name: String,
    pub gender: String,
    pub age: String,
    pub relationship: String,
    pub prayer_content: String,
    #[serde(default)]
    pub event_date: Option<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            timestamp: "타임스탬프".into(),
            submitter: "이름".into(),
            church: "교회".into(),
            target_name: "이름(구도자)".into(),
            gender: "성별".into(),
            age: "나이 (출생연도로 기입 부탁드립니다 ex. 98년생)".into(),
            relationship: "관계 (ex 사촌동생, 학교 친구, 직장 동료, 본인)".into(),
            prayer_content: "구체적인 기도제목 (가능한 경우 1. 2. 등 번호로 기입)".into(),
            event_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validation {
    pub required_columns: Vec<String>,
    pub min_content_length: usize,
    pub max_content_length: usize,
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            required_columns: vec!["타임스탬프".into(), "이름".into(), "이름(구도자)".into()],
            min_content_length: 10,
            max_content_length: 2000,
        }
    }
}

fn default_section_marker() -> String {
    "📖 담당자별 기도제목".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_files() -> usize {
    5
}

fn sheets_retry() -> RetryPolicy {
    RetryPolicy::new(4, 2_000, 2.0)
}

fn notion_retry() -> RetryPolicy {
    RetryPolicy::new(3, 3_000, 2.0)
}

impl Config {
    /// Build the router for the assignment table. `load` has already checked
    /// the table, so this only fails for hand-built configs.
    pub fn router(&self) -> Result<AssignmentRouter, ConfigError> {
        AssignmentRouter::new(self.assignments.clone(), self.splits.clone())
            .map_err(|problems| ConfigError::Invalid(Problems(problems)))
    }

    /// Secrets may come from the environment instead of the YAML file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = v;
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.sheets.credentials.api_key = Some(v);
        }
        if let Some(v) = get("NOTION_TOKEN") {
            self.notion.token = v;
        }
        if let Some(v) = get("NOTION_PAGE_ID") {
            self.notion.page_id = v;
        }
        if let Some(v) = get("NOTION_CALENDAR_DATABASE_ID") {
            if let Some(cal) = self.notion.calendar.as_mut() {
                cal.database_id = v;
            }
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    load_with_env(path, |key| std::env::var(key).ok())
}

/// `load` with an explicit environment lookup.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides(lookup);
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance, reporting every problem at once.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let mut problems = Vec::new();
    let mut require = |value: &str, name: &str| {
        if value.trim().is_empty() {
            problems.push(format!("{} must be non-empty", name));
        }
    };

    require(&cfg.sheets.spreadsheet_id, "sheets.spreadsheet_id");
    require(&cfg.sheets.range, "sheets.range");
    require(&cfg.notion.token, "notion.token");
    require(&cfg.notion.version, "notion.version");
    require(&cfg.notion.page_id, "notion.page_id");
    require(&cfg.notion.section_marker, "notion.section_marker");

    let c = &cfg.columns;
    require(&c.timestamp, "columns.timestamp");
    require(&c.submitter, "columns.submitter");
    require(&c.church, "columns.church");
    require(&c.target_name, "columns.target_name");
    require(&c.gender, "columns.gender");
    require(&c.age, "columns.age");
    require(&c.relationship, "columns.relationship");
    require(&c.prayer_content, "columns.prayer_content");
    if let Some(event_date) = &c.event_date {
        require(event_date, "columns.event_date");
    }

    if let Some(cal) = &cfg.notion.calendar {
        require(&cal.database_id, "notion.calendar.database_id");
        require(&cal.title_property, "notion.calendar.title_property");
        require(&cal.date_property, "notion.calendar.date_property");
        require(&cal.tag_property, "notion.calendar.tag_property");
    }

    let creds = &cfg.sheets.credentials;
    let api_key = creds.api_key.as_deref().filter(|k| !k.trim().is_empty());
    match (api_key, &creds.access_token_file) {
        (None, None) => problems.push(
            "sheets.credentials needs api_key or access_token_file".to_string(),
        ),
        (Some(_), Some(_)) => problems.push(
            "sheets.credentials must set only one of api_key / access_token_file".to_string(),
        ),
        (None, Some(file)) if !file.exists() => problems.push(format!(
            "sheets.credentials.access_token_file not found: {}",
            file.display()
        )),
        _ => {}
    }

    let v = &cfg.validation;
    if v.required_columns.is_empty() {
        problems.push("validation.required_columns must list at least one column".to_string());
    }
    if v.required_columns.iter().any(|col| col.trim().is_empty()) {
        problems.push("validation.required_columns must not contain blank names".to_string());
    }
    if v.min_content_length > v.max_content_length {
        problems.push(format!(
            "validation.min_content_length ({}) exceeds max_content_length ({})",
            v.min_content_length, v.max_content_length
        ));
    }

    if cfg.sheets.retry.max_attempts == 0 {
        problems.push("sheets.retry.max_attempts must be > 0".to_string());
    }
    if cfg.notion.retry.max_attempts == 0 {
        problems.push("notion.retry.max_attempts must be > 0".to_string());
    }

    let log = &cfg.logging;
    if let Err(err) = tracing_subscriber::EnvFilter::try_new(&log.level) {
        problems.push(format!("logging.level '{}' is not a valid filter: {}", log.level, err));
    }
    if let Some(file) = &log.file {
        if file.file_name().is_none() {
            problems.push(format!("logging.file must name a file: {}", file.display()));
        }
    }
    if log.max_files == 0 {
        problems.push("logging.max_files must be > 0".to_string());
    }

    if cfg.assignments.is_empty() {
        problems.push("assignments must list at least one manager".to_string());
    }
    if let Err(table_problems) =
        AssignmentRouter::new(cfg.assignments.clone(), cfg.splits.clone())
    {
        problems.extend(table_problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(Problems(problems)))
    }
}

/// Example configuration, also printed by `praylist --print-example-config`.
pub fn example() -> &'static str {
    r#"sheets:
  spreadsheet_id: "YOUR_SPREADSHEET_ID"
  range: "Prayer_Requests!A:Z"
  credentials:
    api_key: "YOUR_GOOGLE_API_KEY"
  retry:
    max_attempts: 4
    base_delay_ms: 2000
    multiplier: 2.0

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
  page_id: "NOTION_PAGE_ID"
  section_marker: "📖 담당자별 기도제목"
  common_prayers: |
    1. 서울CBF의 모든 행사를 하나님께서 주관하여 주소서

    2. 서로 사랑하고 섬기고 격려하는 모임이 되게 하소서
  calendar:
    database_id: "NOTION_CALENDAR_DATABASE_ID"
    title_property: "이름"
    date_property: "날짜"
    tag_property: "배치"
  retry:
    max_attempts: 3
    base_delay_ms: 3000
    multiplier: 2.0

logging:
  level: "info"
  file: "logs/praylist.log"
  rotation: "daily"
  max_files: 7

columns:
  timestamp: "타임스탬프"
  submitter: "이름"
  church: "교회"
  target_name: "이름(구도자)"
  gender: "성별"
  age: "나이 (출생연도로 기입 부탁드립니다 ex. 98년생)"
  relationship: "관계 (ex 사촌동생, 학교 친구, 직장 동료, 본인)"
  prayer_content: "구체적인 기도제목 (가능한 경우 1. 2. 등 번호로 기입)"
  event_date: "날짜"

validation:
  required_columns: ["타임스탬프", "이름", "이름(구도자)"]
  min_content_length: 10
  max_content_length: 2000

assignments:
  - manager: "박지민"
    submitters: ["손승아"]
  - manager: "한사라"
    submitters: ["김가온"]
  - manager: "김가온"
    submitters: ["한사라"]
  - manager: "조용훈"
    submitters: ["김지수"]
  - manager: "이소원"
    submitters: ["김나경", "박민성"]
  - manager: "김나경"
    submitters: ["박민성"]

splits:
  - submitter: "박민성"
    managers: ["이소원", "김나경"]
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    fn problems(cfg: &Config) -> Vec<String> {
        match validate(cfg) {
            Err(ConfigError::Invalid(Problems(p))) => p,
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.assignments.len(), 6);
        assert_eq!(cfg.splits[0].managers, vec!["이소원", "김나경"]);
        assert_eq!(cfg.sheets.retry.max_attempts, 4);
        assert_eq!(cfg.columns.event_date.as_deref(), Some("날짜"));
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let yaml = r#"
sheets:
  spreadsheet_id: "s"
  range: "A:Z"
  credentials: { api_key: "k" }
notion:
  token: "t"
  version: "2022-06-28"
  page_id: "p"
assignments:
  - manager: "A"
    submitters: ["X"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.columns, Columns::default());
        assert_eq!(cfg.validation, Validation::default());
        assert_eq!(cfg.notion.section_marker, "📖 담당자별 기도제목");
        assert_eq!(cfg.notion.retry, RetryPolicy::new(3, 3_000, 2.0));
        assert!(cfg.notion.calendar.is_none());
        assert!(cfg.splits.is_empty());
        assert_eq!(cfg.logging, Logging::default());
        assert_eq!(cfg.logging.rotation, Rotation::Daily);
    }

    #[test]
    fn omitted_identifiers_are_all_reported() {
        let yaml = r#"
sheets:
  credentials: { api_key: "k" }
notion:
  version: "2022-06-28"
assignments:
  - manager: "A"
    submitters: ["X"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            problems(&cfg),
            vec![
                "sheets.spreadsheet_id must be non-empty",
                "sheets.range must be non-empty",
                "notion.token must be non-empty",
                "notion.page_id must be non-empty",
            ]
        );
    }

    #[test]
    fn environment_supplies_identifiers_left_out_of_file() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(
            &p,
            r#"
sheets:
  range: "A:Z"
notion:
  version: "2022-06-28"
assignments:
  - manager: "A"
    submitters: ["X"]
"#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("SPREADSHEET_ID", "sheet-env"),
            ("GOOGLE_API_KEY", "key-env"),
            ("NOTION_TOKEN", "token-env"),
            ("NOTION_PAGE_ID", "page-env"),
        ]
        .into_iter()
        .collect();
        let cfg = load_with_env(&p, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.sheets.spreadsheet_id, "sheet-env");
        assert_eq!(cfg.sheets.credentials.api_key.as_deref(), Some("key-env"));
        assert_eq!(cfg.notion.token, "token-env");
        assert_eq!(cfg.notion.page_id, "page-env");

        let err = load_with_env(&p, |_| None).unwrap_err();
        match err {
            ConfigError::Invalid(Problems(p)) => assert_eq!(p.len(), 4, "{:?}", p),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn logging_section_is_checked() {
        let cfg = example_cfg();
        assert_eq!(cfg.logging.file.as_deref(), Some(Path::new("logs/praylist.log")));
        assert_eq!(cfg.logging.max_files, 7);

        let mut cfg = example_cfg();
        cfg.logging.level = "info,praylist=loud".into();
        cfg.logging.max_files = 0;
        cfg.logging.file = Some(PathBuf::from("/"));
        let p = problems(&cfg);
        assert_eq!(p.len(), 3, "{:?}", p);
        assert!(p[0].starts_with("logging.level"));
        assert!(p[1].starts_with("logging.file"));
        assert!(p[2].starts_with("logging.max_files"));
    }

    #[test]
    fn rotation_names_are_lowercase() {
        let log: Logging = serde_yaml::from_str("rotation: hourly").unwrap();
        assert_eq!(log.rotation, Rotation::Hourly);
        assert_eq!(log.level, "info");
        assert!(serde_yaml::from_str::<Logging>("rotation: weekly").is_err());
    }

    #[test]
    fn reports_all_missing_settings_at_once() {
        let mut cfg = example_cfg();
        cfg.sheets.spreadsheet_id = "".into();
        cfg.notion.token = " ".into();
        cfg.notion.page_id = "".into();
        let p = problems(&cfg);
        assert_eq!(p.len(), 3, "{:?}", p);
        assert!(p[0].contains("sheets.spreadsheet_id"));
        assert!(p[1].contains("notion.token"));
        assert!(p[2].contains("notion.page_id"));

        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("- sheets.spreadsheet_id must be non-empty"));
        assert!(err.contains("- notion.page_id must be non-empty"));
    }

    #[test]
    fn credentials_must_be_exactly_one() {
        let mut cfg = example_cfg();
        cfg.sheets.credentials = Credentials::default();
        assert!(problems(&cfg)[0].contains("api_key or access_token_file"));

        cfg.sheets.credentials = Credentials {
            api_key: Some("k".into()),
            access_token_file: Some("token.txt".into()),
        };
        assert!(problems(&cfg)[0].contains("only one"));

        cfg.sheets.credentials = Credentials {
            api_key: None,
            access_token_file: Some("/definitely/not/here/token.txt".into()),
        };
        assert!(problems(&cfg)[0].contains("not found"));
    }

    #[test]
    fn token_file_that_exists_is_accepted() {
        let td = tempdir().unwrap();
        let token = td.path().join("token.txt");
        fs::write(&token, "ya29.token").unwrap();
        let mut cfg = example_cfg();
        cfg.sheets.credentials = Credentials {
            api_key: None,
            access_token_file: Some(token),
        };
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_length_bounds_and_retry() {
        let mut cfg = example_cfg();
        cfg.validation.min_content_length = 50;
        cfg.validation.max_content_length = 10;
        cfg.notion.retry.max_attempts = 0;
        let p = problems(&cfg);
        assert!(p.iter().any(|m| m.contains("min_content_length (50)")));
        assert!(p.iter().any(|m| m.contains("notion.retry.max_attempts")));
    }

    #[test]
    fn blank_calendar_properties() {
        let mut cfg = example_cfg();
        if let Some(cal) = cfg.notion.calendar.as_mut() {
            cal.tag_property = "".into();
        }
        assert_eq!(problems(&cfg), vec!["notion.calendar.tag_property must be non-empty"]);
    }

    #[test]
    fn split_checks_surface_as_config_problems() {
        let mut cfg = example_cfg();
        cfg.splits.push(SplitAssignment {
            submitter: "없는사람".into(),
            managers: vec!["박지민".into()],
        });
        let p = problems(&cfg);
        assert!(p.iter().any(|m| m.contains("없는사람")), "{:?}", p);
    }

    #[test]
    fn env_overrides_replace_secrets() {
        let mut cfg = example_cfg();
        let env: HashMap<&str, &str> = [
            ("NOTION_TOKEN", "secret"),
            ("SPREADSHEET_ID", "sheet-123"),
            ("NOTION_PAGE_ID", ""),
            ("NOTION_CALENDAR_DATABASE_ID", "cal-9"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.notion.token, "secret");
        assert_eq!(cfg.sheets.spreadsheet_id, "sheet-123");
        assert_eq!(cfg.notion.page_id, "NOTION_PAGE_ID");
        assert_eq!(cfg.notion.calendar.unwrap().database_id, "cal-9");
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.assignments[0].manager, "박지민");
        cfg.router().unwrap();
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

pub mod assignment;
pub mod calendar;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notion;
pub mod pipeline;
pub mod publish;
pub mod records;
pub mod report;
pub mod retry;
pub mod sanitize;
pub mod sheets;
pub mod split;
pub mod timestamp;

pub use error::PipelineError;
pub use pipeline::{Pipeline, RunOutcome};

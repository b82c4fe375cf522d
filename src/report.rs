use crate::service::SavedReport;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub saved_report: SavedReport,
    pub report_job_id: i64,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub parameters_rewritten: usize,
    pub polls: u32,
    pub format: String,
    pub output: PathBuf,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub started: String,
    pub finished: String,
}

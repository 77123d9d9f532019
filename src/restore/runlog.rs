use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat, Utc};
use serde::Serialize;

pub const RUN_LOG_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRunLogItem {
    pub source_filename: String,
    pub staged_name: String,
    pub found_path: Option<String>,
    pub comparison_path: Option<String>,
}

/// Summary of one batch run, written as JSON next to the outputs so a
/// run can be reconstructed after the scratch state is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRunLog {
    pub started_at: String,
    pub finished_at: String,
    pub input_dir: String,
    pub output_dir: String,
    pub use_gpu: bool,
    pub remove_scratches: bool,
    pub high_resolution: bool,
    pub success: bool,
    pub engine_status_code: Option<i32>,
    pub items: Vec<BatchRunLogItem>,
}

pub fn iso_timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn run_log_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn run_logs_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(RUN_LOG_DIR)
}

pub fn batch_run_log_path(output_dir: &Path) -> PathBuf {
    run_logs_dir(output_dir).join(format!("restore_run_{}.json", run_log_stamp()))
}

pub fn render_batch_run_log(log: &BatchRunLog) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(log)?;
    bytes.push(b'\n');
    Ok(bytes)
}

//! Timestamped execution log file naming (§4.6 step 1).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use slb_common::RequestId;

/// `<log_dir>/<YYYYMMDD-HHMMSS>_<requestID[0:8]>.log`.
#[must_use]
pub fn log_file_path(log_dir: &Path, request_id: RequestId, now: DateTime<Utc>) -> PathBuf {
    let stamp = now.format("%Y%m%d-%H%M%S");
    let short_id = request_id.to_string().chars().take(8).collect::<String>();
    log_dir.join(format!("{stamp}_{short_id}.log"))
}

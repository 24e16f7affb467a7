use log::{error, info};
use std::path::Path;

use crate::types::Report;

/// Persistence seam for fetched reports.
/// `save` never raises: persistence trouble is reported as `false`.
pub trait ReportSink: Send + Sync {
    fn save(&self, report: &Report, output_dir: &Path) -> bool;

    /// Save a slice of reports, returning (saved, failed) counts
    fn save_all(&self, reports: &[Report], output_dir: &Path) -> (usize, usize) {
        let mut saved = 0;
        let mut failed = 0;
        for report in reports {
            if self.save(report, output_dir) {
                saved += 1;
            } else {
                failed += 1;
            }
        }
        (saved, failed)
    }
}

/// Writes each report under `output_dir` using the report's own filename
pub struct FileReportSink;

impl ReportSink for FileReportSink {
    fn save(&self, report: &Report, output_dir: &Path) -> bool {
        let file_path = output_dir.join(&report.filename);
        match report.save_to_file(&file_path) {
            Ok(()) => {
                info!("Report saved: {}", file_path.display());
                true
            }
            Err(e) => {
                error!("Failed to save report {}: {}", report.filename, e);
                false
            }
        }
    }
}

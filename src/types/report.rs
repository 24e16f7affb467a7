use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::types::Portfolio;

/// Output formats accepted by the vendor report endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportFormat {
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "CSVBR")]
    CsvBr,
    #[serde(rename = "CSVUS")]
    CsvUs,
    #[serde(rename = "TXTBR")]
    TxtBr,
    #[serde(rename = "TXTUS")]
    TxtUs,
    #[serde(rename = "JSON")]
    Json,
}

impl ReportFormat {
    /// Wire value sent in request parameters
    pub fn api_value(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "PDF",
            ReportFormat::CsvBr => "CSVBR",
            ReportFormat::CsvUs => "CSVUS",
            ReportFormat::TxtBr => "TXTBR",
            ReportFormat::TxtUs => "TXTUS",
            ReportFormat::Json => "JSON",
        }
    }

    /// File extension for saved reports
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => ".pdf",
            ReportFormat::CsvBr | ReportFormat::CsvUs => ".csv",
            ReportFormat::TxtBr | ReportFormat::TxtUs => ".txt",
            ReportFormat::Json => ".json",
        }
    }

    pub fn is_csv(&self) -> bool {
        matches!(self, ReportFormat::CsvBr | ReportFormat::CsvUs)
    }

    /// True for every text-based format (CSV, TXT, JSON)
    pub fn is_text(&self) -> bool {
        !matches!(self, ReportFormat::Pdf)
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_value())
    }
}

/// Report payload as returned by the vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportContent {
    Binary(Vec<u8>),
    Text(String),
}

impl ReportContent {
    pub fn len(&self) -> usize {
        match self {
            ReportContent::Binary(bytes) => bytes.len(),
            ReportContent::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fetched report artifact for one portfolio/date/format combination
#[derive(Debug, Clone)]
pub struct Report {
    pub content: ReportContent,
    pub content_type: String,
    pub filename: String,
    pub portfolio: Option<Portfolio>,
    pub date: NaiveDate,
    pub format: ReportFormat,
    pub size_bytes: usize,
}

impl Report {
    pub fn new(
        content: ReportContent,
        content_type: String,
        filename: String,
        portfolio: Option<Portfolio>,
        date: NaiveDate,
        format: ReportFormat,
    ) -> Self {
        let size_bytes = content.len();
        Self {
            content,
            content_type,
            filename,
            portfolio,
            date,
            format,
            size_bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.content, ReportContent::Binary(_))
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Write the content to `file_path`, creating parent directories as needed
    pub fn save_to_file(&self, file_path: &Path) -> io::Result<()> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        match &self.content {
            ReportContent::Binary(bytes) => fs::write(file_path, bytes),
            ReportContent::Text(text) => fs::write(file_path, text.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(content: ReportContent, format: ReportFormat) -> Report {
        Report::new(
            content,
            "application/octet-stream".to_string(),
            "report.bin".to_string(),
            Some(Portfolio::new("4478", "FUND ALPHA")),
            NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
            format,
        )
    }

    #[test]
    fn test_format_extension() {
        assert_eq!(ReportFormat::Pdf.extension(), ".pdf");
        assert_eq!(ReportFormat::CsvBr.extension(), ".csv");
        assert_eq!(ReportFormat::CsvUs.extension(), ".csv");
        assert_eq!(ReportFormat::TxtUs.extension(), ".txt");
        assert_eq!(ReportFormat::Json.extension(), ".json");
    }

    #[test]
    fn test_format_classification() {
        assert!(ReportFormat::CsvBr.is_csv());
        assert!(!ReportFormat::Json.is_csv());
        assert!(ReportFormat::Json.is_text());
        assert!(!ReportFormat::Pdf.is_text());
    }

    #[test]
    fn test_report_size_is_derived_from_content() {
        let report = sample_report(
            ReportContent::Binary(vec![0u8; 2048]),
            ReportFormat::Pdf,
        );
        assert_eq!(report.size_bytes, 2048);
        assert!(report.is_binary());
        assert!((report.size_mb() - 2048.0 / (1024.0 * 1024.0)).abs() < 1e-12);
    }

    #[test]
    fn test_save_to_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("saida.csv");

        let report = sample_report(
            ReportContent::Text("a;b;c\n1;2;3\n".to_string()),
            ReportFormat::CsvBr,
        );
        report.save_to_file(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a;b;c\n1;2;3\n");
    }
}

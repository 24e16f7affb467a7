use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::types::Portfolio;

/// Failure to resolve a portfolio id back to a full portfolio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortfolioError {
    NotFound(String),
    Storage(String),
}

impl fmt::Display for PortfolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioError::NotFound(id) => write!(f, "portfolio {} not found", id),
            PortfolioError::Storage(msg) => write!(f, "portfolio storage error: {}", msg),
        }
    }
}

impl std::error::Error for PortfolioError {}

/// Resolver from portfolio id to full portfolio.
/// Used by the retry-subset path to rehydrate portfolios from ledger entries.
pub trait PortfolioDirectory: Send + Sync {
    fn resolve(&self, portfolio_id: &str) -> Result<Portfolio, PortfolioError>;

    /// Every portfolio known to the directory, in id order
    fn all(&self) -> Vec<Portfolio>;
}

#[derive(Debug, Deserialize)]
struct PortfolioFile {
    #[serde(default)]
    portfolios: HashMap<String, String>,
}

/// Directory backed by a JSON cache file of the form
/// `{"portfolios": {"<id>": "<name>", ...}}`.
pub struct FilePortfolioDirectory {
    portfolios: HashMap<String, Portfolio>,
}

impl FilePortfolioDirectory {
    /// Load the directory from `path`. A missing file yields an empty
    /// directory with a warning; a corrupt file is an error.
    pub fn load(path: &Path) -> Result<Self, PortfolioError> {
        if !path.exists() {
            warn!("Portfolio file {} not found - directory is empty", path.display());
            return Ok(Self {
                portfolios: HashMap::new(),
            });
        }

        let raw = fs::read_to_string(path)
            .map_err(|e| PortfolioError::Storage(format!("{}: {}", path.display(), e)))?;
        let file: PortfolioFile = serde_json::from_str(&raw)
            .map_err(|e| PortfolioError::Storage(format!("{}: {}", path.display(), e)))?;

        let portfolios: HashMap<String, Portfolio> = file
            .portfolios
            .into_iter()
            .map(|(id, name)| (id.trim().to_string(), Portfolio::new(id, name)))
            .filter(|(_, p)| p.is_valid())
            .collect();

        info!(
            "Loaded {} portfolios from {}",
            portfolios.len(),
            path.display()
        );
        Ok(Self { portfolios })
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }
}

impl PortfolioDirectory for FilePortfolioDirectory {
    fn resolve(&self, portfolio_id: &str) -> Result<Portfolio, PortfolioError> {
        self.portfolios
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| PortfolioError::NotFound(portfolio_id.to_string()))
    }

    fn all(&self) -> Vec<Portfolio> {
        let mut portfolios: Vec<Portfolio> = self.portfolios.values().cloned().collect();
        portfolios.sort_by(|a, b| a.id.cmp(&b.id));
        portfolios
    }
}

/// In-memory directory over a fixed portfolio list, for tests and dry runs
pub struct StaticPortfolioDirectory {
    portfolios: HashMap<String, Portfolio>,
}

impl StaticPortfolioDirectory {
    pub fn new(portfolios: impl IntoIterator<Item = Portfolio>) -> Self {
        Self {
            portfolios: portfolios
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        }
    }
}

impl PortfolioDirectory for StaticPortfolioDirectory {
    fn resolve(&self, portfolio_id: &str) -> Result<Portfolio, PortfolioError> {
        self.portfolios
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| PortfolioError::NotFound(portfolio_id.to_string()))
    }

    fn all(&self) -> Vec<Portfolio> {
        let mut portfolios: Vec<Portfolio> = self.portfolios.values().cloned().collect();
        portfolios.sort_by(|a, b| a.id.cmp(&b.id));
        portfolios
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_directory_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portfolios.json");
        fs::write(
            &path,
            r#"{"portfolios": {"4478": "FUND ALPHA FIC FIM", "9901": "FUND BETA RF"}}"#,
        )
        .unwrap();

        let directory = FilePortfolioDirectory::load(&path).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.resolve("4478").unwrap().name, "FUND ALPHA FIC FIM");
        assert_eq!(
            directory.resolve("0000"),
            Err(PortfolioError::NotFound("0000".to_string()))
        );

        let all = directory.all();
        assert_eq!(all[0].id, "4478");
        assert_eq!(all[1].id, "9901");
    }

    #[test]
    fn test_missing_file_yields_empty_directory() {
        let dir = TempDir::new().unwrap();
        let directory = FilePortfolioDirectory::load(&dir.path().join("nope.json")).unwrap();
        assert!(directory.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portfolios.json");
        fs::write(&path, "{broken").unwrap();
        assert!(matches!(
            FilePortfolioDirectory::load(&path),
            Err(PortfolioError::Storage(_))
        ));
    }

    #[test]
    fn test_static_directory() {
        let directory = StaticPortfolioDirectory::new([
            Portfolio::new("A", "FUND A"),
            Portfolio::new("B", "FUND B"),
        ]);
        assert!(directory.resolve("A").is_ok());
        assert!(directory.resolve("C").is_err());
        assert_eq!(directory.all().len(), 2);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// An investment fund: stable external id plus display name.
/// The unit of work for report generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub name: String,
}

impl Portfolio {
    /// Create a new portfolio, trimming surrounding whitespace
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: name.into().trim().to_string(),
        }
    }

    /// Check the portfolio carries a usable id and name
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_new_trims() {
        let p = Portfolio::new("  4478  ", " FUND ALPHA FIC FIM ");
        assert_eq!(p.id, "4478");
        assert_eq!(p.name, "FUND ALPHA FIC FIM");
        assert!(p.is_valid());
    }

    #[test]
    fn test_portfolio_empty_is_invalid() {
        let p = Portfolio::new("   ", "name");
        assert!(!p.is_valid());
    }

    #[test]
    fn test_portfolio_display() {
        let p = Portfolio::new("4478", "FUND ALPHA");
        assert_eq!(p.to_string(), "4478 (FUND ALPHA)");
    }
}

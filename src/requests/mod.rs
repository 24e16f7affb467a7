use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::types::{Portfolio, ReportFormat};

/// Validation failure for a report request template.
/// These indicate a caller contract violation, not a transient fetch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestValidationError {
    message: String,
}

impl RequestValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RequestValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid report request: {}", self.message)
    }
}

impl std::error::Error for RequestValidationError {}

/// Daily portfolio report (endpoint 32)
#[derive(Debug, Clone)]
pub struct DailyReportRequest {
    pub portfolio: Option<Portfolio>,
    pub date: NaiveDate,
    pub format: ReportFormat,
    pub break_level: u8,
    pub left_report_name: bool,
    pub omit_logo: bool,
    pub detail_fixed_income: bool,
    pub detail_net_worth: bool,
    pub show_investor_qty: bool,
}

impl DailyReportRequest {
    pub fn new(portfolio: Option<Portfolio>, date: NaiveDate, format: ReportFormat) -> Self {
        Self {
            portfolio,
            date,
            format,
            break_level: 1,
            left_report_name: false,
            omit_logo: false,
            detail_fixed_income: true,
            detail_net_worth: false,
            show_investor_qty: true,
        }
    }

    fn api_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("format".into(), json!(self.format.api_value()));
        params.insert("date".into(), json!(self.date.format("%Y-%m-%d").to_string()));
        params.insert("breakLevel".into(), json!(self.break_level));
        params.insert("leftReportName".into(), json!(self.left_report_name));
        params.insert("omitLogotype".into(), json!(self.omit_logo));
        params.insert("detailFixedIncome".into(), json!(self.detail_fixed_income));
        params.insert("detailNetWorth".into(), json!(self.detail_net_worth));
        params.insert("showInvestorQty".into(), json!(self.show_investor_qty));
        if let Some(portfolio) = &self.portfolio {
            params.insert("portfolio".into(), json!(portfolio.id));
        }
        params
    }
}

/// Synthetic profitability report (endpoint 1048)
#[derive(Debug, Clone)]
pub struct SyntheticProfitabilityRequest {
    pub portfolio: Option<Portfolio>,
    pub date: NaiveDate,
    pub format: ReportFormat,
    pub daily_base: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub profitability_index_type: u8,
    pub emit_d0_opening_position: bool,
    pub left_report_name: bool,
    pub omit_logo: bool,
    pub use_short_portfolio_name: bool,
}

impl SyntheticProfitabilityRequest {
    pub fn new(portfolio: Option<Portfolio>, date: NaiveDate, format: ReportFormat) -> Self {
        Self {
            portfolio,
            date,
            format,
            daily_base: false,
            start_date: None,
            end_date: None,
            profitability_index_type: 0,
            emit_d0_opening_position: false,
            left_report_name: true,
            omit_logo: false,
            use_short_portfolio_name: false,
        }
    }

    fn validate(&self) -> Result<(), RequestValidationError> {
        if self.daily_base && (self.start_date.is_none() || self.end_date.is_none()) {
            return Err(RequestValidationError::new(
                "daily base requires both start and end dates",
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(RequestValidationError::new(
                    "start date cannot be after end date",
                ));
            }
        }
        if self.profitability_index_type > 2 {
            return Err(RequestValidationError::new(
                "profitability index type must be 0, 1 or 2",
            ));
        }
        Ok(())
    }

    fn api_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("format".into(), json!(self.format.api_value()));
        params.insert("baseDiaria".into(), json!(self.daily_base));
        params.insert("nomeRelatorioEsquerda".into(), json!(self.left_report_name));
        params.insert("omiteLogotipo".into(), json!(self.omit_logo));
        params.insert(
            "usaNomeCurtoCarteira".into(),
            json!(self.use_short_portfolio_name),
        );
        params.insert(
            "tipoRentabilidadeIndice".into(),
            json!(self.profitability_index_type),
        );
        params.insert(
            "emitirPosicaoDeD0Abertura".into(),
            json!(self.emit_d0_opening_position),
        );
        // carteiraId omitted means "all portfolios" on the vendor side
        if let Some(portfolio) = &self.portfolio {
            params.insert("carteiraId".into(), json!(portfolio.id));
        }
        if self.daily_base {
            if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
                params.insert(
                    "dataInicial".into(),
                    json!(start.format("%Y-%m-%d").to_string()),
                );
                params.insert("dataFinal".into(), json!(end.format("%Y-%m-%d").to_string()));
            }
        }
        params
    }
}

/// Profitability report (endpoint 1799)
#[derive(Debug, Clone)]
pub struct ProfitabilityRequest {
    pub portfolio: Option<Portfolio>,
    pub date: NaiveDate,
    pub format: ReportFormat,
    pub report_date: Option<NaiveDate>,
    pub left_report_name: bool,
    pub omit_logo: bool,
    pub use_short_portfolio_name: bool,
    pub use_long_title_name: bool,
    pub handle_shared_adjustment_movement: bool,
    pub cdi_index: String,
}

impl ProfitabilityRequest {
    pub fn new(portfolio: Option<Portfolio>, date: NaiveDate, format: ReportFormat) -> Self {
        Self {
            portfolio,
            date,
            format,
            report_date: None,
            left_report_name: true,
            omit_logo: false,
            use_short_portfolio_name: false,
            use_long_title_name: false,
            handle_shared_adjustment_movement: true,
            cdi_index: "CDI".to_string(),
        }
    }

    fn validate(&self) -> Result<(), RequestValidationError> {
        if self.cdi_index.trim().is_empty() {
            return Err(RequestValidationError::new("CDI index is required"));
        }
        Ok(())
    }

    fn api_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let Some(portfolio) = &self.portfolio {
            params.insert("carteira".into(), json!(portfolio.id));
        }
        params.insert("format".into(), json!(self.format.api_value()));
        params.insert("nomeRelatorioEsquerda".into(), json!(self.left_report_name));
        params.insert("omiteLogotipo".into(), json!(self.omit_logo));
        params.insert(
            "usaNomeCurtoCarteira".into(),
            json!(self.use_short_portfolio_name),
        );
        params.insert("usaNomeLongoTitulo".into(), json!(self.use_long_title_name));
        params.insert(
            "trataMovimentoAjusteComp".into(),
            json!(self.handle_shared_adjustment_movement),
        );
        params.insert("indiceCDI".into(), json!(self.cdi_index));
        if let Some(report_date) = self.report_date {
            params.insert(
                "data".into(),
                json!(report_date.format("%Y-%m-%d").to_string()),
            );
        }
        params
    }
}

/// Bank account statement (endpoint 1988)
#[derive(Debug, Clone)]
pub struct BankStatementRequest {
    pub portfolio: Option<Portfolio>,
    pub date: NaiveDate,
    pub format: ReportFormat,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub agency: String,
    pub account: String,
    pub days: u32,
    pub left_report_name: bool,
    pub omit_logo: bool,
    pub use_short_portfolio_name: bool,
}

impl BankStatementRequest {
    pub fn new(
        portfolio: Option<Portfolio>,
        date: NaiveDate,
        format: ReportFormat,
        start_date: NaiveDate,
        agency: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            portfolio,
            date,
            format,
            start_date,
            end_date: None,
            agency: agency.into(),
            account: account.into(),
            days: 0,
            left_report_name: true,
            omit_logo: false,
            use_short_portfolio_name: false,
        }
    }

    fn validate(&self) -> Result<(), RequestValidationError> {
        if self.agency.trim().is_empty() {
            return Err(RequestValidationError::new("agency is required"));
        }
        if self.account.trim().is_empty() {
            return Err(RequestValidationError::new("account is required"));
        }
        if let Some(end) = self.end_date {
            if self.start_date > end {
                return Err(RequestValidationError::new(
                    "start date cannot be after end date",
                ));
            }
        }
        Ok(())
    }

    fn api_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let Some(portfolio) = &self.portfolio {
            params.insert("carteira".into(), json!(portfolio.id));
        }
        params.insert("format".into(), json!(self.format.api_value()));
        params.insert(
            "dataInicial".into(),
            json!(self.start_date.format("%Y-%m-%d").to_string()),
        );
        params.insert(
            "dataFinal".into(),
            match self.end_date {
                Some(end) => json!(end.format("%Y-%m-%d").to_string()),
                None => json!(""),
            },
        );
        params.insert("agencia".into(), json!(self.agency));
        params.insert("conta".into(), json!(self.account));
        params.insert("dias".into(), json!(self.days));
        params.insert("nomeRelatorioEsquerda".into(), json!(self.left_report_name));
        params.insert("omiteLogotipo".into(), json!(self.omit_logo));
        params.insert(
            "usaNomeCurtoCarteira".into(),
            json!(self.use_short_portfolio_name),
        );
        params
    }
}

/// Closed set of report request templates the batch orchestrator accepts.
///
/// The orchestrator never inspects variant internals; it relies on the three
/// capabilities below to derive per-portfolio requests and to describe a
/// request for ledger/diagnostic purposes.
#[derive(Debug, Clone)]
pub enum ReportRequest {
    Daily(DailyReportRequest),
    SyntheticProfitability(SyntheticProfitabilityRequest),
    Profitability(ProfitabilityRequest),
    BankStatement(BankStatementRequest),
}

impl ReportRequest {
    /// Vendor report endpoint this request targets
    pub fn endpoint(&self) -> &'static str {
        match self {
            ReportRequest::Daily(_) => "32",
            ReportRequest::SyntheticProfitability(_) => "1048",
            ReportRequest::Profitability(_) => "1799",
            ReportRequest::BankStatement(_) => "1988",
        }
    }

    pub fn portfolio(&self) -> Option<&Portfolio> {
        match self {
            ReportRequest::Daily(r) => r.portfolio.as_ref(),
            ReportRequest::SyntheticProfitability(r) => r.portfolio.as_ref(),
            ReportRequest::Profitability(r) => r.portfolio.as_ref(),
            ReportRequest::BankStatement(r) => r.portfolio.as_ref(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            ReportRequest::Daily(r) => r.date,
            ReportRequest::SyntheticProfitability(r) => r.date,
            ReportRequest::Profitability(r) => r.date,
            ReportRequest::BankStatement(r) => r.date,
        }
    }

    pub fn format(&self) -> ReportFormat {
        match self {
            ReportRequest::Daily(r) => r.format,
            ReportRequest::SyntheticProfitability(r) => r.format,
            ReportRequest::Profitability(r) => r.format,
            ReportRequest::BankStatement(r) => r.format,
        }
    }

    /// Clone this template with the portfolio substituted.
    /// All other fields are carried over unchanged.
    pub fn with_portfolio(&self, portfolio: Portfolio) -> Self {
        let mut request = self.clone();
        match &mut request {
            ReportRequest::Daily(r) => r.portfolio = Some(portfolio),
            ReportRequest::SyntheticProfitability(r) => r.portfolio = Some(portfolio),
            ReportRequest::Profitability(r) => r.portfolio = Some(portfolio),
            ReportRequest::BankStatement(r) => r.portfolio = Some(portfolio),
        }
        request
    }

    /// Parameter map as sent to the vendor; also stored on failure records
    /// for diagnostics and export. Never used for control flow.
    pub fn api_params(&self) -> Map<String, Value> {
        match self {
            ReportRequest::Daily(r) => r.api_params(),
            ReportRequest::SyntheticProfitability(r) => r.api_params(),
            ReportRequest::Profitability(r) => r.api_params(),
            ReportRequest::BankStatement(r) => r.api_params(),
        }
    }

    /// Check template invariants before a batch run starts
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        match self {
            ReportRequest::Daily(_) => Ok(()),
            ReportRequest::SyntheticProfitability(r) => r.validate(),
            ReportRequest::Profitability(r) => r.validate(),
            ReportRequest::BankStatement(r) => r.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_with_portfolio_substitutes_only_the_portfolio() {
        let mut base = ProfitabilityRequest::new(None, date(2025, 4, 30), ReportFormat::Pdf);
        base.cdi_index = "SELIC".to_string();
        let template = ReportRequest::Profitability(base);

        let derived = template.with_portfolio(Portfolio::new("4478", "FUND ALPHA"));

        assert_eq!(derived.portfolio().unwrap().id, "4478");
        assert_eq!(derived.date(), template.date());
        match derived {
            ReportRequest::Profitability(r) => assert_eq!(r.cdi_index, "SELIC"),
            _ => panic!("variant changed"),
        }
    }

    #[test]
    fn test_endpoints() {
        let daily = ReportRequest::Daily(DailyReportRequest::new(
            None,
            date(2025, 4, 30),
            ReportFormat::Pdf,
        ));
        let synthetic = ReportRequest::SyntheticProfitability(SyntheticProfitabilityRequest::new(
            None,
            date(2025, 4, 30),
            ReportFormat::Pdf,
        ));
        assert_eq!(daily.endpoint(), "32");
        assert_eq!(synthetic.endpoint(), "1048");
    }

    #[test]
    fn test_synthetic_daily_base_requires_dates() {
        let mut request =
            SyntheticProfitabilityRequest::new(None, date(2025, 4, 30), ReportFormat::Pdf);
        request.daily_base = true;
        assert!(ReportRequest::SyntheticProfitability(request.clone())
            .validate()
            .is_err());

        request.start_date = Some(date(2025, 4, 1));
        request.end_date = Some(date(2025, 4, 30));
        assert!(ReportRequest::SyntheticProfitability(request)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_bank_statement_requires_agency_and_account() {
        let request = BankStatementRequest::new(
            None,
            date(2025, 4, 30),
            ReportFormat::Pdf,
            date(2025, 4, 1),
            "",
            "12345-6",
        );
        assert!(ReportRequest::BankStatement(request).validate().is_err());
    }

    #[test]
    fn test_api_params_include_portfolio_when_present() {
        let request = ReportRequest::SyntheticProfitability(SyntheticProfitabilityRequest::new(
            Some(Portfolio::new("4478", "FUND ALPHA")),
            date(2025, 4, 30),
            ReportFormat::CsvBr,
        ));
        let params = request.api_params();
        assert_eq!(params.get("carteiraId").unwrap(), "4478");
        assert_eq!(params.get("format").unwrap(), "CSVBR");

        let all_portfolios = ReportRequest::SyntheticProfitability(
            SyntheticProfitabilityRequest::new(None, date(2025, 4, 30), ReportFormat::CsvBr),
        );
        assert!(all_portfolios.api_params().get("carteiraId").is_none());
    }
}

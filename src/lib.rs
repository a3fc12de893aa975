//! # Ledger Arrears
//!
//! A library for turning rental ledger statements (free text or tabular)
//! into classified transaction entries and an auditable arrears figure.
//!
//! ## Core Concepts
//!
//! - **Entry**: one dated transaction with optional debit, credit, and
//!   running balance, plus a rental/non-rental classification
//! - **Settlement Point**: the most recent row whose stated balance is at
//!   or below zero; arrears accrue after it
//! - **Target Month**: the billing cycle the as-of date falls in, used to
//!   select the current balance due
//! - **Trace**: every automatic decision and fallback, recorded with a
//!   human-readable rationale alongside the machine data
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_arrears::{AnalysisOptions, LedgerAnalyzer};
//! use chrono::NaiveDate;
//!
//! let text = "\
//! 07/01/2015 1 BASE RENT 1525.00 1525.00
//! 07/01/2015 25 AIR CONDITIONER 10.00 1535.00
//! 07/23/2015 PAYMENT 1525.00 10.00
//! ";
//!
//! let analyzer = LedgerAnalyzer::default();
//! let options = AnalysisOptions::as_of(NaiveDate::from_ymd_opt(2015, 7, 30).unwrap());
//! let result = analyzer.analyze_text(text, &options)?;
//! println!("arrears: {:.2}", result.arrears);
//! println!("{}", result.trace.to_json()?);
//! ```

pub mod classify;
pub mod columns;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod normalize;
pub mod schema;
pub mod tokenizer;
pub mod trace;

pub use classify::{classify, ClassifiedDescription};
pub use columns::{map_columns, map_columns_with_samples, ColumnMapping, ColumnType, LedgerFormat};
pub use engine::{ArrearsEngine, ArrearsOutcome, SettlementPoint};
pub use error::{LedgerError, Result};
pub use ingestion::*;
pub use schema::*;
pub use tokenizer::{FreeTextSource, RawRow, RowSource, RowTokenizer, TableSource};
pub use trace::*;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Caller-supplied dates for one analysis run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Statement issue date, if one was extracted from the document.
    pub issue_date: Option<NaiveDate>,
    /// The date the arrears figure should be current as of. Today when
    /// unset.
    pub as_of: Option<NaiveDate>,
}

impl AnalysisOptions {
    pub fn as_of(as_of: NaiveDate) -> Self {
        Self {
            issue_date: None,
            as_of: Some(as_of),
        }
    }
}

/// Everything one analysis produced: the parsed entries, the classified
/// charge lists, the arrears figures, and the full audit trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Date-sorted entries, document order preserved within a day.
    pub entries: Vec<LedgerEntry>,
    pub rental_charges: Vec<RentalCharge>,
    pub non_rental_charges: Vec<NonRentalCharge>,
    /// Balance stated by the earliest entry, when it states one.
    pub opening_balance: Option<f64>,
    /// Balance stated by the latest entry, when it states one.
    pub final_balance: Option<f64>,
    /// Sum of every non-rental charge in the document.
    pub total_non_rent: f64,
    /// Sum of non-rental charges after the settlement point (step 2).
    pub non_rent_since_settlement: f64,
    pub effective_as_of: NaiveDate,
    pub settlement: Option<SettlementPoint>,
    pub selected_balance: f64,
    pub arrears: f64,
    pub trace: CalculationTrace,
    /// Sample of rows that looked like transactions but did not tokenize.
    pub diagnostics: Vec<String>,
}

/// Facade over the tokenizer, classifier, and calculation engine.
///
/// Construct once per configuration and reuse across documents; each
/// analyze call gets a fresh tokenizer so duplicate suppression and
/// diagnostics never leak between documents.
pub struct LedgerAnalyzer {
    config: EngineConfig,
    engine: ArrearsEngine,
}

impl Default for LedgerAnalyzer {
    fn default() -> Self {
        // EngineConfig::default() always validates
        Self::new(EngineConfig::default()).expect("default config is valid")
    }
}

impl LedgerAnalyzer {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: ArrearsEngine::new(config.clone()),
            config,
        })
    }

    /// Analyzes a free-text ledger statement.
    pub fn analyze_text(&self, text: &str, options: &AnalysisOptions) -> Result<AnalysisResult> {
        if text.trim().is_empty() {
            return Err(LedgerError::EmptyInput("statement text is blank".to_string()));
        }
        let mut tokenizer = RowTokenizer::new(&self.config);
        let entries = tokenizer.tokenize_source(&FreeTextSource::new(text));
        self.finish(entries, &tokenizer, options)
    }

    /// Analyzes a tabular document, inferring the column mapping from its
    /// headers and a sample of its rows.
    pub fn analyze_table(
        &self,
        document: &TableDocument,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if document.rows.is_empty() {
            return Err(LedgerError::EmptyInput("table has no data rows".to_string()));
        }
        let mapping = map_columns_with_samples(&document.headers, &document.rows);
        debug!(
            "mapped {} of {} header cells, format {:?}",
            mapping.columns.len(),
            document.headers.len(),
            mapping.format
        );
        let mut tokenizer = RowTokenizer::new(&self.config);
        let entries = tokenizer.tokenize_source(&TableSource::new(mapping, document.rows.clone()));
        self.finish(entries, &tokenizer, options)
    }

    /// Analyzes entries produced by the remote extraction fallback.
    pub fn analyze_record(
        &self,
        record: &ExternalLedgerRecord,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if record.entries.is_empty() {
            return Err(LedgerError::EmptyInput(
                "external record has no entries".to_string(),
            ));
        }
        let entries = convert_external_record(record);
        let tokenizer = RowTokenizer::new(&self.config);
        self.finish(entries, &tokenizer, options)
    }

    /// Analyzes entries the caller already holds, however they were made.
    pub fn analyze_entries(
        &self,
        entries: Vec<LedgerEntry>,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if entries.is_empty() {
            return Err(LedgerError::EmptyInput("entry list is empty".to_string()));
        }
        let tokenizer = RowTokenizer::new(&self.config);
        self.finish(entries, &tokenizer, options)
    }

    fn finish(
        &self,
        mut entries: Vec<LedgerEntry>,
        tokenizer: &RowTokenizer,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        sort_entries(&mut entries);

        let as_of = options
            .as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        info!(
            "analyzing {} entries as of {} (issue date: {:?})",
            entries.len(),
            as_of,
            options.issue_date
        );

        let (rental_charges, non_rental_charges) = split_charges(&entries);
        let total_non_rent = non_rental_charges.iter().map(|c| c.amount).sum();

        let outcome = self.engine.calculate(&entries, options.issue_date, as_of);

        Ok(AnalysisResult {
            opening_balance: entries.first().and_then(|e| e.balance),
            final_balance: entries.last().and_then(|e| e.balance),
            rental_charges,
            non_rental_charges,
            total_non_rent,
            effective_as_of: outcome.effective_as_of,
            settlement: outcome.settlement,
            non_rent_since_settlement: outcome.non_rent_since_settlement,
            selected_balance: outcome.selected_balance,
            arrears: outcome.arrears,
            trace: outcome.trace,
            diagnostics: tokenizer.diagnostics().to_vec(),
            entries,
        })
    }
}

/// Splits debit-bearing entries into rental and non-rental charge lists.
/// Unknown rows land on the non-rental side under `Other`, matching the
/// engine's inclusive treatment of uncertain charges.
fn split_charges(entries: &[LedgerEntry]) -> (Vec<RentalCharge>, Vec<NonRentalCharge>) {
    let mut rental = Vec::new();
    let mut non_rental = Vec::new();

    for entry in entries {
        let Some(amount) = entry.debit.filter(|d| *d > 0.0) else {
            continue;
        };
        match entry.is_rental {
            RentalFlag::Rental => rental.push(RentalCharge {
                description: entry.description.clone(),
                amount,
                date: entry.date,
            }),
            RentalFlag::NonRental | RentalFlag::Unknown => {
                let category = classify(&entry.description, entry.charge_code)
                    .category
                    .unwrap_or(ChargeCategory::Other);
                non_rental.push(NonRentalCharge {
                    description: entry.description.clone(),
                    amount,
                    date: entry.date,
                    category,
                });
            }
        }
    }

    (rental, non_rental)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let analyzer = LedgerAnalyzer::default();
        let options = AnalysisOptions::as_of(date(2015, 7, 30));
        assert!(matches!(
            analyzer.analyze_text("   \n\n  ", &options),
            Err(LedgerError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = EngineConfig {
            month_search_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            LedgerAnalyzer::new(config),
            Err(LedgerError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_split_charges_sends_unknown_to_non_rental() {
        let mut charge = LedgerEntry::new(date(2015, 7, 2), "MISC ADJUSTMENT");
        charge.debit = Some(30.0);
        let mut rent = LedgerEntry::new(date(2015, 7, 1), "BASE RENT");
        rent.debit = Some(1525.0);
        rent.is_rental = RentalFlag::Rental;
        let mut payment = LedgerEntry::new(date(2015, 7, 23), "PAYMENT");
        payment.credit = Some(1525.0);

        let (rental, non_rental) = split_charges(&[rent, charge, payment]);
        assert_eq!(rental.len(), 1);
        assert_eq!(non_rental.len(), 1);
        assert_eq!(non_rental[0].category, ChargeCategory::Other);
    }

    #[test]
    fn test_text_analysis_end_to_end() {
        let text = "\
07/01/2015 1 BASE RENT 1525.00 1525.00
07/01/2015 25 AIR CONDITIONER 10.00 1535.00
07/23/2015 PAYMENT 1525.00 10.00
";
        let analyzer = LedgerAnalyzer::default();
        let options = AnalysisOptions::as_of(date(2015, 7, 30));
        let result = analyzer.analyze_text(text, &options).unwrap();

        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.opening_balance, Some(1525.0));
        assert_eq!(result.final_balance, Some(10.0));
        assert_eq!(result.rental_charges.len(), 1);
        assert_eq!(result.non_rental_charges.len(), 1);
        assert_eq!(result.total_non_rent, 10.0);
        // No balance at or below zero, so every non-rent charge counts
        assert!(result.settlement.is_none());
        assert_eq!(result.non_rent_since_settlement, 10.0);
        // Month selection prefers the latest non-rent charge row over the
        // later payment row
        assert_eq!(result.selected_balance, 1535.0);
        assert_eq!(result.arrears, 1525.0);
    }
}

//! Turns raw statement rows into provisional [`LedgerEntry`] values.
//!
//! Two input shapes share one tokenizer: free-text lines (from a text
//! extraction layer) and structured cell rows (from a spreadsheet reader
//! with a [`ColumnMapping`]). Both are modeled as [`RawRow`] values behind
//! the [`RowSource`] trait so the downstream classifier and calculator
//! never care which format a document arrived in.

use crate::classify::classify;
use crate::columns::{ColumnMapping, ColumnType};
use crate::normalize::{parse_amount, parse_date};
use crate::schema::{EngineConfig, LedgerEntry, RentalFlag};
use chrono::NaiveDate;
use log::debug;
use std::collections::HashSet;

/// Number of leading description characters that participate in the
/// duplicate-suppression key.
const DEDUP_DESCRIPTION_PREFIX: usize = 16;

/// One raw row, before tokenization.
#[derive(Debug, Clone)]
pub enum RawRow {
    Line(String),
    Cells(Vec<String>),
}

/// A supplier of raw rows. Adapters exist for free text and for mapped
/// tables; anything else (a custom report walker, a test fixture) can
/// implement this directly.
pub trait RowSource {
    fn mapping(&self) -> Option<&ColumnMapping>;
    fn raw_rows(&self) -> Vec<RawRow>;
}

/// Free-text ledger statement split into lines.
pub struct FreeTextSource {
    text: String,
}

impl FreeTextSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl RowSource for FreeTextSource {
    fn mapping(&self) -> Option<&ColumnMapping> {
        None
    }

    fn raw_rows(&self) -> Vec<RawRow> {
        self.text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| RawRow::Line(line.to_string()))
            .collect()
    }
}

/// Spreadsheet rows with a header-derived column mapping.
pub struct TableSource {
    mapping: ColumnMapping,
    rows: Vec<Vec<String>>,
}

impl TableSource {
    pub fn new(mapping: ColumnMapping, rows: Vec<Vec<String>>) -> Self {
        Self { mapping, rows }
    }
}

impl RowSource for TableSource {
    fn mapping(&self) -> Option<&ColumnMapping> {
        Some(&self.mapping)
    }

    fn raw_rows(&self) -> Vec<RawRow> {
        self.rows
            .iter()
            .cloned()
            .map(RawRow::Cells)
            .collect()
    }
}

/// Stateful tokenizer for one document.
///
/// State covers duplicate suppression, the bounded diagnostic sample of
/// rejected lines, and the running balance used to synthesize totals for
/// formats that omit a balance column. One instance per document.
pub struct RowTokenizer {
    seen: HashSet<String>,
    diagnostics: Vec<String>,
    diagnostic_limit: usize,
    running_balance: f64,
    synthesized_any: bool,
}

impl RowTokenizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            seen: HashSet::new(),
            diagnostics: Vec::new(),
            diagnostic_limit: config.diagnostic_sample_limit,
            running_balance: 0.0,
            synthesized_any: false,
        }
    }

    /// Seeds the running balance used when a format has no balance column.
    pub fn with_opening_balance(mut self, opening: f64) -> Self {
        self.running_balance = opening;
        self
    }

    /// Sample of rejected rows, capped at the configured limit.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// True if any produced entry carries a synthesized balance.
    pub fn synthesized_any_balance(&self) -> bool {
        self.synthesized_any
    }

    /// Tokenizes every row a source yields, in document order.
    ///
    /// Cell rows without a usable mapping degrade to the free-text path by
    /// joining their cells into one line.
    pub fn tokenize_source(&mut self, source: &dyn RowSource) -> Vec<LedgerEntry> {
        let mapping = source
            .mapping()
            .filter(|m| m.supports_row_extraction())
            .cloned();
        let mut entries = Vec::new();

        for row in source.raw_rows() {
            let entry = match (&row, &mapping) {
                (RawRow::Cells(cells), Some(mapping)) => self.tokenize_cells(cells, mapping),
                (RawRow::Cells(cells), None) => self.tokenize_line(&cells.join(" ")),
                (RawRow::Line(line), _) => self.tokenize_line(line),
            };
            if let Some(entry) = entry {
                entries.push(entry);
            }
        }

        entries
    }

    /// Tokenizes one free-text line.
    ///
    /// The first valid date token anchors the entry; a 1-2 digit charge
    /// code immediately after it is stripped before amount extraction and
    /// remembered. Of the remaining money tokens the last is always the
    /// balance; tokens before it split into debit and candidate credit.
    pub fn tokenize_line(&mut self, line: &str) -> Option<LedgerEntry> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let mut date: Option<(usize, NaiveDate)> = None;
        for (i, token) in tokens.iter().enumerate() {
            let trimmed = token.trim_matches(|c: char| !c.is_ascii_digit());
            if let Some(d) = parse_date(trimmed) {
                date = Some((i, d));
                break;
            }
        }
        // No date anywhere: not a transaction row, skip without noise.
        let (date_idx, date) = date?;

        let mut consumed = vec![false; tokens.len()];
        consumed[date_idx] = true;

        // A short bare integer straight after the date is a charge code,
        // not money; left in place it would pollute the description.
        let mut charge_code = None;
        if let Some(next) = tokens.get(date_idx + 1) {
            if next.len() <= 2 && next.chars().all(|c| c.is_ascii_digit()) {
                charge_code = next.parse::<u32>().ok();
                consumed[date_idx + 1] = true;
            }
        }

        let mut money: Vec<(usize, f64)> = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let trimmed = token.trim_end_matches([',', ';', ':']);
            if let Some(value) = parse_amount(trimmed) {
                money.push((i, value));
                consumed[i] = true;
            }
        }

        if money.is_empty() {
            self.record_diagnostic(line);
            return None;
        }

        let description = tokens
            .iter()
            .enumerate()
            .filter(|(i, _)| !consumed[*i])
            .map(|(_, t)| *t)
            .collect::<Vec<_>>()
            .join(" ");

        let classification = classify(&description, charge_code);

        let mut entry = LedgerEntry::new(date, description);
        entry.charge_code = charge_code;

        let (last, movements) = money.split_last().expect("checked non-empty");
        entry.balance = Some(last.1);

        match movements {
            [] => {} // balance-only row
            [only] => {
                // One movement token: sign wins, then classification.
                if only.1 < 0.0 || classification.is_payment {
                    entry.credit = Some(only.1.abs());
                } else {
                    entry.debit = Some(only.1.abs());
                }
            }
            rest => {
                entry.debit = Some(rest[0].1.abs());
                entry.credit = Some(rest[rest.len() - 1].1.abs());
            }
        }

        entry.is_rental = rental_flag_for(&classification);

        self.keep_if_new(entry, line)
    }

    /// Tokenizes one structured row using mapped columns.
    pub fn tokenize_cells(
        &mut self,
        cells: &[String],
        mapping: &ColumnMapping,
    ) -> Option<LedgerEntry> {
        let cell = |t: ColumnType| -> Option<&str> {
            mapping.index_of(t).and_then(|i| cells.get(i)).map(|s| s.trim())
        };

        let raw_line = cells.join(" | ");

        let date = match cell(ColumnType::Date).and_then(parse_date) {
            Some(d) => d,
            None => {
                // A dateless structured row cannot be ordered; drop it.
                if cells.iter().any(|c| !c.trim().is_empty()) {
                    self.record_diagnostic(&raw_line);
                }
                return None;
            }
        };

        let description = cell(ColumnType::Description)
            .unwrap_or("")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let charge_code = cell(ColumnType::ChargeCode).and_then(|c| c.parse::<u32>().ok());
        let classification = classify(&description, charge_code);

        let mut entry = LedgerEntry::new(date, description);
        entry.charge_code = charge_code;
        entry.debit = cell(ColumnType::Debit).and_then(parse_amount).map(f64::abs);
        entry.credit = cell(ColumnType::Credit).and_then(parse_amount).map(f64::abs);

        // Formats with one signed movement column: sign decides, then
        // classification.
        if entry.debit.is_none() && entry.credit.is_none() {
            if let Some(amount) = cell(ColumnType::Amount).and_then(parse_amount) {
                if amount < 0.0 || classification.is_payment {
                    entry.credit = Some(amount.abs());
                } else {
                    entry.debit = Some(amount.abs());
                }
            }
        }

        match cell(ColumnType::Balance).and_then(parse_amount) {
            Some(balance) => {
                self.running_balance = balance;
                entry.balance = Some(balance);
            }
            None => {
                // No sourced balance: keep a running total so downstream
                // selection still has a figure, but flag the row.
                self.running_balance += entry.debit.unwrap_or(0.0) - entry.credit.unwrap_or(0.0);
                entry.balance = Some(self.running_balance);
                entry.balance_synthesized = true;
                self.synthesized_any = true;
            }
        }

        entry.is_rental = rental_flag_for(&classification);

        self.keep_if_new(entry, &raw_line)
    }

    /// Composite-key duplicate suppression across overlapping parse passes.
    fn keep_if_new(&mut self, entry: LedgerEntry, raw: &str) -> Option<LedgerEntry> {
        let prefix: String = entry
            .description
            .to_lowercase()
            .chars()
            .take(DEDUP_DESCRIPTION_PREFIX)
            .collect();
        let key = format!(
            "{}|{:?}|{}|{:?}|{:?}|{:?}",
            entry.date, entry.charge_code, prefix, entry.debit, entry.credit, entry.balance
        );
        if self.seen.insert(key) {
            Some(entry)
        } else {
            debug!("suppressed duplicate row: {}", raw);
            None
        }
    }

    fn record_diagnostic(&mut self, line: &str) {
        if self.diagnostics.len() < self.diagnostic_limit {
            self.diagnostics.push(line.to_string());
        }
    }
}

fn rental_flag_for(classification: &crate::classify::ClassifiedDescription) -> RentalFlag {
    if classification.is_rental_charge {
        RentalFlag::Rental
    } else if classification.is_non_rental_charge {
        RentalFlag::NonRental
    } else {
        RentalFlag::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::map_columns;
    use crate::schema::ChargeCategory;

    fn tokenizer() -> RowTokenizer {
        RowTokenizer::new(&EngineConfig::default())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_code_bearing_rent_line() {
        let mut t = tokenizer();
        let entry = t
            .tokenize_line("07/01/2015 1 BASE RENT 1525.00 1525.00")
            .unwrap();
        assert_eq!(entry.date, date(2015, 7, 1));
        assert_eq!(entry.charge_code, Some(1));
        assert_eq!(entry.description, "BASE RENT");
        assert_eq!(entry.debit, Some(1525.00));
        assert_eq!(entry.credit, None);
        assert_eq!(entry.balance, Some(1525.00));
        assert_eq!(entry.is_rental, RentalFlag::Rental);
    }

    #[test]
    fn test_last_money_token_is_always_balance() {
        let mut t = tokenizer();
        let entry = t
            .tokenize_line("07/01/2015 25 AIR CONDITIONER 10.00 1535.00")
            .unwrap();
        assert_eq!(entry.balance, Some(1535.00));
        assert_eq!(entry.debit, Some(10.00));
        assert_eq!(entry.is_rental, RentalFlag::NonRental);

        let entry = t
            .tokenize_line("08/01/2015 2 COURT COSTS 100.00 200.00 1835.00")
            .unwrap();
        assert_eq!(entry.balance, Some(1835.00));
        assert_eq!(entry.debit, Some(100.00));
        assert_eq!(entry.credit, Some(200.00));
    }

    #[test]
    fn test_payment_line_single_movement_goes_to_credit() {
        let mut t = tokenizer();
        let entry = t.tokenize_line("07/23/2015 PAYMENT 1525.00 10.00").unwrap();
        assert_eq!(entry.credit, Some(1525.00));
        assert_eq!(entry.debit, None);
        assert_eq!(entry.balance, Some(10.00));
        assert_eq!(entry.is_rental, RentalFlag::Unknown);
    }

    #[test]
    fn test_negative_single_movement_goes_to_credit() {
        let mut t = tokenizer();
        let entry = t
            .tokenize_line("07/23/2015 ADJUSTMENT (25.00) 1500.00")
            .unwrap();
        assert_eq!(entry.credit, Some(25.00));
        assert_eq!(entry.debit, None);
    }

    #[test]
    fn test_balance_only_row() {
        let mut t = tokenizer();
        let entry = t.tokenize_line("01/01/2015 BALANCE FORWARD 2000.00").unwrap();
        assert!(entry.is_balance_only());
        assert_eq!(entry.balance, Some(2000.00));
    }

    #[test]
    fn test_reference_numbers_are_not_money() {
        let mut t = tokenizer();
        // 1428701 is a control number, not an amount
        let entry = t
            .tokenize_line("09/01/2015 1 RENT 1428701 1525.00 3060.00")
            .unwrap();
        assert_eq!(entry.debit, Some(1525.00));
        assert_eq!(entry.balance, Some(3060.00));
        assert!(entry.description.contains("1428701"));
    }

    #[test]
    fn test_date_without_money_rejected_with_diagnostic() {
        let mut t = tokenizer();
        assert!(t.tokenize_line("07/05/2015 TENANT CALLED RE NOTICE").is_none());
        assert_eq!(t.diagnostics().len(), 1);
        // No date at all: skipped silently
        assert!(t.tokenize_line("TOTAL DUE AT END OF PERIOD").is_none());
        assert_eq!(t.diagnostics().len(), 1);
    }

    #[test]
    fn test_diagnostic_sample_is_bounded() {
        let config = EngineConfig {
            diagnostic_sample_limit: 2,
            ..Default::default()
        };
        let mut t = RowTokenizer::new(&config);
        for day in 1..=5 {
            t.tokenize_line(&format!("07/{:02}/2015 NOTE WITHOUT AMOUNTS", day));
        }
        assert_eq!(t.diagnostics().len(), 2);
    }

    #[test]
    fn test_duplicate_rows_suppressed() {
        let mut t = tokenizer();
        assert!(t.tokenize_line("07/01/2015 1 BASE RENT 1525.00 1525.00").is_some());
        assert!(t.tokenize_line("07/01/2015 1 BASE RENT 1525.00 1525.00").is_none());
    }

    #[test]
    fn test_second_date_stays_in_description() {
        let mut t = tokenizer();
        // The trailing date is a service-period reference the backdating
        // logic reads later; only the leading date anchors the entry.
        let entry = t
            .tokenize_line("10/05/2015 LATE FEE 09/15/2015 50.00 1575.00")
            .unwrap();
        assert_eq!(entry.date, date(2015, 10, 5));
        assert!(entry.description.contains("09/15/2015"));
        assert_eq!(entry.debit, Some(50.00));
    }

    #[test]
    fn test_free_text_source_end_to_end() {
        let text = "\
Resident Ledger

07/01/2015 1 BASE RENT 1525.00 1525.00
07/01/2015 25 AIR CONDITIONER 10.00 1535.00
07/23/2015 PAYMENT 1525.00 10.00
";
        let mut t = tokenizer();
        let entries = t.tokenize_source(&FreeTextSource::new(text));
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].balance, Some(10.00));
    }

    #[test]
    fn test_structured_rows_with_full_mapping() {
        let headers: Vec<String> = ["Date", "Charge Code", "Description", "Debit", "Credit", "Balance"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = map_columns(&headers);
        let mut t = tokenizer();

        let row: Vec<String> = ["07/01/2015", "1", "BASE RENT", "1525.00", "", "1525.00"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let entry = t.tokenize_cells(&row, &mapping).unwrap();
        assert_eq!(entry.debit, Some(1525.00));
        assert_eq!(entry.balance, Some(1525.00));
        assert!(!entry.balance_synthesized);
        assert_eq!(entry.is_rental, RentalFlag::Rental);
    }

    #[test]
    fn test_generic_amount_column_uses_sign_and_classification() {
        let headers: Vec<String> = ["Date", "Description", "Amount", "Balance"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = map_columns(&headers);
        let mut t = tokenizer();

        let charge: Vec<String> = ["07/01/2015", "LATE FEE", "50.00", "1575.00"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let entry = t.tokenize_cells(&charge, &mapping).unwrap();
        assert_eq!(entry.debit, Some(50.00));

        let payment: Vec<String> = ["07/10/2015", "ACH PAYMENT", "1525.00", "50.00"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let entry = t.tokenize_cells(&payment, &mapping).unwrap();
        assert_eq!(entry.credit, Some(1525.00));
    }

    #[test]
    fn test_missing_balance_column_synthesizes_running_total() {
        let headers: Vec<String> = ["Date", "Description", "Debit", "Credit"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = map_columns(&headers);
        let mut t = tokenizer().with_opening_balance(100.0);

        let rows = [
            ["07/01/2015", "BASE RENT", "1525.00", ""],
            ["07/10/2015", "PAYMENT", "", "1525.00"],
        ];
        let mut produced = Vec::new();
        for row in rows {
            let cells: Vec<String> = row.iter().map(|s| s.to_string()).collect();
            produced.push(t.tokenize_cells(&cells, &mapping).unwrap());
        }

        assert_eq!(produced[0].balance, Some(1625.00));
        assert!(produced[0].balance_synthesized);
        assert_eq!(produced[1].balance, Some(100.00));
        assert!(produced[1].balance_synthesized);
        assert!(t.synthesized_any_balance());
    }
}

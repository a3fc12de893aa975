use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether an entry represents a rental charge, a non-rental charge, or
/// something we could not determine from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalFlag {
    Rental,
    NonRental,
    Unknown,
}

/// Closed set of charge categories recognized by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeCategory {
    Rent,
    LateFee,
    LegalFees,
    BadCheck,
    SecurityDeposit,
    Maintenance,
    Utilities,
    Internet,
    AirConditioner,
    Parking,
    AdminFee,
    Other,
}

impl ChargeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ChargeCategory::Rent => "rent",
            ChargeCategory::LateFee => "late fee",
            ChargeCategory::LegalFees => "legal fees",
            ChargeCategory::BadCheck => "bad check",
            ChargeCategory::SecurityDeposit => "security deposit",
            ChargeCategory::Maintenance => "maintenance",
            ChargeCategory::Utilities => "utilities",
            ChargeCategory::Internet => "internet",
            ChargeCategory::AirConditioner => "air conditioner",
            ChargeCategory::Parking => "parking",
            ChargeCategory::AdminFee => "admin fee",
            ChargeCategory::Other => "other",
        }
    }
}

/// One dated transaction from a ledger statement.
///
/// `balance` is the running total as stated by the source and is trusted
/// verbatim when present. Entries are immutable once produced; downstream
/// computation only reads or copies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    /// Description text with matched date/money/code substrings stripped.
    pub description: String,
    /// Unsigned charge amount, if the row carries one.
    pub debit: Option<f64>,
    /// Unsigned payment amount, if the row carries one.
    pub credit: Option<f64>,
    /// Running total as stated by the source document.
    pub balance: Option<f64>,
    /// Numeric charge code printed next to the date, when the format has one.
    pub charge_code: Option<u32>,
    pub is_rental: RentalFlag,
    /// True when `balance` was reconstructed as a running total rather than
    /// read from the source.
    #[serde(default)]
    pub balance_synthesized: bool,
}

impl LedgerEntry {
    pub fn new(date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            date,
            description: description.into(),
            debit: None,
            credit: None,
            balance: None,
            charge_code: None,
            is_rental: RentalFlag::Unknown,
            balance_synthesized: false,
        }
    }

    /// A row that states a balance but moves no money.
    pub fn is_balance_only(&self) -> bool {
        self.debit.is_none() && self.credit.is_none() && self.balance.is_some()
    }
}

/// Summary of a charge classified as rent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalCharge {
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
}

/// Summary of a charge classified as something other than rent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonRentalCharge {
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub category: ChargeCategory,
}

/// Sorts entries ascending by date. `sort_by_key` is stable, so same-day
/// rows keep their document order — the settlement-scan logic depends on
/// that relative order, not just on dates.
pub fn sort_entries(entries: &mut [LedgerEntry]) {
    entries.sort_by_key(|e| e.date);
}

/// Empirical thresholds for the arrears engine.
///
/// These values come from observed ledger behavior, not from a derivation;
/// they are exposed as named configuration so domain owners can tune them
/// without touching the algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// An extracted issue date more than this many days behind the newest
    /// ledger entry is treated as a mis-extraction and discarded.
    #[serde(default = "default_stale_issue_days")]
    pub stale_issue_days: i64,

    /// A backdated charge must post within this many days after the issue
    /// date to qualify for the backdating override.
    #[serde(default = "default_backdating_window_days")]
    pub backdating_window_days: i64,

    /// Tighter posting window applied when the only backdating evidence is
    /// a bare numeric date in the description.
    #[serde(default = "default_backdating_bare_date_window_days")]
    pub backdating_bare_date_window_days: i64,

    /// Minimum number of security-deposit rows before the deposit
    /// settlement heuristic can fire.
    #[serde(default = "default_deposit_settlement_min_rows")]
    pub deposit_settlement_min_rows: usize,

    /// Maximum number of months step 3 walks backward looking for a row.
    #[serde(default = "default_month_search_limit")]
    pub month_search_limit: u32,

    /// As-of days of month 1..=this target the previous calendar month.
    #[serde(default = "default_early_month_cutoff_day")]
    pub early_month_cutoff_day: u32,

    /// Cap on retained samples of rejected lines.
    #[serde(default = "default_diagnostic_sample_limit")]
    pub diagnostic_sample_limit: usize,
}

fn default_stale_issue_days() -> i64 {
    120
}
fn default_backdating_window_days() -> i64 {
    60
}
fn default_backdating_bare_date_window_days() -> i64 {
    45
}
fn default_deposit_settlement_min_rows() -> usize {
    2
}
fn default_month_search_limit() -> u32 {
    24
}
fn default_early_month_cutoff_day() -> u32 {
    5
}
fn default_diagnostic_sample_limit() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_issue_days: default_stale_issue_days(),
            backdating_window_days: default_backdating_window_days(),
            backdating_bare_date_window_days: default_backdating_bare_date_window_days(),
            deposit_settlement_min_rows: default_deposit_settlement_min_rows(),
            month_search_limit: default_month_search_limit(),
            early_month_cutoff_day: default_early_month_cutoff_day(),
            diagnostic_sample_limit: default_diagnostic_sample_limit(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stale_issue_days < 0 {
            return Err(LedgerError::InvalidConfig {
                field: "stale_issue_days",
                details: format!("{} must be non-negative", self.stale_issue_days),
            });
        }
        if self.backdating_window_days < 0 || self.backdating_bare_date_window_days < 0 {
            return Err(LedgerError::InvalidConfig {
                field: "backdating_window_days",
                details: "backdating windows must be non-negative".to_string(),
            });
        }
        if !(1..=28).contains(&self.early_month_cutoff_day) {
            return Err(LedgerError::InvalidConfig {
                field: "early_month_cutoff_day",
                details: format!("{} must be between 1 and 28", self.early_month_cutoff_day),
            });
        }
        if self.month_search_limit == 0 {
            return Err(LedgerError::InvalidConfig {
                field: "month_search_limit",
                details: "must allow at least one month".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(y: i32, m: u32, d: u32, desc: &str) -> LedgerEntry {
        LedgerEntry::new(NaiveDate::from_ymd_opt(y, m, d).unwrap(), desc)
    }

    #[test]
    fn test_sort_is_stable_for_same_day_rows() {
        let mut entries = vec![
            entry(2023, 5, 1, "second march row"),
            entry(2023, 3, 1, "rent"),
            entry(2023, 3, 1, "late fee"),
            entry(2023, 3, 1, "payment"),
        ];
        // Tag original order through the description
        sort_entries(&mut entries);

        assert_eq!(entries[0].description, "rent");
        assert_eq!(entries[1].description, "late fee");
        assert_eq!(entries[2].description, "payment");
        assert_eq!(entries[3].description, "second march row");

        // Non-decreasing by date
        for pair in entries.windows(2) {
            assert!(pair[0].date <= pair[1].date);
        }
    }

    #[test]
    fn test_default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_cutoff_day_rejected() {
        let config = EngineConfig {
            early_month_cutoff_day: 31,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_balance_only_row() {
        let mut e = entry(2023, 1, 1, "balance forward");
        e.balance = Some(100.0);
        assert!(e.is_balance_only());
        e.debit = Some(50.0);
        assert!(!e.is_balance_only());
    }
}

//! Audit trail for the arrears calculation.
//!
//! Every automatic decision and fallback the engine takes is recorded
//! here with both the machine data and a human-readable rationale, so a
//! reviewer can reconstruct the figure without re-running anything.
//! Callers distinguish degraded output from clean output by reading the
//! trace, never by catching an error.

use crate::error::Result;
use crate::schema::ChargeCategory;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationTrace {
    pub step1: SettlementTrace,
    pub step2: NonRentTrace,
    pub step3: SelectionTrace,
    pub step4: FormulaTrace,
    /// Document-level observations: discarded issue dates, synthesized
    /// balances, heuristics that fired.
    pub notes: Vec<String>,
}

impl CalculationTrace {
    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Step 1: settlement point scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementTrace {
    pub found: bool,
    pub index: Option<usize>,
    pub date: Option<NaiveDate>,
    pub balance: Option<f64>,
    pub logic: String,
}

/// How step 2 arrived at its non-rent total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NonRentMethod {
    /// Rows strictly after the settlement point's array index.
    AfterSettlementIndex,
    /// No settlement point; charges after the opening balance-forward row.
    DateFilterFallback,
    /// No settlement point and no date anchor; every non-rent charge.
    #[default]
    AllNonRentFallback,
}

/// One charge included in the step-2 total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditItem {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: Option<ChargeCategory>,
}

/// Step 2: non-rent total since settlement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NonRentTrace {
    pub method: NonRentMethod,
    pub items: Vec<AuditItem>,
    pub total: f64,
    pub deposit_heuristic_fired: bool,
    pub logic: String,
}

/// How step 3 picked the current balance due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Latest non-rent, non-payment row in the target month.
    TargetMonthNonRent,
    /// Latest row of any kind in the target month.
    TargetMonthLatest,
    /// A backdated charge referencing a pre-issue period was selected
    /// directly, bypassing the month search.
    BackdatingOverride,
    /// No row in any searched month; most recent known balance.
    #[default]
    MostRecentBalanceFallback,
}

/// Year-month pair used by the billing-cycle targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMonth {
    pub year: i32,
    pub month: u32,
}

impl std::fmt::Display for TargetMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Step 3: current-balance selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionTrace {
    pub rule: SelectionRule,
    pub target_month: Option<TargetMonth>,
    /// How many months the search stepped back from the target month.
    pub months_stepped_back: u32,
    pub selected_date: Option<NaiveDate>,
    pub selected_balance: Option<f64>,
    pub logic: String,
}

/// Step 4: the final subtraction, spelled out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormulaTrace {
    pub formula: String,
    pub selected_balance: f64,
    pub non_rent_total: f64,
    pub arrears: f64,
}

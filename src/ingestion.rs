//! Boundary adapters for data produced outside the core.
//!
//! Two collaborators hand us pre-shaped data: a spreadsheet reader
//! (header cells plus rows) and a remote extraction fallback that is only
//! consulted when direct parsing yields nothing usable. The remote
//! record's schema is generated from [`ExternalLedgerRecord`], which is
//! why its fields carry descriptions. Either way the calculation engine
//! treats the converted entries identically to directly parsed ones.

use crate::classify::classify;
use crate::schema::{LedgerEntry, RentalFlag};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Header cells and data rows from an external spreadsheet reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDocument {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExternalLedgerEntry {
    #[schemars(description = "Transaction date in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(
        description = "Description text as it appears on the statement, without amounts or codes"
    )]
    pub description: String,

    #[schemars(description = "Unsigned charge amount, if the row charges anything")]
    pub debit: Option<f64>,

    #[schemars(description = "Unsigned payment amount, if the row pays anything")]
    pub credit: Option<f64>,

    #[schemars(
        description = "Running balance stated by the source for this row. Omit rather than guess."
    )]
    pub balance: Option<f64>,

    #[schemars(description = "Numeric charge code printed next to the date, when the format has one")]
    pub charge_code: Option<u32>,
}

/// A full ledger as produced by the remote extraction fallback.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExternalLedgerRecord {
    #[schemars(description = "Every dated transaction found in the document, in document order")]
    pub entries: Vec<ExternalLedgerEntry>,

    #[schemars(description = "Balance carried into the statement period, if stated")]
    pub opening_balance: Option<f64>,

    #[schemars(description = "Balance at the end of the statement period, if stated")]
    pub final_balance: Option<f64>,
}

impl ExternalLedgerRecord {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExternalLedgerRecord)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

/// Converts externally extracted entries into core ledger entries,
/// classifying each description the same way the tokenizer does.
pub fn convert_external_record(record: &ExternalLedgerRecord) -> Vec<LedgerEntry> {
    record
        .entries
        .iter()
        .map(|raw| {
            let classification = classify(&raw.description, raw.charge_code);
            let mut entry = LedgerEntry::new(raw.date, raw.description.clone());
            entry.debit = raw.debit.map(f64::abs);
            entry.credit = raw.credit.map(f64::abs);
            entry.balance = raw.balance;
            entry.charge_code = raw.charge_code;
            entry.is_rental = if classification.is_rental_charge {
                RentalFlag::Rental
            } else if classification.is_non_rental_charge {
                RentalFlag::NonRental
            } else {
                RentalFlag::Unknown
            };
            entry
        })
        .collect()
}

//! Maps spreadsheet header cells to semantic column types.
//!
//! Property-management exports disagree wildly on header vocabulary, so
//! mapping is score-based over per-type synonym lists rather than exact
//! lookup. A failed mapping is reported, not fatal: callers fall back to
//! the free-text tokenizer.

use crate::normalize::{parse_amount, parse_date};
use log::debug;
use serde::{Deserialize, Serialize};

/// Score for a header cell that equals a synonym after normalization.
const SCORE_EXACT: f64 = 1.0;
/// Score when one side contains the other as a substring.
const SCORE_SUBSTRING: f64 = 0.85;
/// Confidence assigned when a missing debit/credit partner is rescued from
/// an unknown column by keyword-family scan.
const SCORE_COMPLEMENT: f64 = 0.7;
/// Confidence assigned when sample-row values resolve an ambiguous header.
const SCORE_SAMPLE: f64 = 0.6;
/// Minimum confidence for a column to count as mapped at all.
const SCORE_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Date,
    ChargeCode,
    Description,
    Debit,
    Credit,
    /// A single signed movement column, used by formats that do not split
    /// debits and credits.
    Amount,
    Balance,
    Unit,
    FiscalPeriod,
    Reference,
    Unknown,
}

/// Overall layout family, derived from header vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerFormat {
    BldgUnit,
    TenantLedger,
    Standard,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedColumn {
    pub index: usize,
    pub header: String,
    pub column_type: ColumnType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub columns: Vec<MappedColumn>,
    pub format: LedgerFormat,
    /// True only when both `date` and `balance` are mapped at or above the
    /// confidence floor.
    pub has_all_required: bool,
}

impl ColumnMapping {
    pub fn index_of(&self, column_type: ColumnType) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.column_type == column_type && c.confidence >= SCORE_FLOOR)
            .map(|c| c.index)
    }

    /// True when the mapping can drive structured row extraction: a date
    /// column plus at least one money column. A missing balance column is
    /// fine here, the tokenizer synthesizes running totals for it.
    pub fn supports_row_extraction(&self) -> bool {
        self.index_of(ColumnType::Date).is_some()
            && (self.index_of(ColumnType::Balance).is_some()
                || self.index_of(ColumnType::Debit).is_some()
                || self.index_of(ColumnType::Credit).is_some()
                || self.index_of(ColumnType::Amount).is_some())
    }
}

const DATE_SYNONYMS: &[&str] = &[
    "date",
    "transaction date",
    "txn date",
    "post date",
    "posting date",
    "charge date",
];
const CHARGE_CODE_SYNONYMS: &[&str] = &[
    "code",
    "charge code",
    "chg code",
    "trans code",
    "transaction code",
];
const DESCRIPTION_SYNONYMS: &[&str] = &[
    "description",
    "memo",
    "details",
    "charge description",
    "transaction description",
    "remarks",
    "item",
];
const DEBIT_SYNONYMS: &[&str] = &["debit", "debits", "charge", "charges", "amount charged", "dr"];
const CREDIT_SYNONYMS: &[&str] = &[
    "credit",
    "credits",
    "payment",
    "payments",
    "amount paid",
    "paid",
    "cr",
    "receipt",
];
const AMOUNT_SYNONYMS: &[&str] = &["amount", "amt"];
const BALANCE_SYNONYMS: &[&str] = &[
    "balance",
    "running balance",
    "bal",
    "amount due",
    "total due",
    "balance due",
];
const UNIT_SYNONYMS: &[&str] = &["unit", "bldg unit", "bldg", "apt", "apartment"];
const FISCAL_PERIOD_SYNONYMS: &[&str] = &["period", "fiscal period", "fiscal year", "fy"];
const REFERENCE_SYNONYMS: &[&str] = &[
    "reference",
    "ref",
    "ref no",
    "check number",
    "check no",
    "ctrl",
    "control number",
];

const SCORED_TYPES: &[(ColumnType, &[&str])] = &[
    (ColumnType::Date, DATE_SYNONYMS),
    (ColumnType::ChargeCode, CHARGE_CODE_SYNONYMS),
    (ColumnType::Description, DESCRIPTION_SYNONYMS),
    (ColumnType::Debit, DEBIT_SYNONYMS),
    (ColumnType::Credit, CREDIT_SYNONYMS),
    (ColumnType::Amount, AMOUNT_SYNONYMS),
    (ColumnType::Balance, BALANCE_SYNONYMS),
    (ColumnType::Unit, UNIT_SYNONYMS),
    (ColumnType::FiscalPeriod, FISCAL_PERIOD_SYNONYMS),
    (ColumnType::Reference, REFERENCE_SYNONYMS),
];

/// Lowercase, collapse whitespace, strip punctuation.
fn normalize_header(cell: &str) -> String {
    let lowered = cell.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn word_overlap(a: &str, b: &str) -> f64 {
    let a_words: Vec<&str> = a.split_whitespace().collect();
    let b_words: Vec<&str> = b.split_whitespace().collect();
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }
    let shared = a_words.iter().filter(|w| b_words.contains(w)).count();
    let mut distinct: Vec<&str> = a_words.clone();
    for w in &b_words {
        if !distinct.contains(w) {
            distinct.push(w);
        }
    }
    shared as f64 / distinct.len() as f64
}

fn score_cell(normalized: &str, synonyms: &[&str]) -> f64 {
    let mut best: f64 = 0.0;
    for synonym in synonyms {
        let score = if normalized == *synonym {
            SCORE_EXACT
        } else if normalized.contains(synonym) {
            SCORE_SUBSTRING
        } else {
            word_overlap(normalized, synonym)
        };
        best = best.max(score);
    }
    best
}

/// Maps a header row to semantic column types.
pub fn map_columns(headers: &[String]) -> ColumnMapping {
    map_columns_with_samples(headers, &[])
}

/// Maps a header row, using sample data rows to resolve headers the
/// synonym tables could not place.
pub fn map_columns_with_samples(headers: &[String], samples: &[Vec<String>]) -> ColumnMapping {
    let mut columns: Vec<MappedColumn> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let normalized = normalize_header(header);
            let mut best_type = ColumnType::Unknown;
            let mut best_score = 0.0;
            for (column_type, synonyms) in SCORED_TYPES {
                let score = score_cell(&normalized, synonyms);
                if score > best_score {
                    best_score = score;
                    best_type = *column_type;
                }
            }
            if best_score < SCORE_FLOOR {
                best_type = ColumnType::Unknown;
            }
            MappedColumn {
                index,
                header: header.clone(),
                column_type: best_type,
                confidence: best_score,
            }
        })
        .collect();

    resolve_type_conflicts(&mut columns);
    rescue_missing_complement(&mut columns);
    resolve_from_samples(&mut columns, samples);

    let format = detect_format(headers);
    let has_all_required = has_mapped(&columns, ColumnType::Date)
        && has_mapped(&columns, ColumnType::Balance);

    if !has_all_required {
        debug!(
            "column mapping incomplete (date: {}, balance: {})",
            has_mapped(&columns, ColumnType::Date),
            has_mapped(&columns, ColumnType::Balance)
        );
    }

    ColumnMapping {
        columns,
        format,
        has_all_required,
    }
}

fn has_mapped(columns: &[MappedColumn], column_type: ColumnType) -> bool {
    columns
        .iter()
        .any(|c| c.column_type == column_type && c.confidence >= SCORE_FLOOR)
}

/// Two columns claiming the same type: keep the higher-confidence one.
fn resolve_type_conflicts(columns: &mut [MappedColumn]) {
    for (column_type, _) in SCORED_TYPES {
        let mut best: Option<(usize, f64)> = None;
        for (i, column) in columns.iter().enumerate() {
            if column.column_type != *column_type {
                continue;
            }
            match best {
                Some((_, score)) if column.confidence <= score => {}
                _ => best = Some((i, column.confidence)),
            }
        }
        if let Some((keep, _)) = best {
            for (i, column) in columns.iter_mut().enumerate() {
                if i != keep && column.column_type == *column_type {
                    column.column_type = ColumnType::Unknown;
                    column.confidence = 0.0;
                }
            }
        }
    }
}

/// Debit found without credit (or vice versa): scan the remaining unknown
/// headers for the complementary keyword family and claim one at reduced
/// confidence.
fn rescue_missing_complement(columns: &mut [MappedColumn]) {
    let has_debit = has_mapped(columns, ColumnType::Debit);
    let has_credit = has_mapped(columns, ColumnType::Credit);

    let (missing, synonyms) = match (has_debit, has_credit) {
        (true, false) => (ColumnType::Credit, CREDIT_SYNONYMS),
        (false, true) => (ColumnType::Debit, DEBIT_SYNONYMS),
        _ => return,
    };

    for column in columns.iter_mut() {
        if column.column_type != ColumnType::Unknown {
            continue;
        }
        let normalized = normalize_header(&column.header);
        let hit = synonyms.iter().any(|s| {
            normalized
                .split_whitespace()
                .any(|w| w == *s || (s.contains(w) && w.len() > 2))
        });
        if hit {
            debug!(
                "assigning {:?} to unknown column '{}' by complement scan",
                missing, column.header
            );
            column.column_type = missing;
            column.confidence = SCORE_COMPLEMENT;
            return;
        }
    }
}

/// For still-unknown columns, let sample values vote: a column of parseable
/// dates becomes the date column, a column of money tokens becomes the
/// balance column — but only if the type is still unclaimed.
fn resolve_from_samples(columns: &mut [MappedColumn], samples: &[Vec<String>]) {
    if samples.is_empty() {
        return;
    }
    let need_date = !has_mapped(columns, ColumnType::Date);
    let need_balance = !has_mapped(columns, ColumnType::Balance);
    if !need_date && !need_balance {
        return;
    }

    for column in columns.iter_mut() {
        if column.column_type != ColumnType::Unknown {
            continue;
        }
        let values: Vec<&str> = samples
            .iter()
            .filter_map(|row| row.get(column.index))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        if need_date && values.iter().all(|v| parse_date(v).is_some()) {
            column.column_type = ColumnType::Date;
            column.confidence = SCORE_SAMPLE;
        } else if need_balance && values.iter().all(|v| parse_amount(v).is_some()) {
            column.column_type = ColumnType::Balance;
            column.confidence = SCORE_SAMPLE;
        }
    }
}

fn detect_format(headers: &[String]) -> LedgerFormat {
    let vocabulary = headers
        .iter()
        .map(|h| normalize_header(h))
        .collect::<Vec<_>>()
        .join(" ");

    if vocabulary.contains("bldg") || vocabulary.contains("unit") {
        LedgerFormat::BldgUnit
    } else if vocabulary.contains("tenant ledger") {
        LedgerFormat::TenantLedger
    } else if vocabulary.contains("resident") || vocabulary.contains("ledger") {
        LedgerFormat::Standard
    } else {
        LedgerFormat::Custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_standard_header_row() {
        let mapping = map_columns(&headers(&[
            "Date",
            "Charge Code",
            "Description",
            "Debit",
            "Credit",
            "Balance",
        ]));

        assert_eq!(mapping.index_of(ColumnType::Date), Some(0));
        assert_eq!(mapping.index_of(ColumnType::ChargeCode), Some(1));
        assert_eq!(mapping.index_of(ColumnType::Description), Some(2));
        assert_eq!(mapping.index_of(ColumnType::Debit), Some(3));
        assert_eq!(mapping.index_of(ColumnType::Credit), Some(4));
        assert_eq!(mapping.index_of(ColumnType::Balance), Some(5));
        assert!(mapping.has_all_required);
    }

    #[test]
    fn test_substring_and_overlap_scores() {
        let mapping = map_columns(&headers(&["Posting Date", "Charges", "Running Balance"]));
        assert_eq!(mapping.index_of(ColumnType::Date), Some(0));
        assert_eq!(mapping.index_of(ColumnType::Debit), Some(1));
        assert_eq!(mapping.index_of(ColumnType::Balance), Some(2));
    }

    #[test]
    fn test_conflicting_columns_demoted() {
        let mapping = map_columns(&headers(&["Date", "Post Date", "Balance"]));
        // Exact "Date" wins; the weaker date column is demoted to unknown
        assert_eq!(mapping.index_of(ColumnType::Date), Some(0));
        let demoted = &mapping.columns[1];
        assert_eq!(demoted.column_type, ColumnType::Unknown);
    }

    #[test]
    fn test_complement_rescue() {
        // "Pay" is too truncated for the synonym tables but still carries
        // the credit keyword family, so the complement scan claims it.
        let mapping = map_columns(&headers(&["Date", "Debit", "Pay", "Balance"]));
        let credit = mapping
            .columns
            .iter()
            .find(|c| c.column_type == ColumnType::Credit)
            .expect("credit column rescued");
        assert_eq!(credit.index, 2);
        assert!((credit.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_required_reported_not_fatal() {
        let mapping = map_columns(&headers(&["Description", "Amount"]));
        assert!(!mapping.has_all_required);
        assert!(!mapping.supports_row_extraction());
    }

    #[test]
    fn test_balance_less_mapping_still_supports_extraction() {
        let mapping = map_columns(&headers(&["Date", "Description", "Debit", "Credit"]));
        assert!(!mapping.has_all_required);
        assert!(mapping.supports_row_extraction());
    }

    #[test]
    fn test_sample_rows_resolve_unknown_columns() {
        let sample_rows = vec![
            vec!["07/01/2015".to_string(), "rent".to_string(), "1525.00".to_string()],
            vec!["08/01/2015".to_string(), "rent".to_string(), "3050.00".to_string()],
        ];
        let mapping =
            map_columns_with_samples(&headers(&["Col A", "Col B", "Col C"]), &sample_rows);
        assert_eq!(mapping.index_of(ColumnType::Date), Some(0));
        assert_eq!(mapping.index_of(ColumnType::Balance), Some(2));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            map_columns(&headers(&["Bldg/Unit", "Date", "Balance"])).format,
            LedgerFormat::BldgUnit
        );
        assert_eq!(
            map_columns(&headers(&["Tenant Ledger", "Date", "Balance"])).format,
            LedgerFormat::TenantLedger
        );
        assert_eq!(
            map_columns(&headers(&["Resident", "Date", "Balance"])).format,
            LedgerFormat::Standard
        );
        assert_eq!(
            map_columns(&headers(&["Date", "Debit", "Credit", "Balance"])).format,
            LedgerFormat::Custom
        );
    }
}

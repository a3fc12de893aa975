//! Token-level normalization for ambiguous money and date strings.
//!
//! Ledger statements embed check numbers, control IDs and fiscal-period
//! codes right next to real charges, so these parsers are deliberately
//! strict: a token either matches a known money/date shape exactly or it
//! is rejected. Rejection returns `None`, never an approximate guess.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Two-digit years at or above this value read as 19xx, below as 20xx.
const CENTURY_PIVOT: u32 = 70;

fn money_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Exactly two decimal digits, optional comma grouping. A token without
    // a decimal point is never money here.
    RE.get_or_init(|| Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}$").unwrap())
}

/// Parses a raw token as a monetary amount.
///
/// A token is money only if it carries exactly two decimal digits,
/// optionally comma-grouped, optionally `$`-prefixed, and optionally
/// negated with a leading `-` or accounting-style parentheses. Bare
/// integers — in particular the 5+ digit reference and control numbers
/// these documents embed — are rejected.
pub fn parse_amount(token: &str) -> Option<f64> {
    let mut text = token.trim();
    if text.is_empty() {
        return None;
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') {
        negative = true;
        text = &text[1..text.len() - 1];
    }
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest;
    }
    if let Some(rest) = text.strip_prefix('$') {
        text = rest;
    }
    let text = text.trim();

    if !money_regex().is_match(text) {
        return None;
    }

    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Parses a raw token as a calendar date.
///
/// Accepted shapes: ISO `Y-M-D`, slash-delimited `M/D/Y` or `D/M/Y`
/// (a component value over 12 must be the day), and the dash-delimited
/// equivalents. Two-digit years pivot at 70. Anything else returns `None`.
pub fn parse_date(token: &str) -> Option<NaiveDate> {
    let text = token.trim();
    if text.is_empty() {
        return None;
    }

    let delimiter = if text.contains('/') {
        '/'
    } else if text.contains('-') {
        '-'
    } else {
        return None;
    };

    let parts: Vec<&str> = text.split(delimiter).collect();
    if parts.len() != 3 {
        return None;
    }
    if parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    // Four digits first means a year-first (ISO-like) form.
    if parts[0].len() == 4 {
        let year: i32 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        let day: u32 = parts[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let first: u32 = parts[0].parse().ok()?;
    let second: u32 = parts[1].parse().ok()?;
    let year = expand_year(parts[2])?;

    // A value over 12 cannot be a month; otherwise default to month-first,
    // which dominates the ledgers this handles.
    let (month, day) = if first > 12 {
        (second, first)
    } else {
        (first, second)
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn expand_year(text: &str) -> Option<i32> {
    match text.len() {
        4 => text.parse().ok(),
        2 => {
            let two: u32 = text.parse().ok()?;
            Some(if two >= CENTURY_PIVOT {
                1900 + two as i32
            } else {
                2000 + two as i32
            })
        }
        _ => None,
    }
}

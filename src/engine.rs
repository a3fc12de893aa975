//! The four-step arrears calculation.
//!
//! Inputs are the full sorted entry set, an optional extracted issue
//! date, and an as-of date. Every step has a deterministic fallback;
//! ambiguity resolves toward including uncertain charges and toward the
//! most recent known figure rather than zero. The engine never raises
//! for malformed or sparse ledgers — degraded paths are visible only in
//! the [`CalculationTrace`].

use crate::classify::{classify, mentions_security_deposit, normalize_squeezed, ClassifiedDescription};
use crate::normalize::parse_date;
use crate::schema::{EngineConfig, LedgerEntry, RentalFlag};
use crate::trace::{
    AuditItem, CalculationTrace, NonRentMethod, SelectionRule, TargetMonth,
};
use chrono::{Datelike, NaiveDate};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The most recent entry whose stated balance is at or below zero; the
/// origin for "arrears since".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettlementPoint {
    pub index: usize,
    pub date: NaiveDate,
    pub balance: f64,
}

/// Scalar results of one calculation, with the full audit trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrearsOutcome {
    pub effective_as_of: NaiveDate,
    pub settlement: Option<SettlementPoint>,
    pub non_rent_since_settlement: f64,
    pub selected_balance: f64,
    pub arrears: f64,
    pub trace: CalculationTrace,
}

pub struct ArrearsEngine {
    config: EngineConfig,
    // Backdating reference shapes, strongest first: "(MM/YYYY)",
    // "Mon D, YYYY". Bare numeric dates are handled token-wise.
    paren_month_re: Regex,
    month_name_re: Regex,
}

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

impl ArrearsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            paren_month_re: Regex::new(r"\((\d{1,2})\s*/\s*(\d{4})\)").unwrap(),
            month_name_re: Regex::new(
                r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})",
            )
            .unwrap(),
        }
    }

    /// Runs steps 0-4 over a sorted entry set.
    ///
    /// `entries` must already be date-sorted with document order preserved
    /// for same-day rows; step 2 iterates by array index, not by date.
    pub fn calculate(
        &self,
        entries: &[LedgerEntry],
        issue_date: Option<NaiveDate>,
        as_of: NaiveDate,
    ) -> ArrearsOutcome {
        let mut trace = CalculationTrace::default();
        let classifications: Vec<ClassifiedDescription> = entries
            .iter()
            .map(|e| classify(&e.description, e.charge_code))
            .collect();

        // Step 0: effective as-of date.
        let newest = entries.iter().map(|e| e.date).max();
        let mut valid_issue = issue_date;
        let effective_as_of = match (issue_date, newest) {
            (Some(issue), Some(newest))
                if (newest - issue).num_days() > self.config.stale_issue_days =>
            {
                trace.push_note(format!(
                    "issue date {} is more than {} days behind the newest entry {}; discarding it as a mis-extraction",
                    issue, self.config.stale_issue_days, newest
                ));
                valid_issue = None;
                newest
            }
            (Some(issue), _) => issue,
            (None, _) => as_of,
        };
        // Future-rent exclusion and backdating need an issue-date concept
        // even when none was extracted.
        let reference_issue = valid_issue.unwrap_or(effective_as_of);

        if entries.is_empty() {
            trace.push_note("no date-bearing rows found; returning all-zero fallback result");
            trace.step4.formula = "0.00 - 0.00 = 0.00".to_string();
            return ArrearsOutcome {
                effective_as_of,
                settlement: None,
                non_rent_since_settlement: 0.0,
                selected_balance: 0.0,
                arrears: 0.0,
                trace,
            };
        }
        if entries.iter().any(|e| e.balance_synthesized) {
            trace.push_note(
                "one or more balances were synthesized as running totals, not read from the source",
            );
        }

        let deposit_excluded = self.deposit_settlement_fired(entries, &mut trace);

        let settlement = self.step1_settlement_point(entries, &mut trace);
        let non_rent_total = self.step2_non_rent_total(
            entries,
            &classifications,
            settlement,
            deposit_excluded,
            &mut trace,
        );
        let selected_balance = self.step3_select_balance(
            entries,
            &classifications,
            effective_as_of,
            reference_issue,
            &mut trace,
        );

        // Step 4
        let arrears = selected_balance - non_rent_total;
        trace.step4.selected_balance = selected_balance;
        trace.step4.non_rent_total = non_rent_total;
        trace.step4.arrears = arrears;
        trace.step4.formula = format!(
            "{:.2} - {:.2} = {:.2}",
            selected_balance, non_rent_total, arrears
        );

        ArrearsOutcome {
            effective_as_of,
            settlement,
            non_rent_since_settlement: non_rent_total,
            selected_balance,
            arrears,
            trace,
        }
    }

    /// Security-deposit settlement heuristic: once a deposit is refunded,
    /// reversed, or zeroed out, every deposit row drops out of non-rent
    /// totals for the whole computation.
    fn deposit_settlement_fired(
        &self,
        entries: &[LedgerEntry],
        trace: &mut CalculationTrace,
    ) -> bool {
        let deposit_rows: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| mentions_security_deposit(&e.description))
            .map(|(i, _)| i)
            .collect();

        if deposit_rows.len() < self.config.deposit_settlement_min_rows {
            return false;
        }

        let fired = deposit_rows[1..].iter().any(|&i| {
            let e = &entries[i];
            let squeezed = normalize_squeezed(&e.description);
            let settlement_wording = squeezed.contains("refund")
                || squeezed.contains("reversal")
                || squeezed.contains("reclass");
            let all_zero = e.debit.unwrap_or(0.0) == 0.0
                && e.credit.unwrap_or(0.0) == 0.0
                && e.balance == Some(0.0);
            settlement_wording || e.credit.unwrap_or(0.0) > 0.0 || all_zero
        });

        if fired {
            trace.step2.deposit_heuristic_fired = true;
            trace.push_note(format!(
                "{} security-deposit rows with a settlement signal; excluding all deposit rows from non-rent totals",
                deposit_rows.len()
            ));
        }
        fired
    }

    fn step1_settlement_point(
        &self,
        entries: &[LedgerEntry],
        trace: &mut CalculationTrace,
    ) -> Option<SettlementPoint> {
        let found = entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.balance.is_some_and(|b| b <= 0.0))
            .map(|(index, e)| SettlementPoint {
                index,
                date: e.date,
                balance: e.balance.unwrap_or(0.0),
            });

        match found {
            Some(point) => {
                trace.step1.found = true;
                trace.step1.index = Some(point.index);
                trace.step1.date = Some(point.date);
                trace.step1.balance = Some(point.balance);
                trace.step1.logic = format!(
                    "most recent balance <= 0 is {:.2} on {} (row {})",
                    point.balance, point.date, point.index
                );
            }
            None => {
                trace.step1.logic =
                    "no entry with balance <= 0; step 2 uses a global fallback".to_string();
            }
        }
        found
    }

    fn step2_non_rent_total(
        &self,
        entries: &[LedgerEntry],
        classifications: &[ClassifiedDescription],
        settlement: Option<SettlementPoint>,
        deposit_excluded: bool,
        trace: &mut CalculationTrace,
    ) -> f64 {
        let include = |i: usize| -> bool {
            let e = &entries[i];
            let cls = &classifications[i];
            let payment_like =
                cls.is_payment || cls.is_balance_forward || e.credit.unwrap_or(0.0) > 0.0;
            e.debit.unwrap_or(0.0) > 0.0
                && !payment_like
                && e.is_rental != RentalFlag::Rental
                && !(deposit_excluded && mentions_security_deposit(&e.description))
        };

        let indices: Vec<usize> = match settlement {
            Some(point) => {
                // Strictly after the settlement row's array index: same-day
                // rows behind the settlement stay out, same-day rows after
                // it stay in.
                trace.step2.method = NonRentMethod::AfterSettlementIndex;
                trace.step2.logic = format!(
                    "summing non-rent debits in rows {}..{}",
                    point.index + 1,
                    entries.len()
                );
                (point.index + 1..entries.len()).filter(|&i| include(i)).collect()
            }
            None => {
                // No settlement point. An opening balance-forward row
                // restates everything before it and serves as a date
                // anchor; with no anchor either, take every non-rent
                // charge ever seen.
                let anchor = entries
                    .iter()
                    .zip(classifications)
                    .find(|(_, c)| c.is_balance_forward)
                    .map(|(e, _)| e.date);
                match anchor {
                    Some(anchor_date) => {
                        trace.step2.method = NonRentMethod::DateFilterFallback;
                        trace.step2.logic = format!(
                            "no settlement point; summing non-rent charges dated {} or later",
                            anchor_date
                        );
                        (0..entries.len())
                            .filter(|&i| entries[i].date >= anchor_date && include(i))
                            .collect()
                    }
                    None => {
                        trace.step2.method = NonRentMethod::AllNonRentFallback;
                        trace.step2.logic =
                            "no settlement point and no balance-forward anchor; summing all non-rent charges"
                                .to_string();
                        (0..entries.len()).filter(|&i| include(i)).collect()
                    }
                }
            }
        };

        let mut total = 0.0;
        for &i in &indices {
            let e = &entries[i];
            let amount = e.debit.unwrap_or(0.0);
            total += amount;
            trace.step2.items.push(AuditItem {
                date: e.date,
                description: e.description.clone(),
                amount,
                category: classifications[i].category,
            });
        }
        trace.step2.total = total;
        debug!(
            "step 2: {} non-rent items totaling {:.2}",
            indices.len(),
            total
        );
        total
    }

    fn step3_select_balance(
        &self,
        entries: &[LedgerEntry],
        classifications: &[ClassifiedDescription],
        effective_as_of: NaiveDate,
        reference_issue: NaiveDate,
        trace: &mut CalculationTrace,
    ) -> f64 {
        // A statement's issue date must not be defeated by next cycle's
        // rent posting; future non-rent and payment rows stay in.
        let candidate = |i: usize| -> bool {
            let e = &entries[i];
            !(e.is_rental == RentalFlag::Rental && e.date > reference_issue)
        };

        if let Some(balance) = self.backdating_override(
            entries,
            classifications,
            reference_issue,
            trace,
        ) {
            return balance;
        }

        // Billing-cycle rule: in the first days of a month the statement
        // still describes the previous cycle.
        let (mut year, mut month) = if effective_as_of.day() <= self.config.early_month_cutoff_day {
            previous_month(effective_as_of.year(), effective_as_of.month())
        } else {
            (effective_as_of.year(), effective_as_of.month())
        };
        trace.step3.target_month = Some(TargetMonth { year, month });

        for step in 0..self.config.month_search_limit {
            let in_month: Vec<usize> = (0..entries.len())
                .filter(|&i| {
                    candidate(i)
                        && entries[i].balance.is_some()
                        && entries[i].date.year() == year
                        && entries[i].date.month() == month
                })
                .collect();

            if !in_month.is_empty() {
                // Prefer the latest non-rent, non-payment charge so a fee
                // or adjustment still drives the figure; otherwise take
                // the latest row of any kind rather than stepping back.
                let preferred = in_month
                    .iter()
                    .rev()
                    .find(|&&i| {
                        classifications[i].is_non_rental_charge && !classifications[i].is_payment
                    })
                    .copied();

                let (selected, rule) = match preferred {
                    Some(i) => (i, SelectionRule::TargetMonthNonRent),
                    None => (*in_month.last().expect("non-empty"), SelectionRule::TargetMonthLatest),
                };

                let e = &entries[selected];
                trace.step3.rule = rule;
                trace.step3.months_stepped_back = step;
                trace.step3.selected_date = Some(e.date);
                trace.step3.selected_balance = e.balance;
                trace.step3.logic = format!(
                    "selected {:.2} from {} in month {:04}-{:02} ({} months back, {:?})",
                    e.balance.unwrap_or(0.0),
                    e.date,
                    year,
                    month,
                    step,
                    rule
                );
                return e.balance.unwrap_or(0.0);
            }

            let (py, pm) = previous_month(year, month);
            year = py;
            month = pm;
        }

        // Nothing in any searched month: most recent known balance.
        let last_known = entries
            .iter()
            .rev()
            .find_map(|e| e.balance.map(|b| (e.date, b)));
        trace.step3.rule = SelectionRule::MostRecentBalanceFallback;
        match last_known {
            Some((date, balance)) => {
                trace.step3.selected_date = Some(date);
                trace.step3.selected_balance = Some(balance);
                trace.step3.logic = format!(
                    "no row in the {} searched months; falling back to most recent known balance {:.2} from {}",
                    self.config.month_search_limit, balance, date
                );
                balance
            }
            None => {
                trace.step3.logic =
                    "no entry carries a balance at all; selected balance defaults to zero"
                        .to_string();
                0.0
            }
        }
    }

    /// A charge posted shortly after the issue date whose text references
    /// an on-or-before-issue period is the statement's own figure posted
    /// late; its balance is selected directly.
    fn backdating_override(
        &self,
        entries: &[LedgerEntry],
        classifications: &[ClassifiedDescription],
        reference_issue: NaiveDate,
        trace: &mut CalculationTrace,
    ) -> Option<f64> {
        let mut best: Option<usize> = None;

        for (i, e) in entries.iter().enumerate() {
            let cls = &classifications[i];
            if cls.is_payment
                || cls.is_balance_forward
                || e.is_rental == RentalFlag::Rental
                || e.debit.unwrap_or(0.0) <= 0.0
                || e.balance.is_none()
            {
                continue;
            }
            let days_after = (e.date - reference_issue).num_days();
            if days_after < 0 {
                continue;
            }

            let Some((referenced, strong)) = self.backdated_reference(&e.description) else {
                continue;
            };
            let window = if strong {
                self.config.backdating_window_days
            } else {
                self.config.backdating_bare_date_window_days
            };
            if days_after > window || referenced > reference_issue {
                continue;
            }
            best = Some(i);
        }

        let i = best?;
        let e = &entries[i];
        trace.step3.rule = SelectionRule::BackdatingOverride;
        trace.step3.selected_date = Some(e.date);
        trace.step3.selected_balance = e.balance;
        trace.step3.logic = format!(
            "charge on {} references a period on or before the issue date {}; selecting its balance {:.2} directly",
            e.date,
            reference_issue,
            e.balance.unwrap_or(0.0)
        );
        e.balance
    }

    /// Extracts an earlier-period reference from description text.
    /// Returns the referenced date and whether the evidence is strong
    /// (explicit `(MM/YYYY)` or `"Mon D, YYYY"` phrasing) or weak (a bare
    /// numeric date token).
    fn backdated_reference(&self, description: &str) -> Option<(NaiveDate, bool)> {
        if let Some(caps) = self.paren_month_re.captures(description) {
            let month: u32 = caps[1].parse().ok()?;
            let year: i32 = caps[2].parse().ok()?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
                return Some((date, true));
            }
        }

        if let Some(caps) = self.month_name_re.captures(description) {
            let name = caps[1].to_lowercase();
            let month = MONTH_NAMES.iter().position(|m| *m == name)? as u32 + 1;
            let day: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some((date, true));
            }
        }

        for token in description.split_whitespace() {
            let trimmed = token.trim_matches(|c: char| !c.is_ascii_digit());
            if let Some(date) = parse_date(trimmed) {
                return Some((date, false));
            }
        }
        None
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

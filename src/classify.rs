//! Deterministic description classifier mapping ledger row text to
//! {payment, rental charge, non-rental charge, balance forward}.
//!
//! Rules are an ordered list evaluated in fixed sequence; the first match
//! wins. Keyword families overlap deliberately ("legal rent" vs "legal",
//! "parking rent" vs "rent"), so the priority order is itself an invariant
//! covered by tests, not an implementation detail.

use crate::schema::ChargeCategory;
use serde::{Deserialize, Serialize};

/// Outcome of one classification pass. Exactly one of the four flags is
/// set; `category` accompanies non-rental charges (and `Rent` for rental
/// ones).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedDescription {
    pub is_payment: bool,
    pub is_rental_charge: bool,
    pub is_non_rental_charge: bool,
    pub is_balance_forward: bool,
    pub category: Option<ChargeCategory>,
}

impl ClassifiedDescription {
    fn payment() -> Self {
        Self {
            is_payment: true,
            is_rental_charge: false,
            is_non_rental_charge: false,
            is_balance_forward: false,
            category: None,
        }
    }

    fn rent() -> Self {
        Self {
            is_payment: false,
            is_rental_charge: true,
            is_non_rental_charge: false,
            is_balance_forward: false,
            category: Some(ChargeCategory::Rent),
        }
    }

    fn non_rent(category: ChargeCategory) -> Self {
        Self {
            is_payment: false,
            is_rental_charge: false,
            is_non_rental_charge: true,
            is_balance_forward: false,
            category: Some(category),
        }
    }

    fn balance_forward() -> Self {
        Self {
            is_payment: false,
            is_rental_charge: false,
            is_non_rental_charge: false,
            is_balance_forward: true,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Rent,
    BalanceForward,
    Payment,
    NonRent(ChargeCategory),
}

struct Rule {
    terms: &'static [&'static str],
    outcome: Outcome,
}

/// The classifier's rule table, highest priority first.
///
/// Ordering notes:
/// - "legal rent" precedes the generic "legal" keyword (rule would
///   otherwise read it as legal fees).
/// - Balance-forward phrasing precedes everything money-like; such rows
///   are never charges regardless of any stated amount.
/// - Returned-check wording precedes the payment family, which would
///   otherwise claim it via "check"/"reversal"-adjacent phrasing.
/// - The per-category non-rent tables precede the rent table, so
///   "parking rent" or "water rent" land as non-rent. "pet" appears here
///   for the same reason even though it has no dedicated category.
const RULES: &[Rule] = &[
    Rule {
        terms: &["legal rent"],
        outcome: Outcome::Rent,
    },
    Rule {
        terms: &[
            "balance forward",
            "brought forward",
            "carried forward",
            "starting balance",
            "beginning balance",
            "opening balance",
            "previous balance",
            "forwarded balance",
        ],
        outcome: Outcome::BalanceForward,
    },
    Rule {
        terms: &[
            "returned check",
            "return check",
            "check returned",
            "bounced check",
            "bad check",
            "nsf",
            "dishonored",
            "dishonoured",
            "insufficient funds",
        ],
        outcome: Outcome::NonRent(ChargeCategory::BadCheck),
    },
    Rule {
        terms: &[
            "payment",
            "ach",
            "wire",
            "refund",
            "reversal",
            "reverse",
            "void",
            "money order",
            "credit memo",
            "receipt",
        ],
        outcome: Outcome::Payment,
    },
    Rule {
        terms: &["late fee", "late charge", "late penalty"],
        outcome: Outcome::NonRent(ChargeCategory::LateFee),
    },
    Rule {
        terms: &["legal", "attorney", "court", "filing fee", "eviction"],
        outcome: Outcome::NonRent(ChargeCategory::LegalFees),
    },
    Rule {
        terms: &["security deposit", "deposit"],
        outcome: Outcome::NonRent(ChargeCategory::SecurityDeposit),
    },
    Rule {
        terms: &["maintenance", "repair", "work order", "cleaning"],
        outcome: Outcome::NonRent(ChargeCategory::Maintenance),
    },
    Rule {
        terms: &[
            "utility",
            "utilities",
            "water",
            "sewer",
            "electric",
            "gas",
            "heat",
            "trash",
            "garbage",
        ],
        outcome: Outcome::NonRent(ChargeCategory::Utilities),
    },
    Rule {
        terms: &["internet", "cable", "wifi"],
        outcome: Outcome::NonRent(ChargeCategory::Internet),
    },
    Rule {
        terms: &["air conditioner", "air conditioning", "air cond", "ac"],
        outcome: Outcome::NonRent(ChargeCategory::AirConditioner),
    },
    Rule {
        terms: &["parking", "garage"],
        outcome: Outcome::NonRent(ChargeCategory::Parking),
    },
    Rule {
        terms: &[
            "admin",
            "administrative",
            "service fee",
            "processing fee",
            "application fee",
        ],
        outcome: Outcome::NonRent(ChargeCategory::AdminFee),
    },
    Rule {
        terms: &["pet"],
        outcome: Outcome::NonRent(ChargeCategory::Other),
    },
    Rule {
        terms: &["fee"],
        outcome: Outcome::NonRent(ChargeCategory::Other),
    },
    Rule {
        terms: &[
            "base rent",
            "monthly rent",
            "residential rent",
            "contract rent",
            "tenant rent",
            "market rent",
            "use and occupancy",
            "use occupancy",
            "section 8",
            "subsidy",
            "subsidized",
            "rent",
        ],
        outcome: Outcome::Rent,
    },
];

/// Word-level abbreviation expansions applied before rule matching.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("pmt", "payment"),
    ("pymt", "payment"),
    ("pmnt", "payment"),
    ("chg", "charge"),
    ("dep", "deposit"),
    ("elec", "electric"),
    ("maint", "maintenance"),
    ("util", "utilities"),
    ("svc", "service"),
    ("bal", "balance"),
    ("fwd", "forward"),
];

/// Classifies description text, honoring a known charge code first.
///
/// Pure: identical inputs always produce identical output. The charge
/// code, when recognized, overrides the text rules entirely — formats
/// that print codes use them as the authoritative charge type.
pub fn classify(description: &str, charge_code: Option<u32>) -> ClassifiedDescription {
    if let Some(category) = charge_code.and_then(charge_code_category) {
        return if category == ChargeCategory::Rent {
            ClassifiedDescription::rent()
        } else {
            ClassifiedDescription::non_rent(category)
        };
    }
    classify_text(description)
}

/// Classifies description text alone through the ordered rule table.
pub fn classify_text(description: &str) -> ClassifiedDescription {
    let normalized = normalize_description(description);
    let squeezed: String = normalized.chars().filter(|c| !c.is_whitespace()).collect();

    for rule in RULES {
        if rule
            .terms
            .iter()
            .any(|term| matches_term(&normalized, &squeezed, term))
        {
            return match rule.outcome {
                Outcome::Rent => ClassifiedDescription::rent(),
                Outcome::BalanceForward => ClassifiedDescription::balance_forward(),
                Outcome::Payment => ClassifiedDescription::payment(),
                Outcome::NonRent(category) => ClassifiedDescription::non_rent(category),
            };
        }
    }

    // Unclassifiable text is still a charge: omitting a real charge would
    // understate arrears, so the default leans toward inclusion.
    ClassifiedDescription::non_rent(ChargeCategory::Other)
}

/// Charge codes observed in code-bearing ledger formats. `1` is the rent
/// posting code; the rest are non-rent charge types.
fn charge_code_category(code: u32) -> Option<ChargeCategory> {
    match code {
        1 => Some(ChargeCategory::Rent),
        3 => Some(ChargeCategory::LateFee),
        7 => Some(ChargeCategory::LegalFees),
        12 => Some(ChargeCategory::Maintenance),
        18 => Some(ChargeCategory::Parking),
        25 => Some(ChargeCategory::AirConditioner),
        _ => None,
    }
}

/// Normalized text with whitespace removed, for merged-word matching.
/// Shared with the calculation engine's wording heuristics so both sides
/// see the same abbreviation expansions.
pub(crate) fn normalize_squeezed(text: &str) -> String {
    normalize_description(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// True when the text mentions a security deposit, whatever else it says.
/// A deposit refund classifies as a payment, so the classifier outcome
/// alone cannot identify deposit-related rows.
pub(crate) fn mentions_security_deposit(text: &str) -> bool {
    normalize_squeezed(text).contains("deposit")
}

fn normalize_description(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| {
            ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == word)
                .map(|(_, full)| *full)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Phrases and long terms match as substrings of the space-squeezed text
/// (tolerating merged words and camelCase joins); short single words match
/// whole words only, so "ach" never fires inside "machine".
fn matches_term(normalized: &str, squeezed: &str, term: &str) -> bool {
    let term_squeezed: String = term.chars().filter(|c| !c.is_whitespace()).collect();
    if term.contains(' ') || term_squeezed.len() >= 5 {
        squeezed.contains(&term_squeezed)
    } else {
        normalized.split_whitespace().any(|w| w == term_squeezed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(text: &str) -> Option<ChargeCategory> {
        classify_text(text).category
    }

    #[test]
    fn test_legal_rent_overrides_legal_fees() {
        let result = classify_text("LEGAL RENT");
        assert!(result.is_rental_charge);
        // but plain legal wording is a fee
        assert_eq!(cat("LEGAL FEES"), Some(ChargeCategory::LegalFees));
        assert_eq!(cat("ATTORNEY COSTS"), Some(ChargeCategory::LegalFees));
    }

    #[test]
    fn test_balance_forward_never_a_charge() {
        for text in ["Balance Forward", "STARTING BALANCE", "Brought Forward", "BAL FWD"] {
            let result = classify_text(text);
            assert!(result.is_balance_forward, "{text} should be balance forward");
            assert!(!result.is_rental_charge);
            assert!(!result.is_non_rental_charge);
            assert!(!result.is_payment);
        }
    }

    #[test]
    fn test_returned_check_beats_payment_keywords() {
        for text in ["RETURNED CHECK", "NSF CHECK", "Dishonored payment"] {
            let result = classify_text(text);
            assert!(result.is_non_rental_charge, "{text}");
            assert_eq!(result.category, Some(ChargeCategory::BadCheck));
        }
    }

    #[test]
    fn test_payment_keywords() {
        for text in ["PAYMENT - THANK YOU", "ACH TRANSFER", "Wire received", "REFUND", "Pmt"] {
            assert!(classify_text(text).is_payment, "{text} should be payment");
        }
    }

    #[test]
    fn test_non_rent_categories() {
        assert_eq!(cat("LATE FEE"), Some(ChargeCategory::LateFee));
        assert_eq!(cat("SEC DEP"), Some(ChargeCategory::SecurityDeposit));
        assert_eq!(cat("Security Deposit"), Some(ChargeCategory::SecurityDeposit));
        assert_eq!(cat("WATER/SEWER"), Some(ChargeCategory::Utilities));
        assert_eq!(cat("ELEC CHG"), Some(ChargeCategory::Utilities));
        assert_eq!(cat("INTERNET SERVICE"), Some(ChargeCategory::Internet));
        assert_eq!(cat("AIR CONDITIONER"), Some(ChargeCategory::AirConditioner));
        assert_eq!(cat("PARKING"), Some(ChargeCategory::Parking));
        assert_eq!(cat("ADMIN FEE"), Some(ChargeCategory::AdminFee));
        assert_eq!(cat("MAINT REQUEST"), Some(ChargeCategory::Maintenance));
    }

    #[test]
    fn test_rent_keywords() {
        for text in ["BASE RENT", "Monthly Rent", "RESIDENTIAL RENT", "USE AND OCCUPANCY", "RENT"] {
            let result = classify_text(text);
            assert!(result.is_rental_charge, "{text} should be rent");
        }
    }

    #[test]
    fn test_override_forces_non_rent_despite_rent_word() {
        assert_eq!(cat("PARKING RENT"), Some(ChargeCategory::Parking));
        assert_eq!(cat("PET RENT"), Some(ChargeCategory::Other));
        assert_eq!(cat("WATER RENT"), Some(ChargeCategory::Utilities));
        assert_eq!(cat("CABLE RENT"), Some(ChargeCategory::Internet));
    }

    #[test]
    fn test_merged_words_and_camel_case() {
        assert!(classify_text("BASERENT").is_rental_charge);
        assert_eq!(cat("LateFee"), Some(ChargeCategory::LateFee));
        assert_eq!(cat("AirConditioner"), Some(ChargeCategory::AirConditioner));
    }

    #[test]
    fn test_short_keyword_needs_word_boundary() {
        // "ach" must not fire inside unrelated words
        let result = classify_text("MACHINE RENTAL SURCHARGE");
        assert!(!result.is_payment);
    }

    #[test]
    fn test_default_is_non_rent_other() {
        let result = classify_text("MISC ITEM 47");
        assert!(result.is_non_rental_charge);
        assert_eq!(result.category, Some(ChargeCategory::Other));
    }

    #[test]
    fn test_charge_code_overrides_text() {
        let result = classify("SOMETHING UNRELATED", Some(1));
        assert!(result.is_rental_charge);
        let result = classify("SOMETHING UNRELATED", Some(25));
        assert_eq!(result.category, Some(ChargeCategory::AirConditioner));
        // unknown codes fall through to text rules
        let result = classify("BASE RENT", Some(99));
        assert!(result.is_rental_charge);
    }

    #[test]
    fn test_purity() {
        let a = classify_text("Late Fee (08/2025)");
        let b = classify_text("Late Fee (08/2025)");
        assert_eq!(a, b);
    }
}

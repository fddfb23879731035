//! Maps a raw transaction description to a category (§4.4): user merchant
//! rules first, then the built-in keyword table, then an optional LLM
//! fallback. Deterministic except for that last, collaborator-backed step.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::MerchantRule;

pub const OTHER: &str = "Other";

/// Built-in keyword table, checked in order; the first category whose
/// keyword list contains a substring of the normalized description wins.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    ("Food & Dining", &["ZOMATO", "SWIGGY", "RESTAURANT", "CAFE", "DOMINOS", "MCDONALD", "KFC", "STARBUCKS", "EATERY"]),
    ("Groceries", &["BIGBASKET", "BLINKIT", "ZEPTO", "DMART", "GROCERY", "GROFERS", "GROCER"]),
    ("Transport", &["UBER", "OLA", "RAPIDO", "IRCTC", "INDIGO", "METRO", "PETROL", "FUEL"]),
    ("Shopping", &["AMAZON", "FLIPKART", "MYNTRA", "AJIO", "MEESHO", "NYKAA"]),
    ("Utilities", &["ELECTRICITY", "BESCOM", "WATER BOARD", "BROADBAND", "PIPED GAS", "DISCOM"]),
    ("Entertainment", &["NETFLIX", "HOTSTAR", "SPOTIFY", "PRIME VIDEO", "BOOKMYSHOW", "PVR", "INOX"]),
    ("Healthcare", &["APOLLO", "PHARMACY", "HOSPITAL", "CLINIC", "DIAGNOSTIC", "MEDPLUS"]),
    ("Education", &["UDEMY", "COURSERA", "BYJU", "TUITION", "SCHOOL FEE", "COLLEGE"]),
    ("Investment", &["ZERODHA", "GROWW", "MUTUAL FUND", "UPSTOX", "COIN", "NPS"]),
    ("Insurance", &["LIC", "INSURANCE", "POLICYBAZAAR", "ACKO"]),
    ("EMI & Loans", &["EMI", "LOAN", "BAJAJ FINANCE", "HDFC LOAN"]),
    ("Salary & Income", &["SALARY", "PAYROLL", "INCOME"]),
    ("Transfer", &["TRANSFER", "NEFT", "IMPS TO", "SENT TO"]),
    ("Rent & Housing", &["RENT", "LANDLORD", "MAINTENANCE CHARGE", "SOCIETY"]),
    ("Personal Care", &["SALON", "SPA", "BARBER", "GROOMING"]),
];

/// Normalizes a raw merchant/description string into the uppercase token
/// that merchant rules and the keyword table are matched against.
pub fn normalize_merchant(raw: &str) -> String {
    let mut s = raw.trim().to_uppercase();

    s = prefix_pattern().replace(&s, "").into_owned();
    s = trailing_ref_pattern().replace(&s, "").into_owned();
    s = suffix_pattern().replace(&s, "").into_owned();

    let collapsed: String = s
        .chars()
        .map(|c| if matches!(c, '-' | '_' | '/' | '*') { ' ' } else { c })
        .collect();

    collapsed
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(UPI|POS|NEFT|IMPS|ATM|VISA|MSTR)[\s\-/:]+").expect("valid regex"))
}

fn trailing_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[*\-][A-Z0-9]{5,}$").expect("valid regex"))
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*(PRIVATE LIMITED|PVT LTD|LTD|INDIA)\s*$").expect("valid regex"))
}

/// Step (1)+(2) of the priority chain: user rules (longest keyword wins),
/// then the built-in table. Returns `None` when neither matches, leaving
/// the LLM fallback (step 3) to the caller.
pub fn categorize_deterministic(description: &str, rules: &[MerchantRule]) -> Option<String> {
    let normalized = normalize_merchant(description);

    let best_rule = rules
        .iter()
        .filter(|rule| normalized.contains(rule.keyword.as_str()))
        .max_by_key(|rule| rule.keyword.len());
    if let Some(rule) = best_rule {
        return Some(rule.category.clone());
    }

    for (category, keywords) in KEYWORD_TABLE {
        if keywords.iter().any(|kw| normalized.contains(kw)) {
            return Some((*category).to_string());
        }
    }

    None
}

/// Single-item categorize, falling through to `Other` when no deterministic
/// rule matches and no LLM fallback is supplied (or it also fails).
pub async fn categorize(
    description: &str,
    rules: &[MerchantRule],
    llm: Option<&dyn LlmCategorizer>,
) -> String {
    if let Some(category) = categorize_deterministic(description, rules) {
        return category;
    }
    if let Some(llm) = llm {
        if let Ok(Some(category)) = llm.categorize_one(description).await {
            return category;
        }
    }
    OTHER.to_string()
}

/// Batch categorize: rules/keyword-table pass over every item first, then
/// a single LLM call (when available) for whatever fell through to
/// `Other`, preserving input order.
pub async fn categorize_batch(
    descriptions: &[String],
    rules: &[MerchantRule],
    llm: Option<&dyn LlmCategorizer>,
) -> Vec<String> {
    let mut categories: Vec<String> = descriptions
        .iter()
        .map(|d| categorize_deterministic(d, rules).unwrap_or_else(|| OTHER.to_string()))
        .collect();

    let Some(llm) = llm else {
        return categories;
    };

    let fallback_indices: Vec<usize> = categories
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_str() == OTHER)
        .map(|(i, _)| i)
        .collect();
    if fallback_indices.is_empty() {
        return categories;
    }

    let fallback_descriptions: Vec<&str> = fallback_indices.iter().map(|&i| descriptions[i].as_str()).collect();
    if let Ok(resolved) = llm.categorize_batch(&fallback_descriptions).await {
        for (slot, category) in fallback_indices.into_iter().zip(resolved) {
            categories[slot] = category;
        }
    }

    categories
}

/// The one-shot LLM upgrade path mentioned in step (3) of the priority
/// chain. Implemented by the LLM gateway layer; categorizer itself has no
/// collaborator dependency.
#[async_trait::async_trait]
pub trait LlmCategorizer: Send + Sync {
    async fn categorize_one(&self, description: &str) -> anyhow::Result<Option<String>>;

    async fn categorize_batch(&self, descriptions: &[&str]) -> anyhow::Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Id;

    fn rule(keyword: &str, category: &str) -> MerchantRule {
        MerchantRule {
            id: Id::from_string(format!("rule-{keyword}")),
            user_id: Id::from_string("u1"),
            keyword: keyword.to_string(),
            category: category.to_string(),
            is_auto: true,
        }
    }

    #[test]
    fn normalizes_upi_prefixed_merchant_with_trailing_ref() {
        assert_eq!(normalize_merchant("UPI-ZOMATO*ORDER12345"), "ZOMATO");
    }

    #[test]
    fn normalizes_strips_company_suffix() {
        assert_eq!(normalize_merchant("RELIANCE RETAIL PRIVATE LIMITED"), "RELIANCE RETAIL");
    }

    #[test]
    fn longest_matching_rule_wins() {
        let rules = vec![rule("ZOMATO", "Food & Dining"), rule("ZOMATO GOLD", "Subscriptions")];
        let category = categorize_deterministic("ZOMATO*GOLD ORDER 12345", &rules);
        assert_eq!(category.as_deref(), Some("Subscriptions"));
    }

    #[test]
    fn falls_back_to_keyword_table_when_no_rule_matches() {
        let category = categorize_deterministic("UPI-SWIGGY*ORDER98765", &[]);
        assert_eq!(category.as_deref(), Some("Food & Dining"));
    }

    #[test]
    fn unknown_merchant_yields_none_for_llm_fallback() {
        let category = categorize_deterministic("SOME RANDOM MERCHANT XYZ", &[]);
        assert_eq!(category, None);
    }

    #[tokio::test]
    async fn categorize_without_llm_falls_back_to_other() {
        let category = categorize("SOME RANDOM MERCHANT XYZ", &[], None).await;
        assert_eq!(category, OTHER);
    }

    #[tokio::test]
    async fn categorize_batch_preserves_order_without_llm() {
        let descriptions = vec!["UPI-ZOMATO*ORDER1".to_string(), "UNKNOWN MERCHANT".to_string(), "UPI-UBER*TRIP1".to_string()];
        let categories = categorize_batch(&descriptions, &[], None).await;
        assert_eq!(categories, vec!["Food & Dining".to_string(), OTHER.to_string(), "Transport".to_string()]);
    }
}

//! Classifies an incoming query into one of six execution strategies
//! (C10). First-match-wins over a fixed rule order (§4.10); never touches
//! a collaborator, so it is synchronous and infallible.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryLabel {
    Transaction,
    StaticKb,
    GovApi,
    WebSearch,
    HeavyReasoning,
    Simple,
}

/// Small knobs the downstream LLM call should honor for this label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteConfig {
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub label: QueryLabel,
    pub config: RouteConfig,
}

fn gov_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b([A-Z]{5}[0-9]{4}[A-Z]|[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][0-9A-Z]Z[0-9A-Z])\b").expect("valid regex"))
}

fn action_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(create|add|set|schedule|log|record)\b.*\b(budget|goal|payment|transaction|expense)\b").expect("valid regex")
    })
}

fn monetary_amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(₹|rs\.?)\s*\d|\b\d+\s*(rupees|rs)\b").expect("valid regex"))
}

fn action_verb_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(create|add|set|spend|spent|paid|pay)\b").expect("valid regex"))
}

const STATIC_KB_KEYWORDS: &[&str] = &[
    "tax slab", "income tax", "gst rate", "80c", "deduction", "regulation", "section 80", "tds", "hra",
];

const WEB_SEARCH_KEYWORDS: &[&str] = &["buy", "price", "shop", "news", "latest", "scheme", "hotels near"];

const REASONING_MARKERS: &[&str] = &["why", "compare", "analyze", "should i"];

const HEAVY_REASONING_TOKEN_THRESHOLD: usize = 40;

/// `Classify(query, user_context) -> label`. `kb_keyword_hit` tells the
/// router whether the query matched a term present in the Static KB index
/// (passed in rather than queried here, keeping the router collaborator-free).
pub fn classify(query: &str, kb_keyword_hit: bool) -> RouteDecision {
    let label = classify_label(query, kb_keyword_hit);
    RouteDecision { label, config: config_for(label) }
}

fn classify_label(query: &str, kb_keyword_hit: bool) -> QueryLabel {
    if gov_id_pattern().is_match(query) {
        return QueryLabel::GovApi;
    }

    if action_pattern().is_match(query) || (monetary_amount_pattern().is_match(query) && action_verb_pattern().is_match(query)) {
        return QueryLabel::Transaction;
    }

    let lower = query.to_lowercase();
    if kb_keyword_hit || STATIC_KB_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return QueryLabel::StaticKb;
    }

    if WEB_SEARCH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return QueryLabel::WebSearch;
    }

    let token_count = query.split_whitespace().count();
    if token_count > HEAVY_REASONING_TOKEN_THRESHOLD || REASONING_MARKERS.iter().any(|kw| lower.contains(kw)) {
        return QueryLabel::HeavyReasoning;
    }

    QueryLabel::Simple
}

fn config_for(label: QueryLabel) -> RouteConfig {
    let max_tokens = match label {
        QueryLabel::Transaction => 300,
        QueryLabel::StaticKb => 400,
        QueryLabel::GovApi => 200,
        QueryLabel::WebSearch => 500,
        QueryLabel::HeavyReasoning => 1200,
        QueryLabel::Simple => 400,
    };
    RouteConfig { max_tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_token_routes_to_gov_api() {
        let decision = classify("what is the owner of PAN ABCDE1234F", false);
        assert_eq!(decision.label, QueryLabel::GovApi);
    }

    #[test]
    fn create_budget_action_routes_to_transaction() {
        let decision = classify("create a monthly budget of 5000 for food", false);
        assert_eq!(decision.label, QueryLabel::Transaction);
    }

    #[test]
    fn tax_keyword_routes_to_static_kb() {
        let decision = classify("what is the 80c deduction limit this year", false);
        assert_eq!(decision.label, QueryLabel::StaticKb);
    }

    #[test]
    fn shopping_intent_routes_to_web_search() {
        let decision = classify("where can I buy a laptop under 50000", false);
        assert_eq!(decision.label, QueryLabel::WebSearch);
    }

    #[test]
    fn comparison_question_routes_to_heavy_reasoning() {
        let decision = classify("why should I compare SIP vs lumpsum for my retirement planning goal", false);
        assert_eq!(decision.label, QueryLabel::HeavyReasoning);
    }

    #[test]
    fn plain_greeting_routes_to_simple() {
        let decision = classify("hello, how are you?", false);
        assert_eq!(decision.label, QueryLabel::Simple);
    }

    #[test]
    fn gov_id_takes_priority_over_action_pattern() {
        let decision = classify("create a transaction for GSTIN 29ABCDE1234F1Z5 payment", false);
        assert_eq!(decision.label, QueryLabel::GovApi);
    }
}

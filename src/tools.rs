//! Named, JSON-schema-described functions the agent can call (C9). Every
//! handler returns the same structured result shape; write tools never
//! commit on call, instead returning `needs_confirmation = true` plus an
//! `action_id` that a later `confirm_action` resolves (§4.5).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::calculators;
use crate::clock::Clock;
use crate::error::{ArthaError, ArthaResult};
use crate::knowledge::KnowledgeIndex;
use crate::models::{Budget, Goal, GoalStatus, Id, IdGenerator, PaymentFrequency, PaymentType, Period, ScheduledPayment, ScheduledPaymentStatus, Transaction, TransactionType};
use crate::storage::Store;

/// Actions are only ever dropped or committed; there is no partial state
/// (§5 "Prepared but unconfirmed actions are dropped ... after an
/// action-cache TTL", default 15 min).
pub const ACTION_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Search results are cached per `(category, exact query)` for 6 hours
/// (§4.5 "Search contract").
pub const SEARCH_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub action: String,
    pub data: Value,
    pub message: String,
    pub needs_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_data: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(action: impl Into<String>, data: Value, message: impl Into<String>) -> Self {
        Self { success: true, action: action.into(), data, message: message.into(), needs_confirmation: false, requires_data: None, error: None }
    }

    pub fn failure(action: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self { success: false, action: action.into(), data: Value::Null, message: message.clone(), needs_confirmation: false, requires_data: None, error: Some(message) }
    }

    pub fn needs_confirmation(action: impl Into<String>, action_id: &Id, data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: action.into(),
            data: merge_action_id(data, action_id),
            message: message.into(),
            needs_confirmation: true,
            requires_data: None,
            error: None,
        }
    }

    fn from_artha_error(action: &str, err: ArthaError) -> Self {
        match err {
            ArthaError::NotConfigured(collaborator) => {
                let mut result = Self::failure(action, format!("{collaborator} is not configured"));
                result.requires_data = Some(false);
                result
            }
            other => Self::failure(action, other.to_string()),
        }
    }
}

fn merge_action_id(mut data: Value, action_id: &Id) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert("action_id".to_string(), json!(action_id.as_str()));
    }
    data
}

/// A write tool's call is remembered here until `confirm_action` resolves
/// it or the TTL lapses.
struct PreparedAction {
    tool_name: String,
    user_id: Id,
    arguments: Value,
    created_at: DateTime<Utc>,
}

pub struct ActionCache {
    entries: Mutex<HashMap<String, PreparedAction>>,
}

impl Default for ActionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn prepare(&self, ids: &dyn IdGenerator, clock: &dyn Clock, tool_name: &str, user_id: &Id, arguments: Value) -> Id {
        let action_id = ids.new_id();
        let mut entries = self.entries.lock().expect("action cache lock poisoned");
        entries.insert(
            action_id.as_str().to_string(),
            PreparedAction { tool_name: tool_name.to_string(), user_id: user_id.clone(), arguments, created_at: clock.now() },
        );
        action_id
    }

    /// Removes and returns the prepared action if present and not expired.
    /// Expired or unknown `action_id`s are treated as `NotFound`.
    fn take(&self, action_id: &str, clock: &dyn Clock) -> ArthaResult<PreparedAction> {
        let mut entries = self.entries.lock().expect("action cache lock poisoned");
        let prepared = entries.remove(action_id).ok_or_else(|| ArthaError::NotFound(format!("action {action_id}")))?;
        let age = clock.now().signed_duration_since(prepared.created_at);
        if age.to_std().unwrap_or(Duration::MAX) > ACTION_CACHE_TTL {
            return Err(ArthaError::NotFound(format!("action {action_id} expired")));
        }
        Ok(prepared)
    }
}

/// A verified government-ID lookup (PAN/GSTIN/ITR status). Pluggable;
/// `NotConfigured` by default.
#[async_trait::async_trait]
pub trait GovVerify: Send + Sync {
    async fn verify_pan(&self, pan: &str) -> ArthaResult<Value>;
    async fn verify_gstin(&self, gstin: &str) -> ArthaResult<Value>;
    async fn verify_itr_status(&self, pan: &str) -> ArthaResult<Value>;
}

pub struct NoopGovVerify;

#[async_trait::async_trait]
impl GovVerify for NoopGovVerify {
    async fn verify_pan(&self, _pan: &str) -> ArthaResult<Value> {
        Err(ArthaError::not_configured("government verification"))
    }

    async fn verify_gstin(&self, _gstin: &str) -> ArthaResult<Value> {
        Err(ArthaError::not_configured("government verification"))
    }

    async fn verify_itr_status(&self, _pan: &str) -> ArthaResult<Value> {
        Err(ArthaError::not_configured("government verification"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchCategory {
    General,
    Shopping,
    News,
    Finance,
    Travel,
    Fashion,
    RealEstate,
    Stocks,
    Hotels,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    pub date: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    pub date: Option<String>,
    pub price: Option<String>,
    pub relevance: f64,
}

/// A web-search backend (HTML fetch or vendor API). Pluggable;
/// `NotConfigured` by default.
#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> ArthaResult<Vec<RawSearchResult>>;
}

pub struct NoopWebSearch;

#[async_trait::async_trait]
impl WebSearch for NoopWebSearch {
    async fn search(&self, _query: &str) -> ArthaResult<Vec<RawSearchResult>> {
        Err(ArthaError::not_configured("web search"))
    }
}

/// Appends category-specific qualifiers so a generic query targets the
/// right corner of the web (§4.5 "Search contract").
fn reformulate_query(category: SearchCategory, query: &str) -> String {
    match category {
        SearchCategory::Shopping => format!("{query} site:amazon.in OR site:flipkart.com"),
        SearchCategory::Stocks => format!("{query} share price NSE BSE live today"),
        SearchCategory::News => format!("{query} latest news"),
        SearchCategory::Travel => format!("{query} booking price"),
        SearchCategory::Hotels => format!("{query} hotels booking price"),
        SearchCategory::RealEstate => format!("{query} property listing price"),
        SearchCategory::Fashion => format!("{query} buy online India"),
        SearchCategory::Local | SearchCategory::Finance | SearchCategory::General => query.to_string(),
    }
}

/// Keeps results whose title+snippet share >= 1 query term and whose
/// snippet is long enough to be useful; relevance decays with rank and
/// grows with term-hit count (§4.5).
fn filter_and_rank(query: &str, results: Vec<RawSearchResult>) -> Vec<RankedSearchResult> {
    let terms: Vec<String> = query.to_lowercase().split_whitespace().map(|s| s.to_string()).collect();

    results
        .into_iter()
        .enumerate()
        .filter_map(|(rank, r)| {
            if r.snippet.len() < 30 {
                return None;
            }
            let haystack = format!("{} {}", r.title, r.snippet).to_lowercase();
            let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            if hits == 0 {
                return None;
            }

            let rank_decay = 1.0 / (rank as f64 + 1.0);
            let relevance = (rank_decay * 0.6) + (hits as f64 / terms.len().max(1) as f64) * 0.4;

            Some(RankedSearchResult { title: r.title, url: r.url, snippet: r.snippet, source: r.source, date: r.date, price: r.price, relevance })
        })
        .collect()
}

struct CachedSearch {
    results: Vec<RankedSearchResult>,
    cached_at: DateTime<Utc>,
}

pub struct SearchCache {
    entries: Mutex<HashMap<(SearchCategory, String), CachedSearch>>,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn get(&self, category: SearchCategory, query: &str, clock: &dyn Clock) -> Option<Vec<RankedSearchResult>> {
        let entries = self.entries.lock().expect("search cache lock poisoned");
        let cached = entries.get(&(category, query.to_string()))?;
        let age = clock.now().signed_duration_since(cached.cached_at);
        if age.to_std().unwrap_or(Duration::MAX) > SEARCH_CACHE_TTL {
            return None;
        }
        Some(cached.results.clone())
    }

    fn put(&self, category: SearchCategory, query: &str, clock: &dyn Clock, results: Vec<RankedSearchResult>) {
        let mut entries = self.entries.lock().expect("search cache lock poisoned");
        entries.insert((category, query.to_string()), CachedSearch { results, cached_at: clock.now() });
    }
}

impl std::hash::Hash for SearchCategory {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u8).hash(state);
    }
}

/// Everything a tool handler might need. Assembled once at the composition
/// root and shared (behind `Arc`) across requests.
pub struct ToolContext<'a> {
    pub store: &'a Store,
    pub ids: &'a dyn IdGenerator,
    pub clock: &'a dyn Clock,
    pub knowledge: &'a KnowledgeIndex,
    pub web_search: &'a dyn WebSearch,
    pub gov_verify: &'a dyn GovVerify,
    pub actions: &'a ActionCache,
    pub search_cache: &'a SearchCache,
}

/// Dispatches a tool call by name. Unknown names are `Validation` failures,
/// not panics.
pub async fn dispatch(name: &str, arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ToolResult {
    match name {
        "calculate_sip" | "calculate_fd" | "calculate_emi" | "calculate_rd" | "calculate_lumpsum" | "calculate_cagr"
        | "calculate_goal_sip" | "calculate_compound_interest" | "calculate_emergency_fund" | "calculate_savings_rate"
        | "calculate_tax" => dispatch_calculator(name, arguments),

        "get_tax_info" => get_tax_info(arguments),
        "static_kb_search" => static_kb_search(arguments, ctx),
        "gov_verify_pan" => gov_verify_pan(arguments, ctx).await,
        "gov_verify_gstin" => gov_verify_gstin(arguments, ctx).await,
        "gov_verify_itr" => gov_verify_itr(arguments, ctx).await,

        "create_budget" => prepare_create_budget(arguments, user_id, ctx),
        "create_savings_goal" => prepare_create_savings_goal(arguments, user_id, ctx),
        "schedule_payment" => prepare_schedule_payment(arguments, user_id, ctx),
        "add_transaction" => prepare_add_transaction(arguments, user_id, ctx),

        "web_search" => web_search(arguments, ctx).await,

        other => ToolResult::failure(other, format!("unknown tool: {other}")),
    }
}

/// Commits a previously prepared write action (`/agent/confirm-action`).
pub async fn confirm_action(action_id: &str, ctx: &ToolContext<'_>) -> ToolResult {
    let prepared = match ctx.actions.take(action_id, ctx.clock) {
        Ok(p) => p,
        Err(e) => return ToolResult::from_artha_error("confirm_action", e),
    };

    let result = match prepared.tool_name.as_str() {
        "create_budget" => commit_create_budget(&prepared.arguments, &prepared.user_id, ctx).await,
        "create_savings_goal" => commit_create_savings_goal(&prepared.arguments, &prepared.user_id, ctx).await,
        "schedule_payment" => commit_schedule_payment(&prepared.arguments, &prepared.user_id, ctx).await,
        "add_transaction" => commit_add_transaction(&prepared.arguments, &prepared.user_id, ctx).await,
        other => Err(ArthaError::Internal(format!("no committer for prepared tool {other}"))),
    };

    match result {
        Ok(tool_result) => tool_result,
        Err(e) => ToolResult::from_artha_error(&prepared.tool_name, e),
    }
}

fn dispatch_calculator(name: &str, arguments: &Value) -> ToolResult {
    match try_dispatch_calculator(name, arguments) {
        Ok(result) => result,
        Err(message) => ToolResult::failure(name, message),
    }
}

fn try_dispatch_calculator(name: &str, arguments: &Value) -> Result<ToolResult, String> {
    fn money(args: &Value, field: &str) -> Result<crate::money::Money, String> {
        let raw = args.get(field).ok_or_else(|| format!("missing field: {field}"))?;
        if let Some(s) = raw.as_str() {
            return s.parse().map_err(|_| format!("invalid money value for {field}"));
        }
        let n = raw.as_f64().ok_or_else(|| format!("invalid money value for {field}"))?;
        Ok(crate::money::Money::from_decimal(Decimal::try_from(n).unwrap_or_default()))
    }

    fn decimal(args: &Value, field: &str) -> Result<Decimal, String> {
        let n = args.get(field).and_then(|v| v.as_f64()).ok_or_else(|| format!("missing field: {field}"))?;
        Decimal::try_from(n).map_err(|_| format!("invalid decimal for {field}"))
    }

    fn u32_field(args: &Value, field: &str) -> Result<u32, String> {
        args.get(field).and_then(|v| v.as_u64()).map(|v| v as u32).ok_or_else(|| format!("missing field: {field}"))
    }

    let data = match name {
        "calculate_sip" => {
            let result = calculators::calculate_sip(money(arguments, "monthly_investment")?, decimal(arguments, "expected_rate")?, u32_field(arguments, "duration_months")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_goal_sip" => {
            let result = calculators::calculate_goal_sip(money(arguments, "target_amount")?, decimal(arguments, "expected_rate")?, u32_field(arguments, "duration_months")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_lumpsum" => {
            let result = calculators::calculate_lumpsum(money(arguments, "principal")?, decimal(arguments, "expected_rate")?, u32_field(arguments, "duration_years")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_fd" => {
            let result = calculators::calculate_fd(money(arguments, "principal")?, decimal(arguments, "annual_rate")?, u32_field(arguments, "tenure_months")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_rd" => {
            let result = calculators::calculate_rd(money(arguments, "monthly_deposit")?, decimal(arguments, "annual_rate")?, u32_field(arguments, "tenure_months")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_emi" => {
            let result = calculators::calculate_emi(money(arguments, "principal")?, decimal(arguments, "annual_rate")?, u32_field(arguments, "tenure_months")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_cagr" => {
            let result = calculators::calculate_cagr(money(arguments, "initial_value")?, money(arguments, "final_value")?, u32_field(arguments, "years")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_compound_interest" => {
            let result = calculators::calculate_compound_interest(
                money(arguments, "principal")?,
                decimal(arguments, "annual_rate")?,
                u32_field(arguments, "times_compounded_per_year")?,
                decimal(arguments, "years")?,
            );
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_emergency_fund" => {
            let months = arguments.get("months").and_then(|v| v.as_u64()).map(|v| v as u32);
            let result = calculators::calculate_emergency_fund(money(arguments, "monthly_expenses")?, months);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_savings_rate" => {
            let result = calculators::calculate_savings_rate(money(arguments, "income")?, money(arguments, "expenses")?);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        "calculate_tax" => {
            let regime = match arguments.get("regime").and_then(|v| v.as_str()) {
                Some("old") => calculators::TaxRegime::Old,
                _ => calculators::TaxRegime::New,
            };
            let deductions = arguments.get("deductions").and_then(|v| v.as_f64()).map(|n| crate::money::Money::from_decimal(Decimal::try_from(n).unwrap_or_default())).unwrap_or_default();
            let result = calculators::calculate_tax(money(arguments, "gross_income")?, regime, deductions);
            serde_json::to_value(result).map_err(|e| e.to_string())?
        }
        other => return Err(format!("unknown calculator: {other}")),
    };

    Ok(ToolResult::ok(name, data, format!("{name} computed")))
}

fn get_tax_info(arguments: &Value) -> ToolResult {
    let regime = match arguments.get("regime").and_then(|v| v.as_str()) {
        Some("old") => calculators::TaxRegime::Old,
        _ => calculators::TaxRegime::New,
    };
    let gross = arguments
        .get("gross_income")
        .and_then(|v| v.as_f64())
        .map(|n| crate::money::Money::from_decimal(Decimal::try_from(n).unwrap_or_default()))
        .unwrap_or_default();

    let result = calculators::calculate_tax(gross, regime, crate::money::Money::zero());
    let data = serde_json::to_value(&result).unwrap_or(Value::Null);
    ToolResult::ok("get_tax_info", data, format!("{regime:?} regime tax estimate for the given income"))
}

fn static_kb_search(arguments: &Value, ctx: &ToolContext<'_>) -> ToolResult {
    let Some(query) = arguments.get("query").and_then(|v| v.as_str()) else {
        return ToolResult::failure("static_kb_search", "missing field: query");
    };
    let k = arguments.get("k").and_then(|v| v.as_u64()).unwrap_or(3) as usize;

    let hits = ctx.knowledge.hybrid_search(query, k);
    let data = json!({ "results": hits.iter().map(|h| json!({"doc_id": h.doc_id, "title": h.title, "content": h.content, "score": h.score})).collect::<Vec<_>>() });
    ToolResult::ok("static_kb_search", data, format!("{} knowledge hits for \"{query}\"", hits.len()))
}

async fn gov_verify_pan(arguments: &Value, ctx: &ToolContext<'_>) -> ToolResult {
    let Some(pan) = arguments.get("pan").and_then(|v| v.as_str()) else {
        return ToolResult::failure("gov_verify_pan", "missing field: pan");
    };
    match ctx.gov_verify.verify_pan(pan).await {
        Ok(data) => ToolResult::ok("gov_verify_pan", data, "PAN verification complete"),
        Err(e) => ToolResult::from_artha_error("gov_verify_pan", e),
    }
}

async fn gov_verify_gstin(arguments: &Value, ctx: &ToolContext<'_>) -> ToolResult {
    let Some(gstin) = arguments.get("gstin").and_then(|v| v.as_str()) else {
        return ToolResult::failure("gov_verify_gstin", "missing field: gstin");
    };
    match ctx.gov_verify.verify_gstin(gstin).await {
        Ok(data) => ToolResult::ok("gov_verify_gstin", data, "GSTIN verification complete"),
        Err(e) => ToolResult::from_artha_error("gov_verify_gstin", e),
    }
}

async fn gov_verify_itr(arguments: &Value, ctx: &ToolContext<'_>) -> ToolResult {
    let Some(pan) = arguments.get("pan").and_then(|v| v.as_str()) else {
        return ToolResult::failure("gov_verify_itr", "missing field: pan");
    };
    match ctx.gov_verify.verify_itr_status(pan).await {
        Ok(data) => ToolResult::ok("gov_verify_itr", data, "ITR status lookup complete"),
        Err(e) => ToolResult::from_artha_error("gov_verify_itr", e),
    }
}

fn prepare_create_budget(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ToolResult {
    let action_id = ctx.actions.prepare(ctx.ids, ctx.clock, "create_budget", user_id, arguments.clone());
    let category = arguments.get("category").and_then(|v| v.as_str()).unwrap_or("Uncategorized");
    let amount = arguments.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let period = arguments.get("period").and_then(|v| v.as_str()).unwrap_or("monthly");
    ToolResult::needs_confirmation(
        "create_budget",
        &action_id,
        arguments.clone(),
        format!("Create a {period} budget of {amount:.2} for {category}? Confirm to proceed."),
    )
}

fn prepare_create_savings_goal(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ToolResult {
    let action_id = ctx.actions.prepare(ctx.ids, ctx.clock, "create_savings_goal", user_id, arguments.clone());
    let name = arguments.get("name").and_then(|v| v.as_str()).unwrap_or("Goal");
    let target = arguments.get("target_amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
    ToolResult::needs_confirmation("create_savings_goal", &action_id, arguments.clone(), format!("Create savings goal \"{name}\" targeting {target:.2}? Confirm to proceed."))
}

fn prepare_schedule_payment(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ToolResult {
    let action_id = ctx.actions.prepare(ctx.ids, ctx.clock, "schedule_payment", user_id, arguments.clone());
    let name = arguments.get("name").and_then(|v| v.as_str()).unwrap_or("payment");
    let amount = arguments.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let frequency = arguments.get("frequency").and_then(|v| v.as_str()).unwrap_or("monthly");
    ToolResult::needs_confirmation("schedule_payment", &action_id, arguments.clone(), format!("Schedule a {frequency} payment of {amount:.2} for \"{name}\"? Confirm to proceed."))
}

fn prepare_add_transaction(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ToolResult {
    let action_id = ctx.actions.prepare(ctx.ids, ctx.clock, "add_transaction", user_id, arguments.clone());
    let amount = arguments.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let description = arguments.get("description").and_then(|v| v.as_str()).unwrap_or("transaction");
    ToolResult::needs_confirmation("add_transaction", &action_id, arguments.clone(), format!("Log a transaction of {amount:.2} for \"{description}\"? Confirm to proceed."))
}

async fn commit_create_budget(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ArthaResult<ToolResult> {
    let category = arguments.get("category").and_then(|v| v.as_str()).ok_or_else(|| ArthaError::Validation("missing category".into()))?;
    let amount = arguments.get("amount").and_then(|v| v.as_f64()).ok_or_else(|| ArthaError::Validation("missing amount".into()))?;
    let period = match arguments.get("period").and_then(|v| v.as_str()) {
        Some("weekly") => Period::Weekly,
        Some("yearly") => Period::Yearly,
        _ => Period::Monthly,
    };

    let budget = Budget {
        id: ctx.ids.new_id(),
        user_id: user_id.clone(),
        name: arguments.get("name").and_then(|v| v.as_str()).unwrap_or(category).to_string(),
        category: category.to_string(),
        amount: crate::money::Money::from_decimal(Decimal::try_from(amount).unwrap_or_default()),
        spent: crate::money::Money::zero(),
        period,
        start_date: ctx.clock.today(),
        end_date: None,
        icon: "\u{1F4B0}".to_string(),
    };

    ctx.store.planning.budgets.put(&budget.id.clone(), &budget).await.map_err(ArthaError::from)?;
    let data = serde_json::to_value(&budget).map_err(|e| ArthaError::Internal(e.to_string()))?;
    Ok(ToolResult::ok("create_budget", data, format!("Created budget for {category}")))
}

async fn commit_create_savings_goal(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ArthaResult<ToolResult> {
    let name = arguments.get("name").and_then(|v| v.as_str()).ok_or_else(|| ArthaError::Validation("missing name".into()))?;
    let target = arguments.get("target_amount").and_then(|v| v.as_f64()).ok_or_else(|| ArthaError::Validation("missing target_amount".into()))?;
    let deadline = arguments.get("deadline").and_then(|v| v.as_str()).and_then(|s| s.parse().ok());

    let goal = Goal {
        id: ctx.ids.new_id(),
        user_id: user_id.clone(),
        name: name.to_string(),
        target_amount: crate::money::Money::from_decimal(Decimal::try_from(target).unwrap_or_default()),
        current_amount: crate::money::Money::zero(),
        deadline,
        status: GoalStatus::Active,
        icon: "\u{1F3AF}".to_string(),
        notes: None,
    };

    ctx.store.planning.goals.put(&goal.id.clone(), &goal).await.map_err(ArthaError::from)?;
    let data = serde_json::to_value(&goal).map_err(|e| ArthaError::Internal(e.to_string()))?;
    Ok(ToolResult::ok("create_savings_goal", data, format!("Created savings goal \"{name}\"")))
}

async fn commit_schedule_payment(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ArthaResult<ToolResult> {
    let name = arguments.get("name").and_then(|v| v.as_str()).ok_or_else(|| ArthaError::Validation("missing name".into()))?;
    let amount = arguments.get("amount").and_then(|v| v.as_f64()).ok_or_else(|| ArthaError::Validation("missing amount".into()))?;
    let category = arguments.get("category").and_then(|v| v.as_str()).unwrap_or("Bills");
    let frequency = match arguments.get("frequency").and_then(|v| v.as_str()) {
        Some("daily") => PaymentFrequency::Daily,
        Some("weekly") => PaymentFrequency::Weekly,
        Some("yearly") => PaymentFrequency::Yearly,
        _ => PaymentFrequency::Monthly,
    };
    let due_date = arguments.get("due_date").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or_else(|| ctx.clock.today());

    let payment = ScheduledPayment {
        id: ctx.ids.new_id(),
        user_id: user_id.clone(),
        name: name.to_string(),
        amount: crate::money::Money::from_decimal(Decimal::try_from(amount).unwrap_or_default()),
        category: category.to_string(),
        frequency,
        due_date,
        next_due_date: due_date,
        is_autopay: arguments.get("is_autopay").and_then(|v| v.as_bool()).unwrap_or(false),
        status: ScheduledPaymentStatus::Active,
        reminder_days: arguments.get("reminder_days").and_then(|v| v.as_u64()).unwrap_or(3) as u32,
        last_paid_date: None,
        payment_type: PaymentType::Regular,
        loan: None,
    };

    ctx.store.planning.scheduled_payments.put(&payment.id.clone(), &payment).await.map_err(ArthaError::from)?;
    let data = serde_json::to_value(&payment).map_err(|e| ArthaError::Internal(e.to_string()))?;
    Ok(ToolResult::ok("schedule_payment", data, format!("Scheduled payment \"{name}\"")))
}

async fn commit_add_transaction(arguments: &Value, user_id: &Id, ctx: &ToolContext<'_>) -> ArthaResult<ToolResult> {
    let amount = arguments.get("amount").and_then(|v| v.as_f64()).ok_or_else(|| ArthaError::Validation("missing amount".into()))?;
    if amount <= 0.0 {
        return Err(ArthaError::Validation("amount must be positive".into()));
    }
    let description = arguments.get("description").and_then(|v| v.as_str()).unwrap_or("Transaction");
    let kind = match arguments.get("type").and_then(|v| v.as_str()) {
        Some("income") => TransactionType::Income,
        _ => TransactionType::Expense,
    };
    let category = arguments.get("category").and_then(|v| v.as_str()).unwrap_or(crate::categorizer::OTHER).to_string();
    let date = arguments.get("date").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or_else(|| ctx.clock.today());

    let draft = Transaction::draft(user_id.clone(), crate::money::Money::from_decimal(Decimal::try_from(amount).unwrap_or_default()), kind, date, category, description).stamp(ctx.ids, ctx.clock);

    let inserted = ctx.store.create_transaction(draft).await.map_err(ArthaError::from)?;
    let data = serde_json::to_value(&inserted).map_err(|e| ArthaError::Internal(e.to_string()))?;
    Ok(ToolResult::ok("add_transaction", data, format!("Logged transaction: {description}")))
}

async fn web_search(arguments: &Value, ctx: &ToolContext<'_>) -> ToolResult {
    let Some(query) = arguments.get("query").and_then(|v| v.as_str()) else {
        return ToolResult::failure("web_search", "missing field: query");
    };
    let category = match arguments.get("category").and_then(|v| v.as_str()) {
        Some("shopping") => SearchCategory::Shopping,
        Some("news") => SearchCategory::News,
        Some("finance") => SearchCategory::Finance,
        Some("travel") => SearchCategory::Travel,
        Some("fashion") => SearchCategory::Fashion,
        Some("real_estate") => SearchCategory::RealEstate,
        Some("stocks") => SearchCategory::Stocks,
        Some("hotels") => SearchCategory::Hotels,
        Some("local") => SearchCategory::Local,
        _ => SearchCategory::General,
    };

    if let Some(cached) = ctx.search_cache.get(category, query, ctx.clock) {
        let data = json!({ "results": cached });
        return ToolResult::ok("web_search", data, format!("{} cached results for \"{query}\"", cached.len()));
    }

    let reformulated = reformulate_query(category, query);
    match ctx.web_search.search(&reformulated).await {
        Ok(raw) => {
            let ranked = filter_and_rank(query, raw);
            ctx.search_cache.put(category, query, ctx.clock, ranked.clone());
            let data = json!({ "results": ranked });
            ToolResult::ok("web_search", data, format!("{} results for \"{query}\"", ranked.len()))
        }
        Err(e) => ToolResult::from_artha_error("web_search", e),
    }
}

/// Serializes and truncates a tool result to <= 1000 characters before it
/// is appended to the conversation (§4.6 "Tool results are serialized as
/// JSON (trimmed to <= 1000 characters)").
pub fn truncate_for_transcript(result: &ToolResult) -> String {
    let full = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
    if full.len() <= 1000 {
        full
    } else {
        format!("{}...", &full[..1000])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{FixedIdGenerator, UuidIdGenerator};

    fn ctx_builders() -> (tempfile::TempDir, Store, FixedClock, UuidIdGenerator, KnowledgeIndex, NoopWebSearch, NoopGovVerify, ActionCache, SearchCache) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let clock = FixedClock::new(Utc::now());
        let ids = UuidIdGenerator;
        let knowledge = KnowledgeIndex::empty();
        (dir, store, clock, ids, knowledge, NoopWebSearch, NoopGovVerify, ActionCache::new(), SearchCache::new())
    }

    #[tokio::test]
    async fn calculator_tool_computes_without_confirmation() {
        let (_dir, store, clock, ids, knowledge, search, gov, actions, search_cache) = ctx_builders();
        let ctx = ToolContext { store: &store, ids: &ids, clock: &clock, knowledge: &knowledge, web_search: &search, gov_verify: &gov, actions: &actions, search_cache: &search_cache };
        let user_id = Id::from_string("u1");

        let result = dispatch("calculate_sip", &json!({"monthly_investment": "10000", "expected_rate": 12.0, "duration_months": 120}), &user_id, &ctx).await;
        assert!(result.success);
        assert!(!result.needs_confirmation);
    }

    #[tokio::test]
    async fn create_budget_prepares_without_writing() {
        let (_dir, store, clock, ids, knowledge, search, gov, actions, search_cache) = ctx_builders();
        let ctx = ToolContext { store: &store, ids: &ids, clock: &clock, knowledge: &knowledge, web_search: &search, gov_verify: &gov, actions: &actions, search_cache: &search_cache };
        let user_id = Id::from_string("u1");

        let result = dispatch("create_budget", &json!({"category": "food", "amount": 5000, "period": "monthly"}), &user_id, &ctx).await;
        assert!(result.needs_confirmation);
        assert!(result.data.get("action_id").is_some());

        let budgets = store.planning.budgets.list().await.unwrap();
        assert!(budgets.is_empty());
    }

    #[tokio::test]
    async fn confirm_action_commits_the_prepared_budget() {
        let (_dir, store, clock, ids, knowledge, search, gov, actions, search_cache) = ctx_builders();
        let ctx = ToolContext { store: &store, ids: &ids, clock: &clock, knowledge: &knowledge, web_search: &search, gov_verify: &gov, actions: &actions, search_cache: &search_cache };
        let user_id = Id::from_string("u1");

        let prepared = dispatch("create_budget", &json!({"category": "food", "amount": 5000, "period": "monthly"}), &user_id, &ctx).await;
        let action_id = prepared.data.get("action_id").and_then(|v| v.as_str()).unwrap().to_string();

        let committed = confirm_action(&action_id, &ctx).await;
        assert!(committed.success);

        let budgets = store.planning.budgets.list().await.unwrap();
        assert_eq!(budgets.len(), 1);
    }

    #[tokio::test]
    async fn confirm_action_unknown_id_is_not_found() {
        let (_dir, store, clock, ids, knowledge, search, gov, actions, search_cache) = ctx_builders();
        let ctx = ToolContext { store: &store, ids: &ids, clock: &clock, knowledge: &knowledge, web_search: &search, gov_verify: &gov, actions: &actions, search_cache: &search_cache };

        let result = confirm_action("nonexistent", &ctx).await;
        assert!(!result.success);
    }

    #[test]
    fn filter_and_rank_drops_short_snippets_and_irrelevant_hits() {
        let results = vec![
            RawSearchResult { title: "Laptop deals".into(), url: "https://x".into(), snippet: "Best laptop deals under fifty thousand rupees this week".into(), source: "x".into(), date: None, price: None },
            RawSearchResult { title: "Unrelated".into(), url: "https://y".into(), snippet: "short".into(), source: "y".into(), date: None, price: None },
        ];
        let ranked = filter_and_rank("laptop deals", results);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "Laptop deals");
    }

    #[test]
    fn reformulate_shopping_query_adds_marketplace_filters() {
        let q = reformulate_query(SearchCategory::Shopping, "wireless earbuds");
        assert!(q.contains("amazon.in"));
    }

    #[test]
    fn reformulate_stocks_query_adds_exchange_terms() {
        let q = reformulate_query(SearchCategory::Stocks, "TCS");
        assert!(q.contains("NSE"));
    }
}

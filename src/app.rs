//! Composition root (§6.1's HTTP surface, stated as plain async functions
//! rather than a method-bearing object). [`Collaborators`] bundles every
//! long-lived service built once from [`ResolvedConfig`]; everything below
//! is a free function over an explicit `&Collaborators` plus whatever
//! request data it needs, mirroring the teacher's `app.rs` (free functions
//! over `&Storage`/`&MarketDataService`, never a god object with methods).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent::{self, AgentResponse, CancellationToken};
use crate::analytics::{self, HealthScoreResult, MonthlyTrend};
use crate::brainstorm::{self, CanvasCandidate, Persona};
use crate::categorizer;
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::error::{ArthaError, ArthaResult};
use crate::extractors::{self, DocumentIntelligence, NoopDocumentIntelligence, NoopVisionOcr, VisionOcr};
use crate::knowledge::KnowledgeIndex;
use crate::llm::{ChatMessage, GatewayCategorizer, HttpChatProvider, LlmGateway};
use crate::models::{
    AnalysisSnapshot, Budget, Goal, Id, IdGenerator, Invoice, InvoiceItem, MerchantRule,
    Milestone, MudraDprRecord, ScheduledPayment, Transaction, UserXp, UuidIdGenerator,
};
use crate::money::Money;
use crate::mudra::{self, MudraDprInput, MudraDprOutput};
use crate::schemes::{self, SchemeApplicantProfile, SchemeAssessment};
use crate::storage::{self, Store};
use crate::tools::{
    self, ActionCache, GovVerify, NoopGovVerify, NoopWebSearch, SearchCache, ToolContext,
    ToolResult, WebSearch,
};

/// Everything constructed once at process start and shared (behind
/// references, never cloned per-request) across the life of the server.
pub struct Collaborators {
    pub store: Store,
    pub gateway: LlmGateway,
    pub knowledge: KnowledgeIndex,
    pub actions: ActionCache,
    pub search_cache: SearchCache,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub web_search: Arc<dyn WebSearch>,
    pub gov_verify: Arc<dyn GovVerify>,
    pub document_intelligence: Option<Arc<dyn DocumentIntelligence>>,
    pub vision_ocr: Arc<dyn VisionOcr>,
    pub reporting_currency: String,
}

/// Builds every collaborator from resolved configuration. LLM providers are
/// wired only when their API key is present; everything else defaults to
/// its `Noop*` implementation (§7 "NotConfigured is never fatal").
pub fn build(config: &ResolvedConfig) -> Result<Collaborators> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir.display()))?;
    let store = Store::open(&config.data_dir);

    let mut providers: Vec<Arc<dyn crate::llm::Chat>> = Vec::new();
    if let Some(key) = &config.openai_api_key {
        providers.push(Arc::new(HttpChatProvider::new(
            "openai",
            "https://api.openai.com/v1",
            key.clone(),
            "gpt-4o-mini",
        )));
    }
    if let Some(key) = &config.sarvam_api_key {
        providers.push(Arc::new(HttpChatProvider::new(
            "sarvam",
            "https://api.sarvam.ai/v1",
            key.clone(),
            "sarvam-m",
        )));
    }
    let gateway = if providers.is_empty() { LlmGateway::noop() } else { LlmGateway::new(providers) };

    let knowledge_dir = config.data_dir.join("knowledge");
    let knowledge = if knowledge_dir.is_dir() {
        KnowledgeIndex::load_corpus_dir(&knowledge_dir).context("failed to load knowledge corpus")?
    } else {
        KnowledgeIndex::empty()
    };

    Ok(Collaborators {
        store,
        gateway,
        knowledge,
        actions: ActionCache::new(),
        search_cache: SearchCache::new(),
        ids: Arc::new(UuidIdGenerator),
        clock: Arc::new(SystemClock),
        web_search: Arc::new(NoopWebSearch),
        gov_verify: Arc::new(NoopGovVerify),
        document_intelligence: None,
        vision_ocr: Arc::new(NoopVisionOcr),
        reporting_currency: config.reporting_currency.clone(),
    })
}

fn tool_context(collaborators: &Collaborators) -> ToolContext<'_> {
    ToolContext {
        store: &collaborators.store,
        ids: collaborators.ids.as_ref(),
        clock: collaborators.clock.as_ref(),
        knowledge: &collaborators.knowledge,
        web_search: collaborators.web_search.as_ref(),
        gov_verify: collaborators.gov_verify.as_ref(),
        actions: &collaborators.actions,
        search_cache: &collaborators.search_cache,
    }
}

/// `POST /agent/agentic-chat` (`/agent/chat` delegates to the same handler).
pub struct ChatRequest {
    pub query: String,
    pub user_context: Option<String>,
    pub conversation_history: Vec<ChatMessage>,
    pub user_id: Id,
}

pub async fn agentic_chat(collaborators: &Collaborators, request: ChatRequest, cancel: &CancellationToken) -> AgentResponse {
    let ctx = tool_context(collaborators);
    let user_context = request.user_context.unwrap_or_default();
    let trends_context = build_trends_context(collaborators, &request.user_id).await.unwrap_or_default();

    agent::handle_query(
        &request.query,
        &user_context,
        &trends_context,
        &request.conversation_history,
        &request.user_id,
        &collaborators.gateway,
        &collaborators.knowledge,
        &ctx,
        cancel,
    )
    .await
}

async fn build_trends_context(collaborators: &Collaborators, user_id: &Id) -> Result<String> {
    let today = collaborators.clock.today();
    let start = today - chrono::Duration::days(30);
    let trends = collaborators.store.ledger.get_daily_trends(user_id).await?;
    let recent: Vec<_> = trends.into_iter().filter(|t| t.date >= start && t.date <= today).collect();
    if recent.is_empty() {
        return Ok(String::new());
    }
    let spent: Money = recent.iter().map(|t| t.total_spent).sum();
    let income: Money = recent.iter().map(|t| t.total_income).sum();
    Ok(format!("Last 30 days: spent {spent}, earned {income}, across {} tracked days.", recent.len()))
}

/// `POST /agent/confirm-action`.
pub async fn confirm_action(collaborators: &Collaborators, action_id: &str) -> ToolResult {
    let ctx = tool_context(collaborators);
    tools::confirm_action(action_id, &ctx).await
}

/// `POST /agent/scan-document`: extracts rows, categorizes each with the
/// user's merchant rules (falling back to the gateway), then posts them.
pub async fn scan_document(collaborators: &Collaborators, user_id: &Id, pdf_path: &Path) -> ArthaResult<Vec<Transaction>> {
    let rows = extractors::extract_transactions_from_pdf(
        pdf_path,
        user_id,
        collaborators.document_intelligence.as_deref(),
        collaborators.ids.as_ref(),
        collaborators.clock.as_ref(),
    )
    .await?;

    let rules = user_merchant_rules(collaborators, user_id).await?;
    let llm = GatewayCategorizer::new(&collaborators.gateway);

    let mut posted = Vec::with_capacity(rows.len());
    for mut row in rows {
        row.category = categorizer::categorize(&row.description, &rules, Some(&llm)).await;
        posted.push(collaborators.store.create_transaction(row).await?);
    }
    Ok(posted)
}

/// `POST /agent/scan-receipt`.
pub async fn scan_receipt(collaborators: &Collaborators, user_id: &Id, image_bytes: &[u8]) -> ArthaResult<Transaction> {
    let draft = extractors::extract_receipt_transaction(
        image_bytes,
        user_id,
        collaborators.vision_ocr.as_ref(),
        collaborators.ids.as_ref(),
        collaborators.clock.as_ref(),
    )
    .await?;
    collaborators.store.create_transaction(draft).await.map_err(ArthaError::from)
}

/// `POST /calculator/{sip|fd|emi|rd|lumpsum|cagr|goal-sip|compound-interest}`.
/// The path segment -> tool-name mapping lives in the HTTP shell; this just
/// dispatches a tool that is already known to be collaborator-free.
pub async fn run_calculator(collaborators: &Collaborators, tool_name: &str, arguments: &serde_json::Value) -> ToolResult {
    let ctx = tool_context(collaborators);
    let placeholder_user = Id::from_string("calculator");
    tools::dispatch(tool_name, arguments, &placeholder_user, &ctx).await
}

async fn user_merchant_rules(collaborators: &Collaborators, user_id: &Id) -> ArthaResult<Vec<MerchantRule>> {
    let rules = collaborators.store.planning.merchant_rules.list_values().await.map_err(ArthaError::from)?;
    Ok(rules.into_iter().filter(|r| &r.user_id == user_id).collect())
}

/// `POST /categorize`.
pub async fn categorize_one(collaborators: &Collaborators, user_id: &Id, description: &str) -> ArthaResult<String> {
    let rules = user_merchant_rules(collaborators, user_id).await?;
    let llm = GatewayCategorizer::new(&collaborators.gateway);
    Ok(categorizer::categorize(description, &rules, Some(&llm)).await)
}

/// `POST /categorize/batch`.
pub async fn categorize_many(collaborators: &Collaborators, user_id: &Id, descriptions: &[String]) -> ArthaResult<Vec<String>> {
    let rules = user_merchant_rules(collaborators, user_id).await?;
    let llm = GatewayCategorizer::new(&collaborators.gateway);
    Ok(categorizer::categorize_batch(descriptions, &rules, Some(&llm)).await)
}

/// `GET /analytics/health-score/{user_id}`.
pub async fn health_score(collaborators: &Collaborators, user_id: &Id) -> Result<HealthScoreResult> {
    analytics::health_score(&collaborators.store, user_id).await
}

/// `POST /analytics/refresh/{user_id}`: rebuilds both derived caches (daily
/// trends and budget `spent`) in one call — they drift for the same reason
/// (deletes/edits bypassing the cross-store bump) and are repaired together.
pub async fn refresh_analytics(collaborators: &Collaborators, user_id: &Id) -> Result<()> {
    storage::rebuild_daily_trends(&collaborators.store, user_id).await?;
    storage::rebuild_budget_spent(&collaborators.store, user_id).await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyTrendsReport {
    pub trends: Vec<(String, MonthlyTrend)>,
    pub predicted_next_month_expense: Money,
}

/// `GET /analytics/monthly/{user_id}`.
pub async fn monthly_trends(collaborators: &Collaborators, user_id: &Id, months: usize) -> Result<MonthlyTrendsReport> {
    let trends = analytics::monthly_trends(&collaborators.store, user_id, months).await?;
    let predicted_next_month_expense = analytics::predict_next_month_expense(&collaborators.store, user_id).await?;
    Ok(MonthlyTrendsReport { trends, predicted_next_month_expense })
}

/// `GET /merchant-rules`.
pub async fn list_merchant_rules(collaborators: &Collaborators, user_id: &Id) -> ArthaResult<Vec<MerchantRule>> {
    user_merchant_rules(collaborators, user_id).await
}

/// `POST /merchant-rules`.
pub async fn create_merchant_rule(collaborators: &Collaborators, mut rule: MerchantRule) -> Result<MerchantRule> {
    rule.id = collaborators.ids.new_id();
    collaborators.store.planning.merchant_rules.put(&rule.id.clone(), &rule).await?;
    Ok(rule)
}

/// `DELETE /merchant-rules/{id}`.
pub async fn delete_merchant_rule(collaborators: &Collaborators, rule_id: &Id) -> Result<bool> {
    collaborators.store.planning.merchant_rules.delete(rule_id).await
}

/// `POST /mudra-dpr/calculate`: runs the deterministic engine and keeps a
/// record of the run (§4.11's milestone catalog reads `dpr_documents`-style
/// history indirectly through `docs.mudra_dprs`).
pub async fn mudra_calculate(collaborators: &Collaborators, user_id: &Id, input: MudraDprInput) -> Result<MudraDprOutput> {
    let output = mudra::run(&input);
    let record = MudraDprRecord {
        user_id: user_id.clone(),
        month: collaborators.clock.today().format("%Y-%m").to_string(),
        created_at: collaborators.clock.now(),
        input,
        output: output.clone(),
    };
    let record_id = collaborators.ids.new_id();
    collaborators.store.docs.mudra_dprs.put(&record_id, &record).await?;
    Ok(output)
}

/// A handful of overridable inputs for `/mudra-dpr/whatif` — a full
/// arbitrary patch can't cross an HTTP boundary as a closure, so the shell
/// exposes the fields a what-if session actually varies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MudraDprOverrides {
    pub interest_rate: Option<Decimal>,
    pub tenure_months: Option<u32>,
    pub units_full_capacity: Option<u64>,
    pub selling_price: Option<Money>,
}

impl MudraDprOverrides {
    fn apply(&self, input: &mut MudraDprInput) {
        if let Some(v) = self.interest_rate {
            input.interest_rate = v;
        }
        if let Some(v) = self.tenure_months {
            input.tenure_months = v;
        }
        if let Some(v) = self.units_full_capacity {
            input.units_full_capacity = v;
        }
        if let Some(v) = self.selling_price {
            input.selling_price = v;
        }
    }
}

/// `POST /mudra-dpr/whatif`: not persisted, since a what-if run is a
/// scratch exploration of the last calculated scenario, not a new record.
pub fn mudra_whatif(input: &MudraDprInput, overrides: &MudraDprOverrides) -> MudraDprOutput {
    mudra::what_if(input, |draft| overrides.apply(draft))
}

/// Runs the cooldown-gated analysis snapshot + milestone pass (§4.11).
pub async fn run_analysis(collaborators: &Collaborators, user_id: &Id) -> Result<Option<(AnalysisSnapshot, Vec<Milestone>)>> {
    analytics::run_analysis(&collaborators.store, user_id, collaborators.ids.as_ref(), collaborators.clock.as_ref()).await
}

/// Pure MSME scheme eligibility assessment (C12); no collaborators needed.
pub fn assess_schemes(profile: &SchemeApplicantProfile) -> Vec<SchemeAssessment> {
    schemes::assess(profile)
}

/// One turn of a persona-parameterized brainstorm session (C13).
pub async fn brainstorm_turn(collaborators: &Collaborators, persona: Persona, prompt: &str, history: &[ChatMessage]) -> ArthaResult<String> {
    brainstorm::brainstorm(&collaborators.gateway, persona, prompt, history).await
}

pub async fn reverse_brainstorm(collaborators: &Collaborators, ideas: &[String], history: &[ChatMessage]) -> ArthaResult<Vec<String>> {
    brainstorm::reverse_brainstorm(&collaborators.gateway, ideas, history).await
}

pub async fn extract_canvas(collaborators: &Collaborators, history: &[ChatMessage]) -> ArthaResult<Vec<CanvasCandidate>> {
    brainstorm::extract_canvas_candidates(&collaborators.gateway, history).await
}

/// Records a payment against a vendor bill and appends the resulting
/// history row (supplemented feature: vendor payment tracking).
pub async fn record_vendor_payment(collaborators: &Collaborators, payment_id: &Id, amount: Money) -> Result<crate::models::PaymentHistory> {
    let mut payment = collaborators
        .store
        .planning
        .vendor_payments
        .get(payment_id)
        .await?
        .context("vendor payment not found")?;

    let history = payment.make_payment(amount, collaborators.ids.as_ref(), collaborators.clock.as_ref());
    collaborators.store.planning.vendor_payments.put(payment_id, &payment).await?;
    collaborators.store.planning.payment_history.put(&history.id.clone(), &history).await?;
    Ok(history)
}

pub async fn vendor_outstanding_balance(collaborators: &Collaborators, vendor_id: &Id) -> Result<Money> {
    collaborators.store.planning.vendor_outstanding_balance(vendor_id).await
}

/// Issues a GST invoice, advancing the business profile's sequential
/// invoice number (supplemented feature: GST invoices).
pub async fn create_invoice(collaborators: &Collaborators, user_id: &Id, customer_id: &Id, items: Vec<InvoiceItem>) -> Result<Invoice> {
    let mut profile = collaborators
        .store
        .planning
        .business_profiles
        .get(user_id)
        .await?
        .context("no business profile on file; create one before invoicing")?;

    let year = collaborators.clock.today().year();
    let invoice_number = profile.next_invoice_number(year);
    collaborators.store.planning.business_profiles.put(user_id, &profile).await?;

    let invoice = Invoice {
        id: collaborators.ids.new_id(),
        user_id: user_id.clone(),
        customer_id: customer_id.clone(),
        invoice_number,
        date: collaborators.clock.today(),
        items,
    };
    collaborators.store.planning.invoices.put(&invoice.id.clone(), &invoice).await?;
    Ok(invoice)
}

/// Persists a bill split, deriving each participant's share from `items`
/// plus the bill-level tax/tip rather than trusting a caller-supplied
/// `splits` vector (supplemented feature: GST-aware bill splitting).
pub async fn create_bill_split(collaborators: &Collaborators, mut split: crate::models::BillSplit) -> Result<crate::models::BillSplit> {
    split.id = collaborators.ids.new_id();
    split.splits = split.compute_splits(collaborators.ids.as_ref());
    if !split.reconciles() {
        anyhow::bail!("bill split shares do not reconcile with the total (off by more than 1 paise)");
    }
    collaborators.store.planning.bill_splits.put(&split.id.clone(), &split).await?;
    Ok(split)
}

/// `GET /dashboard/{user_id}`: a composite read across all three stores.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub spending_summary: crate::models::SpendingSummary,
    pub budgets: Vec<Budget>,
    pub goals: Vec<Goal>,
    pub upcoming_payments: Vec<ScheduledPayment>,
    pub xp: UserXp,
}

pub async fn dashboard(collaborators: &Collaborators, user_id: &Id) -> Result<Dashboard> {
    let today = collaborators.clock.today();
    let month_start = today.with_day(1).unwrap_or(today);

    let spending_summary = collaborators.store.ledger.get_spending_summary(user_id, month_start, today).await?;
    let budgets = collaborators.store.planning.budgets.list_values().await?.into_iter().filter(|b| &b.user_id == user_id).collect();
    let goals = collaborators.store.planning.goals.list_values().await?.into_iter().filter(|g| &g.user_id == user_id).collect();
    let upcoming_payments = collaborators
        .store
        .planning
        .scheduled_payments
        .list_values()
        .await?
        .into_iter()
        .filter(|p| &p.user_id == user_id)
        .collect();
    let xp = collaborators.store.docs.user_xp(user_id).await?;

    Ok(Dashboard { spending_summary, budgets, goals, upcoming_payments, xp })
}

/// `GET /insights/daily/{user_id}`: a single-paragraph summary, no LLM call
/// needed since it's a deterministic readout of this month's ledger.
pub async fn daily_insight(collaborators: &Collaborators, user_id: &Id) -> Result<String> {
    let today = collaborators.clock.today();
    let month_start = today.with_day(1).unwrap_or(today);
    let summary = collaborators.store.ledger.get_spending_summary(user_id, month_start, today).await?;

    let top_category = summary.by_category.iter().max_by_key(|(_, amount)| amount.as_decimal()).map(|(category, _)| category.clone());

    Ok(match top_category {
        Some(category) => format!(
            "So far this month you've spent {} against {} income (net {}), with {category} your biggest category.",
            summary.total_expenses, summary.total_income, summary.net
        ),
        None => "No transactions recorded yet this month.".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::money::Money;
    use chrono::{TimeZone, Utc};

    fn test_config(dir: &std::path::Path) -> ResolvedConfig {
        ResolvedConfig {
            data_dir: dir.to_path_buf(),
            reporting_currency: "INR".to_string(),
            port: 8000,
            cors_origins: vec![],
            openai_api_key: None,
            sarvam_api_key: None,
            zoho_client_id: None,
            zoho_client_secret: None,
            zoho_refresh_token: None,
            gov_msme_api_key: None,
        }
    }

    #[test]
    fn build_falls_back_to_noop_gateway_without_api_keys() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = build(&test_config(dir.path())).unwrap();
        assert!(collaborators.knowledge.is_empty());
    }

    #[tokio::test]
    async fn daily_insight_reports_no_transactions_for_a_fresh_user() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = build(&test_config(dir.path())).unwrap();
        let user_id = Id::from_string("u1");

        let insight = daily_insight(&collaborators, &user_id).await.unwrap();
        assert_eq!(insight, "No transactions recorded yet this month.");
    }

    #[tokio::test]
    async fn dashboard_reflects_posted_transactions_and_budgets() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = build(&test_config(dir.path())).unwrap();
        let user_id = Id::from_string("u1");

        collaborators
            .store
            .create_transaction(Transaction::draft(
                user_id.clone(),
                Money::from_paise(500_00),
                crate::models::TransactionType::Expense,
                collaborators.clock.today(),
                "Food & Dining",
                "Lunch",
            ))
            .await
            .unwrap();

        let board = dashboard(&collaborators, &user_id).await.unwrap();
        assert_eq!(board.spending_summary.total_expenses.to_string(), "500.00");
    }

    #[tokio::test]
    async fn merchant_rule_crud_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = build(&test_config(dir.path())).unwrap();
        let user_id = Id::from_string("u1");

        let rule = MerchantRule { id: Id::from_string(""), user_id: user_id.clone(), keyword: "SWIGGY".into(), category: "Food & Dining".into(), is_auto: true };
        let created = create_merchant_rule(&collaborators, rule).await.unwrap();

        let rules = list_merchant_rules(&collaborators, &user_id).await.unwrap();
        assert_eq!(rules.len(), 1);

        let deleted = delete_merchant_rule(&collaborators, &created.id).await.unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn mudra_whatif_overrides_tenure_without_mutating_input() {
        let input = MudraDprInput {
            fixed_assets: vec![],
            rent: Money::from_paise(10_000_00),
            wages: Money::from_paise(20_000_00),
            utilities: Money::from_paise(5_000_00),
            other: Money::zero(),
            raw_material_per_unit: Money::from_paise(50_00),
            units_full_capacity: 1000,
            utilization_by_year: [Decimal::new(60, 2), Decimal::new(70, 2), Decimal::new(80, 2), Decimal::new(90, 2), Decimal::new(100, 2)],
            working_capital_months: Decimal::new(3, 0),
            promoter_pct: Decimal::new(20, 2),
            interest_rate: Decimal::new(11, 0),
            tenure_months: 60,
            selling_price: Money::from_paise(100_00),
            inflation: Decimal::new(5, 2),
            tax_rate: Decimal::new(25, 2),
        };

        let overrides = MudraDprOverrides { tenure_months: Some(36), ..Default::default() };
        let output = mudra_whatif(&input, &overrides);
        assert!(output.emi.as_decimal() > Decimal::ZERO);
        assert_eq!(input.tenure_months, 60);
    }

    #[tokio::test]
    async fn run_analysis_respects_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let mut collaborators = build(&test_config(dir.path())).unwrap();
        collaborators.clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()));
        let user_id = Id::from_string("u1");

        let first = run_analysis(&collaborators, &user_id).await.unwrap();
        assert!(first.is_some());

        let second = run_analysis(&collaborators, &user_id).await.unwrap();
        assert!(second.is_none());
    }
}

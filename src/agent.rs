//! The Sense-Plan-Act loop (C11): classify a query with the router, then
//! either answer directly from a fast path or drive a bounded ReAct
//! tool-calling sub-loop against the gateway.

use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::ArthaResult;
use crate::knowledge::KnowledgeIndex;
use crate::llm::{ChatMessage, LlmGateway, ToolSpec};
use crate::models::Id;
use crate::router::{self, QueryLabel};
use crate::tools::{self, ToolContext};

/// Bounds the ReAct sub-loop (§4.6 P7: at most `K+1` LLM calls per request).
pub const MAX_TOOL_ITERATIONS: usize = 5;

/// A source the final answer drew on, surfaced to the caller for
/// attribution (e.g. a knowledge-base document or a search result).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Source {
    pub kind: String,
    pub reference: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentResponse {
    pub response: String,
    pub action_taken: bool,
    pub action_type: Option<String>,
    pub action_data: Option<Value>,
    pub needs_confirmation: bool,
    pub sources: Vec<Source>,
    pub model_used: String,
}

/// Cooperative cancellation flag, checked between loop iterations and
/// before each tool dispatch (§5 "the agent loop observes cancellation
/// between iterations and before each tool dispatch").
#[derive(Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn cancelled_response() -> AgentResponse {
    AgentResponse {
        response: "Request cancelled.".to_string(),
        action_taken: false,
        action_type: None,
        action_data: None,
        needs_confirmation: false,
        sources: Vec::new(),
        model_used: "none".to_string(),
    }
}

const KB_RELEVANCE_THRESHOLD: f64 = 0.2;

fn gov_id_extract_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b([A-Z]{5}[0-9]{4}[A-Z]|[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][0-9A-Z]Z[0-9A-Z])\b").expect("valid regex"))
}

fn transaction_tool_specs() -> Vec<ToolSpec> {
    let names = [
        "create_budget", "create_savings_goal", "schedule_payment", "add_transaction", "calculate_sip", "calculate_fd", "calculate_emi",
        "calculate_rd", "calculate_lumpsum", "calculate_cagr", "calculate_goal_sip", "calculate_compound_interest", "calculate_emergency_fund",
        "calculate_savings_rate", "calculate_tax",
    ];
    names.iter().map(|n| tool_spec_for(n)).collect()
}

fn full_tool_specs() -> Vec<ToolSpec> {
    let names = [
        "calculate_sip", "calculate_fd", "calculate_emi", "calculate_rd", "calculate_lumpsum", "calculate_cagr", "calculate_goal_sip",
        "calculate_compound_interest", "calculate_emergency_fund", "calculate_savings_rate", "calculate_tax", "get_tax_info", "static_kb_search",
        "gov_verify_pan", "gov_verify_gstin", "gov_verify_itr", "create_budget", "create_savings_goal", "schedule_payment", "add_transaction",
        "web_search",
    ];
    names.iter().map(|n| tool_spec_for(n)).collect()
}

/// A permissive placeholder schema; each tool validates its own arguments
/// at dispatch time rather than relying on the model-facing schema alone.
fn tool_spec_for(name: &str) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: format!("Invoke the {name} tool."),
        parameters: serde_json::json!({ "type": "object", "additionalProperties": true }),
    }
}

/// Runs the Sense-Plan-Act loop for one request.
pub async fn handle_query(
    query: &str,
    user_context: &str,
    trends_context: &str,
    history: &[ChatMessage],
    user_id: &Id,
    gateway: &LlmGateway,
    knowledge: &KnowledgeIndex,
    ctx: &ToolContext<'_>,
    cancel: &CancellationToken,
) -> AgentResponse {
    if cancel.is_cancelled() {
        return cancelled_response();
    }

    let kb_keyword_hit = !knowledge.hybrid_search(query, 1).is_empty();
    let decision = router::classify(query, kb_keyword_hit);

    match decision.label {
        QueryLabel::StaticKb => handle_static_kb(query, history, trends_context, user_context, user_id, gateway, knowledge, ctx, cancel).await,
        QueryLabel::GovApi => handle_gov_api(query, user_id, ctx).await,
        QueryLabel::WebSearch => handle_web_search(query, user_id, ctx).await,
        QueryLabel::HeavyReasoning => handle_heavy_reasoning(query, user_context, history, knowledge, gateway, decision.config.max_tokens).await,
        QueryLabel::Transaction => {
            run_tool_loop(query, user_context, trends_context, history, user_id, gateway, &transaction_tool_specs(), ctx, cancel).await
        }
        QueryLabel::Simple => run_tool_loop(query, user_context, trends_context, history, user_id, gateway, &full_tool_specs(), ctx, cancel).await,
    }
}

async fn handle_static_kb(
    query: &str,
    history: &[ChatMessage],
    trends_context: &str,
    user_context: &str,
    user_id: &Id,
    gateway: &LlmGateway,
    knowledge: &KnowledgeIndex,
    ctx: &ToolContext<'_>,
    cancel: &CancellationToken,
) -> AgentResponse {
    let hits = knowledge.hybrid_search(query, 1);
    match hits.into_iter().find(|h| h.score > KB_RELEVANCE_THRESHOLD) {
        Some(hit) => AgentResponse {
            response: hit.content,
            action_taken: false,
            action_type: None,
            action_data: None,
            needs_confirmation: false,
            sources: vec![Source { kind: "knowledge_base".to_string(), reference: hit.doc_id }],
            model_used: "knowledge_index".to_string(),
        },
        None => run_tool_loop(query, user_context, trends_context, history, user_id, gateway, &full_tool_specs(), ctx, cancel).await,
    }
}

async fn handle_gov_api(query: &str, user_id: &Id, ctx: &ToolContext<'_>) -> AgentResponse {
    let Some(captures) = gov_id_extract_pattern().captures(query) else {
        return AgentResponse {
            response: "Please share the PAN or GSTIN you'd like me to verify.".to_string(),
            action_taken: false,
            action_type: None,
            action_data: None,
            needs_confirmation: false,
            sources: Vec::new(),
            model_used: "none".to_string(),
        };
    };
    let token = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

    let (tool_name, arguments) = if token.len() == 15 {
        ("gov_verify_gstin", serde_json::json!({ "gstin": token }))
    } else {
        ("gov_verify_pan", serde_json::json!({ "pan": token }))
    };

    let result = tools::dispatch(tool_name, &arguments, user_id, ctx).await;
    AgentResponse {
        response: result.message.clone(),
        action_taken: false,
        action_type: None,
        action_data: Some(result.data),
        needs_confirmation: false,
        sources: vec![Source { kind: "gov_api".to_string(), reference: token.to_string() }],
        model_used: "gov_api".to_string(),
    }
}

async fn handle_web_search(query: &str, user_id: &Id, ctx: &ToolContext<'_>) -> AgentResponse {
    let result = tools::dispatch("web_search", &serde_json::json!({ "query": query }), user_id, ctx).await;

    if !result.success {
        return AgentResponse {
            response: format!("I couldn't search the web right now: {}", result.message),
            action_taken: false,
            action_type: None,
            action_data: None,
            needs_confirmation: false,
            sources: Vec::new(),
            model_used: "web_search".to_string(),
        };
    }

    let results = result.data.get("results").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let sources = results
        .iter()
        .filter_map(|r| r.get("url").and_then(|u| u.as_str()).map(|u| Source { kind: "web_search".to_string(), reference: u.to_string() }))
        .collect();

    let formatted = format_search_results(&results);
    AgentResponse { response: formatted, action_taken: false, action_type: None, action_data: None, needs_confirmation: false, sources, model_used: "web_search".to_string() }
}

fn format_search_results(results: &[Value]) -> String {
    if results.is_empty() {
        return "I couldn't find anything relevant.".to_string();
    }
    results
        .iter()
        .take(5)
        .filter_map(|r| {
            let title = r.get("title")?.as_str()?;
            let snippet = r.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
            Some(format!("- {title}: {snippet}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn handle_heavy_reasoning(query: &str, user_context: &str, history: &[ChatMessage], knowledge: &KnowledgeIndex, gateway: &LlmGateway, max_tokens: u32) -> AgentResponse {
    let hits = knowledge.hybrid_search(query, 2);
    let mut messages = vec![ChatMessage::system(format!("{user_context}\n\nmax_tokens_hint: {max_tokens}"))];

    if !hits.is_empty() {
        let context_block = hits.iter().map(|h| format!("[{}] {}", h.title, h.content)).collect::<Vec<_>>().join("\n\n");
        messages.push(ChatMessage::system(format!("Relevant background:\n{context_block}")));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query));

    match gateway.chat(&messages, &[], None).await {
        Ok(response) => {
            let sources = hits.into_iter().map(|h| Source { kind: "knowledge_base".to_string(), reference: h.doc_id }).collect();
            AgentResponse {
                response: clean_final_answer(&response.content),
                action_taken: false,
                action_type: None,
                action_data: None,
                needs_confirmation: false,
                sources,
                model_used: response.model_used,
            }
        }
        Err(e) => AgentResponse {
            response: format!("I wasn't able to reason through that: {e}"),
            action_taken: false,
            action_type: None,
            action_data: None,
            needs_confirmation: false,
            sources: Vec::new(),
            model_used: "none".to_string(),
        },
    }
}

/// §4.6 step 3: the bounded tool-calling sub-loop.
#[allow(clippy::too_many_arguments)]
async fn run_tool_loop(
    query: &str,
    user_context: &str,
    trends_context: &str,
    history: &[ChatMessage],
    user_id: &Id,
    gateway: &LlmGateway,
    tool_specs: &[ToolSpec],
    ctx: &ToolContext<'_>,
    cancel: &CancellationToken,
) -> AgentResponse {
    let mut msgs = vec![ChatMessage::system(format!("{user_context}\n\n{trends_context}"))];
    msgs.extend(history.iter().cloned());
    msgs.push(ChatMessage::user(query));

    let mut last_action: Option<tools::ToolResult> = None;
    let mut model_used = "none".to_string();

    for _ in 0..MAX_TOOL_ITERATIONS {
        if cancel.is_cancelled() {
            return cancelled_response();
        }

        let response = match gateway.chat(&msgs, tool_specs, None).await {
            Ok(r) => r,
            Err(e) => {
                return AgentResponse {
                    response: format!("I ran into a problem talking to the assistant backend: {e}"),
                    action_taken: false,
                    action_type: None,
                    action_data: None,
                    needs_confirmation: false,
                    sources: Vec::new(),
                    model_used,
                };
            }
        };
        model_used = response.model_used.clone();

        if !response.has_tool_calls() {
            return AgentResponse {
                response: clean_final_answer(&response.content),
                action_taken: last_action.is_some(),
                action_type: last_action.as_ref().map(|a| a.action.clone()),
                action_data: last_action.as_ref().map(|a| a.data.clone()),
                needs_confirmation: last_action.as_ref().map(|a| a.needs_confirmation).unwrap_or(false),
                sources: Vec::new(),
                model_used,
            };
        }

        msgs.push(ChatMessage::assistant(response.content.clone()));

        for tc in &response.tool_calls {
            if cancel.is_cancelled() {
                return cancelled_response();
            }

            let result = tools::dispatch(&tc.name, &tc.arguments, user_id, ctx).await;
            let truncated = tools::truncate_for_transcript(&result);
            msgs.push(ChatMessage::tool(tc.id.clone(), tc.name.clone(), truncated));

            if result.needs_confirmation {
                let early_exit_content = result.message.clone();
                last_action = Some(result);
                if !early_exit_content.is_empty() {
                    return AgentResponse {
                        response: clean_final_answer(&early_exit_content),
                        action_taken: true,
                        action_type: last_action.as_ref().map(|a| a.action.clone()),
                        action_data: last_action.as_ref().map(|a| a.data.clone()),
                        needs_confirmation: true,
                        sources: Vec::new(),
                        model_used,
                    };
                }
            } else {
                last_action = Some(result);
            }
        }
    }

    let fallback = msgs
        .last()
        .filter(|m| m.role == crate::llm::ChatRole::Assistant && !m.content.is_empty())
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "I've completed the tasks.".to_string());

    AgentResponse {
        response: clean_final_answer(&fallback),
        action_taken: last_action.is_some(),
        action_type: last_action.as_ref().map(|a| a.action.clone()),
        action_data: last_action.as_ref().map(|a| a.data.clone()),
        needs_confirmation: last_action.as_ref().map(|a| a.needs_confirmation).unwrap_or(false),
        sources: Vec::new(),
        model_used,
    }
}

fn code_fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*\{.*?\}\s*```").expect("valid regex"))
}

fn blank_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

const PREAMBLES: &[&str] = &["final answer:", "here is the answer", "based on the search", "here's the answer"];

/// §4.6 step 4: strips fenced JSON blobs and boilerplate preambles, then
/// collapses excess blank lines.
fn clean_final_answer(raw: &str) -> String {
    let without_json = code_fence_pattern().replace_all(raw, "");

    let mut text = without_json.trim().to_string();
    loop {
        let lower = text.to_lowercase();
        let mut stripped = false;
        for preamble in PREAMBLES {
            if lower.starts_with(preamble) {
                text = text[preamble.len()..].trim_start_matches(':').trim_start().to_string();
                stripped = true;
                break;
            }
        }
        if !stripped {
            break;
        }
    }

    let collapsed = blank_run_pattern().replace_all(&text, "\n\n");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_final_answer_strips_fenced_json() {
        let raw = "Here's the result:\n```json\n{\"a\":1}\n```\nAll done.";
        let cleaned = clean_final_answer(raw);
        assert!(!cleaned.contains("```"));
        assert!(cleaned.contains("All done."));
    }

    #[test]
    fn clean_final_answer_strips_preamble() {
        let cleaned = clean_final_answer("Final Answer: your SIP will grow to 10 lakh");
        assert_eq!(cleaned, "your SIP will grow to 10 lakh");
    }

    #[test]
    fn clean_final_answer_collapses_blank_runs() {
        let cleaned = clean_final_answer("line one\n\n\n\n\nline two");
        assert_eq!(cleaned, "line one\n\nline two");
    }

    #[test]
    fn cancellation_token_reports_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn format_search_results_handles_empty() {
        assert_eq!(format_search_results(&[]), "I couldn't find anything relevant.");
    }
}

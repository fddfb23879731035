//! Persona-parameterized chat for business-idea ideation (C13), plus
//! reverse-brainstorm ("how would this idea fail?") and canvas-candidate
//! extraction. Grounded on `openai_brainstorm_service.py`'s "thinking hats"
//! design: different system prompts bias the same underlying model toward
//! a different cognitive stance, and a later stage distills the surviving
//! ideas into a structured list.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ArthaError, ArthaResult};
use crate::llm::{ChatMessage, LlmGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Neutral,
    Critic,
    Analyst,
    Investor,
    Customer,
}

impl Persona {
    fn system_prompt(self) -> &'static str {
        match self {
            Persona::Neutral => {
                "You are a business consultant specializing in Indian markets. Give \
                 actionable advice, reference relevant government schemes (PMEGP, Mudra, \
                 Startup India) where applicable, and keep the response concise."
            }
            Persona::Critic => {
                "You are a skeptical reviewer. Your job is to find every reason an idea \
                 might fail: weak unit economics, no moat, unrealistic assumptions about \
                 distribution or collection cycles in India. Be blunt, cite concrete \
                 failure modes, and do not soften the verdict."
            }
            Persona::Analyst => {
                "You are a financial analyst. Evaluate the idea in terms of unit economics, \
                 capital requirements, break-even timeline, and comparable benchmarks. \
                 Quantify wherever you can."
            }
            Persona::Investor => {
                "You are an early-stage investor deciding whether to fund this. Focus on \
                 market size, founder-market fit signals visible in the idea description, \
                 and what would need to be true for a 10x outcome."
            }
            Persona::Customer => {
                "You are a prospective customer for this idea in India. React as a real \
                 buyer would: would you actually pay for this, what would stop you, and \
                 what's missing compared to what you use today."
            }
        }
    }
}

/// One turn of a persona-parameterized brainstorm session.
pub async fn brainstorm(
    gateway: &LlmGateway,
    persona: Persona,
    prompt: &str,
    history: &[ChatMessage],
) -> ArthaResult<String> {
    let mut messages = vec![ChatMessage::system(persona.system_prompt())];
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(prompt));

    let response = gateway.chat(&messages, &[], None).await?;
    Ok(response.content)
}

/// REFINERY stage: critique a list of surviving ideas, always through the
/// `Critic` persona regardless of which persona generated them, and always
/// without web search context (a pure LLM critique of what's already on
/// the table).
pub async fn reverse_brainstorm(
    gateway: &LlmGateway,
    ideas: &[String],
    history: &[ChatMessage],
) -> ArthaResult<Vec<String>> {
    if ideas.is_empty() {
        return Ok(Vec::new());
    }

    let ideas_text: String = ideas.iter().map(|i| format!("- {i}\n")).collect();
    let prompt = format!(
        "Ideas to critique:\n{ideas_text}\n\
         Identify the weakest links that would make a user abandon this or a \
         customer not pay for it. For each, name the flaw, why it's critical, and \
         its severity (High/Medium/Low). End by naming which ideas (if any) \
         survive once those weaknesses are addressed."
    );

    let response = brainstorm(gateway, Persona::Critic, &prompt, history).await?;
    Ok(split_into_points(&response))
}

fn bullet_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^\s*[-•]\s*(.+)$").expect("valid regex"))
}

fn split_into_points(text: &str) -> Vec<String> {
    let points: Vec<String> = bullet_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();

    if points.is_empty() {
        text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
    } else {
        points
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasField {
    Feature,
    Risk,
    Opportunity,
    Insight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasCandidate {
    pub title: String,
    pub field: CanvasField,
    pub content: String,
    pub priority: String,
}

fn json_array_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```json\s*(\[.*?\])\s*```|(\[.*\])").expect("valid regex"))
}

/// ANCHOR stage: turn a freeform brainstorm transcript into a structured
/// lean-canvas-like candidate list. Asks the gateway for a JSON array and
/// falls back to an empty list (never a parse error) if the model's
/// response doesn't contain one — this is an LLM-text-mining operation,
/// not one with a validation boundary to fail hard at.
pub async fn extract_canvas_candidates(
    gateway: &LlmGateway,
    history: &[ChatMessage],
) -> ArthaResult<Vec<CanvasCandidate>> {
    if history.len() < 2 {
        return Ok(Vec::new());
    }

    let transcript: String = history
        .iter()
        .rev()
        .take(10)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|m| format!("{:?}: {}\n", m.role, truncate(&m.content, 300)))
        .collect();

    let prompt = format!(
        "Based on this conversation:\n\n{transcript}\n\n\
         Extract the key ideas that survived critique and are worth pinning to a \
         canvas. Return ONLY a JSON array, each item shaped as \
         {{\"title\": ..., \"field\": \"feature|risk|opportunity|insight\", \
         \"content\": ..., \"priority\": \"high|medium|low\"}}."
    );

    let response = brainstorm(gateway, Persona::Analyst, &prompt, &[]).await?;
    Ok(parse_canvas_json(&response))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn parse_canvas_json(content: &str) -> Vec<CanvasCandidate> {
    let Some(captures) = json_array_pattern().captures(content) else {
        return Vec::new();
    };
    let raw = captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str()).unwrap_or("[]");
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    serde_json::from_value(value).unwrap_or_default()
}

/// Reformulates a freeform idea description into the deterministic checks
/// `SchemeAssessor` and `MudraEngine` need, without calling the gateway —
/// not everything in a brainstorm session needs an LLM round trip.
pub fn idea_summary(text: &str) -> String {
    truncate(text.trim(), 280).to_string()
}

pub fn not_configured_placeholder() -> ArthaError {
    ArthaError::not_configured("brainstorm LLM provider")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use std::sync::Arc;

    struct ScriptedProvider(String);

    #[async_trait::async_trait]
    impl crate::llm::Chat for ScriptedProvider {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[crate::llm::ToolSpec],
            _model: Option<&str>,
        ) -> ArthaResult<ChatResponse> {
            Ok(ChatResponse { content: self.0.clone(), tool_calls: vec![], model_used: "scripted".into() })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn reverse_brainstorm_empty_ideas_skips_the_call() {
        let gateway = LlmGateway::noop();
        let result = reverse_brainstorm(&gateway, &[], &[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn reverse_brainstorm_splits_bullet_points() {
        let gateway = LlmGateway::new(vec![Arc::new(ScriptedProvider(
            "- unit economics don't work\n- no real moat\nSURVIVORS: none".to_string(),
        ))]);
        let points = reverse_brainstorm(&gateway, &["Idea A".to_string()], &[]).await.unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].contains("unit economics"));
    }

    #[tokio::test]
    async fn extract_canvas_candidates_needs_at_least_two_turns() {
        let gateway = LlmGateway::noop();
        let candidates = extract_canvas_candidates(&gateway, &[ChatMessage::user("hi")]).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn extract_canvas_candidates_parses_fenced_json() {
        let gateway = LlmGateway::new(vec![Arc::new(ScriptedProvider(
            "Here you go:\n```json\n[{\"title\": \"Loyalty tier\", \"field\": \"feature\", \
             \"content\": \"Add a loyalty tier\", \"priority\": \"high\"}]\n```"
                .to_string(),
        ))]);
        let history = vec![ChatMessage::user("idea one"), ChatMessage::assistant("ok")];
        let candidates = extract_canvas_candidates(&gateway, &history).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Loyalty tier");
    }

    #[test]
    fn idea_summary_truncates_long_text() {
        let long = "a".repeat(500);
        assert_eq!(idea_summary(&long).len(), 280);
    }
}

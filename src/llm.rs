//! Uniform chat interface over pluggable LLM providers (C8). The gateway is
//! provider-agnostic: it tries each configured provider in priority order and
//! falls back to the next on failure, but the return shape — a single typed
//! `ChatResponse` rather than a duck-typed dict-or-object — never changes
//! with the provider (§9 "Runtime reflection / duck typing").

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ArthaError, ArthaResult};

/// Default per-call budget for a single provider round trip (§5 Timeouts).
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), tool_call_id: None, name: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), tool_call_id: None, name: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), tool_call_id: None, name: None }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// A tool signature offered to the model, translated to each provider's
/// wire format at the gateway boundary (§9 "Dynamic tool schemas").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One requested invocation, as emitted by the model (§6.3 tool-call ABI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// `Chat(messages, tools?, model) -> {content, tool_calls?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub model_used: String,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One pluggable chat provider. Implementations may be configured (an HTTP
/// provider wired to a real vendor) or absent (`NoopChatProvider`, which
/// always reports `NotConfigured`).
#[async_trait::async_trait]
pub trait Chat: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec], model: Option<&str>) -> ArthaResult<ChatResponse>;

    fn name(&self) -> &str;
}

/// Always reports `NotConfigured`; the default when no provider key is set.
pub struct NoopChatProvider;

#[async_trait::async_trait]
impl Chat for NoopChatProvider {
    async fn chat(&self, _messages: &[ChatMessage], _tools: &[ToolSpec], _model: Option<&str>) -> ArthaResult<ChatResponse> {
        Err(ArthaError::not_configured("no LLM provider configured"))
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// An OpenAI-compatible chat-completions endpoint (covers most hosted LLM
/// vendors, including Indian-market providers that mirror the same wire
/// shape). One instance is one provider slot (A, B, or C).
pub struct HttpChatProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    default_model: String,
    client: Client,
}

impl HttpChatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: SecretString, default_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key,
            default_model: default_model.into(),
            client: Client::new(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

#[async_trait::async_trait]
impl Chat for HttpChatProvider {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec], model: Option<&str>) -> ArthaResult<ChatResponse> {
        let role_str = |r: &ChatRole| match r {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };

        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: role_str(&m.role),
                content: &m.content,
                tool_call_id: m.tool_call_id.as_deref(),
                name: m.name.as_deref(),
            })
            .collect();

        let wire_tools = tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: WireFunction { name: &t.name, description: &t.description, parameters: &t.parameters },
            })
            .collect();

        let body = ChatCompletionRequest {
            model: model.unwrap_or(&self.default_model),
            messages: wire_messages,
            tools: wire_tools,
        };

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send();

        let response = tokio::time::timeout(CHAT_TIMEOUT, request)
            .await
            .map_err(|_| ArthaError::upstream(&self.name, "chat request timed out"))?
            .map_err(|e| ArthaError::upstream(&self.name, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ArthaError::upstream(&self.name, format!("HTTP {status}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ArthaError::upstream(&self.name, format!("malformed response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ArthaError::upstream(&self.name, "no choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null),
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model_used: if parsed.model.is_empty() { self.default_model.clone() } else { parsed.model },
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Tries each configured provider in order, returning the first success.
/// `NotConfigured`/`Upstream` failures fall through to the next provider;
/// an empty provider list behaves like a single `NoopChatProvider`.
pub struct LlmGateway {
    providers: Vec<Arc<dyn Chat>>,
}

impl LlmGateway {
    pub fn new(providers: Vec<Arc<dyn Chat>>) -> Self {
        Self { providers }
    }

    pub fn noop() -> Self {
        Self { providers: vec![Arc::new(NoopChatProvider)] }
    }

    pub async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec], model: Option<&str>) -> ArthaResult<ChatResponse> {
        if self.providers.is_empty() {
            return Err(ArthaError::not_configured("no LLM provider configured"));
        }

        let mut last_err = None;
        for provider in &self.providers {
            match provider.chat(messages, tools, model).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "chat provider failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ArthaError::not_configured("no LLM provider configured")))
    }
}

/// Adapts the gateway's one-shot/batch chat calls to the categorizer's
/// `LlmCategorizer` contract (§4.4 step 3).
pub struct GatewayCategorizer<'a> {
    gateway: &'a LlmGateway,
}

impl<'a> GatewayCategorizer<'a> {
    pub fn new(gateway: &'a LlmGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl<'a> crate::categorizer::LlmCategorizer for GatewayCategorizer<'a> {
    async fn categorize_one(&self, description: &str) -> anyhow::Result<Option<String>> {
        let prompt = format!(
            "Classify this bank transaction description into a single short category name, \
             with no explanation, just the category: \"{description}\""
        );
        let messages = vec![ChatMessage::system("You categorize Indian personal-finance transactions."), ChatMessage::user(prompt)];
        let response = self.gateway.chat(&messages, &[], None).await?;
        let category = response.content.trim();
        if category.is_empty() {
            Ok(None)
        } else {
            Ok(Some(category.to_string()))
        }
    }

    async fn categorize_batch(&self, descriptions: &[&str]) -> anyhow::Result<Vec<String>> {
        let numbered: String = descriptions.iter().enumerate().map(|(i, d)| format!("{}. {d}\n", i + 1)).collect();
        let prompt = format!(
            "Classify each transaction description below into a single short category name. \
             Reply with exactly one category per line, in the same order, nothing else.\n\n{numbered}"
        );
        let messages = vec![ChatMessage::system("You categorize Indian personal-finance transactions."), ChatMessage::user(prompt)];
        let response = self.gateway.chat(&messages, &[], None).await?;

        let lines: Vec<String> = response.content.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
        if lines.len() != descriptions.len() {
            return Ok(vec![crate::categorizer::OTHER.to_string(); descriptions.len()]);
        }
        Ok(lines)
    }
}

use crate::dispatch::ToolResponse;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// An action the model asked for: the registry name plus its raw argument bag.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub name: String,
    pub args: Value,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    Text(String),
    ToolRequests(Vec<ToolRequest>),
}

/// One entry of the running transcript. The transcript only ever grows.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User(String),
    Model(ModelTurn),
    ToolResult { name: String, response: ToolResponse },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.response_tokens += other.response_tokens;
    }
}

pub struct ProviderRequest<'a> {
    pub model: &'a str,
    pub transcript: &'a [Turn],
    /// Function declarations, as rendered by the registry.
    pub tools: &'a Value,
    pub system_instruction: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub turns: Vec<ModelTurn>,
    pub usage: Option<TokenUsage>,
}

/// The remote model the conversation loop consults each round.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: ProviderRequest<'_>) -> anyhow::Result<ProviderResponse>;
}

/// Gemini `generateContent` over REST.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create Gemini HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, request: ProviderRequest<'_>) -> anyhow::Result<ProviderResponse> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, request.model);

        let payload = json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }]
            },
            "contents": gemini_contents(request.transcript),
            "tools": [{ "functionDeclarations": request.tools }],
        });

        tracing::debug!(model = request.model, turns = request.transcript.len(), "calling Gemini");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Gemini request failed (Model: {})", request.model))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow::anyhow!(
                "Gemini API Error (Model: {}, HTTP {}): {}",
                request.model,
                status,
                error_text
            ));
        }

        let res_json: Value = response.json().await?;
        parse_gemini_response(&res_json)
    }
}

/// Maps the transcript onto Gemini `contents`. Consecutive tool results are
/// folded into one `user` content holding all their `functionResponse` parts.
fn gemini_contents(transcript: &[Turn]) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for turn in transcript {
        let content = match turn {
            Turn::ToolResult { name, response } => {
                let body = match response {
                    ToolResponse::Success { payload } => json!({ "result": payload }),
                    ToolResponse::Failure { message } => json!({ "error": message }),
                };
                pending_results.push(json!({
                    "functionResponse": { "name": name, "response": body }
                }));
                continue;
            }
            Turn::User(text) => json!({ "role": "user", "parts": [{ "text": text }] }),
            Turn::Model(ModelTurn::Text(text)) => {
                json!({ "role": "model", "parts": [{ "text": text }] })
            }
            Turn::Model(ModelTurn::ToolRequests(calls)) => {
                let parts: Vec<Value> = calls
                    .iter()
                    .map(|call| json!({ "functionCall": { "name": call.name, "args": call.args } }))
                    .collect();
                json!({ "role": "model", "parts": parts })
            }
        };

        if !pending_results.is_empty() {
            contents.push(json!({ "role": "user", "parts": std::mem::take(&mut pending_results) }));
        }
        contents.push(content);
    }

    if !pending_results.is_empty() {
        contents.push(json!({ "role": "user", "parts": pending_results }));
    }
    contents
}

/// Every candidate becomes a text turn, a tool-request turn, or both, in that
/// order.
fn parse_gemini_response(res_json: &Value) -> anyhow::Result<ProviderResponse> {
    let mut turns = Vec::new();

    for candidate in res_json["candidates"].as_array().into_iter().flatten() {
        let Some(parts) = candidate["content"]["parts"].as_array() else {
            continue;
        };

        let mut text_acc = String::new();
        let mut calls = Vec::new();
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                text_acc.push_str(text);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().unwrap_or_default();
                let args = call.get("args").cloned().unwrap_or(Value::Null);
                calls.push(ToolRequest::new(name, args));
            }
        }

        if !text_acc.is_empty() {
            turns.push(ModelTurn::Text(text_acc));
        }
        if !calls.is_empty() {
            turns.push(ModelTurn::ToolRequests(calls));
        }
    }

    if turns.is_empty() {
        let reason = res_json["candidates"][0]["finishReason"]
            .as_str()
            .or_else(|| res_json["promptFeedback"]["blockReason"].as_str())
            .unwrap_or("UNKNOWN");
        let msg = if reason == "SAFETY" {
            "Gemini blocked the response due to SAFETY filters.".to_string()
        } else {
            format!("Gemini returned no content. Finish Reason: {}. Response: {}", reason, res_json)
        };
        return Err(anyhow::anyhow!(msg));
    }

    let usage = res_json.get("usageMetadata").map(|meta| TokenUsage {
        prompt_tokens: meta["promptTokenCount"].as_u64().unwrap_or(0),
        response_tokens: meta["candidatesTokenCount"].as_u64().unwrap_or(0),
    });

    Ok(ProviderResponse { turns, usage })
}

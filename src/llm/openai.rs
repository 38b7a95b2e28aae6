//! `OpenAI`-compatible chat completions provider

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-completions client for `OpenAI` and compatible gateways
pub struct OpenAIService {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAIService {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
        })
    }

    /// Reasoning models take `max_completion_tokens` instead of `max_tokens`
    fn uses_max_completion_tokens(&self) -> bool {
        self.model.starts_with("gpt-5") || self.model.starts_with('o')
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(request.system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            messages.extend(Self::translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let (max_tokens, max_completion_tokens) = if self.uses_max_completion_tokens() {
            (None, request.max_tokens)
        } else {
            (request.max_tokens, None)
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens,
            max_completion_tokens,
        }
    }

    /// Translate one message. Tool results become separate `tool` role messages.
    fn translate_message(msg: &LlmMessage) -> Vec<OpenAIMessage> {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut messages = Vec::new();

        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text.clone()),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(OpenAIToolCall {
                        id: id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    messages.push(OpenAIMessage {
                        role: "tool".to_string(),
                        content: Some(content.clone()),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                    });
                }
            }
        }

        if !text_parts.is_empty() || !tool_calls.is_empty() {
            messages.insert(
                0,
                OpenAIMessage {
                    role: role.to_string(),
                    content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                },
            );
        }

        messages
    }

    fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::malformed("No choices in response"))?;

        let mut content = Vec::new();

        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }

        for tc in choice.message.tool_calls.unwrap_or_default() {
            let input = if tc.function.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&tc.function.arguments).map_err(|e| {
                    LlmError::malformed(format!(
                        "Arguments for {} are not valid JSON: {e}",
                        tc.function.name
                    ))
                })?
            };
            content.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }

        let usage = resp.usage.unwrap_or_default();
        Ok(LlmResponse {
            content,
            usage: Usage {
                input_tokens: u64::from(usage.prompt_tokens),
                output_tokens: u64::from(usage.completion_tokens),
            },
        })
    }

    fn classify_status(status: u16, message: &str, retry_after: Option<Duration>) -> LlmError {
        match status {
            401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
            429 => {
                let err = LlmError::rate_limit(format!("Rate limit exceeded: {message}"));
                match retry_after {
                    Some(d) => err.with_retry_after(d),
                    None => err,
                }
            }
            400 | 404 | 422 => LlmError::invalid_request(format!("Invalid request: {message}")),
            _ => LlmError::server_error(format!("HTTP {status}: {message}")),
        }
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |r| r.error.message);
            return Err(Self::classify_status(status.as_u16(), &message, retry_after));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::malformed(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, ToolDefinition};
    use serde_json::json;

    fn service() -> OpenAIService {
        let config = LlmConfig {
            api_key: Some("k".to_string()),
            base_url: "https://example.test/v1/".to_string(),
            model: "gpt-5-nano".to_string(),
        };
        OpenAIService::new(&config, "k".to_string()).unwrap()
    }

    #[test]
    fn endpoint_joins_base_url() {
        assert_eq!(
            service().endpoint,
            "https://example.test/v1/chat/completions"
        );
    }

    #[test]
    fn tool_results_become_tool_role_messages() {
        let request = LlmRequest {
            system: "be brief".to_string(),
            messages: vec![
                LlmMessage {
                    role: MessageRole::Assistant,
                    content: vec![ContentBlock::tool_use("c1", "add_numbers", json!({"a": 1}))],
                },
                LlmMessage {
                    role: MessageRole::User,
                    content: vec![ContentBlock::tool_result("c1", "2", false)],
                },
            ],
            tools: vec![ToolDefinition {
                name: "add_numbers".to_string(),
                description: "adds".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            max_tokens: Some(256),
        };

        let translated = service().translate_request(&request);
        let roles: Vec<_> = translated.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "assistant", "tool"]);
        assert_eq!(translated.messages[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(translated.max_completion_tokens, Some(256));
        assert!(translated.max_tokens.is_none());
        assert_eq!(translated.tools.map(|t| t.len()), Some(1));
    }

    #[test]
    fn parses_tool_calls_with_text() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Checking",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "add_pantry_item", "arguments": "{\"name\":\"milk\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp: OpenAIResponse = serde_json::from_value(body).unwrap();
        let normalized = OpenAIService::normalize_response(resp).unwrap();
        assert_eq!(normalized.content.len(), 2);
        assert_eq!(normalized.usage.input_tokens, 10);
        assert!(matches!(
            &normalized.content[1],
            ContentBlock::ToolUse { name, input, .. } if name == "add_pantry_item" && input["name"] == "milk"
        ));
    }

    #[test]
    fn bad_arguments_are_malformed() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "add_numbers", "arguments": "{not json"}
                    }]
                }
            }]
        });
        let resp: OpenAIResponse = serde_json::from_value(body).unwrap();
        let err = OpenAIService::normalize_response(resp).unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::MalformedResponse);
    }

    #[test]
    fn status_codes_map_to_kinds() {
        let rl = OpenAIService::classify_status(429, "slow", Some(Duration::from_secs(3)));
        assert_eq!(rl.kind, LlmErrorKind::RateLimited);
        assert_eq!(rl.retry_after, Some(Duration::from_secs(3)));
        assert_eq!(
            OpenAIService::classify_status(503, "down", None).kind,
            LlmErrorKind::Unavailable
        );
        assert_eq!(
            OpenAIService::classify_status(401, "key", None).kind,
            LlmErrorKind::Unavailable
        );
        assert_eq!(
            OpenAIService::classify_status(400, "bad", None).kind,
            LlmErrorKind::InvalidRequest
        );
    }
}

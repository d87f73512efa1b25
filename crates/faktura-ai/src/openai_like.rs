//! A blocking HTTP client for OpenAI-compatible chat completion APIs,
//! modeled directly on the async `OpenAIClient` request/response shape
//! (`ChatRequest`/`Message`/`Content`/`ChatResponse`) but switched to
//! `reqwest::blocking` and a hard 30s timeout, per spec §4.10/§5's call for
//! "a synchronous adapter with a hard timeout" rather than a coroutine
//! system.

use std::time::Duration;

use base64::Engine;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::provider::{AiProvider, AiTotalResult, PageContext, TotalCandidate};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content {
    Text { r#type: String, text: String },
    Image { r#type: String, image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// The structured answer the model is instructed to return; mirrors
/// [`AiTotalResult`] but as a plain deserialize target before validation.
#[derive(Debug, Deserialize)]
struct TotalResponse {
    amount: f64,
    confidence: f32,
    validation_passed: bool,
    reasoning: Option<String>,
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiLikeClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiLikeClient {
    /// Builds a client pointed at the standard OpenAI endpoint.
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_endpoint(api_key, model, DEFAULT_ENDPOINT.to_string())
    }

    /// Builds a client pointed at a custom (OpenAI-compatible) endpoint, for
    /// Azure OpenAI or a self-hosted gateway.
    #[must_use]
    pub fn with_endpoint(api_key: String, model: String, endpoint: String) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { client, api_key, endpoint, model }
    }

    fn send(&self, messages: Vec<Message>) -> Option<TotalResponse> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: 512,
            temperature: 0.0,
            response_format: ResponseFormat { r#type: "json_object".to_string() },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .ok()?;

        if !response.status().is_success() {
            log::warn!("AI provider returned non-success status: {}", response.status());
            return None;
        }

        let chat_response: ChatResponse = response.json().ok()?;
        let content = chat_response.choices.first()?.message.content.clone();

        parse_total_response(&content).or_else(|| {
            // One retry on malformed JSON (spec §4.10: "on parse failure, allow one retry").
            parse_total_response(&extract_json(&content))
        })
    }
}

fn parse_total_response(text: &str) -> Option<TotalResponse> {
    serde_json::from_str(text).ok()
}

/// Strips a markdown code fence or surrounding prose around a JSON object,
/// tolerating chat-style models that wrap their JSON in commentary.
fn extract_json(text: &str) -> String {
    let text = text.trim();
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            return text[start..=end].to_string();
        }
    }
    text.to_string()
}

fn text_prompt(footer_text: &str, lines_sum: f64, candidates: &[TotalCandidate], page_context: &PageContext) -> String {
    let candidate_lines: String = candidates
        .iter()
        .map(|c| format!("- \"{}\" => {:.2} (heuristic score {:.2})", c.raw_text, c.amount, c.calibrated_score))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{TOTAL_EXTRACTION_PROMPT}\n\nFooter text:\n{footer_text}\n\nSum of line item totals: {lines_sum:.2}\n\nHeuristic candidates:\n{candidate_lines}\n\nPage context:\n{}",
        page_context.text
    )
}

const TOTAL_EXTRACTION_PROMPT: &str = r#"You are verifying the total amount on a Swedish invoice. Return JSON only:
{"amount": <number>, "confidence": <0.0-1.0>, "validation_passed": <bool>, "reasoning": "<short string or null>"}
"validation_passed" should be true only if the amount is consistent with the sum of line items given to you, within normal rounding tolerance."#;

impl AiProvider for OpenAiLikeClient {
    fn extract_total_text(
        &self,
        footer_text: &str,
        lines_sum: f64,
        candidates: &[TotalCandidate],
        page_context: &PageContext,
    ) -> Option<AiTotalResult> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: vec![Content::Text { r#type: "text".to_string(), text: text_prompt(footer_text, lines_sum, candidates, page_context) }],
        }];

        self.send(messages).map(|r| AiTotalResult {
            amount: r.amount,
            confidence: r.confidence,
            validation_passed: r.validation_passed,
            reasoning: r.reasoning,
        })
    }

    fn extract_total_vision(&self, image_handle: &[u8], page_context: Option<&PageContext>) -> Option<AiTotalResult> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image_handle);
        let image_url = format!("data:image/png;base64,{image_b64}");

        let mut text = TOTAL_EXTRACTION_PROMPT.to_string();
        if let Some(ctx) = page_context {
            text.push_str("\n\nPage context:\n");
            text.push_str(&ctx.text);
        }

        let messages = vec![Message {
            role: "user".to_string(),
            content: vec![
                Content::Text { r#type: "text".to_string(), text },
                Content::Image { r#type: "image_url".to_string(), image_url: ImageUrl { url: image_url } },
            ],
        }];

        self.send(messages).map(|r| AiTotalResult {
            amount: r.amount,
            confidence: r.confidence,
            validation_passed: r.validation_passed,
            reasoning: r.reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_markdown_fence() {
        let wrapped = "```json\n{\"amount\": 100.0}\n```";
        assert_eq!(extract_json(wrapped), "{\"amount\": 100.0}");
    }

    #[test]
    fn extract_json_passes_through_bare_object() {
        let bare = "{\"amount\": 100.0}";
        assert_eq!(extract_json(bare), bare);
    }

    #[test]
    fn parse_total_response_rejects_non_json() {
        assert!(parse_total_response("not json").is_none());
    }

    #[test]
    fn parse_total_response_accepts_well_formed_json() {
        let json = r#"{"amount": 1234.5, "confidence": 0.92, "validation_passed": true, "reasoning": null}"#;
        let parsed = parse_total_response(json).unwrap();
        assert_eq!(parsed.amount, 1234.5);
        assert!(parsed.validation_passed);
    }

    #[test]
    fn text_prompt_includes_candidates_and_context() {
        let candidates =
            vec![TotalCandidate { raw_text: "Att betala: 500,00".into(), amount: 500.0, calibrated_score: 0.8 }];
        let ctx = PageContext { text: "Footer | Totalt".into() };
        let prompt = text_prompt("Att betala 500,00 kr", 500.0, &candidates, &ctx);
        assert!(prompt.contains("Att betala: 500,00"));
        assert!(prompt.contains("Footer | Totalt"));
    }
}

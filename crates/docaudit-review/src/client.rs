//! HTTP client for an OpenAI-compatible multimodal review model.
//!
//! Builds one chat request per content batch: a system prompt carrying the
//! review rules and the output contract, and a user message interleaving
//! `[ID: n]`-tagged text items with inline base64 images. The response is a
//! JSON array of issue records; markdown code fences around it are
//! tolerated, and anything unparseable surfaces as an error for the engine
//! to absorb.

use crate::collaborator::ReviewCollaborator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use docaudit_core::{ContentKind, ContentUnit, Issue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Default OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";

/// Default multimodal review model.
pub const DEFAULT_MODEL: &str = "qwen-vl-max";

/// Response token cap per batch.
const MAX_TOKENS: u32 = 2000;

/// Built-in review rules used when no rules file is supplied.
const DEFAULT_REVIEW_RULES: &str = "Review the supplied clinical/laboratory report in depth for \
contradictory data, calculation errors, and logic errors.";

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a senior reviewer of CRO (contract research organization) clinical and laboratory reports. Review the supplied report content according to these rules:

{rules}

Output requirements:
Respond with a strict JSON array of objects. Each object must contain:
- "element_id": the numeric ID of the element the problem was found in. Every content part is prefixed with an [ID: n] tag; return that n.
- "category": one of "text", "table" or "image".
- "original_text": the exact text fragment containing the problem. For table problems give the table reference (e.g. "1-1"). Never copy table bodies into this field; keep it under 50 characters.
- "issue_type": one of "Critical", "Major" or "Minor".
- "description": a detailed description of the problem.
- "suggestion": how to fix the problem.

Notes:
- Ignore pure formatting problems.
- Write description and suggestion in the language of the document.
- Return the JSON array only, with no markdown fences and no commentary."#;

/// Chat-completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
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

/// Chat-completion response body.
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

/// HTTP client for the multimodal review collaborator.
#[derive(Debug, Clone)]
pub struct VisionReviewClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    rules: String,
}

impl VisionReviewClient {
    /// Client with the default endpoint, model, and built-in rules.
    #[must_use = "creates a review client"]
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            rules: DEFAULT_REVIEW_RULES.to_string(),
        }
    }

    /// Override the model id.
    #[must_use = "returns the client with the model configured"]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the chat-completions endpoint.
    #[must_use = "returns the client with the endpoint configured"]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the review rules text.
    #[must_use = "returns the client with the rules configured"]
    pub fn with_rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = rules.into();
        self
    }

    /// Load review rules from a file, keeping the built-in rules when the
    /// file cannot be read.
    #[must_use = "returns the client with the rules configured"]
    pub fn with_rules_file<P: AsRef<Path>>(self, path: P) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(rules) => self.with_rules(rules),
            Err(e) => {
                warn!(
                    "failed to read review rules from {}: {e}; using built-in rules",
                    path.as_ref().display()
                );
                self
            }
        }
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT_TEMPLATE.replace("{rules}", &self.rules)
    }

    /// Build the user-message content for one batch.
    fn batch_content(units: &[ContentUnit]) -> Vec<Content> {
        let mut content = Vec::with_capacity(units.len());
        for unit in units {
            let prefix = format!("[ID: {}] ", unit.id);
            match unit.kind {
                ContentKind::Text => content.push(Content::Text {
                    r#type: "text".to_string(),
                    text: format!("{prefix}{}", unit.payload),
                }),
                ContentKind::Table => content.push(Content::Text {
                    r#type: "text".to_string(),
                    text: format!("{prefix}Table:\n{}", unit.payload),
                }),
                ContentKind::Image => {
                    content.push(Content::Text {
                        r#type: "text".to_string(),
                        text: prefix,
                    });
                    match image_data_uri(&unit.payload) {
                        Some(url) => content.push(Content::Image {
                            r#type: "image_url".to_string(),
                            image_url: ImageUrl { url },
                        }),
                        None => warn!(
                            "could not read extracted image {}; sending its tag without pixels",
                            unit.payload
                        ),
                    }
                }
            }
        }
        content
    }
}

#[async_trait]
impl ReviewCollaborator for VisionReviewClient {
    async fn review(&self, units: &[ContentUnit]) -> Result<Vec<Issue>> {
        let start = Instant::now();

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: vec![Content::Text {
                        r#type: "text".to_string(),
                        text: self.system_prompt(),
                    }],
                },
                Message {
                    role: "user".to_string(),
                    content: Self::batch_content(units),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("failed to send request to review model")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("review model error ({status}): {error_text}");
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("failed to parse review model response")?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        let issues: Vec<Issue> = serde_json::from_str(&extract_json(content))
            .context("failed to parse issue list JSON")?;

        debug!(
            units = units.len(),
            issues = issues.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "review batch complete"
        );
        Ok(issues)
    }
}

/// Read an extracted image file as a base64 data URI.
fn image_data_uri(path: &str) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mime = match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{mime};base64,{encoded}"))
}

/// Extract the JSON payload from a model response, tolerating markdown code
/// fences and surrounding prose.
fn extract_json(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    // Prefer an array payload; fall back to a single object.
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain_array() {
        let text = r#"[{"element_id": 0, "issue_type": "Minor", "description": "d"}]"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "```json\n[{\"element_id\": 0}]\n```";
        assert_eq!(extract_json(text), "[{\"element_id\": 0}]");
    }

    #[test]
    fn test_extract_json_with_prose() {
        let text = "Here are the findings:\n[{\"element_id\": 1}]\nEnd of report.";
        assert_eq!(extract_json(text), "[{\"element_id\": 1}]");
    }

    #[test]
    fn test_extract_json_empty_array() {
        assert_eq!(extract_json("  []  "), "[]");
    }

    #[test]
    fn test_batch_content_tags_every_unit() {
        let units = vec![
            ContentUnit::text(0, "paragraph"),
            ContentUnit::table(1, "| a | b |"),
        ];
        let content = VisionReviewClient::batch_content(&units);
        assert_eq!(content.len(), 2);
        match &content[0] {
            Content::Text { text, .. } => assert_eq!(text, "[ID: 0] paragraph"),
            Content::Image { .. } => panic!("expected text content"),
        }
        match &content[1] {
            Content::Text { text, .. } => {
                assert!(text.starts_with("[ID: 1] Table:\n"));
            }
            Content::Image { .. } => panic!("expected text content"),
        }
    }

    #[test]
    fn test_missing_image_file_degrades_to_tag_only() {
        let units = vec![ContentUnit::image(2, "/nonexistent/img_0.png")];
        let content = VisionReviewClient::batch_content(&units);
        // Tag text survives; the unreadable image itself is omitted.
        assert_eq!(content.len(), 1);
        match &content[0] {
            Content::Text { text, .. } => assert_eq!(text, "[ID: 2] "),
            Content::Image { .. } => panic!("expected text content"),
        }
    }

    #[test]
    fn test_system_prompt_embeds_rules() {
        let client = VisionReviewClient::new("key".to_string()).with_rules("Check table sums.");
        let prompt = client.system_prompt();
        assert!(prompt.contains("Check table sums."));
        assert!(!prompt.contains("{rules}"));
    }

    #[test]
    fn test_issue_list_parses_from_wire_form() {
        let json = r#"[
            {"element_id": 0, "category": "text", "original_text": "0.87",
             "issue_type": "Major", "description": "d", "suggestion": "s"},
            {"element_id": "3", "issue_type": "Minor", "description": "d2"}
        ]"#;
        let issues: Vec<Issue> = serde_json::from_str(&extract_json(json)).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].element_id, 3);
    }
}

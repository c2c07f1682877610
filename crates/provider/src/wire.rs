//! `generateContent` request and response bodies.
//!
//! [`build_request`] turns a [`GenerationRequest`] into the JSON body;
//! [`extract_output`] turns a decoded response into a [`GenerationOutput`].
//! Neither performs I/O.

use domain::{
    AssetReference, Capability, GenerationOutput, GenerationRequest, ProviderError, TaskPayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Request body
// ---------------------------------------------------------------------------

/// Body of a `generateContent` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// The conversation; a single user turn for every request built here.
    pub contents: Vec<Content>,
    /// Output shaping. Omitted when no capability asks for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// Tools the model may call, such as search grounding.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Content {
    /// `user` on requests, `model` on responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// The turn's parts, in order.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One piece of a turn. Exactly one field is set in practice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 bytes carried in the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// A file referenced by URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

/// Media embedded in a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// Media type of the decoded bytes, e.g. `image/png`.
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

/// Media referenced by a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// Media type, when the provider reports one.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Where the file can be fetched.
    pub file_uri: String,
}

/// Output shaping requested from the model.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// `application/json` when structured output is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    /// JSON schema the structured output must follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    /// Output modalities, e.g. `["TEXT", "IMAGE"]` for image generation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.response_mime_type.is_none()
            && self.response_schema.is_none()
            && self.response_modalities.is_empty()
    }
}

/// A tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Enables search grounding.
    pub google_search: GoogleSearch,
}

/// Serialises as `{}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoogleSearch {}

// ---------------------------------------------------------------------------
// Response body
// ---------------------------------------------------------------------------

/// Decoded body of a successful `generateContent` call.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate answers; only the first is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Present when the prompt itself was rejected.
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

/// One candidate answer.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// The answer. Missing when generation was stopped early.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped, e.g. `STOP` or `SAFETY`.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Feedback about the prompt.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Why the prompt was blocked, if it was.
    #[serde(default)]
    pub block_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Builds the request body.
///
/// Capabilities present on the request become request fields. Everything the
/// API has no field for (negative constraint, dimensions, style, and the JSON
/// instruction when structured output is not requested natively) is folded
/// into the prompt text.
pub fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
    let caps = &request.capabilities;
    let mut config = GenerationConfig::default();

    if caps.contains(Capability::StructuredOutput) {
        config.response_mime_type = Some("application/json".to_string());
        if let TaskPayload::Structured {
            schema: Some(schema),
            ..
        } = &request.payload
        {
            config.response_schema = Some(schema.clone());
        }
    }
    if caps.contains(Capability::ImageOutput) {
        config.response_modalities = vec!["TEXT".to_string(), "IMAGE".to_string()];
    }

    let tools = if caps.contains(Capability::SearchGrounding) {
        vec![Tool {
            google_search: GoogleSearch {},
        }]
    } else {
        Vec::new()
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(compose_prompt(request)),
                ..Part::default()
            }],
        }],
        generation_config: (!config.is_empty()).then_some(config),
        tools,
    }
}

fn compose_prompt(request: &GenerationRequest) -> String {
    let mut sections = vec![request.payload.prompt().trim().to_string()];

    match &request.payload {
        TaskPayload::Image {
            dimensions, style, ..
        } => {
            if let Some(d) = dimensions {
                sections.push(format!(
                    "Aspect ratio: {} ({}x{} pixels).",
                    d.aspect_ratio(),
                    d.width,
                    d.height
                ));
            }
            if let Some(style) = style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                sections.push(format!("Style: {style}."));
            }
        }
        TaskPayload::Structured { schema, .. }
            if !request.capabilities.contains(Capability::StructuredOutput) =>
        {
            match schema {
                Some(schema) => sections.push(format!(
                    "Respond only with a JSON document matching this JSON schema: {schema}"
                )),
                None => sections.push("Respond only with a JSON document.".to_string()),
            }
        }
        _ => {}
    }

    if let Some(negative) = &request.negative_constraint {
        sections.push(format!("Avoid: {}.", negative.trim()));
    }

    sections.join("\n\n")
}

/// Interprets a successful response for the given payload kind.
///
/// An empty or blocked response is a [`ProviderError::Validation`]: another
/// credential would get the same answer.
pub fn extract_output(
    payload: &TaskPayload,
    response: GenerateContentResponse,
) -> Result<GenerationOutput, ProviderError> {
    let blocked = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone());
    let mut finish_reason = None;
    let mut parts = Vec::new();
    for candidate in response.candidates {
        finish_reason = finish_reason.or(candidate.finish_reason);
        if let Some(content) = candidate.content {
            if !content.parts.is_empty() {
                parts = content.parts;
                break;
            }
        }
    }

    if parts.is_empty() {
        let message = match (blocked, finish_reason) {
            (Some(reason), _) => format!("prompt blocked by provider: {reason}"),
            (None, Some(reason)) => format!("provider returned no content (finish reason: {reason})"),
            (None, None) => "provider returned no candidates".to_string(),
        };
        return Err(ProviderError::Validation { message });
    }

    match payload {
        TaskPayload::Image { .. } => image_output(parts),
        TaskPayload::Structured { .. } => json_output(&joined_text(&parts)),
        TaskPayload::Text { .. } => {
            let text = joined_text(&parts);
            if text.is_empty() {
                Err(ProviderError::Validation {
                    message: "response contained no text".to_string(),
                })
            } else {
                Ok(GenerationOutput::Text(text))
            }
        }
    }
}

fn joined_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .concat()
        .trim()
        .to_string()
}

fn image_output(parts: Vec<Part>) -> Result<GenerationOutput, ProviderError> {
    for part in parts {
        if let Some(inline) = part.inline_data {
            return Ok(GenerationOutput::Asset(AssetReference::embedded(
                &inline.mime_type,
                &inline.data,
            )));
        }
        if let Some(file) = part.file_data {
            return Ok(GenerationOutput::Asset(AssetReference::Url {
                url: file.file_uri,
            }));
        }
    }
    Err(ProviderError::Validation {
        message: "response contained no image".to_string(),
    })
}

fn json_output(text: &str) -> Result<GenerationOutput, ProviderError> {
    let unfenced = strip_code_fence(text);
    serde_json::from_str(unfenced)
        .map(GenerationOutput::Json)
        .map_err(|e| ProviderError::Validation {
            message: format!("response was not valid JSON: {e}"),
        })
}

/// Removes a surrounding Markdown code fence (```` ```json ... ``` ````).
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CapabilitySet, Dimensions, GenerationTask, ModelId, RequestMode};
    use serde_json::json;

    fn model() -> ModelId {
        ModelId::new("gemini-2.0-flash").unwrap()
    }

    fn structured_task() -> GenerationTask {
        GenerationTask::new(TaskPayload::Structured {
            prompt: "List three titles".into(),
            schema: Some(json!({ "type": "ARRAY", "items": { "type": "STRING" } })),
        })
        .unwrap()
        .with_capability(Capability::StructuredOutput)
        .with_capability(Capability::SearchGrounding)
    }

    #[test]
    fn test_enhanced_request_carries_capability_fields() {
        let request = structured_task().to_request(&model(), RequestMode::Enhanced);
        let body = serde_json::to_value(build_request(&request)).unwrap();

        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert_eq!(body["tools"], json!([{ "googleSearch": {} }]));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "List three titles");
    }

    #[test]
    fn test_baseline_request_folds_json_instruction_into_prompt() {
        let request = structured_task().to_request(&model(), RequestMode::Baseline);
        let body = serde_json::to_value(build_request(&request)).unwrap();

        assert!(body.get("generationConfig").is_none());
        assert!(body.get("tools").is_none());
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("List three titles\n\n"));
        assert!(text.contains("Respond only with a JSON document matching this JSON schema"));
    }

    #[test]
    fn test_image_request_folds_dimensions_style_and_negative() {
        let task = GenerationTask::new(TaskPayload::Image {
            prompt: "A lighthouse at dusk".into(),
            dimensions: Some(Dimensions {
                width: 1280,
                height: 720,
            }),
            style: Some("watercolour".into()),
        })
        .unwrap()
        .with_negative_constraint("text overlays");
        let request = task.to_request(&model(), RequestMode::Baseline);
        let built = build_request(&request);

        let config = built.generation_config.as_ref().unwrap();
        assert_eq!(config.response_modalities, vec!["TEXT", "IMAGE"]);
        let text = built.contents[0].parts[0].text.as_deref().unwrap();
        assert_eq!(
            text,
            "A lighthouse at dusk\n\nAspect ratio: 16:9 (1280x720 pixels).\n\nStyle: watercolour.\n\nAvoid: text overlays."
        );
    }

    #[test]
    fn test_plain_text_request_has_no_config() {
        let request = GenerationRequest {
            model: model(),
            payload: TaskPayload::Text {
                prompt: "Hello".into(),
            },
            negative_constraint: None,
            capabilities: CapabilitySet::empty(),
            mode: RequestMode::Baseline,
        };
        let body = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({ "contents": [ { "role": "user", "parts": [ { "text": "Hello" } ] } ] })
        );
    }

    fn response(value: Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_parts_are_joined() {
        let out = extract_output(
            &TaskPayload::Text { prompt: "x".into() },
            response(json!({
                "candidates": [ { "content": { "parts": [ { "text": "Hello, " }, { "text": "world" } ] } } ]
            })),
        )
        .unwrap();
        assert_eq!(out, GenerationOutput::Text("Hello, world".into()));
    }

    #[test]
    fn test_structured_output_parses_fenced_json() {
        let out = extract_output(
            &TaskPayload::Structured {
                prompt: "x".into(),
                schema: None,
            },
            response(json!({
                "candidates": [ { "content": { "parts": [ { "text": "```json\n{\"title\": \"Dusk\"}\n```" } ] } } ]
            })),
        )
        .unwrap();
        assert_eq!(out, GenerationOutput::Json(json!({ "title": "Dusk" })));
    }

    #[test]
    fn test_structured_output_rejects_prose() {
        let err = extract_output(
            &TaskPayload::Structured {
                prompt: "x".into(),
                schema: None,
            },
            response(json!({
                "candidates": [ { "content": { "parts": [ { "text": "Sure! Here you go." } ] } } ]
            })),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[test]
    fn test_image_inline_data_becomes_data_uri() {
        let payload = TaskPayload::Image {
            prompt: "x".into(),
            dimensions: None,
            style: None,
        };
        let out = extract_output(
            &payload,
            response(json!({
                "candidates": [ { "content": { "parts": [
                    { "text": "Here is your image" },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
                ] } } ]
            })),
        )
        .unwrap();
        assert_eq!(
            out,
            GenerationOutput::Asset(AssetReference::Embedded {
                data_uri: "data:image/png;base64,iVBORw0KGgo=".into()
            })
        );
    }

    #[test]
    fn test_image_file_data_becomes_url() {
        let payload = TaskPayload::Image {
            prompt: "x".into(),
            dimensions: None,
            style: None,
        };
        let out = extract_output(
            &payload,
            response(json!({
                "candidates": [ { "content": { "parts": [
                    { "fileData": { "mimeType": "image/png", "fileUri": "https://files.example.com/a.png" } }
                ] } } ]
            })),
        )
        .unwrap();
        assert_eq!(
            out.as_asset().map(AssetReference::as_str),
            Some("https://files.example.com/a.png")
        );
    }

    #[test]
    fn test_blocked_prompt_is_validation() {
        let err = extract_output(
            &TaskPayload::Text { prompt: "x".into() },
            response(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Validation {
                message: "prompt blocked by provider: SAFETY".into()
            }
        );
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  ```json\n{}\n```  "), "{}");
    }
}

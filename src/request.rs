//! Chat completion request payloads.

use crate::error::{Error, Result};
use crate::message::Message;
use crate::options::ChatOptions;
use serde::Serialize;

/// Envelope keys that options may never override.
pub const RESERVED_KEYS: &[&str] = &[
    "stream",
    "model",
    "models",
    "route",
    "messages",
    "stream_options",
];

/// Routing marker sent alongside a `models` list.
const FALLBACK_ROUTE: &str = "fallback";

/// Which model(s) a request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTarget {
    Single(String),
    /// Ordered candidates; later entries are tried if earlier ones fail.
    Fallback(Vec<String>),
}

impl ModelTarget {
    /// The model that is sent when fallback is unavailable.
    #[must_use]
    pub fn primary(&self) -> &str {
        match self {
            Self::Single(model) => model,
            Self::Fallback(models) => models.first().map_or("", String::as_str),
        }
    }
}

impl From<&str> for ModelTarget {
    fn from(model: &str) -> Self {
        Self::Single(model.to_string())
    }
}

impl From<String> for ModelTarget {
    fn from(model: String) -> Self {
        Self::Single(model)
    }
}

impl From<Vec<String>> for ModelTarget {
    fn from(models: Vec<String>) -> Self {
        Self::Fallback(models)
    }
}

impl From<&[&str]> for ModelTarget {
    fn from(models: &[&str]) -> Self {
        Self::Fallback(models.iter().map(|m| (*m).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ModelTarget {
    fn from(models: [&str; N]) -> Self {
        Self::from(models.as_slice())
    }
}

/// Top-level request to OpenAI-compatible APIs, before options are merged in.
#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    models: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<&'static str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Build the JSON payload for a chat completion request.
///
/// `fallback_capable` is the endpoint's capability; `options.fallback` overrides it.
pub fn build_body(
    target: &ModelTarget,
    messages: &[Message],
    options: Option<&ChatOptions>,
    streaming: bool,
    fallback_capable: bool,
) -> Result<serde_json::Value> {
    let fallback_capable = options
        .and_then(|o| o.fallback)
        .unwrap_or(fallback_capable);

    let (model, models, route) = match target {
        ModelTarget::Fallback(models) if fallback_capable => {
            (None, Some(models.as_slice()), Some(FALLBACK_ROUTE))
        }
        ModelTarget::Fallback(models) => {
            if models.len() > 1 {
                tracing::debug!(
                    candidates = models.len(),
                    "Endpoint has no fallback support, sending first candidate only"
                );
            }
            (Some(target.primary()), None, None)
        }
        ModelTarget::Single(model) => (Some(model.as_str()), None, None),
    };

    let body = RequestBody {
        stream: streaming,
        model,
        models,
        route,
        messages,
        stream_options: streaming.then_some(StreamOptions {
            include_usage: true,
        }),
    };

    let mut value = serde_json::to_value(&body).map_err(Error::Encoding)?;

    if let Some(options) = options {
        let overlay = serde_json::to_value(options).map_err(Error::Encoding)?;
        if let (Some(payload), serde_json::Value::Object(fields)) = (value.as_object_mut(), overlay)
        {
            for (key, field) in fields {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Ignoring option that collides with a reserved request field");
                    continue;
                }
                payload.insert(key, field);
            }
        }
    }

    Ok(value)
}

/// Serialize the payload to bytes for the transport.
pub fn encode_body(
    target: &ModelTarget,
    messages: &[Message],
    options: Option<&ChatOptions>,
    streaming: bool,
    fallback_capable: bool,
) -> Result<Vec<u8>> {
    let value = build_body(target, messages, options, streaming, fallback_capable)?;
    serde_json::to_vec(&value).map_err(Error::Encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{FunctionDefinition, Tool, ToolChoice};
    use serde_json::json;

    fn messages() -> Vec<Message> {
        vec![
            Message::system("You are a helpful assistant."),
            Message::user("What is the capital of Indonesia?"),
        ]
    }

    #[test]
    fn test_single_model_request() {
        let body = build_body(&"gpt-4o".into(), &messages(), None, false, false).unwrap();

        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is the capital of Indonesia?");
        assert!(body.get("models").is_none());
        assert!(body.get("route").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_streaming_includes_usage() {
        let body = build_body(&"gpt-4o".into(), &messages(), None, true, false).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"], json!({"include_usage": true}));
    }

    #[test]
    fn test_fallback_capable_sends_models() {
        let target = ModelTarget::from(["m1", "m2"]);
        let body = build_body(&target, &messages(), None, false, true).unwrap();

        assert_eq!(body["models"], json!(["m1", "m2"]));
        assert_eq!(body["route"], "fallback");
        assert!(body.get("model").is_none());
    }

    #[test]
    fn test_fallback_incapable_collapses() {
        let target = ModelTarget::from(["m1", "m2"]);
        let body = build_body(&target, &messages(), None, true, false).unwrap();

        assert_eq!(body["model"], "m1");
        assert!(body.get("models").is_none());
        assert!(body.get("route").is_none());
    }

    #[test]
    fn test_empty_candidate_list() {
        let target = ModelTarget::Fallback(vec![]);
        let body = build_body(&target, &messages(), None, false, false).unwrap();
        assert_eq!(body["model"], "");
    }

    #[test]
    fn test_option_override_of_router() {
        let target = ModelTarget::from(["m1", "m2"]);

        let forced_on = ChatOptions::default().fallback(true);
        let body = build_body(&target, &messages(), Some(&forced_on), false, false).unwrap();
        assert_eq!(body["models"], json!(["m1", "m2"]));

        let forced_off = ChatOptions::default().fallback(false);
        let body = build_body(&target, &messages(), Some(&forced_off), false, true).unwrap();
        assert_eq!(body["model"], "m1");
    }

    #[test]
    fn test_options_merged_flat() {
        let options = ChatOptions::default()
            .temperature(0.7)
            .tools(vec![Tool::function(FunctionDefinition::new("recommend_book"))])
            .tool_choice(ToolChoice::Auto);

        let body = build_body(&"gpt-4o".into(), &messages(), Some(&options), false, false).unwrap();

        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["tools"][0]["function"]["name"], "recommend_book");
        assert_eq!(body["tool_choice"], "auto");
        assert!(body.get("options").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_reserved_keys_not_overridden() {
        let options = ChatOptions::default()
            .extra("model", "sneaky")
            .extra("stream", true)
            .extra("messages", json!([]))
            .extra("top_k", 40);

        let body = build_body(&"gpt-4o".into(), &messages(), Some(&options), false, false).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["top_k"], 40);
    }

    #[test]
    fn test_no_nulls_on_wire() {
        let bytes = encode_body(
            &"gpt-4o".into(),
            &messages(),
            Some(&ChatOptions::default()),
            true,
            false,
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("null"));
    }
}

//! Request body encoding for the messages endpoint.

use serde_json::{Value, json};

use crate::types::{ChatMessage, ChatOptions, ContentPart, Role, Tool, ToolChoice};
use crate::utils::media::{ResolvedSource, is_remote_url, resolve_inline_source};

/// Generated-token ceiling applied when the caller does not set one.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Builds the JSON body for one call.
///
/// Pure translation: remote media sources must already have been fetched
/// and replaced with base64 payloads (`ChatClient` does this before
/// encoding); any URL still present encodes as an empty source.
pub fn build_request_body(
    model: &str,
    messages: &[ChatMessage],
    options: Option<&ChatOptions>,
    stream: bool,
) -> Value {
    let max_tokens = options
        .and_then(|options| options.max_tokens)
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "stream": stream,
    });

    let system = encode_system_entries(messages);
    if !system.is_empty() {
        body["system"] = Value::Array(system);
    }

    let turns: Vec<Value> = messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(encode_turn)
        .collect();
    body["messages"] = Value::Array(turns);

    if let Some(options) = options {
        encode_options(options, &mut body);
    }

    body
}

/// System messages flatten into one wire entry per text part; parts that
/// cannot be represented as system text are dropped.
fn encode_system_entries(messages: &[ChatMessage]) -> Vec<Value> {
    let mut entries = Vec::new();
    for message in messages.iter().filter(|message| message.role == Role::System) {
        for part in &message.content {
            let ContentPart::Text(text) = part else {
                continue;
            };
            let mut entry = json!({ "type": "text", "text": text });
            if let Some(cache_control) = message.cache_control {
                entry["cache_control"] = json!({ "type": cache_control.as_str() });
            }
            entries.push(entry);
        }
    }
    entries
}

fn encode_turn(message: &ChatMessage) -> Value {
    let parts: Vec<Value> = message.content.iter().map(encode_part).collect();
    json!({
        "role": message.role.as_str(),
        "content": parts,
    })
}

fn encode_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({ "type": "text", "text": text }),
        ContentPart::Image(source) => json!({
            "type": "image",
            "source": encode_source(source),
        }),
        ContentPart::Document(source) => json!({
            "type": "document",
            "source": encode_source(source),
        }),
    }
}

fn encode_source(raw: &str) -> Value {
    let resolved = if is_remote_url(raw) {
        // A URL surviving to this point was unresolvable.
        ResolvedSource::empty()
    } else {
        resolve_inline_source(raw)
    };
    json!({
        "type": "base64",
        "media_type": resolved.media_type,
        "data": resolved.data,
    })
}

fn encode_options(options: &ChatOptions, body: &mut Value) {
    if let Some(stop_sequences) = &options.stop_sequences {
        body["stop_sequences"] = json!(stop_sequences);
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_k) = options.top_k {
        body["top_k"] = json!(top_k);
    }
    if let Some(top_p) = options.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(tools) = &options.tools {
        body["tools"] = Value::Array(tools.iter().map(encode_tool).collect());
    }
    if let Some(tool_choice) = &options.tool_choice {
        body["tool_choice"] = encode_tool_choice(tool_choice);
    }
    if let Some(user_id) = &options.user_id {
        body["metadata"] = json!({ "user_id": user_id });
    }
}

fn encode_tool(tool: &Tool) -> Value {
    let mut encoded = json!({
        "name": tool.name,
        "input_schema": tool.parameters,
    });
    if let Some(description) = &tool.description {
        encoded["description"] = json!(description);
    }
    encoded
}

fn encode_tool_choice(tool_choice: &ToolChoice) -> Value {
    match tool_choice {
        ToolChoice::Any => json!({ "type": "any" }),
        ToolChoice::Auto => json!({ "type": "auto" }),
        ToolChoice::Tool { name } => json!({ "type": "tool", "name": name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheControl;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are a librarian."),
            ChatMessage::system("Answer tersely.").with_cache_control(CacheControl::Ephemeral),
            ChatMessage::user("Recommend a novel."),
            ChatMessage::assistant("Try Solaris."),
        ]
    }

    #[test]
    fn system_messages_lift_into_the_system_array() {
        let body = build_request_body("claude-sonnet-4-5", &conversation(), None, false);

        let system = body["system"].as_array().expect("system array");
        assert_eq!(system.len(), 2);
        assert_eq!(system[0], json!({ "type": "text", "text": "You are a librarian." }));
        assert_eq!(
            system[1],
            json!({
                "type": "text",
                "text": "Answer tersely.",
                "cache_control": { "type": "ephemeral" },
            })
        );

        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        for message in messages {
            assert!(message.get("cache_control").is_none());
        }
    }

    #[test]
    fn the_system_key_is_absent_without_system_messages() {
        let messages = vec![ChatMessage::user("Hi")];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn non_text_system_parts_are_dropped() {
        let messages = vec![ChatMessage::new(
            Role::System,
            vec![
                ContentPart::Image("aGVsbG8=".to_string()),
                ContentPart::Text("Stay factual.".to_string()),
            ],
        )];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);

        let system = body["system"].as_array().expect("system array");
        assert_eq!(system.len(), 1);
        assert_eq!(system[0]["text"], "Stay factual.");
    }

    #[test]
    fn max_tokens_defaults_and_stream_flag_passes_through() {
        let messages = vec![ChatMessage::user("Hi")];

        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);
        assert_eq!(body["max_tokens"], json!(DEFAULT_MAX_TOKENS));
        assert_eq!(body["stream"], json!(false));

        let options = ChatOptions {
            max_tokens: Some(512),
            ..ChatOptions::default()
        };
        let body = build_request_body("claude-sonnet-4-5", &messages, Some(&options), true);
        assert_eq!(body["max_tokens"], json!(512));
        assert_eq!(body["stream"], json!(true));
    }

    #[test]
    fn unset_options_stay_off_the_wire() {
        let messages = vec![ChatMessage::user("Hi")];
        let options = ChatOptions {
            temperature: Some(0.2),
            ..ChatOptions::default()
        };
        let body = build_request_body("claude-sonnet-4-5", &messages, Some(&options), false);

        assert_eq!(body["temperature"], json!(0.2));
        assert!(body.get("top_k").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("stop_sequences").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("metadata").is_none());
    }

    #[test]
    fn options_encode_under_their_wire_keys() {
        let messages = vec![ChatMessage::user("Hi")];
        let options = ChatOptions {
            stop_sequences: Some(vec!["END".to_string()]),
            temperature: Some(0.7),
            top_k: Some(40),
            top_p: Some(0.9),
            user_id: Some("user-123".to_string()),
            ..ChatOptions::default()
        };
        let body = build_request_body("claude-sonnet-4-5", &messages, Some(&options), false);

        assert_eq!(body["stop_sequences"], json!(["END"]));
        assert_eq!(body["temperature"], json!(0.7));
        assert_eq!(body["top_k"], json!(40));
        assert_eq!(body["top_p"], json!(0.9));
        assert_eq!(body["metadata"], json!({ "user_id": "user-123" }));
    }

    #[test]
    fn tools_encode_with_input_schema() {
        let messages = vec![ChatMessage::user("Weather in Paris?")];
        let options = ChatOptions {
            tools: Some(vec![
                Tool {
                    name: "get_weather".to_string(),
                    description: Some("Current weather for a location".to_string()),
                    parameters: json!({
                        "type": "object",
                        "properties": { "location": { "type": "string" } },
                        "required": ["location"],
                    }),
                },
                Tool {
                    name: "get_time".to_string(),
                    description: None,
                    parameters: json!({ "type": "object" }),
                },
            ]),
            tool_choice: Some(ToolChoice::Tool {
                name: "get_weather".to_string(),
            }),
            ..ChatOptions::default()
        };
        let body = build_request_body("claude-sonnet-4-5", &messages, Some(&options), false);

        let tools = body["tools"].as_array().expect("tools array");
        assert_eq!(tools[0]["name"], "get_weather");
        assert_eq!(tools[0]["input_schema"]["required"], json!(["location"]));
        assert_eq!(tools[0]["description"], "Current weather for a location");
        assert!(tools[1].get("description").is_none());
        assert_eq!(
            body["tool_choice"],
            json!({ "type": "tool", "name": "get_weather" })
        );
    }

    #[test]
    fn tool_choice_modes_encode_their_tags() {
        assert_eq!(encode_tool_choice(&ToolChoice::Any), json!({ "type": "any" }));
        assert_eq!(encode_tool_choice(&ToolChoice::Auto), json!({ "type": "auto" }));
    }

    #[test]
    fn base64_image_parts_encode_with_sniffed_media_type() {
        let data = BASE64.encode([0xFF, 0xD8, 0xFF, 0xE0]);
        let messages = vec![ChatMessage::new(
            Role::User,
            vec![ContentPart::Image(data.clone())],
        )];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);

        let source = &body["messages"][0]["content"][0]["source"];
        assert_eq!(source["type"], "base64");
        assert_eq!(source["media_type"], "image/jpeg");
        assert_eq!(source["data"], json!(data));
    }

    #[test]
    fn document_parts_sniff_pdf() {
        let data = BASE64.encode(b"%PDF-1.7 fixture");
        let messages = vec![ChatMessage::new(
            Role::User,
            vec![ContentPart::Document(data.clone())],
        )];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);

        let part = &body["messages"][0]["content"][0];
        assert_eq!(part["type"], "document");
        assert_eq!(part["source"]["media_type"], "application/pdf");
    }

    #[test]
    fn undecodable_sources_pass_through_untyped() {
        let messages = vec![ChatMessage::new(
            Role::User,
            vec![ContentPart::Image("not-base64!!".to_string())],
        )];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);

        let source = &body["messages"][0]["content"][0]["source"];
        assert_eq!(source["media_type"], "");
        assert_eq!(source["data"], "not-base64!!");
    }

    #[test]
    fn unresolved_remote_sources_encode_empty() {
        let messages = vec![ChatMessage::new(
            Role::User,
            vec![ContentPart::Image("https://example.com/cat.png".to_string())],
        )];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);

        let source = &body["messages"][0]["content"][0]["source"];
        assert_eq!(source["media_type"], "");
        assert_eq!(source["data"], "");
    }

    #[test]
    fn mixed_part_turns_keep_their_order() {
        let data = BASE64.encode([0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        let messages = vec![ChatMessage::new(
            Role::User,
            vec![
                ContentPart::Text("What is in this image?".to_string()),
                ContentPart::Image(data),
            ],
        )];
        let body = build_request_body("claude-sonnet-4-5", &messages, None, false);

        let content = body["messages"][0]["content"].as_array().expect("content");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["media_type"], "image/png");
    }
}

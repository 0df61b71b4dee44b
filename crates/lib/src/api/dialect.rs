//! Per-dialect endpoints, request payloads and response decoding.
//!
//! Each dialect decodes into its own wire type; nothing here sniffs a body for whichever
//! field happens to be present.

use super::ApiError;
use crate::config::Dialect;
use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};

pub(crate) const MODELS_PATH: &str = "/models";
pub(crate) const LOGIN_PATH: &str = "/login";

/// History endpoint, if the dialect has one.
pub(crate) fn history_path(dialect: Dialect) -> Option<&'static str> {
    match dialect {
        Dialect::Openai => None,
        Dialect::Chats => Some("/chats"),
    }
}

pub(crate) fn send_path(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Openai => "/chat/completions",
        Dialect::Chats => "/message",
    }
}

/// Build the send payload. OpenAI gets the whole conversation plus the new user turn;
/// the chats dialect only the new text (the server keeps its own history).
pub(crate) fn send_body<'a>(
    dialect: Dialect,
    model: &'a str,
    conversation: &'a [Message],
    text: &'a str,
) -> SendBody<'a> {
    match dialect {
        Dialect::Openai => {
            let messages = conversation
                .iter()
                .map(|m| CompletionMessage {
                    role: m.role.as_str(),
                    content: &m.text,
                })
                .chain(std::iter::once(CompletionMessage {
                    role: "user",
                    content: text,
                }))
                .collect();
            SendBody::Completion(CompletionRequest { model, messages })
        }
        Dialect::Chats => SendBody::Content(ContentRequest { content: text }),
    }
}

/// Decode a send reply into zero or more assistant messages.
pub(crate) fn decode_reply(dialect: Dialect, body: &str) -> Result<Vec<Message>, ApiError> {
    match dialect {
        Dialect::Openai => {
            let data: CompletionResponse = parse(body)?;
            let first = data
                .choices
                .and_then(|c| c.into_iter().next())
                .ok_or_else(|| ApiError::Format("no choices in completion response".into()))?;
            let content = first
                .message
                .and_then(|m| m.content)
                .or_else(|| first.delta.and_then(|d| d.content))
                .ok_or_else(|| {
                    ApiError::Format("choices[0] has neither message.content nor delta.content".into())
                })?;
            Ok(vec![Message::assistant(content)])
        }
        Dialect::Chats => {
            let data: MessagesResponse = parse(body)?;
            let messages = data
                .messages
                .ok_or_else(|| ApiError::Format("no messages in reply".into()))?;
            Ok(messages
                .into_iter()
                .filter(|m| !m.is_user())
                .map(|m| Message {
                    role: Role::Assistant,
                    ..m
                })
                .collect())
        }
    }
}

/// Decode a history body. A missing `messages` field is an empty history, not an error.
pub(crate) fn decode_history(body: &str) -> Result<Vec<Message>, ApiError> {
    let data: MessagesResponse = parse(body)?;
    Ok(data.messages.unwrap_or_default())
}

/// First model's identifier: `id` when present, else `name`. `None` for an empty list.
pub(crate) fn decode_first_model(body: &str) -> Result<Option<String>, ApiError> {
    let data: ModelsResponse = parse(body)?;
    let models = match data {
        ModelsResponse::Data { data } => data,
        ModelsResponse::Models { models } => models,
        ModelsResponse::Bare(list) => list,
    };
    Ok(models.into_iter().next().and_then(|m| {
        m.id.filter(|s| !s.trim().is_empty())
            .or_else(|| m.name.filter(|s| !s.trim().is_empty()))
    }))
}

pub(crate) fn login_body<'a>(username: &'a str, password: &'a str) -> LoginRequest<'a> {
    LoginRequest { username, password }
}

pub(crate) fn decode_login(body: &str) -> Result<String, ApiError> {
    let data: LoginResponse = parse(body)?;
    data.token
        .or(data.access_token)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Format("no token in login response".into()))
}

fn parse<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Format(e.to_string()))
}

// --- Models ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelsResponse {
    Data { data: Vec<ModelObject> },
    Models { models: Vec<ModelObject> },
    Bare(Vec<ModelObject>),
}

#[derive(Debug, Deserialize)]
struct ModelObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Request body for the send endpoint, one shape per dialect.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum SendBody<'a> {
    Completion(CompletionRequest<'a>),
    Content(ContentRequest<'a>),
}

// --- Chats dialect ---

#[derive(Debug, Serialize)]
pub(crate) struct ContentRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Option<Vec<Message>>,
}

// --- OpenAI dialect ---

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<CompletionChoice>>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionContent>,
    delta: Option<CompletionContent>,
}

#[derive(Debug, Deserialize)]
struct CompletionContent {
    content: Option<String>,
}

// --- Login ---

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_model_prefers_id() {
        let body = r#"{"data":[{"id":"gpt-x","name":"GPT X"},{"id":"other"}]}"#;
        assert_eq!(decode_first_model(body).unwrap().as_deref(), Some("gpt-x"));
    }

    #[test]
    fn first_model_falls_back_to_name() {
        let body = r#"{"models":[{"name":"llama3"}]}"#;
        assert_eq!(decode_first_model(body).unwrap().as_deref(), Some("llama3"));
        let body = r#"[{"name":"bare"}]"#;
        assert_eq!(decode_first_model(body).unwrap().as_deref(), Some("bare"));
    }

    #[test]
    fn first_model_empty_list_is_none() {
        assert_eq!(decode_first_model(r#"{"data":[]}"#).unwrap(), None);
        assert_eq!(decode_first_model("[]").unwrap(), None);
    }

    #[test]
    fn models_body_without_a_list_is_format_error() {
        assert!(matches!(
            decode_first_model(r#"{"object":"list"}"#),
            Err(ApiError::Format(_))
        ));
    }

    #[test]
    fn history_missing_field_is_empty() {
        assert!(decode_history("{}").unwrap().is_empty());
    }

    #[test]
    fn history_is_verbatim() {
        let out = decode_history(r#"{"messages":[{"id":"1","role":"user","text":"hi"}]}"#).unwrap();
        assert_eq!(out, vec![Message::user("hi").with_id("1")]);
    }

    #[test]
    fn history_accepts_numeric_ids() {
        let out = decode_history(r#"{"messages":[{"id":1,"role":"user","text":"hi"},{"id":"b","role":"assistant","text":"yo"}]}"#).unwrap();
        assert_eq!(out, vec![Message::user("hi").with_id("1"), Message::assistant("yo").with_id("b")]);
    }

    #[test]
    fn history_not_an_object_is_format_error() {
        assert!(matches!(decode_history("[1,2]"), Err(ApiError::Format(_))));
    }

    #[test]
    fn completion_reply_message_content() {
        let out = decode_reply(
            Dialect::Openai,
            r#"{"choices":[{"message":{"content":"hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::Assistant);
        assert_eq!(out[0].text, "hello");
    }

    #[test]
    fn completion_reply_falls_back_to_delta() {
        let out = decode_reply(
            Dialect::Openai,
            r#"{"choices":[{"delta":{"content":"partial"}}]}"#,
        )
        .unwrap();
        assert_eq!(out[0].text, "partial");
    }

    #[test]
    fn completion_reply_without_content_is_format_error() {
        assert!(matches!(
            decode_reply(Dialect::Openai, r#"{"choices":[]}"#),
            Err(ApiError::Format(_))
        ));
        assert!(matches!(
            decode_reply(Dialect::Openai, r#"{"messages":[{"role":"assistant","text":"x"}]}"#),
            Err(ApiError::Format(_))
        ));
    }

    #[test]
    fn chats_reply_drops_user_echo() {
        let out = decode_reply(
            Dialect::Chats,
            r#"{"messages":[{"id":"1","role":"user","text":"hi"},{"id":"2","role":"bot","text":"hello"},{"id":"3","role":"system","text":"note"},{"id":"4","role":"assistant","text":"more"}]}"#,
        )
        .unwrap();
        let texts: Vec<_> = out.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "note", "more"]);
        assert!(out.iter().all(|m| m.role == Role::Assistant));
    }

    #[test]
    fn chats_reply_without_messages_is_format_error() {
        assert!(matches!(
            decode_reply(Dialect::Chats, r#"{"choices":[{"message":{"content":"x"}}]}"#),
            Err(ApiError::Format(_))
        ));
    }

    #[test]
    fn openai_payload_appends_new_user_turn() {
        let conversation = vec![Message::user("hi").with_id("1"), Message::assistant("hey").with_id("2")];
        let body = serde_json::to_value(send_body(Dialect::Openai, "m1", &conversation, "how are you")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "m1",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hey"},
                    {"role": "user", "content": "how are you"}
                ]
            })
        );
    }

    #[test]
    fn chats_payload_is_content_only() {
        let conversation = vec![Message::user("old")];
        let body = serde_json::to_value(send_body(Dialect::Chats, "m1", &conversation, "new")).unwrap();
        assert_eq!(body, serde_json::json!({"content": "new"}));
    }

    #[test]
    fn login_token_or_access_token() {
        assert_eq!(decode_login(r#"{"token":"t1"}"#).unwrap(), "t1");
        assert_eq!(decode_login(r#"{"accessToken":"t2"}"#).unwrap(), "t2");
        assert!(decode_login(r#"{"token":""}"#).is_err());
    }
}

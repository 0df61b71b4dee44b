//! Conversation messages.
//!
//! A conversation is an append-only `Vec<Message>`; ids are assigned by the session when
//! a message is appended without one.

use serde::{Deserialize, Deserializer, Serialize};

/// Who wrote a message. Servers may use other role names for their replies (e.g. "bot" or
/// "system"); anything that is not "user" is read as the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Assistant,
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            _ => Role::Assistant,
        }
    }
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within a session. Empty until the session assigns one (replies decoded from the
    /// server without an id).
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    pub role: Role,
    /// Message body. Servers that call it `content` are accepted too.
    #[serde(alias = "content", default)]
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Server ids may be JSON numbers; they are kept as their decimal text.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(s)) => s,
        Some(Id::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

/// Time-derived message ids: `<unix millis>-<sequence>`. The sequence never repeats within
/// one generator, so ids stay unique even when several messages share a millisecond.
#[derive(Debug, Default)]
pub struct MessageIds {
    seq: u64,
}

impl MessageIds {
    pub fn next(&mut self) -> String {
        let id = format!("{}-{}", chrono::Utc::now().timestamp_millis(), self.seq);
        self.seq += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_read_as_assistant() {
        let m: Message = serde_json::from_str(r#"{"id":"7","role":"bot","text":"hey"}"#).unwrap();
        assert_eq!(m.role, Role::Assistant);
        let m: Message = serde_json::from_str(r#"{"id":"8","role":"User","text":"yo"}"#).unwrap();
        assert_eq!(m.role, Role::User);
        let m: Message = serde_json::from_str(r#"{"id":"9","role":"system","text":"note"}"#).unwrap();
        assert_eq!(m.role, Role::Assistant);
    }

    #[test]
    fn numeric_ids_are_kept_as_text() {
        let m: Message = serde_json::from_str(r#"{"id":1,"role":"user","text":"hi"}"#).unwrap();
        assert_eq!(m.id, "1");
        let m: Message = serde_json::from_str(r#"{"id":null,"role":"user","text":"hi"}"#).unwrap();
        assert!(m.id.is_empty());
    }

    #[test]
    fn content_is_accepted_for_text() {
        let m: Message = serde_json::from_str(r#"{"role":"assistant","content":"hello"}"#).unwrap();
        assert_eq!(m.text, "hello");
        assert!(m.id.is_empty());
    }

    #[test]
    fn serializes_role_lowercase() {
        let v = serde_json::to_value(Message::user("hi").with_id("1")).unwrap();
        assert_eq!(v, serde_json::json!({"id": "1", "role": "user", "text": "hi"}));
    }

    #[test]
    fn ids_are_unique() {
        let mut ids = MessageIds::default();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        assert!(b.ends_with("-1"));
    }
}

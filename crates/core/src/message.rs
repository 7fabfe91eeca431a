//! Conversation identity and turns.
//!
//! These are the value objects that flow through the relay:
//! user sends a query → backend answers → the pair becomes a [`Turn`].

use serde::{Deserialize, Serialize};

/// Identifier of one end-user chat. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One query/response exchange. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    query: String,
    response: String,
}

impl Turn {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn response(&self) -> &str {
        &self.response
    }
}

impl std::fmt::Display for Turn {
    /// Renders as `("query", "response")`, the form shown by `/chat_history`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?}, {:?})", self.query, self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_from_numeric_chat() {
        let id = ConversationId::from(-100_123_i64);
        assert_eq!(id.as_str(), "-100123");
        assert_eq!(id.to_string(), "-100123");
    }

    #[test]
    fn turn_accessors() {
        let turn = Turn::new("hello", "hi there");
        assert_eq!(turn.query(), "hello");
        assert_eq!(turn.response(), "hi there");
    }

    #[test]
    fn turn_display_quotes_both_sides() {
        let turn = Turn::new("a", "b\nc");
        assert_eq!(turn.to_string(), r#"("a", "b\nc")"#);
    }

    #[test]
    fn turn_serializes_as_pair_of_fields() {
        let turn = Turn::new("q", "r");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["query"], "q");
        assert_eq!(json["response"], "r");
    }
}

use crate::error::{RagError, Result};
use crate::models::{ChatSession, ChatTurn};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Chat sessions keyed by an id shared with the client. History is only
/// ever appended to.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client's id when it sent a usable one, otherwise a fresh id. No
    /// session exists until its first turn is appended.
    pub fn resolve_id(session_id: Option<&str>) -> String {
        match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        }
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.history.clone())
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))
    }

    /// History for prompting; a session that does not exist yet has none.
    pub async fn turns(&self, session_id: &str) -> Vec<ChatTurn> {
        self.history(session_id).await.unwrap_or_default()
    }

    /// Appends a turn, creating the session on its first turn.
    pub async fn append(&self, session_id: &str, turn: ChatTurn) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            log::info!("Created chat session {}", session_id);
            ChatSession {
                id: session_id.to_string(),
                created_at: Utc::now(),
                history: Vec::new(),
            }
        });
        session.history.push(turn);
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))
    }

    /// Drops every session and returns how many there were.
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(message: &str) -> ChatTurn {
        ChatTurn {
            user_message: message.to_string(),
            assistant_response: format!("re: {}", message),
            timestamp: Utc::now(),
            sources: Vec::new(),
        }
    }

    #[test]
    fn blank_or_missing_id_gets_a_fresh_one() {
        let a = SessionStore::resolve_id(None);
        let b = SessionStore::resolve_id(Some("  "));
        assert_ne!(a, b);
        assert_eq!(SessionStore::resolve_id(Some(" abc ")), "abc");
    }

    #[tokio::test]
    async fn session_exists_only_after_first_turn() {
        let store = SessionStore::new();
        let id = SessionStore::resolve_id(None);
        assert!(store.turns(&id).await.is_empty());
        assert!(store.is_empty().await);

        store.append(&id, turn("one")).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.turns(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn history_is_appended_in_order() {
        let store = SessionStore::new();
        store.append("abc", turn("first")).await;
        store.append("abc", turn("second")).await;
        let messages: Vec<String> = store
            .history("abc")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.user_message)
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = SessionStore::new();
        assert!(matches!(store.history("nope").await, Err(RagError::SessionNotFound(_))));
        assert!(store.delete("nope").await.is_err());
    }

    #[tokio::test]
    async fn clear_drops_all_sessions() {
        let store = SessionStore::new();
        store.append("a", turn("x")).await;
        store.append("b", turn("y")).await;
        assert_eq!(store.clear().await, 2);
        assert!(store.is_empty().await);
    }
}

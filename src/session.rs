use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::models::GeneratedQuestion;

/// At most one question is pending per session. Generating a new question clears the
/// slot before storing, and evaluating consumes it.
pub trait PendingQuestions: Send + Sync {
    fn store(
        &self,
        session_id: &str,
        question: &GeneratedQuestion,
    ) -> impl Future<Output = Result<()>> + Send;

    fn clear(&self, session_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn take(&self, session_id: &str)
        -> impl Future<Output = Result<Option<GeneratedQuestion>>> + Send;

    fn peek(&self, session_id: &str)
        -> impl Future<Output = Result<Option<GeneratedQuestion>>> + Send;
}

#[derive(Clone, Default)]
pub struct MemorySessions {
    pending: Arc<RwLock<HashMap<String, GeneratedQuestion>>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingQuestions for MemorySessions {
    async fn store(&self, session_id: &str, question: &GeneratedQuestion) -> Result<()> {
        self.pending
            .write()
            .await
            .insert(session_id.to_string(), question.clone());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.pending.write().await.remove(session_id);
        Ok(())
    }

    async fn take(&self, session_id: &str) -> Result<Option<GeneratedQuestion>> {
        Ok(self.pending.write().await.remove(session_id))
    }

    async fn peek(&self, session_id: &str) -> Result<Option<GeneratedQuestion>> {
        Ok(self.pending.read().await.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, QuestionType};

    fn question(answer: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            question: "q".to_string(),
            options: vec![],
            correct_answer: answer.to_string(),
            explanation: "e".to_string(),
            chapter: None,
            concept_keywords: vec![],
            difficulty: Difficulty::Easy,
            question_type: QuestionType::ShortAnswer,
            degraded_fields: vec![],
        }
    }

    #[tokio::test]
    async fn sessions_do_not_clobber_each_other() {
        let store = MemorySessions::new();
        store.store("alice", &question("1")).await.expect("store");
        store.store("bob", &question("2")).await.expect("store");

        let alice = store.take("alice").await.expect("take").expect("pending");
        assert_eq!(alice.correct_answer, "1");
        assert!(store.take("alice").await.expect("take").is_none());
        assert_eq!(
            store.peek("bob").await.expect("peek").map(|q| q.correct_answer),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn clear_drops_only_that_session() {
        let store = MemorySessions::new();
        store.store("a", &question("1")).await.expect("store");
        store.store("b", &question("2")).await.expect("store");
        store.clear("a").await.expect("clear");
        assert!(store.peek("a").await.expect("peek").is_none());
        assert!(store.peek("b").await.expect("peek").is_some());
    }
}

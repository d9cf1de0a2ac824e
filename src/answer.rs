//! Question answering, the operation guarded by the admission gate.

use crate::config::AnswerModeKind;
use crate::knowledge::{KnowledgeBase, NO_ANSWER};
use crate::query_log::{append_best_effort, QueryLog, QueryRecord};
use crate::remote::ChatCompleter;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

/// Raised for a missing or blank query. Checked before admission, so it costs no tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Query cannot be empty")]
pub struct EmptyQuestion;

/// A non-blank question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn parse(raw: Option<String>) -> Result<Self, EmptyQuestion> {
        match raw {
            Some(text) if !text.trim().is_empty() => Ok(Self(text)),
            _ => Err(EmptyQuestion),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub mode: AnswerModeKind,
}

/// How questions get answered, fixed at startup.
#[derive(Clone)]
pub enum AnswerMode {
    /// Forward the question to the hosted model.
    RemoteAnswering(Arc<dyn ChatCompleter>),
    /// Look the question up in the knowledge base.
    LocalLookupFallback,
}

impl AnswerMode {
    pub fn kind(&self) -> AnswerModeKind {
        match self {
            Self::RemoteAnswering(_) => AnswerModeKind::Remote,
            Self::LocalLookupFallback => AnswerModeKind::Local,
        }
    }
}

impl fmt::Debug for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteAnswering(_) => f.write_str("RemoteAnswering"),
            Self::LocalLookupFallback => f.write_str("LocalLookupFallback"),
        }
    }
}

/// Answers one question and records it in the query log.
///
/// Never fails: remote errors become user-facing text. Wrap it in
/// [`AdmissionLayer`](crate::rate_limit::AdmissionLayer) to bound how often it runs.
#[derive(Clone, Debug)]
pub struct AnswerService {
    mode: AnswerMode,
    knowledge: Arc<KnowledgeBase>,
    log: Arc<dyn QueryLog>,
}

impl AnswerService {
    pub fn new(mode: AnswerMode, knowledge: Arc<KnowledgeBase>, log: Arc<dyn QueryLog>) -> Self {
        Self { mode, knowledge, log }
    }

    pub fn mode(&self) -> &AnswerMode {
        &self.mode
    }

    async fn answer(
        mode: AnswerMode,
        knowledge: Arc<KnowledgeBase>,
        log: Arc<dyn QueryLog>,
        question: Question,
    ) -> Answer {
        let kind = mode.kind();
        tracing::info!(query = question.as_str(), mode = ?kind, "answering query");

        let text = match mode {
            AnswerMode::RemoteAnswering(completer) => {
                match completer.complete(question.as_str()).await {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::error!(%error, "remote answer failed");
                        error.user_message().to_string()
                    }
                }
            }
            AnswerMode::LocalLookupFallback => {
                knowledge.lookup(question.as_str()).unwrap_or_else(|| NO_ANSWER.to_string())
            }
        };

        append_best_effort(log.as_ref(), QueryRecord::now(question.0, text.clone(), kind)).await;
        Answer { text, mode: kind }
    }
}

impl Service<Question> for AnswerService {
    type Response = Answer;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Answer, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, question: Question) -> Self::Future {
        let fut =
            Self::answer(self.mode.clone(), self.knowledge.clone(), self.log.clone(), question);
        Box::pin(async move { Ok(fut.await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::FaqEntry;
    use crate::query_log::MemoryQueryLog;
    use crate::remote::RemoteError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tower::ServiceExt;

    #[derive(Debug)]
    struct Canned(Result<&'static str, StatusCode>);

    #[async_trait]
    impl ChatCompleter for Canned {
        async fn complete(&self, question: &str) -> Result<String, RemoteError> {
            match self.0 {
                Ok(prefix) => Ok(format!("{} {}", prefix, question)),
                Err(status) => Err(RemoteError::Api { status, message: "boom".into() }),
            }
        }
    }

    fn knowledge() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::from_entries(
            "unused.json",
            vec![FaqEntry { question: "Hours?".into(), answer: "9 to 5.".into() }],
        ))
    }

    #[test]
    fn blank_questions_are_rejected() {
        assert_eq!(Question::parse(None), Err(EmptyQuestion));
        assert_eq!(Question::parse(Some(String::new())), Err(EmptyQuestion));
        assert_eq!(Question::parse(Some("  \n".into())), Err(EmptyQuestion));
        assert_eq!(Question::parse(Some("Hours?".into())).unwrap().as_str(), "Hours?");
    }

    #[tokio::test]
    async fn local_mode_looks_up_and_logs() {
        let log = Arc::new(MemoryQueryLog::new());
        let svc = AnswerService::new(AnswerMode::LocalLookupFallback, knowledge(), log.clone());

        let hit = svc.clone().oneshot(Question::parse(Some("hours?".into())).unwrap()).await;
        assert_eq!(hit.unwrap().text, "9 to 5.");
        let miss = svc.clone().oneshot(Question::parse(Some("Parking?".into())).unwrap()).await;
        assert_eq!(miss.unwrap().text, NO_ANSWER);

        let records = log.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query, "hours?");
        assert_eq!(records[1].response, NO_ANSWER);
        assert!(records.iter().all(|r| r.mode == AnswerModeKind::Local));
    }

    #[tokio::test]
    async fn remote_mode_uses_completer() {
        let log = Arc::new(MemoryQueryLog::new());
        let mode = AnswerMode::RemoteAnswering(Arc::new(Canned(Ok("model says"))));
        let svc = AnswerService::new(mode, knowledge(), log.clone());

        let answer = svc.oneshot(Question::parse(Some("Hours?".into())).unwrap()).await.unwrap();
        assert_eq!(answer.text, "model says Hours?");
        assert_eq!(answer.mode, AnswerModeKind::Remote);
        assert_eq!(log.records().await.unwrap()[0].mode, AnswerModeKind::Remote);
    }

    #[tokio::test]
    async fn remote_failures_become_user_messages() {
        let mode = AnswerMode::RemoteAnswering(Arc::new(Canned(Err(StatusCode::BAD_GATEWAY))));
        let svc = AnswerService::new(mode, knowledge(), Arc::new(MemoryQueryLog::new()));

        let answer = svc.oneshot(Question::parse(Some("Hours?".into())).unwrap()).await.unwrap();
        assert_eq!(answer.text, "An error occurred while processing your request.");
    }
}

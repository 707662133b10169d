use async_trait::async_trait;
use tracing::{debug, warn};

use crate::connection_form::ConnectionConfig;
use crate::error::{BackendError, WorkflowError};
use crate::feedback::FeedbackEvent;
use crate::session::{Completion, QueryResult, Session};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectReply {
    pub schema: Option<String>,
}

impl ConnectReply {
    #[must_use]
    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryReply {
    pub sql_query: Option<String>,
    pub answer: Option<String>,
}

impl QueryReply {
    #[must_use]
    pub fn new(sql_query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            sql_query: Some(sql_query.into()),
            answer: Some(answer.into()),
        }
    }
}

/// Remote natural-language-to-SQL service. Each call is exactly one request;
/// implementations must not retry.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<ConnectReply, BackendError>;

    async fn query(
        &self,
        config: &ConnectionConfig,
        question: &str,
    ) -> Result<QueryReply, BackendError>;

    async fn send_feedback(&self, event: &FeedbackEvent) -> Result<(), BackendError>;
}

pub async fn connect<B>(session: &mut Session, backend: &B) -> Result<String, WorkflowError>
where
    B: AssistantBackend + ?Sized,
{
    let request = session.begin_connect()?;
    let outcome = backend.connect(&request.config).await;
    match session.complete_connect(request.ticket, outcome) {
        Completion::Applied(result) => result,
        Completion::Discarded => Err(WorkflowError::Superseded),
    }
}

pub async fn query<B>(
    session: &mut Session,
    backend: &B,
    question: &str,
) -> Result<QueryResult, WorkflowError>
where
    B: AssistantBackend + ?Sized,
{
    session.set_question(question);
    let request = session.begin_query()?;
    let outcome = backend.query(&request.config, &request.question).await;
    match session.complete_query(request.ticket, outcome) {
        Completion::Applied(result) => result,
        Completion::Discarded => Err(WorkflowError::Superseded),
    }
}

/// Delivers a feedback event. Failures are logged and otherwise ignored.
pub async fn deliver_feedback<B>(backend: &B, event: FeedbackEvent)
where
    B: AssistantBackend + ?Sized,
{
    match backend.send_feedback(&event).await {
        Ok(()) => debug!(positive = event.positive, "feedback delivered"),
        Err(error) => warn!(%error, positive = event.positive, "feedback delivery failed"),
    }
}

/// Sends feedback on the session's current result if the feedback mode
/// allows it. Never reports an error.
pub async fn submit_feedback<B>(session: &Session, backend: &B, positive: bool)
where
    B: AssistantBackend + ?Sized,
{
    if let Some(event) = session.feedback_event(positive) {
        deliver_feedback(backend, event).await;
    }
}

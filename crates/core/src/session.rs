use tracing::{debug, info, warn};

use crate::assistant::{ConnectReply, QueryReply};
use crate::connection_form::{ConnectionConfig, FormField};
use crate::error::{BackendError, WorkflowError};
use crate::feedback::{FeedbackEvent, FeedbackMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ConnectionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub generated_query: String,
    pub answer: String,
}

impl QueryResult {
    #[must_use]
    pub fn new(generated_query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            generated_query: generated_query.into(),
            answer: answer.into(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generated_query.is_empty() && self.answer.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub ticket: ConnectTicket,
    pub config: ConnectionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub ticket: QueryTicket,
    pub config: ConnectionConfig,
    pub question: String,
}

/// Result of handing a backend outcome to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Applied(T),
    /// A newer request of the same kind was issued; nothing changed.
    Discarded,
}

/// Unescapes literal `\n` sequences and strips every remaining backslash.
#[must_use]
pub fn normalize_schema(raw: &str) -> String {
    raw.replace("\\n", "\n").replace('\\', "")
}

#[derive(Debug, Clone)]
pub struct Session {
    config: ConnectionConfig,
    state: SessionState,
    schema: String,
    result: QueryResult,
    error: Option<String>,
    question: String,
    pending_question: String,
    asked_question: String,
    feedback_mode: FeedbackMode,
    connect_sequence: u64,
    query_sequence: u64,
    query_in_flight: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            schema: String::new(),
            result: QueryResult::default(),
            error: None,
            question: String::new(),
            pending_question: String::new(),
            asked_question: String::new(),
            feedback_mode: FeedbackMode::default(),
            connect_sequence: 0,
            query_sequence: 0,
            query_in_flight: false,
        }
    }

    #[must_use]
    pub fn with_feedback_mode(mut self, mode: FeedbackMode) -> Self {
        self.feedback_mode = mode;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn update_field(&mut self, field: FormField, value: impl Into<String>) {
        self.config.update(field, value);
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state == SessionState::Connecting
    }

    #[must_use]
    pub fn is_query_running(&self) -> bool {
        self.query_in_flight
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.question = question.into();
    }

    /// The question that produced the current result.
    #[must_use]
    pub fn asked_question(&self) -> &str {
        &self.asked_question
    }

    #[must_use]
    pub fn feedback_mode(&self) -> FeedbackMode {
        self.feedback_mode
    }

    pub fn begin_connect(&mut self) -> Result<ConnectRequest, WorkflowError> {
        let missing = self.config.missing_required();
        if !missing.is_empty() {
            let labels = missing
                .into_iter()
                .map(|field| self.config.label(field))
                .collect();
            return Err(WorkflowError::MissingFields { labels });
        }

        self.connect_sequence += 1;
        self.error = None;
        self.state = SessionState::Connecting;
        debug!(sequence = self.connect_sequence, "connect started");

        Ok(ConnectRequest {
            ticket: ConnectTicket(self.connect_sequence),
            config: self.config.clone(),
        })
    }

    pub fn complete_connect(
        &mut self,
        ticket: ConnectTicket,
        outcome: Result<ConnectReply, BackendError>,
    ) -> Completion<Result<String, WorkflowError>> {
        if ticket.0 != self.connect_sequence {
            debug!(
                sequence = ticket.0,
                latest = self.connect_sequence,
                "discarding superseded connect outcome"
            );
            return Completion::Discarded;
        }

        let applied = match outcome {
            Ok(ConnectReply {
                schema: Some(raw), ..
            }) if !raw.is_empty() => {
                self.schema = normalize_schema(&raw);
                self.state = SessionState::Connected;
                info!(schema_len = self.schema.len(), "connected to database");
                Ok(self.schema.clone())
            }
            Ok(_) => {
                warn!("connect response carried no schema");
                self.fail_connect(WorkflowError::MissingSchema)
            }
            Err(source) => {
                warn!(error = %source, status = ?source.status(), "connect request failed");
                self.fail_connect(WorkflowError::Connect(source))
            }
        };
        Completion::Applied(applied)
    }

    fn fail_connect(&mut self, error: WorkflowError) -> Result<String, WorkflowError> {
        self.schema.clear();
        self.state = SessionState::ConnectionFailed;
        self.error = Some(error.to_string());
        Err(error)
    }

    pub fn begin_query(&mut self) -> Result<QueryRequest, WorkflowError> {
        if !self.is_connected() {
            let error = WorkflowError::NotConnected;
            self.error = Some(error.to_string());
            return Err(error);
        }

        self.query_sequence += 1;
        self.error = None;
        self.query_in_flight = true;
        self.pending_question.clone_from(&self.question);
        debug!(sequence = self.query_sequence, "query started");

        Ok(QueryRequest {
            ticket: QueryTicket(self.query_sequence),
            config: self.config.clone(),
            question: self.question.clone(),
        })
    }

    pub fn complete_query(
        &mut self,
        ticket: QueryTicket,
        outcome: Result<QueryReply, BackendError>,
    ) -> Completion<Result<QueryResult, WorkflowError>> {
        if ticket.0 != self.query_sequence {
            debug!(
                sequence = ticket.0,
                latest = self.query_sequence,
                "discarding superseded query outcome"
            );
            return Completion::Discarded;
        }

        self.query_in_flight = false;
        let applied = match outcome {
            Ok(reply) => {
                self.result = QueryResult::new(
                    reply.sql_query.unwrap_or_default(),
                    reply.answer.unwrap_or_default(),
                );
                self.asked_question.clone_from(&self.pending_question);
                Ok(self.result.clone())
            }
            Err(source) => {
                warn!(error = %source, status = ?source.status(), "query request failed");
                let error = WorkflowError::Query(source);
                self.result = QueryResult::default();
                self.asked_question.clear();
                self.error = Some(error.to_string());
                Err(error)
            }
        };
        Completion::Applied(applied)
    }

    /// Feedback for the current result, or `None` when there is nothing to
    /// rate or the feedback mode does not send this signal.
    #[must_use]
    pub fn feedback_event(&self, positive: bool) -> Option<FeedbackEvent> {
        if self.result.generated_query.is_empty() {
            debug!("no generated query to give feedback on");
            return None;
        }
        if !self.feedback_mode.sends(positive) {
            debug!(positive, mode = ?self.feedback_mode, "feedback not sent in this mode");
            return None;
        }

        Some(FeedbackEvent::for_result(
            positive,
            &self.schema,
            &self.asked_question,
            &self.result.generated_query,
        ))
    }
}

use std::time::Duration;

use askql_core::assistant::{AssistantBackend, ConnectReply, QueryReply};
use askql_core::connection_form::ConnectionConfig;
use askql_core::error::BackendError;
use askql_core::feedback::FeedbackEvent;
use askql_core::settings::Settings;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("invalid assistant base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct ConnectionBody<'a> {
    db_uri: &'a str,
    llm_type: &'a str,
    api_key: &'a str,
    aws_access_key_id: &'a str,
    aws_secret_access_key: &'a str,
}

impl<'a> From<&'a ConnectionConfig> for ConnectionBody<'a> {
    fn from(config: &'a ConnectionConfig) -> Self {
        Self {
            db_uri: &config.database_uri,
            llm_type: &config.model_selector,
            api_key: &config.primary_credential,
            aws_access_key_id: &config.cloud_access_key_id,
            aws_secret_access_key: &config.cloud_secret_key,
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    #[serde(flatten)]
    connection: ConnectionBody<'a>,
    question: &'a str,
}

#[derive(Debug, Serialize)]
struct FeedbackBody<'a> {
    noice: bool,
    input: &'a str,
    output: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectResponse {
    schema: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    sql_query: Option<String>,
    answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpAssistantBackend {
    base_url: Url,
    http: Client,
}

impl HttpAssistantBackend {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, HttpBackendError> {
        let mut base_url =
            Url::parse(base_url).map_err(|source| HttpBackendError::InvalidBaseUrl {
                url: base_url.to_string(),
                source,
            })?;
        // Keep any path prefix when joining endpoint names.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder =
            Client::builder().user_agent(concat!("askql/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(HttpBackendError::Client)?;

        Ok(Self { base_url, http })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, HttpBackendError> {
        Self::new(&settings.api_url, settings.request_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|error| BackendError::new(format!("invalid endpoint `{path}`: {error}")))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Default,
    {
        let response = self.send(path, body).await?;
        let bytes = response.bytes().await.map_err(to_backend_error)?;
        Ok(decode_body(path, &bytes))
    }

    async fn send<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, BackendError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "posting to assistant service");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(to_backend_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::with_status(
                format!("{path} responded with {status}"),
                status.as_u16(),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl AssistantBackend for HttpAssistantBackend {
    async fn connect(&self, config: &ConnectionConfig) -> Result<ConnectReply, BackendError> {
        let body = ConnectionBody::from(config);
        let response: ConnectResponse = self.post("connect", &body).await?;
        Ok(ConnectReply {
            schema: response.schema,
        })
    }

    async fn query(
        &self,
        config: &ConnectionConfig,
        question: &str,
    ) -> Result<QueryReply, BackendError> {
        let body = QueryBody {
            connection: ConnectionBody::from(config),
            question,
        };
        let response: QueryResponse = self.post("query", &body).await?;
        Ok(QueryReply {
            sql_query: response.sql_query,
            answer: response.answer,
        })
    }

    async fn send_feedback(&self, event: &FeedbackEvent) -> Result<(), BackendError> {
        let body = FeedbackBody {
            noice: event.positive,
            input: &event.input_context,
            output: &event.output_query,
        };
        self.send("noice", &body).await.map(|_| ())
    }
}

// A 2xx reply without a readable JSON object carries no payload.
fn decode_body<R>(path: &str, bytes: &[u8]) -> R
where
    R: DeserializeOwned + Default,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return R::default();
    }
    serde_json::from_slice(bytes).unwrap_or_else(|error| {
        debug!(%error, path, "ignoring unreadable response body");
        R::default()
    })
}

fn to_backend_error(error: reqwest::Error) -> BackendError {
    match error.status() {
        Some(status) => BackendError::with_status(error.to_string(), status.as_u16()),
        None => BackendError::new(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use askql_core::connection_form::{ConnectionConfig, FormField};
    use serde_json::json;

    use super::{
        decode_body, ConnectResponse, ConnectionBody, FeedbackBody, HttpAssistantBackend,
        HttpBackendError, QueryBody, QueryResponse,
    };

    fn bedrock_config() -> ConnectionConfig {
        let mut config = ConnectionConfig::with_model("AWS Bedrock");
        config.update(FormField::DatabaseUri, "postgresql://u:p@h:5432/d");
        config.update(FormField::CloudAccessKeyId, "AKIA");
        config.update(FormField::CloudSecretKey, "secret");
        config
    }

    #[test]
    fn connection_body_uses_wire_field_names() {
        let config = bedrock_config();
        let value = serde_json::to_value(ConnectionBody::from(&config)).expect("serializes");
        assert_eq!(
            value,
            json!({
                "db_uri": "postgresql://u:p@h:5432/d",
                "llm_type": "AWS Bedrock",
                "api_key": "",
                "aws_access_key_id": "AKIA",
                "aws_secret_access_key": "secret",
            })
        );
    }

    #[test]
    fn connection_body_covers_every_form_field() {
        let config = ConnectionConfig::default();
        let value = serde_json::to_value(ConnectionBody::from(&config)).expect("serializes");
        let object = value.as_object().expect("object body");
        assert_eq!(object.len(), FormField::ALL.len());
        for field in FormField::ALL {
            assert_eq!(object[field.wire_name()], config.value(field));
        }
    }

    #[test]
    fn query_body_merges_question_into_connection_fields() {
        let config = bedrock_config();
        let body = QueryBody {
            connection: ConnectionBody::from(&config),
            question: "How many rows?",
        };
        let value = serde_json::to_value(body).expect("serializes");
        assert_eq!(value["question"], "How many rows?");
        assert_eq!(value["llm_type"], "AWS Bedrock");
        assert_eq!(value.as_object().map(serde_json::Map::len), Some(6));
    }

    #[test]
    fn feedback_body_shape() {
        let body = FeedbackBody {
            noice: true,
            input: "Schema:t\n\nQuestion: q",
            output: "SELECT 1",
        };
        assert_eq!(
            serde_json::to_value(body).expect("serializes"),
            json!({ "noice": true, "input": "Schema:t\n\nQuestion: q", "output": "SELECT 1" })
        );
    }

    #[test]
    fn unreadable_bodies_decode_to_empty_responses() {
        let connect: ConnectResponse = decode_body("connect", b"<html>bad gateway</html>");
        assert_eq!(connect.schema, None);
        let query: QueryResponse = decode_body("query", b"  \n");
        assert_eq!(query.sql_query, None);
        assert_eq!(query.answer, None);
        let query: QueryResponse = decode_body("query", br#"{"answer":"42"}"#);
        assert_eq!(query.sql_query, None);
        assert_eq!(query.answer.as_deref(), Some("42"));
    }

    #[test]
    fn endpoints_resolve_against_base_url() {
        let backend = HttpAssistantBackend::new("http://localhost:8001", None).expect("valid url");
        assert_eq!(
            backend.endpoint("connect").expect("joins").as_str(),
            "http://localhost:8001/connect"
        );
    }

    #[test]
    fn base_url_path_prefix_is_kept() {
        let backend =
            HttpAssistantBackend::new("https://example.test/nlq", None).expect("valid url");
        assert_eq!(
            backend.endpoint("query").expect("joins").as_str(),
            "https://example.test/nlq/query"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let error = HttpAssistantBackend::new("not a url", None).expect_err("invalid url");
        assert!(matches!(error, HttpBackendError::InvalidBaseUrl { .. }));
    }
}

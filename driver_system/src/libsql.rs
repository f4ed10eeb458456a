//! libSQL opener speaking the Hrana v2 HTTP pipeline protocol
//!
//! Hosted libSQL databases are addressed as `libsql://host` and authenticate
//! with a bearer token. Each probe is a stateless pipeline request, so
//! closing a handle only drops the HTTP client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;

use crate::errors::DriverError;
use crate::handle::{BackendHandle, BackendOpener, OpenRequest};
use crate::kind::BackendKind;

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    results: Vec<PipelineResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PipelineResult {
    Ok {
        #[serde(default)]
        response: serde_json::Value,
    },
    Error {
        error: RemoteError,
    },
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
}

/// Handle to a hosted libSQL database
#[derive(Debug, Clone)]
pub struct LibSqlHandle {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl LibSqlHandle {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one statement through the pipeline endpoint
    pub async fn execute(&self, sql: &str) -> Result<serde_json::Value, DriverError> {
        let body = json!({
            "requests": [
                { "type": "execute", "stmt": { "sql": sql } },
                { "type": "close" }
            ]
        });

        let response: PipelineResponse = self
            .client
            .post(format!("{}/v2/pipeline", self.base_url))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.results.into_iter().next() {
            Some(PipelineResult::Ok { response }) => Ok(response),
            Some(PipelineResult::Error { error }) => Err(DriverError::Remote(error.message)),
            None => Err(DriverError::Remote("empty pipeline response".to_string())),
        }
    }
}

#[async_trait]
impl BackendHandle for LibSqlHandle {
    fn kind(&self) -> BackendKind {
        BackendKind::LibSql
    }

    async fn probe(&self) -> Result<(), DriverError> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opens libSQL handles; the first probe doubles as credential verification
#[derive(Debug, Clone, Default)]
pub struct LibSqlOpener;

impl LibSqlOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendOpener for LibSqlOpener {
    async fn open(&self, request: &OpenRequest) -> Result<Arc<dyn BackendHandle>, DriverError> {
        let auth_token = request
            .auth_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or(DriverError::MissingAuthToken(BackendKind::LibSql))?;

        let mut builder = Client::builder();
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let handle = LibSqlHandle {
            client: builder.build()?,
            base_url: http_base_url(&request.url)?,
            auth_token,
        };
        handle.probe().await?;

        Ok(Arc::new(handle))
    }
}

/// `libsql://host/path?query` -> `https://host`
fn http_base_url(url: &str) -> Result<String, DriverError> {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| DriverError::UnsupportedScheme(url.to_string()))?;
    let host = rest
        .split(['/', '?'])
        .next()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| DriverError::Backend("libsql url has no host".to_string()))?;
    // userinfo is never forwarded; the token travels in the Authorization header
    let host = host.rsplit('@').next().unwrap_or(host);
    Ok(format!("https://{}", host))
}

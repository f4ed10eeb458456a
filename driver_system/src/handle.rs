//! Backend handle and opener traits
//!
//! A backend handle is an opaque, already-open connection to one storage
//! engine. Openers produce handles; the connection manager only ever probes
//! and closes them.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::DriverError;
use crate::kind::BackendKind;

/// Opaque schema value passed through to openers untouched
pub type SchemaHandle = Arc<dyn Any + Send + Sync>;

/// Everything an opener needs to establish one handle
#[derive(Clone)]
pub struct OpenRequest {
    pub kind: BackendKind,
    pub url: String,
    pub auth_token: Option<String>,
    pub schema: Option<SchemaHandle>,
    /// Advisory pool size
    pub pool_size: Option<u32>,
    /// Advisory per-operation timeout
    pub timeout: Option<Duration>,
}

impl OpenRequest {
    pub fn new(kind: BackendKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            auth_token: None,
            schema: None,
            pool_size: None,
            timeout: None,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_schema(mut self, schema: Option<SchemaHandle>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_pool_size(mut self, pool_size: Option<u32>) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest")
            .field("kind", &self.kind)
            .field("has_auth_token", &self.auth_token.is_some())
            .field("has_schema", &self.schema.is_some())
            .field("pool_size", &self.pool_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// An open connection to a storage engine
#[async_trait]
pub trait BackendHandle: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Minimal read used only to confirm the handle is responsive
    async fn probe(&self) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;

    /// Access the concrete handle type for issuing queries
    fn as_any(&self) -> &dyn Any;
}

/// Produces backend handles for one or more backend families
#[async_trait]
pub trait BackendOpener: Send + Sync {
    async fn open(&self, request: &OpenRequest) -> Result<Arc<dyn BackendHandle>, DriverError>;
}

#[async_trait]
impl<T: BackendOpener + ?Sized> BackendOpener for Arc<T> {
    async fn open(&self, request: &OpenRequest) -> Result<Arc<dyn BackendHandle>, DriverError> {
        (**self).open(request).await
    }
}

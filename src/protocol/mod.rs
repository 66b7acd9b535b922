//! Request routing between the visualization and the feature model.
//!
//! Requests are plain strings (`command,arg1,arg2`). Every request ends in
//! exactly one success payload or one [`Failure`] carrying a stable negative
//! code.

mod request;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::commands::{MutationProcessor, MutationRequest};
use crate::hierarchy::{FeatureHierarchy, HistorySource, HostNavigator};
use crate::history::{self, HistorySchema};
use crate::metrics::{MetricsProvider, MetricsRequest};
use crate::serializer::{GraphView, TreeGraphSerializer};

pub use request::{ParseError, Request, TOKEN_SEPARATOR};

/// Payload returned by commands that only acknowledge.
pub const ACK: &str = r#"{"status":"ok"}"#;

pub const MALFORMED_REQUEST_CODE: i32 = -5;
pub const UNKNOWN_COMMAND_CODE: i32 = -6;
pub const HOST_ERROR_CODE: i32 = -7;

/// A rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: i32,
    pub message: String,
}

impl Failure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn host(error: impl std::fmt::Display) -> Self {
        tracing::error!("Host error: {}", error);
        Self::new(HOST_ERROR_CODE, "Internal host error")
    }
}

impl From<ParseError> for Failure {
    fn from(e: ParseError) -> Self {
        let code = match e {
            ParseError::UnknownCommand(_) => UNKNOWN_COMMAND_CODE,
            _ => MALFORMED_REQUEST_CODE,
        };
        Self::new(code, e.to_string())
    }
}

/// Receives the single answer to a request.
pub trait QueryCallback {
    fn success(&self, response: String);
    fn failure(&self, code: i32, message: String);
}

/// Everything the dispatcher needs from the host.
pub trait FeatureHost:
    FeatureHierarchy + MetricsProvider + HistorySource + HostNavigator + Clone + Send + Sync + 'static
{
}

impl<T> FeatureHost for T where
    T: FeatureHierarchy
        + MetricsProvider
        + HistorySource
        + HostNavigator
        + Clone
        + Send
        + Sync
        + 'static
{
}

#[derive(Clone)]
pub struct Dispatcher<H> {
    host: H,
    serializer: TreeGraphSerializer,
    history_schema: HistorySchema,
    processor: MutationProcessor<H>,
}

impl<H: FeatureHost> Dispatcher<H> {
    pub fn new(host: H) -> Self {
        Self {
            processor: MutationProcessor::new(host.clone()),
            host,
            serializer: TreeGraphSerializer::default(),
            history_schema: HistorySchema::default(),
        }
    }

    /// Strip `root` from location paths in graph payloads.
    pub fn with_project_root(mut self, root: Option<PathBuf>) -> Self {
        self.serializer = TreeGraphSerializer::new(root);
        self
    }

    /// Schema used by `featureHistory` without an explicit argument.
    pub fn with_history_schema(mut self, schema: HistorySchema) -> Self {
        self.history_schema = schema;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Handle one request string.
    pub async fn dispatch(&self, raw: &str) -> Result<String, Failure> {
        let request = Request::parse(raw).map_err(|e| {
            tracing::warn!("Rejected request '{}': {}", raw, e);
            Failure::from(e)
        })?;

        match request {
            Request::Graph(view) => self.graph(view).await,
            Request::History(schema) => self.history(schema.unwrap_or(self.history_schema)),
            Request::Refresh => Ok(ACK.to_string()),
            Request::Mutation(mutation) => self.mutate(&mutation),
            Request::Highlight { lpq } => {
                self.host.highlight_feature(&lpq).map_err(Failure::host)?;
                Ok(ACK.to_string())
            }
            Request::OpenPath { path, position } => {
                self.host.open_path(&path, position).map_err(Failure::host)?;
                Ok(ACK.to_string())
            }
        }
    }

    /// Callback-style entry point. Returns whether the request succeeded.
    pub async fn on_query(&self, raw: &str, callback: &impl QueryCallback) -> bool {
        match self.dispatch(raw).await {
            Ok(response) => {
                callback.success(response);
                true
            }
            Err(failure) => {
                callback.failure(failure.code, failure.message);
                false
            }
        }
    }

    /// Metrics first, then the snapshot, so both describe the same model.
    async fn graph(&self, view: GraphView) -> Result<String, Failure> {
        let metrics = MetricsRequest::spawn(self.host.clone()).ready().await;
        let roots = self.host.snapshot().map_err(Failure::host)?;
        let payload = self.serializer.serialize(&roots, &metrics, view);
        serde_json::to_string(&payload).map_err(Failure::host)
    }

    fn history(&self, schema: HistorySchema) -> Result<String, Failure> {
        let input = self.host.history().map_err(Failure::host)?;
        let payload = history::encode(&input, schema);
        serde_json::to_string(&payload).map_err(Failure::host)
    }

    fn mutate(&self, mutation: &MutationRequest) -> Result<String, Failure> {
        let outcome = self.processor.apply(mutation).map_err(Failure::host)?;
        match outcome.code(mutation.kind()) {
            None => Ok(ACK.to_string()),
            Some(code) => Err(Failure::new(code, outcome.message())),
        }
    }
}

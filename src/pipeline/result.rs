//! Action results.
//!
//! A result is the value an action (or a short-circuiting filter) produces;
//! executing it writes the response.

use std::fmt;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use serde_json::Value;

use crate::pipeline::context::ActionContext;
use crate::pipeline::types::{InvokeError, InvokeResult};

/// Writes a response for an action invocation.
#[async_trait]
pub trait ActionResult: Send + Sync + fmt::Debug {
    async fn execute_result(&self, context: &ActionContext) -> InvokeResult<()>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// Writes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResult;

#[async_trait]
impl ActionResult for EmptyResult {
    async fn execute_result(&self, _context: &ActionContext) -> InvokeResult<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "empty"
    }
}

/// Serializes a value as JSON.
#[derive(Debug, Clone)]
pub struct ObjectResult {
    pub value: Value,
    pub status: StatusCode,
}

impl ObjectResult {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            status: StatusCode::OK,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

#[async_trait]
impl ActionResult for ObjectResult {
    async fn execute_result(&self, context: &ActionContext) -> InvokeResult<()> {
        let body = serde_json::to_vec(&self.value).map_err(InvokeError::handler)?;
        let mut response = context.response();
        response.status = self.status;
        response.set_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.write(&body);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "object"
    }
}

/// Writes literal content.
#[derive(Debug, Clone)]
pub struct ContentResult {
    pub content: String,
    pub content_type: &'static str,
    pub status: StatusCode,
}

impl ContentResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: "text/plain; charset=utf-8",
            status: StatusCode::OK,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

#[async_trait]
impl ActionResult for ContentResult {
    async fn execute_result(&self, context: &ActionContext) -> InvokeResult<()> {
        let mut response = context.response();
        response.status = self.status;
        response.set_header(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response.write(self.content.as_bytes());
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "content"
    }
}

/// Sets only the status code.
#[derive(Debug, Clone, Copy)]
pub struct StatusCodeResult {
    pub status: StatusCode,
}

impl StatusCodeResult {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

#[async_trait]
impl ActionResult for StatusCodeResult {
    async fn execute_result(&self, context: &ActionContext) -> InvokeResult<()> {
        context.response().status = self.status;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "status_code"
    }
}

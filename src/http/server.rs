//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single dispatch fallback
//! - Wire up middleware (request ID, tracing, timeout)
//! - Turn requests into route contexts and response sinks into responses
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::DispatchConfig;
use crate::dispatch::{DispatchError, RouteHandler};
use crate::http::request::{request_data, ConventionalRoutes};
use crate::observability::metrics;
use crate::pipeline::context::ResponseSink;
use crate::routing::values::{RequestAborted, RouteContext};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RouteHandler>,
    pub routes: Arc<ConventionalRoutes>,
    pub max_body_bytes: usize,
}

/// HTTP host for the dispatch pipeline.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &DispatchConfig, handler: Arc<RouteHandler>) -> Self {
        let state = AppState {
            handler,
            routes: Arc::new(ConventionalRoutes::new(config.routes.clone())),
            max_body_bytes: config.listener.max_body_bytes,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatchConfig, state: AppState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving or for driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Flags the pipeline as aborted when the client side goes away first.
struct AbortOnDrop(watch::Sender<bool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}

async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();

    let body = match read_body(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            tracing::debug!(limit = state.max_body_bytes, "Rejected oversized request body");
            return respond(&method, (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response());
        }
        Err(BodyError::Read(e)) => {
            tracing::debug!(error = %e, "Failed to read request body");
            return respond(&method, (StatusCode::BAD_REQUEST, "Failed to read request body").into_response());
        }
    };

    let request = request_data(&parts, body);
    let Some(route_data) = state.routes.match_path(&request.path) else {
        return respond(&method, StatusCode::NOT_FOUND.into_response());
    };

    let (abort_tx, aborted) = RequestAborted::channel();
    let _abort = AbortOnDrop(abort_tx);

    let handler = Arc::clone(&state.handler);
    let task = tokio::spawn(async move {
        let mut context = RouteContext::new(request, route_data).with_aborted(aborted);
        let outcome = handler.route_async(&mut context).await;
        (context, outcome)
    });

    let response = match task.await {
        Ok((context, Ok(()))) => match context.response {
            Some(sink) if context.is_handled => into_response(sink),
            _ => StatusCode::NOT_FOUND.into_response(),
        },
        Ok((_, Err(error))) => error_response(&error),
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    respond(&method, response)
}

enum BodyError {
    TooLarge,
    Read(axum::Error),
}

/// Buffers the request body, failing once it grows past `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buffer.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

fn respond(method: &axum::http::Method, response: Response) -> Response {
    metrics::record_request(method.as_str(), response.status().as_u16());
    response
}

fn into_response(sink: ResponseSink) -> Response {
    let mut response = Response::new(Body::from(sink.body));
    *response.status_mut() = sink.status;
    *response.headers_mut() = sink.headers;
    response
}

fn error_response(error: &DispatchError) -> Response {
    tracing::error!(error = %error, "Request dispatch failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::builder::ActionDescriptorBuilder;
    use crate::descriptor::store::ActionDescriptorStore;
    use crate::dispatch::ControllerInvokerFactory;
    use crate::pipeline::action::{ActionMethod, ActionReturn};
    use axum::body::to_bytes;
    use serde_json::json;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(&DispatchConfig::default(), handler())
    }

    fn handler() -> Arc<RouteHandler> {
        let store = Arc::new(ActionDescriptorStore::new(vec![ActionDescriptorBuilder::new(
            "Home",
            "Index",
            ActionMethod::sync(|_| Ok(ActionReturn::Value(json!({ "hello": "world" })))),
        )
        .build()]));
        Arc::new(RouteHandler::new(
            store,
            Arc::new(ControllerInvokerFactory::default()),
            DispatchConfig::default().pipeline,
        ))
    }

    #[tokio::test]
    async fn test_root_reaches_default_action() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"hello":"world"}"#);
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_found() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/nope/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_payload_too_large() {
        let mut config = DispatchConfig::default();
        config.listener.max_body_bytes = 4;
        let response = HttpServer::new(&config, handler())
            .router()
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from("too long")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_broken_body_stream_is_bad_request() {
        let chunks = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let response = server()
            .router()
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from_stream(chunks)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

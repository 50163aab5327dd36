//! Filter pipeline ordering, short-circuits, and error flow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use action_dispatch::descriptor::types::{ActionDescriptor, BindingSource, ParameterDescriptor};
use action_dispatch::pipeline::action::{ActionMethod, ActionReturn, NoControllerFactory};
use action_dispatch::pipeline::binding::DefaultBindingContextProvider;
use action_dispatch::pipeline::context::ActionContext;
use action_dispatch::pipeline::filters::{Filter, FilterDescriptor, FilterFactory, FilterScope};
use action_dispatch::pipeline::invoker::{ActionInvoker, ControllerActionInvoker};
use action_dispatch::pipeline::types::{InvokeError, InvokeResult};
use action_dispatch::routing::{RequestAborted, RequestData, RouteData, RouteValues};
use axum::http::Method;
use serde_json::json;

mod common;

use common::*;

fn attach(filter: Filter) -> FilterDescriptor {
    FilterDescriptor::new(filter, FilterScope::Action)
}

fn action_filter(filter: RecordingActionFilter) -> FilterDescriptor {
    let name = filter.name;
    attach(Filter::new(name).action(Arc::new(filter)))
}

fn async_action_filter(name: &'static str, log: &Log, mode: NextMode, result: Option<&str>) -> FilterDescriptor {
    let filter = AsyncRecordingActionFilter {
        name,
        log: log.clone(),
        mode,
        result: result.map(|r| RecordingResult::shared(r, log)),
    };
    attach(Filter::new(name).async_action(Arc::new(filter)))
}

fn result_filter(filter: RecordingResultFilter) -> FilterDescriptor {
    let name = filter.name;
    attach(Filter::new(name).result(Arc::new(filter)))
}

fn exception_filter(name: &'static str, log: &Log, mode: ExceptionMode) -> FilterDescriptor {
    attach(Filter::new(name).exception(Arc::new(RecordingExceptionFilter {
        name,
        log: log.clone(),
        mode,
    })))
}

#[tokio::test]
async fn test_filters_wrap_action_and_result_in_order() {
    let log = Log::default();
    let descriptor = builder(recording_method(&log))
        .filter(action_filter(RecordingActionFilter::new("a1", &log)))
        .filter(action_filter(RecordingActionFilter::new("a2", &log)))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    let (outcome, context) = invoke(descriptor).await;

    assert!(outcome.is_ok());
    assert_eq!(
        log.entries(),
        vec![
            "a1:executing",
            "a2:executing",
            "action",
            "a2:executed",
            "a1:executed",
            "r1:result_executing",
            "result:action",
            "r1:result_executed",
        ]
    );
    assert_eq!(context.response().body_text(), "action");
}

#[tokio::test]
async fn test_filter_order_beats_declaration_order() {
    let log = Log::default();
    let descriptor = builder(recording_method(&log))
        .filter(action_filter(RecordingActionFilter::new("late", &log)).with_order(10))
        .filter(action_filter(RecordingActionFilter::new("early", &log)).with_order(-10))
        .build();

    invoke(descriptor).await.0.unwrap();
    assert_eq!(&log.entries()[..2], &["early:executing", "late:executing"]);
}

#[tokio::test]
async fn test_sync_short_circuit_skips_inner_filters_and_action() {
    let log = Log::default();
    let mut short = RecordingActionFilter::new("a2", &log);
    short.short_circuit = Some(RecordingResult::shared("short", &log));

    let descriptor = builder(recording_method(&log))
        .filter(action_filter(RecordingActionFilter::new("a1", &log)))
        .filter(action_filter(short))
        .filter(action_filter(RecordingActionFilter::new("a3", &log)))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    invoke(descriptor).await.0.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "a1:executing",
            "a2:executing",
            "a2:executed",
            "a1:executed",
            "r1:result_executing",
            "result:short",
            "r1:result_executed",
        ]
    );
}

#[tokio::test]
async fn test_short_circuiting_filters_get_one_completion_callback() {
    let log = Log::default();
    let mut a2 = RecordingActionFilter::new("a2", &log);
    a2.short_circuit = Some(RecordingResult::shared("short", &log));
    let mut r2 = RecordingResultFilter::new("r2", &log);
    r2.cancel = true;

    let descriptor = builder(recording_method(&log))
        .filter(action_filter(RecordingActionFilter::new("a1", &log)))
        .filter(action_filter(a2))
        .filter(action_filter(RecordingActionFilter::new("a3", &log)))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .filter(result_filter(r2))
        .filter(result_filter(RecordingResultFilter::new("r3", &log)))
        .build();

    invoke(descriptor).await.0.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "a1:executing",
            "a2:executing",
            "a2:executed",
            "a1:executed",
            "r1:result_executing",
            "r2:result_executing",
            "r2:result_executed",
            "r1:result_executed",
        ]
    );
    for name in ["a1", "a2"] {
        assert_eq!(log.count(&format!("{name}:executed")), 1);
    }
    for name in ["r1", "r2"] {
        assert_eq!(log.count(&format!("{name}:result_executed")), 1);
    }
    assert_eq!(log.count("a3:executing"), 0);
    assert_eq!(log.count("r3:result_executing"), 0);
    assert_eq!(log.count("result:short"), 0);
}

#[tokio::test]
async fn test_async_short_circuit_reports_canceled_to_outer_filter() {
    let log = Log::default();
    let descriptor = builder(recording_method(&log))
        .filter(async_action_filter("outer", &log, NextMode::Call, None))
        .filter(async_action_filter("inner", &log, NextMode::Skip, Some("short")))
        .build();

    invoke(descriptor).await.0.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "outer:before",
            "inner:before",
            "outer:after(canceled=true, faulted=false)",
            "result:short",
        ]
    );
}

#[tokio::test]
async fn test_async_filter_without_next_or_result_runs_empty_result() {
    let log = Log::default();
    let descriptor = builder(recording_method(&log))
        .filter(async_action_filter("skip", &log, NextMode::Skip, None))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    let (outcome, context) = invoke(descriptor).await;

    assert!(outcome.is_ok());
    assert_eq!(log.entries(), vec!["skip:before", "r1:result_executing", "r1:result_executed"]);
    assert!(context.response().body.is_empty());
}

#[tokio::test]
async fn test_unhandled_action_error_propagates_unchanged() {
    let log = Log::default();
    let error = InvokeError::message("boom");
    let descriptor = builder(failing_method(&log, error.clone()))
        .filter(async_action_filter("observer", &log, NextMode::Call, None))
        .filter(action_filter(RecordingActionFilter::new("sync", &log)))
        .filter(exception_filter("ignore", &log, ExceptionMode::Ignore))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    let (outcome, _) = invoke(descriptor).await;

    assert!(outcome.unwrap_err().same_error(&error));
    assert_eq!(
        log.entries(),
        vec![
            "observer:before",
            "sync:executing",
            "action",
            "sync:executed",
            "observer:after(canceled=false, faulted=true)",
            "ignore:exception",
        ]
    );
}

#[tokio::test]
async fn test_action_filter_can_handle_error() {
    let log = Log::default();
    let mut handler = RecordingActionFilter::new("handler", &log);
    handler.handle_exception = true;

    let descriptor = builder(failing_method(&log, InvokeError::message("boom")))
        .filter(action_filter(handler))
        .filter(exception_filter("exception", &log, ExceptionMode::Ignore))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    invoke(descriptor).await.0.unwrap();

    assert_eq!(log.count("exception:exception"), 0);
    assert_eq!(log.count("r1:result_executing"), 1);
}

#[tokio::test]
async fn test_exception_filters_run_innermost_first() {
    let log = Log::default();
    let descriptor = builder(failing_method(&log, InvokeError::message("boom")))
        .filter(exception_filter("outer", &log, ExceptionMode::Ignore))
        .filter(exception_filter("inner", &log, ExceptionMode::Ignore))
        .build();

    assert!(invoke(descriptor).await.0.is_err());
    assert_eq!(log.entries(), vec!["action", "inner:exception", "outer:exception"]);
}

#[tokio::test]
async fn test_exception_result_skips_result_filters() {
    let log = Log::default();
    let descriptor = builder(failing_method(&log, InvokeError::message("boom")))
        .filter(exception_filter("outer", &log, ExceptionMode::Ignore))
        .filter(exception_filter(
            "inner",
            &log,
            ExceptionMode::Handle(RecordingResult::shared("handled", &log)),
        ))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    let (outcome, context) = invoke(descriptor).await;

    assert!(outcome.is_ok());
    assert_eq!(log.entries(), vec!["action", "inner:exception", "result:handled"]);
    assert_eq!(context.response().body_text(), "handled");
}

#[tokio::test]
async fn test_cleared_exception_runs_empty_result_through_result_filters() {
    let log = Log::default();
    let descriptor = builder(failing_method(&log, InvokeError::message("boom")))
        .filter(exception_filter("clear", &log, ExceptionMode::Clear))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    invoke(descriptor).await.0.unwrap();
    assert_eq!(
        log.entries(),
        vec!["action", "clear:exception", "r1:result_executing", "r1:result_executed"]
    );
}

#[tokio::test]
async fn test_authorization_challenge_short_circuits_everything() {
    let log = Log::default();
    let authorization = RecordingAuthorization {
        name: "auth",
        log: log.clone(),
        challenge: Some(RecordingResult::shared("challenge", &log)),
        error: None,
    };
    let descriptor = builder(recording_method(&log))
        .filter(attach(Filter::new("auth").authorization(Arc::new(authorization))))
        .filter(action_filter(RecordingActionFilter::new("a1", &log)))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    let (outcome, context) = invoke(descriptor).await;

    assert!(outcome.is_ok());
    assert_eq!(log.entries(), vec!["auth:authorization", "result:challenge"]);
    assert_eq!(context.response().body_text(), "challenge");
}

#[tokio::test]
async fn test_authorization_error_reaches_exception_filters() {
    let log = Log::default();
    let authorization = RecordingAuthorization {
        name: "auth",
        log: log.clone(),
        challenge: None,
        error: Some(InvokeError::message("denied")),
    };
    let descriptor = builder(recording_method(&log))
        .filter(attach(Filter::new("auth").authorization(Arc::new(authorization))))
        .filter(exception_filter(
            "exception",
            &log,
            ExceptionMode::Handle(RecordingResult::shared("handled", &log)),
        ))
        .build();

    invoke(descriptor).await.0.unwrap();
    assert_eq!(log.entries(), vec!["auth:authorization", "exception:exception", "result:handled"]);
}

#[tokio::test]
async fn test_async_action_filter_calling_next_after_result_is_invalid() {
    let log = Log::default();
    let descriptor = builder(recording_method(&log))
        .filter(async_action_filter("bad", &log, NextMode::Violate, Some("short")))
        .build();

    let err = invoke(descriptor).await.0.unwrap_err();
    assert!(matches!(err, InvokeError::InvalidOperation(_)));
    assert_eq!(log.count("action"), 0);
}

#[tokio::test]
async fn test_async_result_filter_calling_next_after_cancel_is_invalid() {
    let log = Log::default();
    let filter = AsyncRecordingResultFilter {
        name: "bad",
        log: log.clone(),
        mode: NextMode::Violate,
    };
    let descriptor = builder(recording_method(&log))
        .filter(attach(Filter::new("bad").async_result(Arc::new(filter))))
        .build();

    let err = invoke(descriptor).await.0.unwrap_err();
    assert!(matches!(err, InvokeError::InvalidOperation(_)));
    assert_eq!(log.count("result:action"), 0);
}

#[tokio::test]
async fn test_result_filter_cancel_skips_result() {
    let log = Log::default();
    let mut cancel = RecordingResultFilter::new("cancel", &log);
    cancel.cancel = true;
    let async_outer = AsyncRecordingResultFilter {
        name: "outer",
        log: log.clone(),
        mode: NextMode::Call,
    };

    let descriptor = builder(recording_method(&log))
        .filter(attach(Filter::new("outer").async_result(Arc::new(async_outer))))
        .filter(result_filter(cancel))
        .build();

    let (outcome, context) = invoke(descriptor).await;

    assert!(outcome.is_ok());
    assert_eq!(
        log.entries(),
        vec![
            "action",
            "outer:before",
            "cancel:result_executing",
            "cancel:result_executed",
            "outer:after(canceled=true)",
        ]
    );
    assert!(context.response().body.is_empty());
}

#[tokio::test]
async fn test_result_errors_bypass_exception_filters() {
    let log = Log::default();
    let error = InvokeError::message("write failed");
    let failing = {
        let error = error.clone();
        ActionMethod::sync(move |_| Ok(ActionReturn::result(FailingResult(error.clone()))))
    };
    let descriptor = builder(failing)
        .filter(exception_filter(
            "exception",
            &log,
            ExceptionMode::Handle(RecordingResult::shared("handled", &log)),
        ))
        .filter(result_filter(RecordingResultFilter::new("r1", &log)))
        .build();

    let err = invoke(descriptor).await.0.unwrap_err();
    assert!(err.same_error(&error));
    assert_eq!(log.entries(), vec!["r1:result_executing", "r1:result_executed"]);
}

#[tokio::test]
async fn test_result_filter_can_handle_result_error() {
    let log = Log::default();
    let mut handler = RecordingResultFilter::new("r1", &log);
    handler.handle_exception = true;
    let failing = ActionMethod::sync(|_| Ok(ActionReturn::result(FailingResult(InvokeError::message("boom")))));

    let descriptor = builder(failing).filter(result_filter(handler)).build();
    assert!(invoke(descriptor).await.0.is_ok());
}

#[tokio::test]
async fn test_sync_method_returning_pending_future_is_invalid() {
    let method = ActionMethod::sync(|_| Ok(ActionReturn::Pending(Box::pin(async { Ok::<_, InvokeError>(ActionReturn::Void) }))));
    let err = invoke(builder(method).build()).await.0.unwrap_err();
    assert!(matches!(err, InvokeError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_async_method_resolving_to_pending_future_is_invalid() {
    let method = ActionMethod::from_async(|_| async {
        Ok(ActionReturn::Pending(Box::pin(async { Ok::<_, InvokeError>(ActionReturn::Void) })))
    });
    let err = invoke(builder(method).build()).await.0.unwrap_err();
    assert!(matches!(err, InvokeError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_async_method_value_becomes_json() {
    let method = ActionMethod::from_async(|_| async { Ok(ActionReturn::Value(json!({ "answer": 42 }))) });
    let (outcome, context) = invoke(builder(method).build()).await;

    outcome.unwrap();
    let response = context.response();
    assert_eq!(response.body_text(), r#"{"answer":42}"#);
    assert_eq!(response.headers["content-type"], "application/json");
}

#[tokio::test]
async fn test_binding_failures_land_in_model_state() {
    let log = Log::default();
    let method = {
        let log = log.clone();
        ActionMethod::sync(move |invocation| {
            log.push(format!(
                "controller={} valid={}",
                invocation.argument("controller").and_then(|v| v.as_str()).unwrap_or("-"),
                invocation.context.model_state().is_valid()
            ));
            Ok(ActionReturn::Void)
        })
    };
    let descriptor = builder(method)
        .parameter(ParameterDescriptor::new("controller", BindingSource::Route))
        .parameter(ParameterDescriptor::new("id", BindingSource::Route))
        .parameter(ParameterDescriptor::new("page", BindingSource::Query).optional())
        .build();

    let (outcome, context) = invoke(descriptor).await;

    outcome.unwrap();
    assert_eq!(log.entries(), vec!["controller=Home valid=false"]);
    let state = context.model_state();
    assert_eq!(state.errors_for("id").count(), 1);
    assert_eq!(state.errors().len(), 1);
}

#[tokio::test]
async fn test_model_state_caps_errors() {
    let descriptor = builder(void_method())
        .parameter(ParameterDescriptor::new("a", BindingSource::Route))
        .parameter(ParameterDescriptor::new("b", BindingSource::Route))
        .parameter(ParameterDescriptor::new("c", BindingSource::Route))
        .build();
    let context = action_context(descriptor);
    context.model_state().max_allowed_errors = 2;

    let mut invoker = ControllerActionInvoker::new(
        context.clone(),
        Arc::new(DefaultBindingContextProvider::default()),
        Arc::new(NoControllerFactory),
    );
    invoker.invoke().await.unwrap();

    let state = context.model_state();
    assert!(state.has_reached_max_errors());
    assert_eq!(state.errors().len(), 2);
    assert_eq!(state.errors_for("").count(), 1);
}

struct CountingFilterFactory {
    created: AtomicUsize,
    log: Log,
}

impl FilterFactory for CountingFilterFactory {
    fn create_filter(&self, _context: &ActionContext) -> InvokeResult<Filter> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Filter::new("made").action(Arc::new(RecordingActionFilter::new("made", &self.log))))
    }
}

#[tokio::test]
async fn test_filter_factory_runs_per_invocation() {
    let log = Log::default();
    let factory = Arc::new(CountingFilterFactory {
        created: AtomicUsize::new(0),
        log: log.clone(),
    });
    let descriptor: ActionDescriptor = builder(recording_method(&log))
        .filter(FilterDescriptor::factory(factory.clone(), FilterScope::Controller))
        .build();

    invoke(descriptor.clone()).await.0.unwrap();
    invoke(descriptor).await.0.unwrap();

    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    assert_eq!(log.count("made:executing"), 2);
}

#[tokio::test]
async fn test_aborted_request_stops_action() {
    let log = Log::default();
    let method = ActionMethod::from_async(|_| async {
        std::future::pending::<()>().await;
        Ok(ActionReturn::Void)
    });
    let descriptor = builder(method)
        .filter(exception_filter("exception", &log, ExceptionMode::Ignore))
        .build();

    let (abort, aborted) = RequestAborted::channel();
    abort.send(true).unwrap();
    let context = ActionContext::new(
        Arc::new(descriptor),
        Arc::new(RequestData::new(Method::GET, "/")),
        RouteData::new(RouteValues::new()),
        aborted,
    );
    let mut invoker = ControllerActionInvoker::new(
        context,
        Arc::new(DefaultBindingContextProvider::default()),
        Arc::new(NoControllerFactory),
    );

    let err = invoker.invoke().await.unwrap_err();
    assert!(matches!(err, InvokeError::Aborted));
    assert_eq!(log.count("exception:exception"), 1);
}

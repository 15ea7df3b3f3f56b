use axum::{
    http::{header, HeaderName, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
};

use crate::{
    error::{moderation_internal_error, ApiError},
    handlers,
    security::middleware::{client_context_middleware, panic_audit_middleware, HandlerPanicked},
    state::AppState,
};

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/moderate",
            post(handlers::moderate_content).layer(CatchPanicLayer::custom(moderation_panic)),
        )
        .route(
            "/auth",
            post(handlers::authenticate).layer(CatchPanicLayer::custom(auth_panic)),
        )
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), panic_audit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), client_context_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

fn moderation_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = panic_message(err.as_ref()), "Moderation handler panicked");
    let mut response = moderation_internal_error();
    response.extensions_mut().insert(HandlerPanicked {
        function_name: handlers::MODERATION_FN,
    });
    response
}

fn auth_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = panic_message(err.as_ref()), "Auth handler panicked");
    let mut response = ApiError::Internal(anyhow::anyhow!("handler panicked")).into_response();
    response.extensions_mut().insert(HandlerPanicked {
        function_name: handlers::AUTH_FN,
    });
    response
}

fn panic_message(err: &(dyn Any + Send)) -> &str {
    if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

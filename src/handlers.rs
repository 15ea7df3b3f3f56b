use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;
use std::time::Instant;

use crate::{
    error::ApiError,
    health::HealthStatus,
    models::{AuthSession, ModerationVerdict, RawAuthRequest, RawModerationRequest},
    security::{
        auth_gateway::{AuthError, AuthGatewayError, AuthOutcome},
        middleware::ClientContext,
        moderation::{DecisionPath, ModerationOutcome},
        AuditEntry, AuditLevel,
    },
    state::AppState,
    validation::{validate_auth, validate_moderation},
};

pub const MODERATION_FN: &str = "moderate-content";
pub const AUTH_FN: &str = "auth-gateway";

pub async fn moderate_content(
    State(state): State<AppState>,
    Extension(ctx): Extension<ClientContext>,
    payload: Result<Json<RawModerationRequest>, JsonRejection>,
) -> Result<Json<ModerationVerdict>, ApiError> {
    let started = Instant::now();

    let raw = match payload {
        Ok(Json(raw)) => raw,
        Err(rejection) => {
            return Err(reject_invalid(&state, MODERATION_FN, &ctx, started, vec![rejection.body_text()]));
        }
    };

    // Validation happens before any budget is consumed.
    let request = validate_moderation(raw)
        .map_err(|details| reject_invalid(&state, MODERATION_FN, &ctx, started, details))?;

    match state.moderation_service.moderate(&ctx.client_key, &request).await {
        ModerationOutcome::RateLimited { retry_after } => {
            state.audit.emit(
                AuditEntry::new(MODERATION_FN, "rate_limit_exceeded", &ctx.ip_address, started)
                    .level(AuditLevel::Warn)
                    .success(false)
                    .meta("retry_after", retry_after)
                    .meta("content_type", request.content_type.as_str()),
            );
            Err(ApiError::ModerationRateLimited { retry_after })
        }
        ModerationOutcome::Decided(decision) => {
            let action = match decision.path {
                DecisionPath::KeywordBlock => "blocked",
                DecisionPath::AiFlag | DecisionPath::KeywordFlag => "flagged",
                DecisionPath::Clean => "success",
            };
            state.audit.emit(
                AuditEntry::new(MODERATION_FN, action, &ctx.ip_address, started)
                    .meta("content_type", request.content_type.as_str())
                    .meta("content_id", request.content_id.as_str())
                    .meta("decision", decision.path.as_str())
                    .meta("confidence", decision.verdict.confidence)
                    .meta("flag_type", decision.verdict.flag_type.clone())
                    .meta("flag_persisted", decision.flag_persisted),
            );
            Ok(Json(decision.verdict))
        }
    }
}

pub async fn authenticate(
    State(state): State<AppState>,
    Extension(ctx): Extension<ClientContext>,
    payload: Result<Json<RawAuthRequest>, JsonRejection>,
) -> Result<Json<AuthSession>, ApiError> {
    let started = Instant::now();

    let raw = match payload {
        Ok(Json(raw)) => raw,
        Err(rejection) => {
            return Err(reject_invalid(&state, AUTH_FN, &ctx, started, vec![rejection.body_text()]));
        }
    };

    let request = validate_auth(raw).map_err(|details| reject_invalid(&state, AUTH_FN, &ctx, started, details))?;
    let action = request.action.as_str();

    match state.auth_gateway.authenticate(&ctx.client_key, &request).await {
        Ok(AuthOutcome::Authenticated(session)) => {
            let mut entry = AuditEntry::new(AUTH_FN, "success", &ctx.ip_address, started).meta("auth_action", action);
            if let Some(user_id) = session.user.get("id").and_then(Value::as_str) {
                entry = entry.user_id(user_id);
            }
            state.audit.emit(entry);
            Ok(Json(session))
        }
        Ok(AuthOutcome::RateLimited { retry_after }) => {
            state.audit.emit(
                AuditEntry::new(AUTH_FN, "rate_limit_exceeded", &ctx.ip_address, started)
                    .level(AuditLevel::Warn)
                    .success(false)
                    .meta("auth_action", action)
                    .meta("retry_after", retry_after),
            );
            Err(ApiError::RateLimited { retry_after })
        }
        Err(AuthGatewayError::Auth(AuthError::InvalidCredentials)) => {
            state.audit.emit(
                AuditEntry::new(AUTH_FN, "invalid_credentials", &ctx.ip_address, started)
                    .level(AuditLevel::Warn)
                    .success(false)
                    .meta("auth_action", action),
            );
            Err(ApiError::InvalidCredentials)
        }
        Err(AuthGatewayError::Auth(AuthError::Rejected(reason))) => {
            state.audit.emit(
                AuditEntry::new(AUTH_FN, "rejected", &ctx.ip_address, started)
                    .level(AuditLevel::Warn)
                    .success(false)
                    .meta("auth_action", action),
            );
            Err(ApiError::Rejected(reason))
        }
        Err(e) => {
            tracing::error!(error = %e, auth_action = action, "Authentication failed internally");
            state.audit.emit(
                AuditEntry::new(AUTH_FN, "internal_error", &ctx.ip_address, started)
                    .level(AuditLevel::Error)
                    .success(false)
                    .meta("auth_action", action)
                    .meta("error_kind", error_kind(&e)),
            );
            Err(ApiError::Internal(e.into()))
        }
    }
}

fn error_kind(error: &AuthGatewayError) -> &'static str {
    match error {
        AuthGatewayError::LimiterUnavailable(_) => "rate_limit_store",
        AuthGatewayError::Auth(_) => "identity_provider",
    }
}

fn reject_invalid(
    state: &AppState,
    function_name: &'static str,
    ctx: &ClientContext,
    started: Instant,
    details: Vec<String>,
) -> ApiError {
    state.audit.emit(
        AuditEntry::new(function_name, "validation_failed", &ctx.ip_address, started)
            .level(AuditLevel::Warn)
            .success(false)
            .meta("details", details.clone()),
    );
    ApiError::Validation(details)
}

/// Health check endpoint for load balancer
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health = HealthStatus::check(state.rate_limiter.store().as_ref()).await;

    if health.healthy {
        Ok(Json(health))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health)))
    }
}

/// Prometheus exposition of the gateway counters
pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}


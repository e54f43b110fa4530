use axum::extract::{Extension, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use shared::models::{
    ChatRequest, CreateSessionRequest, CreateSessionResponse, ErrorBody, ErrorResponse, OkResponse,
    RegisterDeviceRequest, UpdateTimeZoneRequest,
};
use shared::repos::{Store, StoreError};
use shared::timezone::normalize_time_zone;
use shared::turn::{TurnError, TurnOrchestrator};
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub orchestrator: TurnOrchestrator,
    pub session_ttl_seconds: u64,
}

#[derive(Clone, Copy)]
struct AuthUser {
    user_id: Uuid,
}

pub fn build_router(app_state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/auth/session", post(create_session))
        .with_state(app_state.clone());

    let auth_layer_state = app_state.clone();

    let protected_routes = Router::new()
        .route("/v1/chat", post(chat))
        .route("/v1/devices", post(register_device))
        .route("/v1/profile/timezone", put(update_time_zone))
        .layer(middleware::from_fn_with_state(
            auth_layer_state,
            auth_middleware,
        ))
        .with_state(app_state);

    public_routes.merge(protected_routes)
}

async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        warn!("missing or invalid authorization header");
        return unauthorized_response();
    };

    let token_hash = hash_token(token);

    let user_id = match state
        .store
        .resolve_session_user(&token_hash, Utc::now())
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return unauthorized_response(),
        Err(err) => return store_error_response(err),
    };

    req.extensions_mut().insert(AuthUser { user_id });
    next.run(req).await
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Err(err) => {
            warn!("readiness check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: ErrorBody {
                        code: "db_unavailable".to_string(),
                        message: "Database not ready".to_string(),
                    },
                }),
            )
                .into_response()
        }
    }
}

async fn create_session(
    State(state): State<AppState>,
    Json(_req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let user_id = match state.store.create_user().await {
        Ok(user_id) => user_id,
        Err(err) => return store_error_response(err),
    };

    let access_token = generate_secure_token("at");
    let refresh_token = generate_secure_token("rt");
    let access_hash = hash_token(&access_token);
    let refresh_hash = hash_token(&refresh_token);
    let expires_in = state.session_ttl_seconds;

    if let Err(err) = state
        .store
        .create_session(
            user_id,
            &access_hash,
            &refresh_hash,
            Utc::now() + Duration::seconds(expires_in as i64),
        )
        .await
    {
        return store_error_response(err);
    }

    let response = CreateSessionResponse {
        access_token,
        refresh_token,
        expires_in: expires_in as u32,
    };

    (StatusCode::OK, Json(response)).into_response()
}

async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    if req.message.trim().is_empty() {
        return bad_request_response("empty_message", "Message must not be empty");
    }

    match state
        .orchestrator
        .run_turn(user.user_id, &req.message, req.message_id, req.client_timestamp)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Err(TurnError::Storage(err)) => store_error_response(err),
    }
}

async fn register_device(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<RegisterDeviceRequest>,
) -> impl IntoResponse {
    if req.device_id.trim().is_empty() || req.push_token.trim().is_empty() {
        return bad_request_response(
            "invalid_device",
            "Device id and push token must not be empty",
        );
    }

    if let Err(err) = state
        .store
        .register_device(user.user_id, &req.device_id, &req.push_token)
        .await
    {
        return store_error_response(err);
    }

    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

async fn update_time_zone(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateTimeZoneRequest>,
) -> impl IntoResponse {
    let Some(time_zone) = normalize_time_zone(&req.time_zone) else {
        return bad_request_response("invalid_time_zone", "Time zone is not a valid IANA name");
    };

    if let Err(err) = state.store.update_time_zone(user.user_id, &time_zone).await {
        return store_error_response(err);
    }

    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

fn hash_token(value: &str) -> Vec<u8> {
    let digest = Sha256::digest(value.as_bytes());
    digest.to_vec()
}

fn generate_secure_token(prefix: &str) -> String {
    format!(
        "{prefix}_{}_{}",
        Uuid::new_v4().as_simple(),
        Uuid::new_v4().as_simple()
    )
}

fn bad_request_response(code: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: ErrorBody {
                code: "unauthorized".to_string(),
                message: "Missing or invalid bearer token".to_string(),
            },
        }),
    )
        .into_response()
}

fn store_error_response(err: StoreError) -> Response {
    error!("database operation failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: ErrorBody {
                code: "internal_error".to_string(),
                message: "Unexpected server error".to_string(),
            },
        }),
    )
        .into_response()
}

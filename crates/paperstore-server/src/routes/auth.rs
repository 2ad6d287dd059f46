//! Google Drive authorization through the OAuth2 device flow.
//!
//! `POST /auth/drive/device` starts a flow and returns a session id with
//! the user code; the client then polls `GET /auth/drive/device/{session}`
//! until the status is no longer `pending`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use paperstore::storage::auth::{
    AuthorizationStatus, AuthorizationStatusResponse, PollOutcome,
};
use paperstore::storage::DriveTokenProvider;
use paperstore::AuthError;

use crate::error::ApiError;
use crate::state::{AppState, DeviceSession};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/drive/device", post(start_device_flow))
        .route("/auth/drive/device/{session}", get(poll_device_flow))
}

#[derive(Debug, Serialize)]
struct DeviceFlowStarted {
    session: String,
    user_code: String,
    verification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_uri_complete: Option<String>,
    expires_in: u64,
    interval: u64,
}

fn drive_auth(state: &AppState) -> Result<&Arc<DriveTokenProvider>, ApiError> {
    state
        .drive_auth
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Drive storage is not configured".to_string()))
}

fn status(status: AuthorizationStatus, message: &str) -> Json<AuthorizationStatusResponse> {
    Json(AuthorizationStatusResponse {
        status,
        message: message.to_string(),
    })
}

async fn start_device_flow(
    State(state): State<AppState>,
) -> Result<Json<DeviceFlowStarted>, ApiError> {
    let provider = drive_auth(&state)?;
    let code = provider
        .device_flow()
        .request_device_code(provider.client_id().expose_secret())
        .await?;

    let session = uuid::Uuid::new_v4().to_string();
    state.device_sessions.insert(
        session.clone(),
        Arc::new(DeviceSession {
            device_code: SecretString::from(code.device_code.clone()),
            expires_at: Utc::now() + chrono::Duration::seconds(code.expires_in as i64),
        }),
    );
    tracing::info!(session = %session, "Started Drive device authorization");

    Ok(Json(DeviceFlowStarted {
        session,
        user_code: code.user_code,
        verification_uri: code.verification_uri,
        verification_uri_complete: code.verification_uri_complete,
        expires_in: code.expires_in,
        interval: code.interval,
    }))
}

async fn poll_device_flow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<AuthorizationStatusResponse>, ApiError> {
    let provider = drive_auth(&state)?;

    let Some(session) = state.device_sessions.get(&session_id) else {
        // Sessions are dropped once authorized, so a late poll still succeeds.
        if provider.is_authorized()? {
            return Ok(status(AuthorizationStatus::Authorized, "Drive access granted"));
        }
        return Err(ApiError::NotFound(format!(
            "No pending authorization '{}'",
            session_id
        )));
    };

    if Utc::now() > session.expires_at {
        state.device_sessions.invalidate(&session_id);
        return Ok(status(
            AuthorizationStatus::Expired,
            "Device code expired, please start again",
        ));
    }

    let outcome = provider
        .device_flow()
        .poll_token_once(
            session.device_code.expose_secret(),
            provider.client_id().expose_secret(),
            provider.client_secret().expose_secret(),
        )
        .await;

    match outcome {
        Ok(PollOutcome::Pending) | Ok(PollOutcome::SlowDown) => Ok(status(
            AuthorizationStatus::Pending,
            "Waiting for the user to approve access",
        )),
        Ok(PollOutcome::Authorized(token)) => {
            provider.store_token(&token)?;
            state.device_sessions.invalidate(&session_id);
            Ok(status(AuthorizationStatus::Authorized, "Drive access granted"))
        }
        Err(AuthError::Expired) => {
            state.device_sessions.invalidate(&session_id);
            Ok(status(
                AuthorizationStatus::Expired,
                "Device code expired, please start again",
            ))
        }
        Err(AuthError::Denied) => {
            state.device_sessions.invalidate(&session_id);
            Ok(status(AuthorizationStatus::Error, "Access was denied"))
        }
        Err(e) => Ok(Json(AuthorizationStatusResponse {
            status: AuthorizationStatus::Error,
            message: e.to_string(),
        })),
    }
}

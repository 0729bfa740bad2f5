//! Mail push intake.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{PushEnvelope, PushResponse, WatchedMailboxesResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::mail::MailPush;

/// `POST /mail/notify`: receive a mail push notification.
///
/// Pushes for unwatched mailboxes and stale history ids are acknowledged
/// with 200 so the broker does not redeliver them.
///
/// # Errors
///
/// Returns [`GatewayError::MailWatch`] if the payload cannot be decoded.
#[utoipa::path(
    post,
    path = "/api/v1/mail/notify",
    tag = "Mail",
    summary = "Mail push notification",
    request_body = PushEnvelope,
    responses(
        (status = 200, description = "Push accepted", body = PushResponse),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
    )
)]
pub async fn notify(
    State(state): State<AppState>,
    Json(envelope): Json<PushEnvelope>,
) -> Result<impl IntoResponse, GatewayError> {
    let push = MailPush::from_base64(&envelope.message.data)?;
    tracing::debug!(
        message_id = envelope.message.message_id.as_deref().unwrap_or("-"),
        subscription = envelope.subscription.as_deref().unwrap_or("-"),
        mailbox = %push.email_address,
        "mail push received"
    );
    let outcome = state.mail_watch.notify(&push);
    Ok(Json(PushResponse {
        mailbox: push.email_address,
        history_id: push.history_id,
        outcome: PushResponse::outcome_name(outcome),
    }))
}

/// `GET /mail/watched`: list watched mailboxes.
#[utoipa::path(
    get,
    path = "/api/v1/mail/watched",
    tag = "Mail",
    summary = "List watched mailboxes",
    responses(
        (status = 200, description = "Watched mailboxes", body = WatchedMailboxesResponse),
    )
)]
pub async fn watched(State(state): State<AppState>) -> impl IntoResponse {
    Json(WatchedMailboxesResponse {
        mailboxes: state.mail_watch.watched(),
    })
}

/// Mail routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mail/notify", post(notify))
        .route("/mail/watched", get(watched))
}

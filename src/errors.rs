use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::SessionStatus;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move session from {from} to {to}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Why a chat turn could not complete normally. Each kind carries its own
/// patient-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("could not extract name and symptoms")]
    Extraction,

    #[error("completion provider failed: {0}")]
    Completion(String),

    #[error("calendar provider failed: {0}")]
    Calendar(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub const CLARIFY_REPLY: &str = "Не удалось распознать имя и симптомы. \
    Пожалуйста, сформулируйте так: 'Меня зовут [Имя], у меня [симптомы]'.";
pub const RETRY_REPLY: &str = "Произошла ошибка. Попробуйте еще раз.";
pub const CALENDAR_FAILED_REPLY: &str = "Не удалось создать запись. Попробуйте позже.";

impl BookingError {
    pub fn user_message(&self) -> &'static str {
        match self {
            BookingError::Extraction => CLARIFY_REPLY,
            BookingError::Completion(_) => RETRY_REPLY,
            BookingError::Calendar(_) => CALENDAR_FAILED_REPLY,
            BookingError::Transition(_) => RETRY_REPLY,
        }
    }
}

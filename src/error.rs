//! Error taxonomy shared by HTTP and WebSocket handlers.
//!
//! Every error is recovered at the boundary of the action that raised it and turned
//! into a `{ "error": kind, "message": text }` reply; none of them stop the server.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use thiserror::Error;

use crate::feedback::FeedbackError;
use crate::protocol::ErrorOut;

#[derive(Debug, Error)]
pub enum AppError {
    /// A required field is empty or out of range.
    #[error("{0}")]
    Validation(String),

    #[error("API key is not set.")]
    CredentialMissing,

    /// Network, auth, quota or malformed-response failure from the model API.
    #[error("{0}")]
    Collaborator(String),

    /// Undecodable image payload or a failed transcription.
    #[error("{0}")]
    Extraction(String),

    #[error("Unknown session: {0}")]
    SessionNotFound(String),

    #[error("Answer {0} is not the current answer.")]
    AnswerNotFound(String),

    /// A newer request replaced the one this result belongs to.
    #[error("Result discarded: superseded by a newer request (generation {0}).")]
    Superseded(u64),

    #[error("{0}")]
    Busy(&'static str),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::CredentialMissing => "credential_missing",
            AppError::Collaborator(_) => "collaborator",
            AppError::Extraction(_) => "extraction",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::AnswerNotFound(_) => "answer_not_found",
            AppError::Superseded(_) => "superseded",
            AppError::Busy(_) => "busy",
            AppError::Feedback(FeedbackError::EmptyDraft) => "validation",
            AppError::Feedback(_) => "feedback",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::CredentialMissing => StatusCode::PRECONDITION_FAILED,
            AppError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            AppError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SessionNotFound(_) | AppError::AnswerNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Superseded(_) | AppError::Busy(_) => StatusCode::CONFLICT,
            AppError::Feedback(FeedbackError::EmptyDraft) => StatusCode::BAD_REQUEST,
            AppError::Feedback(_) => StatusCode::CONFLICT,
        }
    }

    pub fn to_out(&self) -> ErrorOut {
        ErrorOut {
            error: self.kind(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_out())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_draft_is_reported_as_validation() {
        let e = AppError::from(FeedbackError::EmptyDraft);
        assert_eq!(e.kind(), "validation");
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "Accepted code cannot be empty.");
    }

    #[test]
    fn collaborator_message_passes_through() {
        let e = AppError::Collaborator("OpenAI HTTP 401: Incorrect API key provided".into());
        let out = e.to_out();
        assert_eq!(out.error, "collaborator");
        assert_eq!(out.message, "OpenAI HTTP 401: Incorrect API key provided");
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
    }
}

//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::logic::*;
use crate::markdown::segment;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, has_api_key: state.has_collaborator().await })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_options(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(options_out(&state.config))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_credential(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CredentialIn>,
) -> Result<Json<HealthOut>, AppError> {
  state.install_api_key(&body.api_key).await?;
  Ok(Json(HealthOut { ok: true, has_api_key: true }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let session_id = state.open_session().await;
  Json(SessionOut { session_id })
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  if !state.close_session(&session_id).await {
    return Err(AppError::SessionNotFound(session_id));
  }
  Ok(Json(SessionOut { session_id }))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, problem_len = body.problem.problem.len()))]
pub async fn http_post_solve(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SolveIn>,
) -> Result<Json<AnswerOut>, AppError> {
  let answer = solve(&state, &body.session_id, body.problem.into_input()).await?;
  info!(target: "solve", answer_id = %answer.id, generation = answer.generation, "HTTP answer served");
  Ok(Json(answer_out(&answer)))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, answer_id = %body.answer_id, verdict = ?body.verdict))]
pub async fn http_post_feedback(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FeedbackIn>,
) -> Result<Json<FeedbackReplyOut>, AppError> {
  let feedback = mark_feedback(&state, &body.session_id, &body.answer_id, body.verdict).await?;
  Ok(Json(FeedbackReplyOut { answer_id: body.answer_id, feedback: feedback_out(&feedback) }))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, answer_id = %body.answer_id, accepted_len = body.accepted_code.len()))]
pub async fn http_post_correction(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CorrectionIn>,
) -> Result<Json<FeedbackReplyOut>, AppError> {
  let feedback = submit_correction(&state, &body.session_id, &body.answer_id, &body.accepted_code).await?;
  info!(target: "feedback", answer_id = %body.answer_id, state = %feedback.state(), "HTTP correction served");
  Ok(Json(FeedbackReplyOut { answer_id: body.answer_id, feedback: feedback_out(&feedback) }))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, image_len = body.image.len()))]
pub async fn http_post_extract(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExtractIn>,
) -> Result<Json<ExtractOut>, AppError> {
  let out = extract_image(&state, &body.session_id, &body.image, body.mime.as_deref(), &body.current_problem).await?;
  Ok(Json(ExtractOut { text: out.text, problem: out.problem }))
}

#[instrument(level = "info", skip(body), fields(content_len = body.content.len()))]
pub async fn http_post_render(Json(body): Json<RenderIn>) -> impl IntoResponse {
  Json(RenderOut { blocks: segment(&body.content) })
}

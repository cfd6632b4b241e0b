//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Identity comes from the `x-user-*` headers set by the auth layer in front.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::HeaderMap, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::domain::UserRecord;
use crate::error::ApiError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::health(&state).await)
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_level(
  State(state): State<Arc<AppState>>,
  Path(level): Path<String>,
  headers: HeaderMap,
) -> Result<Json<LevelOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  let out = logic::level_view(&state, &level, identity.as_ref()).await?;
  info!(target: "quizify_backend", %level, locked = out.locked, questions = out.questions.len(), "HTTP level served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  headers: HeaderMap,
) -> Result<Json<QuestionOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  Ok(Json(logic::question_view(&state, &id, identity.as_ref()).await?))
}

#[instrument(level = "info", skip(state, body), fields(code_len = body.code.len()))]
pub async fn http_post_run(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<CodeIn>,
) -> Result<Json<RunOut>, ApiError> {
  Ok(Json(logic::run_code(&state, &id, &body.code).await?))
}

#[instrument(level = "info", skip(state, headers, body), fields(code_len = body.code.len()))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  headers: HeaderMap,
  Json(body): Json<CodeIn>,
) -> Result<Json<SubmitOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  let out = logic::submit_code(&state, &id, &body.code, identity.as_ref()).await?;
  info!(target: "grading", question_id = %id, all_passed = out.submission.all_passed, persisted = ?out.persisted, "HTTP submission graded");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_post_revise(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  headers: HeaderMap,
) -> Result<Json<ReviseOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  Ok(Json(logic::toggle(&state, &id, identity.as_ref()).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<MeOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  Ok(Json(logic::me(&state, identity.as_ref()).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_revise(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<ReviseListOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  Ok(Json(logic::revise_view(&state, identity.as_ref()).await?))
}

#[instrument(level = "info", skip(state, body), fields(code_len = body.code.len()))]
pub async fn http_post_playground(State(state): State<Arc<AppState>>, Json(body): Json<CodeIn>) -> impl IntoResponse {
  Json(logic::playground(&state, &body.code).await)
}

#[instrument(level = "info", skip(state, headers, body))]
pub async fn http_post_sync(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<ProfileIn>,
) -> Result<Json<UserRecord>, ApiError> {
  let identity = Identity::from_headers(&headers);
  Ok(Json(logic::sync_profile(&state, identity.as_ref(), body).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_students(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<StudentsOut>, ApiError> {
  let identity = Identity::from_headers(&headers);
  Ok(Json(logic::admin_students(&state, identity.as_ref()).await?))
}

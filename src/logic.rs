//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Handlers resolve the caller identity and request body, then call in here.
//! Everything returns `Result<_, ApiError>` so both transports map failures
//! the same way.

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::domain::{Level, Question, UserRecord};
use crate::error::ApiError;
use crate::grading::{grade_submission, run_playground, run_sample, PlaygroundRun};
use crate::progress::{self, Profile};
use crate::protocol::{
  to_out, to_summary, HealthOut, Identity, LevelOut, MeOut, ProfileIn, QuestionOut, ReviseListOut, ReviseOut, RunOut,
  StudentsOut, SubmitOut, NO_TESTS_MESSAGE,
};
use crate::state::AppState;

fn require(identity: Option<&Identity>) -> Result<&Identity, ApiError> {
  identity.ok_or(ApiError::Unauthenticated)
}

async fn question_or_404(state: &AppState, id: &str) -> Result<Question, ApiError> {
  state.store.question(id).await.ok_or_else(|| ApiError::UnknownQuestion(id.to_string()))
}

async fn record_of(state: &AppState, identity: Option<&Identity>) -> Option<UserRecord> {
  match identity {
    Some(id) => state.store.user(&id.uid).await,
    None => None,
  }
}

pub async fn health(state: &AppState) -> HealthOut {
  let version = state.runtime.version().map(str::to_string);
  HealthOut {
    ok: true,
    runtime: state.runtime.backend_name(),
    runtime_ready: version.is_some(),
    version,
    questions: state.store.question_count().await,
    persistent: state.store.is_persistent(),
  }
}

#[instrument(level = "info", skip(state, identity), fields(%level))]
pub async fn level_view(state: &AppState, level: &str, identity: Option<&Identity>) -> Result<LevelOut, ApiError> {
  let level: Level = level.parse().map_err(|_| ApiError::UnknownLevel(level.to_string()))?;
  let rec = record_of(state, identity).await;

  let (locked, requires) = match level.previous() {
    Some(prev) => {
      let prev_ids: Vec<String> = state.store.questions_by_level(prev).await.into_iter().map(|q| q.id).collect();
      let locked = progress::level_locked(&prev_ids, rec.as_ref());
      (locked, locked.then_some(prev))
    }
    None => (false, None),
  };

  let questions = state
    .store
    .questions_by_level(level)
    .await
    .iter()
    .map(|q| to_summary(q, rec.as_ref()))
    .collect();
  Ok(LevelOut { level, locked, requires, questions })
}

#[instrument(level = "info", skip(state, identity), fields(%question_id))]
pub async fn question_view(state: &AppState, question_id: &str, identity: Option<&Identity>) -> Result<QuestionOut, ApiError> {
  let question = question_or_404(state, question_id).await?;
  let rec = record_of(state, identity).await;
  let all = state.store.all_questions().await;
  let nav = progress::navigation(&question, &all, rec.as_ref());
  Ok(to_out(&question, rec.as_ref(), nav))
}

/// Run only the first case. Never persists.
#[instrument(level = "info", skip(state, code), fields(%question_id, code_len = code.len()))]
pub async fn run_code(state: &AppState, question_id: &str, code: &str) -> Result<RunOut, ApiError> {
  let question = question_or_404(state, question_id).await?;
  let sample = run_sample(&state.runtime, &question, code).await?;
  let output = match &sample {
    Some(run) => run.output.clone(),
    None => NO_TESTS_MESSAGE.to_string(),
  };
  Ok(RunOut { question_id: question.id, sample, output })
}

/// Grade every case; on a full pass by an identified caller, record the solve.
/// A failed write is reported as `persisted: false` instead of failing the
/// grading result.
#[instrument(level = "info", skip(state, code, identity), fields(%question_id, code_len = code.len(), uid = identity.map(|i| i.uid.as_str())))]
pub async fn submit_code(
  state: &AppState,
  question_id: &str,
  code: &str,
  identity: Option<&Identity>,
) -> Result<SubmitOut, ApiError> {
  let question = question_or_404(state, question_id).await?;
  let submission = grade_submission(&state.runtime, &question, code).await?;

  let previously_solved = record_of(state, identity).await.map(|r| r.is_solved(&question.id)).unwrap_or(false);
  let (solved, persisted) = match identity {
    Some(id) if submission.all_passed => match progress::record_solve(&state.store, &id.uid, &question.id, Utc::now()).await {
      Ok(_) => (true, Some(true)),
      Err(e) => {
        error!(target: "progress", uid = %id.uid, question_id = %question.id, error = %e, "Failed to persist solve");
        (true, Some(false))
      }
    },
    _ => (previously_solved || submission.all_passed, None),
  };

  Ok(SubmitOut { submission, solved, persisted })
}

#[instrument(level = "info", skip(state, identity), fields(%question_id))]
pub async fn toggle(state: &AppState, question_id: &str, identity: Option<&Identity>) -> Result<ReviseOut, ApiError> {
  let id = require(identity)?;
  let question = question_or_404(state, question_id).await?;
  let flagged = progress::toggle_revise(&state.store, &id.uid, &question.id).await?;
  Ok(ReviseOut { question_id: question.id, flagged })
}

/// Caller record and stats. The record is created from the identity headers
/// on first sight.
#[instrument(level = "info", skip(state, identity))]
pub async fn me(state: &AppState, identity: Option<&Identity>) -> Result<MeOut, ApiError> {
  let id = require(identity)?;
  let user = match state.store.user(&id.uid).await {
    Some(rec) => rec,
    None => {
      info!(target: "progress", uid = %id.uid, "First sign-in; creating user record");
      progress::sync_profile(&state.store, &id.uid, profile_of(id)).await?
    }
  };
  let questions = state.store.all_questions().await;
  let stats = progress::stats(&user, &questions, Utc::now().date_naive());
  Ok(MeOut { user, stats })
}

#[instrument(level = "info", skip(state, identity))]
pub async fn revise_view(state: &AppState, identity: Option<&Identity>) -> Result<ReviseListOut, ApiError> {
  let id = require(identity)?;
  let Some(rec) = state.store.user(&id.uid).await else { return Ok(ReviseListOut { questions: Vec::new() }) };
  let all = state.store.all_questions().await;
  let questions = progress::revise_list(&rec, &all).into_iter().map(|q| to_summary(q, Some(&rec))).collect();
  Ok(ReviseListOut { questions })
}

pub async fn playground(state: &AppState, code: &str) -> PlaygroundRun {
  run_playground(&state.runtime, code).await
}

fn profile_of(id: &Identity) -> Profile {
  Profile { email: id.email.clone(), display_name: id.display_name.clone(), photo_url: id.photo_url.clone() }
}

/// Merge profile fields; body fields win over identity headers.
#[instrument(level = "info", skip(state, identity, body))]
pub async fn sync_profile(state: &AppState, identity: Option<&Identity>, body: ProfileIn) -> Result<UserRecord, ApiError> {
  let id = require(identity)?;
  let from_headers = profile_of(id);
  let profile = Profile {
    email: body.email.or(from_headers.email),
    display_name: body.display_name.or(from_headers.display_name),
    photo_url: body.photo_url.or(from_headers.photo_url),
  };
  Ok(progress::sync_profile(&state.store, &id.uid, profile).await?)
}

#[instrument(level = "info", skip(state, identity))]
pub async fn admin_students(state: &AppState, identity: Option<&Identity>) -> Result<StudentsOut, ApiError> {
  let id = require(identity)?;
  let email = match &id.email {
    Some(e) => e.clone(),
    None => state.store.user(&id.uid).await.map(|r| r.email).unwrap_or_default(),
  };
  if !state.config.is_admin(&email) {
    warn!(target: "quizify_backend", uid = %id.uid, "Non-admin requested the student roster");
    return Err(ApiError::Forbidden);
  }
  let users = state.store.users().await;
  let questions = state.store.all_questions().await;
  let students = progress::admin_roster(&users, &questions, Utc::now());
  info!(target: "quizify_backend", students = students.len(), "Admin roster served");
  Ok(StudentsOut { students })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::testing::{adder_state, identity, sum_question};
  use crate::store::DocumentStore;

  #[tokio::test]
  async fn passing_submission_persists_solve() {
    let store = DocumentStore::in_memory();
    store.put_questions(vec![sum_question("easy-1")]).await.unwrap();
    let state = adder_state(store);
    let out = submit_code(&state, "easy-1", "src", Some(&identity("u1"))).await.unwrap();
    assert!(out.submission.all_passed);
    assert_eq!((out.solved, out.persisted), (true, Some(true)));
    assert!(state.store.user("u1").await.unwrap().is_solved("easy-1"));
  }

  #[tokio::test]
  async fn failed_write_still_returns_the_grade() {
    // The snapshot directory does not exist, so every write fails after the
    // in-memory update.
    let path = std::env::temp_dir().join(format!("quizify-missing-{}", uuid::Uuid::new_v4())).join("store.json");
    let store = DocumentStore::open(&path).await.unwrap();
    assert!(store.put_questions(vec![sum_question("easy-1")]).await.is_err());
    let state = adder_state(store);

    let out = submit_code(&state, "easy-1", "src", Some(&identity("u1"))).await.unwrap();
    assert!(out.submission.all_passed);
    assert!(out.solved);
    assert_eq!(out.persisted, Some(false));
  }

  #[tokio::test]
  async fn anonymous_pass_is_not_persisted() {
    let store = DocumentStore::in_memory();
    store.put_questions(vec![sum_question("easy-1")]).await.unwrap();
    let state = adder_state(store);
    let out = submit_code(&state, "easy-1", "src", None).await.unwrap();
    assert_eq!((out.solved, out.persisted), (true, None));
    assert!(state.store.users().await.is_empty());
  }
}

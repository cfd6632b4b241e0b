//! Progress recording (solved/revise flags, profile fields) and the views
//! derived from user records: stats and streaks, level locks, question
//! navigation, the revise list and the admin roster.

use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::{Level, Question, UserRecord};
use crate::store::{DocumentStore, StoreError, UserPatch};

pub const NO_SOLVES_TITLE: &str = "No problems solved yet";
pub const ANONYMOUS: &str = "Anonymous";

// -------- writes --------

/// Merge `solved[id]=true`, `last_solved`, `solved_at[id]` into the record.
#[instrument(level = "info", skip(store), fields(%uid, %question_id))]
pub async fn record_solve(
  store: &DocumentStore,
  uid: &str,
  question_id: &str,
  now: DateTime<Utc>,
) -> Result<UserRecord, StoreError> {
  let patch = UserPatch {
    solved: vec![(question_id.to_string(), true)],
    solved_at: vec![(question_id.to_string(), now.timestamp_millis())],
    last_solved: Some(now.to_rfc3339()),
    ..Default::default()
  };
  let rec = store.merge_user(uid, patch).await?;
  info!(target: "progress", %uid, %question_id, total_solved = rec.solved_ids().count(), "Recorded solve");
  Ok(rec)
}

/// Flip the revise flag (absent counts as false). Returns the new value.
#[instrument(level = "info", skip(store), fields(%uid, %question_id))]
pub async fn toggle_revise(store: &DocumentStore, uid: &str, question_id: &str) -> Result<bool, StoreError> {
  let flagged = store
    .update_user(uid, |rec| {
      let next = !rec.is_flagged(question_id);
      rec.revise.insert(question_id.to_string(), next);
      next
    })
    .await?;
  info!(target: "progress", %uid, %question_id, flagged, "Toggled revise flag");
  Ok(flagged)
}

/// Profile fields as handed over by the identity provider.
#[derive(Clone, Debug, Default)]
pub struct Profile {
  pub email: Option<String>,
  pub display_name: Option<String>,
  pub photo_url: Option<String>,
}

#[instrument(level = "info", skip(store, profile), fields(%uid))]
pub async fn sync_profile(store: &DocumentStore, uid: &str, profile: Profile) -> Result<UserRecord, StoreError> {
  let patch = UserPatch {
    email: profile.email,
    display_name: profile.display_name,
    photo_url: profile.photo_url,
    ..Default::default()
  };
  store.merge_user(uid, patch).await
}

// -------- views --------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserStats {
  pub total_solved: usize,
  pub easy_solved: usize,
  pub medium_solved: usize,
  pub hard_solved: usize,
  pub streak: u32,
  pub last_solved: Option<String>,
  pub last_solved_id: Option<String>,
  pub last_solved_title: String,
}

/// Consecutive UTC days with at least one solve, ending today. Zero when
/// nothing was solved today.
pub fn streak(solved_at: impl IntoIterator<Item = i64>, today: NaiveDate) -> u32 {
  let days: BTreeSet<NaiveDate> = solved_at
    .into_iter()
    .filter_map(DateTime::<Utc>::from_timestamp_millis)
    .map(|t| t.date_naive())
    .collect();
  let mut count = 0;
  let mut day = today;
  while days.contains(&day) {
    count += 1;
    match day.checked_sub_days(Days::new(1)) {
      Some(prev) => day = prev,
      None => break,
    }
  }
  count
}

pub fn stats(rec: &UserRecord, questions: &[Question], today: NaiveDate) -> UserStats {
  let count = |level: Level| rec.solved_ids().filter(|id| id.starts_with(level.as_str())).count();
  let (easy_solved, medium_solved, hard_solved) = (count(Level::Easy), count(Level::Medium), count(Level::Hard));

  let last_solved_id = rec
    .solved_ids()
    .max_by(|a, b| {
      let ta = rec.solved_at.get(*a).copied().unwrap_or(0);
      let tb = rec.solved_at.get(*b).copied().unwrap_or(0);
      ta.cmp(&tb).then_with(|| b.cmp(a))
    })
    .map(str::to_string);
  let last_solved_title = match &last_solved_id {
    Some(id) => questions
      .iter()
      .find(|q| &q.id == id)
      .map(|q| q.display_title().to_string())
      .unwrap_or_else(|| id.clone()),
    None => NO_SOLVES_TITLE.to_string(),
  };

  UserStats {
    total_solved: easy_solved + medium_solved + hard_solved,
    easy_solved,
    medium_solved,
    hard_solved,
    streak: streak(rec.solved_at.values().copied(), today),
    last_solved: rec.last_solved.clone(),
    last_solved_id,
    last_solved_title,
  }
}

/// A level is locked while any question of the previous level is unsolved.
pub fn level_locked(previous_level_ids: &[String], rec: Option<&UserRecord>) -> bool {
  !previous_level_ids.iter().all(|id| rec.map(|r| r.is_solved(id)).unwrap_or(false))
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Navigation {
  pub prev: Option<String>,
  pub next: Option<String>,
  pub is_last_in_level: bool,
  /// Next is disabled: nowhere to go, or the level is not fully solved yet.
  pub next_blocked: bool,
}

/// Prev/next across levels. `all` must be sorted by id (store order).
pub fn navigation(question: &Question, all: &[Question], rec: Option<&UserRecord>) -> Navigation {
  fn ids_of(all: &[Question], level: Level) -> Vec<&str> {
    all.iter().filter(|q| q.level == level).map(|q| q.id.as_str()).collect()
  }
  let ids = ids_of(all, question.level);
  let Some(idx) = ids.iter().position(|id| *id == question.id) else { return Navigation::default() };

  let prev = if idx > 0 {
    Some(ids[idx - 1].to_string())
  } else {
    question.level.previous().and_then(|l| ids_of(all, l).last().map(|s| s.to_string()))
  };
  let next = if idx + 1 < ids.len() {
    Some(ids[idx + 1].to_string())
  } else {
    question.level.next().and_then(|l| ids_of(all, l).first().map(|s| s.to_string()))
  };

  let is_last_in_level = idx + 1 == ids.len();
  let level_solved = ids.iter().all(|id| rec.map(|r| r.is_solved(id)).unwrap_or(false));
  Navigation { next_blocked: next.is_none() || (is_last_in_level && !level_solved), prev, next, is_last_in_level }
}

/// Flagged questions in store order.
pub fn revise_list<'a>(rec: &UserRecord, all: &'a [Question]) -> Vec<&'a Question> {
  all.iter().filter(|q| rec.is_flagged(&q.id)).collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StudentProgress {
  pub uid: String,
  pub email: String,
  pub display_name: String,
  pub photo_url: String,
  #[serde(flatten)]
  pub stats: UserStats,
  pub last_active: String,
}

/// Every user with stats, most solved first.
pub fn admin_roster(users: &[UserRecord], questions: &[Question], now: DateTime<Utc>) -> Vec<StudentProgress> {
  let today = now.date_naive();
  let mut roster: Vec<StudentProgress> = users
    .iter()
    .map(|u| StudentProgress {
      uid: u.uid.clone(),
      email: u.email.clone(),
      display_name: if u.display_name.is_empty() { ANONYMOUS.to_string() } else { u.display_name.clone() },
      photo_url: u.photo_url.clone(),
      stats: stats(u, questions, today),
      last_active: u
        .last_solved
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
        .to_rfc3339(),
    })
    .collect();
  roster.sort_by(|a, b| b.stats.total_solved.cmp(&a.stats.total_solved).then_with(|| a.uid.cmp(&b.uid)));
  roster
}

//! Document store: the `questions` and `users` collections.
//!
//! Both collections live in memory behind async `RwLock`s. When a snapshot
//! path is configured every write is followed by a full JSON snapshot
//! (written to a temp file, then renamed into place). A failed snapshot
//! leaves the in-memory write applied and reports the error to the caller.
//!
//! User writes are field merges: a write only touches the keys it names.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use crate::domain::{Level, Question, UserRecord};

#[derive(Debug)]
pub enum StoreError {
  Io(std::io::Error),
  Json(serde_json::Error),
}

impl fmt::Display for StoreError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StoreError::Io(e) => write!(f, "store I/O failed: {e}"),
      StoreError::Json(e) => write!(f, "store snapshot is not valid JSON: {e}"),
    }
  }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
  fn from(e: std::io::Error) -> Self { StoreError::Io(e) }
}

impl From<serde_json::Error> for StoreError {
  fn from(e: serde_json::Error) -> Self { StoreError::Json(e) }
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
  #[serde(default)] questions: Vec<Question>,
  #[serde(default)] users: Vec<UserRecord>,
}

/// Partial user update. `None`/empty fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
  pub email: Option<String>,
  pub display_name: Option<String>,
  pub photo_url: Option<String>,
  pub solved: Vec<(String, bool)>,
  pub revise: Vec<(String, bool)>,
  pub solved_at: Vec<(String, i64)>,
  pub last_solved: Option<String>,
}

impl UserPatch {
  pub fn apply(self, rec: &mut UserRecord) {
    if let Some(v) = self.email { rec.email = v; }
    if let Some(v) = self.display_name { rec.display_name = v; }
    if let Some(v) = self.photo_url { rec.photo_url = v; }
    rec.solved.extend(self.solved);
    rec.revise.extend(self.revise);
    rec.solved_at.extend(self.solved_at);
    if let Some(v) = self.last_solved { rec.last_solved = Some(v); }
  }
}

pub struct DocumentStore {
  // BTreeMap keeps ids sorted, which is the level ordering.
  questions: RwLock<BTreeMap<String, Question>>,
  users: RwLock<HashMap<String, UserRecord>>,
  snapshot_path: Option<PathBuf>,
  snapshot_lock: Mutex<()>,
}

impl DocumentStore {
  pub fn in_memory() -> Self {
    Self {
      questions: RwLock::new(BTreeMap::new()),
      users: RwLock::new(HashMap::new()),
      snapshot_path: None,
      snapshot_lock: Mutex::new(()),
    }
  }

  /// Open a store backed by `path`. A missing file starts an empty store.
  #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let path = path.as_ref().to_path_buf();
    let snapshot = match tokio::fs::read_to_string(&path).await {
      Ok(text) => serde_json::from_str::<Snapshot>(&text)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        info!(target: "store", "No snapshot yet; starting empty");
        Snapshot::default()
      }
      Err(e) => return Err(e.into()),
    };
    info!(target: "store", questions = snapshot.questions.len(), users = snapshot.users.len(), "Loaded snapshot");
    Ok(Self {
      questions: RwLock::new(snapshot.questions.into_iter().map(|q| (q.id.clone(), q)).collect()),
      users: RwLock::new(snapshot.users.into_iter().map(|u| (u.uid.clone(), u)).collect()),
      snapshot_path: Some(path),
      snapshot_lock: Mutex::new(()),
    })
  }

  pub fn is_persistent(&self) -> bool {
    self.snapshot_path.is_some()
  }

  // -------- questions --------

  /// Batch write: each question replaces any existing one with the same id.
  #[instrument(level = "info", skip_all, fields(count = questions.len()))]
  pub async fn put_questions(&self, questions: Vec<Question>) -> Result<usize, StoreError> {
    let n = questions.len();
    {
      let mut map = self.questions.write().await;
      for q in questions {
        map.insert(q.id.clone(), q);
      }
    }
    self.persist().await?;
    Ok(n)
  }

  pub async fn question(&self, id: &str) -> Option<Question> {
    self.questions.read().await.get(id).cloned()
  }

  pub async fn question_count(&self) -> usize {
    self.questions.read().await.len()
  }

  /// Questions of one level, ordered by id.
  pub async fn questions_by_level(&self, level: Level) -> Vec<Question> {
    self.questions.read().await.values().filter(|q| q.level == level).cloned().collect()
  }

  pub async fn all_questions(&self) -> Vec<Question> {
    self.questions.read().await.values().cloned().collect()
  }

  // -------- users --------

  pub async fn user(&self, uid: &str) -> Option<UserRecord> {
    self.users.read().await.get(uid).cloned()
  }

  pub async fn users(&self) -> Vec<UserRecord> {
    let mut all: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
    all.sort_by(|a, b| a.uid.cmp(&b.uid));
    all
  }

  /// Read-modify-write on one record under the collection lock. Creates the
  /// record when absent.
  #[instrument(level = "debug", skip(self, f))]
  pub async fn update_user<R>(&self, uid: &str, f: impl FnOnce(&mut UserRecord) -> R) -> Result<R, StoreError> {
    let out = {
      let mut users = self.users.write().await;
      let rec = users.entry(uid.to_string()).or_insert_with(|| {
        debug!(target: "store", %uid, "Creating user record");
        UserRecord::new(uid)
      });
      f(rec)
    };
    self.persist().await?;
    Ok(out)
  }

  /// Additive merge; returns the merged record.
  pub async fn merge_user(&self, uid: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
    self
      .update_user(uid, |rec| {
        patch.apply(rec);
        rec.clone()
      })
      .await
  }

  async fn persist(&self) -> Result<(), StoreError> {
    let Some(path) = &self.snapshot_path else { return Ok(()) };
    let _guard = self.snapshot_lock.lock().await;
    let snapshot = Snapshot {
      questions: self.questions.read().await.values().cloned().collect(),
      users: {
        let mut u: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        u.sort_by(|a, b| a.uid.cmp(&b.uid));
        u
      },
    };
    let body = serde_json::to_vec_pretty(&snapshot)?;
    let tmp = path.with_extension("json.tmp");
    let res = async {
      tokio::fs::write(&tmp, &body).await?;
      tokio::fs::rename(&tmp, path).await
    }
    .await;
    if let Err(e) = &res {
      error!(target: "store", path = %path.display(), error = %e, "Snapshot write failed");
    }
    res.map_err(StoreError::from)
  }
}

//! Seeding tool for the document store.
//!
//!   quizify-seed questions <file.json>   batch-write questions (replace per id)
//!   quizify-seed users <file.json>       merge an identity-provider user export
//!
//! The store file comes from QUIZIFY_DATA_PATH (or the TOML config).

use serde::Deserialize;
use tracing::{info, warn};

use quizify_backend::config::AppConfig;
use quizify_backend::progress::{sync_profile, Profile};
use quizify_backend::seeds::load_questions_file;
use quizify_backend::store::DocumentStore;
use quizify_backend::telemetry;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const USAGE: &str = "usage: quizify-seed <questions|users> <file.json>";

/// One entry of the identity-provider export.
#[derive(Debug, Deserialize)]
struct ExportedUser {
  uid: String,
  #[serde(default)]
  email: Option<String>,
  #[serde(default, rename = "displayName")]
  display_name: Option<String>,
  #[serde(default, rename = "photoURL")]
  photo_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
  telemetry::init_tracing();

  let args: Vec<String> = std::env::args().skip(1).collect();
  let (command, file) = match args.as_slice() {
    [command, file] => (command.as_str(), file.as_str()),
    _ => return Err(USAGE.into()),
  };

  let config = AppConfig::load();
  let Some(data_path) = config.data_path else {
    return Err("QUIZIFY_DATA_PATH must point at the store file".into());
  };
  let store = DocumentStore::open(&data_path).await?;

  match command {
    "questions" => {
      let questions = load_questions_file(file).await?;
      let n = store.put_questions(questions).await?;
      info!(target: "store", count = n, path = %data_path.display(), "Questions seeded");
    }
    "users" => {
      let raw = tokio::fs::read_to_string(file).await?;
      let users: Vec<ExportedUser> = serde_json::from_str(&raw)?;
      let (synced, skipped) = sync_users(&store, users).await?;
      info!(target: "store", synced, skipped, path = %data_path.display(), "Users synced");
    }
    _ => return Err(USAGE.into()),
  }
  Ok(())
}

async fn sync_users(store: &DocumentStore, users: Vec<ExportedUser>) -> Result<(usize, usize), BoxError> {
  let mut synced = 0;
  let mut skipped = 0;
  for user in users {
    let email = user.email.filter(|e| !e.trim().is_empty());
    if email.is_none() {
      warn!(target: "store", uid = %user.uid, "Skipping user without email");
      skipped += 1;
      continue;
    }
    let profile = Profile { email, display_name: user.display_name, photo_url: user.photo_url };
    sync_profile(store, &user.uid, profile).await?;
    synced += 1;
  }
  Ok((synced, skipped))
}

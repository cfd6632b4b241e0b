//! Application state: configuration, document store and the runtime handle.
//!
//! Startup policy for the question collection: a persistent store that
//! already holds questions is left alone; otherwise the configured question
//! file is loaded, falling back to the built-in bank if the file is missing
//! or malformed.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::Level;
use crate::runtime::Runtime;
use crate::seeds::{load_questions_file, seed_questions};
use crate::store::DocumentStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: DocumentStore,
    pub runtime: Runtime,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, store: DocumentStore, runtime: Runtime) -> Self {
        Self { config, store, runtime }
    }

    /// Build state from config: open the store, make sure questions exist,
    /// and construct (but do not yet initialize) the runtime.
    #[instrument(level = "info", skip_all)]
    pub async fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let store = match &config.data_path {
            Some(path) => DocumentStore::open(path).await?,
            None => {
                warn!(target: "quizify_backend", "QUIZIFY_DATA_PATH not set; progress is kept in memory only");
                DocumentStore::in_memory()
            }
        };

        if store.question_count().await == 0 {
            let questions = match &config.questions_path {
                Some(path) => match load_questions_file(path).await {
                    Ok(qs) => qs,
                    Err(e) => {
                        error!(target: "store", path = %path.display(), error = %e, "Question file unusable; using built-in bank");
                        seed_questions()
                    }
                },
                None => seed_questions(),
            };
            store.put_questions(questions).await?;
        }

        for level in Level::ALL {
            let n = store.questions_by_level(level).await.len();
            info!(target: "store", %level, questions = n, "Startup question inventory");
        }

        let runtime = Runtime::from_config(&config.runtime)?;
        info!(
            target: "quizify_backend",
            backend = runtime.backend_name(),
            timeout_ms = runtime.timeout().as_millis() as u64,
            admins = config.admin_emails.len(),
            "Runtime configured (initialized on first use)"
        );

        Ok(Self::new(config, store, runtime))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! State over an in-process runtime whose `solution` adds its integer arguments.

    use std::sync::Arc;

    use super::*;
    use crate::domain::{Question, TestCase};
    use crate::runtime::scripted::{self, Script};

    pub fn sum_question(id: &str) -> Question {
        Question {
            id: id.into(),
            level: Level::Easy,
            prompt: "Add two numbers".into(),
            title: None,
            starter: None,
            hint: None,
            input_format: None,
            entry: None,
            tests: vec![TestCase::Call { args: "2,3".into(), expected: "5".into(), hidden: false }],
        }
    }

    pub fn adder_state(store: DocumentStore) -> AppState {
        let script = Script {
            invoke: Arc::new(|_: &str, _: &str, args: &str| {
                let sum: i64 = args.split(',').filter_map(|a| a.trim().parse::<i64>().ok()).sum();
                Ok(sum.to_string())
            }),
            ..Default::default()
        };
        AppState::new(AppConfig::default(), store, scripted::runtime(script))
    }

    pub fn identity(uid: &str) -> crate::protocol::Identity {
        crate::protocol::Identity { uid: uid.into(), email: None, display_name: None, photo_url: None }
    }
}

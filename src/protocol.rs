//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::domain::{Level, Question, UserRecord};
use crate::grading::{PlaygroundRun, SampleRun, Submission};
use crate::progress::{Navigation, StudentProgress, UserStats};

pub const HEADER_UID: &str = "x-user-id";
pub const HEADER_EMAIL: &str = "x-user-email";
pub const HEADER_NAME: &str = "x-user-name";
pub const HEADER_PHOTO: &str = "x-user-photo";

/// Caller identity as asserted by the upstream auth layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    /// `None` when no (non-empty) `x-user-id` header is present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Some(Self {
            uid: get(HEADER_UID)?,
            email: get(HEADER_EMAIL),
            display_name: get(HEADER_NAME),
            photo_url: get(HEADER_PHOTO),
        })
    }
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Run {
        #[serde(rename = "questionId")]
        question_id: String,
        code: String,
    },
    Submit {
        #[serde(rename = "questionId")]
        question_id: String,
        code: String,
    },
    ToggleRevise {
        #[serde(rename = "questionId")]
        question_id: String,
    },
    Playground {
        code: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    RunResult(RunOut),
    SubmitResult(SubmitOut),
    Revise(ReviseOut),
    Playground(PlaygroundRun),
    Error { message: String },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize, PartialEq)]
pub struct QuestionSummary {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub solved: bool,
    pub flagged: bool,
}

pub fn to_summary(q: &Question, rec: Option<&UserRecord>) -> QuestionSummary {
    QuestionSummary {
        id: q.id.clone(),
        title: q.display_title().to_string(),
        prompt: q.prompt.clone(),
        solved: rec.map(|r| r.is_solved(&q.id)).unwrap_or(false),
        flagged: rec.map(|r| r.is_flagged(&q.id)).unwrap_or(false),
    }
}

#[derive(Debug, Serialize)]
pub struct LevelOut {
    pub level: Level,
    pub locked: bool,
    /// Previous level that must be completed first, when locked.
    pub requires: Option<Level>,
    pub questions: Vec<QuestionSummary>,
}

/// Visible test case as shown under the prompt.
#[derive(Debug, Serialize, PartialEq)]
pub struct VisibleTest {
    pub input: String,
    pub expected: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    pub level: Level,
    pub title: String,
    pub prompt: String,
    pub starter: String,
    pub hint: Option<String>,
    pub input_format: Option<String>,
    pub tests: Vec<VisibleTest>,
    pub hidden_tests: usize,
    pub solved: bool,
    pub flagged: bool,
    pub navigation: Navigation,
}

/// Convert a full `Question` (internal) to the public DTO. Hidden cases are
/// only counted.
pub fn to_out(q: &Question, rec: Option<&UserRecord>, navigation: Navigation) -> QuestionOut {
    let tests = q
        .tests
        .iter()
        .filter(|t| !t.hidden())
        .map(|t| VisibleTest { input: t.input_display().to_string(), expected: t.expected().to_string() })
        .collect();
    QuestionOut {
        id: q.id.clone(),
        level: q.level,
        title: q.display_title().to_string(),
        prompt: q.prompt.clone(),
        starter: q.starter.clone().unwrap_or_default(),
        hint: q.hint.clone(),
        input_format: q.input_format.clone(),
        tests,
        hidden_tests: q.tests.iter().filter(|t| t.hidden()).count(),
        solved: rec.map(|r| r.is_solved(&q.id)).unwrap_or(false),
        flagged: rec.map(|r| r.is_flagged(&q.id)).unwrap_or(false),
        navigation,
    }
}

#[derive(Debug, Deserialize)]
pub struct CodeIn {
    pub code: String,
}

pub const NO_TESTS_MESSAGE: &str = "This question has no test cases yet.";

/// First-case run. `sample` is absent when the question has no cases.
#[derive(Debug, Serialize)]
pub struct RunOut {
    pub question_id: String,
    pub sample: Option<SampleRun>,
    pub output: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitOut {
    #[serde(flatten)]
    pub submission: Submission,
    /// Solved flag after this submission.
    pub solved: bool,
    /// Whether the solve was written; `None` for anonymous or failing submissions.
    pub persisted: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ReviseOut {
    pub question_id: String,
    pub flagged: bool,
}

#[derive(Debug, Serialize)]
pub struct MeOut {
    pub user: UserRecord,
    pub stats: UserStats,
}

#[derive(Debug, Serialize)]
pub struct ReviseListOut {
    pub questions: Vec<QuestionSummary>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProfileIn {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentsOut {
    pub students: Vec<StudentProgress>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub runtime: &'static str,
    pub runtime_ready: bool,
    pub version: Option<String>,
    pub questions: usize,
    pub persistent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_requires_uid_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(Identity::from_headers(&headers), None);
        headers.insert(HEADER_UID, HeaderValue::from_static("  "));
        assert_eq!(Identity::from_headers(&headers), None);
        headers.insert(HEADER_UID, HeaderValue::from_static("abc"));
        headers.insert(HEADER_EMAIL, HeaderValue::from_static("a@b.c"));
        let id = Identity::from_headers(&headers).unwrap();
        assert_eq!(id.uid, "abc");
        assert_eq!(id.email.as_deref(), Some("a@b.c"));
        assert_eq!(id.display_name, None);
    }

    #[test]
    fn client_messages_use_question_id() {
        let msg: ClientWsMessage = serde_json::from_str(r#"{"type":"submit","questionId":"easy-1","code":"x"}"#).unwrap();
        assert!(matches!(msg, ClientWsMessage::Submit { ref question_id, .. } if question_id == "easy-1"));
    }

    #[test]
    fn server_messages_are_tagged_inline() {
        let msg = ServerWsMessage::Revise(ReviseOut { question_id: "hard-100".into(), flagged: true });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, serde_json::json!({ "type": "revise", "question_id": "hard-100", "flagged": true }));
        let pong = serde_json::to_value(&ServerWsMessage::Pong).unwrap();
        assert_eq!(pong, serde_json::json!({ "type": "pong" }));
    }
}

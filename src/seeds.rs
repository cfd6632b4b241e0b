//! Seed data: the built-in question bank and the JSON question-file loader.
//!
//! Question files in the wild come in two older shapes besides the canonical
//! `{"kind": ...}` test case:
//!   - call style:  `{"callArgs": "2, 3", "expected": "5", "hidden": false}`
//!   - stdio style: `{"input": "3\n4", "output": "7", "hidden": true}`
//! Both are normalized into `TestCase` on load.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::domain::{InputSplit, Level, Question, TestCase};

#[derive(Debug)]
pub enum SeedError {
  Io(std::io::Error),
  Json(serde_json::Error),
  Invalid { id: String, reason: String },
}

impl fmt::Display for SeedError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SeedError::Io(e) => write!(f, "cannot read question file: {e}"),
      SeedError::Json(e) => write!(f, "malformed question file: {e}"),
      SeedError::Invalid { id, reason } => write!(f, "question '{id}' is invalid: {reason}"),
    }
  }
}

impl std::error::Error for SeedError {}

impl From<std::io::Error> for SeedError {
  fn from(e: std::io::Error) -> Self { SeedError::Io(e) }
}

impl From<serde_json::Error> for SeedError {
  fn from(e: serde_json::Error) -> Self { SeedError::Json(e) }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedTest {
  Canonical(TestCase),
  LegacyCall {
    #[serde(rename = "callArgs")]
    call_args: String,
    expected: String,
    #[serde(default)]
    hidden: bool,
  },
  LegacyStdio {
    #[serde(default)]
    input: String,
    output: String,
    #[serde(default)]
    hidden: bool,
  },
}

impl From<SeedTest> for TestCase {
  fn from(t: SeedTest) -> Self {
    match t {
      SeedTest::Canonical(tc) => tc,
      SeedTest::LegacyCall { call_args, expected, hidden } => TestCase::Call { args: call_args, expected, hidden },
      SeedTest::LegacyStdio { input, output, hidden } => {
        // Legacy files were written for whitespace-tokenized input.
        TestCase::Stdio { input, expected: output, hidden, split: InputSplit::Tokens }
      }
    }
  }
}

#[derive(Deserialize)]
struct SeedQuestion {
  id: String,
  #[serde(default)] level: Option<String>,
  prompt: String,
  #[serde(default)] title: Option<String>,
  #[serde(default)] starter: Option<String>,
  #[serde(default)] hint: Option<String>,
  #[serde(default)] input_format: Option<String>,
  #[serde(default)] entry: Option<String>,
  #[serde(default)] tests: Vec<SeedTest>,
}

impl TryFrom<SeedQuestion> for Question {
  type Error = SeedError;

  fn try_from(s: SeedQuestion) -> Result<Self, Self::Error> {
    let level = match s.level.as_deref() {
      Some(l) => l.parse::<Level>().map_err(|e| SeedError::Invalid { id: s.id.clone(), reason: e.to_string() })?,
      None => Level::of_question_id(&s.id).ok_or_else(|| SeedError::Invalid {
        id: s.id.clone(),
        reason: "no level and id has no level prefix".into(),
      })?,
    };
    if s.id.trim().is_empty() {
      return Err(SeedError::Invalid { id: s.id, reason: "empty id".into() });
    }
    Ok(Question {
      id: s.id,
      level,
      prompt: s.prompt,
      title: s.title,
      starter: s.starter.filter(|x| !x.is_empty()),
      hint: s.hint.filter(|x| !x.is_empty()),
      input_format: s.input_format.filter(|x| !x.is_empty()),
      entry: s.entry,
      tests: s.tests.into_iter().map(TestCase::from).collect(),
    })
  }
}

/// Parse a questions JSON array (canonical or legacy shapes).
pub fn parse_questions(json: &str) -> Result<Vec<Question>, SeedError> {
  let raw: Vec<SeedQuestion> = serde_json::from_str(json)?;
  raw.into_iter().map(Question::try_from).collect()
}

/// Read and parse a questions file.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_questions_file(path: impl AsRef<Path>) -> Result<Vec<Question>, SeedError> {
  let text = tokio::fs::read_to_string(path.as_ref()).await?;
  let questions = parse_questions(&text)?;
  let without_tests = questions.iter().filter(|q| q.tests.is_empty()).count();
  if without_tests > 0 {
    warn!(target: "store", without_tests, "Some questions have no test cases and can never be solved");
  }
  info!(target: "store", count = questions.len(), "Parsed question file");
  Ok(questions)
}

fn call(args: &str, expected: &str, hidden: bool) -> TestCase {
  TestCase::Call { args: args.into(), expected: expected.into(), hidden }
}

fn stdio(input: &str, expected: &str, hidden: bool) -> TestCase {
  TestCase::Stdio { input: input.into(), expected: expected.into(), hidden, split: InputSplit::Lines }
}

/// Minimal built-in bank so the app is usable without a question file.
pub fn seed_questions() -> Vec<Question> {
  vec![
    Question {
      id: "easy-100".into(),
      level: Level::Easy,
      title: Some("Sum of two numbers".into()),
      prompt: "Read two integers, one per line, and print their sum.".into(),
      starter: Some("a = int(input())\nb = int(input())\n".into()),
      hint: Some("input() returns a string; convert it with int().".into()),
      input_format: Some("Two lines, each holding one integer.".into()),
      entry: None,
      tests: vec![
        stdio("3\n4", "7", false),
        stdio("-2\n2", "0", false),
        stdio("1000000\n1", "1000001", true),
      ],
    },
    Question {
      id: "easy-101".into(),
      level: Level::Easy,
      title: Some("Add".into()),
      prompt: "Write solution(a, b) returning a + b.".into(),
      starter: Some("def solution(a, b):\n    pass\n".into()),
      hint: Some("Use the + operator.".into()),
      input_format: None,
      entry: None,
      tests: vec![
        call("2, 3", "5", false),
        call("-1, 1", "0", false),
        call("10**6, 1", "1000001", true),
      ],
    },
    Question {
      id: "medium-100".into(),
      level: Level::Medium,
      title: Some("Palindrome".into()),
      prompt: "Write solution(s) returning True if s reads the same backwards, ignoring case.".into(),
      starter: Some("def solution(s):\n    pass\n".into()),
      hint: Some("Compare the lowercased string with its reverse s[::-1].".into()),
      input_format: None,
      entry: None,
      tests: vec![
        call("'Level'", "true", false),
        call("'python'", "false", false),
        call("''", "true", true),
      ],
    },
    Question {
      id: "medium-101".into(),
      level: Level::Medium,
      title: Some("Average".into()),
      prompt: "Read a count n, then n numbers (one per line). Print their average.".into(),
      starter: None,
      hint: Some("Accumulate a running total, then divide by n.".into()),
      input_format: Some("First line n, then n lines with one number each.".into()),
      entry: None,
      tests: vec![
        stdio("3\n1\n2\n4", "2.3333", false),
        stdio("1\n5", "5", true),
      ],
    },
    Question {
      id: "hard-100".into(),
      level: Level::Hard,
      title: Some("Fibonacci list".into()),
      prompt: "Write solution(n) returning the first n Fibonacci numbers as a list.".into(),
      starter: Some("def solution(n):\n    pass\n".into()),
      hint: Some("Handle n == 0 and n == 1 before looping.".into()),
      input_format: None,
      entry: None,
      tests: vec![
        call("5", "[0, 1, 1, 2, 3]", false),
        call("0", "[]", true),
        call("1", "[0]", true),
      ],
    },
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn legacy_shapes_are_normalized() {
    let json = r#"[
      {"id":"easy-1","level":"easy","prompt":"p","hint":"","input_format":"",
       "tests":[{"input":"3\n4","output":"7","hidden":false}]},
      {"id":"medium-2","prompt":"q","starter":"def solution(a): pass",
       "tests":[{"callArgs":"1","expected":"2","hidden":true}]},
      {"id":"hard-3","level":"hard","prompt":"r",
       "tests":[{"kind":"call","args":"1","expected":"1"}]}
    ]"#;
    let qs = parse_questions(json).unwrap();
    assert_eq!(qs.len(), 3);
    assert_eq!(
      qs[0].tests[0],
      TestCase::Stdio { input: "3\n4".into(), expected: "7".into(), hidden: false, split: InputSplit::Tokens }
    );
    assert_eq!(qs[0].hint, None);
    assert_eq!(qs[1].level, Level::Medium);
    assert_eq!(qs[1].tests[0], call("1", "2", true));
    assert_eq!(qs[2].tests[0], call("1", "1", false));
  }

  #[test]
  fn legacy_stdio_input_is_tokenized() {
    let json = r#"[{"id":"easy-9","prompt":"sum","tests":[{"input":"3 4","output":"7"}]}]"#;
    let qs = parse_questions(json).unwrap();
    assert_eq!(qs[0].tests[0].stdin_values(), vec!["3", "4"]);
  }

  #[test]
  fn unknown_level_is_rejected() {
    let json = r#"[{"id":"x-1","level":"expert","prompt":"p","tests":[]}]"#;
    match parse_questions(json) {
      Err(SeedError::Invalid { id, .. }) => assert_eq!(id, "x-1"),
      other => panic!("expected invalid, got {other:?}"),
    }
  }

  #[test]
  fn built_in_bank_covers_every_level() {
    let qs = seed_questions();
    for level in Level::ALL {
      assert!(qs.iter().any(|q| q.level == level), "missing {level}");
    }
    assert!(qs.iter().all(|q| !q.tests.is_empty()));
  }
}

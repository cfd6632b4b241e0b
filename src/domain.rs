//! Domain models: levels, questions, test cases and per-user progress records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Difficulty tier. Ordering follows progression: easy < medium < hard.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Level {
  Easy,
  Medium,
  Hard,
}

impl Level {
  pub const ALL: [Level; 3] = [Level::Easy, Level::Medium, Level::Hard];

  pub fn as_str(self) -> &'static str {
    match self {
      Level::Easy => "easy",
      Level::Medium => "medium",
      Level::Hard => "hard",
    }
  }

  pub fn previous(self) -> Option<Level> {
    match self {
      Level::Easy => None,
      Level::Medium => Some(Level::Easy),
      Level::Hard => Some(Level::Medium),
    }
  }

  pub fn next(self) -> Option<Level> {
    match self {
      Level::Easy => Some(Level::Medium),
      Level::Medium => Some(Level::Hard),
      Level::Hard => None,
    }
  }

  /// Level encoded in a question id prefix ("easy-100" -> Easy).
  pub fn of_question_id(id: &str) -> Option<Level> {
    Level::ALL.into_iter().find(|l| id.starts_with(l.as_str()))
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown level '{}'", self.0)
  }
}

impl FromStr for Level {
  type Err = UnknownLevel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "easy" => Ok(Level::Easy),
      "medium" => Ok(Level::Medium),
      "hard" => Ok(Level::Hard),
      other => Err(UnknownLevel(other.to_string())),
    }
  }
}

/// How stdio input is cut into the values `input()` hands out.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputSplit {
  /// One value per non-blank line.
  #[default]
  Lines,
  /// One value per whitespace-separated token (`"3 4"` is two values).
  Tokens,
}

impl InputSplit {
  pub fn values(self, input: &str) -> Vec<String> {
    match self {
      InputSplit::Lines => input
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect(),
      InputSplit::Tokens => input.split_whitespace().map(str::to_string).collect(),
    }
  }

  fn is_lines(&self) -> bool {
    *self == InputSplit::Lines
  }
}

/// A single test case. Call cases evaluate `entry(args)`; stdio cases feed
/// `input` to `input()` (split per `split`) and compare captured stdout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestCase {
  Call {
    args: String,
    expected: String,
    #[serde(default)]
    hidden: bool,
  },
  Stdio {
    #[serde(default)]
    input: String,
    expected: String,
    #[serde(default)]
    hidden: bool,
    #[serde(default, skip_serializing_if = "InputSplit::is_lines")]
    split: InputSplit,
  },
}

impl TestCase {
  pub fn hidden(&self) -> bool {
    match self {
      TestCase::Call { hidden, .. } | TestCase::Stdio { hidden, .. } => *hidden,
    }
  }

  pub fn expected(&self) -> &str {
    match self {
      TestCase::Call { expected, .. } | TestCase::Stdio { expected, .. } => expected,
    }
  }

  /// Values handed to `input()`; empty for call cases.
  pub fn stdin_values(&self) -> Vec<String> {
    match self {
      TestCase::Call { .. } => Vec::new(),
      TestCase::Stdio { input, split, .. } => split.values(input),
    }
  }

  /// What the user sees as "Input": the argument expression or stdin text.
  pub fn input_display(&self) -> &str {
    match self {
      TestCase::Call { args, .. } => args,
      TestCase::Stdio { input, .. } => input,
    }
  }
}

pub const DEFAULT_ENTRY: &str = "solution";

/// Question definition. Immutable once seeded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub id: String,
  pub level: Level,
  pub prompt: String,
  #[serde(default)] pub title: Option<String>,
  #[serde(default)] pub starter: Option<String>,
  #[serde(default)] pub hint: Option<String>,
  #[serde(default)] pub input_format: Option<String>,
  /// Callable name for call-style tests; defaults to `solution`.
  #[serde(default)] pub entry: Option<String>,
  #[serde(default)] pub tests: Vec<TestCase>,
}

impl Question {
  pub fn entry(&self) -> &str {
    self.entry.as_deref().unwrap_or(DEFAULT_ENTRY)
  }

  pub fn display_title(&self) -> &str {
    self.title.as_deref().unwrap_or(&self.id)
  }
}

/// Per-user progress document. Keyed by auth subject id.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct UserRecord {
  pub uid: String,
  #[serde(default)] pub email: String,
  #[serde(default)] pub display_name: String,
  #[serde(default)] pub photo_url: String,
  #[serde(default)] pub solved: BTreeMap<String, bool>,
  #[serde(default)] pub revise: BTreeMap<String, bool>,
  /// Epoch millis of the latest passing submission per question.
  #[serde(default)] pub solved_at: BTreeMap<String, i64>,
  /// RFC 3339 timestamp of the latest passing submission overall.
  #[serde(default)] pub last_solved: Option<String>,
}

impl UserRecord {
  pub fn new(uid: &str) -> Self {
    Self { uid: uid.to_string(), ..Default::default() }
  }

  pub fn is_solved(&self, question_id: &str) -> bool {
    self.solved.get(question_id).copied().unwrap_or(false)
  }

  pub fn is_flagged(&self, question_id: &str) -> bool {
    self.revise.get(question_id).copied().unwrap_or(false)
  }

  /// Ids whose solved flag is true.
  pub fn solved_ids(&self) -> impl Iterator<Item = &str> {
    self.solved.iter().filter(|(_, v)| **v).map(|(k, _)| k.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn levels_parse_and_order() {
    assert_eq!("medium".parse::<Level>(), Ok(Level::Medium));
    assert!("Medium".parse::<Level>().is_err());
    assert!(Level::Easy < Level::Hard);
    assert_eq!(Level::Easy.previous(), None);
    assert_eq!(Level::Hard.next(), None);
    assert_eq!(Level::of_question_id("hard-7"), Some(Level::Hard));
    assert_eq!(Level::of_question_id("bonus-1"), None);
  }

  #[test]
  fn test_case_uses_kind_tag() {
    let tc: TestCase = serde_json::from_str(r#"{"kind":"call","args":"2,3","expected":"5"}"#).unwrap();
    assert_eq!(tc, TestCase::Call { args: "2,3".into(), expected: "5".into(), hidden: false });
    assert_eq!(tc.input_display(), "2,3");
  }

  #[test]
  fn stdio_split_modes() {
    let tc: TestCase = serde_json::from_str(r#"{"kind":"stdio","input":"3\r\n\n4 5\n","expected":"12"}"#).unwrap();
    assert_eq!(tc.stdin_values(), vec!["3", "4 5"]);

    let tc: TestCase = serde_json::from_str(r#"{"kind":"stdio","input":"3 4\n 5","expected":"12","split":"tokens"}"#).unwrap();
    assert_eq!(tc.stdin_values(), vec!["3", "4", "5"]);
    assert!(serde_json::to_string(&tc).unwrap().contains(r#""split":"tokens""#));
    assert!(InputSplit::Tokens.values(" \n ").is_empty());
  }

  #[test]
  fn question_defaults_entry_to_solution() {
    let q = Question {
      id: "easy-1".into(),
      level: Level::Easy,
      prompt: "p".into(),
      title: None,
      starter: None,
      hint: None,
      input_format: None,
      entry: None,
      tests: vec![],
    };
    assert_eq!(q.entry(), "solution");
    assert_eq!(q.display_title(), "easy-1");
  }
}

//! Grading: run a question's test cases against submitted source and decide
//! pass/fail per case and overall.
//!
//! Comparison rules (both test kinds):
//!   - trim and lowercase expected and actual output;
//!   - if both parse as finite numbers, pass iff |expected - actual| < 0.01;
//!   - otherwise pass iff the normalized strings are equal.
//!
//! Cases run one after another against the single runtime handle. Hidden
//! cases gate success but are never detailed back to the user.

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{Question, TestCase};
use crate::runtime::{ExecError, LoadedProgram, Runtime};

pub const NUMERIC_TOLERANCE: f64 = 0.01;
pub const NO_OUTPUT: &str = "[no output]";
pub const HIDDEN_FAILED_MESSAGE: &str = "Some hidden test cases failed. Check for edge cases!";
pub const ALL_PASSED_MESSAGE: &str = "🎉 All tests passed!";
pub const RUN_PASSED: &str = "🔥 You did it!!";
pub const RUN_FAILED: &str = "😢 Try again!";

pub fn normalize(s: &str) -> String {
  s.trim().to_lowercase()
}

fn parse_number(s: &str) -> Option<f64> {
  s.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn outputs_match(expected: &str, actual: &str) -> bool {
  let e = normalize(expected);
  let a = normalize(actual);
  match (parse_number(&e), parse_number(&a)) {
    (Some(x), Some(y)) => (x - y).abs() < NUMERIC_TOLERANCE,
    _ => e == a,
  }
}

/// Output as shown to the user: trimmed, or a placeholder when empty.
pub fn display_output(raw: &str) -> String {
  let t = raw.trim();
  if t.is_empty() { NO_OUTPUT.to_string() } else { t.to_string() }
}

/// Detail for one visible case.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseReport {
  pub index: usize,
  pub input: String,
  pub expected: String,
  pub actual: String,
  pub passed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
  pub submission_id: String,
  pub question_id: String,
  pub all_passed: bool,
  pub hidden_failed: bool,
  pub passed: usize,
  pub total: usize,
  /// Visible-case details; empty when a hidden case failed.
  pub cases: Vec<CaseReport>,
  /// Rendered console text.
  pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleRun {
  pub question_id: String,
  pub input: String,
  pub expected: String,
  pub actual: String,
  pub passed: bool,
  pub status: String,
  pub output: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaygroundRun {
  pub output: String,
  pub ok: bool,
}

struct CaseOutcome {
  actual: String,
  passed: bool,
  error: Option<String>,
}

/// Loads `source` at most once per submission, on the first call-style case.
struct ProgramSlot<'a> {
  source: &'a str,
  loaded: Option<Result<LoadedProgram, ExecError>>,
}

impl<'a> ProgramSlot<'a> {
  fn new(source: &'a str) -> Self {
    Self { source, loaded: None }
  }

  async fn get(&mut self, rt: &Runtime) -> &Result<LoadedProgram, ExecError> {
    if self.loaded.is_none() {
      self.loaded = Some(rt.load(self.source).await);
    }
    self.loaded.get_or_insert_with(|| Err(ExecError::Failed("program not loaded".into())))
  }
}

async fn grade_case(rt: &Runtime, question: &Question, slot: &mut ProgramSlot<'_>, case: &TestCase) -> CaseOutcome {
  let result = match case {
    TestCase::Call { args, .. } => match slot.get(rt).await {
      Ok(program) => rt.invoke(program, question.entry(), args).await,
      Err(e) => Err(e.clone()),
    },
    TestCase::Stdio { .. } => match rt.run(slot.source, &case.stdin_values()).await {
      Ok(out) if out.success => Ok(display_output(&out.output)),
      Ok(out) => Err(ExecError::Failed(display_output(&out.output))),
      Err(e) => Err(e),
    },
  };
  match result {
    Ok(actual) => {
      let actual = display_output(&actual);
      let passed = outputs_match(case.expected(), &actual);
      CaseOutcome { actual, passed, error: None }
    }
    Err(e) => CaseOutcome { actual: format!("⚠️ {e}"), passed: false, error: Some(e.to_string()) },
  }
}

fn render_case(r: &CaseReport) -> String {
  format!(
    "Input:\n{}\nExpected Output:\n{}\nYour Output:\n{}\n{}\n",
    r.input,
    r.expected,
    r.actual,
    if r.passed { "✅" } else { "❌" }
  )
}

/// Grade every case. Fails only when the runtime cannot be initialized;
/// execution errors become failed cases.
#[instrument(level = "info", skip(rt, question, source), fields(question_id = %question.id, source_len = source.len()))]
pub async fn grade_submission(rt: &Runtime, question: &Question, source: &str) -> Result<Submission, ExecError> {
  rt.ensure_ready().await?;
  let submission_id = Uuid::new_v4().to_string();
  let mut slot = ProgramSlot::new(source);
  let mut cases = Vec::new();
  let mut passed = 0usize;
  let mut hidden_failed = false;

  for (index, case) in question.tests.iter().enumerate() {
    let outcome = grade_case(rt, question, &mut slot, case).await;
    debug!(target: "grading", %submission_id, index, hidden = case.hidden(), passed = outcome.passed, "Case graded");
    if outcome.passed {
      passed += 1;
    } else if case.hidden() {
      hidden_failed = true;
    }
    if !case.hidden() {
      cases.push(CaseReport {
        index,
        input: case.input_display().to_string(),
        expected: case.expected().to_string(),
        actual: outcome.actual,
        passed: outcome.passed,
        error: outcome.error,
      });
    }
  }

  let total = question.tests.len();
  // A question without cases can never be solved.
  let all_passed = total > 0 && passed == total;
  let output = if hidden_failed {
    cases.clear();
    HIDDEN_FAILED_MESSAGE.to_string()
  } else {
    let mut lines: Vec<String> = cases.iter().map(render_case).collect();
    if all_passed {
      lines.push(String::new());
      lines.push(ALL_PASSED_MESSAGE.to_string());
    }
    lines.join("\n")
  };

  info!(target: "grading", %submission_id, question_id = %question.id, passed, total, all_passed, hidden_failed, "Submission graded");
  Ok(Submission { submission_id, question_id: question.id.clone(), all_passed, hidden_failed, passed, total, cases, output })
}

/// Run only the first case and show its full detail. Nothing is persisted.
#[instrument(level = "info", skip(rt, question, source), fields(question_id = %question.id, source_len = source.len()))]
pub async fn run_sample(rt: &Runtime, question: &Question, source: &str) -> Result<Option<SampleRun>, ExecError> {
  let Some(case) = question.tests.first() else { return Ok(None) };
  rt.ensure_ready().await?;
  let mut slot = ProgramSlot::new(source);
  let outcome = grade_case(rt, question, &mut slot, case).await;
  let status = if outcome.passed { RUN_PASSED } else { RUN_FAILED };
  let output = format!(
    "Input:\n{}\n\nExpected Output:\n{}\n\nYour Output:\n{}\n\n{}",
    case.input_display(),
    case.expected(),
    outcome.actual,
    status
  );
  info!(target: "grading", question_id = %question.id, passed = outcome.passed, "Sample run finished");
  Ok(Some(SampleRun {
    question_id: question.id.clone(),
    input: case.input_display().to_string(),
    expected: case.expected().to_string(),
    actual: outcome.actual,
    passed: outcome.passed,
    status: status.to_string(),
    output,
  }))
}

/// Free-form run with no input. Tracebacks are part of the output.
#[instrument(level = "info", skip(rt, source), fields(source_len = source.len()))]
pub async fn run_playground(rt: &Runtime, source: &str) -> PlaygroundRun {
  match rt.run(source, &[]).await {
    Ok(out) => PlaygroundRun { output: out.output, ok: out.success },
    Err(e) => PlaygroundRun { output: format!("Error: {e}"), ok: false },
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::domain::{InputSplit, Level};
  use crate::runtime::scripted::{self, Script};
  use crate::runtime::RunOutput;

  fn question(tests: Vec<TestCase>) -> Question {
    Question {
      id: "easy-1".into(),
      level: Level::Easy,
      prompt: "p".into(),
      title: None,
      starter: None,
      hint: None,
      input_format: None,
      entry: None,
      tests,
    }
  }

  fn call(args: &str, expected: &str, hidden: bool) -> TestCase {
    TestCase::Call { args: args.into(), expected: expected.into(), hidden }
  }

  fn stdio(input: &str, expected: &str, hidden: bool) -> TestCase {
    TestCase::Stdio { input: input.into(), expected: expected.into(), hidden, split: InputSplit::Lines }
  }

  /// "Adds" comma-separated integer args.
  fn adder() -> Runtime {
    scripted::runtime(Script {
      invoke: Arc::new(|_: &str, entry: &str, args: &str| {
        assert_eq!(entry, "solution");
        let sum: i64 = args.split(',').map(|a| a.trim().parse::<i64>().unwrap()).sum();
        Ok(sum.to_string())
      }),
      ..Default::default()
    })
  }

  /// Sums the values `input()` would hand out, printing with a fixed suffix.
  fn line_summer(suffix: &'static str) -> Runtime {
    scripted::runtime(Script {
      run: Arc::new(move |_: &str, input: &[String]| {
        let sum: i64 = input.iter().map(|l| l.trim().parse::<i64>().unwrap()).sum();
        Ok(RunOutput { output: format!("{sum}{suffix}\n"), success: true })
      }),
      ..Default::default()
    })
  }

  #[test]
  fn numeric_tolerance_and_normalization() {
    assert!(outputs_match("7", "7.0"));
    assert!(outputs_match("2.3333", "2.3333333"));
    assert!(outputs_match("0.1", "0.109"));
    assert!(!outputs_match("0.1", "0.11"));
    assert!(outputs_match("  Hello World \n", "hello world"));
    assert!(!outputs_match("[1, 2]", "[1,2]"));
    assert!(outputs_match("True", "true"));
    // Non-finite values fall back to string comparison.
    assert!(outputs_match("inf", "INF"));
    assert!(!outputs_match("inf", "1e999"));
  }

  #[test]
  fn empty_output_has_placeholder() {
    assert_eq!(display_output("  \n"), NO_OUTPUT);
    assert_eq!(display_output(" 5\n"), "5");
  }

  #[tokio::test]
  async fn call_case_passes_on_matching_result() {
    let rt = adder();
    let q = question(vec![call("2,3", "5", false)]);
    let s = grade_submission(&rt, &q, "def solution(a,b): return a+b").await.unwrap();
    assert!(s.all_passed);
    assert_eq!(s.cases[0].actual, "5");
    assert!(s.output.ends_with(ALL_PASSED_MESSAGE));
  }

  #[tokio::test]
  async fn stdio_case_accepts_float_rendering() {
    let q = question(vec![stdio("3\n4", "7", false)]);
    assert!(grade_submission(&line_summer(""), &q, "src").await.unwrap().all_passed);
    assert!(grade_submission(&line_summer(".0"), &q, "src").await.unwrap().all_passed);
    assert!(!grade_submission(&line_summer("1"), &q, "src").await.unwrap().all_passed);
  }

  #[tokio::test]
  async fn tokenized_input_feeds_one_value_per_read() {
    let q = question(vec![TestCase::Stdio {
      input: "3 4".into(),
      expected: "7".into(),
      hidden: false,
      split: InputSplit::Tokens,
    }]);
    assert!(grade_submission(&line_summer(""), &q, "src").await.unwrap().all_passed);
  }

  #[tokio::test]
  async fn hidden_failure_hides_all_detail() {
    let rt = adder();
    let q = question(vec![call("1,1", "2", false), call("2,2", "5", true)]);
    let s = grade_submission(&rt, &q, "src").await.unwrap();
    assert!(!s.all_passed);
    assert!(s.hidden_failed);
    assert!(s.cases.is_empty());
    assert_eq!(s.output, HIDDEN_FAILED_MESSAGE);
    assert_eq!((s.passed, s.total), (1, 2));
  }

  #[tokio::test]
  async fn visible_errors_are_reported_per_case() {
    let rt = scripted::runtime(Script {
      invoke: Arc::new(|_: &str, _: &str, args: &str| {
        if args == "0" { Err(ExecError::Failed("ZeroDivisionError: division by zero".into())) } else { Ok("1".into()) }
      }),
      ..Default::default()
    });
    let q = question(vec![call("1", "1", false), call("0", "1", false)]);
    let s = grade_submission(&rt, &q, "src").await.unwrap();
    assert!(!s.all_passed);
    assert!(!s.hidden_failed);
    assert!(s.cases[0].passed);
    assert_eq!(s.cases[1].error.as_deref(), Some("ZeroDivisionError: division by zero"));
    assert!(s.output.contains("⚠️ ZeroDivisionError"));
  }

  #[tokio::test]
  async fn load_failure_fails_every_call_case() {
    let loads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = loads.clone();
    let rt = scripted::runtime(Script {
      load: Arc::new(move |_: &str| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(ExecError::Failed("SyntaxError: invalid syntax".into()))
      }),
      ..Default::default()
    });
    let q = question(vec![call("1", "1", false), call("2", "2", false)]);
    let s = grade_submission(&rt, &q, "def (").await.unwrap();
    assert_eq!(s.passed, 0);
    assert!(s.cases.iter().all(|c| c.error.as_deref() == Some("SyntaxError: invalid syntax")));
    assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn timeout_is_a_failed_case() {
    let rt = scripted::runtime(Script { run: Arc::new(|_: &str, _: &[String]| Err(ExecError::Timeout)), ..Default::default() });
    let q = question(vec![stdio("", "1", false)]);
    let s = grade_submission(&rt, &q, "while True: pass").await.unwrap();
    assert!(!s.all_passed);
    assert_eq!(s.cases[0].error.as_deref(), Some(crate::runtime::TIME_LIMIT_MESSAGE));
  }

  #[tokio::test]
  async fn question_without_tests_is_never_solved() {
    let s = grade_submission(&adder(), &question(vec![]), "src").await.unwrap();
    assert!(!s.all_passed);
  }

  #[tokio::test]
  async fn sample_run_uses_first_case_only() {
    let rt = adder();
    let q = question(vec![call("2,3", "5", true), call("1,1", "3", false)]);
    let run = run_sample(&rt, &q, "src").await.unwrap().unwrap();
    assert!(run.passed);
    assert_eq!(run.status, RUN_PASSED);
    assert!(run.output.starts_with("Input:\n2,3\n\nExpected Output:\n5"));
    assert!(run_sample(&rt, &question(vec![]), "src").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn playground_keeps_tracebacks_in_output() {
    let rt = scripted::runtime(Script {
      run: Arc::new(|_: &str, _: &[String]| Ok(RunOutput { output: "Traceback ...\nNameError: name 'x' is not defined\n".into(), success: false })),
      ..Default::default()
    });
    let run = run_playground(&rt, "print(x)").await;
    assert!(!run.ok);
    assert!(run.output.contains("NameError"));
  }
}

//! Code execution adapter: a sandboxed Python runtime behind three operations.
//!
//! - `load(source)`    : run the source once; fails if defining it raises.
//! - `invoke(p, e, a)` : evaluate `e(a)` against a loaded program and return the
//!                       serialized result (`true`/`false` for booleans, JSON otherwise).
//! - `run(source, in)` : execute with `input()` handing out the given values one
//!                       per call, capturing stdout (stderr merged in).
//!
//! Every operation runs in a fresh interpreter and is bounded by the configured
//! wall-clock budget, so a timed-out call leaves nothing behind. The runtime is
//! initialized lazily on first use (interpreter probe or remote catalogue
//! fetch); a failed initialization is retried on the next call.

use std::fmt;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::config::{RuntimeConfig, RuntimeKind};

mod harness;
pub mod local;
pub mod remote;

use local::LocalPython;
use remote::Piston;

pub const TIME_LIMIT_MESSAGE: &str = "Time limit exceeded";
pub const NO_RESULT_MESSAGE: &str = "Program exited before returning a result";
const REMOTE_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
  /// Wall-clock budget exceeded.
  Timeout,
  /// The program raised; carries the runtime's error text.
  Failed(String),
  /// Runtime could not be initialized or reached.
  Unavailable(String),
}

impl fmt::Display for ExecError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecError::Timeout => f.write_str(TIME_LIMIT_MESSAGE),
      ExecError::Failed(msg) => f.write_str(msg),
      ExecError::Unavailable(msg) => write!(f, "Python runtime unavailable: {msg}"),
    }
  }
}

impl std::error::Error for ExecError {}

/// What a backend hands back for one interpreter run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
}

/// Captured result of `run`. `success` is false when the program raised;
/// the traceback is then part of `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
  pub output: String,
  pub success: bool,
}

/// Source that defined cleanly under `load`.
#[derive(Debug, Clone)]
pub struct LoadedProgram {
  source: String,
}

impl LoadedProgram {
  pub fn source(&self) -> &str {
    &self.source
  }
}

enum Backend {
  Local(LocalPython),
  Remote(Piston),
  #[cfg(test)]
  Scripted(scripted::Script),
}

pub struct Runtime {
  backend: Backend,
  timeout: Duration,
  ready: OnceCell<String>,
}

impl Runtime {
  pub fn from_config(cfg: &RuntimeConfig) -> Result<Self, ExecError> {
    let backend = match cfg.kind {
      RuntimeKind::Local => Backend::Local(LocalPython::new(&cfg.python)),
      RuntimeKind::Remote => Backend::Remote(Piston::new(&cfg.remote_url, cfg.timeout())?),
    };
    Ok(Self { backend, timeout: cfg.timeout(), ready: OnceCell::new() })
  }

  pub fn backend_name(&self) -> &'static str {
    match &self.backend {
      Backend::Local(_) => "local",
      Backend::Remote(_) => "remote",
      #[cfg(test)]
      Backend::Scripted(_) => "scripted",
    }
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Interpreter version once initialized.
  pub fn version(&self) -> Option<&str> {
    self.ready.get().map(String::as_str)
  }

  /// One-time initialization shared by all callers.
  #[instrument(level = "debug", skip(self), fields(backend = self.backend_name()))]
  pub async fn ensure_ready(&self) -> Result<&str, ExecError> {
    let version = self
      .ready
      .get_or_try_init(|| async {
        let v = match &self.backend {
          Backend::Local(b) => b.probe(self.timeout).await,
          Backend::Remote(b) => b.resolve_version().await,
          #[cfg(test)]
          Backend::Scripted(_) => Ok("scripted".to_string()),
        };
        match &v {
          Ok(version) => info!(target: "runtime", backend = self.backend_name(), %version, "Python runtime ready"),
          Err(e) => warn!(target: "runtime", backend = self.backend_name(), error = %e, "Python runtime initialization failed"),
        }
        v
      })
      .await?;
    Ok(version.as_str())
  }

  #[instrument(level = "debug", skip(self, source), fields(source_len = source.len()))]
  pub async fn load(&self, source: &str) -> Result<LoadedProgram, ExecError> {
    self.ensure_ready().await?;
    #[cfg(test)]
    if let Backend::Scripted(s) = &self.backend {
      return s.load(source).map(|_| LoadedProgram { source: source.to_string() });
    }
    let out = self.execute(&harness::define(source)).await?;
    if out.success {
      Ok(LoadedProgram { source: source.to_string() })
    } else {
      Err(ExecError::Failed(harness::error_line(&out.stderr)))
    }
  }

  #[instrument(level = "debug", skip(self, program), fields(%entry, args_len = args.len()))]
  pub async fn invoke(&self, program: &LoadedProgram, entry: &str, args: &str) -> Result<String, ExecError> {
    self.ensure_ready().await?;
    #[cfg(test)]
    if let Backend::Scripted(s) = &self.backend {
      return s.invoke(&program.source, entry, args);
    }
    let out = self.execute(&harness::call(&program.source, entry, args)).await?;
    if !out.success {
      return Err(ExecError::Failed(harness::error_line(&out.stderr)));
    }
    harness::result_line(&out.stdout).ok_or_else(|| ExecError::Failed(NO_RESULT_MESSAGE.into()))
  }

  #[instrument(level = "debug", skip(self, source, input), fields(source_len = source.len(), inputs = input.len()))]
  pub async fn run(&self, source: &str, input: &[String]) -> Result<RunOutput, ExecError> {
    self.ensure_ready().await?;
    #[cfg(test)]
    if let Backend::Scripted(s) = &self.backend {
      return s.run(source, input);
    }
    let out = self.execute(&harness::stdio(source, input)).await?;
    let mut output = harness::user_frames_only(&out.stdout);
    if !out.stderr.trim().is_empty() {
      output.push_str(&harness::user_frames_only(&out.stderr));
    }
    Ok(RunOutput { output, success: out.success })
  }

  async fn execute(&self, program: &str) -> Result<RawOutput, ExecError> {
    let started = std::time::Instant::now();
    let fut = async {
      match &self.backend {
        Backend::Local(b) => b.execute(program).await,
        Backend::Remote(b) => b.execute(program, self.timeout).await,
        #[cfg(test)]
        Backend::Scripted(_) => Err(ExecError::Unavailable("scripted runtime executes no programs".into())),
      }
    };
    // Remote runs are limited server-side; the local budget only adds network slack.
    let budget = match &self.backend {
      Backend::Remote(_) => self.timeout + REMOTE_SLACK,
      _ => self.timeout,
    };
    let res = match tokio::time::timeout(budget, fut).await {
      Ok(r) => r,
      Err(_) => Err(ExecError::Timeout),
    };
    debug!(
      target: "runtime",
      elapsed_ms = started.elapsed().as_millis() as u64,
      ok = res.as_ref().map(|o| o.success).unwrap_or(false),
      "Execution finished"
    );
    res
  }
}

#[cfg(test)]
pub mod scripted {
  //! In-process stand-in for the interpreter used by grading tests.

  use std::sync::Arc;
  use std::time::Duration;

  use tokio::sync::OnceCell;

  use super::{Backend, ExecError, RunOutput, Runtime};

  pub type LoadFn = dyn Fn(&str) -> Result<(), ExecError> + Send + Sync;
  pub type InvokeFn = dyn Fn(&str, &str, &str) -> Result<String, ExecError> + Send + Sync;
  pub type RunFn = dyn Fn(&str, &[String]) -> Result<RunOutput, ExecError> + Send + Sync;

  pub struct Script {
    pub load: Arc<LoadFn>,
    pub invoke: Arc<InvokeFn>,
    pub run: Arc<RunFn>,
  }

  impl Script {
    pub(super) fn load(&self, source: &str) -> Result<(), ExecError> { (self.load)(source) }
    pub(super) fn invoke(&self, source: &str, entry: &str, args: &str) -> Result<String, ExecError> {
      (self.invoke)(source, entry, args)
    }
    pub(super) fn run(&self, source: &str, input: &[String]) -> Result<RunOutput, ExecError> { (self.run)(source, input) }
  }

  impl Default for Script {
    fn default() -> Self {
      Self {
        load: Arc::new(|_: &str| Ok(())),
        invoke: Arc::new(|_: &str, _: &str, _: &str| Err(ExecError::Failed("no invoke script".into()))),
        run: Arc::new(|_: &str, _: &[String]| Err(ExecError::Failed("no run script".into()))),
      }
    }
  }

  pub fn runtime(script: Script) -> Runtime {
    Runtime { backend: Backend::Scripted(script), timeout: Duration::from_millis(3000), ready: OnceCell::new() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::InputSplit;

  fn local_runtime(timeout_ms: u64) -> Option<Runtime> {
    let cfg = RuntimeConfig { timeout_ms, ..Default::default() };
    let ok = std::process::Command::new(&cfg.python).arg("--version").output().map(|o| o.status.success()).unwrap_or(false);
    if !ok {
      eprintln!("python3 not available; skipping");
      return None;
    }
    Runtime::from_config(&cfg).ok()
  }

  #[tokio::test]
  async fn invoke_serializes_results() {
    let Some(rt) = local_runtime(5000) else { return };
    let p = rt.load("def solution(a, b):\n    print('noise')\n    return a + b\n").await.unwrap();
    assert_eq!(rt.invoke(&p, "solution", "2,3").await.unwrap(), "5");
    let p = rt.load("def solution(x):\n    return x > 1\n").await.unwrap();
    assert_eq!(rt.invoke(&p, "solution", "2").await.unwrap(), "true");
    let p = rt.load("def solution():\n    return [1, 'a']\n").await.unwrap();
    assert_eq!(rt.invoke(&p, "solution", "").await.unwrap(), r#"[1, "a"]"#);
    assert!(rt.version().unwrap().starts_with("Python 3"));
  }

  #[tokio::test]
  async fn load_fails_when_definition_raises() {
    let Some(rt) = local_runtime(5000) else { return };
    match rt.load("raise ValueError('boom')").await {
      Err(ExecError::Failed(msg)) => assert_eq!(msg, "ValueError: boom"),
      other => panic!("unexpected: {other:?}"),
    }
  }

  fn values(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[tokio::test]
  async fn run_feeds_lines_and_merges_errors() {
    let Some(rt) = local_runtime(5000) else { return };
    let sum = "a = int(input())\nb = int(input())\nprint(a + b)\n";
    let out = rt.run(sum, &InputSplit::Lines.values("3\n4")).await.unwrap();
    assert!(out.success);
    assert_eq!(out.output.trim(), "7");
    let out = rt.run(sum, &InputSplit::Tokens.values("3 4")).await.unwrap();
    assert_eq!(out.output.trim(), "7");

    let out = rt.run("input()\ninput()\n", &values(&["only-one"])).await.unwrap();
    assert!(!out.success);
    assert!(out.output.contains("No more input lines available"), "{}", out.output);
    assert!(out.output.contains("\"<solution>\""), "{}", out.output);
    assert!(!out.output.contains("<stdin>"), "{}", out.output);
  }

  #[tokio::test]
  async fn exit_before_result_is_a_failure() {
    let Some(rt) = local_runtime(5000) else { return };
    let p = rt.load("import sys\ndef solution():\n    sys.exit(0)\n").await.unwrap();
    assert_eq!(rt.invoke(&p, "solution", "").await, Err(ExecError::Failed(NO_RESULT_MESSAGE.into())));
  }

  #[tokio::test]
  async fn runaway_code_times_out() {
    let Some(rt) = local_runtime(500) else { return };
    assert_eq!(rt.run("while True:\n    pass\n", &[]).await, Err(ExecError::Timeout));
    // Next call is unaffected by the killed process.
    assert_eq!(rt.run("print('ok')", &[]).await.unwrap().output.trim(), "ok");
  }
}

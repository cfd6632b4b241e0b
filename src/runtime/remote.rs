//! Minimal client for a Piston-compatible execution API.
//!
//! We only call two endpoints:
//!   GET  {base}/runtimes  -> pick the newest "python" runtime (once)
//!   POST {base}/execute   -> run one driver program
//!
//! Calls are instrumented and log status, latency and response sizes (never
//! program contents).

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{error, info, instrument};

use super::{ExecError, RawOutput};

const LANGUAGE: &str = "python";

pub struct Piston {
  client: reqwest::Client,
  base_url: String,
  version: OnceCell<String>,
}

#[derive(Deserialize)]
struct RuntimeInfo {
  language: String,
  version: String,
  #[serde(default)]
  aliases: Vec<String>,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
  language: &'a str,
  version: &'a str,
  files: Vec<ExecuteFile<'a>>,
  stdin: &'a str,
  run_timeout: u64,
}

#[derive(Serialize)]
struct ExecuteFile<'a> {
  name: &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ExecuteResponse {
  #[serde(default)]
  compile: Option<Stage>,
  run: Stage,
}

#[derive(Deserialize)]
struct Stage {
  #[serde(default)]
  stdout: String,
  #[serde(default)]
  stderr: String,
  #[serde(default)]
  code: Option<i32>,
  #[serde(default)]
  signal: Option<String>,
}

impl Piston {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExecError> {
    let client = reqwest::Client::builder()
      // Leave room for network overhead on top of the run budget.
      .timeout(timeout + Duration::from_secs(5))
      .build()
      .map_err(|e| ExecError::Unavailable(format!("HTTP client build failed: {e}")))?;
    Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), version: OnceCell::new() })
  }

  /// Fetch the runtime catalogue and pick the newest Python.
  #[instrument(level = "info", skip(self), fields(base_url = %self.base_url))]
  pub async fn resolve_version(&self) -> Result<String, ExecError> {
    let v = self
      .version
      .get_or_try_init(|| async {
        let url = format!("{}/runtimes", self.base_url);
        let started = Instant::now();
        let resp = self
          .client
          .get(&url)
          .header(USER_AGENT, "quizify-backend/0.1")
          .send()
          .await
          .map_err(|e| ExecError::Unavailable(format!("runtime catalogue request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
          error!(target: "runtime", %status, "Runtime catalogue returned an error");
          return Err(ExecError::Unavailable(format!("runtime catalogue returned {status}")));
        }
        let list: Vec<RuntimeInfo> = resp
          .json()
          .await
          .map_err(|e| ExecError::Unavailable(format!("runtime catalogue is malformed: {e}")))?;
        info!(target: "runtime", entries = list.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Fetched runtime catalogue");
        pick_python(&list).ok_or_else(|| ExecError::Unavailable("no python runtime offered".into()))
      })
      .await?;
    Ok(format!("Python {v}"))
  }

  #[instrument(level = "debug", skip(self, program), fields(program_len = program.len()))]
  pub async fn execute(&self, program: &str, timeout: Duration) -> Result<RawOutput, ExecError> {
    self.resolve_version().await?;
    let version = self.version.get().map(String::as_str).unwrap_or("*");
    let url = format!("{}/execute", self.base_url);
    let req = ExecuteRequest {
      language: LANGUAGE,
      version,
      files: vec![ExecuteFile { name: "main.py", content: program }],
      stdin: "",
      run_timeout: timeout.as_millis() as u64,
    };

    let started = Instant::now();
    let resp = self
      .client
      .post(&url)
      .header(CONTENT_TYPE, "application/json")
      .header(USER_AGENT, "quizify-backend/0.1")
      .json(&req)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          ExecError::Timeout
        } else {
          ExecError::Unavailable(format!("execute request failed: {e}"))
        }
      })?;
    let status = resp.status();
    let body = resp
      .text()
      .await
      .map_err(|e| ExecError::Unavailable(format!("reading execute response failed: {e}")))?;
    info!(target: "runtime", %status, elapsed_ms = started.elapsed().as_millis() as u64, resp_len = body.len(), "Remote execution finished");
    if !status.is_success() {
      return Err(ExecError::Unavailable(format!("execute returned {status}")));
    }
    let parsed: ExecuteResponse =
      serde_json::from_str(&body).map_err(|e| ExecError::Unavailable(format!("execute response is malformed: {e}")))?;
    into_raw(parsed)
  }
}

fn version_key(v: &str) -> Vec<u32> {
  v.split('.').map(|p| p.parse::<u32>().unwrap_or(0)).collect()
}

fn pick_python(list: &[RuntimeInfo]) -> Option<String> {
  list
    .iter()
    .filter(|r| r.language == LANGUAGE || r.aliases.iter().any(|a| a == "py" || a == "python3"))
    .filter(|r| r.version.starts_with('3'))
    .max_by_key(|r| version_key(&r.version))
    .map(|r| r.version.clone())
}

fn into_raw(resp: ExecuteResponse) -> Result<RawOutput, ExecError> {
  if let Some(c) = &resp.compile {
    if c.code.unwrap_or(0) != 0 {
      return Ok(RawOutput { stdout: c.stdout.clone(), stderr: c.stderr.clone(), success: false });
    }
  }
  // The service kills runs that exceed run_timeout.
  if resp.run.signal.as_deref() == Some("SIGKILL") {
    return Err(ExecError::Timeout);
  }
  Ok(RawOutput {
    success: resp.run.code == Some(0),
    stdout: resp.run.stdout,
    stderr: resp.run.stderr,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn picks_newest_python3() {
    let list: Vec<RuntimeInfo> = serde_json::from_str(
      r#"[
        {"language":"python","version":"3.9.4","aliases":["py"]},
        {"language":"python","version":"3.10.0","aliases":["py"]},
        {"language":"python2","version":"2.7.18","aliases":["py2"]},
        {"language":"rust","version":"1.68.2","aliases":["rs"]}
      ]"#,
    )
    .unwrap();
    assert_eq!(pick_python(&list).as_deref(), Some("3.10.0"));
  }

  #[test]
  fn killed_runs_are_timeouts() {
    let resp: ExecuteResponse = serde_json::from_str(
      r#"{"run":{"stdout":"","stderr":"","code":null,"signal":"SIGKILL","output":""}}"#,
    )
    .unwrap();
    assert_eq!(into_raw(resp), Err(ExecError::Timeout));

    let resp: ExecuteResponse =
      serde_json::from_str(r#"{"run":{"stdout":"5\n","stderr":"","code":0,"signal":null}}"#).unwrap();
    assert_eq!(into_raw(resp).unwrap(), RawOutput { stdout: "5\n".into(), stderr: String::new(), success: true });
  }
}

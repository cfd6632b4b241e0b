//! Local interpreter backend: one `python3 -I -` child per execution.
//!
//! The driver program is written to the child's stdin. The child is killed
//! when its future is dropped (timeout or client disconnect).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{error, instrument};

use super::{ExecError, RawOutput};

/// Captured stream cap per execution. Output past it is drained and discarded.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;
pub const TRUNCATED_MARKER: &str = "\n[output truncated]\n";

pub struct LocalPython {
  python: String,
}

impl LocalPython {
  pub fn new(python: &str) -> Self {
    Self { python: python.to_string() }
  }

  fn command(&self) -> Command {
    let mut cmd = Command::new(&self.python);
    cmd.stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .env("PYTHONIOENCODING", "utf-8")
      .kill_on_drop(true);
    cmd
  }

  /// `python3 --version`, used as the one-time readiness check.
  #[instrument(level = "info", skip(self), fields(python = %self.python))]
  pub async fn probe(&self, timeout: Duration) -> Result<String, ExecError> {
    let mut cmd = self.command();
    cmd.arg("--version").stdin(Stdio::null());
    let out = tokio::time::timeout(timeout, cmd.output())
      .await
      .map_err(|_| ExecError::Unavailable("interpreter probe timed out".into()))?
      .map_err(|e| ExecError::Unavailable(format!("cannot start {}: {e}", self.python)))?;
    if !out.status.success() {
      return Err(ExecError::Unavailable(format!("{} --version exited with {}", self.python, out.status)));
    }
    // Older interpreters print the version on stderr.
    let text = if out.stdout.is_empty() { out.stderr } else { out.stdout };
    Ok(String::from_utf8_lossy(&text).trim().to_string())
  }

  #[instrument(level = "debug", skip(self, program), fields(program_len = program.len()))]
  pub async fn execute(&self, program: &str) -> Result<RawOutput, ExecError> {
    let mut cmd = self.command();
    cmd.arg("-I").arg("-");
    let mut child = cmd.spawn().map_err(|e| {
      error!(target: "runtime", python = %self.python, error = %e, "Failed to spawn interpreter");
      ExecError::Unavailable(format!("cannot start {}: {e}", self.python))
    })?;

    let mut stdin = child.stdin.take().ok_or_else(|| ExecError::Unavailable("child stdin missing".into()))?;
    let stdout = child.stdout.take().ok_or_else(|| ExecError::Unavailable("child stdout missing".into()))?;
    let stderr = child.stderr.take().ok_or_else(|| ExecError::Unavailable("child stderr missing".into()))?;

    let feed = async move {
      // A child that dies early closes its stdin; that surfaces via its exit status.
      let _ = stdin.write_all(program.as_bytes()).await;
      drop(stdin);
    };
    let (_, out, err, status) = tokio::join!(feed, read_capped(stdout), read_capped(stderr), child.wait());
    let status = status.map_err(|e| ExecError::Unavailable(format!("waiting for interpreter failed: {e}")))?;

    Ok(RawOutput { stdout: out, stderr: err, success: status.success() })
  }
}

async fn read_capped(mut stream: impl AsyncRead + Unpin) -> String {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 8 * 1024];
  let mut truncated = false;
  loop {
    match stream.read(&mut chunk).await {
      Ok(0) => break,
      Ok(n) => {
        let room = MAX_CAPTURE_BYTES.saturating_sub(buf.len());
        if n > room {
          truncated = true;
        }
        buf.extend_from_slice(&chunk[..n.min(room)]);
      }
      Err(e) => {
        error!(target: "runtime", error = %e, "Reading interpreter output failed");
        break;
      }
    }
  }
  let mut text = String::from_utf8_lossy(&buf).into_owned();
  if truncated {
    text.push_str(TRUNCATED_MARKER);
  }
  text
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn small_output_is_kept_whole() {
    assert_eq!(read_capped(&b"hello\n"[..]).await, "hello\n");
  }

  #[tokio::test]
  async fn oversized_output_is_drained_and_marked() {
    let big = vec![b'x'; MAX_CAPTURE_BYTES * 3];
    let text = read_capped(&big[..]).await;
    assert!(text.ends_with(TRUNCATED_MARKER));
    assert_eq!(text.len(), MAX_CAPTURE_BYTES + TRUNCATED_MARKER.len());
  }

  #[tokio::test]
  async fn chatty_program_still_finishes() {
    let python = LocalPython::new("python3");
    let Ok(_) = python.probe(Duration::from_secs(5)).await else {
      eprintln!("python3 not available; skipping");
      return;
    };
    let out = python.execute("for i in range(40000):\n    print('line', i)\nprint('done')\n").await.unwrap();
    assert!(out.success);
    assert!(out.stdout.ends_with(TRUNCATED_MARKER));
  }
}

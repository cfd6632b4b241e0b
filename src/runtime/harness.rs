//! Python driver programs wrapped around user source.
//!
//! User source, entry names and argument expressions are embedded as JSON
//! string literals (valid Python literals) and evaluated from there, so no
//! user text is spliced into the driver's own syntax.

fn lit(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

/// Execute the definitions only; user prints are swallowed.
pub fn define(source: &str) -> String {
  format!(
    r#"import sys, io
sys.stdout = io.StringIO()
exec(compile({src}, "<solution>", "exec"), {{"__name__": "__main__"}})
"#,
    src = lit(source)
  )
}

/// Define, then call `entry(args)` and print the serialized result as the
/// only line on the real stdout.
pub fn call(source: &str, entry: &str, args: &str) -> String {
  format!(
    r#"import sys, io, json
__q_out = sys.stdout
sys.stdout = io.StringIO()
__q_ns = {{"__name__": "__main__"}}
exec(compile({src}, "<solution>", "exec"), __q_ns)
__q_val = eval({entry} + "(" + {args} + ")", __q_ns)
__q_res = ("true" if __q_val else "false") if isinstance(__q_val, bool) else json.dumps(__q_val)
sys.stdout = __q_out
print(__q_res)
"#,
    src = lit(source),
    entry = lit(entry),
    args = lit(args)
  )
}

/// Run as a script with `input()` replaced by a reader over `lines`, one value per call.
pub fn stdio(source: &str, lines: &[String]) -> String {
  let lines = serde_json::to_string(lines).unwrap_or_else(|_| "[]".into());
  format!(
    r#"import builtins, sys
__q_lines = {lines}
def __q_input(prompt=""):
    if __q_lines:
        return __q_lines.pop(0)
    raise EOFError("No more input lines available")
builtins.input = __q_input
sys.stderr = sys.stdout
exec(compile({src}, "<solution>", "exec"), {{"__name__": "__main__"}})
"#,
    src = lit(source)
  )
}

const SOLUTION_FILE: &str = "\"<solution>\"";
const TRACEBACK_HEAD: &str = "Traceback (most recent call last):";

/// The serialized value printed by `call`. `None` when the program exited
/// before printing it (for example through `sys.exit`).
pub fn result_line(stdout: &str) -> Option<String> {
  stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()).map(str::to_string)
}

/// Strip driver frames from tracebacks so only frames of the user's source
/// remain. Text outside tracebacks is untouched.
pub fn user_frames_only(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut in_traceback = false;
  let mut skipping = false;
  for line in text.split_inclusive('\n') {
    let bare = line.trim_end_matches(['\r', '\n']);
    if bare == TRACEBACK_HEAD {
      in_traceback = true;
      skipping = false;
    } else if in_traceback && bare.starts_with("  File ") {
      skipping = !bare.contains(SOLUTION_FILE);
      if skipping {
        continue;
      }
    } else if in_traceback && bare.starts_with("    ") {
      if skipping {
        continue;
      }
    } else {
      in_traceback = false;
      skipping = false;
    }
    out.push_str(line);
  }
  out
}

/// Last traceback line ("ValueError: boom"), or a generic message.
pub fn error_line(stderr: &str) -> String {
  stderr
    .lines()
    .rev()
    .map(str::trim)
    .find(|l| !l.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| "Program exited with an error".into())
}

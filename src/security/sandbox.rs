//! Subprocess sandbox for user code.
//!
//! Epistemic foundation:
//! - K_i: Checks run in a fixed order: rate limit, length, blocked patterns
//! - K_i: The child is killed when the timeout elapses (kill_on_drop)
//! - K_i: Python code runs inside a wrapper: output captured, exceptions printed as `Error: <e>`
//! - B_i: The interpreter may be missing → `Failed`
//! - I^B: User code may never terminate → bounded by timeout

use super::{RateLimiter, Sanitizer};
use crate::models::{RateLimitRule, Result, SecurityConfig, truncate_chars};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Rate-limit action name for sandbox runs.
pub const CODE_EXECUTION_ACTION: &str = "code_execution";

/// Indentation of user code inside the Python wrapper's `with` blocks.
const WRAPPER_INDENT: &str = "            ";

/// Python preamble: common modules, one buffer for stdout and stderr.
const WRAPPER_HEAD: &str = "\
import sys
import time
import math
import random
import json
import io
import contextlib

output_buffer = io.StringIO()

try:
    with contextlib.redirect_stdout(output_buffer):
        with contextlib.redirect_stderr(output_buffer):
";

const WRAPPER_TAIL: &str = "\
except Exception as e:
    print(f\"Error: {e}\")
finally:
    print(output_buffer.getvalue())
";

/// Wrap user code so its output is captured and an uncaught exception
/// prints `Error: <message>` ahead of whatever was printed before it.
pub fn wrap_python(code: &str) -> String {
    let mut script = String::with_capacity(WRAPPER_HEAD.len() + code.len() * 2);
    script.push_str(WRAPPER_HEAD);
    for line in code.split('\n') {
        script.push_str(WRAPPER_INDENT);
        script.push_str(line);
        script.push('\n');
    }
    // keeps the block valid when the code is empty or only comments
    script.push_str(WRAPPER_INDENT);
    script.push_str("pass\n");
    script.push_str(WRAPPER_TAIL);
    script
}

/// Whether `interpreter` names a Python executable (`python`, `python3.12`, a path to one).
fn is_python(interpreter: &str) -> bool {
    std::path::Path::new(interpreter)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("python"))
}

/// Result of a sandbox run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Process finished (any exit code)
    Completed { output: String, elapsed_ms: u64 },
    RateLimited,
    TooLong { length: usize, max: usize },
    Blocked { pattern: String },
    TimedOut { after_secs: u64 },
    Failed { error: String },
}

impl ExecutionOutcome {
    /// True for outcomes rejected before anything ran.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::TooLong { .. } | Self::Blocked { .. }
        )
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::RateLimited => "rate_limited",
            Self::TooLong { .. } => "too_long",
            Self::Blocked { .. } => "blocked",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { output, elapsed_ms } => {
                write!(f, "{output}\nTime: {:.2}s", *elapsed_ms as f64 / 1000.0)
            }
            Self::RateLimited => f.write_str("Rate limit exceeded"),
            Self::TooLong { .. } => f.write_str("Code too long"),
            Self::Blocked { .. } => f.write_str("Security: Restricted operation detected"),
            Self::TimedOut { .. } => f.write_str("Execution timed out"),
            Self::Failed { error } => write!(f, "Error: {error}"),
        }
    }
}

/// Runs code through an external interpreter with limits.
pub struct CodeSandbox {
    interpreter: String,
    timeout: Duration,
    max_code_length: usize,
    max_output_chars: usize,
    rule: RateLimitRule,
    sanitizer: Sanitizer,
    rate_limiter: Arc<RateLimiter>,
}

impl CodeSandbox {
    pub fn new(config: &SecurityConfig, rate_limiter: Arc<RateLimiter>) -> Result<Self> {
        Ok(Self {
            interpreter: config.interpreter.clone(),
            timeout: Duration::from_secs(config.execution_timeout_secs),
            max_code_length: config.max_code_length,
            max_output_chars: config.max_output_chars,
            rule: config.code_limit,
            sanitizer: Sanitizer::new(&config.blocked_patterns)?,
            rate_limiter,
        })
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Screen and run `code` on behalf of `user_id`.
    pub async fn execute(&self, code: &str, user_id: &str) -> ExecutionOutcome {
        if !self
            .rate_limiter
            .check(user_id, CODE_EXECUTION_ACTION, self.rule)
        {
            return ExecutionOutcome::RateLimited;
        }

        let length = code.chars().count();
        if length > self.max_code_length {
            return ExecutionOutcome::TooLong {
                length,
                max: self.max_code_length,
            };
        }

        if let Some(pattern) = self.sanitizer.find_blocked(code) {
            warn!(user_id, pattern, "Blocked code execution");
            return ExecutionOutcome::Blocked {
                pattern: pattern.to_string(),
            };
        }

        match self.run(code).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    async fn run(&self, code: &str) -> std::io::Result<ExecutionOutcome> {
        // The temp file is removed when `script` drops, after the child exits.
        let mut script = tempfile::Builder::new()
            .prefix("codegenie-")
            .suffix(".py")
            .tempfile()?;
        if is_python(&self.interpreter) {
            script.write_all(wrap_python(code).as_bytes())?;
        } else {
            script.write_all(code.as_bytes())?;
        }
        script.flush()?;

        let start = Instant::now();
        let child = Command::new(&self.interpreter)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                debug!(timeout_secs = self.timeout.as_secs(), "Sandbox run timed out");
                return Ok(ExecutionOutcome::TimedOut {
                    after_secs: self.timeout.as_secs(),
                });
            }
        };
        let elapsed = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut text = match stdout.trim() {
            "" => "Execution completed".to_string(),
            s => s.to_string(),
        };
        if !stderr.trim().is_empty() {
            text.push_str("\nWarnings: ");
            text.push_str(stderr.trim());
        }

        Ok(ExecutionOutcome::Completed {
            output: truncate_chars(&text, self.max_output_chars),
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}

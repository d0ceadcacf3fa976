//! Shell invocation with captured output.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use lazy_static::lazy_static;

use crate::paths;

#[derive(Clone, Debug)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub output: String,
}

#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd", "/c");
#[cfg(not(windows))]
const SHELL: (&str, &str) = ("sh", "-c");

/// Runs `command_line` through the platform shell, capturing stdout. When
/// `echo_output` is set the captured bytes are forwarded to our stdout as
/// they arrive. The caller merges stderr with `2>&1` when it wants it
/// captured; otherwise stderr passes through to the terminal.
pub fn run(command_line: &str, echo_output: bool) -> ProcessResult {
    let mut child = match Command::new(SHELL.0)
        .arg(SHELL.1)
        .arg(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(cause) => {
            return ProcessResult {
                exit_code: 1,
                output: format!("Failed to spawn shell: {}", cause),
            };
        }
    };

    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        let mut buffer = [0u8; 2048];
        loop {
            match stdout.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(bytes_read) => {
                    output.extend_from_slice(&buffer[..bytes_read]);
                    if echo_output {
                        let stdout = io::stdout();
                        let mut handle = stdout.lock();
                        let _ = handle.write_all(&buffer[..bytes_read]);
                        let _ = handle.flush();
                    }
                }
            }
        }
    }

    let exit_code = match child.wait() {
        // A signal death has no exit code; report it as a plain failure.
        Ok(status) => status.code().unwrap_or(1),
        Err(_) => 1,
    };

    ProcessResult { exit_code, output: String::from_utf8_lossy(&output).into_owned() }
}

lazy_static! {
    static ref CURRENT_MODULE_PATH: PathBuf = std::env::current_exe()
        .map(|path| paths::normalize(&path))
        .unwrap_or_default();
}

/// Absolute path of the running executable.
pub fn current_module_path() -> &'static Path {
    &CURRENT_MODULE_PATH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let result = run("echo hello && exit 3", false);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.output.trim(), "hello");
    }

    #[test]
    fn merges_stderr_when_redirected() {
        // The executor appends 2>&1 the same way to capture diagnostics.
        let result = run("(echo oops >&2) 2>&1", false);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "oops");
    }
}

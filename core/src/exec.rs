//! Command execution facility.
//!
//! Every connector drives its backend tool through a [`CommandRunner`].
//! The runner performs exactly one execution per call, captures exit
//! code, stdout and stderr, and never fails for a non-zero exit;
//! callers interpret the exit code. Elevation problems (no `sudo` on
//! the system) surface as a synthetic non-zero [`CommandOutput`], not
//! as an error or panic.
//!
//! The trait is also the injection seam for tests: `MockRunner` fakes
//! both binary lookup and command output.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Captured result of one external command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code; 127 for spawn/elevation failures, -1 when
    /// the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Build a synthetic failure, used when the command never ran.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The most specific failure message available: stderr preferred
    /// over stdout, over a generic exit-code message.
    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("command exited with code {}", self.code)
    }
}

/// Trait for executing backend tool commands.
pub trait CommandRunner: Send + Sync {
    /// Locate a tool binary, returning its absolute path if installed.
    fn lookup(&self, binary: &str) -> Option<PathBuf>;

    /// Run `program` with `args`, optionally through the privilege
    /// escalation tool. Exactly one execution; never an error for a
    /// non-zero exit.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        elevate: bool,
    ) -> impl Future<Output = CommandOutput> + Send;
}

/// [`CommandRunner`] backed by real process spawning.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn lookup(&self, binary: &str) -> Option<PathBuf> {
        which(binary)
    }

    async fn run(&self, program: &str, args: &[&str], elevate: bool) -> CommandOutput {
        let mut cmd = if elevate {
            let Some(sudo) = self.lookup("sudo") else {
                return CommandOutput::failure(127, "sudo not found in PATH");
            };
            let mut cmd = Command::new(sudo);
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        };

        let output = cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(out) => {
                let code = out.status.code().unwrap_or(-1);
                tracing::debug!(program, code, elevate, "command finished");
                CommandOutput {
                    code,
                    stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                }
            }
            Err(e) => {
                tracing::debug!(program, error = %e, "command failed to spawn");
                CommandOutput::failure(127, format!("failed to run {program}: {e}"))
            }
        }
    }
}

/// Search PATH for an executable, like `which(1)`.
fn which(binary: &str) -> Option<PathBuf> {
    if binary.contains('/') {
        let path = PathBuf::from(binary);
        return is_executable(&path).then_some(path);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by connector and manager tests.

    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use super::{CommandOutput, CommandRunner};

    /// A recorded invocation: `(program, joined args, elevate)`.
    pub type Call = (String, String, bool);

    #[derive(Default)]
    struct Inner {
        binaries: HashSet<String>,
        responses: HashMap<String, CommandOutput>,
        calls: Mutex<Vec<Call>>,
    }

    /// Runner with a fixed binary set and scripted command outputs.
    ///
    /// Commands are keyed by `"{program} {args joined by space}"`; an
    /// unscripted command returns exit code 127.
    #[derive(Clone, Default)]
    pub struct MockRunner {
        inner: Arc<Inner>,
    }

    impl MockRunner {
        pub fn new(binaries: &[&str]) -> Self {
            let inner = Inner {
                binaries: binaries.iter().map(|b| b.to_string()).collect(),
                ..Inner::default()
            };
            Self {
                inner: Arc::new(inner),
            }
        }

        pub fn with_output(self, command: &str, output: CommandOutput) -> Self {
            let mut inner = Arc::try_unwrap(self.inner).unwrap_or_else(|_| panic!(
                "with_output must be called before the runner is shared"
            ));
            inner.responses.insert(command.to_string(), output);
            Self {
                inner: Arc::new(inner),
            }
        }

        pub fn with_stdout(self, command: &str, stdout: &str) -> Self {
            self.with_output(
                command,
                CommandOutput {
                    code: 0,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            )
        }

        pub fn with_failure(self, command: &str, stderr: &str) -> Self {
            self.with_output(command, CommandOutput::failure(1, stderr))
        }

        pub fn calls(&self) -> Vec<Call> {
            self.inner.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for MockRunner {
        fn lookup(&self, binary: &str) -> Option<PathBuf> {
            self.inner
                .binaries
                .contains(binary)
                .then(|| PathBuf::from(format!("/usr/sbin/{binary}")))
        }

        async fn run(&self, program: &str, args: &[&str], elevate: bool) -> CommandOutput {
            let joined = args.join(" ");
            self.inner
                .calls
                .lock()
                .unwrap()
                .push((program.to_string(), joined.clone(), elevate));

            // Scripts key on the bare binary name, not the resolved path.
            let name = program.rsplit('/').next().unwrap_or(program);
            let key = format!("{name} {joined}");
            match self.inner.responses.get(&key) {
                Some(output) => output.clone(),
                None => CommandOutput::failure(127, format!("unscripted command: {key}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let runner = SystemRunner::new();
        let output = tokio_test::block_on(runner.run("/bin/false", &[], false));
        assert_ne!(output.code, 0);
    }

    #[test]
    fn test_captures_stdout() {
        let runner = SystemRunner::new();
        let output = tokio_test::block_on(runner.run("/bin/echo", &["hello"], false));
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_missing_binary_is_synthetic_failure() {
        let runner = SystemRunner::new();
        let output =
            tokio_test::block_on(runner.run("/nonexistent/tool-fwbridge", &[], false));
        assert_eq!(output.code, 127);
        assert!(!output.stderr.is_empty());
    }

    #[test]
    fn test_error_message_prefers_stderr() {
        let output = CommandOutput {
            code: 1,
            stdout: "some stdout".to_string(),
            stderr: "real error".to_string(),
        };
        assert_eq!(output.error_message(), "real error");

        let output = CommandOutput {
            code: 1,
            stdout: "fallback".to_string(),
            stderr: "  ".to_string(),
        };
        assert_eq!(output.error_message(), "fallback");

        let output = CommandOutput::failure(2, "");
        assert_eq!(output.error_message(), "command exited with code 2");
    }

    #[test]
    fn test_which_finds_sh() {
        assert!(which("sh").is_some());
        assert!(which("definitely-not-a-real-binary-name").is_none());
    }
}

//! Injectable subprocess invocation (design note: "subprocess invocation").
//!
//! `FilesystemBackend::create` (LV mode) runs `lvcreate`; `BlockBackend`
//! runs `dmsetup create`/`dmsetup remove`. Neither backend talks to
//! `std::process::Command` directly — they go through this trait, so tests
//! can supply a fake that records the exact argv without needing real LVM
//! or device-mapper state on the test host.

use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: i32,
        stderr: String,
    },
}

/// The result of running an external program.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally feeding `stdin`, and wait for
    /// completion. Returns an error on spawn failure or non-zero exit.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput, CommandError>;
}

/// Production runner: spawns a real child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput, CommandError> {
        use std::io::Write;
        use std::process::Stdio;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn { program: program.to_string(), source })?;

        if let Some(data) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                let _ = pipe.write_all(data);
            }
        } else {
            drop(child.stdin.take());
        }

        let output = child
            .wait_with_output()
            .map_err(|source| CommandError::Spawn { program: program.to_string(), source })?;

        if !output.status.success() {
            return Err(CommandError::NonZeroExit {
                program: program.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(CommandOutput { stdout: output.stdout, stderr: output.stderr })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// A recorded invocation, for test assertions.
    #[derive(Debug, Clone)]
    pub struct Invocation {
        pub program: String,
        pub args: Vec<String>,
        pub stdin: Option<Vec<u8>>,
    }

    /// Test double that records every invocation and returns a
    /// caller-supplied canned result.
    #[derive(Default)]
    pub struct FakeCommandRunner {
        pub invocations: Mutex<Vec<Invocation>>,
        pub fail_next: Mutex<Option<String>>,
    }

    impl FakeCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn invocations(&self) -> Vec<Invocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeCommandRunner {
        fn run(
            &self,
            program: &str,
            args: &[&str],
            stdin: Option<&[u8]>,
        ) -> Result<CommandOutput, CommandError> {
            self.invocations.lock().unwrap().push(Invocation {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                stdin: stdin.map(|b| b.to_vec()),
            });

            if let Some(msg) = self.fail_next.lock().unwrap().take() {
                return Err(CommandError::NonZeroExit {
                    program: program.to_string(),
                    status: 1,
                    stderr: msg,
                });
            }

            Ok(CommandOutput::default())
        }
    }
}

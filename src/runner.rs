//! External process execution
//!
//! ICMP probes shell out to `ping` and payload extraction pipes the HTTP body
//! into `jq`. Both go through the [`CommandRunner`] capability so that tests
//! (or an in-process implementation) can stand in for the binaries.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use crate::error::ProbeError;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// stdout followed by stderr, for diagnostics
    pub fn combined(&self) -> String {
        let mut combined = String::from_utf8_lossy(&self.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&self.stderr));
        combined.trim().to_string()
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion, feeding `stdin` to it if given
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> io::Result<CommandOutput>;
}

/// Runs commands as child processes of the prober
///
/// Children are killed when the future running them is dropped, which is
/// what bounds them in [`run_with_timeout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> io::Result<CommandOutput> {
        trace!("running {program} {args:?}");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pipe = child.stdin.take();
        let input = stdin.map(<[u8]>::to_vec);
        // write and read concurrently, a child blocked on a full stdout pipe
        // would otherwise never drain its stdin
        let writer = async move {
            if let (Some(mut pipe), Some(input)) = (pipe, input) {
                pipe.write_all(&input).await?;
            }
            Ok::<_, io::Error>(())
        };

        let (written, output) = tokio::join!(writer, child.wait_with_output());
        let output = output?;
        if let Err(e) = written
            && e.kind() != io::ErrorKind::BrokenPipe
        {
            return Err(e);
        }

        Ok(CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Run a command bounded by `timeout`, failing on a non-zero exit
pub async fn run_with_timeout(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, ProbeError> {
    let output = tokio::time::timeout(timeout, runner.run(program, args, stdin))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

    if !output.success {
        return Err(ProbeError::CommandFailed {
            program: program.to_string(),
            status: output
                .code
                .map_or_else(|| "signal".to_string(), |code| format!("exit code {code}")),
            output: output.combined(),
        });
    }

    Ok(output)
}

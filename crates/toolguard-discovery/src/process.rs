//! # Bounded Subprocess Runner
//!
//! Every external program toolguard runs (probed tools, the signature
//! verifier) goes through [`run_bounded`]:
//!
//! - arguments are passed directly to `execve`, never through a shell
//! - stdin is `/dev/null`; the environment is inherited unchanged
//! - stdout and stderr are captured up to a byte limit; excess is drained and
//!   discarded so the child never blocks on a full pipe
//! - the whole run is bounded by a deadline
//!
//! On Unix the child is placed in its own process group. If the deadline
//! passes, or the returned future is dropped (scan cancellation), the whole
//! group receives `SIGKILL`, so helpers forked by the tool die with it.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Captured result of a finished process.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// True if stdout exceeded the capture limit and was cut.
    pub stdout_truncated: bool,
}

impl CapturedOutput {
    /// Stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Why a bounded run did not produce output.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} did not finish within {timeout:?}", program.display())]
    Timeout { program: PathBuf, timeout: Duration },

    #[error("I/O error talking to {}: {source}", program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// True if the program does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Runs `program` with `args`, bounded by `timeout` and `max_output` bytes per stream.
pub async fn run_bounded<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    timeout: Duration,
    max_output: usize,
) -> Result<CapturedOutput, RunError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: program.to_path_buf(),
        source,
    })?;
    let mut group = GroupGuard::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let work = async move {
        let (out, err, status) = tokio::join!(
            read_capped(stdout, max_output),
            read_capped(stderr, max_output),
            child.wait()
        );
        let (stdout, stdout_truncated) = out?;
        let (stderr, _) = err?;
        Ok::<_, io::Error>(CapturedOutput {
            status: status?,
            stdout,
            stderr,
            stdout_truncated,
        })
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(output)) => {
            group.disarm();
            Ok(output)
        }
        Ok(Err(source)) => Err(RunError::Io {
            program: program.to_path_buf(),
            source,
        }),
        Err(_) => Err(RunError::Timeout {
            program: program.to_path_buf(),
            timeout,
        }),
    }
}

async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    max: usize,
) -> io::Result<(Vec<u8>, bool)> {
    let Some(reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    let mut limited = reader.take(max as u64 + 1);
    limited.read_to_end(&mut buf).await?;

    let truncated = buf.len() > max;
    if truncated {
        buf.truncate(max);
        tokio::io::copy(&mut limited.into_inner(), &mut tokio::io::sink()).await?;
    }
    Ok((buf, truncated))
}

/// Kills the child's process group on drop unless disarmed.
struct GroupGuard {
    pgid: Option<i32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|p| i32::try_from(p).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg takes plain integers; a stale group yields ESRCH.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

//! Child process execution for command-backed oracles.

use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Turn a timeout, a non-zero exit, or truncated stdout into an error.
    ///
    /// Truncated stdout would leave a partial JSON document behind, so it is
    /// rejected rather than parsed.
    pub fn ensure_complete(&self, label: &str, timeout: Duration) -> Result<()> {
        if self.timed_out {
            return Err(anyhow!("{label} timed out after {timeout:?}"));
        }
        if !self.status.success() {
            let stderr = String::from_utf8_lossy(&self.stderr);
            return Err(anyhow!(
                "{label} failed with status {:?}: {}",
                self.status.code(),
                stderr.trim()
            ));
        }
        if self.stdout_truncated > 0 {
            return Err(anyhow!(
                "{label} stdout exceeded the output limit by {} bytes",
                self.stdout_truncated
            ));
        }
        Ok(())
    }
}

/// Run `cmd`, feed it `stdin`, and capture its output under a deadline.
///
/// stdin is written on its own thread so the deadline also covers a child
/// that stops reading. stdout and stderr are drained on reader threads and
/// at most `output_limit_bytes` of each stream is kept. A failed write is
/// only logged: the exit status and captured output decide the result.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), input_bytes = stdin.len()))]
pub fn run_with_input(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning oracle process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn oracle command");
            return Err(e).context("spawn oracle command");
        }
    };

    let (child_stdin, stdout, stderr) = match take_pipes(&mut child) {
        Ok(pipes) => pipes,
        Err(err) => {
            reap(&mut child);
            return Err(err);
        }
    };
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));
    let input = stdin.to_vec();
    let stdin_handle = thread::spawn(move || write_input(child_stdin, &input));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(timeout_secs = timeout.as_secs(), "oracle timed out, killing");
            timed_out = true;
            if let Err(err) = child.kill() {
                warn!(err = %err, "failed to kill oracle");
            }
            child.wait().context("wait oracle after kill")?
        }
        Err(err) => {
            reap(&mut child);
            return Err(err).context("wait for oracle");
        }
    };

    if let Err(err) = join_thread(stdin_handle).context("join stdin writer") {
        warn!("oracle request not fully written: {err:#}");
    }
    let (stdout, stdout_truncated) = join_thread(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_thread(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "oracle output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "oracle process finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        timed_out,
    })
}

fn take_pipes(child: &mut Child) -> Result<(ChildStdin, ChildStdout, ChildStderr)> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    Ok((stdin, stdout, stderr))
}

/// Kill and wait a child that will not be reported on.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn write_input(mut pipe: ChildStdin, input: &[u8]) -> Result<()> {
    pipe.write_all(input).context("write oracle request")?;
    Ok(())
}

fn join_thread<T>(handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("pipe thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

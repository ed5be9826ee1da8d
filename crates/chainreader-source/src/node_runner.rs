//! Supervised node subprocess.
//!
//! The node runs in its own process group. Its stdout feeds the line queue;
//! its stderr is either discarded or forwarded through a [`StderrFilter`].
//! On shutdown the group receives SIGINT, then SIGKILL once the forced-kill
//! timeout elapses.
//!
//! # Usage
//! ```rust,no_run
//! use chainreader_core::{line_channel, ShutdownHandle};
//! use chainreader_source::NodeRunner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (lines_tx, _lines_rx) = line_channel(1024);
//! let (handle, shutdown) = ShutdownHandle::new();
//! let runner = NodeRunner::new("gaiad", ["start"]).forward_stderr(true);
//! runner.run(lines_tx, shutdown).await?;
//! # drop(handle);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chainreader_core::config::{resolve_binary, NodeConfig, DEFAULT_LINE_BUFFER_SIZE};
use chainreader_core::{ConfigError, LineSender, Shutdown};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::line_reader::read_lines;
use crate::stderr_filter::{forward_filtered, StderrFilter};

pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a supervised run that did not end with a clean exit.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subprocess I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("subprocess exited: {status}")]
    Exited { status: ExitStatus },

    #[error("subprocess stopped after interrupt: {status}")]
    Interrupted { status: ExitStatus },

    #[error("subprocess killed after {timeout:?} without exiting: {status}")]
    ForceKilled { status: ExitStatus, timeout: Duration },
}

impl RunnerError {
    /// `true` when shutdown was requested and the node stopped on SIGINT.
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// `true` for either cancellation outcome.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Interrupted { .. } | Self::ForceKilled { .. })
    }
}

/// Builder + supervisor for one node process.
#[derive(Debug, Clone)]
pub struct NodeRunner {
    bin: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    forward_stderr: bool,
    logs_filter: Option<String>,
    buffer_size: usize,
    forced_kill_timeout: Duration,
}

impl NodeRunner {
    pub fn new<I, S>(bin: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bin: bin.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            env: BTreeMap::new(),
            forward_stderr: false,
            logs_filter: None,
            buffer_size: DEFAULT_LINE_BUFFER_SIZE,
            forced_kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }

    pub fn from_config(config: &NodeConfig, buffer_size: usize) -> Result<Self, ConfigError> {
        let bin = config.path.clone().ok_or(ConfigError::MissingBinary)?;
        Ok(Self {
            bin,
            args: config.args.clone(),
            dir: config.dir.clone(),
            env: config.env.clone(),
            forward_stderr: config.forward_stderr,
            logs_filter: config.logs_filter.clone(),
            buffer_size,
            forced_kill_timeout: config.forced_kill_timeout(),
        })
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn forward_stderr(mut self, forward: bool) -> Self {
        self.forward_stderr = forward;
        self
    }

    pub fn logs_filter(mut self, expr: impl Into<String>) -> Self {
        self.logs_filter = Some(expr.into());
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn forced_kill_timeout(mut self, timeout: Duration) -> Self {
        self.forced_kill_timeout = timeout;
        self
    }

    /// Run the node until it exits or `shutdown` fires.
    ///
    /// Always waits for stdout to be drained before returning, so lines
    /// written right before exit reach the queue. Returns the exit status of
    /// a clean, unrequested exit; every other ending is a [`RunnerError`].
    pub async fn run(&self, lines: LineSender, mut shutdown: Shutdown) -> Result<ExitStatus, RunnerError> {
        let path = resolve_binary(&self.bin)?;
        let filter = if self.forward_stderr {
            Some(StderrFilter::new(self.logs_filter.as_deref())?)
        } else {
            None
        };

        let mut cmd = Command::new(&path);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if filter.is_some() { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        info!(bin = %path.display(), args = ?self.args, "starting subprocess");
        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            bin: self.bin.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, "subprocess started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "stdout not captured"))?;
        let buffer_size = self.buffer_size;
        let reader = tokio::spawn(async move { read_lines(stdout, &lines, buffer_size).await });

        let stderr_task = match (child.stderr.take(), filter) {
            (Some(stderr), Some(filter)) => Some(tokio::spawn(async move {
                forward_filtered(stderr, tokio::io::stderr(), &filter).await
            })),
            _ => None,
        };

        let exited = tokio::select! {
            res = child.wait() => Some(res),
            _ = shutdown.cancelled() => None,
        };

        let result = match exited {
            Some(Ok(status)) if status.success() => Ok(status),
            Some(Ok(status)) => Err(RunnerError::Exited { status }),
            Some(Err(e)) => Err(RunnerError::Io(e)),
            None => self.stop(&mut child, pid).await,
        };
        debug!(result = ?result, "runner finished");

        // Lines emitted right before exit are still in the pipe.
        match reader.await {
            Ok(Ok(count)) => debug!(lines = count, "reader drained"),
            Ok(Err(e)) => debug!(error = %e, "reader finished with error"),
            Err(e) => debug!(error = %e, "reader task failed"),
        }
        if let Some(task) = stderr_task {
            if let Ok(Err(e)) = task.await {
                debug!(error = %e, "stderr forwarding finished with error");
            }
        }

        result
    }

    /// SIGINT the process group, escalating to SIGKILL after the timeout.
    async fn stop(&self, child: &mut Child, pid: Option<u32>) -> Result<ExitStatus, RunnerError> {
        debug!(pid, "runner context is cancelled, interrupting subprocess");
        if !signal_group(pid, Signal::SIGINT) {
            // Already gone; reap it.
            let status = child.wait().await?;
            return Err(RunnerError::Interrupted { status });
        }

        match tokio::time::timeout(self.forced_kill_timeout, child.wait()).await {
            Ok(status) => Err(RunnerError::Interrupted { status: status? }),
            Err(_) => {
                warn!(pid, timeout = ?self.forced_kill_timeout, "forcefully stopping the subprocess");
                if !signal_group(pid, Signal::SIGKILL) {
                    child.start_kill()?;
                }
                let status = child.wait().await?;
                Err(RunnerError::ForceKilled {
                    status,
                    timeout: self.forced_kill_timeout,
                })
            }
        }
    }
}

/// Signal the group led by `pid`. Returns `false` if there was no such group.
fn signal_group(pid: Option<u32>, signal: Signal) -> bool {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            debug!(pid, ?signal, error = %e, "cant signal process group");
            false
        }
    }
}

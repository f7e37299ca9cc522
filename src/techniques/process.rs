//! External process adapter
//!
//! Runs one tool invocation with captured output, a hard timeout, and
//! guaranteed termination of the child and everything it spawned.

use super::inventory::ToolInventory;
use super::TechniqueStatus;
use log::{debug, warn};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Cap on captured bytes per stream
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 8192;
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Replace `{name}` placeholders in a template
pub fn substitute_variables(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

/// One command line to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Name looked up in the tool inventory
    pub tool: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new<S: Into<String>>(tool: impl Into<String>, args: Vec<S>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    /// Build an invocation from argument templates, filling in `{target}`
    pub fn for_target(tool: &str, templates: &[&str], target: &str, timeout: Duration) -> Self {
        let args = templates
            .iter()
            .map(|t| substitute_variables(t, &[("target", target)]))
            .collect::<Vec<String>>();
        Self::new(tool, args, timeout)
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.tool.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a process run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: TechniqueStatus,
    pub stdout: String,
    pub stderr: String,
    /// Output went past the capture cap and the rest was discarded
    pub truncated: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    fn status_only(status: TechniqueStatus, elapsed: Duration) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            elapsed,
        }
    }

    /// Non-empty trimmed stdout lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Spawns tool invocations found in the inventory
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    inventory: Arc<ToolInventory>,
    max_output: usize,
}

impl ProcessRunner {
    pub fn new(inventory: Arc<ToolInventory>) -> Self {
        Self {
            inventory,
            max_output: MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn inventory(&self) -> &ToolInventory {
        &self.inventory
    }

    pub fn is_available(&self, tool: &str) -> bool {
        self.inventory.is_available(tool)
    }

    /// Run `invocation` to completion or timeout.
    ///
    /// Never returns an error: spawn failures, timeouts, and non-zero exits
    /// become the corresponding [`TechniqueStatus`]. Dropping the returned
    /// future kills the process group.
    pub async fn run(&self, invocation: &ToolInvocation) -> ProcessOutput {
        let started = Instant::now();

        let Some(program) = self.inventory.path_of(&invocation.tool) else {
            debug!("{} not in inventory, not spawning", invocation.tool);
            return ProcessOutput::status_only(TechniqueStatus::ToolAbsent, started.elapsed());
        };

        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        debug!("Running: {}", invocation.command_line());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ProcessOutput::status_only(TechniqueStatus::ToolAbsent, started.elapsed());
            }
            Err(e) => {
                return ProcessOutput::status_only(
                    TechniqueStatus::Failed(format!("spawn: {}", e)),
                    started.elapsed(),
                );
            }
        };

        let mut group = ProcessGroupGuard::new(child.id());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let max = self.max_output;

        let collected = timeout(invocation.timeout, async {
            let ((stdout, out_cut), (stderr, err_cut)) =
                tokio::join!(read_capped(stdout, max), read_capped(stderr, max));
            // The unreaped leader still holds the group id; clear out any
            // stragglers before wait() releases it.
            group.kill();
            let exit = child.wait().await;
            (stdout, stderr, out_cut || err_cut, exit)
        })
        .await;

        match collected {
            Ok((stdout, stderr, truncated, exit)) => {
                if truncated {
                    warn!(
                        "{} output exceeded {} bytes, truncated",
                        invocation.tool, max
                    );
                }
                let status = match exit {
                    Ok(exit) if exit.success() => TechniqueStatus::Ok,
                    Ok(exit) => {
                        debug!(
                            "{} exited with {:?}: {}",
                            invocation.tool,
                            exit.code(),
                            stderr.lines().last().unwrap_or_default()
                        );
                        TechniqueStatus::NonzeroExit(exit.code())
                    }
                    Err(e) => TechniqueStatus::Failed(format!("wait: {}", e)),
                };
                ProcessOutput {
                    status,
                    stdout,
                    stderr,
                    truncated,
                    elapsed: started.elapsed(),
                }
            }
            Err(_) => {
                warn!(
                    "{} timed out after {:?}, killing it",
                    invocation.tool, invocation.timeout
                );
                group.kill();
                let _ = child.start_kill();
                if timeout(REAP_GRACE, child.wait()).await.is_err() {
                    debug!("{} not reaped within {:?}", invocation.tool, REAP_GRACE);
                }
                ProcessOutput::status_only(TechniqueStatus::Timeout, started.elapsed())
            }
        }
    }
}

/// Read a stream to EOF, keeping at most `max` bytes.
///
/// Bytes past the cap are still drained so the child never blocks on a
/// full pipe.
async fn read_capped<R>(reader: Option<R>, max: usize) -> (String, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (String::new(), false);
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = max.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("Stream read failed: {}", e);
                break;
            }
        }
    }
    (String::from_utf8_lossy(&kept).into_owned(), truncated)
}

/// SIGKILLs the child's process group, once: explicitly or on drop
#[cfg(unix)]
struct ProcessGroupGuard {
    pgid: Option<libc::pid_t>,
}

#[cfg(unix)]
impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg has no memory-safety preconditions; ESRCH for an
            // already empty group is ignored.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(not(unix))]
struct ProcessGroupGuard;

#[cfg(not(unix))]
impl ProcessGroupGuard {
    fn new(_pid: Option<u32>) -> Self {
        Self
    }

    fn kill(&mut self) {}
}

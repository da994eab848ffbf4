use std::fs::File;
use std::io::Read as _;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ExecFailure {
    pub reason: String,
    /// Everything the program wrote before it failed, stdout and stderr interleaved.
    pub output: Vec<u8>,
}

impl std::fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\n---- output ----\n{}",
            self.reason,
            String::from_utf8_lossy(&self.output)
        )
    }
}

impl std::error::Error for ExecFailure {}

/// Runs a compiled artifact in `cwd` and returns its combined output.
///
/// Output is captured through `log_path`, shared by stdout and stderr so the
/// two streams keep their relative order. Any nonzero exit, signal, or
/// timeout is a failure. The program runs in its own process group, which is
/// killed once it finishes.
pub fn run_artifact(
    artifact: &Path,
    args: &[String],
    cwd: &Path,
    log_path: &Path,
    timeout: Duration,
) -> Result<Vec<u8>, ExecFailure> {
    let fail = |reason: String| ExecFailure {
        reason,
        output: Vec::new(),
    };

    let log = File::create(log_path)
        .map_err(|e| fail(format!("create {}: {e}", log_path.display())))?;
    let log_err = log
        .try_clone()
        .map_err(|e| fail(format!("dup {}: {e}", log_path.display())))?;

    let artifact_abs = std::fs::canonicalize(artifact)
        .map_err(|e| fail(format!("canonicalize {}: {e}", artifact.display())))?;

    let mut cmd = Command::new(&artifact_abs);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    spawn_in_own_group(&mut cmd);
    let mut child = cmd
        .spawn()
        .map_err(|e| fail(format!("spawn {}: {e}", artifact.display())))?;

    let waited = wait_group_with_deadline(&mut child, timeout);
    let output = read_log(log_path);

    let (status, timed_out) = match waited {
        Ok(v) => v,
        Err(e) => {
            return Err(ExecFailure {
                reason: format!("wait {}: {e}", artifact.display()),
                output,
            })
        }
    };

    if timed_out {
        return Err(ExecFailure {
            reason: format!("timed out after {}s", timeout.as_secs_f64()),
            output,
        });
    }
    if let Some(reason) = abnormal_exit(status) {
        return Err(ExecFailure { reason, output });
    }
    Ok(output)
}

fn read_log(path: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    if let Ok(mut f) = File::open(path) {
        let _ = f.read_to_end(&mut out);
    }
    out
}

pub(crate) fn abnormal_exit(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("exit status {code}"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(sig) = status.signal() {
            return Some(format!("terminated by signal {sig}"));
        }
    }
    Some("terminated abnormally".to_string())
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Starts the child as the leader of a new process group, so anything it
/// forks can be signalled together with it.
pub(crate) fn spawn_in_own_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// SIGKILLs every process still in the child's group. ESRCH (group already
/// empty) is not an error.
fn kill_process_group(child: &Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg takes plain integers and touches no memory.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Waits for a child started with [`spawn_in_own_group`].
///
/// Returns `(status, timed_out)`. Past `timeout` the whole group is killed;
/// either way, group members left behind by the leader are killed before
/// returning so none of them keeps inherited pipes or files open.
pub(crate) fn wait_group_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<(ExitStatus, bool)> {
    let started = Instant::now();
    let (status, timed_out) = loop {
        if let Some(status) = child.try_wait()? {
            break (status, false);
        }
        if started.elapsed() >= timeout {
            kill_process_group(child);
            let _ = child.kill();
            break (child.wait()?, true);
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(started.elapsed())));
    };
    kill_process_group(child);
    Ok((status, timed_out))
}

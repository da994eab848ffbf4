use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::exec::{abnormal_exit, spawn_in_own_group, wait_group_with_deadline};

pub type TaskStream = Box<dyn Write + Send>;

/// One invocation of the compiler under test.
pub trait CompilerTask: Send {
    /// Ordinary failure is an `Err`; an internal fault may also panic.
    fn main(&mut self) -> Result<()>;
}

pub trait TaskFactory: Sync {
    /// `args[0]` is a nominal program name. `None` streams mean the process's
    /// own stdout/stderr.
    fn new_task(
        &self,
        args: Vec<String>,
        stdout: Option<TaskStream>,
        stderr: Option<TaskStream>,
    ) -> Box<dyn CompilerTask>;
}

/// The compiler process died on a signal rather than reporting an error.
#[derive(Debug)]
pub struct TaskCrash {
    pub program: String,
    pub signal: String,
    pub stderr: String,
}

impl std::fmt::Display for TaskCrash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.signal)
    }
}

impl std::error::Error for TaskCrash {}

/// Shared in-memory sink; clones write to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuf(Arc<Mutex<Vec<u8>>>);

impl CaptureBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn append(&self, data: &[u8]) {
        let mut buf = match self.0.lock() {
            Ok(buf) => buf,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.extend_from_slice(data);
    }
}

impl Write for CaptureBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.append(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs a compiler executable as a subprocess: `program extra_args args[1..]`.
#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    pub program: PathBuf,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
}

impl TaskFactory for ExternalCompiler {
    fn new_task(
        &self,
        args: Vec<String>,
        stdout: Option<TaskStream>,
        stderr: Option<TaskStream>,
    ) -> Box<dyn CompilerTask> {
        Box::new(ExternalTask {
            compiler: self.clone(),
            args,
            stdout: stdout.unwrap_or_else(|| Box::new(std::io::stdout())),
            stderr: stderr.unwrap_or_else(|| Box::new(std::io::stderr())),
        })
    }
}

struct ExternalTask {
    compiler: ExternalCompiler,
    args: Vec<String>,
    stdout: TaskStream,
    stderr: TaskStream,
}

impl CompilerTask for ExternalTask {
    fn main(&mut self) -> Result<()> {
        let program = self.compiler.program.display().to_string();
        let mut cmd = Command::new(&self.compiler.program);
        cmd.args(&self.compiler.extra_args)
            .args(self.args.iter().skip(1))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Drivers fork cc1/as/ld; they share the group and its deadline.
        spawn_in_own_group(&mut cmd);
        let mut child = cmd.spawn().with_context(|| format!("spawn {program}"))?;

        let out_reader = child.stdout.take().map(drain_in_background);
        let err_reader = child.stderr.take().map(drain_in_background);

        let (status, timed_out) = wait_group_with_deadline(&mut child, self.compiler.timeout)
            .with_context(|| format!("wait {program}"))?;

        let out = out_reader.map(join_drain).unwrap_or_default();
        let err = err_reader.map(join_drain).unwrap_or_default();
        self.stdout.write_all(&out).context("forward compiler stdout")?;
        self.stderr.write_all(&err).context("forward compiler stderr")?;
        self.stdout.flush().context("flush compiler stdout")?;
        self.stderr.flush().context("flush compiler stderr")?;

        if timed_out {
            bail!(
                "{program} timed out after {}s",
                self.compiler.timeout.as_secs_f64()
            );
        }
        if status.success() {
            return Ok(());
        }
        if status.code().is_none() {
            return Err(TaskCrash {
                program,
                signal: abnormal_exit(status).unwrap_or_default(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
            }
            .into());
        }
        bail!(
            "{program} failed ({})",
            abnormal_exit(status).unwrap_or_default()
        );
    }
}

fn drain_in_background<R: Read + Send + 'static>(
    mut reader: R,
) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: std::thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_compiler(script: &str) -> ExternalCompiler {
        ExternalCompiler {
            program: PathBuf::from("/bin/sh"),
            extra_args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            timeout: Duration::from_secs(10),
        }
    }

    fn run(compiler: &ExternalCompiler) -> (Result<()>, Vec<u8>, Vec<u8>) {
        let out = CaptureBuf::new();
        let err = CaptureBuf::new();
        let mut task = compiler.new_task(
            vec!["cc".to_string(), "-o".to_string(), "a.out".to_string(), "x.c".to_string()],
            Some(Box::new(out.clone())),
            Some(Box::new(err.clone())),
        );
        let res = task.main();
        (res, out.contents(), err.contents())
    }

    #[test]
    fn nominal_name_is_dropped_and_streams_forwarded() {
        let (res, out, err) = run(&sh_compiler("echo \"$@\"; echo warn >&2"));
        res.expect("compile ok");
        assert_eq!(out, b"-o a.out x.c\n");
        assert_eq!(err, b"warn\n");
    }

    #[test]
    fn nonzero_exit_is_an_ordinary_error() {
        let (res, _, err) = run(&sh_compiler("echo 'x.c:1: error' >&2; exit 1"));
        let err_val = res.expect_err("exit 1");
        assert!(err_val.downcast_ref::<TaskCrash>().is_none());
        assert!(err_val.to_string().contains("exit status 1"), "{err_val}");
        assert_eq!(err, b"x.c:1: error\n");
    }

    #[test]
    fn signal_death_is_a_crash() {
        let (res, _, _) = run(&sh_compiler("echo boom >&2; kill -SEGV $$"));
        let err = res.expect_err("signal");
        let crash = err.downcast_ref::<TaskCrash>().expect("TaskCrash");
        assert!(crash.signal.contains("signal"), "{}", crash.signal);
        assert_eq!(crash.stderr, "boom\n");
    }

    #[test]
    fn hung_compiler_subprocess_is_killed_with_its_driver() {
        let mut compiler = sh_compiler("echo driving >&2; sleep 30; true");
        compiler.timeout = Duration::from_millis(200);
        let started = std::time::Instant::now();
        let (res, _, err) = run(&compiler);
        let res_err = res.expect_err("timeout");
        assert!(res_err.to_string().contains("timed out"), "{res_err}");
        assert_eq!(err, b"driving\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn hung_compiler_is_killed() {
        let mut compiler = sh_compiler("exec sleep 30");
        compiler.timeout = Duration::from_millis(200);
        let (res, _, _) = run(&compiler);
        let err = res.expect_err("timeout");
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}

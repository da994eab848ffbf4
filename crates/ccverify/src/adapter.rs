use std::cell::RefCell;
use std::sync::Once;

use crate::task::{TaskCrash, TaskFactory, TaskStream};

const TASK_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub enum CompileFault {
    /// The compiler reported failure through its normal error path.
    Error(anyhow::Error),
    /// The compiler faulted: a panic inside the task, or a crashed subprocess.
    Crash {
        message: String,
        trace: Option<String>,
    },
}

impl std::fmt::Display for CompileFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileFault::Error(err) => write!(f, "compile error: {err:#}"),
            CompileFault::Crash { message, .. } => write!(f, "compiler crashed: {message}"),
        }
    }
}

impl std::error::Error for CompileFault {}

impl CompileFault {
    pub fn trace(&self) -> Option<&str> {
        match self {
            CompileFault::Error(_) => None,
            CompileFault::Crash { trace, .. } => trace.as_deref(),
        }
    }
}

struct PanicCapture {
    want_backtrace: bool,
    message: Option<String>,
    backtrace: Option<String>,
}

thread_local! {
    static CAPTURE: RefCell<Option<PanicCapture>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a hook in front of the existing one. Threads that opted in via
/// `CAPTURE` get their panic recorded instead of printed.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let captured = CAPTURE
                .try_with(|slot| {
                    let mut slot = slot.borrow_mut();
                    let Some(capture) = slot.as_mut() else {
                        return false;
                    };
                    let mut message = payload_message(info.payload());
                    if let Some(loc) = info.location() {
                        message = format!("{message} at {}:{}", loc.file(), loc.line());
                    }
                    capture.message = Some(message);
                    if capture.want_backtrace {
                        capture.backtrace =
                            Some(std::backtrace::Backtrace::force_capture().to_string());
                    }
                    true
                })
                .unwrap_or(false);
            if !captured {
                prev(info);
            }
        }));
    });
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Builds and runs one compiler task on a dedicated large-stack thread.
///
/// A panic anywhere in the task stays on the worker thread and becomes
/// [`CompileFault::Crash`]; with `trace` set the crash carries a backtrace.
pub fn compile_isolated(
    factory: &dyn TaskFactory,
    args: Vec<String>,
    stdout: Option<TaskStream>,
    stderr: Option<TaskStream>,
    trace: bool,
) -> Result<(), CompileFault> {
    install_panic_hook();

    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("ccverify-compile".to_string())
            .stack_size(TASK_STACK_SIZE)
            .spawn_scoped(scope, move || {
                CAPTURE.with(|slot| {
                    *slot.borrow_mut() = Some(PanicCapture {
                        want_backtrace: trace,
                        message: None,
                        backtrace: None,
                    })
                });
                let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let mut task = factory.new_task(args, stdout, stderr);
                    task.main()
                }));
                let capture = CAPTURE.with(|slot| slot.borrow_mut().take());
                match res {
                    Ok(res) => Ok(res),
                    Err(payload) => {
                        let (message, backtrace) = match capture {
                            Some(c) => (c.message, c.backtrace),
                            None => (None, None),
                        };
                        Err(CompileFault::Crash {
                            message: message.unwrap_or_else(|| payload_message(payload.as_ref())),
                            trace: backtrace,
                        })
                    }
                }
            });

        let handle = match worker {
            Ok(handle) => handle,
            Err(err) => {
                return Err(CompileFault::Error(
                    anyhow::Error::new(err).context("spawn compile thread"),
                ))
            }
        };

        match handle.join() {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(classify_error(err, trace)),
            Ok(Err(fault)) => Err(fault),
            Err(payload) => Err(CompileFault::Crash {
                message: payload_message(payload.as_ref()),
                trace: None,
            }),
        }
    })
}

fn classify_error(err: anyhow::Error, trace: bool) -> CompileFault {
    match err.downcast::<TaskCrash>() {
        Ok(crash) => CompileFault::Crash {
            message: crash.to_string(),
            trace: trace.then_some(crash.stderr),
        },
        Err(err) => CompileFault::Error(err),
    }
}

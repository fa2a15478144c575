//! Signal teardown
//!
//! One listener task per manager, installed when the first client is pooled.
//! On SIGINT/SIGTERM (Ctrl-C/Ctrl-Break on Windows) it runs the manager's
//! teardown and then, unless disabled, exits with `128 + signal number`.
//!
//! Stdio servers run in their own process group, so a terminal Ctrl-C does not
//! reach them directly; this listener is what closes them.
//!
//! Note: once tokio has registered a handler for a signal, the default
//! disposition is not restored when the listener goes away. A process that
//! dropped its manager keeps ignoring SIGINT unless something else handles it.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info};

static ACTIVE_SIGNAL_LISTENERS: AtomicUsize = AtomicUsize::new(0);

/// Number of live signal listeners across all managers in this process.
pub fn active_signal_listeners() -> usize {
    ACTIVE_SIGNAL_LISTENERS.load(Ordering::SeqCst)
}

/// A signal that triggered teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReceivedSignal {
    pub name: &'static str,
    pub exit_code: i32,
}

#[cfg(unix)]
struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> ReceivedSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ReceivedSignal { name: "SIGINT", exit_code: 130 },
            _ = self.terminate.recv() => ReceivedSignal { name: "SIGTERM", exit_code: 143 },
        }
    }
}

#[cfg(windows)]
struct SignalListener {
    ctrl_c: tokio::signal::windows::CtrlC,
    ctrl_break: tokio::signal::windows::CtrlBreak,
}

#[cfg(windows)]
impl SignalListener {
    fn new() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
            ctrl_break: tokio::signal::windows::ctrl_break()?,
        })
    }

    async fn recv(&mut self) -> ReceivedSignal {
        tokio::select! {
            _ = self.ctrl_c.recv() => ReceivedSignal { name: "SIGINT", exit_code: 130 },
            _ = self.ctrl_break.recv() => ReceivedSignal { name: "SIGBREAK", exit_code: 149 },
        }
    }
}

/// Owns one listener task. Dropping it aborts the task and releases the
/// listener count exactly once.
pub(crate) struct SignalGuard {
    handle: Option<JoinHandle<()>>,
}

impl SignalGuard {
    /// Start listening. `on_signal` runs the teardown; the process exits
    /// afterwards when `exit_on_signal` is set.
    pub fn install<F, Fut>(exit_on_signal: bool, on_signal: F) -> io::Result<Self>
    where
        F: FnOnce(ReceivedSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut listener = SignalListener::new()?;

        let handle = tokio::spawn(async move {
            let signal = listener.recv().await;
            info!(
                signal = signal.name,
                "[SignalTeardown] Received signal, closing MCP clients"
            );
            on_signal(signal).await;
            if exit_on_signal {
                info!(
                    exit_code = signal.exit_code,
                    "[SignalTeardown] Teardown complete, exiting"
                );
                std::process::exit(signal.exit_code);
            }
        });

        let active = ACTIVE_SIGNAL_LISTENERS.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(active, "[SignalTeardown] Signal listener installed");
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Release the guard without aborting the task.
    ///
    /// Used by teardown running inside the listener task itself.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        let active = ACTIVE_SIGNAL_LISTENERS.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(active, "[SignalTeardown] Signal listener removed");
    }
}

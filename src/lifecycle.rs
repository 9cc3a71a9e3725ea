//! Driver lifecycle states and the stop signal shared with adapters.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Lifecycle state of a camera array.
///
/// `Uninitialized → Initialized → Capturing ⇄ Stopped`, and any state to
/// the terminal `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No devices are open.
    Uninitialized,
    /// Devices are open and configurable, not acquiring.
    Initialized,
    /// Every camera is acquiring frames.
    Capturing,
    /// Acquisition was stopped; devices remain open.
    Stopped,
    /// All devices were closed. Terminal.
    Released,
}

/// Driver operations, for state checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Open the array.
    Init,
    /// Begin acquisition.
    StartCapture,
    /// End acquisition.
    StopCapture,
    /// Change a camera setting.
    Configure,
    /// Read camera information or settings.
    Query,
    /// Pull a frame, or discard frames to let settings converge.
    Capture,
}

impl Operation {
    /// Name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::StartCapture => "start_capture",
            Self::StopCapture => "stop_capture",
            Self::Configure => "configure",
            Self::Query => "query",
            Self::Capture => "capture",
        }
    }
}

impl LifecycleState {
    /// Whether `op` may run in this state.
    pub const fn permits(self, op: Operation) -> bool {
        match op {
            Operation::Init => matches!(self, Self::Uninitialized),
            Operation::StartCapture => matches!(self, Self::Initialized | Self::Stopped),
            Operation::StopCapture | Operation::Capture => matches!(self, Self::Capturing),
            Operation::Configure | Operation::Query => {
                matches!(self, Self::Initialized | Self::Capturing | Self::Stopped)
            }
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct StopState {
    raised: Mutex<bool>,
    wake: Condvar,
}

/// Stop flag shared between the driver and its adapters.
///
/// Adapters wait on it while blocking for frames so that a stop request
/// ends the wait immediately instead of at the timeout.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    state: Arc<StopState>,
}

impl StopSignal {
    /// Create a lowered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter.
    pub fn raise(&self) {
        let mut raised = self
            .state
            .raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *raised = true;
        self.state.wake.notify_all();
    }

    /// Lower the signal for a new acquisition.
    pub fn clear(&self) {
        *self
            .state
            .raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Whether a stop was requested.
    pub fn is_raised(&self) -> bool {
        *self
            .state
            .raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `duration`; returns `true` if the signal was raised.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut raised = self
            .state
            .raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            raised = self
                .state
                .wake
                .wait_timeout(raised, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Cloneable handle that stops acquisition from another thread.
///
/// After [`StopHandle::request_stop`], in-flight and later captures return
/// `CaptureStopped` until the driver's next `stop_capture` or `start_capture`.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: StopSignal,
}

impl StopHandle {
    pub(crate) const fn new(signal: StopSignal) -> Self {
        Self { signal }
    }

    /// Interrupt every pending frame wait.
    pub fn request_stop(&self) {
        self.signal.raise();
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.signal.is_raised()
    }
}

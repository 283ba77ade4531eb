use crate::error::endpoint::EndpointError;

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle of an endpoint. An endpoint is started at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointState::Stopped => "stopped",
            EndpointState::Starting => "starting",
            EndpointState::Started => "started",
            EndpointState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

struct Lifecycle {
    state: EndpointState,
    has_started: bool,
}

pub struct StateMachine {
    inner: Mutex<Lifecycle>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Lifecycle {
                state: EndpointState::Stopped,
                has_started: false,
            }),
        }
    }
}

impl StateMachine {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> EndpointState {
        self.lock().state
    }

    #[track_caller]
    pub fn begin_start(&self) -> Result<(), EndpointError> {
        let mut lifecycle = self.lock();
        if lifecycle.has_started {
            return Err(EndpointError::invalid_state(
                "endpoint has already been started once",
            ));
        }
        if lifecycle.state != EndpointState::Stopped {
            return Err(EndpointError::invalid_state(format!(
                "cannot start while {}",
                lifecycle.state
            )));
        }
        lifecycle.state = EndpointState::Starting;
        lifecycle.has_started = true;
        Ok(())
    }

    pub fn complete_start(&self) {
        self.lock().state = EndpointState::Started;
    }

    /// A failed start leaves the endpoint stopped for good.
    pub fn abort_start(&self) {
        self.lock().state = EndpointState::Stopped;
    }

    #[track_caller]
    pub fn begin_stop(&self) -> Result<(), EndpointError> {
        let mut lifecycle = self.lock();
        if lifecycle.state != EndpointState::Started {
            return Err(EndpointError::invalid_state(format!(
                "cannot stop while {}",
                lifecycle.state
            )));
        }
        lifecycle.state = EndpointState::Stopping;
        Ok(())
    }

    pub fn complete_stop(&self) {
        self.lock().state = EndpointState::Stopped;
    }

    #[track_caller]
    pub fn ensure_started(&self) -> Result<(), EndpointError> {
        match self.current() {
            EndpointState::Started => Ok(()),
            other => Err(EndpointError::not_connected(format!(
                "endpoint is {other}"
            ))),
        }
    }
}

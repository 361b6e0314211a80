use std::io::ErrorKind;
use std::time::{Duration, Instant};

use crate::error::{FrameError, Result};

/// Absolute deadline for one frame operation.
///
/// Socket timeouts apply per syscall, so the time left is recomputed and
/// re-applied before every underlying read or write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    armed: Option<(Duration, Instant)>,
}

impl Deadline {
    pub(crate) fn start(timeout: Option<Duration>) -> Self {
        Self {
            armed: timeout.map(|timeout| (timeout, Instant::now() + timeout)),
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Time left before expiry. `Ok(None)` when no deadline is armed.
    pub(crate) fn remaining(&self) -> Result<Option<Duration>> {
        match self.armed {
            None => Ok(None),
            Some((timeout, at)) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(FrameError::Timeout(timeout))
                } else {
                    Ok(Some(left))
                }
            }
        }
    }

    pub(crate) fn expired(&self) -> FrameError {
        FrameError::Timeout(self.armed.map(|(timeout, _)| timeout).unwrap_or_default())
    }
}

/// Error kinds a socket reports when its timeout fires.
pub(crate) fn is_timeout_kind(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

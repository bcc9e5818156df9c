//! Command/Response Cycle: bounded polling for one expected completion.

use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use super::command::Opcode;
use super::error::{BringupError, BringupResult};
use super::reader::read_event;
use super::transport::UartTransport;
use super::validator::{validate, RecoveryAction};

/// Decide whether a polling loop may run another iteration.
///
/// Kept as a pure function of (elapsed, max) so the timeout boundary is
/// testable without sleeping.
pub fn should_continue(elapsed: Duration, max_duration: Duration) -> bool {
    elapsed < max_duration
}

/// Elapsed/remaining time against an original maximum duration, derived
/// from the monotonic clock.
#[derive(Debug, Clone)]
pub struct DeadlineBudget {
    start: Instant,
    max_duration: Duration,
}

impl DeadlineBudget {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            start: Instant::now(),
            max_duration,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.max_duration.saturating_sub(self.elapsed())
    }

    /// Once this reports true the operation must report timeout and must
    /// not loop further.
    pub fn expired(&self) -> bool {
        !should_continue(self.elapsed(), self.max_duration)
    }
}

/// Poll for a successful completion of `expected` until the budget runs out.
///
/// Non-matching frames (unrelated events, mismatched opcodes, malformed
/// completions) are discarded and polling continues; only budget expiry or a
/// read-level failure ends the cycle without success. A hardware error event
/// routes through `recovery`; if the recovery action succeeds, the cycle
/// reports success, preserving the source protocol's observed behavior.
pub fn await_command_complete(
    uart: &mut dyn UartTransport,
    expected: Opcode,
    poll_interval: Duration,
    max_duration: Duration,
    recovery: &mut dyn RecoveryAction,
) -> BringupResult<()> {
    let budget = DeadlineBudget::new(max_duration);
    debug!(expected = %expected, "waiting for command completion");

    loop {
        if budget.expired() {
            let elapsed_ms = budget.elapsed().as_millis() as u64;
            error!(expected = %expected, elapsed_ms, "command completion timed out");
            return Err(BringupError::ReadTimeout { elapsed_ms });
        }
        // A wrong-marker frame is discarded like any other non-match; only
        // timeouts and transport faults end the cycle early.
        let evt = match read_event(uart, poll_interval, budget.remaining()) {
            Ok(evt) => evt,
            Err(e @ BringupError::InvalidFrame { .. }) => {
                trace!(expected = %expected, error = %e, "discarding invalid frame");
                continue;
            }
            Err(e) => return Err(e),
        };
        match validate(&evt, expected, uart, recovery) {
            Ok(()) => return Ok(()),
            Err(e) => {
                trace!(expected = %expected, error = %e, "discarding non-matching frame");
            }
        }
    }
}

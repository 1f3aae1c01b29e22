pub mod error;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod pwm;

use servo_traits::{EndStop, PwmOutput, SimClock};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

use crate::error::HwError;

/// Shared record of every duty value a simulated PWM has emitted.
#[derive(Debug, Clone, Default)]
pub struct DutyLog {
    inner: Rc<RefCell<DutyLogState>>,
}

#[derive(Debug, Default)]
struct DutyLogState {
    duties: Vec<u16>,
    released: bool,
}

impl DutyLog {
    pub fn duties(&self) -> Vec<u16> {
        self.inner.borrow().duties.clone()
    }

    pub fn last(&self) -> Option<u16> {
        self.inner.borrow().duties.last().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().duties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().duties.is_empty()
    }

    pub fn released(&self) -> bool {
        self.inner.borrow().released
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().duties.clear();
    }
}

/// Simulated PWM output.
///
/// Each duty write charges `write_latency` on the attached [`SimClock`], which
/// stands in for the register write and loop overhead of a real board, so a
/// timed sweep yields speeds of the `a / wait + b` shape.
pub struct SimulatedPwm {
    log: DutyLog,
    clock: Option<SimClock>,
    write_latency: Duration,
    fail_after: Option<usize>,
}

impl SimulatedPwm {
    pub fn new() -> Self {
        Self {
            log: DutyLog::default(),
            clock: None,
            write_latency: Duration::ZERO,
            fail_after: None,
        }
    }

    /// Attach a simulated clock and the time each duty write costs on it.
    pub fn with_clock(mut self, clock: SimClock, write_latency: Duration) -> Self {
        self.clock = Some(clock);
        self.write_latency = write_latency;
        self
    }

    /// Fail every write after `n` successful ones (fault injection).
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Handle for inspecting emitted duties after the PWM is moved elsewhere.
    pub fn log(&self) -> DutyLog {
        self.log.clone()
    }
}

impl Default for SimulatedPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmOutput for SimulatedPwm {
    fn set_duty(&mut self, duty: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.log.inner.borrow_mut();
        if state.released {
            return Err(Box::new(HwError::Released));
        }
        if let Some(n) = self.fail_after
            && state.duties.len() >= n
        {
            return Err(Box::new(HwError::Pwm("simulated write failure".into())));
        }
        state.duties.push(duty);
        if let Some(clock) = &self.clock {
            clock.advance(self.write_latency);
        }
        trace!(duty, "pwm duty (simulated)");
        Ok(())
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.inner.borrow_mut().released = true;
        trace!("pwm released (simulated)");
        Ok(())
    }
}

/// Simulated end-stop that trips once the PWM has landed on `trigger_duty`.
pub struct SimulatedEndStop {
    log: DutyLog,
    trigger_duty: u16,
}

impl SimulatedEndStop {
    pub fn new(log: DutyLog, trigger_duty: u16) -> Self {
        Self { log, trigger_duty }
    }
}

impl EndStop for SimulatedEndStop {
    fn is_triggered(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.log.last() == Some(self.trigger_duty))
    }
}

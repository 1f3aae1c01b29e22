pub mod clock;

pub use clock::{Clock, MonotonicClock, SimClock};

/// PWM output driving the servo signal line.
///
/// Duty values use the 16-bit scale (`0..=u16::MAX` is 0..100 % on-time).
pub trait PwmOutput {
    fn set_duty(&mut self, duty: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Stop generating pulses so the servo goes limp.
    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// End-of-travel sensor (e.g. a photo interrupter) used to time a sweep.
pub trait EndStop {
    fn is_triggered(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

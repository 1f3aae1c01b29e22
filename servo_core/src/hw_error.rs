//! Maps `Box<dyn Error>` from trait boundaries to typed `ServoError`.
//!
//! The traits in `servo_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `servo_hardware::HwError` downcasting.

use crate::error::ServoError;

/// Map a trait-boundary error to a typed `ServoError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ServoError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<servo_hardware::error::HwError>() {
            return ServoError::HardwareFault(hw.to_string());
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ServoError::Timeout
    } else {
        ServoError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_fall_back_to_message() {
        let e: Box<dyn std::error::Error + Send + Sync> = "bus glitch".into();
        assert_eq!(
            map_hw_error(e.as_ref()),
            ServoError::Hardware("bus glitch".into())
        );
        let e: Box<dyn std::error::Error + Send + Sync> = "sensor timeout".into();
        assert_eq!(map_hw_error(e.as_ref()), ServoError::Timeout);
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_downcast_to_fault() {
        let e: Box<dyn std::error::Error + Send + Sync> =
            Box::new(servo_hardware::error::HwError::Released);
        assert_eq!(
            map_hw_error(e.as_ref()),
            ServoError::HardwareFault("pwm released".into())
        );
    }
}

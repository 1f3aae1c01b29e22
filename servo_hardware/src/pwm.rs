//! Raspberry Pi backends: hardware PWM for the servo signal and a GPIO
//! photo-interrupter input.

use rppal::gpio::{Gpio, InputPin};
use rppal::pwm::{Channel, Polarity, Pwm};
use servo_traits::{EndStop, PwmOutput};
use tracing::{debug, warn};

use crate::error::{HwError, Result};

pub struct HardwarePwm {
    pwm: Pwm,
}

impl HardwarePwm {
    /// Open a hardware PWM channel (0 or 1) at `frequency_hz`, output disabled
    /// until the first duty write.
    pub fn new(channel: u8, frequency_hz: f64) -> Result<Self> {
        let channel = match channel {
            0 => Channel::Pwm0,
            1 => Channel::Pwm1,
            other => return Err(HwError::Pwm(format!("unsupported pwm channel {other}"))),
        };
        let pwm = Pwm::with_frequency(channel, frequency_hz, 0.0, Polarity::Normal, false)
            .map_err(|e| HwError::Pwm(e.to_string()))?;
        debug!(?channel, frequency_hz, "hardware pwm opened");
        Ok(Self { pwm })
    }
}

/// Map a 16-bit duty value to the 0.0..=1.0 fraction rppal expects.
#[inline]
fn duty_fraction(duty: u16) -> f64 {
    f64::from(duty) / f64::from(u16::MAX)
}

impl PwmOutput for HardwarePwm {
    fn set_duty(&mut self, duty: u16) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pwm
            .set_duty_cycle(duty_fraction(duty))
            .map_err(|e| HwError::Pwm(e.to_string()))?;
        if !self.pwm.is_enabled().unwrap_or(false) {
            self.pwm.enable().map_err(|e| HwError::Pwm(e.to_string()))?;
        }
        Ok(())
    }

    fn release(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Err(e) = self.pwm.disable() {
            warn!(error = %e, "failed to disable pwm");
            return Err(Box::new(HwError::Pwm(e.to_string())));
        }
        Ok(())
    }
}

/// Photo interrupter wired active-high with the internal pull-up enabled.
pub struct GpioEndStop {
    pin: InputPin,
}

impl GpioEndStop {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();
        Ok(Self { pin })
    }
}

impl EndStop for GpioEndStop {
    fn is_triggered(&mut self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pin.is_high())
    }
}

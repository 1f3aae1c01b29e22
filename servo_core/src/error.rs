use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServoError {
    #[error("no calibrated step covers {speed:.3} deg/s")]
    NoCoveringStep { speed: f64 },
    #[error("step {step} model cannot produce {speed:.3} deg/s")]
    InvalidModel { step: u32, speed: f64 },
    #[error("speed config is empty")]
    EmptySpeedConfig,
    #[error("no step produced an acceptable fit")]
    NoUsableSteps,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("motion interrupted; pwm released")]
    Interrupted,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for end-stop")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

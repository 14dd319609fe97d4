//! Error types shared by every layer of the engine.

/// Engine error types.
///
/// Variants produced on the audio thread only carry `Copy` data so that
/// building one never allocates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError
{
    /// Sample rate is not finite, not positive, or above the supported maximum.
    #[error("Invalid frequency: {0} Hz")]
    InvalidFrequency(f32),
    /// A tap delay in milliseconds is negative, not finite, or longer than the maximum delay.
    #[error("Invalid tap delay at index {index}: {delay_ms} ms")]
    InvalidTapDelay { index : usize, delay_ms : f32 },
    /// A tap offset in samples does not fit the delay buffer.
    #[error("Tap {index} at {offset} samples exceeds buffer capacity of {capacity} samples")]
    TapOutOfRange { index : usize, offset : usize, capacity : usize },
    /// More taps than the fixed tap table holds.
    #[error("Too many taps: {count} (maximum {max})")]
    TooManyTaps { count : usize, max : usize },
    /// An invalid parameter value was specified.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// A parameter update carried no data.
    #[error("Empty parameter update")]
    EmptyParameters,
    /// The control queue to the audio thread is full.
    #[error("Command queue is full")]
    QueueFull,
    /// The handle was never created or has already been destroyed.
    #[error("Invalid handle: {0}")]
    InvalidHandle(u32),
    /// A required pointer was null.
    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),
    /// The function was called incorrectly for the current state.
    #[error("Invalid use: {0}")]
    InvalidUse(&'static str),
    /// A preset could not be parsed or written.
    #[error("Config error: {0}")]
    Config(String),
}

impl EngineError
{
    /// Whether the error rejects a configuration change (previous state is kept).
    pub fn is_rejected_configuration(&self) -> bool
    {
        matches!(self,
            EngineError::InvalidFrequency(_)
            | EngineError::InvalidTapDelay { .. }
            | EngineError::TapOutOfRange { .. }
            | EngineError::TooManyTaps { .. }
            | EngineError::InvalidParameter(_)
            | EngineError::EmptyParameters
            | EngineError::Config(_))
    }
}

impl From<serde_json::Error> for EngineError
{
    fn from(error : serde_json::Error) -> Self { EngineError::Config(error.to_string()) }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

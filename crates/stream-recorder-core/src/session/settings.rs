use std::{path::PathBuf, time::Duration};

/// Default nominal frame rate written into containers.
pub const DEFAULT_FRAME_RATE: f64 = 20.0;
/// Default codec identifier.
pub const DEFAULT_CODEC: &str = "MJPG";
/// Default upper bound on the stop-time wait for the first write.
pub const DEFAULT_START_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(2);
/// Default upper bound on negotiating with a producer.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by every session a controller starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Directory segments are written into.
    pub output_dir: PathBuf,
    /// Nominal frames per second.
    pub frame_rate: f64,
    /// Codec identifier passed to the writer.
    pub codec: String,
    /// How long a stop waits for the first frame to be written.
    pub start_confirmation_timeout: Duration,
    /// How long a start may spend negotiating before it gives up.
    pub negotiation_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            frame_rate: DEFAULT_FRAME_RATE,
            codec: DEFAULT_CODEC.to_string(),
            start_confirmation_timeout: DEFAULT_START_CONFIRMATION_TIMEOUT,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
        }
    }
}

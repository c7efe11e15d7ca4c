use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("identifier 0x{0:X} does not fit in 11 bits")]
    InvalidIdentifier(u16),
    #[error("payload of {0} bytes exceeds the 8 byte frame limit")]
    PayloadTooLong(usize),
}

/// Errors from the fallible edge of the simulator, its configuration.
/// Simulation itself never fails; out-of-range input is clamped.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

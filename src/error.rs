//! Error taxonomy for guidance.
//!
//! Leaf errors belong to the seam that produces them (decoder, HTTP
//! transport, location provider, configuration). `GuidanceError` is what
//! the session surfaces to the rendering layer; every variant is
//! recoverable and leaves the session at its last good state.

/// Malformed encoded polyline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid polyline character {byte:#04x} at offset {offset}")]
    InvalidCharacter { offset: usize, byte: u8 },

    #[error("polyline ends inside a value at offset {offset}")]
    Truncated { offset: usize },

    #[error("polyline has a latitude without a longitude at offset {offset}")]
    UnpairedValue { offset: usize },

    #[error("polyline value at offset {offset} overflows 32 bits")]
    Overflow { offset: usize },
}

/// Failure of the HTTP transport used by the directions client.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),
}

/// Failure reported by the device location provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location provider unavailable: {0}")]
    Unavailable(String),
}

/// Invalid or incomplete configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("directions API key is missing")]
    MissingApiKey,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced by a guidance session.
#[derive(Debug, thiserror::Error)]
pub enum GuidanceError {
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("route unavailable: {0}")]
    RouteUnavailable(String),

    #[error("step {step} has a malformed polyline: {source}")]
    Decode {
        step: usize,
        #[source]
        source: DecodeError,
    },

    #[error("destination {0} has no AR link")]
    ArLinkUnavailable(u64),

    #[error("failed to open AR link: {0}")]
    LinkOpenFailed(String),
}

impl From<LocationError> for GuidanceError {
    fn from(e: LocationError) -> Self {
        GuidanceError::PositionUnavailable(e.to_string())
    }
}

impl From<TransportError> for GuidanceError {
    fn from(e: TransportError) -> Self {
        GuidanceError::RouteUnavailable(e.to_string())
    }
}

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("companion conversion failed: {0}")]
    CompanionConversionFailed(String),
    #[error("depth frame id [{depth}] doesn't match image frame id [{companion}]")]
    FrameIdMismatch { depth: String, companion: String },
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Transport(#[from] frame_transport::TransportError),
}

use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid topic name: {0}")]
    InvalidName(String),
    #[error("transport not supported by this backend: {0}")]
    UnsupportedTransport(String),
    #[error("publisher closed")]
    Closed,
}

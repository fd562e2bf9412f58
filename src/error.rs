/// Error types for package topology operations.
use thiserror::Error;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for topology operations.
#[derive(Error, Debug)]
pub enum Error {
    /// OPC package error
    #[error("OPC error: {0}")]
    Opc(#[from] crate::opc::error::OpcError),

    /// Missing part, relationship, or sidecar
    #[error("Not found: {0}")]
    NotFound(String),

    /// Slide, master, or layout selector outside valid bounds
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Structural invariant violated
    #[error("Inconsistent package: {0}")]
    Inconsistent(String),

    /// Malformed selector or unsupported input
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Opc(crate::opc::error::OpcError::from(err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Opc(crate::opc::error::OpcError::from(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Opc(crate::opc::error::OpcError::from(err))
    }
}

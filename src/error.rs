use thiserror::Error;

/// Failures surfaced by the acquisition side of the crate.
///
/// Expected conditions (malformed lines, analysis preconditions) are not
/// errors; those paths return `Option` instead.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Every open strategy failed. `details` names each strategy and the
    /// reason it failed, so callers never need to know which was tried.
    #[error("cannot open {device}: {details}")]
    Open { device: String, details: String },

    /// An I/O failure while the port was already streaming.
    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AcquireError>;

//! Conference and session error handling.

use std::{error::Error as StdError, fmt, io};

/// Errors arising from conference setup, admission, and the session loop.
///
/// Severity is positional: a [`Device`] failure is fatal for the session that
/// hit it but not for the conference; [`Locked`] is not an error at all from
/// the dialplan's point of view (the caller hears a prompt and the verb
/// returns success).
///
/// [`Device`]: Error::Device
/// [`Locked`]: Error::Locked
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The mixer device rejected an open or control operation on a
    /// session's behalf.
    Device(io::Error),
    /// A conference could not be provisioned: the device would not supply a
    /// new room, or a slot/memory limit was hit.
    OutOfResource,
    /// A malformed conference number, command, or PIN was supplied.
    InvalidInput(String),
    /// The conference is locked and the caller holds no admin credentials.
    Locked,
    /// The conference is full, or a configured exit condition was reached.
    Capacity,
    /// The far end hung up; the session tears down gracefully.
    PeerHangup,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Device(e) => write!(f, "mixer device failure: {}", e),
            Error::OutOfResource => write!(f, "out of conference resources"),
            Error::InvalidInput(what) => write!(f, "invalid input: {}", what),
            Error::Locked => write!(f, "conference is locked"),
            Error::Capacity => write!(f, "conference capacity reached"),
            Error::PeerHangup => write!(f, "peer hung up"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Device(e)
    }
}

/// Convenience type for conference error handling.
pub type Result<T> = std::result::Result<T, Error>;

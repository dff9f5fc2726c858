//! Password of the Day.
//!
//! # Components
//! - `derive`: daily password derivation from the seed.
//! - `validator`: maps a candidate password to a `PwdStatus`.

pub mod derive;
pub mod validator;

use core::fmt;

/// Errors related to PoD configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodError {
    /// Password length outside the supported range.
    InvalidLength,
    /// Grace window larger than supported.
    InvalidGraceWindow,
}

impl fmt::Display for PodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodError::InvalidLength => write!(f, "Password length out of range"),
            PodError::InvalidGraceWindow => write!(f, "Grace window out of range"),
        }
    }
}

impl std::error::Error for PodError {}

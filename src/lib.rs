//! MSO Management HAL.
//!
//! Password-of-the-day (PoD) validation for the MSO user of a broadband
//! device, and storage of the PoD seed it is derived from. The seed is kept
//! encrypted at rest and in memory, decrypted on demand, and persisted by a
//! worker thread so that provisioning never blocks the caller.
//!
//! Rust hosts use [`hal::MsoHal`]; C hosts link the static library and call
//! the entry points in [`ffi`].

pub mod clock;
pub mod config;
pub mod ffi;
pub mod hal;
pub mod pod;
pub mod seed;
pub mod storage;
pub mod types;

pub use hal::{HalError, MsoHal};
pub use types::PwdStatus;

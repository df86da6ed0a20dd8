//! Core registration values and change detection
//!
//! This library provides:
//! - The Registration value type shared by every snapshot source
//! - Content hashing and multiset snapshot equality
//! - Common error types

pub mod registration;
pub mod snapshot;
pub mod error;

pub use registration::{BackendAddress, Registration};
pub use snapshot::{snapshot_fingerprint, snapshots_equal, Snapshot};
pub use error::{CoreError, Result};

//! Cooperative cancellation for long-running retry loops.
//!
//! A bounded retry count times the sleep interval is the de facto timeout of
//! every poll; a [`CancellationToken`] lets a driver stop a poll early.

mod token;

pub use token::CancellationToken;

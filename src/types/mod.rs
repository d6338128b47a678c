//! Core value types.
//!
//! - [`tick`]: Logical time ([`Tick`])
//! - [`seq`]: Scheduling sequence numbers ([`Seq`])

pub mod seq;
pub mod tick;

pub use seq::Seq;
pub use tick::Tick;

//! The per-request text pipeline.
//!
//! Raw stdout chunks flow through [`EchoFilter`], then [`StopPolicy`], and
//! the policy's [`Verdict`]s are consumed by one of the two transformers.
//! Nothing in here touches a process or a timer, so every stage is driven
//! directly from tests.

mod ansi;
mod echo;
mod policy;
mod transform;

pub use ansi::strip_ansi_codes;
pub use echo::{EchoFilter, EchoMode, ParseEchoModeError};
pub use policy::{PolicyState, StopPolicy, Verdict};
pub use transform::{Aggregate, AggregateTransformer, StreamItem, StreamingTransformer};

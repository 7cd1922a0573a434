//! Hydrological analysis over digital elevation models
//!
//! - Breach depressions: carve channels out of sinks (optionally length,
//!   depth constrained, optionally stream-aware)
//! - Fill depressions: priority-flood filling with flat fixing
//! - D8 flow accumulation: single-direction contributing area
//! - FD8 flow accumulation: multiple-direction contributing area, with a
//!   parallel work-queue-group variant

pub(crate) mod breach;
mod breach_streams;
mod d8;
mod fd8;
mod fill;

pub use breach::{breach_depressions, BreachOutcome, BreachParams};
pub use breach_streams::breach_streams;
pub use d8::{d8_flow_accumulation, D8Outcome, D8Params};
pub use fd8::{fd8_flow_accumulation, Fd8Params};
pub use fill::{fill_depressions, FillParams};

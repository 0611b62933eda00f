//! Local store maintenance tools.

pub mod repair;
pub mod reset;

pub use repair::{QueueRepairParams, repair_impl};
pub use reset::{CacheResetParams, reset_impl};

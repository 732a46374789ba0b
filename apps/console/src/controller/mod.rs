//! Controller layer: notice modeling and command orchestration.

pub mod events;
pub mod orchestration;

//! Tool safety classification, batch planning, and the typed handler registry.

pub mod batch;
pub mod classifier;
pub mod registry;

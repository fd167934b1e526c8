//! Model backend contracts consumed by the engine.
//!
//! - `ModelClient`: performs one streaming model call
//! - `ContextCache` / `BoxContextCache`: provider-side cached prefix handles
//!
//! Concrete implementations live in fastpath-infra.

pub mod cache;
pub mod client;

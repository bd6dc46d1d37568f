//! rollcall-service — The caller-facing matching operations.
//!
//! [`RollcallService`] ties the identity store and the matching engine
//! together and enforces the enrollment rules (single unambiguous face
//! per enrollment, additive re-enrollment). It has no network surface of
//! its own; hosting layers call it in-process and map results onto
//! whatever transport they use.

mod config;
mod service;

pub use config::Config;
pub use service::{EnrollResult, RollcallService, ServiceError};

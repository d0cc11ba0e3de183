//! Feedback flow coordinator library
//!
//! Collects in-drive feedback into detailed flows, takes one-shot arrival
//! feedback, and notifies registered listeners when a flow finishes.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;

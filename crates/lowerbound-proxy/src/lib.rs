//! Intercepting HTTP proxy that paces response delivery so a page's resources
//! arrive in an order close to a previously recorded fetch order.
//!
//! The core is the [`admission::AdmissionQueue`]; [`classify`] decides each
//! response's priority and [`proxy`] wires the queue into the HTTP path.

pub mod admission;
pub mod classify;
pub mod cli;
pub mod config;
pub mod metrics;
pub mod proxy;
pub mod schedule;

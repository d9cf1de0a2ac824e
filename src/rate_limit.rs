//! Rate limiting primitives.
//!
//! This module provides the building blocks for admission control:
//! - [`AdmissionGate`]: a token bucket shared by every request handler.
//! - [`AdmissionLayer`]: Tower middleware that consults the gate before the protected call.
//!
//! # Architecture
//!
//! - **Gate**: `AdmissionGate` owns the bucket state behind a mutex. Refill is lazy: tokens
//!   accrue from elapsed time whenever an admission check runs, never from a background timer.
//! - **Middleware**: `AdmissionLayer` wraps the protected service. It doesn't know how the
//!   bucket works, only that a rejected request must not reach the inner service.
//!
//! There is exactly one gate per process. Per-client buckets and distributed state are
//! out of scope.

pub mod gate;
pub mod middleware;

pub use gate::AdmissionGate;
pub use middleware::{AdmissionLayer, AdmissionService};

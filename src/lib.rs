#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # faqgate
//!
//! A FAQ answering endpoint guarded by a single token-bucket admission gate.
//!
//! ## Features
//!
//! - **Admission gate**: one process-wide token bucket with lazy, time-proportional refill
//! - **Tower middleware** that rejects requests before the protected call runs
//! - **Two answer modes** chosen at startup: hosted language model or local FAQ lookup
//! - **Hot-replaceable knowledge base** and an append-only query log
//!
//! ## Quick Start
//!
//! ```rust
//! use faqgate::{AdmissionGate, AdmissionLayer};
//! use std::sync::Arc;
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = Arc::new(AdmissionGate::new(20.0, 5.0).unwrap());
//!     let svc = ServiceBuilder::new()
//!         .layer(AdmissionLayer::new(gate))
//!         .service_fn(|q: &'static str| async move { Ok::<_, std::io::Error>(q.len()) });
//!
//!     let answer = svc.oneshot("how long is this?").await;
//!     assert!(answer.is_ok());
//! }
//! ```

pub mod answer;
pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod query_log;
pub mod rate_limit;
pub mod remote;

// Re-exports
pub use answer::{Answer, AnswerMode, AnswerService, EmptyQuestion, Question};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{AnswerModeKind, GateConfig, ServiceConfig};
pub use error::{AdmissionError, GateConfigError};
pub use knowledge::{FaqEntry, KnowledgeBase, KnowledgeBaseFile};
pub use query_log::{JsonlQueryLog, MemoryQueryLog, QueryLog, QueryRecord};
pub use rate_limit::{AdmissionGate, AdmissionLayer, AdmissionService};
pub use remote::{ChatCompleter, OpenAiClient, RemoteError};

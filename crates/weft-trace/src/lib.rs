//! Event model and execution traces for weft.
//!
//! Every controlled execution produces one [`trace::ExecutionTrace`]: the
//! totally ordered sequence of [`events::Event`]s emitted by the logical
//! threads of the program under test, together with the grant schedule
//! that produced it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Program threads (ThreadCtx) │
//! └──────────────┬───────────────┘
//!                │ hook calls
//! ┌──────────────▼───────────────┐
//! │  Coordinator / driver        │
//! │    → Event (thread, serial)  │
//! │    → Grant (schedule entry)  │
//! └──────────────┬───────────────┘
//!                │
//! ┌──────────────▼───────────────┐
//! │  ExecutionTrace              │
//! │    → save / load (JSON)      │
//! │    → DeterminismVerifier     │
//! │    → replay schedules        │
//! └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use weft_trace::trace::ExecutionTrace;
//! use weft_trace::verifier::DeterminismVerifier;
//!
//! let a = ExecutionTrace::load("run1.json").unwrap();
//! let b = ExecutionTrace::load("run2.json").unwrap();
//! let result = DeterminismVerifier::compare(&a, &b);
//! println!("{}", result);
//! ```

pub mod events;
pub mod trace;
pub mod verifier;

pub use events::{Event, EventKind, EventType, Location, MonitorId, ObjectId, ThreadId, Value};
pub use trace::{ExecutionTrace, Grant, TraceError};

//! Controlled-schedule runtime for weft.
//!
//! Program threads run as real OS threads, but only one of them holds the
//! grant at any instant. Every hook call on [`context::ThreadCtx`] is a
//! suspension point: the thread posts a request, parks on its own
//! [`registry::Permit`], and the [`driver::SchedulerDriver`] decides who
//! runs next by consulting a [`strategy::SearchStrategy`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Program under test                     │
//! │    ThreadCtx hooks, Shared<T>, Monitor  │
//! └──────────────┬──────────────────────────┘
//!                │ PendingRequest
//! ┌──────────────▼──────────────────────────┐
//! │  SchedulerDriver                        │
//! │    → CoordinatorState::dispatch         │
//! │    → WaitForGraph (deadlock check)      │
//! │    → pick_next_thread(strategy)         │
//! │    → Permit::grant                      │
//! └──────────────┬──────────────────────────┘
//!                │
//! ┌──────────────▼──────────────────────────┐
//! │  IterationResult { outcome, trace }     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft_runtime::coordinator::Coordinator;
//! use weft_runtime::driver::{program, DriverConfig, SchedulerDriver};
//! use weft_runtime::random::RandomStrategy;
//! use weft_runtime::sync::Shared;
//!
//! let coordinator = Arc::new(Coordinator::new());
//! let mut strategy = RandomStrategy::new(42, 1);
//! let config = DriverConfig::default();
//! let result = SchedulerDriver::new(&coordinator, &mut strategy, &config)
//!     .run(program(|ctx| {
//!         let x = Arc::new(Shared::new(ctx, "Main", "x", 0i64));
//!         let w = {
//!             let x = Arc::clone(&x);
//!             ctx.spawn(move |ctx| x.write(ctx, 1))
//!         };
//!         x.read(ctx);
//!         w.join(ctx);
//!     }))
//!     .unwrap();
//! println!("{}", result.outcome);
//! ```

pub mod context;
pub mod coordinator;
pub mod deadlock;
pub mod driver;
pub mod error;
pub mod outcome;
pub mod random;
pub mod registry;
pub mod strategy;
pub mod sync;

pub use context::{IterationAborted, MonitorGuard, SpawnHandle, ThreadCtx};
pub use coordinator::{Coordinator, CoordinatorState, PendingRequest, Request};
pub use driver::{program, DriverConfig, IterationResult, Program, SchedulerDriver};
pub use error::SchedulerError;
pub use outcome::{AbortReason, DeadlockKind, Outcome};
pub use random::RandomStrategy;
pub use registry::{ThreadHandle, ThreadState};
pub use strategy::{pick_next_thread, SearchStrategy};
pub use sync::{Monitor, Shared, Task};

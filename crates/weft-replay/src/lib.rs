//! Deterministic replay and bug persistence for weft.
//!
//! A controlled execution is fully determined by its grant schedule, so a
//! failing iteration can be reproduced from the recorded trace alone.
//!
//! # Core Capabilities
//!
//! 1. **Record:** wrap a failing iteration's outcome and trace in a [`BugRecord`]
//! 2. **Persist:** save/load records as JSON, render markdown bug reports
//! 3. **Replay:** [`ReplayStrategy`] re-grants the recorded schedule and
//!    aborts with a replay mismatch as soon as the program diverges
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use weft_replay::{load_bug_record, ReplayStrategy};
//! use weft_runtime::{program, Coordinator, DriverConfig, SchedulerDriver};
//!
//! let record = load_bug_record(Path::new("bugs/lock-order-deadlock-0003.json")).unwrap();
//! let mut strategy = ReplayStrategy::from_record(&record);
//! let coordinator = Arc::new(Coordinator::new());
//! let config = DriverConfig::default();
//! let result = SchedulerDriver::new(&coordinator, &mut strategy, &config)
//!     .run(program(|_ctx| { /* same program as recorded */ }))
//!     .unwrap();
//! assert_eq!(result.outcome, record.outcome);
//! ```

pub mod record;
pub mod replay;
pub mod serialize;

pub use record::{BugRecord, FORMAT_VERSION};
pub use replay::ReplayStrategy;
pub use serialize::{
    format_bug_markdown, load_bug_record, save_bug_record, save_bug_report, SerializeError,
};

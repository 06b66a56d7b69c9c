//! Background status & tool-discovery worker
//!
//! One recurring job, `check_all_servers`: probe every enabled server with
//! a one-shot connection test, sync its tool inventory on success, and
//! persist status and errors. Missed runs coalesce, the job never overlaps
//! itself beyond `max_instances`, and configuration edits at runtime
//! reschedule the loop in place.

pub mod worker;

pub use worker::{JobRun, StatusWorker};

//! Concurrent, cancellable, priority-aware request scheduling.
//!
//! The scheduler bounds how many chunk fetches run at once and makes sure
//! identical work is only done once:
//!
//! - [`RequestScheduler`] - keyed async queue with two FIFO lanes
//! - [`RequestHandle`] - clonable future shared by every requester of a key
//! - [`RequestContext`] - what a running action sees (key, cancellation)
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use volstream::scheduler::{RequestScheduler, SchedulerConfig};
//!
//! let scheduler = RequestScheduler::new(SchedulerConfig::default())?;
//!
//! // Visible data goes through the regular lane.
//! let handle = scheduler.add_request(key, |ctx| fetch(ctx), false, Duration::ZERO);
//!
//! // Prefetch of the next time point waits behind all regular work.
//! scheduler.add_request(next_key, |ctx| fetch(ctx), true, Duration::from_millis(200));
//! ```

mod config;
mod core;
mod error;
mod handle;
mod lanes;

pub use config::{SchedulerConfig, DEFAULT_MAX_ACTIVE, DEFAULT_MAX_LOW_PRIORITY_ACTIVE};
pub use core::{RequestScheduler, SchedulerStats};
pub use error::{BoxError, RequestError, DEFAULT_CANCEL_REASON};
pub use handle::{RequestContext, RequestHandle};
pub use lanes::{Lane, LaneQueues};

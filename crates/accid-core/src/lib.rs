//! Runtime plumbing for accid.
//!
//! This crate provides the single-threaded runtime the identifier core is
//! driven by:
//!
//! - **Timers**: a one-shot timer queue with cancellable callbacks
//! - **Event Loop**: a cooperative loop that dispatches due timers on the
//!   owner thread, with a `Send` proxy for other threads
//! - **Timer Service**: the [`TimerService`] trait the identifier core
//!   schedules its delayed flush through
//! - **Logging**: `tracing` targets and helpers
//!
//! With the `tokio` feature, [`TokioTimerService`] runs timers as tokio
//! local tasks instead.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use accid_core::{EventLoop, TimerService};
//!
//! let event_loop = EventLoop::with_manual_clock();
//! let id = event_loop
//!     .schedule_one_shot(Duration::from_secs(1), Box::new(|| println!("fired")))
//!     .unwrap();
//! assert!(event_loop.is_armed(id));
//!
//! event_loop.run_until_idle();
//! assert!(!event_loop.is_armed(id));
//! ```

mod error;
mod event;
mod event_loop;
pub mod logging;
mod service;
mod timer;
#[cfg(feature = "tokio")]
mod tokio_timer;

pub use error::{CoreError, Result, TimerError};
pub use event::LoopEvent;
pub use event_loop::{EventLoop, EventLoopProxy};
pub use logging::PerfSpan;
pub use service::TimerService;
pub use timer::{TimerCallback, TimerId, TimerQueue};
#[cfg(feature = "tokio")]
pub use tokio_timer::TokioTimerService;

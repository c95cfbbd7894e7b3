// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weave-bus: schedules processors over a shared stream of diffs.
//!
//! Each [`Processor`] sits behind a [`ProcessorPort`] that coalesces input
//! while the processor is busy. The [`ModificationBus`] routes collections
//! between ports by element type and keeps a [`BusStateCache`] so that ports
//! registered late start from the current state.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod bus;
mod cache;
pub mod config;
mod limiter;
mod port;
mod processor;
mod stream;

pub use bus::{BusError, DiffInterceptor, LoggingInterceptor, ModificationBus, EXTERNAL_ORIGIN};
pub use cache::BusStateCache;
pub use config::{BusConfig, ConfigError, ConfigService, ConfigStore, StrategyKind};
pub use limiter::{ExecutorLimiter, WorkerPool};
pub use port::{ModificationPort, ProcessorPort};
pub use processor::Processor;
pub use stream::{diff_channel, Broadcaster, DiffSink, DiffStream};

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Processor contract.
use weave_core::{ElementType, TimedDiffCollection};

/// A transformation stage on the bus.
///
/// `process` runs on the blocking worker pool and may compute for arbitrary
/// time. It is never invoked more than [`max_thread_number`] times at once
/// for the same port.
///
/// [`max_thread_number`]: Processor::max_thread_number
pub trait Processor: Send + Sync + 'static {
    /// Stable id, used for logging.
    fn id(&self) -> &str;

    /// Types this stage is woken for (OR, subtype-aware).
    fn consumes(&self) -> Vec<ElementType>;

    /// Derives new diffs from an input batch.
    ///
    /// # Errors
    /// Any error is logged by the port and the batch is dropped.
    fn process(&self, diffs: TimedDiffCollection) -> anyhow::Result<TimedDiffCollection>;

    /// Concurrency ceiling for this stage.
    fn max_thread_number(&self) -> usize {
        1
    }
}

//! Q-gram enumeration, counting and top-K ranking over bounded-alphabet
//! sequences.
//!
//! The building blocks live in [`core`]: an exact rolling [`QgramCodec`], a
//! [`ThreadSlotRegistry`] and [`WorkQueue`] for the worker pool, the
//! [`ScopedMutex`] used by the aggregator, and the bounded [`TopKSelector`].
//! [`core::engine::run`] ties them together.

pub mod core;

pub use crate::core::alphabet::Alphabet;
pub use crate::core::codec::{QgramCode, QgramCodec, QgramIter, QgramWindow, max_q};
pub use crate::core::engine::{QgramCounts, RankedQgram, RunConfig, RunOutput, count, run};
pub use crate::core::error::QgramError;
pub use crate::core::lock::ScopedMutex;
pub use crate::core::queue::WorkQueue;
pub use crate::core::slots::ThreadSlotRegistry;
pub use crate::core::table::CountTable;
pub use crate::core::topk::TopKSelector;

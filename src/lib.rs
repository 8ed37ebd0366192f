//! # lossyring
//!
//! A lock-free, fixed-capacity, *lossy* ring buffer for many producers and
//! a single consumer.
//!
//! Unlike a bounded queue, the ring never applies backpressure: a producer
//! that outruns the consumer silently overwrites the oldest unread entry in
//! its slot. This makes it a building block for telemetry, sampling, and
//! event-notification pipelines where the newest data matters more than
//! guaranteed delivery of every item.
//!
//! ## Design Goals
//!
//! - Wait-free push: one atomic increment plus one atomic swap, no retries
//! - Wait-free polling read: absence of data is a return value, not an error
//! - No locks, no blocking, bounded time for every operation
//! - Single contiguous allocation for the slot array (no pointer chasing on
//!   the index path)
//! - Single-consumer constraint enforced by the type system: the receiving
//!   handle cannot be cloned and its read methods take `&mut self`
//!
//! ## Example
//!
//! ```
//! use lossyring::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel::<u64>(4);
//!
//! // Nine writes land in four slots: the five oldest values are gone.
//! for i in 0..9 {
//!     tx.send(i).unwrap();
//! }
//!
//! let sample = rx.try_recv().unwrap();
//! assert_eq!(sample.value, 8); // slot 0 last held sequence 8
//! assert!(sample.fresh);
//! ```
//!
//! ## Loss is not an error
//!
//! Overwriting an unread entry is the documented contract, not a failure.
//! The consumer observes loss indirectly: a read reports whether the entry
//! it found is still *fresh* relative to the consumer's own cursor. See
//! [`mpsc::Freshness`] for the exact comparison.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod mpsc;

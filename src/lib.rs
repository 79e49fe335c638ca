//! A gate deciding *when* a garbage collection cycle may begin.
//!
//! `gc-delay` coordinates the collection driver of a managed-memory runtime with the mutator
//! threads running alongside it. Mutators mark regions that must never overlap a collection
//! (raw pointer manipulation and the like) as disallow-zones. The driver asks for permission to
//! start a collection epoch and waits, for a bounded time, until no such region is active. A
//! mutator about to idle can hand its idle time to the collector by releasing the epoch early.
//!
//! # Examples
//!
//! A mutator inside a disallow-zone holds back the collection until it leaves:
//! ```
//! use crossbeam_utils::thread;
//! use gc_delay::{delay::GcDelay, epoch::Epoch};
//! use std::time::Duration;
//!
//! let delay = GcDelay::new();
//! let zone = delay.disallow();
//! thread::scope(|s| {
//!     s.spawn(|_| assert!(delay.wait_gc_allowed(Epoch::new(1), Duration::from_secs(60))));
//!     std::thread::sleep(Duration::from_millis(10));
//!     drop(zone);
//! })
//! .unwrap();
//! ```
//!
//! A mutator that is going to block anyway lets the epoch through without leaving its zone:
//! ```
//! # use gc_delay::{delay::GcDelay, epoch::Epoch};
//! # use std::time::Duration;
//! let delay = GcDelay::new();
//! let _zone = delay.disallow();
//! delay.on_mutator_will_wait_for_gc(Epoch::new(1));
//! assert!(delay.wait_gc_allowed(Epoch::new(1), Duration::from_secs(0)));
//! assert!(!delay.wait_gc_allowed(Epoch::new(2), Duration::from_millis(1)));
//! ```
//!
//! # Features
//!
//! * `stats`: per-thread counters of waits, timeouts and assists, see [`stats`].
//! * `coarse-accounting`: default [`Accounting`](alloc::Accounting) to the pool's own size query.
//! * `compaction`: enable compaction by default.
//!
//! Both accounting defaults can be overridden at startup, see [`Config::from_env`].
//!
//! [`Config::from_env`]: config::Config::from_env

#![warn(macro_use_extern_crate)]
#![warn(missing_debug_implementations)]
#![warn(unused_lifetimes)]
#![cfg_attr(not(test), warn(unused_results))]
#![deny(rust_2018_compatibility)]
#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]

#[macro_use]
mod internal;

pub mod alloc;
pub mod clock;
pub mod config;
pub mod delay;
pub mod epoch;
pub mod error;
pub mod stats;

pub use delay::{DisallowGuard, GcDelay};
pub use epoch::Epoch;
pub use error::{Error, Result};

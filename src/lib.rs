//! `flaglet` is the client-side evaluation core of a feature-flagging and experimentation
//! SDK. Given a fetched flag configuration, a subject identifier, and subject attributes, it
//! deterministically decides which variation the subject receives and makes sure each distinct
//! decision is delivered to an analytics sink at most once.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that evaluates feature flags for `subjects`, where
//! each subject has a unique key and key-value [`Attributes`] associated with it.
//!
//! [`FlagsConfiguration`](flags::FlagsConfiguration) is an immutable snapshot of all
//! server-provided flag configuration. It is only ever replaced as a whole, never patched in
//! place. [`ConfigurationStore`](configuration_store::ConfigurationStore) is the thread-safe
//! holder of the currently active snapshot: readers always observe either the old or the new
//! snapshot in full.
//!
//! [`Client::load`] drives the load lifecycle. Evaluation calls fail with
//! [`Error::NotLoaded`] until the first load succeeds; afterwards they are cheap, synchronous,
//! and keep serving the previous snapshot while a forced reload is in flight.
//!
//! Flag evaluation itself ([`eval::evaluate_flag`]) is a pure function with no awareness of
//! caching or logging. The client feeds its result through an optional
//! [`AssignmentCache`](assignment_cache::AssignmentCache) so that an
//! [`AssignmentLogger`](assignment_logger::AssignmentLogger) sees each distinct
//! (subject, flag, allocation, variation) decision once.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Callers relying on the default-value getters
//! never observe an error for "subject doesn't qualify"; only structural failures (missing
//! configuration, type mismatches, invalid input) are raised.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate for diagnostic
//! messages. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod assignment_cache;
pub mod assignment_logger;
pub mod configuration_fetcher;
pub mod configuration_store;
pub mod eval;
pub mod flags;
pub mod rules;
pub mod sharder;

mod attributes;
mod client;
mod config;
mod error;
mod lifecycle;
mod obfuscation;

pub use attributes::{AttributeValue, Attributes};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};

// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Collaborator adapters for AuditBench.
//!
//! The benchmark harness treats the audit engine and repository provisioning
//! as black boxes. This crate is the only place that knows how to talk to
//! them; see [`upstream`] for the individual adapters.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod upstream;

pub use upstream::prelude::*;

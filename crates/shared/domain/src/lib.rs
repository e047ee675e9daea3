//! # Domain Models
//!
//! This crate contains pure domain types with minimal dependencies (`serde`, `chrono`).
//! Keep it lean: no I/O, networking, or storage. Just data, wire messages and the
//! field validators every entry point shares.

pub mod config;
pub mod file;
pub mod identity;
pub mod secret;
pub mod validation;

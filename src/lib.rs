//! Vendor Harvest - a resumable batch orchestration engine.
//!
//! Walks a catalog of locations in fixed-size batches, fans each batch out to
//! a bounded worker pool under a global rate limit, deduplicates the records
//! the workers return, and persists progress so an interrupted run resumes
//! where it stopped.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod harvest;
pub mod limiter;
pub mod persistence;
pub mod server;
pub mod types;

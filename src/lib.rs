//! # Wellsync Jobs Library
//!
//! Core functionality for the Wellsync background-job and sync service:
//! the job store and runner, error tracking, status aggregation, and the
//! blocking sync orchestrator, plus the HTTP surface over them.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod errors;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;

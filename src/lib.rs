//! Bitbucket PR builder - builds pull requests on Bitbucket webhook events.
//!
//! This library provides webhook ingress, the per-job trigger engine, an
//! in-process job runner, and the client that reports build statuses back to
//! Bitbucket.

pub mod bitbucket;
pub mod config;
pub mod runner;
pub mod server;
pub mod trigger;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;

// Library surface for the noesis binary and its integration tests.
pub mod aggregator;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod forensic;
pub mod logging;
pub mod observability;
pub mod orchestrator;
pub mod session;
pub mod tracker;
pub mod types;
pub mod workflow;

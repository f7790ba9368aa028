// ABOUTME: Library root for ccdeploy - chaincode lifecycle orchestration.
// ABOUTME: The ccdeploy binary in main.rs drives it through the CLI.

pub mod authz;
pub mod broadcast;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod orchestrator;
pub mod output;
pub mod resilience;
pub mod store;
pub mod tracker;
pub mod types;

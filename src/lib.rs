// ABOUTME: Library root for the Cloudant mesh replicator
// ABOUTME: Links regional accounts so each database replicates continuously between all of them

pub mod account;
pub mod config;
pub mod error;
pub mod remote;
pub mod replication;

pub use account::Account;
pub use config::MeshConfig;
pub use error::MeshError;
pub use remote::CloudantClient;
pub use replication::{Orchestrator, RunReport, Sessions, Stage};

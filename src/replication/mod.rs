// ABOUTME: Full-mesh replication setup across Cloudant accounts
// ABOUTME: One module per phase, fanned out concurrently and joined by a collector

pub mod collector;
pub mod documents;
pub mod orchestrator;
pub mod permissions;
pub mod provision;
pub mod session;

pub use collector::Phase;
pub use documents::create_replication_documents;
pub use orchestrator::{Orchestrator, RunReport, Stage};
pub use permissions::share_database;
pub use provision::create_replicator_databases;
pub use session::Sessions;

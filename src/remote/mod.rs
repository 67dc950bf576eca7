// ABOUTME: Cloudant HTTP API access
// ABOUTME: Request helper, session login and wire document types

pub mod client;
pub mod models;

pub use client::{CloudantClient, Payload};
pub use models::{OperationResult, ReplicationDoc, SecurityDocument};

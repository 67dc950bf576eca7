// ABOUTME: Custom error types for the mesh replicator
// ABOUTME: Distinguishes fatal setup errors from per-phase aggregate failures

use std::fmt;

#[derive(Debug)]
pub enum MeshError {
    Connection(String),
    Authentication(String),
    Validation(String),
    /// One or more tasks inside a phase reported an error.
    Phase {
        phase: String,
        failures: Vec<String>,
    },
    /// The run finished but at least one phase failed.
    Incomplete(Vec<String>),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeshError::Connection(msg) => write!(f, "Connection error: {}", msg),
            MeshError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            MeshError::Validation(msg) => write!(f, "Validation error: {}", msg),
            MeshError::Phase { phase, failures } => write!(
                f,
                "{} reported {} error(s): {}",
                phase,
                failures.len(),
                failures.join("; ")
            ),
            MeshError::Incomplete(phases) => write!(
                f,
                "Replication setup incomplete, failed phases: {}",
                phases.join(", ")
            ),
        }
    }
}

impl std::error::Error for MeshError {}

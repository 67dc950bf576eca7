// ABOUTME: Drives the full-mesh setup phase by phase across all accounts
// ABOUTME: Failed phases are recorded, never abort the run, and sessions always end

use std::fmt;
use tracing::{error, info};

use super::documents::create_replication_documents;
use super::permissions::share_database;
use super::provision::create_replicator_databases;
use super::session::Sessions;
use crate::config::validate_databases;
use crate::error::MeshError;
use crate::remote::CloudantClient;

/// Position in the run: `Idle -> Provisioning -> (Sharing -> Replicating)* -> Terminating -> Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Provisioning,
    Sharing(String),
    Replicating(String),
    Terminating,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Provisioning => write!(f, "provisioning replicator databases"),
            Stage::Sharing(db) => write!(f, "sharing '{}'", db),
            Stage::Replicating(db) => write!(f, "replicating '{}'", db),
            Stage::Terminating => write!(f, "terminating sessions"),
            Stage::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug)]
pub struct PhaseReport {
    pub stage: Stage,
    pub outcome: Result<(), MeshError>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.phases.iter().all(|p| p.outcome.is_ok())
    }

    pub fn failed_stages(&self) -> Vec<&Stage> {
        self.phases
            .iter()
            .filter(|p| p.outcome.is_err())
            .map(|p| &p.stage)
            .collect()
    }

    pub fn into_result(self) -> Result<(), MeshError> {
        if self.is_success() {
            return Ok(());
        }
        Err(MeshError::Incomplete(
            self.failed_stages().iter().map(|s| s.to_string()).collect(),
        ))
    }
}

pub struct Orchestrator {
    client: CloudantClient,
    databases: Vec<String>,
    stage: Stage,
}

impl Orchestrator {
    pub fn new(client: CloudantClient, databases: Vec<String>) -> Result<Self, MeshError> {
        if databases.is_empty() {
            return Err(MeshError::Validation(
                "no databases selected for replication".to_string(),
            ));
        }
        validate_databases(&databases)?;
        Ok(Self {
            client,
            databases,
            stage: Stage::Idle,
        })
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Runs every phase in order and terminates `sessions` last, whatever the
    /// earlier phases reported.
    pub async fn run(&mut self, sessions: Sessions) -> RunReport {
        let mut report = RunReport::default();
        let accounts = sessions.accounts().clone();

        self.enter(Stage::Provisioning);
        let outcome = create_replicator_databases(&self.client, &accounts).await;
        self.record(&mut report, outcome);

        for db in self.databases.clone() {
            self.enter(Stage::Sharing(db.clone()));
            let outcome = share_database(&self.client, &accounts, &db).await;
            self.record(&mut report, outcome);

            self.enter(Stage::Replicating(db.clone()));
            let outcome = create_replication_documents(&self.client, &accounts, &db).await;
            self.record(&mut report, outcome);
        }

        drop(accounts);
        self.enter(Stage::Terminating);
        let outcome = sessions.terminate(&self.client).await;
        self.record(&mut report, outcome);

        self.enter(Stage::Done);
        report
    }

    fn enter(&mut self, stage: Stage) {
        info!("Stage: {}", stage);
        self.stage = stage;
    }

    fn record(&self, report: &mut RunReport, outcome: Result<(), MeshError>) {
        if let Err(e) = &outcome {
            error!("{}", e);
        }
        report.phases.push(PhaseReport {
            stage: self.stage.clone(),
            outcome,
        });
    }
}

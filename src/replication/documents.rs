// ABOUTME: Creates one continuous replication job per ordered pair of accounts
// ABOUTME: Jobs live in the target's _replicator database and pull from the source

use reqwest::{Method, StatusCode};
use std::sync::Arc;

use super::collector::Phase;
use super::provision::REPLICATOR_DB;
use crate::account::Account;
use crate::error::MeshError;
use crate::remote::{CloudantClient, OperationResult, Payload, ReplicationDoc};

/// Every `(target, source)` index pair with `target != source`.
pub fn ordered_pairs(count: usize) -> Vec<(usize, usize)> {
    (0..count)
        .flat_map(|target| {
            (0..count)
                .filter(move |&source| source != target)
                .map(move |source| (target, source))
        })
        .collect()
}

pub fn replication_doc(source: &Account, target: &Account, db: &str) -> ReplicationDoc {
    ReplicationDoc {
        id: ReplicationDoc::job_id(&source.username, db),
        source: source.database_url(db),
        target: target.database_url(db),
        create_target: false,
        continuous: true,
    }
}

pub async fn create_replication_documents(
    client: &CloudantClient,
    accounts: &Arc<Vec<Account>>,
    db: &str,
) -> Result<(), MeshError> {
    let pairs = ordered_pairs(accounts.len());
    let phase = Phase::new(
        format!("Creating replication documents for '{}'", db),
        pairs.len(),
    );

    for (target, source) in pairs {
        let tx = phase.sender();
        let client = client.clone();
        let accounts = Arc::clone(accounts);
        let db = db.to_string();
        tokio::spawn(async move {
            let result =
                create_replication_document(&client, &accounts[target], &accounts[source], &db)
                    .await;
            let _ = tx.send(result).await;
        });
    }

    phase.collect().await
}

async fn create_replication_document(
    client: &CloudantClient,
    target: &Account,
    source: &Account,
    db: &str,
) -> OperationResult {
    let doc = replication_doc(source, target, db);
    let body = match serde_json::to_value(&doc) {
        Ok(body) => body,
        Err(e) => {
            return OperationResult::failed(
                Method::POST,
                &target.database_url(REPLICATOR_DB),
                format!("Failed to encode {}: {}", doc.id, e),
            )
        }
    };

    client
        .request(
            Method::POST,
            &target.database_url(REPLICATOR_DB),
            Payload::Json(body),
            target.json_headers(),
        )
        .await
        .require_status(&[StatusCode::CREATED, StatusCode::CONFLICT], || {
            format!("Trouble creating {} for '{}'", doc.id, target.endpoint)
        })
}

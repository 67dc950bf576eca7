// ABOUTME: Ensures every account has a _replicator database to hold job documents
// ABOUTME: Treats an already existing database as success so reruns stay clean

use reqwest::{Method, StatusCode};
use std::sync::Arc;

use super::collector::Phase;
use crate::account::Account;
use crate::error::MeshError;
use crate::remote::{CloudantClient, OperationResult, Payload};

pub const REPLICATOR_DB: &str = "_replicator";

pub async fn create_replicator_databases(
    client: &CloudantClient,
    accounts: &Arc<Vec<Account>>,
) -> Result<(), MeshError> {
    let phase = Phase::new("Creating replicator databases", accounts.len());

    for index in 0..accounts.len() {
        let tx = phase.sender();
        let client = client.clone();
        let accounts = Arc::clone(accounts);
        tokio::spawn(async move {
            let result = create_replicator_database(&client, &accounts[index]).await;
            let _ = tx.send(result).await;
        });
    }

    phase.collect().await
}

async fn create_replicator_database(client: &CloudantClient, account: &Account) -> OperationResult {
    let url = account.database_url(REPLICATOR_DB);
    client
        .request(Method::PUT, &url, Payload::Empty, account.json_headers())
        .await
        .require_status(
            &[StatusCode::CREATED, StatusCode::PRECONDITION_FAILED],
            || format!("replicator database status unknown for '{}'", account.endpoint),
        )
}

// ABOUTME: Grants every other account read and replicate access on a database
// ABOUTME: Read-merge-write of the _security document so unrelated grants survive

use reqwest::{Method, StatusCode};
use std::sync::Arc;

use super::collector::{Phase, ResultSender};
use crate::account::Account;
use crate::error::MeshError;
use crate::remote::models::{READER_ROLE, REPLICATOR_ROLE};
use crate::remote::{CloudantClient, OperationResult, Payload, SecurityDocument};

/// Roles each peer needs to pull from a database.
pub const PEER_ROLES: [&str; 2] = [READER_ROLE, REPLICATOR_ROLE];

fn security_url(account: &Account, db: &str) -> String {
    format!(
        "{}/_api/v2/db/{}/_security",
        account.url,
        urlencoding::encode(db)
    )
}

/// Adds [`PEER_ROLES`] for every account except `owner` to `doc`. Fails
/// without touching `doc` when its grants are not a username map.
pub fn merge_peer_grants(
    doc: &mut SecurityDocument,
    owner: &str,
    accounts: &[Account],
) -> Result<(), MeshError> {
    if !doc.accepts_grants() {
        return Err(MeshError::Validation(
            "role grants are not a username map".to_string(),
        ));
    }
    for peer in accounts.iter().filter(|a| a.username != owner) {
        doc.grant(&peer.username, &PEER_ROLES);
    }
    Ok(())
}

/// Shares `db` on every account. Each account contributes a GET and a PUT
/// result, the PUT being a skipped placeholder when the GET failed.
pub async fn share_database(
    client: &CloudantClient,
    accounts: &Arc<Vec<Account>>,
    db: &str,
) -> Result<(), MeshError> {
    let phase = Phase::new(
        format!("Modifying database permissions for '{}'", db),
        accounts.len() * 2,
    );

    for index in 0..accounts.len() {
        let tx = phase.sender();
        let client = client.clone();
        let accounts = Arc::clone(accounts);
        let db = db.to_string();
        tokio::spawn(async move {
            share_on_account(&client, &accounts, index, &db, tx).await;
        });
    }

    phase.collect().await
}

/// Sends the GET result and then the PUT result for one account.
///
/// The PUT is skipped when the document could not be read or merged. Any
/// non-2xx PUT status is reported as an error rather than passed through as
/// success, so a rejected write shows up in the phase aggregate.
async fn share_on_account(
    client: &CloudantClient,
    accounts: &[Account],
    index: usize,
    db: &str,
    tx: ResultSender,
) {
    let account = &accounts[index];
    let url = security_url(account, db);

    let get = client
        .request(Method::GET, &url, Payload::Empty, account.cookie_headers())
        .await
        .require_status(&[StatusCode::OK], || {
            format!("Permissions GET request failed for '{}'", account.endpoint)
        });

    // `Err(None)`: the GET itself failed; `Err(Some(..))`: it returned a
    // document that cannot be merged.
    let merged = if get.is_error() {
        Err(None)
    } else {
        match SecurityDocument::parse(&get.body) {
            Err(_) => Err(Some(format!(
                "Permissions document for '{}' is not a JSON object",
                account.endpoint
            ))),
            Ok(mut doc) => match merge_peer_grants(&mut doc, &account.username, accounts) {
                Ok(()) => Ok(doc),
                Err(e) => Err(Some(format!(
                    "Permissions document for '{}' cannot be merged: {}",
                    account.endpoint, e
                ))),
            },
        }
    };

    let doc = match merged {
        Ok(doc) => doc,
        Err(reason) => {
            let get = match reason {
                Some(reason) => OperationResult {
                    error: Some(reason),
                    ..get
                },
                None => get,
            };
            let _ = tx.send(get).await;
            let skipped = OperationResult::skipped(
                Method::PUT,
                &url,
                format!("Did not execute for '{}' due to GET failure", account.endpoint),
            );
            let _ = tx.send(skipped).await;
            return;
        }
    };
    let _ = tx.send(get).await;

    let body = serde_json::Value::Object(doc.into_inner());
    let put = client
        .request(Method::PUT, &url, Payload::Json(body), account.json_headers())
        .await;
    let put = if put.is_error() || put.status.map_or(false, |s| s.is_success()) {
        put
    } else {
        let status = put.status.map(|s| s.to_string()).unwrap_or_default();
        OperationResult {
            error: Some(format!(
                "Permissions PUT for '{}' returned {}",
                account.endpoint, status
            )),
            ..put
        }
    };
    let _ = tx.send(put).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn accounts(names: &[&str]) -> Vec<Account> {
        names
            .iter()
            .map(|n| Account::new(n, "pw", &format!("https://{}.cloudant.com", n), n))
            .collect()
    }

    #[test]
    fn test_merge_skips_owner_and_adds_missing_roles() {
        let mut doc = SecurityDocument::parse(
            r#"{"cloudant": {"b": ["_admin"], "nobody": ["_reader"]}, "members": {"names": []}}"#,
        )
        .unwrap();

        merge_peer_grants(&mut doc, "a", &accounts(&["a", "b", "c"])).unwrap();
        merge_peer_grants(&mut doc, "a", &accounts(&["a", "b", "c"])).unwrap();

        assert!(doc.roles("a").is_empty());
        assert_eq!(doc.roles("b"), vec!["_admin", "_reader", "_replicator"]);
        assert_eq!(doc.roles("c"), vec!["_reader", "_replicator"]);
        assert_eq!(doc.roles("nobody"), vec!["_reader"]);
        assert_eq!(
            serde_json::to_value(&doc).unwrap()["members"],
            json!({"names": []})
        );
    }

    #[tokio::test]
    async fn test_get_failure_skips_put_but_not_siblings() {
        let mut good = mockito::Server::new_async().await;
        let mut bad = mockito::Server::new_async().await;

        let good_get = good
            .mock("GET", "/_api/v2/db/orders/_security")
            .with_status(200)
            .with_body(r#"{"cloudant": {"x": ["_admin"]}}"#)
            .create_async()
            .await;
        let good_put = good
            .mock("PUT", "/_api/v2/db/orders/_security")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "cloudant": {"x": ["_admin"], "b": ["_reader", "_replicator"]}
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;
        let bad_get = bad
            .mock("GET", "/_api/v2/db/orders/_security")
            .with_status(500)
            .create_async()
            .await;
        let bad_put = bad
            .mock("PUT", "/_api/v2/db/orders/_security")
            .expect(0)
            .create_async()
            .await;

        let accounts = Arc::new(vec![
            Account::new("a", "pw", &good.url(), "us-south"),
            Account::new("b", "pw", &bad.url(), "eu-gb"),
        ]);
        let client = CloudantClient::new(Duration::from_secs(5)).unwrap();

        let err = share_database(&client, &accounts, "orders").await.unwrap_err();
        match err {
            MeshError::Phase { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].contains("GET request failed for 'eu-gb'")
                    || failures[1].contains("GET request failed for 'eu-gb'"));
            }
            other => panic!("unexpected error: {}", other),
        }

        good_get.assert_async().await;
        good_put.assert_async().await;
        bad_get.assert_async().await;
        bad_put.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_rejection_is_reported() {
        let mut a = mockito::Server::new_async().await;
        let mut b = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for server in [&mut a, &mut b] {
            let get = server
                .mock("GET", "/_api/v2/db/orders/_security")
                .with_status(200)
                .with_body("{}")
                .create_async()
                .await;
            mocks.push(get);
        }
        let _a_put = a
            .mock("PUT", "/_api/v2/db/orders/_security")
            .with_status(200)
            .create_async()
            .await;
        let _b_put = b
            .mock("PUT", "/_api/v2/db/orders/_security")
            .with_status(403)
            .create_async()
            .await;

        let accounts = Arc::new(vec![
            Account::new("a", "pw", &a.url(), "us-south"),
            Account::new("b", "pw", &b.url(), "eu-gb"),
        ]);
        let client = CloudantClient::new(Duration::from_secs(5)).unwrap();

        let err = share_database(&client, &accounts, "orders").await.unwrap_err();
        assert!(err.to_string().contains("Permissions PUT for 'eu-gb' returned 403"));
    }

    #[test]
    fn test_merge_refuses_non_object_grants() {
        let mut doc = SecurityDocument::parse(r#"{"cloudant": "_admin"}"#).unwrap();
        let before = doc.clone();
        assert!(merge_peer_grants(&mut doc, "a", &accounts(&["a", "b"])).is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn test_security_url_encodes_database_name() {
        let account = Account::new("a", "pw", "https://a.cloudant.com", "us-south");
        assert_eq!(
            security_url(&account, "team/orders"),
            "https://a.cloudant.com/_api/v2/db/team%2Forders/_security"
        );
    }

    #[tokio::test]
    async fn test_database_name_with_slash_is_one_path_segment() {
        let mut a = mockito::Server::new_async().await;
        let mut b = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for server in [&mut a, &mut b] {
            let get = server
                .mock("GET", "/_api/v2/db/team%2Forders/_security")
                .with_status(200)
                .with_body("{}")
                .expect(1)
                .create_async()
                .await;
            let put = server
                .mock("PUT", "/_api/v2/db/team%2Forders/_security")
                .with_status(200)
                .expect(1)
                .create_async()
                .await;
            mocks.push(get);
            mocks.push(put);
        }

        let accounts = Arc::new(vec![
            Account::new("a", "pw", &a.url(), "us-south"),
            Account::new("b", "pw", &b.url(), "eu-gb"),
        ]);
        let client = CloudantClient::new(Duration::from_secs(5)).unwrap();

        assert!(share_database(&client, &accounts, "team/orders").await.is_ok());
        for mock in &mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_unmergeable_documents_skip_the_put() {
        let mut array_body = mockito::Server::new_async().await;
        let mut scalar_grants = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for (server, body) in [
            (&mut array_body, "[]"),
            (&mut scalar_grants, r#"{"cloudant": "_admin"}"#),
        ] {
            let get = server
                .mock("GET", "/_api/v2/db/orders/_security")
                .with_status(200)
                .with_body(body)
                .expect(1)
                .create_async()
                .await;
            let put = server
                .mock("PUT", "/_api/v2/db/orders/_security")
                .expect(0)
                .create_async()
                .await;
            mocks.push(get);
            mocks.push(put);
        }

        let accounts = Arc::new(vec![
            Account::new("a", "pw", &array_body.url(), "us-south"),
            Account::new("b", "pw", &scalar_grants.url(), "eu-gb"),
        ]);
        let client = CloudantClient::new(Duration::from_secs(5)).unwrap();

        let err = share_database(&client, &accounts, "orders").await.unwrap_err();
        match err {
            MeshError::Phase { failures, .. } => {
                assert_eq!(failures.len(), 4);
                assert!(failures
                    .iter()
                    .any(|f| f.contains("for 'us-south' is not a JSON object")));
                assert!(failures
                    .iter()
                    .any(|f| f.contains("for 'eu-gb' cannot be merged")));
            }
            other => panic!("unexpected error: {}", other),
        }
        for mock in &mocks {
            mock.assert_async().await;
        }
    }
}

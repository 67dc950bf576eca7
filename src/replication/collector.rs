// ABOUTME: Fan-in barrier that gathers a fixed number of task results per phase
// ABOUTME: Logs every result and turns any task error into one aggregate phase error

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::MeshError;
use crate::remote::OperationResult;

pub type ResultSender = mpsc::Sender<OperationResult>;

/// Inbox for one phase. Tasks get a [`ResultSender`] each; [`Phase::collect`]
/// waits for exactly `expected` results before deciding the phase outcome.
pub struct Phase {
    name: String,
    expected: usize,
    tx: ResultSender,
    rx: mpsc::Receiver<OperationResult>,
}

impl Phase {
    pub fn new(name: impl Into<String>, expected: usize) -> Self {
        // Capacity covers every result so no task ever waits on the collector.
        let (tx, rx) = mpsc::channel(expected.max(1));
        Self {
            name: name.into(),
            expected,
            tx,
            rx,
        }
    }

    pub fn sender(&self) -> ResultSender {
        self.tx.clone()
    }

    pub async fn collect(self) -> Result<(), MeshError> {
        let Phase {
            name,
            expected,
            tx,
            mut rx,
        } = self;
        // Only task-held senders may keep the channel open.
        drop(tx);

        info!("{}", name);
        let progress = progress_bar(expected as u64, &name);
        let mut failures = Vec::new();
        let mut received = 0;

        while received < expected {
            let Some(result) = rx.recv().await else {
                break;
            };
            received += 1;
            progress.suspend(|| report(&result));
            progress.inc(1);
            if let Some(err) = result.error {
                failures.push(err);
            }
        }
        progress.finish_and_clear();

        if received < expected {
            failures.push(format!(
                "{} of {} results never arrived",
                expected - received,
                expected
            ));
        }

        if failures.is_empty() {
            info!("{}: all {} operations succeeded", name, expected);
            Ok(())
        } else {
            error!("{}: {} of {} operations failed", name, failures.len(), expected);
            Err(MeshError::Phase {
                phase: name,
                failures,
            })
        }
    }
}

fn report(result: &OperationResult) {
    match &result.error {
        None => info!("  {}", result),
        Some(err) if result.skipped => warn!("  {} skipped: {}", result, err),
        Some(err) => error!("  {} failed: {}", result, err),
    }
    if !result.body.is_empty() {
        debug!("  body: {}", result.body.trim_end());
    }
}

fn progress_bar(len: u64, name: &str) -> ProgressBar {
    let progress = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress.set_message(name.to_string());
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, StatusCode};
    use std::time::Duration;

    fn result(error: Option<&str>) -> OperationResult {
        OperationResult {
            method: Method::PUT,
            target: "http://a/_replicator".to_string(),
            status: Some(StatusCode::CREATED),
            body: String::new(),
            error: error.map(str::to_string),
            skipped: false,
        }
    }

    async fn run_phase(errors: &[bool]) -> Result<(), MeshError> {
        let phase = Phase::new("test phase", errors.len());
        for (i, &fails) in errors.iter().enumerate() {
            let tx = phase.sender();
            tokio::spawn(async move {
                // Reverse the send order so arrival order differs from launch order.
                tokio::time::sleep(Duration::from_millis(5 * (10 - i as u64))).await;
                let _ = tx.send(result(fails.then_some("boom"))).await;
            });
        }
        phase.collect().await
    }

    #[tokio::test]
    async fn test_all_success() {
        assert!(run_phase(&[false, false, false]).await.is_ok());
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let err = run_phase(&[true, false, true, false]).await.unwrap_err();
        match err {
            MeshError::Phase { phase, failures } => {
                assert_eq!(phase, "test phase");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_expected_completes_immediately() {
        assert!(Phase::new("empty", 0).collect().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_results_fail_the_phase() {
        let phase = Phase::new("short", 2);
        let tx = phase.sender();
        tokio::spawn(async move {
            let _ = tx.send(result(None)).await;
        });
        let err = phase.collect().await.unwrap_err();
        assert!(err.to_string().contains("1 of 2 results never arrived"));
    }
}

//! Confirmation engine
//!
//! Drains the ledger's pending queue through a [`Deployer`], one record at a
//! time. Progress goes through a bounded channel to a single consumer task so
//! slow output never holds up the chain interaction. The producer yields to
//! the consumer before each confirmation, so the queue only overflows when
//! the consumer itself is stuck.

use crate::deployer::Deployer;
use crate::error::Result;
use crate::repository::{ContractsRepository, ProgressEvent};
use colored::*;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Progress queue capacity.
pub const PROGRESS_QUEUE: usize = 64;

pub struct ConfirmationEngine<'d> {
    deployer: &'d dyn Deployer,
}

impl<'d> ConfirmationEngine<'d> {
    pub fn new(deployer: &'d dyn Deployer) -> Self {
        ConfirmationEngine { deployer }
    }

    /// Confirm every pending record, printing progress to stdout.
    pub async fn run(&self, repo: &mut ContractsRepository) -> Result<usize> {
        self.run_with(repo, |event| println!("{}", render(&event)))
            .await
    }

    /// Confirm every pending record, handing progress events to `sink` on a
    /// dedicated consumer task. The task is joined before returning.
    pub async fn run_with<S>(&self, repo: &mut ContractsRepository, mut sink: S) -> Result<usize>
    where
        S: FnMut(ProgressEvent) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ProgressEvent>(PROGRESS_QUEUE);

        let consumer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink(event);
            }
        });

        let deployer = self.deployer;
        let result = repo
            .confirm_all(
                |event| match tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        warn!("Progress queue full, dropping {:?}", event);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Progress consumer gone");
                    }
                },
                move |pending| async move {
                    tokio::task::yield_now().await;
                    deployer.confirm_contract(pending).await
                },
            )
            .await;

        drop(tx);
        if let Err(e) = consumer.await {
            warn!("Progress consumer failed: {}", e);
        }

        result
    }
}

/// One operator-facing progress line.
pub fn render(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Started { total } => {
            format!("🚀 Confirming {} pending deployment(s)", total)
                .bright_cyan()
                .to_string()
        }
        ProgressEvent::Confirming {
            index,
            total,
            name,
            tx_id,
        } => format!(
            "   [{}/{}] {} {} {}",
            index,
            total,
            "confirming".cyan(),
            name.bright_white(),
            tx_id.dimmed()
        ),
        ProgressEvent::Confirmed { record } => format!(
            "   {} {} => {}",
            "confirmed".green(),
            record.name.bright_white(),
            record.address
        ),
        ProgressEvent::Failed { name, reason } => format!(
            "❗️ {} {}: {}",
            "failed".red().bold(),
            name.bright_white(),
            reason
        ),
    }
}

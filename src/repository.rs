//! Contracts repository: the per-environment deployment ledger
//!
//! The ledger is one JSON document holding confirmed contracts, confirmed
//! libraries, related (compiled but undeployed) artifacts and the queue of
//! pending deployments. Every state transition is committed immediately so a
//! later invocation resumes from exactly where the previous one stopped.

use crate::contract::{CompiledContract, DeployedContract};
use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Progress emitted while pending records are confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { total: usize },
    Confirming { index: usize, total: usize, name: String, tx_id: String },
    Confirmed { record: DeployedContract },
    Failed { name: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    env: String,

    #[serde(default)]
    contracts: BTreeMap<String, DeployedContract>,

    #[serde(default)]
    libraries: BTreeMap<String, DeployedContract>,

    #[serde(default)]
    related: BTreeMap<String, CompiledContract>,

    /// Submission order is confirmation order.
    #[serde(default)]
    pending: Vec<DeployedContract>,
}

#[derive(Debug)]
pub struct ContractsRepository {
    path: PathBuf,
    ledger: Ledger,
}

impl ContractsRepository {
    /// Open the ledger at `path`, or start an empty one if the file is absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!("No ledger at {}, starting empty", path.display());
            return Ok(ContractsRepository {
                path,
                ledger: Ledger::default(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            DeployError::RepositoryIo(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let ledger: Ledger = serde_json::from_str(&contents).map_err(|e| {
            DeployError::RepositoryIo(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        info!(
            "Opened ledger {} ({} contracts, {} libraries, {} pending)",
            path.display(),
            ledger.contracts.len(),
            ledger.libraries.len(),
            ledger.pending.len()
        );

        Ok(ContractsRepository { path, ledger })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn env(&self) -> &str {
        &self.ledger.env
    }

    pub fn set_env(&mut self, env: &str) {
        self.ledger.env = env.to_string();
    }

    /// Confirmed non-library contract by name.
    pub fn get(&self, name: &str) -> Option<&DeployedContract> {
        self.ledger.contracts.get(name)
    }

    /// Confirmed library by name.
    pub fn get_lib(&self, name: &str) -> Option<&DeployedContract> {
        self.ledger.libraries.get(name)
    }

    pub fn get_related(&self, name: &str) -> Option<&CompiledContract> {
        self.ledger.related.get(name)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &DeployedContract> {
        self.ledger.contracts.values()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &DeployedContract> {
        self.ledger.libraries.values()
    }

    pub fn related(&self) -> impl Iterator<Item = (&String, &CompiledContract)> {
        self.ledger.related.iter()
    }

    /// Pending records in insertion order.
    pub fn unconfirmed_contracts(&self) -> &[DeployedContract] {
        &self.ledger.pending
    }

    /// Fail unless `name` may be deployed.
    ///
    /// A name that is confirmed (as contract or library) or already pending is
    /// rejected unless `force` is set.
    pub fn check_deployable(&self, name: &str, force: bool) -> Result<()> {
        if force {
            return Ok(());
        }

        let taken = self.ledger.contracts.contains_key(name)
            || self.ledger.libraries.contains_key(name)
            || self.ledger.pending.iter().any(|p| p.name == name);

        if taken {
            return Err(DeployError::DuplicateDeployment {
                name: name.to_string(),
            });
        }

        Ok(())
    }

    /// Queue a freshly submitted deployment.
    ///
    /// With `force`, an older pending record of the same name is dropped. A
    /// confirmed record of the same name stays until this one confirms.
    pub fn add_pending(&mut self, record: DeployedContract, force: bool) -> Result<()> {
        self.check_deployable(&record.name, force)?;

        self.ledger.pending.retain(|p| p.name != record.name);
        info!(
            "Pending {} at {} (tx {})",
            record.name, record.address, record.tx_id
        );
        self.ledger.pending.push(record);
        Ok(())
    }

    /// Register a compiled artifact that came along with a compile target.
    pub fn add_related(&mut self, name: &str, contract: CompiledContract) {
        self.ledger.related.insert(name.to_string(), contract);
    }

    fn promote(&mut self, record: DeployedContract) {
        let (target, other) = if record.is_lib {
            (&mut self.ledger.libraries, &mut self.ledger.contracts)
        } else {
            (&mut self.ledger.contracts, &mut self.ledger.libraries)
        };

        other.remove(&record.name);
        if target.insert(record.name.clone(), record).is_some() {
            debug!("Superseded previous deployment");
        }
    }

    /// Confirm pending records one by one, in insertion order.
    ///
    /// Each success is promoted and committed before the next record is
    /// attempted. The first failure stops the run; it and every later record
    /// stay pending. Returns the number of records confirmed.
    pub async fn confirm_all<P, F, Fut>(&mut self, mut progress: P, mut confirm: F) -> Result<usize>
    where
        P: FnMut(ProgressEvent),
        F: FnMut(DeployedContract) -> Fut,
        Fut: Future<Output = Result<DeployedContract>>,
    {
        let total = self.ledger.pending.len();
        progress(ProgressEvent::Started { total });

        let mut confirmed = 0;
        while let Some(pending) = self.ledger.pending.first().cloned() {
            let name = pending.name.clone();
            progress(ProgressEvent::Confirming {
                index: confirmed + 1,
                total,
                name: name.clone(),
                tx_id: pending.tx_id.clone(),
            });

            let record = match confirm(pending).await {
                Ok(record) => record,
                Err(e) => {
                    progress(ProgressEvent::Failed {
                        name,
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            };

            self.ledger.pending.remove(0);
            self.promote(record.clone());
            self.commit()?;
            info!("Confirmed {} at {}", record.name, record.address);

            progress(ProgressEvent::Confirmed { record });
            confirmed += 1;
        }

        Ok(confirmed)
    }

    /// Write the ledger atomically: temp file in the same directory, fsync, rename.
    pub fn commit(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.ledger).map_err(|e| {
            DeployError::RepositoryIo(format!("Failed to serialize ledger: {}", e))
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut file = NamedTempFile::new_in(&dir).map_err(|e| {
            DeployError::RepositoryIo(format!("Failed to create temp file: {}", e))
        })?;

        file.write_all(json.as_bytes())
            .map_err(|e| DeployError::RepositoryIo(format!("Failed to write ledger: {}", e)))?;

        file.as_file()
            .sync_all()
            .map_err(|e| DeployError::RepositoryIo(format!("Failed to sync ledger: {}", e)))?;

        file.persist(&self.path)
            .map_err(|e| DeployError::RepositoryIo(format!("Failed to finalize write: {}", e)))?;

        debug!("Committed ledger {}", self.path.display());
        Ok(())
    }
}

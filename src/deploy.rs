//! Deploy, confirm and status operations

use crate::abi::encode_constructor_params;
use crate::config::Config;
use crate::confirm::ConfirmationEngine;
use crate::context::DeployContext;
use crate::contract::{DeployTarget, DeployedContract, HexFormat};
use crate::deployer::CreateOptions;
use crate::error::{DeployError, Result};
use crate::repository::ContractsRepository;
use crate::resolver::AddressResolver;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Replace a deployment of the same name.
    pub force: bool,
    pub as_lib: bool,
    /// Submit only; leave the record pending.
    pub no_confirm: bool,
    /// Do not force a block on development chains.
    pub no_fast_confirm: bool,
    /// Overrides the configured gas limit.
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub target: DeployTarget,
    /// Constructor params as JSON, with `$Name` address references.
    pub params: String,
    pub options: DeployOptions,
}

impl DeployRequest {
    pub fn new(target: &str, params: &str) -> Self {
        DeployRequest {
            target: DeployTarget::parse(target),
            params: params.to_string(),
            options: DeployOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    Confirmed(DeployedContract),
    /// Submitted without waiting for confirmation.
    Pending(DeployedContract),
}

impl DeployOutcome {
    pub fn record(&self) -> &DeployedContract {
        match self {
            DeployOutcome::Confirmed(record) | DeployOutcome::Pending(record) => record,
        }
    }
}

/// Compile, submit and (unless told otherwise) confirm one contract.
///
/// Every state change is committed to the ledger as it happens, so a failure
/// at any step leaves a ledger that the next run resumes from.
pub async fn deploy(ctx: &mut DeployContext, request: &DeployRequest) -> Result<DeployOutcome> {
    let target = &request.target;
    let options = &request.options;

    ctx.repo.check_deployable(&target.name, options.force)?;

    let compilation = ctx.compiler.compile(target, &ctx.repo)?;

    if !compilation.related.is_empty() {
        for (name, contract) in compilation.related {
            ctx.repo.add_related(&name, contract);
        }
        ctx.repo.commit()?;
    }

    let params = AddressResolver::new(&ctx.repo, ctx.format).expand(&request.params)?;
    let encoded = encode_constructor_params(&compilation.primary, &params)?;

    let create = CreateOptions {
        as_lib: options.as_lib,
        gas_limit: options.gas_limit.unwrap_or(ctx.gas_limit),
    };
    let pending = ctx
        .deployer
        .create_contract(&compilation.primary, &encoded, &target.name, create)
        .await?;

    ctx.repo.add_pending(pending.clone(), options.force)?;
    ctx.repo.commit()?;

    if options.no_confirm {
        info!("Leaving {} pending", target.name);
        return Ok(DeployOutcome::Pending(pending));
    }

    confirm_pending(ctx, !options.no_fast_confirm).await?;

    let deployed = if options.as_lib {
        ctx.repo.get_lib(&target.name)
    } else {
        ctx.repo.get(&target.name)
    };

    deployed
        .cloned()
        .map(DeployOutcome::Confirmed)
        .ok_or_else(|| DeployError::Confirmation {
            name: target.name.clone(),
            reason: "failed to deploy contract".to_string(),
        })
}

/// Confirm every pending record in the ledger. With `mine`, a block is forced
/// first on chains that allow it; a failure to do so is only logged.
pub async fn confirm_pending(ctx: &mut DeployContext, mine: bool) -> Result<usize> {
    if ctx.repo.unconfirmed_contracts().is_empty() {
        return Ok(0);
    }

    if mine && ctx.fast_confirm {
        info!("Forcing block production");
        if let Err(e) = ctx.deployer.mine().await {
            warn!("Could not force a block: {}", e);
        }
    }

    ConfirmationEngine::new(ctx.deployer.as_ref())
        .run(&mut ctx.repo)
        .await
}

/// Snapshot of a ledger for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatus {
    pub ledger: PathBuf,
    pub env: String,
    pub contracts: Vec<(String, String)>,
    pub libraries: Vec<(String, String)>,
    pub pending: Vec<(String, String)>,
    pub related: Vec<String>,
}

impl LedgerStatus {
    pub fn new(repo: &ContractsRepository, format: HexFormat) -> Self {
        let entry = |c: &DeployedContract| (c.name.clone(), c.address.to_hex(format));
        LedgerStatus {
            ledger: repo.path().to_path_buf(),
            env: repo.env().to_string(),
            contracts: repo.contracts().map(entry).collect(),
            libraries: repo.libraries().map(entry).collect(),
            pending: repo.unconfirmed_contracts().iter().map(entry).collect(),
            related: repo.related().map(|(name, _)| name.clone()).collect(),
        }
    }
}

pub fn status(ctx: &DeployContext) -> LedgerStatus {
    LedgerStatus::new(&ctx.repo, ctx.format)
}

/// Read the ledger named by `config` without connecting a backend.
pub fn ledger_status(config: &Config) -> Result<LedgerStatus> {
    let mut repo = ContractsRepository::open(config.ledger_path())?;
    if repo.env().is_empty() {
        repo.set_env(&config.env);
    }
    Ok(LedgerStatus::new(&repo, config.hex_format()))
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "ledger: {}", self.ledger.display())?;
        writeln!(f, "env: {}", self.env)?;
        for (title, entries) in [
            ("contracts", &self.contracts),
            ("libraries", &self.libraries),
            ("pending", &self.pending),
        ] {
            writeln!(f, "{} ({}):", title, entries.len())?;
            for (name, address) in entries {
                writeln!(f, "  {} => {}", name, address)?;
            }
        }
        writeln!(f, "related ({}):", self.related.len())?;
        for name in &self.related {
            writeln!(f, "  {}", name)?;
        }
        Ok(())
    }
}

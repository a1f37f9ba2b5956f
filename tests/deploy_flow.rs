//! Integration tests for the deploy workflow
//!
//! These tests drive deploy and confirm through a scripted in-memory backend
//! and compiler, and check the ledger file after every run.

use async_trait::async_trait;
use chaindeploy::compiler::{Compilation, Compiler};
use chaindeploy::config::{Config, DEFAULT_GAS_LIMIT};
use chaindeploy::context::DeployContext;
use chaindeploy::contract::{Bytes, CompiledContract, DeployTarget, DeployedContract, HexFormat};
use chaindeploy::deploy::{
    confirm_pending, deploy, ledger_status, status, DeployOutcome, DeployRequest,
};
use chaindeploy::deployer::{CreateOptions, Deployer};
use chaindeploy::error::{DeployError, Result};
use chaindeploy::repository::ContractsRepository;
use chaindeploy::resolver::AddressResolver;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct ChainState {
    created: Vec<(String, Vec<u8>)>,
    mined: usize,
    reject: HashSet<String>,
}

/// Account-style chain: addresses are handed out at submission and every
/// creation confirms at that address unless its name is rejected.
#[derive(Clone, Default)]
struct ScriptedChain {
    state: Arc<Mutex<ChainState>>,
}

#[async_trait]
impl Deployer for ScriptedChain {
    fn hex_format(&self) -> HexFormat {
        HexFormat::Prefixed
    }

    async fn create_contract(
        &self,
        artifact: &CompiledContract,
        params: &[u8],
        name: &str,
        options: CreateOptions,
    ) -> Result<DeployedContract> {
        let mut state = self.state.lock().unwrap();
        state.created.push((name.to_string(), params.to_vec()));
        let n = state.created.len() as u8;
        Ok(DeployedContract::pending(
            name,
            artifact,
            Bytes(vec![n; 20]),
            format!("0xtx{}", n),
            None,
            options.as_lib,
        ))
    }

    async fn confirm_contract(&self, pending: DeployedContract) -> Result<DeployedContract> {
        if self.state.lock().unwrap().reject.contains(&pending.name) {
            return Err(DeployError::Confirmation {
                name: pending.name.clone(),
                reason: format!("transaction {} reverted", pending.tx_id),
            });
        }
        let address = pending.address.clone();
        Ok(pending.confirm(address))
    }

    async fn mine(&self) -> Result<()> {
        self.state.lock().unwrap().mined += 1;
        Ok(())
    }
}

/// Compiles `X.sol` into contract `X`; `Token.sol` also yields `Ownable`.
struct ScriptedCompiler;

impl Compiler for ScriptedCompiler {
    fn compile(&self, target: &DeployTarget, _repo: &ContractsRepository) -> Result<Compilation> {
        let name = target.contract_name();
        let abi = if name == "Token" {
            json!([{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [{"name": "owner", "type": "address", "internalType": "address"}]
            }])
        } else {
            json!([])
        };

        let mut related = BTreeMap::new();
        if name == "Token" {
            related.insert(
                "Ownable".to_string(),
                CompiledContract {
                    source: target.file.clone(),
                    name: "Ownable".into(),
                    abi: json!([]),
                    bin: "6060".into(),
                },
            );
        }

        Ok(Compilation {
            primary: CompiledContract {
                source: target.file.clone(),
                name,
                abi,
                bin: "6080".into(),
            },
            related,
        })
    }
}

fn context(path: &Path, env: &str, chain: &ScriptedChain) -> DeployContext {
    let repo = ContractsRepository::open(path).expect("Failed to open ledger");
    DeployContext::new(env, repo, Box::new(chain.clone()), Box::new(ScriptedCompiler))
}

fn ledger(dir: &TempDir) -> PathBuf {
    dir.path().join("contracts.development.json")
}

#[tokio::test]
async fn test_deploy_resolves_admin_reference() {
    let dir = TempDir::new().unwrap();
    let chain = ScriptedChain::default();
    let mut ctx = context(&ledger(&dir), "development", &chain);

    let admin = deploy(&mut ctx, &DeployRequest::new("Admin.sol:Admin", ""))
        .await
        .expect("Admin deploy failed");
    let admin = admin.record().clone();
    assert!(admin.is_confirmed());

    let resolved = AddressResolver::new(&ctx.repo, ctx.format)
        .expand(r#"{"owner":"$Admin"}"#)
        .unwrap();
    assert_eq!(
        resolved,
        format!(r#"{{"owner":"0x{}"}}"#, hex::encode(admin.address.as_slice()))
    );

    let outcome = deploy(
        &mut ctx,
        &DeployRequest::new("contracts/Token.sol:Token", r#"{"owner":"$Admin"}"#),
    )
    .await
    .expect("Token deploy failed");

    let token = match outcome {
        DeployOutcome::Confirmed(record) => record,
        other => panic!("expected confirmed, got {:?}", other),
    };
    assert_eq!(token.name, "Token");
    assert_eq!(token.address.len(), 20);
    assert!(ctx.repo.get("Token").is_some());
    assert!(ctx.repo.get_related("Ownable").is_some());

    let state = chain.state.lock().unwrap();
    let mut expected = vec![0u8; 12];
    expected.extend_from_slice(admin.address.as_slice());
    assert_eq!(state.created[1], ("Token".to_string(), expected));
    assert_eq!(state.mined, 2);
    drop(state);

    let reopened = ContractsRepository::open(ledger(&dir)).unwrap();
    assert_eq!(reopened.get("Token"), ctx.repo.get("Token"));
    assert_eq!(reopened.env(), "development");
}

#[tokio::test]
async fn test_redeploy_needs_force() {
    let dir = TempDir::new().unwrap();
    let chain = ScriptedChain::default();
    let mut ctx = context(&ledger(&dir), "development", &chain);

    let first = deploy(&mut ctx, &DeployRequest::new("Admin.sol:Admin", ""))
        .await
        .unwrap();

    let err = deploy(&mut ctx, &DeployRequest::new("Admin.sol:Admin", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::DuplicateDeployment { ref name } if name == "Admin"));
    assert_eq!(chain.state.lock().unwrap().created.len(), 1);

    let mut forced = DeployRequest::new("Admin.sol:Admin", "");
    forced.options.force = true;
    forced.options.no_confirm = true;
    deploy(&mut ctx, &forced).await.unwrap();

    // The old record stays until the replacement confirms.
    assert_eq!(ctx.repo.get("Admin"), Some(first.record()));

    confirm_pending(&mut ctx, true).await.unwrap();
    let replaced = ctx.repo.get("Admin").unwrap();
    assert_ne!(replaced.address, first.record().address);
}

#[tokio::test]
async fn test_failed_confirmation_resumes_after_reload() {
    let dir = TempDir::new().unwrap();
    let chain = ScriptedChain::default();
    chain.state.lock().unwrap().reject.insert("B".into());

    {
        let mut ctx = context(&ledger(&dir), "development", &chain);
        for name in ["A", "B", "C"] {
            let mut request = DeployRequest::new(&format!("{}.sol:{}", name, name), "");
            request.options.no_confirm = true;
            let outcome = deploy(&mut ctx, &request).await.unwrap();
            assert!(matches!(outcome, DeployOutcome::Pending(_)));
        }

        let err = confirm_pending(&mut ctx, false).await.unwrap_err();
        assert!(matches!(err, DeployError::Confirmation { ref name, .. } if name == "B"));
    }

    let mut ctx = context(&ledger(&dir), "development", &chain);
    assert!(ctx.repo.get("A").is_some());
    let pending: Vec<_> = ctx
        .repo
        .unconfirmed_contracts()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(pending, vec!["B", "C"]);

    chain.state.lock().unwrap().reject.clear();
    assert_eq!(confirm_pending(&mut ctx, false).await.unwrap(), 2);
    assert!(ctx.repo.unconfirmed_contracts().is_empty());
    assert_eq!(chain.state.lock().unwrap().created.len(), 3);

    let summary = status(&ctx);
    assert_eq!(summary.contracts.len(), 3);
    assert!(summary.pending.is_empty());
}

#[tokio::test]
async fn test_unknown_reference_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let chain = ScriptedChain::default();
    let mut ctx = context(&ledger(&dir), "development", &chain);

    let err = deploy(
        &mut ctx,
        &DeployRequest::new("Token.sol:Token", r#"["$Unknown"]"#),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::UnresolvedReference { ref name } if name == "Unknown"));
    assert!(chain.state.lock().unwrap().created.is_empty());
    assert!(ctx.repo.unconfirmed_contracts().is_empty());
}

#[tokio::test]
async fn test_libraries_and_fast_confirm_policy() {
    let dir = TempDir::new().unwrap();
    let chain = ScriptedChain::default();
    let mut ctx = context(&dir.path().join("contracts.production.json"), "production", &chain);
    assert!(!ctx.fast_confirm);
    assert_eq!(ctx.gas_limit, DEFAULT_GAS_LIMIT);

    let mut request = DeployRequest::new("lib/SafeMath.sol:SafeMath", "");
    request.options.as_lib = true;
    let outcome = deploy(&mut ctx, &request).await.unwrap();

    assert!(outcome.record().is_lib);
    assert!(ctx.repo.get_lib("SafeMath").is_some());
    assert!(ctx.repo.get("SafeMath").is_none());
    assert_eq!(chain.state.lock().unwrap().mined, 0);

    let summary = status(&ctx).to_string();
    assert!(summary.contains("env: production"));
    assert!(summary.contains("SafeMath => 0x"));
}

#[tokio::test]
async fn test_status_reads_ledger_without_backend() {
    let dir = TempDir::new().unwrap();
    let chain = ScriptedChain::default();
    let path = ledger(&dir);
    {
        let mut ctx = context(&path, "development", &chain);
        let mut request = DeployRequest::new("Admin.sol:Admin", "");
        request.options.no_confirm = true;
        deploy(&mut ctx, &request).await.unwrap();
    }

    // No RPC url configured: a deploy context could not be built.
    let config = Config {
        repo: Some(path.clone()),
        ..Config::default()
    };
    assert!(config.backend().is_err());

    let summary = ledger_status(&config).unwrap();
    assert_eq!(summary.ledger, path);
    assert_eq!(summary.env, "development");
    assert_eq!(summary.pending.len(), 1);
    assert!(summary.pending[0].1.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(summary.to_string().contains(&format!("ledger: {}", path.display())));
}

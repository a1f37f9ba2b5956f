//! Solidity compiler boundary
//!
//! The compiler is an external program. This module runs it, parses its
//! `--combined-json` output and links placeholders of libraries already
//! deployed in the ledger.

use crate::contract::{keccak256, Bytes, CompiledContract, DeployTarget};
use crate::error::{DeployError, Result};
use crate::repository::ContractsRepository;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Result of compiling one source unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    /// The contract named after the source file.
    pub primary: CompiledContract,
    /// Every other contract in the output, keyed by contract name.
    pub related: BTreeMap<String, CompiledContract>,
}

pub trait Compiler: Send + Sync {
    /// Compile `target.file`, linking libraries deployed in `repo`.
    fn compile(&self, target: &DeployTarget, repo: &ContractsRepository) -> Result<Compilation>;
}

/// `solc` invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct Solc {
    pub binary: String,
    pub optimize: bool,
    pub allow_paths: Vec<String>,
}

impl Solc {
    fn command(&self, file: &str) -> Result<Command> {
        let allow_paths = if self.allow_paths.is_empty() {
            std::env::current_dir()
                .map_err(|e| DeployError::Compile(format!("No working directory: {}", e)))?
                .display()
                .to_string()
        } else {
            self.allow_paths.join(",")
        };

        let mut cmd = Command::new(&self.binary);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.arg("--combined-json").arg("abi,bin");
        if self.optimize {
            cmd.arg("--optimize");
        }
        cmd.arg("--allow-paths").arg(allow_paths);
        cmd.arg(file);
        Ok(cmd)
    }
}

impl Compiler for Solc {
    fn compile(&self, target: &DeployTarget, repo: &ContractsRepository) -> Result<Compilation> {
        let mut cmd = self.command(&target.file)?;
        debug!("Running {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            DeployError::Compile(format!("Failed to run {}: {}", self.binary, e))
        })?;

        if !output.status.success() {
            return Err(DeployError::Compile(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let contracts = parse_combined_json(&stdout, repo)?;
        let compilation = split_primary(target, contracts)?;
        info!(
            "Compiled {} ({} related)",
            target.file,
            compilation.related.len()
        );
        Ok(compilation)
    }
}

#[derive(Debug, Deserialize)]
struct CombinedJson {
    contracts: BTreeMap<String, CombinedEntry>,
}

#[derive(Debug, Deserialize)]
struct CombinedEntry {
    #[serde(default)]
    abi: Value,
    #[serde(default)]
    bin: String,
}

/// Library placeholders solc emits for the fully qualified name `path:Name`.
fn placeholders(qualified: &str) -> [String; 2] {
    let hashed = hex::encode(keccak256(qualified.as_bytes()));
    let legacy: String = qualified.chars().take(36).collect();
    [
        format!("__${}$__", &hashed[..34]),
        format!("__{:_<38}", legacy),
    ]
}

/// Deployed library matching a compiler output entry, by contract name,
/// qualified name or source path.
fn deployed_library<'r>(
    repo: &'r ContractsRepository,
    source: &str,
    name: &str,
    qualified: &str,
) -> Option<&'r Bytes> {
    [name, qualified, source]
        .into_iter()
        .find_map(|key| repo.get_lib(key))
        .map(|lib| &lib.address)
}

/// Parse `solc --combined-json abi,bin` output into linked artifacts.
pub fn parse_combined_json(text: &str, repo: &ContractsRepository) -> Result<Vec<CompiledContract>> {
    let combined: CombinedJson = serde_json::from_str(text)
        .map_err(|e| DeployError::Compile(format!("Unexpected compiler output: {}", e)))?;

    let mut links = Vec::new();
    let mut contracts = Vec::new();

    for (qualified, entry) in combined.contracts {
        let (source, name) = qualified
            .rsplit_once(':')
            .unwrap_or(("", qualified.as_str()));

        if let Some(address) = deployed_library(repo, source, name, &qualified) {
            for placeholder in placeholders(&qualified) {
                links.push((placeholder, address.to_string()));
            }
        }

        // Older compilers emit the ABI as an embedded JSON string.
        let abi = match entry.abi {
            Value::String(s) => serde_json::from_str(&s).map_err(|e| {
                DeployError::Compile(format!("Invalid ABI for {}: {}", qualified, e))
            })?,
            other => other,
        };

        contracts.push(CompiledContract {
            source: source.to_string(),
            name: name.to_string(),
            abi,
            bin: entry.bin,
        });
    }

    for contract in &mut contracts {
        for (placeholder, address) in &links {
            if contract.bin.contains(placeholder.as_str()) {
                debug!("Linking {} into {}", address, contract.name);
                contract.bin = contract.bin.replace(placeholder.as_str(), address);
            }
        }
    }

    Ok(contracts)
}

/// The primary artifact is the one named after the file stem, preferring the
/// copy declared in the target file over same-named imports.
fn split_primary(target: &DeployTarget, mut contracts: Vec<CompiledContract>) -> Result<Compilation> {
    let wanted = target.contract_name();
    let index = contracts
        .iter()
        .position(|c| c.name == wanted && c.source == target.file)
        .or_else(|| contracts.iter().position(|c| c.name == wanted))
        .ok_or_else(|| {
            DeployError::Compile(format!("No contract named {} in {}", wanted, target.file))
        })?;

    let primary = contracts.remove(index);
    let related = contracts
        .into_iter()
        .map(|contract| (contract.name.clone(), contract))
        .collect::<BTreeMap<_, _>>();

    Ok(Compilation { primary, related })
}

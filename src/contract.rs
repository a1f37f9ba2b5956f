//! Contract artifacts and deployment records

use crate::error::{DeployError, Result};
use alloy_json_abi::JsonAbi;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

/// How byte strings are rendered when handed to a backend or an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HexFormat {
    /// Bare hex digits, as UTXO-model nodes expect.
    #[default]
    Plain,
    /// `0x`-prefixed hex, as account-model nodes expect.
    Prefixed,
}

/// Raw bytes (addresses, bytecode) stored as a hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Parse hex with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        hex::decode(digits)
            .map(Bytes)
            .map_err(|e| DeployError::InvalidParams(format!("invalid hex '{}': {}", s, e)))
    }

    pub fn to_hex(&self, format: HexFormat) -> String {
        match format {
            HexFormat::Plain => hex::encode(&self.0),
            HexFormat::Prefixed => format!("0x{}", hex::encode(&self.0)),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Bytes::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// keccak256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    alloy_primitives::keccak256(data).0
}

/// Output of the external compiler for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledContract {
    /// Source file the contract was compiled from.
    pub source: String,

    /// Contract name inside the source file.
    pub name: String,

    pub abi: serde_json::Value,

    /// Creation bytecode as hex text. May still hold library placeholders
    /// (`__$…$__` or `__Lib___…`) when a linked library is not deployed.
    pub bin: String,
}

impl CompiledContract {
    pub fn is_linked(&self) -> bool {
        !self.bin.contains("__")
    }

    /// Creation bytecode, failing on unlinked or empty output.
    pub fn bytecode(&self) -> Result<Bytes> {
        if !self.is_linked() {
            return Err(DeployError::Compile(format!(
                "{} references a library that is not deployed yet",
                self.name
            )));
        }
        if self.bin.trim().is_empty() {
            return Err(DeployError::Compile(format!(
                "{} has no bytecode (abstract contract or interface)",
                self.name
            )));
        }
        Bytes::from_hex(&self.bin)
            .map_err(|e| DeployError::Compile(format!("{}: {}", self.name, e)))
    }

    /// Hex keccak256 of the creation bytecode. Unlinked bytecode is hashed as text.
    pub fn bin_hash(&self) -> String {
        let code = hex::decode(self.bin.trim_start_matches("0x"))
            .unwrap_or_else(|_| self.bin.as_bytes().to_vec());
        hex::encode(keccak256(&code))
    }

    /// The ABI as typed items.
    pub fn json_abi(&self) -> Result<JsonAbi> {
        serde_json::from_value(self.abi.clone())
            .map_err(|e| DeployError::Compile(format!("Invalid ABI for {}: {}", self.name, e)))
    }
}

/// A deployment tracked by the contracts repository.
///
/// While `confirmed_at` is `None` the record is pending and `address` is the
/// address reported or predicted at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedContract {
    /// Logical deploy name
    pub name: String,

    pub address: Bytes,

    /// Creation transaction id
    pub tx_id: String,

    /// Account or UTXO address that paid for the creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    pub bin_hash: String,

    pub abi: serde_json::Value,

    #[serde(default)]
    pub is_lib: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DeployedContract {
    /// Build a pending record for a freshly submitted creation transaction.
    pub fn pending(
        name: &str,
        artifact: &CompiledContract,
        address: Bytes,
        tx_id: String,
        sender: Option<String>,
        is_lib: bool,
    ) -> Self {
        DeployedContract {
            name: name.to_string(),
            address,
            tx_id,
            sender,
            bin_hash: artifact.bin_hash(),
            abi: artifact.abi.clone(),
            is_lib,
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    /// Mark the record final at `address`.
    pub fn confirm(mut self, address: Bytes) -> Self {
        self.address = address;
        self.confirmed_at = Some(Utc::now());
        self
    }
}

/// `path/File.sol` or `path/File.sol:Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub file: String,
    /// Logical deploy name; defaults to the file path.
    pub name: String,
}

impl DeployTarget {
    pub fn parse(target: &str) -> Self {
        match target.split_once(':') {
            Some((file, name)) if !name.is_empty() => DeployTarget {
                file: file.to_string(),
                name: name.to_string(),
            },
            Some((file, _)) => DeployTarget {
                file: file.to_string(),
                name: file.to_string(),
            },
            None => DeployTarget {
                file: target.to_string(),
                name: target.to_string(),
            },
        }
    }

    /// Contract name the compiler output is searched for: the file stem.
    pub fn contract_name(&self) -> String {
        Path::new(&self.file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.clone())
    }
}

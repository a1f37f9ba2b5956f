//! chaindeploy - smart-contract deployment ledger and deployer
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger
//! - [`contract`] - Compiled artifacts, deployment records, hex formatting
//! - [`repository`] - Per-environment ledger of confirmed and pending deployments
//! - [`resolver`] - `$Name` address references in constructor params
//!
//! ## Chain Backends
//! - [`deployer`] - Deployer capability set (account-model and UTXO-model)
//! - [`rpc`] - JSON-RPC transport
//! - [`confirm`] - Sequential confirmation with a progress feed
//!
//! ## Compilation
//! - [`compiler`] - External `solc` invocation and library linking
//! - [`abi`] - Constructor argument encoding
//!
//! ## Operations & Configuration
//! - [`deploy`] - Deploy, confirm and status operations
//! - [`context`] - Per-invocation deploy context
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod contract;
pub mod repository;
pub mod resolver;

// ============================================================================
// Chain Backends
// ============================================================================
pub mod confirm;
pub mod deployer;
pub mod rpc;

// ============================================================================
// Compilation
// ============================================================================
pub mod abi;
pub mod compiler;

// ============================================================================
// Operations & Configuration
// ============================================================================
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;

pub use error::{DeployError, Result};

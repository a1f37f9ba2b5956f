//! Backend-specific contract creation and confirmation
//!
//! A [`Deployer`] submits creation transactions without waiting for them,
//! then confirms each pending record once the chain has finalized it. Two
//! strategies exist, one per chain model, and exactly one is selected at
//! startup from configuration.

pub mod account;
pub mod utxo;

use crate::contract::{CompiledContract, DeployedContract, HexFormat};
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use account::{AccountDeployer, AccountNode};
pub use utxo::{UtxoDeployer, UtxoNode};

/// Per-creation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    pub as_lib: bool,
    pub gas_limit: u64,
}

#[async_trait]
pub trait Deployer: Send + Sync {
    /// Byte format the backend expects in constructor arguments.
    fn hex_format(&self) -> HexFormat;

    /// Submit `artifact` with ABI-encoded constructor `params` appended and
    /// return the pending record, without waiting for finality.
    async fn create_contract(
        &self,
        artifact: &CompiledContract,
        params: &[u8],
        name: &str,
        options: CreateOptions,
    ) -> Result<DeployedContract>;

    /// Wait until the creation transaction of `pending` is final and return
    /// the confirmed record. Call once per pending record.
    async fn confirm_contract(&self, pending: DeployedContract) -> Result<DeployedContract>;

    /// Force block production on a development node.
    async fn mine(&self) -> Result<()>;
}

/// Probe every `interval` until it yields a value. No deadline.
pub(crate) async fn poll<T, F, Fut>(interval: Duration, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        tokio::time::sleep(interval).await;
    }
}

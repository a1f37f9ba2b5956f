//! UTXO-model deployer (Qtum-style nodes with an EVM layer)

use super::{poll, CreateOptions, Deployer};
use crate::contract::{Bytes, CompiledContract, DeployedContract, HexFormat};
use crate::error::{DeployError, Result};
use crate::rpc::RpcClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Node answer to a contract creation request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedContract {
    pub txid: String,
    /// UTXO address that funded the creation.
    pub sender: String,
    /// Contract address, derived from the funding transaction id.
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoReceipt {
    pub contract_address: String,
    /// Execution exception, `"None"` on success.
    pub excepted: String,
}

/// Node calls the UTXO-model deployer relies on.
#[async_trait]
pub trait UtxoNode: Send + Sync {
    async fn create_contract(
        &self,
        bytecode: &str,
        gas_limit: u64,
        sender: Option<&str>,
    ) -> Result<CreatedContract>;

    /// `None` until the transaction is in a block.
    async fn transaction_receipt(&self, txid: &str) -> Result<Option<UtxoReceipt>>;

    async fn new_address(&self) -> Result<String>;

    async fn generate(&self, blocks: u32, address: &str) -> Result<()>;
}

pub struct UtxoDeployer<N> {
    node: N,
    sender: Option<String>,
    poll_interval: Duration,
}

impl<N: UtxoNode> UtxoDeployer<N> {
    pub fn new(node: N, poll_interval: Duration) -> Self {
        UtxoDeployer {
            node,
            sender: None,
            poll_interval,
        }
    }

    /// Fund creations from `sender` instead of letting the wallet choose.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

#[async_trait]
impl<N: UtxoNode> Deployer for UtxoDeployer<N> {
    fn hex_format(&self) -> HexFormat {
        HexFormat::Plain
    }

    async fn create_contract(
        &self,
        artifact: &CompiledContract,
        params: &[u8],
        name: &str,
        options: CreateOptions,
    ) -> Result<DeployedContract> {
        let mut code = artifact.bytecode()?.0;
        code.extend_from_slice(params);

        let created = self
            .node
            .create_contract(
                &Bytes(code).to_hex(HexFormat::Plain),
                options.gas_limit,
                self.sender.as_deref(),
            )
            .await?;

        let address = Bytes::from_hex(&created.address)?;
        info!(
            "Submitted {} in {} from {}, address {}",
            name, created.txid, created.sender, address
        );

        Ok(DeployedContract::pending(
            name,
            artifact,
            address,
            created.txid,
            Some(created.sender),
            options.as_lib,
        ))
    }

    async fn confirm_contract(&self, pending: DeployedContract) -> Result<DeployedContract> {
        let receipt = poll(self.poll_interval, || {
            self.node.transaction_receipt(&pending.tx_id)
        })
        .await?;

        if receipt.excepted != "None" {
            return Err(DeployError::Confirmation {
                name: pending.name.clone(),
                reason: format!("contract execution failed: {}", receipt.excepted),
            });
        }

        let address = Bytes::from_hex(&receipt.contract_address)?;
        if address != pending.address {
            return Err(DeployError::Confirmation {
                name: pending.name.clone(),
                reason: format!(
                    "node reports address {} but creation reported {}",
                    address, pending.address
                ),
            });
        }

        Ok(pending.confirm(address))
    }

    async fn mine(&self) -> Result<()> {
        let address = match &self.sender {
            Some(sender) => sender.clone(),
            None => self.node.new_address().await?,
        };
        self.node.generate(1, &address).await
    }
}

#[async_trait]
impl UtxoNode for RpcClient {
    async fn create_contract(
        &self,
        bytecode: &str,
        gas_limit: u64,
        sender: Option<&str>,
    ) -> Result<CreatedContract> {
        let params = match sender {
            // createcontract bytecode gaslimit gasprice senderaddress
            Some(sender) => json!([bytecode, gas_limit, 0.0000004, sender]),
            None => json!([bytecode, gas_limit]),
        };
        self.call("createcontract", params).await
    }

    async fn transaction_receipt(&self, txid: &str) -> Result<Option<UtxoReceipt>> {
        let receipts: Vec<UtxoReceipt> = self.call("gettransactionreceipt", json!([txid])).await?;
        Ok(receipts.into_iter().next())
    }

    async fn new_address(&self) -> Result<String> {
        self.call("getnewaddress", json!([])).await
    }

    async fn generate(&self, blocks: u32, address: &str) -> Result<()> {
        let _: Vec<String> = self
            .call("generatetoaddress", json!([blocks, address]))
            .await?;
        Ok(())
    }
}

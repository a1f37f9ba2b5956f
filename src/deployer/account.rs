//! Account-model deployer (Ethereum-style nodes)

use super::{poll, CreateOptions, Deployer};
use crate::contract::{Bytes, CompiledContract, DeployedContract, HexFormat};
use crate::error::{DeployError, Result};
use crate::rpc::{parse_quantity, RpcClient};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Contract creation transaction sent from an unlocked node account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTransaction {
    pub from: Bytes,
    pub data: Bytes,
    pub gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub contract_address: Option<Bytes>,
    /// 1 on success, 0 on revert; absent on pre-Byzantium nodes.
    pub status: Option<u64>,
}

/// Node calls the account-model deployer relies on.
#[async_trait]
pub trait AccountNode: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Bytes>>;

    /// Next nonce of `account`, counting transactions still in the pool.
    async fn transaction_count(&self, account: &Bytes) -> Result<u64>;

    /// Returns the transaction hash.
    async fn send_transaction(&self, tx: &CreateTransaction) -> Result<String>;

    /// `None` until the transaction is mined.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>>;

    async fn mine(&self) -> Result<()>;
}

/// CREATE address: keccak256(rlp([sender, nonce]))[12..].
pub fn contract_address(sender: &Bytes, nonce: u64) -> Result<Bytes> {
    if sender.len() != 20 {
        return Err(DeployError::Configuration(format!(
            "sender {} is not a 20-byte account",
            sender
        )));
    }

    let address = Address::from_slice(sender.as_slice()).create(nonce);
    Ok(Bytes(address.as_slice().to_vec()))
}

pub struct AccountDeployer<N> {
    node: N,
    sender: Option<Bytes>,
    poll_interval: Duration,
}

impl<N: AccountNode> AccountDeployer<N> {
    pub fn new(node: N, poll_interval: Duration) -> Self {
        AccountDeployer {
            node,
            sender: None,
            poll_interval,
        }
    }

    /// Send from `sender` instead of the node's first account.
    pub fn with_sender(mut self, sender: Bytes) -> Self {
        self.sender = Some(sender);
        self
    }

    async fn sender(&self) -> Result<Bytes> {
        if let Some(sender) = &self.sender {
            return Ok(sender.clone());
        }

        self.node
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::Configuration("node has no unlocked accounts".to_string()))
    }
}

#[async_trait]
impl<N: AccountNode> Deployer for AccountDeployer<N> {
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
        let sender = self.sender().await?;

        // The nonce moves with every later transaction from this sender, so
        // the address is fixed now.
        let nonce = self.node.transaction_count(&sender).await?;
        let address = contract_address(&sender, nonce)?;

        let mut data = artifact.bytecode()?.0;
        data.extend_from_slice(params);

        let tx_id = self
            .node
            .send_transaction(&CreateTransaction {
                from: sender.clone(),
                data: Bytes(data),
                gas: options.gas_limit,
            })
            .await?;

        info!(
            "Submitted {} from {} (nonce {}), expecting {}",
            name,
            sender.to_hex(HexFormat::Prefixed),
            nonce,
            address.to_hex(HexFormat::Prefixed)
        );

        Ok(DeployedContract::pending(
            name,
            artifact,
            address,
            tx_id,
            Some(sender.to_hex(HexFormat::Prefixed)),
            options.as_lib,
        ))
    }

    async fn confirm_contract(&self, pending: DeployedContract) -> Result<DeployedContract> {
        let receipt = poll(self.poll_interval, || {
            self.node.transaction_receipt(&pending.tx_id)
        })
        .await?;

        if receipt.status == Some(0) {
            return Err(DeployError::Confirmation {
                name: pending.name.clone(),
                reason: format!("transaction {} reverted", pending.tx_id),
            });
        }

        let address = receipt
            .contract_address
            .ok_or_else(|| DeployError::Confirmation {
                name: pending.name.clone(),
                reason: "receipt carries no contract address".to_string(),
            })?;

        if address != pending.address {
            warn!(
                "{} landed at {} instead of predicted {}",
                pending.name, address, pending.address
            );
        }

        Ok(pending.confirm(address))
    }

    async fn mine(&self) -> Result<()> {
        self.node.mine().await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl AccountNode for RpcClient {
    async fn accounts(&self) -> Result<Vec<Bytes>> {
        let accounts: Vec<String> = self.call("eth_accounts", json!([])).await?;
        accounts.iter().map(|a| Bytes::from_hex(a)).collect()
    }

    async fn transaction_count(&self, account: &Bytes) -> Result<u64> {
        let count: String = self
            .call(
                "eth_getTransactionCount",
                json!([account.to_hex(HexFormat::Prefixed), "pending"]),
            )
            .await?;
        parse_quantity(&count)
    }

    async fn send_transaction(&self, tx: &CreateTransaction) -> Result<String> {
        self.call(
            "eth_sendTransaction",
            json!([{
                "from": tx.from.to_hex(HexFormat::Prefixed),
                "data": tx.data.to_hex(HexFormat::Prefixed),
                "gas": format!("0x{:x}", tx.gas),
            }]),
        )
        .await
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        receipt
            .map(|r| {
                Ok(Receipt {
                    contract_address: r
                        .contract_address
                        .as_deref()
                        .map(Bytes::from_hex)
                        .transpose()?,
                    status: r.status.as_deref().map(parse_quantity).transpose()?,
                })
            })
            .transpose()
    }

    async fn mine(&self) -> Result<()> {
        let _: serde_json::Value = self.call("evm_mine", json!([])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeNode {
        nonce: Mutex<u64>,
        sent: Mutex<Vec<CreateTransaction>>,
        receipts: Mutex<HashMap<String, Receipt>>,
        /// Receipt lookups before the transaction shows up as mined.
        delay: Mutex<u32>,
    }

    const SENDER: &str = "6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0";

    #[async_trait]
    impl AccountNode for FakeNode {
        async fn accounts(&self) -> Result<Vec<Bytes>> {
            Ok(vec![Bytes::from_hex(SENDER)?])
        }

        async fn transaction_count(&self, _account: &Bytes) -> Result<u64> {
            Ok(*self.nonce.lock().unwrap())
        }

        async fn send_transaction(&self, tx: &CreateTransaction) -> Result<String> {
            let mut nonce = self.nonce.lock().unwrap();
            let hash = format!("0xtx{}", *nonce);
            let address = contract_address(&tx.from, *nonce)?;
            *nonce += 1;
            self.sent.lock().unwrap().push(tx.clone());
            self.receipts.lock().unwrap().insert(
                hash.clone(),
                Receipt {
                    contract_address: Some(address),
                    status: Some(1),
                },
            );
            Ok(hash)
        }

        async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
            let mut delay = self.delay.lock().unwrap();
            if *delay > 0 {
                *delay -= 1;
                return Ok(None);
            }
            Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
        }

        async fn mine(&self) -> Result<()> {
            Ok(())
        }
    }

    fn artifact() -> CompiledContract {
        CompiledContract {
            source: "Token.sol".into(),
            name: "Token".into(),
            abi: serde_json::json!([]),
            bin: "6080".into(),
        }
    }

    fn options() -> CreateOptions {
        CreateOptions {
            as_lib: false,
            gas_limit: 3_000_000,
        }
    }

    #[test]
    fn test_contract_address_vectors() {
        let sender = Bytes::from_hex(SENDER).unwrap();
        assert_eq!(
            contract_address(&sender, 0).unwrap().to_string(),
            "cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"
        );
        assert_eq!(
            contract_address(&sender, 1).unwrap().to_string(),
            "343c43a37d37dff08ae8c4a11544c718abb4fcf8"
        );
        assert_ne!(
            contract_address(&sender, 0x80).unwrap(),
            contract_address(&sender, 0x7f).unwrap()
        );
        assert!(contract_address(&Bytes(vec![1; 4]), 0).is_err());
    }

    #[tokio::test]
    async fn test_create_predicts_address_and_appends_params() {
        let deployer = AccountDeployer::new(FakeNode::default(), Duration::from_millis(1));
        let first = deployer
            .create_contract(&artifact(), &[0xaa], "Token", options())
            .await
            .unwrap();
        let second = deployer
            .create_contract(&artifact(), &[], "Other", options())
            .await
            .unwrap();

        assert!(!first.is_confirmed());
        assert_eq!(first.address.to_string(), "cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d");
        assert_eq!(second.address.to_string(), "343c43a37d37dff08ae8c4a11544c718abb4fcf8");

        let sent = deployer.node.sent.lock().unwrap();
        assert_eq!(sent[0].data, Bytes(vec![0x60, 0x80, 0xaa]));
        assert_eq!(sent[0].gas, 3_000_000);
    }

    #[tokio::test]
    async fn test_confirm_polls_until_mined() {
        let node = FakeNode::default();
        *node.delay.lock().unwrap() = 3;
        let deployer = AccountDeployer::new(node, Duration::from_millis(1));
        let pending = deployer
            .create_contract(&artifact(), &[], "Token", options())
            .await
            .unwrap();

        let confirmed = deployer.confirm_contract(pending.clone()).await.unwrap();
        assert!(confirmed.is_confirmed());
        assert_eq!(confirmed.address, pending.address);
        assert_eq!(*deployer.node.delay.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reverted_creation_fails_confirmation() {
        let deployer = AccountDeployer::new(FakeNode::default(), Duration::from_millis(1));
        let pending = deployer
            .create_contract(&artifact(), &[], "Token", options())
            .await
            .unwrap();
        deployer
            .node
            .receipts
            .lock()
            .unwrap()
            .get_mut(&pending.tx_id)
            .unwrap()
            .status = Some(0);

        let err = deployer.confirm_contract(pending).await.unwrap_err();
        assert!(matches!(err, DeployError::Confirmation { .. }));
    }

    #[tokio::test]
    async fn test_explicit_sender_overrides_node_account() {
        let other = Bytes(vec![0x11; 20]);
        let deployer = AccountDeployer::new(FakeNode::default(), Duration::from_millis(1))
            .with_sender(other.clone());
        let pending = deployer
            .create_contract(&artifact(), &[], "Token", options())
            .await
            .unwrap();

        assert_eq!(deployer.node.sent.lock().unwrap()[0].from, other);
        assert_eq!(pending.address, contract_address(&other, 0).unwrap());
        assert_eq!(pending.sender, Some(other.to_hex(HexFormat::Prefixed)));
    }
}

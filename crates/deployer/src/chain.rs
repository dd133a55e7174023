//! Access to the chain contracts are deployed to.

use {
    alloy::{
        network::TransactionBuilder,
        primitives::{Address, B256, Bytes},
        providers::Provider,
        rpc::types::{TransactionReceipt, TransactionRequest},
    },
    anyhow::{Context, Result, ensure},
    ethrpc::AlloyProvider,
};

/// Outcome of a mined contract creation transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub address: Address,
    pub transaction_hash: B256,
}

#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait Chain: Send + Sync {
    /// Network id deployments on this chain are recorded under.
    fn network_id(&self) -> u64;

    /// Whether any contract code lives at `address`.
    async fn has_code(&self, address: Address) -> Result<bool>;

    /// Submits a contract creation transaction and waits until it is mined.
    async fn deploy(&self, creation_code: Bytes) -> Result<Receipt>;
}

#[derive(Debug)]
pub struct AlloyChain {
    provider: AlloyProvider,
    network_id: u64,
    from: Address,
    gas_limit: Option<u64>,
}

impl AlloyChain {
    pub fn new(
        provider: AlloyProvider,
        network_id: u64,
        from: Address,
        gas_limit: Option<u64>,
    ) -> Self {
        Self {
            provider,
            network_id,
            from,
            gas_limit,
        }
    }

    /// Contract creation transaction sent for `creation_code`.
    pub(crate) fn creation_request(&self, creation_code: Bytes) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .with_from(self.from)
            .with_deploy_code(creation_code);
        if let Some(gas_limit) = self.gas_limit {
            tx.set_gas_limit(gas_limit);
        }
        tx
    }
}

/// Address of the contract a mined creation transaction produced.
fn created_address(receipt: &TransactionReceipt) -> Result<Address> {
    let transaction_hash = receipt.transaction_hash;
    ensure!(
        receipt.status(),
        "deployment transaction {transaction_hash} reverted"
    );
    receipt
        .contract_address
        .with_context(|| format!("receipt of {transaction_hash} has no contract address"))
}

#[async_trait::async_trait]
impl Chain for AlloyChain {
    fn network_id(&self) -> u64 {
        self.network_id
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .with_context(|| format!("failed to fetch code at {address}"))?;
        Ok(!code.is_empty())
    }

    async fn deploy(&self, creation_code: Bytes) -> Result<Receipt> {
        let pending = self
            .provider
            .send_transaction(self.creation_request(creation_code))
            .await
            .context("failed to submit deployment transaction")?;
        let transaction_hash = *pending.tx_hash();
        tracing::debug!(?transaction_hash, "waiting for deployment to be mined");

        let receipt = pending
            .get_receipt()
            .await
            .with_context(|| format!("failed to confirm deployment transaction {transaction_hash}"))?;
        Ok(Receipt {
            address: created_address(&receipt)?,
            transaction_hash,
        })
    }
}

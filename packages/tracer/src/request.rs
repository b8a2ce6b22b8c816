//! Call Argument Construction
//!
//! The transaction record returned by a lookup and the sparse call argument
//! set derived from it for `debug_traceCall`.

use alloy::primitives::{Address, Bytes, TxHash, U256, U64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a looked-up transaction cannot be traced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Transaction has no sender")]
    MissingSender,

    #[error("Transaction signed for chain {actual}, connected to chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Transaction record as returned by `eth_getTransactionByHash`
///
/// Only the fields the trace call needs are kept; everything else in the
/// node's response is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub hash: TxHash,
    #[serde(default)]
    pub from: Option<Address>,
    /// Recipient (None for contract creation)
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub gas: U64,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    /// Absent for pre-EIP-155 legacy transactions
    #[serde(default)]
    pub chain_id: Option<U64>,
}

impl PendingTransaction {
    /// Price the sender is willing to pay per gas unit
    ///
    /// Fee-market transactions may omit `gasPrice`; the fee cap stands in.
    pub fn effective_gas_price(&self) -> Option<U256> {
        self.gas_price.or(self.max_fee_per_gas)
    }

    /// Sender of the transaction, checked against the connected chain
    pub fn resolve_sender(&self, chain_id: u64) -> Result<Address, ArgsError> {
        if let Some(tx_chain) = self.chain_id {
            let actual = tx_chain.to::<u64>();
            if actual != chain_id {
                return Err(ArgsError::ChainMismatch {
                    expected: chain_id,
                    actual,
                });
            }
        }
        self.from.ok_or(ArgsError::MissingSender)
    }
}

/// Sparse argument object for `debug_traceCall`
///
/// `from` and `to` are always present (`to` is null for contract creation);
/// every other field is omitted when empty or zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallArgs {
    pub from: Address,
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64>,
    #[serde(rename = "gasPrice", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
}

impl CallArgs {
    /// Build call arguments from a looked-up transaction
    ///
    /// # Arguments
    /// * `tx` - The transaction returned by the lookup
    /// * `chain_id` - Chain id of the connected node
    pub fn from_transaction(tx: &PendingTransaction, chain_id: u64) -> Result<Self, ArgsError> {
        let from = tx.resolve_sender(chain_id)?;

        Ok(CallArgs {
            from,
            to: tx.to,
            data: (!tx.input.is_empty()).then(|| tx.input.clone()),
            value: non_zero(tx.value),
            gas: (tx.gas != U64::ZERO).then_some(tx.gas),
            gas_price: tx.effective_gas_price().and_then(non_zero),
        })
    }
}

fn non_zero(value: U256) -> Option<U256> {
    (!value.is_zero()).then_some(value)
}

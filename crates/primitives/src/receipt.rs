use alloy_primitives::{Address, Bloom, BloomInput, Bytes, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A log emitted during execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Log {
    /// Address of the contract that emitted the log.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,
}

/// An execution receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Receipt {
    /// Whether the transaction succeeded.
    pub success: bool,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Bloom filter over the logs of this receipt.
    pub bloom: Bloom,
    /// Logs emitted by this transaction.
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Computes the bloom filter for a set of logs.
    pub fn bloom_for(logs: &[Log]) -> Bloom {
        let mut bloom = Bloom::ZERO;
        for log in logs {
            bloom.accrue(BloomInput::Raw(log.address.as_slice()));
            for topic in &log.topics {
                bloom.accrue(BloomInput::Raw(topic.as_slice()));
            }
        }
        bloom
    }

    /// Creates a receipt with its bloom derived from `logs`.
    pub fn new(success: bool, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        let bloom = Self::bloom_for(&logs);
        Self { success, cumulative_gas_used, bloom, logs }
    }
}

use alloy_primitives::{keccak256, Bloom, Bytes, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A light-chain block header.
///
/// Carries only the fields the retrieval validators need: the parent link,
/// the state and receipt commitments, and the logs bloom.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    /// Hash of the parent block's header.
    pub parent_hash: B256,
    /// Block height.
    pub number: u64,
    /// Root of the state trie after executing this block.
    pub state_root: B256,
    /// Root of the trie over this block's receipts.
    pub receipts_root: B256,
    /// Union of the bloom filters of all logs in this block.
    pub logs_bloom: Bloom,
    /// Block timestamp in seconds since the unix epoch.
    pub timestamp: u64,
    /// Arbitrary extra data committed by the block producer.
    pub extra_data: Bytes,
}

impl Header {
    /// Computes the hash of the RLP encoding of this header.
    ///
    /// This hashes on every call; prefer carrying a [`SealedHeader`] where
    /// the hash is needed repeatedly.
    pub fn hash_slow(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Seals the header with its computed hash.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }

    /// Seals the header with a hash that was already computed.
    ///
    /// The hash is not checked against the header contents.
    pub const fn seal(self, hash: B256) -> SealedHeader {
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] together with its memoized hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SealedHeader {
    header: Header,
    hash: B256,
}

impl SealedHeader {
    /// Returns the memoized header hash.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// Returns a reference to the inner header.
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Consumes the seal and returns the plain header.
    pub fn unseal(self) -> Header {
        self.header
    }
}

impl std::ops::Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl AsRef<Header> for SealedHeader {
    fn as_ref(&self) -> &Header {
        &self.header
    }
}

/// Either a block hash or a block number, used to address a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockHashOrNumber {
    /// The hash of a block.
    Hash(B256),
    /// The height of a block.
    Number(u64),
}

impl BlockHashOrNumber {
    /// Returns the block number if this is a number.
    pub const fn as_number(self) -> Option<u64> {
        match self {
            Self::Hash(_) => None,
            Self::Number(n) => Some(n),
        }
    }
}

impl From<B256> for BlockHashOrNumber {
    fn from(hash: B256) -> Self {
        Self::Hash(hash)
    }
}

impl From<u64> for BlockHashOrNumber {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl std::fmt::Display for BlockHashOrNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{hash}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

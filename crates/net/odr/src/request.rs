use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use lantern_network_types::RequestKind;
use lantern_primitives::{BlockNumber, Header, Receipt, SealedHeader, StateAccount};

/// A typed data need, the unit of work [`retrieve`] accepts.
///
/// Each variant carries exactly the identifiers its validator needs; the
/// trusted commitment is resolved by the manager at call time and is never
/// taken from the response.
///
/// [`retrieve`]: crate::RetrieveManager::retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdrRequest {
    /// A header addressed by its hash.
    HeaderByHash {
        /// Hash the returned header must seal to.
        hash: B256,
    },
    /// A canonical header addressed by height.
    ///
    /// Heights below the CHT frontier are proved against the section root;
    /// heights the live chain covers are checked against the local hash.
    HeaderByNumber {
        /// Height of the requested header.
        number: BlockNumber,
    },
    /// An account in the state trie of a block.
    Account {
        /// Height whose state is queried.
        number: BlockNumber,
        /// Account address.
        address: Address,
    },
    /// A storage slot of an account, proved through the account.
    Storage {
        /// Height whose state is queried.
        number: BlockNumber,
        /// Account address.
        address: Address,
        /// Storage slot key.
        slot: B256,
    },
    /// The full receipt set of a block.
    Receipts {
        /// Height of the block.
        number: BlockNumber,
    },
    /// Contract bytecode addressed by its code hash.
    Code {
        /// Hash the returned bytecode must hash to.
        code_hash: B256,
    },
    /// The logs bloom of a block, proved against the bloom section index
    /// for heights below its frontier.
    Bloom {
        /// Height of the block.
        number: BlockNumber,
    },
}

impl OdrRequest {
    /// A short tag for logs.
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::HeaderByHash { .. } => "header-by-hash",
            Self::HeaderByNumber { .. } => "header-by-number",
            Self::Account { .. } => "account",
            Self::Storage { .. } => "storage",
            Self::Receipts { .. } => "receipts",
            Self::Code { .. } => "code",
            Self::Bloom { .. } => "bloom",
        }
    }
}

/// Verified data returned by a successful retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedData {
    /// A header that sealed to the requested or proven hash.
    Header(SealedHeader),
    /// An account proven against the trusted state root.
    Account(StateAccount),
    /// A storage value proven through its account.
    Storage(U256),
    /// Receipts matching the trusted receipts root.
    Receipts(Vec<Receipt>),
    /// Bytecode matching the requested code hash.
    Code(Bytes),
    /// A logs bloom proven against the bloom section index or the local
    /// header.
    Bloom(Bloom),
}

impl VerifiedData {
    /// The header, if this is header data.
    pub fn into_header(self) -> Option<SealedHeader> {
        match self {
            Self::Header(header) => Some(header),
            _ => None,
        }
    }

    /// The account, if this is account data.
    pub const fn as_account(&self) -> Option<&StateAccount> {
        match self {
            Self::Account(account) => Some(account),
            _ => None,
        }
    }

    /// The receipts, if this is receipt data.
    pub fn into_receipts(self) -> Option<Vec<Receipt>> {
        match self {
            Self::Receipts(receipts) => Some(receipts),
            _ => None,
        }
    }
}

/// Which derived index an [`IndexProofQuery`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTable {
    /// The canonical-hash-trie sections.
    Cht,
    /// The bloom sections.
    Bloom,
}

impl alloy_rlp::Encodable for IndexTable {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let tag: u8 = match self {
            Self::Cht => 0,
            Self::Bloom => 1,
        };
        tag.encode(out);
    }

    fn length(&self) -> usize {
        1
    }
}

impl alloy_rlp::Decodable for IndexTable {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        match u8::decode(buf)? {
            0 => Ok(Self::Cht),
            1 => Ok(Self::Bloom),
            _ => Err(alloy_rlp::Error::Custom("unknown index table")),
        }
    }
}

/// Wire query of the headers request kind.
///
/// Addresses a header by hash, or by height when `hash` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct HeaderQuery {
    /// Hash of the requested header, zero when querying by height.
    pub hash: B256,
    /// Height of the requested header, ignored unless `hash` is zero.
    pub number: u64,
}

/// Wire query of the account-proof request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccountQuery {
    /// Hash of the block whose state is queried.
    pub hash: B256,
    /// Account address.
    pub address: Address,
}

/// Wire query of the storage-proof request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StorageQuery {
    /// Hash of the block whose state is queried.
    pub hash: B256,
    /// Account address.
    pub address: Address,
    /// Storage slot key.
    pub slot: B256,
}

/// Wire query of the receipts request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct ReceiptsQuery {
    /// Hash of the block whose receipts are requested.
    pub hash: B256,
}

/// Wire query of the code request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CodeQuery {
    /// Code hash of the requested bytecode.
    pub code_hash: B256,
}

/// Wire query of the index-proof request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct IndexProofQuery {
    /// Which derived index to prove against.
    pub table: IndexTable,
    /// Section the proven entry belongs to.
    pub section: u64,
    /// Height of the proven entry.
    pub number: u64,
}

/// Response to a [`HeaderQuery`].
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct HeaderResponse {
    /// The requested header.
    pub header: Header,
}

/// Response to a CHT [`IndexProofQuery`]: the header plus the proof tying
/// its hash into the section trie.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct HeaderProofResponse {
    /// The requested header.
    pub header: Header,
    /// Merkle proof of the header's hash under the section root.
    pub proof: Vec<Bytes>,
}

/// Response to an [`AccountQuery`].
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccountResponse {
    /// The account claimed to live at the queried address.
    pub account: StateAccount,
    /// Merkle proof of the account under the trusted state root.
    pub proof: Vec<Bytes>,
}

/// Response to a [`StorageQuery`]: the account proof anchors the storage
/// root the slot proof is checked against.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StorageResponse {
    /// The account owning the storage.
    pub account: StateAccount,
    /// Merkle proof of the account under the trusted state root.
    pub account_proof: Vec<Bytes>,
    /// The claimed slot value.
    pub value: U256,
    /// Merkle proof of the slot under the account's storage root.
    pub storage_proof: Vec<Bytes>,
}

/// Response to a [`ReceiptsQuery`].
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct ReceiptsResponse {
    /// All receipts of the block, in order.
    pub receipts: Vec<Receipt>,
}

/// Response to a [`CodeQuery`].
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CodeResponse {
    /// The requested bytecode.
    pub code: Bytes,
}

/// Response to a bloom [`IndexProofQuery`].
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BloomProofResponse {
    /// The claimed logs bloom.
    pub bloom: Bloom,
    /// Merkle proof of the bloom under the section root, empty when the
    /// bloom was checked against a live header instead.
    pub proof: Vec<Bytes>,
}

pub(crate) fn kind_of(request: &OdrRequest, historical: bool) -> RequestKind {
    match request {
        OdrRequest::HeaderByHash { .. } => RequestKind::Headers,
        OdrRequest::HeaderByNumber { .. } => {
            if historical {
                RequestKind::IndexProof
            } else {
                RequestKind::Headers
            }
        }
        OdrRequest::Account { .. } => RequestKind::AccountProof,
        OdrRequest::Storage { .. } => RequestKind::StorageProof,
        OdrRequest::Receipts { .. } => RequestKind::Receipts,
        OdrRequest::Code { .. } => RequestKind::Code,
        OdrRequest::Bloom { .. } => RequestKind::IndexProof,
    }
}

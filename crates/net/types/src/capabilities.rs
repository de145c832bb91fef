/// The kinds of requests a light peer can serve.
///
/// This is a closed set: adding a kind means adding a validator for it in
/// the retrieval layer, so unknown kinds are a programming error rather
/// than a protocol extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RequestKind {
    /// Block headers by hash or number.
    Headers,
    /// Merkle proof for an account in the state trie.
    AccountProof,
    /// Merkle proof for a storage slot, chained through the account.
    StorageProof,
    /// The full receipt set of a block.
    Receipts,
    /// Contract bytecode by code hash.
    Code,
    /// Proof against a CHT or bloom section commitment.
    IndexProof,
}

impl RequestKind {
    /// All request kinds, in wire order.
    pub const ALL: [Self; 6] = [
        Self::Headers,
        Self::AccountProof,
        Self::StorageProof,
        Self::Receipts,
        Self::Code,
        Self::IndexProof,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::Headers => 1 << 0,
            Self::AccountProof => 1 << 1,
            Self::StorageProof => 1 << 2,
            Self::Receipts => 1 << 3,
            Self::Code => 1 << 4,
            Self::IndexProof => 1 << 5,
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Headers => "headers",
            Self::AccountProof => "account-proof",
            Self::StorageProof => "storage-proof",
            Self::Receipts => "receipts",
            Self::Code => "code",
            Self::IndexProof => "index-proof",
        };
        f.write_str(name)
    }
}

/// The set of request kinds a peer advertises during the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capabilities(u8);

impl Capabilities {
    /// A peer serving every request kind.
    pub const fn full() -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < RequestKind::ALL.len() {
            bits |= RequestKind::ALL[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Builds a capability set from individual kinds.
    pub fn from_kinds(kinds: impl IntoIterator<Item = RequestKind>) -> Self {
        Self(kinds.into_iter().fold(0, |bits, kind| bits | kind.bit()))
    }

    /// Returns `true` if the peer advertises support for `kind`.
    pub const fn serves(&self, kind: RequestKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns `true` if no kind is advertised.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

use alloy_primitives::{Bloom, Bytes, B256};
use alloy_trie::{HashBuilder, Nibbles};
use lantern_primitives::SealedHeader;

/// The trie key a block's entry is filed under within its section.
///
/// Big-endian block numbers sort the same way numerically and
/// lexicographically, so entries can be fed to the trie builder in chain
/// order.
pub fn section_key(number: u64) -> [u8; 8] {
    number.to_be_bytes()
}

/// The value a CHT section stores per block: the RLP of the block hash.
pub fn cht_value(hash: &B256) -> Vec<u8> {
    alloy_rlp::encode(hash)
}

/// The value a bloom section stores per block: the RLP of the logs bloom.
pub fn bloom_value(bloom: &Bloom) -> Vec<u8> {
    alloy_rlp::encode(bloom)
}

/// Decodes the aggregated bloom stored as a bloom section's summary.
pub fn decode_section_bloom(summary: &[u8]) -> Option<Bloom> {
    Bloom::try_from(summary).ok()
}

/// What a backend hands back when a section closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOutput {
    /// The section commitment root.
    pub root: B256,
    /// Opaque per-section summary stored alongside the root.
    pub summary: Option<Bytes>,
}

/// Derives one commitment per section from the headers of that section.
///
/// The indexer drives a backend strictly in order: `reset` for a section,
/// `process` for each header of the section from low to high, then `commit`
/// exactly once. A backend never sees headers from two sections interleaved.
pub trait IndexerBackend: Send + 'static {
    /// Name of the derived index, used to namespace checkpoints and logs.
    const NAME: &'static str;

    /// Discards buffered state and starts the given section.
    fn reset(&mut self, section: u64);

    /// Folds one canonical header into the current section.
    fn process(&mut self, header: &SealedHeader);

    /// Closes the current section and returns its commitment.
    fn commit(&mut self) -> SectionOutput;
}

fn ordered_section_root(entries: impl Iterator<Item = (u64, Vec<u8>)>) -> B256 {
    let mut hb = HashBuilder::default();
    for (number, value) in entries {
        hb.add_leaf(Nibbles::unpack(section_key(number)), &value);
    }
    hb.root()
}

/// Canonical-hash-trie backend: commits a section to a trie mapping block
/// numbers to block hashes.
///
/// A proof against the section root lets a light client verify the canonical
/// hash of any block in the section without holding its header.
#[derive(Debug, Default)]
pub struct ChtBackend {
    entries: Vec<(u64, B256)>,
}

impl ChtBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexerBackend for ChtBackend {
    const NAME: &'static str = "cht";

    fn reset(&mut self, _section: u64) {
        self.entries.clear();
    }

    fn process(&mut self, header: &SealedHeader) {
        self.entries.push((header.number, header.hash()));
    }

    fn commit(&mut self) -> SectionOutput {
        let root =
            ordered_section_root(self.entries.drain(..).map(|(n, hash)| (n, cht_value(&hash))));
        SectionOutput { root, summary: None }
    }
}

/// Bloom backend: commits a section to a trie mapping block numbers to log
/// blooms, and keeps the union of those blooms as the section summary.
///
/// The union answers "can this section contain the topic at all" locally;
/// the per-block entries are what bloom proofs are served against.
#[derive(Debug, Default)]
pub struct BloomBackend {
    entries: Vec<(u64, Bloom)>,
    aggregate: Bloom,
}

impl BloomBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexerBackend for BloomBackend {
    const NAME: &'static str = "bloom";

    fn reset(&mut self, _section: u64) {
        self.entries.clear();
        self.aggregate = Bloom::ZERO;
    }

    fn process(&mut self, header: &SealedHeader) {
        self.entries.push((header.number, header.logs_bloom));
        self.aggregate.accrue_bloom(&header.logs_bloom);
    }

    fn commit(&mut self) -> SectionOutput {
        let root =
            ordered_section_root(self.entries.drain(..).map(|(n, bloom)| (n, bloom_value(&bloom))));
        let summary = Bytes::copy_from_slice(self.aggregate.as_slice());
        self.aggregate = Bloom::ZERO;
        SectionOutput { root, summary: Some(summary) }
    }
}

use crate::{metrics::IndexerMetrics, IndexerBackend};
use alloy_primitives::{Bytes, B256};
use lantern_api::{ChainReader, KeyValueStore, StoreError};
use lantern_primitives::BlockNumber;
use lantern_tasks::Shutdown;
use parking_lot::RwLock;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// Tuning knobs of a [`ChainIndexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Number of blocks per section.
    pub section_size: u64,
    /// Blocks that must follow a section before it is processed.
    pub confirmation_depth: u64,
    /// Initial delay before retrying a failed processing attempt.
    pub retry_backoff: Duration,
    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
    /// Consecutive failures after which the worker halts.
    pub max_retries: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            section_size: 4096,
            confirmation_depth: 256,
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_retries: 8,
        }
    }
}

impl IndexerConfig {
    /// Sets the section size in blocks.
    pub const fn with_section_size(mut self, section_size: u64) -> Self {
        self.section_size = section_size;
        self
    }

    /// Sets the confirmation depth in blocks.
    pub const fn with_confirmation_depth(mut self, confirmation_depth: u64) -> Self {
        self.confirmation_depth = confirmation_depth;
        self
    }

    /// Sets the retry backoff bounds.
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay before retry number `failures`, doubling up to the cap.
    fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1u32 << shift).min(self.max_backoff)
    }
}

/// Failures of the indexing process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexerError {
    /// The checkpoint store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A header inside a confirmed section is missing from the canonical
    /// chain.
    #[error("canonical header {0} missing while indexing")]
    MissingHeader(BlockNumber),
    /// The worker gave up after repeated failures.
    #[error("indexer halted after repeated failures")]
    Halted,
}

/// A committed section as served to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHead {
    /// The section commitment root.
    pub root: B256,
    /// Hash of the last header processed into the section.
    ///
    /// The section is valid only while this matches the canonical chain.
    pub last_hash: B256,
}

#[derive(Debug, Clone)]
struct StoredSection {
    root: B256,
    last_hash: B256,
    summary: Option<Bytes>,
}

#[derive(Debug)]
struct Shared {
    name: &'static str,
    section_size: u64,
    /// Committed sections, exposed only after their checkpoint write
    /// returned.
    sections: RwLock<Vec<StoredSection>>,
    halted: AtomicBool,
    /// Latest announced head height. A latest-value channel by construction
    /// coalesces notification bursts.
    head_tx: watch::Sender<BlockNumber>,
    /// Set when any head since the last worker run was a reorg.
    reorg_pending: AtomicBool,
}

/// Read handle onto an indexer, shared with the retrieval layer.
#[derive(Debug, Clone)]
pub struct IndexerHandle {
    shared: Arc<Shared>,
}

impl IndexerHandle {
    /// Announces a new canonical head to the indexer worker.
    ///
    /// `reorg` marks heads that replaced part of the previous chain; the
    /// worker then re-validates committed sections before resuming. Bursts
    /// collapse into one worker run, only the latest head matters.
    pub fn new_head(&self, number: BlockNumber, reorg: bool) {
        if reorg {
            self.shared.reorg_pending.store(true, Ordering::SeqCst);
        }
        self.shared.head_tx.send_replace(number);
    }

    /// The commitment of a committed section, or `None` while the section
    /// is unprocessed or invalidated.
    pub fn section_head(&self, section: u64) -> Option<SectionHead> {
        self.shared
            .sections
            .read()
            .get(section as usize)
            .map(|s| SectionHead { root: s.root, last_hash: s.last_hash })
    }

    /// The commitment root of a committed section.
    pub fn section_root(&self, section: u64) -> Option<B256> {
        self.section_head(section).map(|s| s.root)
    }

    /// The stored summary of a committed section, if the backend produces
    /// one.
    pub fn section_summary(&self, section: u64) -> Option<Bytes> {
        self.shared.sections.read().get(section as usize).and_then(|s| s.summary.clone())
    }

    /// Number of committed sections.
    pub fn sections(&self) -> u64 {
        self.shared.sections.read().len() as u64
    }

    /// First block height not covered by a committed section.
    pub fn frontier(&self) -> BlockNumber {
        self.sections() * self.shared.section_size
    }

    /// The section a block height belongs to.
    pub fn section_of(&self, number: BlockNumber) -> u64 {
        number / self.shared.section_size
    }

    /// Blocks per section.
    pub fn section_size(&self) -> u64 {
        self.shared.section_size
    }

    /// Whether the worker has given up after repeated failures.
    pub fn is_halted(&self) -> bool {
        self.shared.halted.load(Ordering::SeqCst)
    }

    /// Errors if the worker has halted.
    pub fn ensure_healthy(&self) -> Result<(), IndexerError> {
        if self.is_halted() {
            return Err(IndexerError::Halted)
        }
        Ok(())
    }
}

/// Incrementally derives per-section commitments from the canonical chain.
///
/// One background worker per instance drives processing; readers go through
/// the [`IndexerHandle`]. A section is only processed once the chain head is
/// `confirmation_depth` blocks past its end, and only becomes visible after
/// its checkpoint has been durably stored.
pub struct ChainIndexer<B, C> {
    backend: B,
    chain: C,
    store: Arc<dyn KeyValueStore>,
    config: IndexerConfig,
    shared: Arc<Shared>,
    metrics: IndexerMetrics,
}

impl<B: std::fmt::Debug, C: std::fmt::Debug> std::fmt::Debug for ChainIndexer<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainIndexer")
            .field("backend", &self.backend)
            .field("chain", &self.chain)
            .field("config", &self.config)
            .field("shared", &self.shared)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl<B: IndexerBackend, C: ChainReader> ChainIndexer<B, C> {
    /// Creates an indexer, restoring committed sections from the store.
    ///
    /// Processing resumes after the last durably recorded section; partial
    /// progress within a section is never recorded and is simply redone.
    pub fn new(
        backend: B,
        chain: C,
        store: Arc<dyn KeyValueStore>,
        config: IndexerConfig,
    ) -> Result<Self, IndexerError> {
        let sections = load_sections(store.as_ref(), B::NAME)?;
        if !sections.is_empty() {
            debug!(target: "indexer", indexer = B::NAME, sections = sections.len(), "restored checkpoint");
        }
        let metrics = IndexerMetrics::new(B::NAME);
        metrics.frontier.set((sections.len() as u64 * config.section_size) as f64);
        let (head_tx, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            name: B::NAME,
            section_size: config.section_size,
            sections: RwLock::new(sections),
            halted: AtomicBool::new(false),
            head_tx,
            reorg_pending: AtomicBool::new(false),
        });
        Ok(Self { backend, chain, store, config, shared, metrics })
    }

    /// Returns a read handle shared with the retrieval layer.
    pub fn handle(&self) -> IndexerHandle {
        IndexerHandle { shared: self.shared.clone() }
    }

    /// Runs the processing worker until shutdown or an unrecoverable
    /// failure.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        let mut head_rx = self.shared.head_tx.subscribe();
        let mut failures = 0u32;
        loop {
            match self.step() {
                Ok(()) => failures = 0,
                Err(err) => {
                    failures += 1;
                    self.metrics.retries.increment(1);
                    if failures > self.config.max_retries {
                        self.shared.halted.store(true, Ordering::SeqCst);
                        error!(
                            target: "indexer",
                            indexer = self.shared.name,
                            %err,
                            failures,
                            "halting after repeated failures"
                        );
                        return
                    }
                    let delay = self.config.backoff(failures);
                    warn!(
                        target: "indexer",
                        indexer = self.shared.name,
                        %err,
                        failures,
                        ?delay,
                        "processing failed, backing off"
                    );
                    tokio::select! {
                        _ = &mut shutdown => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue
                }
            }
            tokio::select! {
                _ = &mut shutdown => return,
                changed = head_rx.changed() => {
                    if changed.is_err() {
                        return
                    }
                }
            }
        }
    }

    /// Catches the committed sections up with the current confirmed chain.
    fn step(&mut self) -> Result<(), IndexerError> {
        if self.shared.reorg_pending.swap(false, Ordering::SeqCst) {
            if let Err(err) = self.rollback_invalid() {
                // the rollback must run before anything else is committed
                self.shared.reorg_pending.store(true, Ordering::SeqCst);
                return Err(err)
            }
        }

        let head = self.chain.head_number();
        let confirmed = (head + 1).saturating_sub(self.config.confirmation_depth);
        let target = confirmed / self.config.section_size;

        let mut count = self.shared.sections.read().len() as u64;
        while count < target {
            let stored = self.process_section(count)?;
            self.persist_section(count, &stored)?;
            self.shared.sections.write().push(stored);
            count += 1;
            self.metrics.sections_committed.increment(1);
            self.metrics.frontier.set((count * self.config.section_size) as f64);
            debug!(target: "indexer", indexer = self.shared.name, section = count - 1, "committed section");
        }
        Ok(())
    }

    fn process_section(&mut self, section: u64) -> Result<StoredSection, IndexerError> {
        let start = section * self.config.section_size;
        let end = start + self.config.section_size;
        trace!(target: "indexer", indexer = self.shared.name, section, start, end, "processing section");

        self.backend.reset(section);
        let mut last_hash = B256::ZERO;
        for number in start..end {
            let header =
                self.chain.header_by_number(number).ok_or(IndexerError::MissingHeader(number))?;
            self.backend.process(&header);
            last_hash = header.hash();
        }
        let output = self.backend.commit();
        Ok(StoredSection { root: output.root, last_hash, summary: output.summary })
    }

    /// Writes the section payload, then the count. The count write is the
    /// commit point.
    fn persist_section(&self, section: u64, stored: &StoredSection) -> Result<(), StoreError> {
        self.store.put(&section_root_key(self.shared.name, section), stored.root.as_slice())?;
        self.store.put(&section_hash_key(self.shared.name, section), stored.last_hash.as_slice())?;
        match &stored.summary {
            Some(summary) => {
                self.store.put(&section_summary_key(self.shared.name, section), summary)?
            }
            None => self.store.delete(&section_summary_key(self.shared.name, section))?,
        }
        self.store.put(&count_key(self.shared.name), &(section + 1).to_be_bytes())
    }

    /// Drops committed sections whose recorded last hash no longer matches
    /// the canonical chain. Validity is monotone: everything below the first
    /// mismatch stays, everything from it up goes.
    fn rollback_invalid(&mut self) -> Result<(), IndexerError> {
        let current = self.shared.sections.read().len();
        let mut valid = current;
        {
            let sections = self.shared.sections.read();
            while valid > 0 {
                let last_number = valid as u64 * self.config.section_size - 1;
                let canonical = self.chain.header_by_number(last_number).map(|h| h.hash());
                if canonical == Some(sections[valid - 1].last_hash) {
                    break
                }
                valid -= 1;
            }
        }
        if valid == current {
            return Ok(())
        }

        self.store.put(&count_key(self.shared.name), &(valid as u64).to_be_bytes())?;
        for section in valid as u64..current as u64 {
            self.store.delete(&section_root_key(self.shared.name, section))?;
            self.store.delete(&section_hash_key(self.shared.name, section))?;
            self.store.delete(&section_summary_key(self.shared.name, section))?;
        }
        self.shared.sections.write().truncate(valid);
        self.metrics.sections_invalidated.increment((current - valid) as u64);
        self.metrics.frontier.set((valid as u64 * self.config.section_size) as f64);
        warn!(
            target: "indexer",
            indexer = self.shared.name,
            invalidated = current - valid,
            remaining = valid,
            "invalidated sections after reorg"
        );
        Ok(())
    }
}

fn count_key(name: &str) -> Vec<u8> {
    format!("index/{name}/count").into_bytes()
}

fn section_root_key(name: &str, section: u64) -> Vec<u8> {
    format!("index/{name}/{section}/root").into_bytes()
}

fn section_hash_key(name: &str, section: u64) -> Vec<u8> {
    format!("index/{name}/{section}/hash").into_bytes()
}

fn section_summary_key(name: &str, section: u64) -> Vec<u8> {
    format!("index/{name}/{section}/summary").into_bytes()
}

fn load_sections(store: &dyn KeyValueStore, name: &str) -> Result<Vec<StoredSection>, StoreError> {
    let count = match store.get(&count_key(name))? {
        Some(raw) => {
            let bytes: [u8; 8] = raw
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Corrupt { key: format!("index/{name}/count") })?;
            u64::from_be_bytes(bytes)
        }
        None => 0,
    };

    let mut sections = Vec::with_capacity(count as usize);
    for section in 0..count {
        let root = read_hash(store, &section_root_key(name, section))?;
        let last_hash = read_hash(store, &section_hash_key(name, section))?;
        let summary = store.get(&section_summary_key(name, section))?.map(Bytes::from);
        sections.push(StoredSection { root, last_hash, summary });
    }
    Ok(sections)
}

fn read_hash(store: &dyn KeyValueStore, key: &[u8]) -> Result<B256, StoreError> {
    let corrupt = || StoreError::Corrupt { key: alloy_primitives::hex::encode(key) };
    let raw = store.get(key)?.ok_or_else(corrupt)?;
    B256::try_from(raw.as_slice()).map_err(|_| corrupt())
}

use crate::{
    entry::{PersistedEntry, PoolEntry},
    metrics::PoolMetrics,
    PoolConfig,
};
use lantern_api::{KeyValueStore, StoreError};
use lantern_network_types::{
    DisconnectCause, LightPeer, NodeRecord, PeerSet, PeerSetError, SCORE_FLOOR,
};
use lantern_primitives::PeerId;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};
use tracing::{debug, trace, warn};

const ENTRIES_KEY: &[u8] = b"pool/entries";

/// Diagnostic snapshot of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Known candidate addresses.
    pub candidates: usize,
    /// Currently connected peers.
    pub connected: usize,
}

/// Ranked, persistent set of candidate peers.
///
/// Tracks one [`PoolEntry`] per address ever discovered and scores it with
/// an exponential moving average of interaction rewards. Connected peers
/// live in the shared [`PeerSet`]; selection intersects that set with the
/// score table. All entry points are internally synchronized and never
/// block on the network.
pub struct ServerPool {
    peers: PeerSet,
    store: Arc<dyn KeyValueStore>,
    config: PoolConfig,
    entries: Mutex<HashMap<PeerId, PoolEntry>>,
    metrics: PoolMetrics,
}

impl std::fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPool")
            .field("peers", &self.peers)
            .field("config", &self.config)
            .field("entries", &self.entries)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl ServerPool {
    /// Creates a pool, restoring persisted entries from the store.
    ///
    /// Stored scores are faded by the configured restart decay: knowledge
    /// ages while the node is offline.
    pub fn new(
        peers: PeerSet,
        store: Arc<dyn KeyValueStore>,
        config: PoolConfig,
    ) -> Result<Self, StoreError> {
        let mut entries = HashMap::new();
        if let Some(raw) = store.get(ENTRIES_KEY)? {
            let persisted: Vec<PersistedEntry> = serde_json::from_slice(&raw)
                .map_err(|_| StoreError::Corrupt { key: "pool/entries".to_owned() })?;
            for persisted in persisted {
                let entry = persisted.into_entry(config.restart_decay);
                entries.insert(entry.record.id, entry);
            }
            debug!(target: "net::pool", candidates = entries.len(), "restored pool entries");
        }
        let metrics = PoolMetrics::default();
        metrics.candidates.set(entries.len() as f64);
        Ok(Self { peers, store, config, entries: Mutex::new(entries), metrics })
    }

    /// The shared registry of connected peers.
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Registers a candidate address. Idempotent.
    pub fn discovered(&self, record: NodeRecord) {
        let mut entries = self.entries.lock();
        if entries.contains_key(&record.id) {
            return
        }
        trace!(target: "net::pool", %record, "discovered candidate");
        entries.insert(record.id, PoolEntry::new(record));
        self.metrics.candidates.set(entries.len() as f64);
    }

    /// Records an established connection and makes the peer selectable.
    pub fn connected(
        &self,
        peer: Arc<LightPeer>,
        addr: std::net::SocketAddr,
    ) -> Result<(), PeerSetError> {
        self.peers.register(peer.clone())?;
        let mut entries = self.entries.lock();
        let entry =
            entries.entry(peer.id()).or_insert_with(|| PoolEntry::new(NodeRecord::new(peer.id(), addr)));
        entry.successes += 1;
        entry.last_success = Some(SystemTime::now());
        self.metrics.candidates.set(entries.len() as f64);
        self.metrics.connected.set(self.peers.len() as f64);
        Ok(())
    }

    /// Records a closed connection and scores it by cause.
    pub fn disconnected(&self, id: &PeerId, cause: DisconnectCause) {
        self.peers.unregister(id);
        self.metrics.connected.set(self.peers.len() as f64);
        let reward = self.config.weights.for_disconnect(cause);
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            if !matches!(cause, DisconnectCause::Graceful) {
                entry.failures += 1;
            }
            Self::fold_reward(entry, reward, &self.config);
        }
        debug!(target: "net::pool", peer = %id, ?cause, "peer disconnected");
    }

    /// Returns the best eligible connected peer, or `None`.
    ///
    /// Never blocks; the caller decides whether to wait and retry. Ties are
    /// broken toward the peer that served successfully most recently.
    pub fn select_peer(
        &self,
        exclude: &HashSet<PeerId>,
        predicate: impl Fn(&LightPeer) -> bool,
    ) -> Option<Arc<LightPeer>> {
        self.ranked_peers(exclude, predicate).into_iter().next()
    }

    /// All eligible connected peers, best first.
    ///
    /// The distributor walks this ranking when the best peer has no free
    /// request slot.
    pub fn ranked_peers(
        &self,
        exclude: &HashSet<PeerId>,
        predicate: impl Fn(&LightPeer) -> bool,
    ) -> Vec<Arc<LightPeer>> {
        let now = Instant::now();
        let candidates = self
            .peers
            .filtered(|peer| !peer.is_closed() && !exclude.contains(&peer.id()) && predicate(peer));

        let entries = self.entries.lock();
        let mut ranked: Vec<(f64, Option<SystemTime>, Arc<LightPeer>)> = candidates
            .into_iter()
            .filter_map(|peer| {
                let entry = entries.get(&peer.id())?;
                entry
                    .eligible(self.config.cooldown_threshold, now)
                    .then(|| (entry.score, entry.last_success, peer))
            })
            .collect();
        drop(entries);

        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(b.1.cmp(&a.1))
        });
        ranked.into_iter().map(|(_, _, peer)| peer).collect()
    }

    /// Rewards a verified response, scaled by how fast it arrived relative
    /// to the peer's rolling estimate.
    pub fn report_verified(&self, id: &PeerId, elapsed: Duration) {
        let estimate = self.peers.peer(id).map(|peer| peer.response_time_estimate());
        let factor = match estimate {
            Some(estimate) => {
                let elapsed = elapsed.max(Duration::from_millis(1));
                (estimate.as_secs_f64() / elapsed.as_secs_f64()).min(1.0)
            }
            None => 1.0,
        };
        let reward = self.config.weights.verified_response * factor;
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            entry.last_success = Some(SystemTime::now());
            Self::fold_reward(entry, reward, &self.config);
            trace!(target: "net::pool", peer = %id, score = entry.score, "rewarded verified response");
        }
    }

    /// Penalizes an expired request deadline.
    pub fn report_timeout(&self, id: &PeerId) {
        self.apply_reward(id, self.config.weights.timeout);
    }

    /// Heavily penalizes a response that failed verification.
    pub fn report_invalid(&self, id: &PeerId) {
        self.apply_reward(id, self.config.weights.invalid_proof);
        warn!(target: "net::pool", peer = %id, "penalized invalid response");
    }

    /// Records a failed connection attempt from the discovery loop.
    pub(crate) fn dial_failed(&self, id: &PeerId) {
        self.metrics.dial_failures.increment(1);
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            entry.failures += 1;
            Self::fold_reward(entry, self.config.weights.dial_failure, &self.config);
        }
    }

    /// Picks candidates for the next dial round, preferring the least
    /// explored, and marks them attempted.
    pub(crate) fn dial_candidates(&self, max: usize) -> Vec<NodeRecord> {
        use rand::seq::SliceRandom;

        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut candidates: Vec<&mut PoolEntry> = entries
            .values_mut()
            .filter(|entry| {
                self.peers.peer(&entry.record.id).is_none() &&
                    entry.dialable(self.config.cooldown_threshold, self.config.redial_interval, now)
            })
            .collect();
        // random order among equally explored candidates
        candidates.shuffle(&mut rand::thread_rng());
        candidates.sort_by_key(|entry| entry.attempts);

        candidates
            .into_iter()
            .take(max)
            .map(|entry| {
                entry.attempts += 1;
                entry.last_attempt = Some(now);
                self.metrics.dials.increment(1);
                entry.record
            })
            .collect()
    }

    /// Current score of a candidate.
    pub fn score(&self, id: &PeerId) -> Option<f64> {
        self.entries.lock().get(id).map(|entry| entry.score)
    }

    /// Candidate and connection counts for diagnostics.
    pub fn status(&self) -> PoolStatus {
        PoolStatus { candidates: self.entries.lock().len(), connected: self.peers.len() }
    }

    /// Per-candidate score snapshot for diagnostics.
    pub fn scores(&self) -> Vec<(PeerId, f64)> {
        self.entries.lock().iter().map(|(id, entry)| (*id, entry.score)).collect()
    }

    /// Writes the entry table to the store.
    pub fn persist(&self) -> Result<(), StoreError> {
        let persisted: Vec<PersistedEntry> =
            self.entries.lock().values().map(PersistedEntry::from_entry).collect();
        let raw = serde_json::to_vec(&persisted)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        self.store.put(ENTRIES_KEY, &raw)?;
        trace!(target: "net::pool", candidates = persisted.len(), "persisted pool entries");
        Ok(())
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn apply_reward(&self, id: &PeerId, reward: f64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            Self::fold_reward(entry, reward, &self.config);
        }
    }

    /// Folds one interaction into the moving average and arms the cooldown
    /// when the entry sinks below the threshold.
    fn fold_reward(entry: &mut PoolEntry, reward: f64, config: &PoolConfig) {
        entry.score += config.ema_weight * (reward - entry.score);
        entry.score = entry.score.clamp(SCORE_FLOOR, 1.0);
        if entry.score <= config.cooldown_threshold {
            entry.cooldown_until = Some(Instant::now() + config.cooldown);
        }
    }

    #[cfg(test)]
    pub(crate) fn set_score(&self, id: &PeerId, score: f64) {
        self.entries.lock().get_mut(id).unwrap().score = score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_api::MemoryStore;
    use lantern_network_types::{Capabilities, RequestKind, ScoreWeights, PROTOCOL_VERSION};

    fn pool_with(config: PoolConfig) -> ServerPool {
        ServerPool::new(PeerSet::new(), Arc::new(MemoryStore::new()), config).unwrap()
    }

    fn connect(pool: &ServerPool, caps: Capabilities) -> Arc<LightPeer> {
        let peer = Arc::new(LightPeer::new(PeerId::random(), PROTOCOL_VERSION, caps));
        pool.connected(peer.clone(), "127.0.0.1:30303".parse().unwrap()).unwrap();
        peer
    }

    #[test]
    fn selects_best_then_falls_back_after_violation() {
        let pool = pool_with(PoolConfig::default());
        let p1 = connect(&pool, Capabilities::full());
        let p2 = connect(&pool, Capabilities::full());
        pool.set_score(&p1.id(), 0.8);
        pool.set_score(&p2.id(), 0.3);

        let selected = pool.select_peer(&HashSet::new(), |_| true).unwrap();
        assert_eq!(selected.id(), p1.id());

        pool.disconnected(&p1.id(), DisconnectCause::ProtocolViolation);
        let selected = pool.select_peer(&HashSet::new(), |_| true).unwrap();
        assert_eq!(selected.id(), p2.id());
        assert!(pool.score(&p1.id()).unwrap() < 0.8);
    }

    #[test]
    fn invalid_response_strictly_lowers_any_score_above_the_floor() {
        let pool = pool_with(PoolConfig::default());
        let peer = connect(&pool, Capabilities::full());

        for before in [0.9, 0.3, 0.0, -0.5, -0.99] {
            pool.set_score(&peer.id(), before);
            pool.report_invalid(&peer.id());
            let after = pool.score(&peer.id()).unwrap();
            assert!(after < before, "score must drop: {before} -> {after}");
            assert!(after >= SCORE_FLOOR);
        }

        // at the floor there is nothing left to take
        pool.set_score(&peer.id(), SCORE_FLOOR);
        pool.report_invalid(&peer.id());
        assert_eq!(pool.score(&peer.id()).unwrap(), SCORE_FLOOR);
    }

    #[test]
    fn exclusion_and_capability_filters_apply() {
        let pool = pool_with(PoolConfig::default());
        let p1 = connect(&pool, Capabilities::full());
        let p2 = connect(&pool, Capabilities::from_kinds([RequestKind::Headers]));
        pool.set_score(&p1.id(), 0.9);
        pool.set_score(&p2.id(), 0.1);

        let excluded = HashSet::from([p1.id()]);
        let selected = pool.select_peer(&excluded, |_| true).unwrap();
        assert_eq!(selected.id(), p2.id());

        // only p1 serves receipts
        let selected =
            pool.select_peer(&HashSet::new(), |p| p.serves(RequestKind::Receipts)).unwrap();
        assert_eq!(selected.id(), p1.id());

        let excluded = HashSet::from([p1.id()]);
        assert!(pool.select_peer(&excluded, |p| p.serves(RequestKind::Receipts)).is_none());
    }

    #[test]
    fn warm_connection_breaks_score_ties() {
        let pool = pool_with(PoolConfig::default());
        let p1 = connect(&pool, Capabilities::full());
        let p2 = connect(&pool, Capabilities::full());

        pool.report_verified(&p2.id(), Duration::from_millis(50));
        pool.set_score(&p1.id(), 0.5);
        pool.set_score(&p2.id(), 0.5);

        let selected = pool.select_peer(&HashSet::new(), |_| true).unwrap();
        assert_eq!(selected.id(), p2.id());
    }

    #[test]
    fn latency_scales_the_verified_reward() {
        let pool = pool_with(PoolConfig::default());
        let fast = connect(&pool, Capabilities::full());
        let slow = connect(&pool, Capabilities::full());

        // both estimates start at the same default
        pool.report_verified(&fast.id(), Duration::from_millis(100));
        pool.report_verified(&slow.id(), Duration::from_secs(4));
        assert!(pool.score(&fast.id()).unwrap() > pool.score(&slow.id()).unwrap());
        assert!(pool.score(&slow.id()).unwrap() > 0.0);
    }

    #[test]
    fn floored_peer_recovers_after_cooldown() {
        let config = PoolConfig::default().with_cooldown(Duration::from_millis(20));
        let pool = pool_with(config);
        let peer = connect(&pool, Capabilities::full());

        pool.set_score(&peer.id(), SCORE_FLOOR);
        pool.report_invalid(&peer.id());
        assert!(pool.select_peer(&HashSet::new(), |_| true).is_none());

        std::thread::sleep(Duration::from_millis(25));
        let selected = pool.select_peer(&HashSet::new(), |_| true).unwrap();
        assert_eq!(selected.id(), peer.id());
    }

    #[test]
    fn entries_survive_restart_with_decay() {
        let store = Arc::new(MemoryStore::new());
        let record = NodeRecord::new(PeerId::random(), "10.0.0.1:30303".parse().unwrap());
        {
            let pool =
                ServerPool::new(PeerSet::new(), store.clone(), PoolConfig::default()).unwrap();
            pool.discovered(record);
            pool.set_score(&record.id, 0.8);
            pool.persist().unwrap();
        }

        let pool = ServerPool::new(PeerSet::new(), store, PoolConfig::default()).unwrap();
        assert_eq!(pool.status().candidates, 1);
        let score = pool.score(&record.id).unwrap();
        assert!((score - 0.8 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn discovered_is_idempotent() {
        let pool = pool_with(PoolConfig::default());
        let record = NodeRecord::new(PeerId::random(), "10.0.0.2:30303".parse().unwrap());
        pool.discovered(record);
        pool.set_score(&record.id, 0.5);
        pool.discovered(record);
        assert_eq!(pool.score(&record.id), Some(0.5));
        assert_eq!(pool.status().candidates, 1);
    }

    #[test]
    fn graceful_disconnect_outscores_violation() {
        let weights = ScoreWeights::default();
        let pool = pool_with(PoolConfig::default().with_weights(weights));
        let p1 = connect(&pool, Capabilities::full());
        let p2 = connect(&pool, Capabilities::full());

        pool.disconnected(&p1.id(), DisconnectCause::Graceful);
        pool.disconnected(&p2.id(), DisconnectCause::ProtocolViolation);
        assert!(pool.score(&p1.id()).unwrap() > pool.score(&p2.id()).unwrap());
    }
}

use crate::ServerPool;
use futures::StreamExt;
use lantern_api::{Dialer, DiscoveryStream};
use lantern_tasks::Shutdown;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Drives candidate discovery and outbound dialing until shutdown.
///
/// Candidates from the discovery layer are registered as they arrive; a
/// rate-capped dial round runs on every tick, preferring the least explored
/// addresses. The entry table is flushed periodically and once more on
/// shutdown. Connection outcomes flow back through
/// [`ServerPool::connected`]/[`ServerPool::disconnected`] from the session
/// layer; only dials that never get that far are recorded here.
pub async fn run_discovery<D: Dialer>(
    pool: Arc<ServerPool>,
    mut candidates: DiscoveryStream,
    dialer: D,
    mut shutdown: Shutdown,
) {
    let config = *pool.config();
    let mut dial_tick = tokio::time::interval(config.dial_interval);
    dial_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut persist_tick = tokio::time::interval(config.persist_interval);
    persist_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut exhausted = false;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            candidate = candidates.next(), if !exhausted => match candidate {
                Some(record) => pool.discovered(record),
                None => {
                    debug!(target: "net::pool", "discovery stream ended");
                    exhausted = true;
                }
            },
            _ = dial_tick.tick() => {
                for record in pool.dial_candidates(config.dials_per_round) {
                    trace!(target: "net::pool", %record, "dialing candidate");
                    if let Err(err) = dialer.dial(record).await {
                        debug!(target: "net::pool", %record, %err, "dial failed");
                        pool.dial_failed(&record.id);
                    }
                }
            }
            _ = persist_tick.tick() => {
                if let Err(err) = pool.persist() {
                    warn!(target: "net::pool", %err, "failed to persist pool entries");
                }
            }
        }
    }

    if let Err(err) = pool.persist() {
        warn!(target: "net::pool", %err, "failed to persist pool entries on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoolConfig;
    use lantern_api::{KeyValueStore, MemoryStore};
    use lantern_network_types::{NodeRecord, PeerSet};
    use lantern_primitives::PeerId;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingDialer {
        dialed: Mutex<Vec<NodeRecord>>,
        reject: Option<PeerId>,
    }

    #[async_trait::async_trait]
    impl Dialer for RecordingDialer {
        async fn dial(&self, record: NodeRecord) -> Result<(), std::io::Error> {
            self.dialed.lock().push(record);
            if self.reject == Some(record.id) {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"))
            }
            Ok(())
        }
    }

    fn record(port: u16) -> NodeRecord {
        NodeRecord::new(PeerId::random(), format!("127.0.0.1:{port}").parse().unwrap())
    }

    #[tokio::test]
    async fn dials_discovered_candidates_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let config = PoolConfig::default()
            .with_dial_rate(Duration::from_millis(5), 2);
        let pool = Arc::new(ServerPool::new(PeerSet::new(), store.clone(), config).unwrap());

        let bad = record(1);
        let good = record(2);
        let dialer = Arc::new(RecordingDialer {
            dialed: Mutex::new(Vec::new()),
            reject: Some(bad.id),
        });

        let (signal, shutdown) = lantern_tasks::signal();
        let task = tokio::spawn(run_discovery(
            pool.clone(),
            futures::stream::iter([bad, good]).boxed(),
            dialer.clone(),
            shutdown,
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while dialer.dialed.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("discovery loop never dialed the candidates");

        signal.fire();
        task.await.unwrap();

        let dialed = dialer.dialed.lock();
        assert!(dialed.contains(&bad) && dialed.contains(&good));
        assert!(pool.score(&bad.id).unwrap() < 0.0, "failed dial must be penalized");
        assert_eq!(pool.score(&good.id), Some(0.0));
        // the shutdown flush wrote the table
        assert!(store.get(b"pool/entries").unwrap().is_some());
    }

    #[tokio::test]
    async fn redial_interval_caps_repeat_dials() {
        let store = Arc::new(MemoryStore::new());
        let mut config = PoolConfig::default().with_dial_rate(Duration::from_millis(2), 4);
        config.redial_interval = Duration::from_secs(60);
        let pool = Arc::new(ServerPool::new(PeerSet::new(), store, config).unwrap());

        let candidate = record(3);
        let dialer = Arc::new(RecordingDialer::default());

        let (signal, shutdown) = lantern_tasks::signal();
        let task = tokio::spawn(run_discovery(
            pool.clone(),
            futures::stream::iter([candidate]).boxed(),
            dialer.clone(),
            shutdown,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.fire();
        task.await.unwrap();

        assert_eq!(dialer.dialed.lock().len(), 1, "candidate must not be redialed early");
    }
}

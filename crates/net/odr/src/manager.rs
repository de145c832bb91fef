use crate::{
    metrics::OdrMetrics,
    request::{
        kind_of, AccountQuery, CodeQuery, HeaderQuery, IndexProofQuery, IndexTable, ReceiptsQuery,
        StorageQuery,
    },
    validate::{validate_response, Commitment},
    OdrRequest, VerifiedData,
};
use alloy_primitives::{Bytes, B256};
use lantern_api::{ChainReader, PeerTransport, RetrievalError, WithPeer};
use lantern_distributor::{Distribution, RequestDistributor};
use lantern_indexer::IndexerHandle;
use lantern_network_types::RequestKind;
use lantern_primitives::{BlockNumber, SealedHeader, KECCAK_EMPTY};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Tuning knobs of the [`RetrieveManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdrConfig {
    /// Distinct peers tried per retrieval before giving up.
    pub max_attempts: u32,
}

impl Default for OdrConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl OdrConfig {
    /// Sets the attempt bound.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// A dispatched request: wire shape plus the commitment its answer must
/// satisfy.
#[derive(Debug)]
struct Plan {
    kind: RequestKind,
    payload: Bytes,
    commitment: Commitment,
}

/// The verified retrieval front end.
///
/// `retrieve` resolves the trusted commitment for a need, drives the
/// distributor until a peer's answer verifies against it, and rewards or
/// penalizes peers by the outcome. Calls are independent; any number may
/// run concurrently over the same manager.
#[derive(Debug)]
pub struct RetrieveManager<T, C> {
    distributor: Arc<RequestDistributor<T>>,
    chain: C,
    cht: IndexerHandle,
    bloom: IndexerHandle,
    config: OdrConfig,
    metrics: OdrMetrics,
}

impl<T: PeerTransport, C: ChainReader> RetrieveManager<T, C> {
    /// Creates a manager over the given distributor, local chain, and
    /// section indexes.
    pub fn new(
        distributor: Arc<RequestDistributor<T>>,
        chain: C,
        cht: IndexerHandle,
        bloom: IndexerHandle,
        config: OdrConfig,
    ) -> Self {
        Self { distributor, chain, cht, bloom, config, metrics: OdrMetrics::default() }
    }

    /// Retrieves and verifies the requested data from the peer network.
    ///
    /// Timeouts, disconnects, and provably wrong answers are absorbed:
    /// each failing peer is penalized and excluded, and the request moves
    /// to the next eligible peer until the attempt bound is exhausted. A
    /// terminal [`RetrievalError::NotAvailable`] means no reachable peer
    /// supplied verifiable data, which is absence of an answer, not proof
    /// of absence on chain.
    pub async fn retrieve(
        &self,
        request: OdrRequest,
    ) -> Result<WithPeer<VerifiedData>, RetrievalError> {
        let plan = self.plan(&request)?;
        let mut dist = Distribution::new(plan.kind, plan.payload.clone())
            .with_attempts(self.config.max_attempts);

        loop {
            let delivered = match self.distributor.distribute(&mut dist).await {
                Ok(delivered) => delivered,
                Err(err) => {
                    debug!(
                        target: "odr",
                        request = request.describe(),
                        %err,
                        tried = dist.tried().len(),
                        "retrieval exhausted its peers"
                    );
                    self.metrics.failed.increment(1);
                    return Err(RetrievalError::NotAvailable)
                }
            };

            match validate_response(&request, &plan.commitment, &delivered.payload) {
                Ok(data) => {
                    trace!(
                        target: "odr",
                        request = request.describe(),
                        peer = %delivered.peer,
                        elapsed = ?delivered.elapsed,
                        "retrieval verified"
                    );
                    self.distributor.pool().report_verified(&delivered.peer, delivered.elapsed);
                    self.metrics.served.increment(1);
                    return Ok(WithPeer::new(delivered.peer, data))
                }
                Err(err) => {
                    warn!(
                        target: "odr",
                        request = request.describe(),
                        peer = %delivered.peer,
                        %err,
                        "response failed verification"
                    );
                    self.metrics.invalid_responses.increment(1);
                    self.distributor.pool().report_invalid(&delivered.peer);
                    if dist.exhausted() {
                        self.metrics.failed.increment(1);
                        return Err(RetrievalError::NotAvailable)
                    }
                }
            }
        }
    }

    /// Resolves the wire shape and trusted commitment for a need.
    ///
    /// Heights below an index frontier are served proofs against the
    /// section root; heights the live chain covers validate against the
    /// local header. Heights covered by neither are unavailable rather
    /// than unverifiable.
    fn plan(&self, request: &OdrRequest) -> Result<Plan, RetrievalError> {
        match request {
            OdrRequest::HeaderByHash { hash } => {
                if *hash == B256::ZERO {
                    return Err(RetrievalError::InvalidRequest("zero header hash"))
                }
                Ok(Plan {
                    kind: kind_of(request, false),
                    payload: rlp(&HeaderQuery { hash: *hash, number: 0 }),
                    commitment: Commitment::HeaderHash(*hash),
                })
            }
            OdrRequest::HeaderByNumber { number } => {
                if *number < self.cht.frontier() {
                    let section = self.cht.section_of(*number);
                    let root = self
                        .cht
                        .section_root(section)
                        .ok_or(RetrievalError::IndexUnavailable)?;
                    Ok(Plan {
                        kind: kind_of(request, true),
                        payload: rlp(&IndexProofQuery {
                            table: IndexTable::Cht,
                            section,
                            number: *number,
                        }),
                        commitment: Commitment::SectionRoot(root),
                    })
                } else if let Some(header) = self.chain.header_by_number(*number) {
                    Ok(Plan {
                        kind: kind_of(request, false),
                        payload: rlp(&HeaderQuery { hash: B256::ZERO, number: *number }),
                        commitment: Commitment::HeaderHash(header.hash()),
                    })
                } else {
                    Err(RetrievalError::IndexUnavailable)
                }
            }
            OdrRequest::Account { number, address } => {
                let header = self.trusted_header(*number)?;
                Ok(Plan {
                    kind: kind_of(request, false),
                    payload: rlp(&AccountQuery { hash: header.hash(), address: *address }),
                    commitment: Commitment::Header(header),
                })
            }
            OdrRequest::Storage { number, address, slot } => {
                let header = self.trusted_header(*number)?;
                Ok(Plan {
                    kind: kind_of(request, false),
                    payload: rlp(&StorageQuery {
                        hash: header.hash(),
                        address: *address,
                        slot: *slot,
                    }),
                    commitment: Commitment::Header(header),
                })
            }
            OdrRequest::Receipts { number } => {
                let header = self.trusted_header(*number)?;
                Ok(Plan {
                    kind: kind_of(request, false),
                    payload: rlp(&ReceiptsQuery { hash: header.hash() }),
                    commitment: Commitment::Header(header),
                })
            }
            OdrRequest::Code { code_hash } => {
                if *code_hash == KECCAK_EMPTY {
                    return Err(RetrievalError::InvalidRequest("code hash of empty code"))
                }
                Ok(Plan {
                    kind: kind_of(request, false),
                    payload: rlp(&CodeQuery { code_hash: *code_hash }),
                    commitment: Commitment::CodeHash(*code_hash),
                })
            }
            OdrRequest::Bloom { number } => {
                let section = self.bloom.section_of(*number);
                if *number < self.bloom.frontier() {
                    let root = self
                        .bloom
                        .section_root(section)
                        .ok_or(RetrievalError::IndexUnavailable)?;
                    Ok(Plan {
                        kind: kind_of(request, true),
                        payload: rlp(&IndexProofQuery {
                            table: IndexTable::Bloom,
                            section,
                            number: *number,
                        }),
                        commitment: Commitment::SectionRoot(root),
                    })
                } else if let Some(header) = self.chain.header_by_number(*number) {
                    Ok(Plan {
                        kind: kind_of(request, false),
                        payload: rlp(&IndexProofQuery {
                            table: IndexTable::Bloom,
                            section,
                            number: *number,
                        }),
                        commitment: Commitment::Header(header),
                    })
                } else {
                    Err(RetrievalError::IndexUnavailable)
                }
            }
        }
    }

    /// The local header commitments for `number` are taken from.
    fn trusted_header(&self, number: BlockNumber) -> Result<SealedHeader, RetrievalError> {
        self.chain.header_by_number(number).ok_or(RetrievalError::IndexUnavailable)
    }
}

fn rlp<T: alloy_rlp::Encodable>(value: &T) -> Bytes {
    alloy_rlp::encode(value).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        request::{
            AccountResponse, BloomProofResponse, CodeResponse, HeaderProofResponse,
            HeaderResponse, ReceiptsResponse, StorageResponse,
        },
        trie_fixtures::{account_trie, bloom_trie, cht_trie, storage_trie},
    };
    use alloy_primitives::{keccak256, Address, U256};
    use assert_matches::assert_matches;
    use lantern_api::{test_utils::MemoryChain, MemoryStore, RawResponse};
    use lantern_distributor::{
        test_utils::{test_transport, RequestRx, TestTransport},
        DistributorConfig,
    };
    use lantern_indexer::{BloomBackend, ChainIndexer, ChtBackend, IndexerConfig};
    use lantern_network_types::{Capabilities, LightPeer, PeerSet, PROTOCOL_VERSION};
    use lantern_pool::{PoolConfig, ServerPool};
    use lantern_primitives::{test_utils::header_chain, Header, PeerId, Receipt, StateAccount};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Harness {
        manager: Arc<RetrieveManager<TestTransport, Arc<MemoryChain>>>,
        distributor: Arc<RequestDistributor<TestTransport>>,
        rx: Option<RequestRx>,
        cht: Option<ChainIndexer<ChtBackend, Arc<MemoryChain>>>,
        bloom: Option<ChainIndexer<BloomBackend, Arc<MemoryChain>>>,
        chain: Arc<MemoryChain>,
    }

    fn setup(headers: Vec<lantern_primitives::SealedHeader>) -> Harness {
        let chain = Arc::new(MemoryChain::new(headers));
        let pool = Arc::new(
            ServerPool::new(PeerSet::new(), Arc::new(MemoryStore::new()), PoolConfig::default())
                .unwrap(),
        );
        let (transport, rx) = test_transport();
        let config = DistributorConfig::default()
            .with_deadlines(Duration::from_millis(100), Duration::from_millis(100))
            .with_selection_patience(Duration::from_millis(50));
        let distributor = Arc::new(RequestDistributor::new(transport, pool, config));

        let section_config =
            IndexerConfig::default().with_section_size(4).with_confirmation_depth(0);
        let cht = ChainIndexer::new(
            ChtBackend::new(),
            chain.clone(),
            Arc::new(MemoryStore::new()),
            section_config,
        )
        .unwrap();
        let bloom = ChainIndexer::new(
            BloomBackend::new(),
            chain.clone(),
            Arc::new(MemoryStore::new()),
            section_config,
        )
        .unwrap();

        let manager = Arc::new(RetrieveManager::new(
            distributor.clone(),
            chain.clone(),
            cht.handle(),
            bloom.handle(),
            OdrConfig::default(),
        ));
        Harness { manager, distributor, rx: Some(rx), cht: Some(cht), bloom: Some(bloom), chain }
    }

    impl Harness {
        fn connect(&self) -> Arc<LightPeer> {
            let peer = Arc::new(LightPeer::new(
                PeerId::random(),
                PROTOCOL_VERSION,
                Capabilities::full(),
            ));
            self.distributor
                .pool()
                .connected(peer.clone(), "127.0.0.1:30303".parse().unwrap())
                .unwrap();
            peer
        }

        /// Answers dispatched requests with the given payloads in order and
        /// returns a log of which peer each answer went to.
        fn respond_with(&mut self, payloads: Vec<Bytes>) -> Arc<Mutex<Vec<PeerId>>> {
            let mut rx = self.rx.take().unwrap();
            let distributor = self.distributor.clone();
            let log = Arc::new(Mutex::new(Vec::new()));
            let answered = log.clone();
            tokio::spawn(async move {
                for payload in payloads {
                    let Some((peer, request)) = rx.recv().await else { return };
                    answered.lock().push(peer);
                    distributor.on_response(&peer, RawResponse { id: request.id, payload });
                }
            });
            log
        }

        fn score(&self, id: &PeerId) -> f64 {
            self.distributor.pool().score(id).unwrap()
        }
    }

    #[tokio::test]
    async fn invalid_account_proof_fails_over_to_an_honest_peer() {
        let target = Address::repeat_byte(0x11);
        let account = StateAccount { nonce: 1, balance: U256::from(7_000), ..Default::default() };
        let other = (Address::repeat_byte(0x22), StateAccount { nonce: 9, ..Default::default() });
        let (state_root, proof) = account_trie(&[(target, account), other], target);

        // a proof rooted elsewhere, well-formed but not matching our header
        let forged = StateAccount { balance: U256::from(1), ..account };
        let (_, forged_proof) = account_trie(&[(target, forged)], target);

        let genesis = Header { state_root, ..Default::default() };
        let mut harness = setup(header_chain(genesis, 101));
        harness.connect();
        harness.connect();

        let answered = harness.respond_with(vec![
            rlp(&AccountResponse { account: forged, proof: forged_proof }),
            rlp(&AccountResponse { account, proof }),
        ]);

        let verified = harness
            .manager
            .retrieve(OdrRequest::Account { number: 100, address: target })
            .await
            .unwrap();
        assert_eq!(verified.value().as_account(), Some(&account));

        let answered = answered.lock();
        assert_eq!(answered.len(), 2);
        assert_ne!(answered[0], answered[1], "the lying peer must be excluded");
        assert_eq!(answered[1], verified.peer());
        assert!(harness.score(&answered[0]) < 0.0);
        assert!(harness.score(&answered[1]) > 0.0);
    }

    #[tokio::test]
    async fn corrupted_payloads_never_produce_a_verified_result() {
        let target = Address::repeat_byte(0x11);
        let (state_root, _) = account_trie(&[(target, StateAccount::default())], target);
        let genesis = Header { state_root, ..Default::default() };
        let mut harness = setup(header_chain(genesis, 11));
        let peer = harness.connect();

        harness.respond_with(vec![Bytes::from_static(b"\x01\x02\x03garbage")]);

        let result =
            harness.manager.retrieve(OdrRequest::Account { number: 10, address: target }).await;
        assert_matches!(result, Err(RetrievalError::NotAvailable));
        assert!(harness.score(&peer.id()) < 0.0);
    }

    #[tokio::test]
    async fn header_by_hash_is_checked_against_its_seal() {
        let mut harness = setup(header_chain(Header::default(), 6));
        harness.connect();
        let wanted = harness.chain.header_by_number(3).unwrap();

        harness.respond_with(vec![rlp(&HeaderResponse { header: wanted.header().clone() })]);

        let verified = harness
            .manager
            .retrieve(OdrRequest::HeaderByHash { hash: wanted.hash() })
            .await
            .unwrap();
        assert_eq!(verified.value().clone().into_header().unwrap(), wanted);
    }

    #[tokio::test]
    async fn live_header_by_number_validates_against_the_local_hash() {
        let mut harness = setup(header_chain(Header::default(), 6));
        harness.connect();
        harness.connect();
        let wanted = harness.chain.header_by_number(4).unwrap();
        let decoy = harness.chain.header_by_number(2).unwrap();

        // a canonical header at the wrong height must be rejected
        harness.respond_with(vec![
            rlp(&HeaderResponse { header: decoy.header().clone() }),
            rlp(&HeaderResponse { header: wanted.header().clone() }),
        ]);

        let verified =
            harness.manager.retrieve(OdrRequest::HeaderByNumber { number: 4 }).await.unwrap();
        assert_eq!(verified.value().clone().into_header().unwrap(), wanted);
    }

    #[tokio::test]
    async fn historical_header_is_proved_against_the_cht_section() {
        let mut harness = setup(header_chain(Header::default(), 12));
        harness.connect();

        let (signal, shutdown) = lantern_tasks::signal();
        let indexer = harness.cht.take().unwrap();
        let cht_handle = indexer.handle();
        let worker = tokio::spawn(indexer.run(shutdown));
        cht_handle.new_head(11, false);
        tokio::time::timeout(Duration::from_secs(5), async {
            while cht_handle.frontier() < 8 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // the fixture trie matches the indexer's committed root
        let section0: Vec<_> = (0..4).map(|n| harness.chain.header_by_number(n).unwrap()).collect();
        let (root, proof) = cht_trie(&section0, 2);
        assert_eq!(cht_handle.section_root(0), Some(root));

        let wanted = harness.chain.header_by_number(2).unwrap();
        harness.respond_with(vec![rlp(&HeaderProofResponse {
            header: wanted.header().clone(),
            proof,
        })]);

        let verified =
            harness.manager.retrieve(OdrRequest::HeaderByNumber { number: 2 }).await.unwrap();
        assert_eq!(verified.value().clone().into_header().unwrap(), wanted);

        signal.fire();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn storage_is_proved_through_the_account() {
        let slot = B256::repeat_byte(0x07);
        let value = U256::from(99);
        let (storage_root, storage_proof) =
            storage_trie(&[(slot, value), (B256::repeat_byte(0x08), U256::from(5))], slot);

        let target = Address::repeat_byte(0x11);
        let account = StateAccount { nonce: 2, storage_root, ..Default::default() };
        let (state_root, account_proof) = account_trie(&[(target, account)], target);

        let genesis = Header { state_root, ..Default::default() };
        let mut harness = setup(header_chain(genesis, 11));
        harness.connect();

        harness.respond_with(vec![rlp(&StorageResponse {
            account,
            account_proof,
            value,
            storage_proof,
        })]);

        let verified = harness
            .manager
            .retrieve(OdrRequest::Storage { number: 10, address: target, slot })
            .await
            .unwrap();
        assert_eq!(verified.value(), &VerifiedData::Storage(value));
    }

    #[tokio::test]
    async fn tampered_storage_value_is_rejected() {
        let slot = B256::repeat_byte(0x07);
        let value = U256::from(99);
        let (storage_root, storage_proof) = storage_trie(&[(slot, value)], slot);
        let target = Address::repeat_byte(0x11);
        let account = StateAccount { storage_root, ..Default::default() };
        let (state_root, account_proof) = account_trie(&[(target, account)], target);

        let genesis = Header { state_root, ..Default::default() };
        let mut harness = setup(header_chain(genesis, 11));
        let peer = harness.connect();

        harness.respond_with(vec![rlp(&StorageResponse {
            account,
            account_proof,
            value: U256::from(100),
            storage_proof,
        })]);

        let result = harness
            .manager
            .retrieve(OdrRequest::Storage { number: 10, address: target, slot })
            .await;
        assert_matches!(result, Err(RetrievalError::NotAvailable));
        assert!(harness.score(&peer.id()) < 0.0);
    }

    #[tokio::test]
    async fn receipts_must_match_the_trusted_root() {
        let receipts = vec![
            Receipt::new(true, 21_000, vec![]),
            Receipt::new(false, 63_000, vec![]),
        ];
        let genesis = Header {
            receipts_root: lantern_primitives::proofs::calculate_receipts_root(&receipts),
            ..Default::default()
        };
        let mut harness = setup(header_chain(genesis, 8));
        harness.connect();
        harness.connect();

        // dropping a receipt changes the root
        harness.respond_with(vec![
            rlp(&ReceiptsResponse { receipts: receipts[..1].to_vec() }),
            rlp(&ReceiptsResponse { receipts: receipts.clone() }),
        ]);

        let verified =
            harness.manager.retrieve(OdrRequest::Receipts { number: 7 }).await.unwrap();
        assert_eq!(verified.value().clone().into_receipts().unwrap(), receipts);
    }

    #[tokio::test]
    async fn code_must_hash_to_the_requested_hash() {
        let code = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]);
        let code_hash = keccak256(&code);
        let mut harness = setup(header_chain(Header::default(), 4));
        harness.connect();
        harness.connect();

        harness.respond_with(vec![
            rlp(&CodeResponse { code: Bytes::from_static(&[0xde, 0xad]) }),
            rlp(&CodeResponse { code: code.clone() }),
        ]);

        let verified =
            harness.manager.retrieve(OdrRequest::Code { code_hash }).await.unwrap();
        assert_eq!(verified.value(), &VerifiedData::Code(code));
    }

    #[tokio::test]
    async fn empty_code_hash_fails_fast() {
        let mut harness = setup(header_chain(Header::default(), 4));
        harness.connect();
        let result =
            harness.manager.retrieve(OdrRequest::Code { code_hash: KECCAK_EMPTY }).await;
        assert_matches!(result, Err(RetrievalError::InvalidRequest(_)));
        // nothing was dispatched
        assert!(harness.rx.as_mut().unwrap().try_recv().is_err());
    }

    #[tokio::test]
    async fn historical_bloom_is_proved_against_the_section_root() {
        let headers: Vec<_> = header_chain(Header::default(), 12)
            .into_iter()
            .map(|sealed| {
                let mut header = sealed.unseal();
                header
                    .logs_bloom
                    .accrue(alloy_primitives::BloomInput::Raw(&[header.number as u8 + 1]));
                header.seal_slow()
            })
            .collect();
        let mut chain_headers = Vec::new();
        let mut parent: Option<lantern_primitives::SealedHeader> = None;
        for sealed in headers {
            // re-link after editing the blooms
            let mut header = sealed.unseal();
            if let Some(parent) = &parent {
                header.parent_hash = parent.hash();
            }
            let sealed = header.seal_slow();
            parent = Some(sealed.clone());
            chain_headers.push(sealed);
        }

        let mut harness = setup(chain_headers.clone());
        harness.connect();

        let (signal, shutdown) = lantern_tasks::signal();
        let indexer = harness.bloom.take().unwrap();
        let bloom_handle = indexer.handle();
        let worker = tokio::spawn(indexer.run(shutdown));
        bloom_handle.new_head(11, false);
        tokio::time::timeout(Duration::from_secs(5), async {
            while bloom_handle.frontier() < 8 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let (root, proof) = bloom_trie(&chain_headers[..4], 1);
        assert_eq!(bloom_handle.section_root(0), Some(root));

        harness.respond_with(vec![rlp(&BloomProofResponse {
            bloom: chain_headers[1].logs_bloom,
            proof,
        })]);

        let verified = harness.manager.retrieve(OdrRequest::Bloom { number: 1 }).await.unwrap();
        assert_eq!(verified.value(), &VerifiedData::Bloom(chain_headers[1].logs_bloom));

        signal.fire();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn live_bloom_validates_against_the_local_header() {
        let mut harness = setup(header_chain(Header::default(), 6));
        harness.connect();
        let header = harness.chain.header_by_number(3).unwrap();

        harness.respond_with(vec![rlp(&BloomProofResponse {
            bloom: header.logs_bloom,
            proof: Vec::new(),
        })]);

        let verified = harness.manager.retrieve(OdrRequest::Bloom { number: 3 }).await.unwrap();
        assert_eq!(verified.value(), &VerifiedData::Bloom(header.logs_bloom));
    }

    #[tokio::test]
    async fn heights_past_the_head_are_index_unavailable() {
        let mut harness = setup(header_chain(Header::default(), 6));
        harness.connect();
        let result =
            harness.manager.retrieve(OdrRequest::HeaderByNumber { number: 1_000 }).await;
        assert_matches!(result, Err(RetrievalError::IndexUnavailable));
        assert!(harness.rx.as_mut().unwrap().try_recv().is_err());
    }

    #[tokio::test]
    async fn no_eligible_peers_is_a_terminal_not_available() {
        let harness = setup(header_chain(Header::default(), 6));
        let wanted = harness.chain.header_by_number(2).unwrap();
        let result =
            harness.manager.retrieve(OdrRequest::HeaderByHash { hash: wanted.hash() }).await;
        assert_matches!(result, Err(RetrievalError::NotAvailable));
    }
}

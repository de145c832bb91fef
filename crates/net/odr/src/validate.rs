//! Self-contained response validators.
//!
//! Every function here is deterministic and performs no I/O: a response is
//! judged only against the commitment resolved before dispatch, so
//! validation runs synchronously on receipt.

use crate::request::{
    AccountResponse, BloomProofResponse, CodeResponse, HeaderProofResponse, HeaderResponse,
    OdrRequest, ReceiptsResponse, StorageResponse, VerifiedData,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_trie::{proof::verify_proof, Nibbles};
use lantern_indexer::{bloom_value, cht_value, section_key};
use lantern_primitives::{proofs::calculate_receipts_root, SealedHeader, StateAccount};

/// Why a response was rejected.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ValidationError {
    /// The payload is not a well-formed response of the expected shape.
    #[error("malformed response payload: {0}")]
    Decode(#[from] alloy_rlp::Error),
    /// A Merkle proof did not verify against the trusted root.
    #[error("merkle proof rejected: {0}")]
    Proof(alloy_trie::proof::ProofVerificationError),
    /// The response decodes but contradicts the trusted commitment.
    #[error("response contradicts the trusted commitment")]
    Mismatch,
}

/// The trusted reference a response is validated against.
///
/// Resolved before dispatch; responses never influence which commitment is
/// used.
#[derive(Debug, Clone)]
pub(crate) enum Commitment {
    /// The response must seal to this exact header hash.
    HeaderHash(B256),
    /// The response is proved against roots of this local header.
    Header(SealedHeader),
    /// The response is proved against this section root.
    SectionRoot(B256),
    /// The response bytes must hash to this code hash.
    CodeHash(B256),
}

/// Validates a raw payload for `request` against `commitment`.
pub(crate) fn validate_response(
    request: &OdrRequest,
    commitment: &Commitment,
    payload: &[u8],
) -> Result<VerifiedData, ValidationError> {
    match (request, commitment) {
        (OdrRequest::HeaderByHash { hash }, Commitment::HeaderHash(expected)) => {
            debug_assert_eq!(hash, expected);
            let response: HeaderResponse = alloy_rlp::decode_exact(payload)?;
            let sealed = response.header.seal_slow();
            if sealed.hash() != *expected {
                return Err(ValidationError::Mismatch)
            }
            Ok(VerifiedData::Header(sealed))
        }
        (OdrRequest::HeaderByNumber { number }, Commitment::HeaderHash(expected)) => {
            let response: HeaderResponse = alloy_rlp::decode_exact(payload)?;
            let sealed = response.header.seal_slow();
            if sealed.number != *number || sealed.hash() != *expected {
                return Err(ValidationError::Mismatch)
            }
            Ok(VerifiedData::Header(sealed))
        }
        (OdrRequest::HeaderByNumber { number }, Commitment::SectionRoot(root)) => {
            let response: HeaderProofResponse = alloy_rlp::decode_exact(payload)?;
            let sealed = response.header.seal_slow();
            if sealed.number != *number {
                return Err(ValidationError::Mismatch)
            }
            verify_index_entry(*root, *number, cht_value(&sealed.hash()), &response.proof)?;
            Ok(VerifiedData::Header(sealed))
        }
        (OdrRequest::Account { address, .. }, Commitment::Header(header)) => {
            let response: AccountResponse = alloy_rlp::decode_exact(payload)?;
            verify_account(header.state_root, address, &response.account, &response.proof)?;
            Ok(VerifiedData::Account(response.account))
        }
        (OdrRequest::Storage { address, slot, .. }, Commitment::Header(header)) => {
            let response: StorageResponse = alloy_rlp::decode_exact(payload)?;
            verify_account(header.state_root, address, &response.account, &response.account_proof)?;
            verify_storage(
                response.account.storage_root,
                slot,
                response.value,
                &response.storage_proof,
            )?;
            Ok(VerifiedData::Storage(response.value))
        }
        (OdrRequest::Receipts { .. }, Commitment::Header(header)) => {
            let response: ReceiptsResponse = alloy_rlp::decode_exact(payload)?;
            if calculate_receipts_root(&response.receipts) != header.receipts_root {
                return Err(ValidationError::Mismatch)
            }
            Ok(VerifiedData::Receipts(response.receipts))
        }
        (OdrRequest::Code { code_hash }, Commitment::CodeHash(expected)) => {
            debug_assert_eq!(code_hash, expected);
            let response: CodeResponse = alloy_rlp::decode_exact(payload)?;
            if keccak256(&response.code) != *expected {
                return Err(ValidationError::Mismatch)
            }
            Ok(VerifiedData::Code(response.code))
        }
        (OdrRequest::Bloom { .. }, Commitment::Header(header)) => {
            let response: BloomProofResponse = alloy_rlp::decode_exact(payload)?;
            if response.bloom != header.logs_bloom {
                return Err(ValidationError::Mismatch)
            }
            Ok(VerifiedData::Bloom(response.bloom))
        }
        (OdrRequest::Bloom { number }, Commitment::SectionRoot(root)) => {
            let response: BloomProofResponse = alloy_rlp::decode_exact(payload)?;
            verify_index_entry(*root, *number, bloom_value(&response.bloom), &response.proof)?;
            Ok(VerifiedData::Bloom(response.bloom))
        }
        // the manager resolves commitments per request kind, so the pairs
        // above are exhaustive for well-formed plans
        _ => Err(ValidationError::Mismatch),
    }
}

/// Proves an account under the trusted state root.
fn verify_account(
    state_root: B256,
    address: &Address,
    account: &StateAccount,
    proof: &[Bytes],
) -> Result<(), ValidationError> {
    let key = Nibbles::unpack(keccak256(address));
    let expected = alloy_rlp::encode(account);
    verify_proof(state_root, key, Some(expected), proof).map_err(ValidationError::Proof)
}

/// Proves a slot value under an already-proven storage root.
fn verify_storage(
    storage_root: B256,
    slot: &B256,
    value: U256,
    proof: &[Bytes],
) -> Result<(), ValidationError> {
    let key = Nibbles::unpack(keccak256(slot));
    let expected = (!value.is_zero()).then(|| alloy_rlp::encode_fixed_size(&value).to_vec());
    verify_proof(storage_root, key, expected, proof).map_err(ValidationError::Proof)
}

/// Proves a per-block entry under a section root.
fn verify_index_entry(
    section_root: B256,
    number: u64,
    value: Vec<u8>,
    proof: &[Bytes],
) -> Result<(), ValidationError> {
    let key = Nibbles::unpack(section_key(number));
    verify_proof(section_root, key, Some(value), proof).map_err(ValidationError::Proof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie_fixtures::{account_trie, storage_trie};
    use alloy_primitives::U256;
    use assert_matches::assert_matches;

    #[test]
    fn account_proof_accepts_the_committed_account_only() {
        let target = Address::repeat_byte(0x11);
        let account = StateAccount { nonce: 3, balance: U256::from(1_000), ..Default::default() };
        let other = (Address::repeat_byte(0x22), StateAccount::default());
        let (root, proof) = account_trie(&[(target, account), other], target);

        assert_matches!(verify_account(root, &target, &account, &proof), Ok(()));

        let tampered = StateAccount { balance: U256::from(2_000), ..account };
        assert_matches!(
            verify_account(root, &target, &tampered, &proof),
            Err(ValidationError::Proof(_))
        );
    }

    #[test]
    fn storage_proof_chains_through_the_account() {
        let slot = B256::repeat_byte(0x07);
        let value = U256::from(99);
        let (storage_root, proof) = storage_trie(&[(slot, value), (B256::repeat_byte(0x08), U256::from(5))], slot);

        assert_matches!(verify_storage(storage_root, &slot, value, &proof), Ok(()));
        assert_matches!(
            verify_storage(storage_root, &slot, U256::from(100), &proof),
            Err(ValidationError::Proof(_))
        );
    }

    #[test]
    fn wrong_root_rejects_a_valid_proof() {
        let target = Address::repeat_byte(0x33);
        let account = StateAccount::default();
        let (_, proof) = account_trie(&[(target, account)], target);
        assert_matches!(
            verify_account(B256::repeat_byte(0xff), &target, &account, &proof),
            Err(ValidationError::Proof(_))
        );
    }
}

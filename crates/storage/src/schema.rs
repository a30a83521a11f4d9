//! Typed readers and writers for the coordinator's persisted keys.
//!
//! Keys: `Termini[hash]`, `Td[hash, number]`, `PendingEtxs[hash]`,
//! `PendingBlockBody[stateRoot]`, `PhCache`, `CurrentPendingHeaderHash`.
//! All values are RLP-encoded.

use alloy_primitives::{B256, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use trellis_types::{Body, PendingHeader, PerTierEtxs};

use crate::{KeyValueStore, StorageError, WriteBatch};

const TERMINI_PREFIX: &[u8] = b"tm";
const TD_PREFIX: &[u8] = b"td";
const PENDING_ETXS_PREFIX: &[u8] = b"pe";
const PENDING_BODY_PREFIX: &[u8] = b"pb";
const PH_CACHE_KEY: &[u8] = b"PhCache";
const CURRENT_PENDING_HEADER_KEY: &[u8] = b"CurrentPendingHeaderHash";

fn termini_key(hash: B256) -> Vec<u8> {
    [TERMINI_PREFIX, hash.as_slice()].concat()
}

fn td_key(hash: B256, number: u64) -> Vec<u8> {
    [TD_PREFIX, &number.to_be_bytes()[..], hash.as_slice()].concat()
}

fn pending_etxs_key(hash: B256) -> Vec<u8> {
    [PENDING_ETXS_PREFIX, hash.as_slice()].concat()
}

fn pending_body_key(root: B256) -> Vec<u8> {
    [PENDING_BODY_PREFIX, root.as_slice()].concat()
}

fn decode<T: Decodable>(raw: Vec<u8>) -> Result<T, StorageError> {
    Ok(T::decode(&mut raw.as_slice())?)
}

/// Queues the termini tuple for `hash` into `batch`.
pub fn write_termini(batch: &mut WriteBatch, hash: B256, termini: &[B256]) {
    batch.put(termini_key(hash), alloy_rlp::encode(termini.to_vec()));
}

/// Reads the raw termini tuple stored for `hash`.
///
/// The tuple is returned unshaped; callers validate the length.
pub fn read_termini(
    db: &dyn KeyValueStore,
    hash: B256,
) -> Result<Option<Vec<B256>>, StorageError> {
    db.get(&termini_key(hash))?.map(decode).transpose()
}

/// Queues the total difficulty of `(hash, number)` into `batch`.
pub fn write_td(batch: &mut WriteBatch, hash: B256, number: u64, td: U256) {
    batch.put(td_key(hash, number), alloy_rlp::encode(td));
}

/// Reads the total difficulty stored for `(hash, number)`.
pub fn read_td(
    db: &dyn KeyValueStore,
    hash: B256,
    number: u64,
) -> Result<Option<U256>, StorageError> {
    db.get(&td_key(hash, number))?.map(decode).transpose()
}

/// Writes the per-tier pending ETX lists for `hash`.
pub fn write_pending_etxs(
    db: &dyn KeyValueStore,
    hash: B256,
    etxs: &PerTierEtxs,
) -> Result<(), StorageError> {
    let mut raw = Vec::new();
    alloy_rlp::encode_list::<_, Vec<trellis_types::Transaction>>(etxs.as_slice(), &mut raw);
    db.put(&pending_etxs_key(hash), &raw)
}

/// Reads the per-tier pending ETX lists for `hash`.
pub fn read_pending_etxs(
    db: &dyn KeyValueStore,
    hash: B256,
) -> Result<Option<PerTierEtxs>, StorageError> {
    db.get(&pending_etxs_key(hash))?
        .map(|raw| {
            let list: Vec<Vec<trellis_types::Transaction>> = decode(raw)?;
            let len = list.len();
            list.try_into().map_err(|_| {
                StorageError::Decode(alloy_rlp::Error::ListLengthMismatch {
                    expected: trellis_types::HIERARCHY_DEPTH,
                    got: len,
                })
            })
        })
        .transpose()
}

/// Writes the pending block body keyed by its state root.
pub fn write_pending_body(
    db: &dyn KeyValueStore,
    root: B256,
    body: &Body,
) -> Result<(), StorageError> {
    db.put(&pending_body_key(root), &alloy_rlp::encode(body))
}

/// Reads the pending block body stored under `root`.
pub fn read_pending_body(
    db: &dyn KeyValueStore,
    root: B256,
) -> Result<Option<Body>, StorageError> {
    db.get(&pending_body_key(root))?.map(decode).transpose()
}

/// One persisted pending-header cache entry.
#[derive(Debug, RlpEncodable, RlpDecodable)]
struct PhCacheEntry {
    key: B256,
    entry: PendingHeader,
}

/// Writes the full pending-header cache.
pub fn write_ph_cache(
    db: &dyn KeyValueStore,
    entries: Vec<(B256, PendingHeader)>,
) -> Result<(), StorageError> {
    let entries: Vec<PhCacheEntry> =
        entries.into_iter().map(|(key, entry)| PhCacheEntry { key, entry }).collect();
    db.put(PH_CACHE_KEY, &alloy_rlp::encode(entries))
}

/// Reads the persisted pending-header cache, empty when never written.
pub fn read_ph_cache(
    db: &dyn KeyValueStore,
) -> Result<Vec<(B256, PendingHeader)>, StorageError> {
    let Some(raw) = db.get(PH_CACHE_KEY)? else {
        return Ok(Vec::new());
    };
    let entries: Vec<PhCacheEntry> = decode(raw)?;
    Ok(entries.into_iter().map(|e| (e.key, e.entry)).collect())
}

/// Writes the hash of the currently mined-against pending header.
pub fn write_current_pending_header_hash(
    db: &dyn KeyValueStore,
    hash: B256,
) -> Result<(), StorageError> {
    db.put(CURRENT_PENDING_HEADER_KEY, &alloy_rlp::encode(hash))
}

/// Reads the hash of the currently mined-against pending header.
pub fn read_current_pending_header_hash(
    db: &dyn KeyValueStore,
) -> Result<Option<B256>, StorageError> {
    db.get(CURRENT_PENDING_HEADER_KEY)?.map(decode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use trellis_types::{Header, Termini, Tier, Transaction};

    #[test]
    fn termini_survive_a_round_trip_unshaped() {
        let db = MemoryStore::new();
        let hash = B256::repeat_byte(1);
        let termini = Termini::genesis(B256::repeat_byte(2));

        let mut batch = WriteBatch::new();
        write_termini(&mut batch, hash, termini.as_slice());
        batch.write(&db).unwrap();

        let raw = read_termini(&db, hash).unwrap().unwrap();
        assert_eq!(Termini::try_from(raw).unwrap(), termini);
        assert!(read_termini(&db, B256::repeat_byte(9)).unwrap().is_none());
    }

    #[test]
    fn td_is_keyed_by_hash_and_number() {
        let db = MemoryStore::new();
        let hash = B256::repeat_byte(3);

        let mut batch = WriteBatch::new();
        write_td(&mut batch, hash, 7, U256::from(1000u64));
        batch.write(&db).unwrap();

        assert_eq!(read_td(&db, hash, 7).unwrap(), Some(U256::from(1000u64)));
        assert_eq!(read_td(&db, hash, 8).unwrap(), None);
    }

    #[test]
    fn ph_cache_round_trips_with_head_hash() {
        let db = MemoryStore::new();
        let mut header = Header::default();
        header.set_number(Tier::Prime, 5);
        let termini = Termini::genesis(B256::repeat_byte(4));
        let entry = PendingHeader::new(header, termini);
        let key = termini.terminus();

        write_ph_cache(&db, vec![(key, entry.clone())]).unwrap();
        write_current_pending_header_hash(&db, key).unwrap();

        assert_eq!(read_ph_cache(&db).unwrap(), vec![(key, entry)]);
        assert_eq!(read_current_pending_header_hash(&db).unwrap(), Some(key));
    }

    #[test]
    fn pending_etxs_round_trip() {
        let db = MemoryStore::new();
        let hash = B256::repeat_byte(5);
        let etxs = [vec![Transaction::new(vec![1u8])], Vec::new(), Vec::new()];
        write_pending_etxs(&db, hash, &etxs).unwrap();
        assert_eq!(read_pending_etxs(&db, hash).unwrap(), Some(etxs));
    }
}

use bincode::{
    config::standard,
    error::{DecodeError, EncodeError},
};
use parity_db::{ColId, Db, Options};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, PoisonError},
    time::SystemTime,
};
use thiserror::Error;
use tracing::debug;

use crate::geo::Coordinates;

const COL: ColId = 0;

/// Errors from the geocode cache backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One geocoded address. Written once, never refreshed.
#[derive(Debug, Clone, Copy, PartialEq, bincode::Encode, bincode::Decode)]
pub struct GeocodeEntry {
    pub coordinates: Coordinates,
    /// When the external geocoder was asked for this address.
    pub requested_at: SystemTime,
}

/// Result of [`GeocodeCache::store`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreOutcome {
    Inserted,
    /// The address was already cached; the existing value was kept.
    AlreadyPresent(Coordinates),
}

/// Address → coordinates cache shared by every geocoding call.
///
/// Keys are matched byte-for-byte, no trimming or case folding. `store` is an
/// atomic insert-if-absent: the first value written for an address wins.
pub trait GeocodeCache: Send + Sync {
    fn lookup(&self, address: &str) -> StoreResult<Option<Coordinates>>;

    fn store(&self, address: &str, coordinates: Coordinates) -> StoreResult<StoreOutcome>;
}

/// ParityDB-backed geocode cache keyed by the raw address bytes.
pub struct GeocodeStore {
    db: Db,
    // parity-db has no compare-and-set; serialise read-then-write on inserts.
    write_lock: Mutex<()>,
}

impl GeocodeStore {
    /// Open (or create) a ParityDB at `path`, with a single column and B-tree index.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 1);
        // enable B-tree index on column 0 so entries can be listed in address order
        opts.columns[COL as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(GeocodeStore {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn get_entry(&self, address: &str) -> StoreResult<Option<GeocodeEntry>> {
        match self.db.get(COL, address.as_bytes())? {
            Some(raw) => {
                let (entry, _): (GeocodeEntry, usize) = bincode::decode_from_slice(&raw, standard())?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Every cached entry, in address byte order.
    pub fn entries(&self) -> StoreResult<Vec<(String, GeocodeEntry)>> {
        let mut iter = self.db.iter(COL)?;
        iter.seek_to_first()?;

        let mut out = Vec::new();
        while let Some((key, raw)) = iter.next()? {
            let address = String::from_utf8(key)?;
            let (entry, _): (GeocodeEntry, usize) = bincode::decode_from_slice(&raw, standard())?;
            out.push((address, entry));
        }
        Ok(out)
    }
}

impl GeocodeCache for GeocodeStore {
    fn lookup(&self, address: &str) -> StoreResult<Option<Coordinates>> {
        Ok(self.get_entry(address)?.map(|e| e.coordinates))
    }

    fn store(&self, address: &str, coordinates: Coordinates) -> StoreResult<StoreOutcome> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.get_entry(address)? {
            return Ok(StoreOutcome::AlreadyPresent(existing.coordinates));
        }
        let entry = GeocodeEntry {
            coordinates,
            requested_at: SystemTime::now(),
        };
        let value = bincode::encode_to_vec(entry, standard())?;
        self.db
            .commit(vec![(COL, address.as_bytes().to_vec(), Some(value))])?;
        debug!(%address, %coordinates, "geocode entry persisted");
        Ok(StoreOutcome::Inserted)
    }
}

/// In-process cache with the same first-write-wins contract as [`GeocodeStore`].
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, GeocodeEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GeocodeCache for MemoryCache {
    fn lookup(&self, address: &str) -> StoreResult<Option<Coordinates>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(address).map(|e| e.coordinates))
    }

    fn store(&self, address: &str, coordinates: Coordinates) -> StoreResult<StoreOutcome> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(address) {
            return Ok(StoreOutcome::AlreadyPresent(existing.coordinates));
        }
        entries.insert(
            address.to_owned(),
            GeocodeEntry {
                coordinates,
                requested_at: SystemTime::now(),
            },
        );
        Ok(StoreOutcome::Inserted)
    }
}

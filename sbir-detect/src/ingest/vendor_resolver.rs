//! Vendor resolution and per-vendor dedup sets
//!
//! Both caches live for one ingestion pass. A vendor created in this pass is
//! cached immediately so a second row for the same company reuses it.

use crate::db::vendors;
use sbir_common::Result;
use sqlx::SqliteConnection;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Name → vendor id resolution: cache, then storage, then create
#[derive(Debug, Default)]
pub struct VendorResolver {
    cache: HashMap<String, i64>,
    created: usize,
}

impl VendorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (or create) the vendor for an exact, already-trimmed name
    pub async fn resolve(&mut self, conn: &mut SqliteConnection, name: &str) -> Result<i64> {
        if let Some(id) = self.cache.get(name) {
            return Ok(*id);
        }

        let id = match vendors::find_vendor_id(conn, name).await? {
            Some(id) => id,
            None => {
                let id = vendors::insert_vendor(conn, name).await?;
                self.created += 1;
                tracing::debug!(vendor_id = id, vendor = name, "Created vendor");
                id
            }
        };

        self.cache.insert(name.to_string(), id);
        Ok(id)
    }

    /// Vendors created during this pass
    pub fn created(&self) -> usize {
        self.created
    }
}

/// Per-vendor key sets, loaded lazily from storage
#[derive(Debug)]
pub struct DedupIndex<K> {
    by_vendor: HashMap<i64, HashSet<K>>,
}

impl<K: Eq + Hash> Default for DedupIndex<K> {
    fn default() -> Self {
        Self {
            by_vendor: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> DedupIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the vendor's stored keys have been loaded
    pub fn is_loaded(&self, vendor_id: i64) -> bool {
        self.by_vendor.contains_key(&vendor_id)
    }

    /// Seed the vendor's set with keys already in storage
    pub fn load(&mut self, vendor_id: i64, keys: HashSet<K>) {
        self.by_vendor.insert(vendor_id, keys);
    }

    /// Record a key; false when it was already present (duplicate)
    pub fn insert(&mut self, vendor_id: i64, key: K) -> bool {
        self.by_vendor.entry(vendor_id).or_default().insert(key)
    }
}

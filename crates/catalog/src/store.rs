use std::collections::BTreeMap;
use std::path::Path;

use foundation::bounds::GeoBounds;
use scene::cluster::{ClusterCell, Granularity};
use scene::filters::FilterCriteria;
use scene::point::PointRecord;

use crate::CatalogError;
use crate::aggregate::{aggregate, query_points};
use crate::filter::ListingFilter;
use crate::record::ListingRecord;

pub trait ListingStore {
    fn list(&self) -> Result<Vec<ListingRecord>, CatalogError>;
    fn get(&self, id: &str) -> Result<Option<ListingRecord>, CatalogError>;
    fn upsert(&mut self, record: ListingRecord) -> Result<(), CatalogError>;
    fn delete(&mut self, id: &str) -> Result<bool, CatalogError>;
}

/// Parses a JSON array of listings, rejecting bad coordinates and
/// duplicate ids.
pub fn parse_listings(json: &str) -> Result<Vec<ListingRecord>, CatalogError> {
    let records: Vec<ListingRecord> =
        serde_json::from_str(json).map_err(|e| CatalogError::Corrupt(e.to_string()))?;
    let mut seen = std::collections::BTreeSet::new();
    for record in &records {
        validate(record)?;
        if !seen.insert(record.id.as_str()) {
            return Err(CatalogError::Corrupt(format!(
                "duplicate listing id {:?}",
                record.id
            )));
        }
    }
    Ok(records)
}

pub fn load_listings(path: &Path) -> Result<Vec<ListingRecord>, CatalogError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
    parse_listings(&raw)
}

fn validate(record: &ListingRecord) -> Result<(), CatalogError> {
    if record.id.is_empty() {
        return Err(CatalogError::Corrupt("listing with empty id".into()));
    }
    if !record.location.is_finite() || !record.location.in_range() {
        return Err(CatalogError::Corrupt(format!(
            "listing {:?} has invalid location lat={} lng={}",
            record.id, record.location.lat, record.location.lng
        )));
    }
    Ok(())
}

/// Content fingerprint of `listings`, as a blake3 hex digest.
pub fn revision_of(listings: &BTreeMap<String, ListingRecord>) -> String {
    let mut hasher = blake3::Hasher::new();
    for record in listings.values() {
        // Serializing a record cannot fail: all keys are strings.
        if let Ok(bytes) = serde_json::to_vec(record) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Listings held in memory, keyed (and iterated) by id.
#[derive(Debug)]
pub struct InMemoryListingStore {
    listings: BTreeMap<String, ListingRecord>,
    revision: String,
}

impl Default for InMemoryListingStore {
    fn default() -> Self {
        let listings = BTreeMap::new();
        let revision = revision_of(&listings);
        Self { listings, revision }
    }
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ListingRecord>) -> Result<Self, CatalogError> {
        let mut store = Self::new();
        for record in records {
            validate(&record)?;
            store.listings.insert(record.id.clone(), record);
        }
        store.revision = revision_of(&store.listings);
        Ok(store)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::from_records(parse_listings(json)?)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ListingRecord> + '_ {
        self.listings.values()
    }

    /// Fingerprint of the current contents; changes on every mutation that
    /// changes the data.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Cluster cells over all listings matching `filters`.
    pub fn aggregate(&self, filters: &FilterCriteria, granularity: Granularity) -> Vec<ClusterCell> {
        aggregate(self.listings.values(), &ListingFilter::new(filters), granularity)
    }

    /// Listings matching `filters` inside `bounds`.
    pub fn query_points(&self, filters: &FilterCriteria, bounds: &GeoBounds) -> Vec<PointRecord> {
        query_points(self.listings.values(), &ListingFilter::new(filters), bounds)
    }
}

impl ListingStore for InMemoryListingStore {
    fn list(&self) -> Result<Vec<ListingRecord>, CatalogError> {
        Ok(self.listings.values().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<ListingRecord>, CatalogError> {
        Ok(self.listings.get(id).cloned())
    }

    fn upsert(&mut self, record: ListingRecord) -> Result<(), CatalogError> {
        validate(&record)?;
        self.listings.insert(record.id.clone(), record);
        self.revision = revision_of(&self.listings);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<bool, CatalogError> {
        let existed = self.listings.remove(id).is_some();
        if existed {
            self.revision = revision_of(&self.listings);
        }
        Ok(existed)
    }
}

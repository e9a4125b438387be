pub mod aggregate;
pub mod filter;
pub mod record;
pub mod store;

pub use aggregate::{UNASSIGNED_LABEL, aggregate, query_points};
pub use filter::ListingFilter;
pub use record::{ListingRecord, RegionPath};
pub use store::{InMemoryListingStore, ListingStore, load_listings, parse_listings, revision_of};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    NotFound,
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotFound => write!(f, "listing not found"),
            CatalogError::Corrupt(msg) => write!(f, "listing data corrupt: {msg}"),
            CatalogError::Io(msg) => write!(f, "listing data error: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

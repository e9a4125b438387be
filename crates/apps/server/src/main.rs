use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use catalog::{load_listings, InMemoryListingStore};
use scene::lod::LodPolicy;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;

use api::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr: SocketAddr = env::var("LISTINGS_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:9200".to_string())
        .parse()
        .map_err(|e| format!("invalid LISTINGS_ADDR: {e}"))?;

    let defaults = LodPolicy::default();
    let lod = LodPolicy {
        marker_max_level: env_var_i32("LOD_MARKER_MAX_LEVEL", defaults.marker_max_level),
        neighborhood_max_level: env_var_i32(
            "LOD_NEIGHBORHOOD_MAX_LEVEL",
            defaults.neighborhood_max_level,
        ),
        district_max_level: env_var_i32("LOD_DISTRICT_MAX_LEVEL", defaults.district_max_level),
        ..defaults
    }
    .validate()?;

    let catalog = match env::var("LISTINGS_DATA").map(PathBuf::from) {
        Ok(path) => {
            let records = load_listings(&path)?;
            info!("loaded {} listings from {}", records.len(), path.display());
            InMemoryListingStore::from_records(records)?
        }
        Err(_) => {
            warn!("LISTINGS_DATA not set; serving an empty catalog");
            InMemoryListingStore::new()
        }
    };
    info!(revision = catalog.revision(), ?lod, "catalog ready");

    let app = router(AppState::new(catalog, lod));

    info!("listing server listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

fn env_var_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use catalog::{CatalogError, InMemoryListingStore, ListingRecord, ListingStore};
use parking_lot::RwLock;
use scene::lod::{LodPolicy, QueryMode};
use serde_json::{json, Value};
use streaming::protocol::{MapQuery, MAP_QUERY_PATH};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Response header carrying the catalog fingerprint the answer was computed
/// from.
pub const REVISION_HEADER: &str = "x-catalog-revision";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<RwLock<InMemoryListingStore>>,
    pub lod: LodPolicy,
}

impl AppState {
    pub fn new(catalog: InMemoryListingStore, lod: LodPolicy) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(catalog)),
            lod,
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn catalog_error(err: CatalogError) -> ApiError {
    match err {
        CatalogError::NotFound => api_error(StatusCode::NOT_FOUND, "Listing not found"),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn revision_value(catalog: &InMemoryListingStore) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(catalog.revision()).map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Bad catalog revision: {e}"),
        )
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .expose_headers([HeaderName::from_static(REVISION_HEADER)]);

    Router::new()
        .route("/healthz", get(healthz))
        .route(MAP_QUERY_PATH, get(map_query))
        .route("/api/listings/:id", get(get_listing))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

/// Cluster or marker query, depending on `mode`.
///
/// A cluster request whose zoom lies in the marker band is answered at the
/// finest cluster granularity.
async fn map_query(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let query = MapQuery::from_query_pairs(params).map_err(|e| {
        warn!("rejected map query: {e}");
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let catalog = state.catalog.read();
    let revision = [(REVISION_HEADER, revision_value(&catalog)?)];

    match (query.mode, query.zoom_level, query.bounds) {
        (QueryMode::Clustered, Some(zoom), _) => {
            let granularity = state.lod.cluster_granularity(zoom);
            let cells = catalog.aggregate(&query.filters, granularity);
            debug!(
                zoom,
                granularity = granularity.as_str(),
                cells = cells.len(),
                "cluster query"
            );
            Ok((revision, Json(cells)).into_response())
        }
        (QueryMode::Pointwise, _, Some(bounds)) => {
            let points = catalog.query_points(&query.filters, &bounds);
            debug!(points = points.len(), "marker query");
            Ok((revision, Json(points)).into_response())
        }
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Query is missing its mode parameters",
        )),
    }
}

async fn get_listing(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ListingRecord>, ApiError> {
    let catalog = state.catalog.read();
    catalog
        .get(&id)
        .and_then(|found| found.ok_or(CatalogError::NotFound))
        .map(Json)
        .map_err(catalog_error)
}

//! HTTP API Server for TourGuide
//!
//! Thin JSON layer over [`TourGuideService`]. User-scoped endpoints take the
//! user name as the `userName` query parameter.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::geo::{Attraction, AttractionDistance, Coordinate};
use crate::rewards::coordinator::BatchSummary;
use crate::rewards::engine::ScanSummary;
use crate::tour_guide::{NearbyAttraction, TourGuideService};
use crate::users::user::UserProfile;
use crate::users::{NewUser, UserReward, VisitedLocation};

/// Headroom kept between the HTTP batch deadline and the request timeout
const BATCH_RESPONSE_MARGIN: Duration = Duration::from_secs(1);

/// Shared application state
pub struct AppState {
    pub tour_guide: TourGuideService,
    /// Per-request deadline applied by the timeout layer
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(tour_guide: TourGuideService, config: &ApiConfig) -> Self {
        Self {
            tour_guide,
            request_timeout: config.request_timeout,
        }
    }

    /// Deadline for a batch run on behalf of an HTTP request.
    ///
    /// Calls still in flight at the deadline run up to the oracle timeout, so
    /// both that and a margin are taken off the request timeout.
    pub fn http_batch_deadline(&self) -> Duration {
        let oracle_timeout = self.tour_guide.engine().oracle().call_timeout();
        self.tour_guide.settings().batch_timeout.min(
            self.request_timeout
                .saturating_sub(oracle_timeout)
                .saturating_sub(BATCH_RESPONSE_MARGIN),
        )
    }
}

/// `?userName=` on user-scoped endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_name: String,
}

/// Body of `PUT /proximityBuffer`
#[derive(Debug, Deserialize)]
pub struct ProximityBufferRequest {
    pub miles: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityBufferResponse {
    pub proximity_buffer_miles: f64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub users: usize,
    pub attractions: usize,
}

/// Build the router with CORS, tracing and timeout layers
pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        // User location
        .route("/getLocation", get(get_location))
        .route("/getAllCurrentLocations", get(get_all_current_locations))
        // Attractions
        .route("/getNearbyAttractions", get(get_nearby_attractions))
        .route("/getAttractionsInRange", get(get_attractions_in_range))
        .route("/getAllAttractions", get(get_all_attractions))
        // Rewards
        .route("/getRewards", get(get_rewards))
        .route("/calculateRewards", post(calculate_rewards))
        .route("/calculateAllRewards", post(calculate_all_rewards))
        .route(
            "/proximityBuffer",
            put(set_proximity_buffer)
                .delete(reset_proximity_buffer)
                .get(get_proximity_buffer),
        )
        // Users
        .route("/addUser", post(add_user))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.request_timeout)),
        );

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.with_state(state)
}

/// Start the API server, serving until `shutdown` resolves
pub async fn start_server(
    state: Arc<AppState>,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting TourGuide API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn index() -> &'static str {
    "Greetings from TourGuide!"
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        users: state.tour_guide.users().len(),
        attractions: state.tour_guide.engine().attractions().len(),
    })
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<VisitedLocation>> {
    let visit = state.tour_guide.get_user_location(&query.user_name).await?;
    Ok(Json(visit))
}

async fn get_all_current_locations(
    State(state): State<Arc<AppState>>,
) -> Json<HashMap<Uuid, Coordinate>> {
    Json(state.tour_guide.all_current_locations())
}

/// The closest attractions to the user, nearest first
async fn get_nearby_attractions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<NearbyAttraction>>> {
    let nearby = state
        .tour_guide
        .get_nearby_attractions(&query.user_name)
        .await?;
    Ok(Json(nearby))
}

async fn get_attractions_in_range(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<AttractionDistance>>> {
    let in_range = state
        .tour_guide
        .attractions_in_range(&query.user_name)
        .await?;
    Ok(Json(in_range))
}

async fn get_all_attractions(State(state): State<Arc<AppState>>) -> Json<Vec<Attraction>> {
    Json(state.tour_guide.all_attractions())
}

async fn get_rewards(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<UserReward>>> {
    Ok(Json(state.tour_guide.get_user_rewards(&query.user_name)?))
}

/// Run a reward pass for one user now
async fn calculate_rewards(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ScanSummary>> {
    let scan = state.tour_guide.calculate_rewards(&query.user_name).await?;
    Ok(Json(ScanSummary::from(&scan)))
}

/// Run a reward pass for every user; per-user failures are in the summary.
///
/// The batch runs on its own task so that a dropped request cannot abort
/// oracle calls already issued.
async fn calculate_all_rewards(State(state): State<Arc<AppState>>) -> Result<Json<BatchSummary>> {
    let deadline = state.http_batch_deadline();
    let batch = tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            state
                .tour_guide
                .calculate_all_rewards_within(deadline, &CancellationToken::new())
                .await
        }
    });

    let report = batch.await.map_err(Error::internal)?;
    Ok(Json(report.summary()))
}

async fn get_proximity_buffer(State(state): State<Arc<AppState>>) -> Json<ProximityBufferResponse> {
    Json(ProximityBufferResponse {
        proximity_buffer_miles: state.tour_guide.proximity_buffer(),
    })
}

async fn set_proximity_buffer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProximityBufferRequest>,
) -> Result<Json<ProximityBufferResponse>> {
    state.tour_guide.set_proximity_buffer(request.miles)?;
    Ok(Json(ProximityBufferResponse {
        proximity_buffer_miles: state.tour_guide.proximity_buffer(),
    }))
}

async fn reset_proximity_buffer(
    State(state): State<Arc<AppState>>,
) -> Json<ProximityBufferResponse> {
    state.tour_guide.set_default_proximity_buffer();
    Json(ProximityBufferResponse {
        proximity_buffer_miles: state.tour_guide.proximity_buffer(),
    })
}

async fn add_user(
    State(state): State<Arc<AppState>>,
    Json(new_user): Json<NewUser>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let user = state.tour_guide.add_user(new_user)?;
    Ok((StatusCode::CREATED, Json(user.profile())))
}

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use futures_util::stream::{self, Stream};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use hashreg_core::{RegistryEvent, RegistryStats};
use hashreg_journal::{EventStream, JournaledRegistry};
use hashreg_types::ActorId;

use crate::api::{
    parse_actor, parse_fingerprint, parse_fingerprints, BatchRequest, EventsQuery, HealthResponse,
    RecordResponse, StoreRequest, StreamQuery, TransferRequest, VerifyResponse,
};
use crate::auth::{CallerResolver, Credentials};
use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JournaledRegistry>,
    pub resolver: Arc<dyn CallerResolver>,
}

/// The identity a request acts as, resolved from its credentials.
pub struct Caller(pub ActorId);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ServerResult<Self> {
        let credentials = Credentials::from_headers(&parts.headers);
        state.resolver.resolve(&credentials).await.map(Caller)
    }
}

/// Run a registry call off the async workers. Writers hold the registry lock
/// across a journal fsync, so reads wait there too.
async fn blocking<T, F>(registry: &Arc<JournaledRegistry>, call: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&JournaledRegistry) -> hashreg_journal::Result<T> + Send + 'static,
{
    let registry = Arc::clone(registry);
    tokio::task::spawn_blocking(move || call(&registry))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(ServerError::from)
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

pub async fn info_handler(State(state): State<AppState>) -> ServerResult<Json<serde_json::Value>> {
    let stats = blocking(&state.registry, |r| r.stats()).await?;
    Ok(Json(json!({
        "name": "hashreg-server",
        "version": env!("CARGO_PKG_VERSION"),
        "administrator": stats.administrator,
        "persistent": state.registry.journal_path().is_some(),
    })))
}

pub async fn store_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<StoreRequest>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<RecordResponse>)> {
    let Json(req) = payload?;
    let fingerprint = parse_fingerprint(&req.fingerprint)?;
    let record = blocking(&state.registry, move |r| r.store_hash(fingerprint, caller)).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordResponse {
            fingerprint,
            record,
        }),
    ))
}

pub async fn batch_store_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<Vec<RecordResponse>>)> {
    let Json(req) = payload?;
    let fingerprints = parse_fingerprints(&req.fingerprints)?;
    let batch = fingerprints.clone();
    let records = blocking(&state.registry, move |r| {
        r.batch_store_hashes(&batch, caller)
    })
    .await?;
    let body = fingerprints
        .into_iter()
        .zip(records)
        .map(|(fingerprint, record)| RecordResponse {
            fingerprint,
            record,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn verify_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(fingerprint): Path<String>,
) -> ServerResult<Json<VerifyResponse>> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let exists = blocking(&state.registry, move |r| r.verify_hash(fingerprint, caller)).await?;
    Ok(Json(VerifyResponse {
        fingerprint,
        exists,
    }))
}

pub async fn batch_verify_handler(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> ServerResult<Json<Vec<bool>>> {
    let Json(req) = payload?;
    let fingerprints = parse_fingerprints(&req.fingerprints)?;
    let found = blocking(&state.registry, move |r| r.batch_verify_hashes(&fingerprints)).await?;
    Ok(Json(found))
}

pub async fn info_for_hash_handler(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ServerResult<Json<RecordResponse>> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let record = blocking(&state.registry, move |r| r.hash_info(&fingerprint)).await?;
    Ok(Json(RecordResponse {
        fingerprint,
        record,
    }))
}

pub async fn stats_handler(State(state): State<AppState>) -> ServerResult<Json<RegistryStats>> {
    Ok(Json(blocking(&state.registry, |r| r.stats()).await?))
}

pub async fn transfer_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ServerResult<Json<RegistryStats>> {
    let Json(req) = payload?;
    let new_administrator = parse_actor(&req.new_administrator)?;
    let stats = blocking(&state.registry, move |r| {
        r.transfer_ownership(new_administrator, caller)?;
        r.stats()
    })
    .await?;
    Ok(Json(stats))
}

pub async fn events_handler(
    State(state): State<AppState>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> ServerResult<Json<Vec<RegistryEvent>>> {
    let Query(query) = query?;
    let (since, limit) = (query.since, query.page_size());
    let events = blocking(&state.registry, move |r| r.events_since(since, limit)).await?;
    Ok(Json(events))
}

/// Server-sent events for every call committed after the client connects.
///
/// Each event carries its `seq` as the SSE id and its kind as the event
/// name. A client that falls behind its channel gets a `lagged` event with
/// the number of events it missed and can catch up through `/v1/events`.
pub async fn event_stream_handler(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Query(query) = query?;
    let receiver = state.registry.subscribe(query.filter()?);
    Ok(Sse::new(sse_events(receiver)).keep_alive(KeepAlive::default()))
}

fn sse_events(receiver: EventStream) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match to_sse(&event) {
                    Ok(sse) => return Some((Ok::<_, Infallible>(sse), receiver)),
                    Err(e) => warn!(seq = event.seq, error = %e, "dropping unencodable event"),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream client lagged");
                    let sse = Event::default().event("lagged").data(missed.to_string());
                    return Some((Ok::<_, Infallible>(sse), receiver));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn to_sse(event: &RegistryEvent) -> Result<Event, axum::Error> {
    Event::default()
        .id(event.seq.to_string())
        .event(event.kind().to_string())
        .json_data(event)
}

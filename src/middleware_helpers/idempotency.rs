use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use http_body_util::BodyExt as _;
use metrics::counter;
use serde_json::json;

use crate::AppState;

pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

/// What `acquire` decided for a key
enum Acquire {
    /// Key reserved; the caller must execute and then finalize or release
    Execute,
    /// Another request holds the key and has not finalized yet
    InFlight,
    /// A finalized response exists; replay it
    Replay(StoredResponse),
}

#[derive(Clone)]
enum KeyState {
    Pending,
    Completed(StoredResponse),
}

#[derive(Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
}

struct KeyEntry {
    state: KeyState,
    stored_at: Instant,
}

/// In-process idempotency key store with the two states the replay
/// contract needs: reserved-but-not-finalized and finalized. Reservation
/// is an atomic insert-if-absent, so two concurrent retries cannot both
/// win the execute slot.
#[derive(Clone)]
pub struct IdempotencyStore(Arc<DashMap<String, KeyEntry>>);

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self(Arc::new(DashMap::new()))
    }
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, key: &str, ttl: Duration) -> Acquire {
        match self.0.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(KeyEntry {
                    state: KeyState::Pending,
                    stored_at: Instant::now(),
                });
                Acquire::Execute
            }
            Entry::Occupied(mut slot) => {
                if slot.get().stored_at.elapsed() >= ttl {
                    slot.insert(KeyEntry {
                        state: KeyState::Pending,
                        stored_at: Instant::now(),
                    });
                    return Acquire::Execute;
                }
                match &slot.get().state {
                    KeyState::Pending => Acquire::InFlight,
                    KeyState::Completed(response) => Acquire::Replay(response.clone()),
                }
            }
        }
    }

    /// Stores the final response for future replay. Best-effort by
    /// contract: a missed finalize only means a later retry re-executes.
    fn finalize(&self, key: &str, response: StoredResponse) {
        self.0.insert(
            key.to_string(),
            KeyEntry {
                state: KeyState::Completed(response),
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops a reservation so a corrected retry may execute
    fn release(&self, key: &str) {
        self.0.remove(key);
    }

    pub fn cleanup(&self, ttl: Duration) {
        let now = Instant::now();
        self.0
            .retain(|_, entry| now.duration_since(entry.stored_at) < ttl);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Deduplicates mutating calls carrying an `X-Idempotency-Key` header.
/// Absent key means no dedup and the operation always executes.
pub async fn idempotency_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let is_mutating = matches!(req.method().as_str(), "POST" | "PUT" | "PATCH" | "DELETE");
    if !is_mutating {
        return next.run(req).await;
    }

    let Some(key) = req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return next.run(req).await;
    };

    let store = &state.idempotency;
    let ttl = Duration::from_secs(state.config.idempotency_ttl_secs);
    store.cleanup(ttl);

    match store.acquire(&key, ttl) {
        Acquire::Replay(stored) => {
            counter!("partshub_idempotency.replayed", 1);
            // Replays answer 200 even when the original create was a 201
            let status = if stored.status.is_success() {
                StatusCode::OK
            } else {
                stored.status
            };
            let mut resp = Response::new(axum::body::Body::from(stored.body.clone()));
            *resp.status_mut() = status;
            if let Some(ct) = stored.content_type {
                resp.headers_mut()
                    .insert(HeaderName::from_static("content-type"), ct);
            }
            resp
        }
        Acquire::InFlight => {
            counter!("partshub_idempotency.in_flight_conflict", 1);
            let body = json!({
                "message": "A request with this idempotency key is still processing"
            });
            let mut resp = Response::new(axum::body::Body::from(body.to_string()));
            *resp.status_mut() = StatusCode::CONFLICT;
            resp.headers_mut().insert(
                HeaderName::from_static("content-type"),
                HeaderValue::from_static("application/json"),
            );
            resp
        }
        Acquire::Execute => {
            let resp = next.run(req).await;
            let (parts, body) = resp.into_parts();
            match body.collect().await {
                Ok(collected) => {
                    let bytes = collected.to_bytes();
                    if parts.status.is_success() {
                        store.finalize(
                            &key,
                            StoredResponse {
                                status: parts.status,
                                body: bytes.clone(),
                                content_type: parts.headers.get("content-type").cloned(),
                            },
                        );
                    } else {
                        // Failures are not replayable; let a corrected
                        // retry run the operation again
                        store.release(&key);
                    }
                    Response::from_parts(parts, axum::body::Body::from(bytes))
                }
                Err(_) => {
                    store.release(&key);
                    Response::from_parts(parts, axum::body::Body::empty())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn stored_ok() -> StoredResponse {
        StoredResponse {
            status: StatusCode::CREATED,
            body: Bytes::from_static(b"{\"id\":1}"),
            content_type: None,
        }
    }

    #[test]
    fn first_acquire_wins_execute() {
        let store = IdempotencyStore::new();
        assert!(matches!(store.acquire("k", TTL), Acquire::Execute));
    }

    #[test]
    fn second_acquire_sees_in_flight_until_finalized() {
        let store = IdempotencyStore::new();
        assert!(matches!(store.acquire("k", TTL), Acquire::Execute));
        assert!(matches!(store.acquire("k", TTL), Acquire::InFlight));

        store.finalize("k", stored_ok());
        match store.acquire("k", TTL) {
            Acquire::Replay(r) => assert_eq!(r.status, StatusCode::CREATED),
            _ => panic!("expected replay after finalize"),
        }
    }

    #[test]
    fn released_keys_execute_again() {
        let store = IdempotencyStore::new();
        assert!(matches!(store.acquire("k", TTL), Acquire::Execute));
        store.release("k");
        assert!(matches!(store.acquire("k", TTL), Acquire::Execute));
    }

    #[test]
    fn expired_entries_are_reclaimed() {
        let store = IdempotencyStore::new();
        assert!(matches!(store.acquire("k", Duration::ZERO), Acquire::Execute));
        // TTL of zero means the entry is immediately stale
        assert!(matches!(store.acquire("k", Duration::ZERO), Acquire::Execute));

        store.cleanup(Duration::ZERO);
        assert_eq!(store.len(), 0);
    }
}

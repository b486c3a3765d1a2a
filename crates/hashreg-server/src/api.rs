//! Request and response bodies for the JSON API.
//!
//! Fingerprints and identities travel as hex strings. Request fields are
//! taken as plain strings and parsed in the handler so that a malformed
//! value is reported as `invalid_input` rather than a generic body error.

use serde::{Deserialize, Serialize};

use hashreg_core::{EventKind, HashRecord};
use hashreg_journal::EventFilter;
use hashreg_types::{ActorId, Fingerprint};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreRequest {
    pub fingerprint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub fingerprints: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub new_administrator: String,
}

/// Page size for `/v1/events` when the request names none.
pub const DEFAULT_EVENTS_LIMIT: usize = 500;
/// Largest page `/v1/events` will return.
pub const MAX_EVENTS_LIMIT: usize = 5000;

#[derive(Clone, Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
    #[serde(default = "default_events_limit")]
    pub limit: usize,
}

impl EventsQuery {
    pub fn page_size(&self) -> usize {
        self.limit.min(MAX_EVENTS_LIMIT)
    }
}

impl Default for EventsQuery {
    fn default() -> Self {
        Self {
            since: 0,
            limit: DEFAULT_EVENTS_LIMIT,
        }
    }
}

fn default_events_limit() -> usize {
    DEFAULT_EVENTS_LIMIT
}

/// Filter for `/v1/events/stream`; both fields are comma-separated lists.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub kinds: Option<String>,
    pub fingerprints: Option<String>,
}

impl StreamQuery {
    pub fn filter(&self) -> ServerResult<EventFilter> {
        let kinds: Option<Vec<EventKind>> = match self.kinds.as_deref() {
            Some(list) => Some(split_list(list).map(parse_kind).collect::<ServerResult<_>>()?),
            None => None,
        };
        let fingerprints: Option<Vec<Fingerprint>> = match self.fingerprints.as_deref() {
            Some(list) => Some(
                split_list(list)
                    .map(parse_fingerprint)
                    .collect::<ServerResult<_>>()?,
            ),
            None => None,
        };
        Ok(EventFilter {
            kinds,
            fingerprints,
        })
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordResponse {
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub record: HashRecord,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyResponse {
    pub fingerprint: Fingerprint,
    pub exists: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

pub fn parse_fingerprint(s: &str) -> ServerResult<Fingerprint> {
    Fingerprint::from_hex(s).map_err(|e| ServerError::BadRequest(format!("fingerprint: {e}")))
}

pub fn parse_fingerprints(values: &[String]) -> ServerResult<Vec<Fingerprint>> {
    values.iter().map(|s| parse_fingerprint(s)).collect()
}

pub fn parse_kind(s: &str) -> ServerResult<EventKind> {
    match s {
        "Genesis" => Ok(EventKind::Genesis),
        "HashStored" => Ok(EventKind::HashStored),
        "HashVerified" => Ok(EventKind::HashVerified),
        "OwnershipTransferred" => Ok(EventKind::OwnershipTransferred),
        other => Err(ServerError::BadRequest(format!("unknown event kind: {other}"))),
    }
}

pub fn parse_actor(s: &str) -> ServerResult<ActorId> {
    ActorId::from_hex(s).map_err(|e| ServerError::BadRequest(format!("identity: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_response_is_flat() {
        let fp = Fingerprint::from_hash([0xab; 32]);
        let body = serde_json::to_value(RecordResponse {
            fingerprint: fp,
            record: HashRecord::absent(),
        })
        .unwrap();
        assert_eq!(body["fingerprint"], fp.to_hex());
        assert_eq!(body["exists"], false);
        assert_eq!(body["storer"], ActorId::zero().to_hex());
    }

    #[test]
    fn parse_helpers_reject_malformed_input() {
        assert!(matches!(
            parse_fingerprint("xyz"),
            Err(ServerError::BadRequest(_))
        ));
        assert!(parse_fingerprints(&["00".repeat(32), "zz".into()]).is_err());
        assert!(parse_actor(&ActorId::derive("a").to_hex()).is_ok());
    }

    #[test]
    fn events_query_defaults_to_a_bounded_page() {
        let q: EventsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.since, 0);
        assert_eq!(q.page_size(), DEFAULT_EVENTS_LIMIT);

        let q: EventsQuery = serde_json::from_str(r#"{"limit": 1000000}"#).unwrap();
        assert_eq!(q.page_size(), MAX_EVENTS_LIMIT);
    }

    #[test]
    fn stream_query_builds_filter() {
        let fp = Fingerprint::from_hash([7; 32]);
        let query = StreamQuery {
            kinds: Some("HashStored, HashVerified".into()),
            fingerprints: Some(fp.to_hex()),
        };
        let filter = query.filter().unwrap();
        assert_eq!(
            filter.kinds,
            Some(vec![EventKind::HashStored, EventKind::HashVerified])
        );
        assert_eq!(filter.fingerprints, Some(vec![fp]));

        let open = StreamQuery::default().filter().unwrap();
        assert!(open.kinds.is_none() && open.fingerprints.is_none());
    }

    #[test]
    fn stream_query_rejects_unknown_kind() {
        let query = StreamQuery {
            kinds: Some("HashDeleted".into()),
            fingerprints: None,
        };
        assert!(matches!(query.filter(), Err(ServerError::BadRequest(_))));
    }
}

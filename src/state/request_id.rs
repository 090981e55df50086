use std::sync::atomic::{AtomicU64, Ordering};

use http::header::HeaderName;
use http::HeaderMap;

/// Inbound correlation header honoured when present.
pub(crate) const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-oneapi-request-id");
pub(crate) const RESPONSE_ID_PREFIX: &str = "chatcmpl-";

pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub(crate) fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(request_seq))
    }

    /// Correlation id for a request: the inbound header if usable, otherwise
    /// a fresh id.
    pub(crate) fn request_id(&self, headers: &HeaderMap) -> String {
        if let Some(id) = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return id.to_owned();
        }
        self.request_uuid(self.next_seq()).simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let ids = RequestIdGenerator::new();
        let headers = HeaderMap::new();
        let a = ids.request_id(&headers);
        let b = ids.request_id(&headers);
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn inbound_header_wins() {
        let ids = RequestIdGenerator::new();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "20240101-abc".parse().unwrap());
        assert_eq!(ids.request_id(&headers), "20240101-abc");
    }

    #[test]
    fn blank_header_ignored() {
        let ids = RequestIdGenerator::new();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "  ".parse().unwrap());
        assert_eq!(ids.request_id(&headers).len(), 32);
    }
}

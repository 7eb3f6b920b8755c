//! Origin resolution — where a template's archive bytes come from (spec
//! §4.6 step 2, §6).
//!
//! An `Origin` names a template reference (e.g. `github:user/repo#branch`)
//! without saying how to fetch it; an [`OriginHandler`] is the caller-
//! supplied strategy that turns an origin into archive bytes, consulting
//! (and populating) a [`crate::tables::CacheTable`] so the same origin
//! isn't fetched twice in one run.

use crate::error::OverlayError;
use crate::tables::CacheTable;

/// A parsed template reference: an opaque `id` used for cache keys and
/// equality, plus the raw reference string a handler interprets.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Origin {
    /// Cache key and dedup identity (e.g. `github:user/repo#main`).
    pub id: String,
    /// The raw reference as given by the user or a template's
    /// `extendTemplates` entry, unmodified.
    pub reference: String,
}

impl Origin {
    #[must_use]
    pub fn new(id: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reference: reference.into(),
        }
    }
}

/// What a handler needs to actually perform the fetch — the origin being
/// resolved, plus any headers a caller's transport wants attached (auth
/// tokens, `User-Agent`, etc.). The engine never inspects these; it only
/// forwards what the handler itself builds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Resolves an [`Origin`] to a template archive's raw bytes.
///
/// Implementors decide how a reference maps to a URL (or a local path, or
/// an in-memory fixture) — the engine only needs bytes back. A handler
/// that wants caching across runs can persist beyond a single
/// [`CacheTable`]; the table passed here only dedups fetches within one
/// orchestrator run (spec §4.6 step 2: "a template referenced by more than
/// one extend entry is fetched once").
pub trait OriginHandler {
    /// Build the fetch request for `origin` (used by handlers that resolve
    /// a reference to a URL before actually transferring bytes — kept
    /// separate from [`Self::fetch`] so a caller's logging/telemetry layer
    /// can observe the resolved URL before the transfer starts).
    fn resolve(&self, origin: &Origin) -> Result<FetchRequest, OverlayError>;

    /// Perform the actual fetch, given the request from [`Self::resolve`].
    /// Returns the archive's raw (still-compressed) bytes.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, OverlayError>;
}

/// Fetch `origin`'s archive bytes, consulting and populating `cache`
/// first. This is the one entry point the orchestrator calls; it never
/// calls [`OriginHandler::resolve`]/[`OriginHandler::fetch`] directly so
/// every caller gets the same dedup behavior.
pub fn load_archive(
    handler: &dyn OriginHandler,
    origin: &Origin,
    cache: &mut CacheTable,
) -> Result<Vec<u8>, OverlayError> {
    if let Some(bytes) = cache.get(&origin.id) {
        return Ok(bytes.to_vec());
    }

    let request = handler.resolve(origin)?;
    let bytes = handler.fetch(&request).map_err(|err| OverlayError::LoaderFailure {
        url: request.url.clone(),
        detail: err.to_string(),
    })?;
    cache.set(origin.id.clone(), bytes.clone());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureHandler {
        bytes: Vec<u8>,
    }

    impl OriginHandler for FixtureHandler {
        fn resolve(&self, origin: &Origin) -> Result<FetchRequest, OverlayError> {
            Ok(FetchRequest {
                url: format!("https://example.invalid/{}", origin.reference),
                headers: Vec::new(),
            })
        }

        fn fetch(&self, _request: &FetchRequest) -> Result<Vec<u8>, OverlayError> {
            Ok(self.bytes.clone())
        }
    }

    struct FailingHandler;

    impl OriginHandler for FailingHandler {
        fn resolve(&self, origin: &Origin) -> Result<FetchRequest, OverlayError> {
            Ok(FetchRequest {
                url: origin.reference.clone(),
                headers: Vec::new(),
            })
        }

        fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, OverlayError> {
            Err(OverlayError::LoaderFailure {
                url: request.url.clone(),
                detail: "connection refused".to_owned(),
            })
        }
    }

    #[test]
    fn fetches_and_populates_cache() {
        let handler = FixtureHandler { bytes: vec![1, 2, 3] };
        let origin = Origin::new("github:a/b", "a/b#main");
        let mut cache = CacheTable::new();

        let bytes = load_archive(&handler, &origin, &mut cache).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(cache.contains("github:a/b"));
    }

    #[test]
    fn second_fetch_of_same_origin_hits_cache() {
        let handler = FixtureHandler { bytes: vec![9] };
        let origin = Origin::new("github:a/b", "a/b#main");
        let mut cache = CacheTable::new();

        load_archive(&handler, &origin, &mut cache).unwrap();
        cache.set("github:a/b", vec![42]);
        let bytes = load_archive(&handler, &origin, &mut cache).unwrap();
        assert_eq!(bytes, vec![42]);
    }

    #[test]
    fn fetch_failure_becomes_loader_failure() {
        let handler = FailingHandler;
        let origin = Origin::new("github:x/y", "x/y#main");
        let mut cache = CacheTable::new();

        let err = load_archive(&handler, &origin, &mut cache).unwrap_err();
        assert!(matches!(err, OverlayError::LoaderFailure { .. }));
    }
}

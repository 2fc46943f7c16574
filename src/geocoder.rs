//! Address → coordinates resolution.
//!
//! [`Geocoder`] is the only entry point the rest of the crate uses. It asks the
//! shared [`GeocodeCache`] first and only falls through to the external
//! [`GeocodeProvider`] on a miss, persisting whatever the provider found.
//!
//! Concurrent misses for the same address are coalesced: callers queue on a
//! per-address gate, and whoever gets it second finds the answer in the cache.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{
    config::GeocoderConfig,
    errors::GeocodeServiceError,
    geo::Coordinates,
    store::{GeocodeCache, StoreOutcome},
};

/// The external lookup service.
///
/// `Ok(None)` means the provider answered but knows no such address.
pub trait GeocodeProvider: Send + Sync {
    fn fetch(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<Coordinates>, GeocodeServiceError>> + Send;
}

/// Yandex Maps geocoder HTTP client.
pub struct YandexGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl YandexGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        })
    }

    fn request_error(&self, err: reqwest::Error) -> GeocodeServiceError {
        if err.is_timeout() {
            GeocodeServiceError::Timeout(self.timeout)
        } else {
            GeocodeServiceError::Transport(err)
        }
    }
}

impl GeocodeProvider for YandexGeocoder {
    async fn fetch(&self, address: &str) -> Result<Option<Coordinates>, GeocodeServiceError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("geocode", address),
                ("apikey", self.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeServiceError::Status(status.as_u16()));
        }
        let body = resp.bytes().await.map_err(|e| self.request_error(e))?;
        parse_response(&body)
    }
}

// response.GeoObjectCollection.featureMember[].GeoObject.Point.pos
#[derive(Deserialize)]
struct YandexResponse {
    response: YandexBody,
}

#[derive(Deserialize)]
struct YandexBody {
    #[serde(rename = "GeoObjectCollection")]
    collection: GeoObjectCollection,
}

#[derive(Deserialize)]
struct GeoObjectCollection {
    #[serde(rename = "featureMember")]
    members: Vec<FeatureMember>,
}

#[derive(Deserialize)]
struct FeatureMember {
    #[serde(rename = "GeoObject")]
    geo_object: GeoObject,
}

#[derive(Deserialize)]
struct GeoObject {
    #[serde(rename = "Point")]
    point: Point,
}

#[derive(Deserialize)]
struct Point {
    pos: String,
}

/// Parse a provider body, keeping only the most relevant (first) result.
pub fn parse_response(body: &[u8]) -> Result<Option<Coordinates>, GeocodeServiceError> {
    let parsed: YandexResponse = serde_json::from_slice(body)
        .map_err(|e| GeocodeServiceError::Malformed(e.to_string()))?;
    match parsed.response.collection.members.first() {
        Some(top) => parse_pos(&top.geo_object.point.pos).map(Some),
        None => Ok(None),
    }
}

/// `"<lon> <lat>"`, longitude first.
pub fn parse_pos(pos: &str) -> Result<Coordinates, GeocodeServiceError> {
    let malformed = || GeocodeServiceError::Malformed(format!("bad point position `{pos}`"));

    let mut parts = pos.split_whitespace();
    let (Some(lon), Some(lat), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let lon: f64 = lon.parse().map_err(|_| malformed())?;
    let lat: f64 = lat.parse().map_err(|_| malformed())?;

    let coordinates = Coordinates::new(lon, lat);
    if !coordinates.is_valid() {
        return Err(malformed());
    }
    Ok(coordinates)
}

type GateMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// A caller's place in the per-address queue.
///
/// Dropping it, whether the lookup finished or was cancelled, removes the
/// address from the map once no other caller is queued on it.
struct Gate<'a> {
    map: &'a GateMap,
    address: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> Gate<'a> {
    fn enter(map: &'a GateMap, address: &'a str) -> Self {
        let lock = map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_owned())
            .or_default()
            .clone();
        Self { map, address, lock }
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        let mut gates = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // one reference in the map, one held here: nobody else is queued
        if Arc::strong_count(&self.lock) == 2 {
            gates.remove(self.address);
        }
    }
}

/// Cache-first geocoding client.
pub struct Geocoder<P> {
    cache: Arc<dyn GeocodeCache>,
    provider: P,
    in_flight: GateMap,
}

impl<P: GeocodeProvider> Geocoder<P> {
    pub fn new(cache: Arc<dyn GeocodeCache>, provider: P) -> Self {
        Self {
            cache,
            provider,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<dyn GeocodeCache> {
        &self.cache
    }

    /// Resolve `address` to coordinates.
    ///
    /// A cache hit returns without touching the provider. On a miss the
    /// provider's top result is stored in the cache before it is returned.
    /// `Ok(None)` is "address not found" and is not cached.
    pub async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, GeocodeServiceError> {
        if let Some(hit) = self.cache.lookup(address)? {
            debug!(%address, "geocode cache hit");
            return Ok(Some(hit));
        }

        let gate = Gate::enter(&self.in_flight, address);
        let _turn = gate.lock().await;
        self.resolve_miss(address).await
    }

    async fn resolve_miss(
        &self,
        address: &str,
    ) -> Result<Option<Coordinates>, GeocodeServiceError> {
        // whoever held the gate before us may have filled the cache
        if let Some(hit) = self.cache.lookup(address)? {
            debug!(%address, "geocode cache hit after wait");
            return Ok(Some(hit));
        }

        debug!(%address, "geocode cache miss, asking provider");
        let Some(found) = self.provider.fetch(address).await? else {
            debug!(%address, "provider has no match");
            return Ok(None);
        };

        match self.cache.store(address, found)? {
            StoreOutcome::Inserted => Ok(Some(found)),
            StoreOutcome::AlreadyPresent(existing) => {
                if existing != found {
                    warn!(%address, %existing, rejected = %found, "geocode cache already holds a different value; keeping the first");
                }
                Ok(Some(existing))
            }
        }
    }

    #[cfg(test)]
    fn gates_in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::store::MemoryCache;

    /// Answers from a fixed table and counts calls.
    struct FakeProvider {
        answers: HashMap<String, Result<Option<Coordinates>, u16>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeProvider {
        fn new(answers: &[(&str, Result<Option<Coordinates>, u16>)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(a, r)| (a.to_string(), *r))
                    .collect(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl GeocodeProvider for FakeProvider {
        async fn fetch(&self, address: &str) -> Result<Option<Coordinates>, GeocodeServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.answers.get(address) {
                Some(Ok(found)) => Ok(*found),
                Some(Err(status)) => Err(GeocodeServiceError::Status(*status)),
                None => Ok(None),
            }
        }
    }

    fn yandex_body(positions: &[&str]) -> Vec<u8> {
        let members: Vec<_> = positions
            .iter()
            .map(|pos| json!({"GeoObject": {"name": "x", "Point": {"pos": pos}}}))
            .collect();
        serde_json::to_vec(&json!({
            "response": {
                "GeoObjectCollection": {
                    "metaDataProperty": {},
                    "featureMember": members
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_takes_first_result_lon_first() {
        let body = yandex_body(&["37.617635 55.755814", "30.315868 59.939095"]);
        let found = parse_response(&body).unwrap().unwrap();
        assert_eq!(found, Coordinates::new(37.617635, 55.755814));
    }

    #[test]
    fn test_parse_empty_collection_is_not_found() {
        assert_eq!(parse_response(&yandex_body(&[])).unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let body = serde_json::to_vec(&json!({"response": {"items": []}})).unwrap();
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(b"<html>oops</html>"),
            Err(GeocodeServiceError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_pos_rejects_garbage() {
        for bad in ["", "37.6", "37.6 55.7 1.0", "east north", "200 10", "10 95"] {
            assert!(
                matches!(parse_pos(bad), Err(GeocodeServiceError::Malformed(_))),
                "`{bad}` should be malformed"
            );
        }
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let here = Coordinates::new(37.61, 55.75);
        let cache = Arc::new(MemoryCache::new());
        let geocoder = Geocoder::new(
            cache.clone(),
            FakeProvider::new(&[("Moscow, Tverskaya 5", Ok(Some(here)))]),
        );

        assert_eq!(geocoder.resolve("Moscow, Tverskaya 5").await.unwrap(), Some(here));
        assert_eq!(geocoder.resolve("Moscow, Tverskaya 5").await.unwrap(), Some(here));
        assert_eq!(geocoder.provider().calls(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(geocoder.gates_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cached_address_never_reaches_provider() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store("Moscow, Arbat 1", Coordinates::new(37.59, 55.75))
            .unwrap();
        let geocoder = Geocoder::new(cache, FakeProvider::new(&[]));

        let found = geocoder.resolve("Moscow, Arbat 1").await.unwrap();
        assert_eq!(found, Some(Coordinates::new(37.59, 55.75)));
        assert_eq!(geocoder.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let geocoder = Geocoder::new(cache.clone(), FakeProvider::new(&[]));

        assert_eq!(geocoder.resolve("Atlantis").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_surfaces_and_is_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let geocoder = Geocoder::new(cache.clone(), FakeProvider::new(&[("down", Err(500))]));

        let err = geocoder.resolve("down").await.unwrap_err();
        assert!(matches!(err, GeocodeServiceError::Status(500)));
        assert!(cache.is_empty());
        assert_eq!(geocoder.gates_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_provider_call() {
        let here = Coordinates::new(37.61, 55.75);
        let mut provider = FakeProvider::new(&[("Moscow, Tverskaya 5", Ok(Some(here)))]);
        provider.delay = Duration::from_millis(50);
        let geocoder = Geocoder::new(Arc::new(MemoryCache::new()), provider);

        let (a, b, c) = tokio::join!(
            geocoder.resolve("Moscow, Tverskaya 5"),
            geocoder.resolve("Moscow, Tverskaya 5"),
            geocoder.resolve("Moscow, Tverskaya 5"),
        );
        assert_eq!(a.unwrap(), Some(here));
        assert_eq!(b.unwrap(), Some(here));
        assert_eq!(c.unwrap(), Some(here));
        assert_eq!(geocoder.provider().calls(), 1);
        assert_eq!(geocoder.gates_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_resolves_leave_no_gates() {
        let mut provider = FakeProvider::new(&[]);
        provider.delay = Duration::from_secs(5);
        let geocoder = Geocoder::new(Arc::new(MemoryCache::new()), provider);

        for i in 0..20 {
            let address = format!("Moscow, street {i}");
            let waited =
                tokio::time::timeout(Duration::from_millis(1), geocoder.resolve(&address)).await;
            assert!(waited.is_err());
        }
        assert_eq!(geocoder.provider().calls(), 20);
        assert_eq!(geocoder.gates_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_gate_for_holder() {
        let here = Coordinates::new(37.61, 55.75);
        let mut provider = FakeProvider::new(&[("Moscow, Tverskaya 5", Ok(Some(here)))]);
        provider.delay = Duration::from_millis(50);
        let geocoder = Geocoder::new(Arc::new(MemoryCache::new()), provider);

        let (holder, waiter) = tokio::join!(
            geocoder.resolve("Moscow, Tverskaya 5"),
            tokio::time::timeout(
                Duration::from_millis(5),
                geocoder.resolve("Moscow, Tverskaya 5")
            ),
        );
        assert_eq!(holder.unwrap(), Some(here));
        assert!(waiter.is_err());
        assert_eq!(geocoder.provider().calls(), 1);
        assert_eq!(geocoder.gates_in_flight(), 0);
    }

    /// Another process writes the same address while our request is in flight.
    struct RacingProvider {
        cache: Arc<MemoryCache>,
        theirs: Coordinates,
        ours: Coordinates,
    }

    impl GeocodeProvider for RacingProvider {
        async fn fetch(&self, address: &str) -> Result<Option<Coordinates>, GeocodeServiceError> {
            self.cache.store(address, self.theirs)?;
            Ok(Some(self.ours))
        }
    }

    #[tokio::test]
    async fn test_first_write_wins_against_racing_writer() {
        let theirs = Coordinates::new(1.0, 1.0);
        let cache = Arc::new(MemoryCache::new());
        let geocoder = Geocoder::new(
            cache.clone(),
            RacingProvider {
                cache: cache.clone(),
                theirs,
                ours: Coordinates::new(2.0, 2.0),
            },
        );

        assert_eq!(geocoder.resolve("Somewhere").await.unwrap(), Some(theirs));
        assert_eq!(cache.lookup("Somewhere").unwrap(), Some(theirs));
    }
}

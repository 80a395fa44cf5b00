//! IP geolocation as a fresh-fix source for machines without a GPS.
//! Uses ip-api.com - free, no API key required.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;

use super::{LocationCallback, LocationSource, SubscriptionId, UpdateRequest};
use crate::{GeoCoordinate, LocationError};

pub const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json/?fields=status,message,lat,lon,city";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Resolves a fix from the public IP address on a background task.
///
/// The last successful fix (or the seed coordinate) serves as the cached fix.
/// Removing a registration aborts its task, so a removed callback never runs.
pub struct IpLocationSource {
    http: Client,
    endpoint: String,
    permitted: bool,
    last: Arc<Mutex<Option<GeoCoordinate>>>,
    tasks: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl IpLocationSource {
    pub fn new(seed: Option<GeoCoordinate>) -> Result<Self, LocationError> {
        Self::with_endpoint(DEFAULT_ENDPOINT, seed)
    }

    pub fn with_endpoint(endpoint: &str, seed: Option<GeoCoordinate>) -> Result<Self, LocationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LocationError::Platform(format!("Failed to create geolocation client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            permitted: true,
            last: Arc::new(Mutex::new(seed)),
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_permission(mut self, permitted: bool) -> Self {
        self.permitted = permitted;
        self
    }

    /// Number of registrations whose task has not been removed.
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

async fn lookup(http: &Client, endpoint: &str) -> Result<GeoCoordinate, String> {
    let response = http
        .get(endpoint)
        .send()
        .await
        .map_err(|e| format!("geolocation request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("geolocation returned status {}", response.status()));
    }

    let body: IpApiResponse = response
        .json()
        .await
        .map_err(|e| format!("geolocation parse error: {e}"))?;

    if body.status != "success" {
        return Err(body.message.unwrap_or_else(|| "geolocation failed".to_string()));
    }

    match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => Ok(GeoCoordinate::new(lat, lon)),
        _ => Err("geolocation response has no coordinates".to_string()),
    }
}

#[async_trait]
impl LocationSource for IpLocationSource {
    fn has_permission(&self) -> bool {
        self.permitted
    }

    async fn last_location(&self) -> Result<Option<GeoCoordinate>, LocationError> {
        Ok(*self.last.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn request_updates(
        &self,
        _request: UpdateRequest,
        mut callback: LocationCallback,
    ) -> Result<SubscriptionId, LocationError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| LocationError::Platform("no async runtime for location lookup".into()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let last = Arc::clone(&self.last);

        let handle = runtime.spawn(async move {
            match lookup(&http, &endpoint).await {
                Ok(coordinate) => {
                    tracing::info!(%coordinate, "resolved location from IP");
                    *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(coordinate);
                    callback(Some(coordinate));
                }
                Err(e) => {
                    tracing::debug!("IP geolocation failed: {e}");
                    callback(None);
                }
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
        Ok(id)
    }

    fn remove_updates(&self, id: SubscriptionId) {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationHelper;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INTERVAL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn resolves_fix_and_updates_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "lat": 30.8, "lon": 31.0, "city": "Tanta"
            })))
            .mount(&server)
            .await;

        let source = Arc::new(IpLocationSource::with_endpoint(&server.uri(), None).unwrap());
        let helper = LocationHelper::new(source.clone());

        assert_eq!(helper.last_known().await.unwrap_err(), LocationError::NoCachedFix);

        let fix = helper.request_fresh(INTERVAL).await.unwrap();
        assert_eq!(fix, GeoCoordinate::new(30.8, 31.0));
        assert_eq!(helper.last_known().await.unwrap(), fix);
        assert_eq!(source.pending(), 0);
    }

    #[tokio::test]
    async fn failed_lookup_settles_with_no_fix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail", "message": "reserved range"
            })))
            .mount(&server)
            .await;

        let seed = GeoCoordinate::new(1.0, 2.0);
        let source = Arc::new(IpLocationSource::with_endpoint(&server.uri(), Some(seed)).unwrap());
        let helper = LocationHelper::new(source.clone());

        let err = helper.request_fresh(INTERVAL).await.unwrap_err();
        assert_eq!(err, LocationError::NoFixObtained);
        assert_eq!(helper.last_known().await.unwrap(), seed);
        assert_eq!(source.pending(), 0);
    }

    #[tokio::test]
    async fn dropped_request_aborts_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "status": "success", "lat": 1.0, "lon": 1.0 }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let source = Arc::new(IpLocationSource::with_endpoint(&server.uri(), None).unwrap());
        let helper = LocationHelper::new(source.clone());

        let request = helper.start_fresh(INTERVAL).unwrap();
        assert_eq!(source.pending(), 1);
        drop(request);
        assert_eq!(source.pending(), 0);
    }
}

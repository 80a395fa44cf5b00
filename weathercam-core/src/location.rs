//! Location helper.
//!
//! [`LocationSource`] is the platform seam: a cached fix plus a callback-based
//! update registration. [`LocationHelper`] turns that into permission-checked
//! async calls. A fresh fix is an explicit [`FreshFixRequest`] that settles at
//! most once and always removes its registration, whether it completes, fails
//! or is dropped mid-flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{Error, GeoCoordinate, LocationError};

pub mod fixed;
pub mod ip;

pub use fixed::FixedLocationSource;
pub use ip::IpLocationSource;

pub type SubscriptionId = u64;

/// Invoked by the source with `Some(fix)` or `None` when the platform could
/// not produce one.
pub type LocationCallback = Box<dyn FnMut(Option<GeoCoordinate>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    HighAccuracy,
    Balanced,
    LowPower,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub priority: Priority,
    /// Suggested interval between updates. Sources may ignore it.
    pub interval: Duration,
    pub max_updates: u32,
    pub wait_for_accurate: bool,
}

impl UpdateRequest {
    pub fn single_high_accuracy(interval: Duration) -> Self {
        Self {
            priority: Priority::HighAccuracy,
            interval,
            max_updates: 1,
            wait_for_accurate: true,
        }
    }
}

#[async_trait]
pub trait LocationSource: Send + Sync {
    fn has_permission(&self) -> bool;

    /// The platform's cached fix, if any.
    async fn last_location(&self) -> Result<Option<GeoCoordinate>, LocationError>;

    /// Register for updates. The callback may run before this returns.
    fn request_updates(
        &self,
        request: UpdateRequest,
        callback: LocationCallback,
    ) -> Result<SubscriptionId, LocationError>;

    /// Unregister. Removing an unknown or already-removed id is a no-op.
    fn remove_updates(&self, id: SubscriptionId);
}

/// Whether a fix came from a fresh request or the cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOrigin {
    Fresh,
    LastKnown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinate: GeoCoordinate,
    pub origin: FixOrigin,
}

impl Fix {
    pub fn is_stale(&self) -> bool {
        self.origin == FixOrigin::LastKnown
    }
}

#[derive(Clone)]
pub struct LocationHelper {
    source: Arc<dyn LocationSource>,
}

impl std::fmt::Debug for LocationHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationHelper").finish_non_exhaustive()
    }
}

impl LocationHelper {
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        Self { source }
    }

    pub fn has_permission(&self) -> bool {
        self.source.has_permission()
    }

    pub async fn last_known(&self) -> Result<GeoCoordinate, LocationError> {
        if !self.has_permission() {
            return Err(LocationError::PermissionDenied);
        }

        self.source
            .last_location()
            .await?
            .ok_or(LocationError::NoCachedFix)
    }

    /// Register a single high-accuracy update and hand back the request object.
    pub fn start_fresh(&self, interval_hint: Duration) -> Result<FreshFixRequest, LocationError> {
        if !self.has_permission() {
            return Err(LocationError::PermissionDenied);
        }

        let (tx, rx) = oneshot::channel();
        let mut settle = Some(tx);
        let callback: LocationCallback = Box::new(move |fix| {
            if let Some(tx) = settle.take() {
                // receiver gone means the request was dropped; nothing to do
                let _ = tx.send(fix);
            }
        });

        let id = self
            .source
            .request_updates(UpdateRequest::single_high_accuracy(interval_hint), callback)?;
        tracing::debug!(id, ?interval_hint, "registered single location update");

        Ok(FreshFixRequest {
            outcome: rx,
            subscription: Subscription {
                source: Arc::clone(&self.source),
                id: Some(id),
            },
        })
    }

    pub async fn request_fresh(&self, interval_hint: Duration) -> Result<GeoCoordinate, LocationError> {
        self.start_fresh(interval_hint)?.outcome().await
    }

    /// Fresh fix first, then the cached one, else the location is unavailable.
    pub async fn locate(&self, interval_hint: Duration) -> Result<Fix, Error> {
        if !self.has_permission() {
            return Err(Error::PermissionDenied);
        }

        match self.request_fresh(interval_hint).await {
            Ok(coordinate) => {
                return Ok(Fix {
                    coordinate,
                    origin: FixOrigin::Fresh,
                });
            }
            Err(e) => tracing::warn!("fresh location fix failed: {e}"),
        }

        match self.last_known().await {
            Ok(coordinate) => {
                tracing::warn!(%coordinate, "using last known location, might be outdated");
                Ok(Fix {
                    coordinate,
                    origin: FixOrigin::LastKnown,
                })
            }
            Err(e) => {
                tracing::warn!("last known location unavailable: {e}");
                Err(Error::LocationUnavailable)
            }
        }
    }
}

struct Subscription {
    source: Arc<dyn LocationSource>,
    id: Option<SubscriptionId>,
}

impl Subscription {
    fn cancel(&mut self) {
        if let Some(id) = self.id.take() {
            self.source.remove_updates(id);
            tracing::debug!(id, "removed location update registration");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// An in-flight single-fix request.
///
/// Dropping it (or the future returned by [`FreshFixRequest::outcome`])
/// before it settles removes the registration from the source.
pub struct FreshFixRequest {
    outcome: oneshot::Receiver<Option<GeoCoordinate>>,
    subscription: Subscription,
}

impl FreshFixRequest {
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.id
    }

    pub async fn outcome(mut self) -> Result<GeoCoordinate, LocationError> {
        let settled = (&mut self.outcome).await;
        self.subscription.cancel();

        match settled {
            Ok(Some(coordinate)) => Ok(coordinate),
            // Ok(None): platform reported no fix; Err: source dropped the callback
            Ok(None) | Err(_) => Err(LocationError::NoFixObtained),
        }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl std::fmt::Debug for FreshFixRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshFixRequest")
            .field("subscription", &self.subscription.id)
            .finish()
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{LocationCallback, LocationSource, SubscriptionId, UpdateRequest};
use crate::{GeoCoordinate, LocationError};

/// Serves one configured coordinate as both the cached fix and every fresh fix.
#[derive(Debug)]
pub struct FixedLocationSource {
    coordinate: GeoCoordinate,
    permitted: bool,
    next_id: AtomicU64,
}

impl FixedLocationSource {
    pub fn new(coordinate: GeoCoordinate) -> Self {
        Self {
            coordinate,
            permitted: true,
            next_id: AtomicU64::new(1),
        }
    }

    /// `permitted = false` behaves like a revoked location permission.
    pub fn with_permission(mut self, permitted: bool) -> Self {
        self.permitted = permitted;
        self
    }
}

#[async_trait]
impl LocationSource for FixedLocationSource {
    fn has_permission(&self) -> bool {
        self.permitted
    }

    async fn last_location(&self) -> Result<Option<GeoCoordinate>, LocationError> {
        Ok(Some(self.coordinate))
    }

    fn request_updates(
        &self,
        _request: UpdateRequest,
        mut callback: LocationCallback,
    ) -> Result<SubscriptionId, LocationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        callback(Some(self.coordinate));
        Ok(id)
    }

    fn remove_updates(&self, _id: SubscriptionId) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationHelper;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fresh_and_cached_fix_are_the_configured_coordinate() {
        let coord = GeoCoordinate::new(30.7997, 31.0003);
        let helper = LocationHelper::new(Arc::new(FixedLocationSource::new(coord)));

        assert_eq!(helper.request_fresh(Duration::from_secs(10)).await.unwrap(), coord);
        assert_eq!(helper.last_known().await.unwrap(), coord);
    }

    #[tokio::test]
    async fn disabled_source_denies() {
        let source = FixedLocationSource::new(GeoCoordinate::new(0.0, 0.0)).with_permission(false);
        let helper = LocationHelper::new(Arc::new(source));

        assert!(!helper.has_permission());
        assert_eq!(
            helper.request_fresh(Duration::from_secs(1)).await.unwrap_err(),
            LocationError::PermissionDenied
        );
    }
}

//! REST gateway for the region persistence API.
//!
//! | Operation | Method and path |
//! |-----------|-----------------|
//! | list | `GET {base}/cameras/{camera}/regions` |
//! | create | `POST {base}/cameras/{camera}/regions` |
//! | update | `PUT {base}/regions/{id}` (sparse body) |
//! | delete | `DELETE {base}/regions/{id}` |
//!
//! URL building is always compiled; the network calls and logger setup need
//! the `browser` feature.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use crate::config::EditorConfig;
use crate::region::RegionId;

/// Collection endpoint for a camera's regions.
#[must_use]
pub fn camera_regions_endpoint(base: &str, camera_id: &str) -> String {
    format!("{base}/cameras/{camera_id}/regions")
}

/// Endpoint for a single region.
#[must_use]
pub fn region_endpoint(base: &str, id: &RegionId) -> String {
    format!("{base}/regions/{id}")
}

/// Whether an HTTP status counts as success.
#[must_use]
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[must_use]
pub fn status_failed_message(operation: &str, status: u16) -> String {
    format!("{operation} failed: {status}")
}

/// Gateway backed by the dashboard's REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpGateway {
    base: String,
}

impl HttpGateway {
    /// `base` is the API root without a trailing slash, e.g. `/api`.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Gateway rooted at the configured API base.
    #[must_use]
    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.api_base_url.clone())
    }

    #[must_use]
    pub fn camera_regions_url(&self, camera_id: &str) -> String {
        camera_regions_endpoint(&self.base, camera_id)
    }

    #[must_use]
    pub fn region_url(&self, id: &RegionId) -> String {
        region_endpoint(&self.base, id)
    }
}

#[cfg(feature = "browser")]
pub use browser::init_logging;

#[cfg(feature = "browser")]
mod browser {
    use async_trait::async_trait;
    use gloo_net::http::{Request, Response};
    use log::{Level, debug};
    use serde::de::DeserializeOwned;

    use super::{HttpGateway, is_success, status_failed_message};
    use crate::gateway::{GatewayError, RegionGateway};
    use crate::region::{Region, RegionFields, RegionId, RegionPatch};

    /// Route `log` output to the browser console and install the panic hook.
    pub fn init_logging(level: Level) {
        console_error_panic_hook::set_once();
        if let Err(e) = console_log::init_with_level(level) {
            web_sys::console::warn_1(&format!("logger already set: {e}").into());
        }
    }

    fn transport(e: &gloo_net::Error) -> GatewayError {
        GatewayError::new(e.to_string())
    }

    fn check(operation: &str, resp: &Response) -> Result<(), GatewayError> {
        if is_success(resp.status()) {
            Ok(())
        } else {
            Err(GatewayError::new(status_failed_message(operation, resp.status())))
        }
    }

    async fn body<T: DeserializeOwned>(resp: Response) -> Result<T, GatewayError> {
        resp.json::<T>().await.map_err(|e| transport(&e))
    }

    #[async_trait(?Send)]
    impl RegionGateway for HttpGateway {
        async fn list_regions(&self, camera_id: &str) -> Result<Vec<Region>, GatewayError> {
            let url = self.camera_regions_url(camera_id);
            debug!("GET {url}");
            let resp = Request::get(&url).send().await.map_err(|e| transport(&e))?;
            check("list regions", &resp)?;
            body(resp).await
        }

        async fn create_region(&self, camera_id: &str, fields: &RegionFields) -> Result<Region, GatewayError> {
            let url = self.camera_regions_url(camera_id);
            debug!("POST {url}");
            let resp = Request::post(&url)
                .json(fields)
                .map_err(|e| transport(&e))?
                .send()
                .await
                .map_err(|e| transport(&e))?;
            check("create region", &resp)?;
            body(resp).await
        }

        async fn update_region(&self, id: &RegionId, patch: &RegionPatch) -> Result<Region, GatewayError> {
            let url = self.region_url(id);
            debug!("PUT {url}");
            let resp = Request::put(&url)
                .json(patch)
                .map_err(|e| transport(&e))?
                .send()
                .await
                .map_err(|e| transport(&e))?;
            check("update region", &resp)?;
            body(resp).await
        }

        async fn delete_region(&self, id: &RegionId) -> Result<(), GatewayError> {
            let url = self.region_url(id);
            debug!("DELETE {url}");
            let resp = Request::delete(&url).send().await.map_err(|e| transport(&e))?;
            check("delete region", &resp)
        }
    }
}

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::components::ordered_collection::ResourceStore;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Thin client for the console's resource endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminClient {
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn resources_url(&self, filter: &ResourceFilter) -> String {
        let query = filter.to_query();
        if query.is_empty() {
            self.endpoint("resources")
        } else {
            format!("{}?{}", self.endpoint("resources"), query)
        }
    }

    fn resource_url(&self, id: &str, tail: &str) -> String {
        self.endpoint(&format!("resources/{}/{}", urlencoding::encode(id), tail))
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn list_resources(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        let url = self.resources_url(filter);
        let response = HTTP_CLIENT.get(&url).send().await?;
        let mut records: Vec<ResourceRecord> = Self::read_json("ListResources", response).await?;
        records.sort_by_key(|record| record.order);
        Ok(records)
    }

    pub async fn set_order(&self, id: &str, order: i64) -> Result<(), ApiError> {
        let url = self.resource_url(id, "order");
        let response = HTTP_CLIENT
            .patch(&url)
            .json(&OrderUpdate { order })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: format!("SetOrder({id})"),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    pub async fn resolve_reference(&self, id: &str) -> Result<ReferencePayload, ApiError> {
        let url = self.resource_url(id, "reference");
        let response = HTTP_CLIENT.get(&url).send().await?;
        let payload: ReferencePayload = Self::read_json("ResolveReference", response).await?;
        if payload.url.trim().is_empty() {
            return Err(ApiError::Decode {
                endpoint: "ResolveReference".to_string(),
                message: format!("reference {id} has no url"),
            });
        }
        Ok(payload)
    }

    /// Reachability check issued after playback has been requested.
    ///
    /// `None` when the request itself failed. Cross-origin media hosts often
    /// reject a fetch the audio element is still allowed to load.
    pub async fn probe(&self, url: &str) -> Option<bool> {
        match HTTP_CLIENT.head(url).send().await {
            Ok(response) => Some(status_is_reachable(response.status().as_u16())),
            Err(err) => {
                tracing::debug!("reachability check for {url} was inconclusive: {err}");
                None
            }
        }
    }
}

// some media hosts answer HEAD with 405; only missing or failing hosts count
fn status_is_reachable(code: u16) -> bool {
    !(code == 404 || code == 410 || code >= 500)
}

impl ResourceStore for AdminClient {
    async fn list_resources(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        AdminClient::list_resources(self, filter).await
    }

    async fn set_order(&self, id: &str, order: i64) -> Result<(), ApiError> {
        AdminClient::set_order(self, id, order).await
    }
}

//! Data source client
//!
//! Binds the five data source operations to one `/api/data_sources`
//! collection endpoint.

use super::http::RedashHttpClient;
use crate::datasource::{DataSource, DataSourceId, HealthCheck, NewDataSource};
use crate::error::{Error, Result};
use std::time::Duration;
use url::Url;

/// Path of the data source collection relative to the instance base URL
const COLLECTION_PATH: [&str; 2] = ["api", "data_sources"];

/// Client for one Redash instance's data source collection
pub struct DataSourceClient {
    http: RedashHttpClient,
    collection: Url,
}

impl DataSourceClient {
    /// Create a client for the instance at `base_url`
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let collection = collection_url(base_url)?;
        let http = RedashHttpClient::new(api_key, timeout)?;

        tracing::info!("Data source endpoint: {}", collection);

        Ok(Self { http, collection })
    }

    /// List every data source
    pub async fn show_all(&self) -> Result<Vec<DataSource>> {
        let body = self.http.get(&self.collection).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch one data source with its full options
    pub async fn show(&self, id: DataSourceId) -> Result<DataSource> {
        let body = self.http.get(&self.item_url(id, None)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Run the remote connection test
    pub async fn test(&self, id: DataSourceId) -> Result<HealthCheck> {
        let body = self
            .http
            .post::<()>(&self.item_url(id, Some("test")), None)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Create a data source; the server allocates a new id
    pub async fn create(&self, data_source: &NewDataSource) -> Result<()> {
        self.http.post(&self.collection, Some(data_source)).await?;
        tracing::info!("Data source {} created", data_source.name);
        Ok(())
    }

    /// Delete a data source, echoing it back as the request body
    pub async fn delete(&self, data_source: &DataSource) -> Result<()> {
        self.http
            .delete(&self.item_url(data_source.id, None), data_source)
            .await?;
        tracing::info!("Data source {} deleted", data_source);
        Ok(())
    }

    /// Release the HTTP session. Taking `self` means nothing can still be
    /// borrowing the client when it goes away.
    pub fn close(self) {
        tracing::debug!("Closing session for {}", self.collection);
    }

    fn item_url(&self, id: DataSourceId, action: Option<&str>) -> Url {
        let mut url = self.collection.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&id.to_string());
            if let Some(action) = action {
                segments.push(action);
            }
        }
        url
    }
}

/// Build `<base>/api/data_sources`, tolerating a trailing slash on the base
fn collection_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())
        .map_err(|e| Error::validation(format!("invalid base URL {:?}: {}", base_url, e)))?;

    url.path_segments_mut()
        .map_err(|_| Error::validation(format!("base URL {:?} cannot have a path", base_url)))?
        .pop_if_empty()
        .extend(COLLECTION_PATH);

    Ok(url)
}

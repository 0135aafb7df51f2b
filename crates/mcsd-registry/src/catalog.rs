//! Fetches the directory list a provider catalog advertises: one
//! `Organization` per directory, carrying its URA and a reference to the
//! `Endpoint` whose `address` is the directory's FHIR base URL.

use async_trait::async_trait;
use mcsd_client::{ClientConfig, FhirClient};
use mcsd_core::{CoreError, DirectoryResourceType};
use serde_json::Value;

/// One directory as listed by a provider catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub endpoint: String,
    pub ura: String,
}

/// Seam between `RefreshProvider` and the HTTP call that lists a provider's
/// directories, so the refresh logic itself is tested without a live
/// catalog server.
#[async_trait]
pub trait ProviderCatalogFetcher: Send + Sync {
    async fn fetch_directories(&self, provider_url: &str) -> Result<Vec<CatalogEntry>, CoreError>;
}

/// Fetches a provider catalog over real HTTP: pages `Organization` via C1,
/// then resolves each one's first `Endpoint` reference for its address.
pub struct ClientProviderCatalogFetcher;

#[async_trait]
impl ProviderCatalogFetcher for ClientProviderCatalogFetcher {
    async fn fetch_directories(&self, provider_url: &str) -> Result<Vec<CatalogEntry>, CoreError> {
        let client = FhirClient::new(ClientConfig::new(provider_url))?;

        let mut organizations = Vec::new();
        let mut page = client
            .search_resource(DirectoryResourceType::Organization, &[])
            .await?;
        loop {
            organizations.extend(page.entries);
            let Some(next) = page.next_url else { break };
            page = client.search_resource_next(&next).await?;
        }

        let mut entries = Vec::with_capacity(organizations.len());
        for org in &organizations {
            let Some(ura) = mcsd_core::find_ura(&org.raw) else {
                continue;
            };
            let Some(endpoint_id) = first_endpoint_id(&org.raw) else {
                continue;
            };
            let endpoint = client
                .get_resource_by_id(DirectoryResourceType::Endpoint, &endpoint_id)
                .await?;
            let Some(address) = endpoint.raw.get("address").and_then(Value::as_str) else {
                continue;
            };
            entries.push(CatalogEntry {
                endpoint: address.to_string(),
                ura,
            });
        }
        Ok(entries)
    }
}

/// Reads the id segment of the first `endpoint[].reference` on an
/// Organization, ignoring anything that isn't a plain `Endpoint/{id}` form.
fn first_endpoint_id(org: &Value) -> Option<String> {
    org.get("endpoint")?
        .as_array()?
        .iter()
        .find_map(|e| e.get("reference").and_then(Value::as_str))
        .and_then(|r| r.strip_prefix("Endpoint/"))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_endpoint_id_reads_plain_reference() {
        let org = json!({
            "endpoint": [
                {"reference": "Endpoint/E1"},
                {"reference": "Endpoint/E2"}
            ]
        });
        assert_eq!(first_endpoint_id(&org).as_deref(), Some("E1"));
    }

    #[test]
    fn first_endpoint_id_none_without_endpoints() {
        assert!(first_endpoint_id(&json!({})).is_none());
    }
}

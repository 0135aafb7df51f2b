//! The typed FHIR client (C1): GET/search/history/transaction-POST and
//! capability probing over an upstream directory, with retries and
//! correlation ids shared across a request's retry attempts.

use mcsd_core::{CoreError, DirectoryResourceType, DomainResource};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::history::{HistoryEntry, dedup_newest_first, parse_history_entry};

const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// One page of a search or history bundle: the entries plus an optional
/// link to the next page.
pub struct Page<T> {
    pub entries: Vec<T>,
    pub next_url: Option<String>,
}

/// A per-entry failure extracted from the `OperationOutcome` of a
/// transaction response; a non-empty list does not itself fail `PostBundle`.
#[derive(Debug, Clone)]
pub struct TransactionEntryError {
    pub entry_index: usize,
    pub diagnostics: String,
}

/// The outcome of a single-resource write: the HTTP status and whatever
/// JSON body came back, handed to the caller unconditionally so it can
/// branch on specific 4xx statuses instead of a collapsed error.
pub struct WriteOutcome {
    pub status: u16,
    pub body: Value,
}

pub struct FhirClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl FhirClient {
    /// Builds the client and validates startup-fatal configuration: mTLS
    /// material must exist on disk and timeouts must be sane.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout);

        if let Some(identity) = &config.tls_identity {
            builder = builder.identity(identity.load()?);
        }

        let http = builder
            .build()
            .map_err(|e| CoreError::upstream_http(0, format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn resource_url(&self, resource_type: DirectoryResourceType, id: &str) -> String {
        format!("{}/{}/{}", self.config.base_url, resource_type, id)
    }

    /// `GetResourceByID`: 410 maps to `CoreError::Gone`; other non-2xx to
    /// `UpstreamHttp`.
    #[instrument(skip(self))]
    pub async fn get_resource_by_id(
        &self,
        resource_type: DirectoryResourceType,
        id: &str,
    ) -> Result<DomainResource, CoreError> {
        let url = self.resource_url(resource_type, id);
        let response = self.execute_with_retry(Method::GET, &url, None).await?;

        if response.status() == StatusCode::GONE {
            return Err(CoreError::gone(resource_type.to_string(), id.to_string()));
        }
        let body = read_json_body(response).await?;
        DomainResource::from_value(body).ok_or_else(|| {
            CoreError::invalid_reference(format!("{resource_type}/{id}"), "response is not a valid resource")
        })
    }

    /// `SearchResource`: a single page; callers drain `next_url` themselves.
    #[instrument(skip(self, params))]
    pub async fn search_resource(
        &self,
        resource_type: DirectoryResourceType,
        params: &[(&str, &str)],
    ) -> Result<Page<DomainResource>, CoreError> {
        let url = format!("{}/{resource_type}", self.config.base_url);
        let url = append_query(&url, params);
        self.fetch_bundle_page(&url).await
    }

    /// `SearchResource` continuation: follows a `nextURL` exactly as given.
    #[instrument(skip(self))]
    pub async fn search_resource_next(&self, next_url: &str) -> Result<Page<DomainResource>, CoreError> {
        self.fetch_bundle_page(next_url).await
    }

    async fn fetch_bundle_page(&self, url: &str) -> Result<Page<DomainResource>, CoreError> {
        let response = self.execute_with_retry(Method::GET, url, None).await?;
        let bundle = read_json_body(response).await?;
        let entries = bundle_entries(&bundle)
            .iter()
            .filter_map(|entry| entry.get("resource").cloned())
            .filter_map(DomainResource::from_value)
            .collect();
        Ok(Page {
            entries,
            next_url: next_link(&bundle),
        })
    }

    /// `GetHistoryBatch`: one page of `{type}/_history`, deduplicated so
    /// that a resource id repeated on the page keeps only its newest entry.
    #[instrument(skip(self, params))]
    pub async fn get_history_batch(
        &self,
        resource_type: DirectoryResourceType,
        params: &[(&str, &str)],
    ) -> Result<Page<HistoryEntry>, CoreError> {
        let url = format!("{}/{resource_type}/_history", self.config.base_url);
        let url = append_query(&url, params);
        self.fetch_history_page(&url).await
    }

    #[instrument(skip(self))]
    pub async fn get_history_batch_next(&self, next_url: &str) -> Result<Page<HistoryEntry>, CoreError> {
        self.fetch_history_page(next_url).await
    }

    async fn fetch_history_page(&self, url: &str) -> Result<Page<HistoryEntry>, CoreError> {
        let response = self.execute_with_retry(Method::GET, url, None).await?;
        let bundle = read_json_body(response).await?;
        let mut entries = Vec::new();
        for entry in bundle_entries(&bundle) {
            if let Some(parsed) = parse_history_entry(entry)? {
                entries.push(parsed);
            }
        }
        Ok(Page {
            entries: dedup_newest_first(entries),
            next_url: next_link(&bundle),
        })
    }

    /// `PostBundle`: sends a transaction or batch; per-entry
    /// `OperationOutcome` failures are surfaced, not raised as an error.
    #[instrument(skip(self, bundle))]
    pub async fn post_bundle(
        &self,
        bundle: &Value,
    ) -> Result<(Value, Vec<TransactionEntryError>), CoreError> {
        let url = self.config.base_url.clone();
        let body = serde_json::to_vec(bundle)
            .map_err(|e| CoreError::upstream_http(0, format!("failed to serialize bundle: {e}")))?;
        let response = self.execute_with_retry(Method::POST, &url, Some(body)).await?;
        let response_bundle = read_json_body(response).await?;
        let errors = extract_entry_errors(&response_bundle);
        Ok((response_bundle, errors))
    }

    /// `ValidateCapabilityStatement`: `GET /metadata`, delegating the
    /// profile check to a caller-supplied predicate over the raw JSON.
    #[instrument(skip(self, accepts))]
    pub async fn validate_capability_statement(
        &self,
        accepts: impl Fn(&Value) -> bool,
    ) -> Result<bool, CoreError> {
        let url = format!("{}/metadata", self.config.base_url);
        let response = self.execute_with_retry(Method::GET, &url, None).await?;
        let statement = read_json_body(response).await?;
        Ok(accepts(&statement))
    }

    /// Sends the request, retrying on network/timeout errors and on 429/5xx
    /// per `CoreError::is_retryable`, reusing one correlation id across all
    /// attempts.
    async fn execute_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, CoreError> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut last_err = None;

        for attempt in 0..self.config.retry.max_attempts {
            if attempt > 0 {
                let delay = self.config.retry.delay_for_attempt(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .http
                .request(method.clone(), url)
                .header(CORRELATION_HEADER, &correlation_id);
            if let Some(body) = &body {
                request = request.header("Content-Type", "application/fhir+json").body(body.clone());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status == StatusCode::GONE {
                        return Ok(response);
                    }
                    let err = CoreError::upstream_http(status.as_u16(), status_text(status));
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(attempt, status = status.as_u16(), correlation_id, "retrying upstream request");
                    last_err = Some(err);
                }
                Err(e) => {
                    let err = self.classify_transport_error(&e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, correlation_id, "retrying after transport error");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::Network("retries exhausted".into())))
    }

    /// `PUT {base}/{type}/{id}`: upserts a resource with a client-assigned
    /// id. Unlike the read operations above, the caller needs the exact
    /// status of a failed write (the Notification Sender falls back to
    /// POST only on 400/405/409/422), so terminal statuses are returned
    /// rather than collapsed into an error.
    #[instrument(skip(self, body))]
    pub async fn put_resource(
        &self,
        resource_type: DirectoryResourceType,
        id: &str,
        body: &Value,
    ) -> Result<WriteOutcome, CoreError> {
        let url = self.resource_url(resource_type, id);
        self.write(Method::PUT, &url, body).await
    }

    /// `PUT {url}`: upserts a resource of a type outside the seven mCSD
    /// types this client otherwise knows (e.g. a Workflow `Task`), at an
    /// absolute URL the caller has already built.
    #[instrument(skip(self, body))]
    pub async fn put_resource_at(&self, url: &str, body: &Value) -> Result<WriteOutcome, CoreError> {
        self.write(Method::PUT, url, body).await
    }

    /// `POST {url}`: creates a resource at an absolute URL outside this
    /// client's own configured base — the sender's own create-fallback when
    /// a PUT with a client-assigned id is rejected, and delivering a
    /// notification Task to a receiver's base.
    #[instrument(skip(self, body))]
    pub async fn post_resource(&self, url: &str, body: &Value) -> Result<WriteOutcome, CoreError> {
        self.write(Method::POST, url, body).await
    }

    /// The base URL this client was configured with, for callers that
    /// build URLs for resource types outside the seven mCSD types.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn write(&self, method: Method, url: &str, body: &Value) -> Result<WriteOutcome, CoreError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| CoreError::upstream_http(0, format!("failed to serialize resource: {e}")))?;
        let correlation_id = Uuid::new_v4().to_string();
        let mut last_err = None;

        for attempt in 0..self.config.retry.max_attempts {
            if attempt > 0 {
                let delay = self.config.retry.delay_for_attempt(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let request = self
                .http
                .request(method.clone(), url)
                .header(CORRELATION_HEADER, &correlation_id)
                .header("Content-Type", "application/fhir+json")
                .body(bytes.clone());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let err = CoreError::upstream_http(status.as_u16(), status_text(status));
                    if status.is_success() || !err.is_retryable() {
                        let status_code = status.as_u16();
                        let body = read_json_body_lenient(response).await;
                        return Ok(WriteOutcome { status: status_code, body });
                    }
                    warn!(attempt, status = status.as_u16(), correlation_id, "retrying upstream write");
                    last_err = Some(err);
                }
                Err(e) => {
                    let err = self.classify_transport_error(&e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, correlation_id, "retrying write after transport error");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::Network("retries exhausted".into())))
    }

    /// reqwest doesn't expose a DNS/TLS/other-network distinction directly;
    /// `is_connect()` covers all three. Walk the error's source chain for
    /// the telltale substrings the underlying resolver/TLS stack leaves —
    /// best-effort, but DNS and TLS must not be silently retried as if they
    /// were transient connection failures.
    fn classify_transport_error(&self, e: &reqwest::Error) -> CoreError {
        if e.is_timeout() {
            return CoreError::Timeout(self.config.read_timeout);
        }
        if e.is_connect() {
            let chain = error_chain_text(e);
            if chain.contains("dns error") || chain.contains("failed to lookup address") {
                return CoreError::Dns(chain);
            }
            if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
                return CoreError::Tls(chain);
            }
        }
        CoreError::Network(e.to_string())
    }
}

fn error_chain_text(e: &(dyn std::error::Error + 'static)) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(err) = source {
        text.push_str(": ");
        text.push_str(&err.to_string());
        source = err.source();
    }
    text.to_ascii_lowercase()
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}

async fn read_json_body(response: reqwest::Response) -> Result<Value, CoreError> {
    let status = response.status();
    response
        .json::<Value>()
        .await
        .map_err(|e| CoreError::upstream_http(status.as_u16(), format!("invalid JSON body: {e}")))
}

async fn read_json_body_lenient(response: reqwest::Response) -> Value {
    response.json::<Value>().await.unwrap_or(Value::Null)
}

fn bundle_entries(bundle: &Value) -> Vec<&Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().collect())
        .unwrap_or_default()
}

fn next_link(bundle: &Value) -> Option<String> {
    bundle.get("link")?.as_array()?.iter().find_map(|link| {
        if link.get("relation")?.as_str()? == "next" {
            link.get("url")?.as_str().map(str::to_string)
        } else {
            None
        }
    })
}

/// Pulls per-entry failures out of a transaction-response bundle: entries
/// whose `response.status` is not 2xx, with diagnostics from the paired
/// `OperationOutcome` in `response.outcome` when present.
fn extract_entry_errors(response_bundle: &Value) -> Vec<TransactionEntryError> {
    bundle_entries(response_bundle)
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let status = entry.pointer("/response/status")?.as_str()?;
            let code: u16 = status.split_whitespace().next()?.parse().ok()?;
            if (200..300).contains(&code) {
                return None;
            }
            let diagnostics = entry
                .pointer("/response/outcome/issue/0/diagnostics")
                .and_then(Value::as_str)
                .unwrap_or(status)
                .to_string();
            Some(TransactionEntryError {
                entry_index: index,
                diagnostics,
            })
        })
        .collect()
}

fn append_query(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{url}?{query}")
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn next_link_finds_relation_next() {
        let bundle = json!({
            "link": [
                {"relation": "self", "url": "https://upstream.test/Organization"},
                {"relation": "next", "url": "https://upstream.test/Organization?page=2"}
            ]
        });
        assert_eq!(
            next_link(&bundle).as_deref(),
            Some("https://upstream.test/Organization?page=2")
        );
    }

    #[test]
    fn next_link_absent_when_no_next_relation() {
        let bundle = json!({"link": [{"relation": "self", "url": "x"}]});
        assert_eq!(next_link(&bundle), None);
    }

    #[test]
    fn extract_entry_errors_skips_successes() {
        let bundle = json!({
            "entry": [
                {"response": {"status": "200 OK"}},
                {"response": {"status": "409 Conflict", "outcome": {
                    "issue": [{"diagnostics": "duplicate identifier"}]
                }}}
            ]
        });
        let errors = extract_entry_errors(&bundle);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].entry_index, 1);
        assert_eq!(errors[0].diagnostics, "duplicate identifier");
    }

    #[test]
    fn append_query_builds_encoded_query_string() {
        let url = append_query("https://upstream.test/Organization", &[("name", "Acme Clinic")]);
        assert_eq!(url, "https://upstream.test/Organization?name=Acme%20Clinic");
    }

    #[test]
    fn append_query_is_noop_for_empty_params() {
        assert_eq!(append_query("https://upstream.test/Organization", &[]), "https://upstream.test/Organization");
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: String) -> FhirClient {
        FhirClient::new(ClientConfig::new(base_url)).unwrap()
    }

    #[tokio::test]
    async fn get_resource_by_id_returns_the_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Organization/O1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceType": "Organization",
                "id": "O1",
                "name": "Acme Clinic"
            })))
            .mount(&server)
            .await;

        let client = client_for(server.uri());
        let resource = client
            .get_resource_by_id(DirectoryResourceType::Organization, "O1")
            .await
            .unwrap();
        assert_eq!(resource.id.as_deref(), Some("O1"));
    }

    #[tokio::test]
    async fn get_resource_by_id_maps_410_to_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Organization/O1"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = client_for(server.uri());
        let err = client
            .get_resource_by_id(DirectoryResourceType::Organization, "O1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Gone { .. }));
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Organization/O1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Organization/O1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceType": "Organization",
                "id": "O1"
            })))
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(server.uri());
        config.retry.base_delay = std::time::Duration::from_millis(1);
        let client = FhirClient::new(config).unwrap();
        let resource = client
            .get_resource_by_id(DirectoryResourceType::Organization, "O1")
            .await
            .unwrap();
        assert_eq!(resource.id.as_deref(), Some("O1"));
    }

    #[tokio::test]
    async fn does_not_retry_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Organization/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(server.uri());
        let err = client
            .get_resource_by_id(DirectoryResourceType::Organization, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamHttp { status: 404, .. }));
    }

    #[tokio::test]
    async fn search_resource_follows_next_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Organization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceType": "Bundle",
                "entry": [{"resource": {"resourceType": "Organization", "id": "O1"}}],
                "link": [{"relation": "next", "url": format!("{}/Organization?page=2", server.uri())}]
            })))
            .mount(&server)
            .await;

        let client = client_for(server.uri());
        let page = client
            .search_resource(DirectoryResourceType::Organization, &[])
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert!(page.next_url.unwrap().contains("page=2"));
    }

    #[tokio::test]
    async fn post_bundle_surfaces_per_entry_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceType": "Bundle",
                "entry": [
                    {"response": {"status": "201 Created"}},
                    {"response": {"status": "409 Conflict", "outcome": {
                        "issue": [{"diagnostics": "identifier already in use"}]
                    }}}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(server.uri());
        let (_, errors) = client
            .post_bundle(&json!({"resourceType": "Bundle", "type": "transaction"}))
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].diagnostics, "identifier already in use");
    }
}

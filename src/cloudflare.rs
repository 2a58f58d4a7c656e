//! Cloudflare v4 API implementation of [`DnsProvider`].

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::CloudflareConfig;
use crate::error::ProviderError;
use crate::provider::{DnsProvider, DnsRecord, RecordPayload};

/// Page size for record listings (Cloudflare maximum is 5000, 100 is the common default).
const PER_PAGE: u32 = 100;

/// Standard Cloudflare response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

/// Page to request after `requested`, if any.
///
/// Advances from the page we asked for rather than the one the server echoes,
/// so a response stuck on one page cannot loop forever.
fn next_page(requested: u32, info: Option<&ResultInfo>) -> Option<u32> {
    let info = info?;
    if info.page != requested {
        debug!(requested, reported = info.page, "cloudflare reported unexpected page");
    }
    (requested < info.total_pages).then(|| requested + 1)
}

/// Parse a response body into its envelope, mapping API-level failures.
fn parse_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<Envelope<T>, ProviderError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            status: status.as_u16(),
        });
    }

    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(env) => env,
        Err(e) if status.is_success() => {
            return Err(ProviderError::MalformedResponse(e.to_string()));
        }
        Err(_) => {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body.chars().take(256).collect(),
            });
        }
    };

    if !status.is_success() || !envelope.success {
        let message = envelope
            .errors
            .iter()
            .map(|e| format!("[{}] {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(envelope)
}

fn require_result<T>(envelope: Envelope<T>) -> Result<T, ProviderError> {
    envelope
        .result
        .ok_or_else(|| ProviderError::MalformedResponse("missing result".to_string()))
}

/// Cloudflare DNS client scoped to one zone.
#[derive(Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    zone_id: String,
    api_token: String,
}

impl CloudflareClient {
    /// Create a client from configuration.
    pub fn new(config: &CloudflareConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("node-dns-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            zone_id: config.zone_id.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.records_url(), id)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, ProviderError> {
        let response = request.bearer_auth(&self.api_token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        trace!(%status, body_len = body.len(), "cloudflare response");
        parse_envelope(status, &body)
    }
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    async fn find_records(
        &self,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>, ProviderError> {
        let mut records = Vec::new();
        let per_page = PER_PAGE.to_string();
        let mut page = 1u32;

        loop {
            let page_param = page.to_string();
            let request = self.http.get(self.records_url()).query(&[
                ("name", name),
                ("type", record_type),
                ("per_page", per_page.as_str()),
                ("page", page_param.as_str()),
            ]);
            let envelope: Envelope<Vec<DnsRecord>> = self.send(request).await?;
            let next = next_page(page, envelope.result_info.as_ref());
            records.extend(require_result(envelope)?);

            match next {
                Some(n) => page = n,
                None => break,
            }
        }

        debug!(name, record_type, found = records.len(), "listed records");
        Ok(records)
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<DnsRecord, ProviderError> {
        let request = self.http.post(self.records_url()).json(payload);
        require_result(self.send(request).await?)
    }

    async fn update_record(
        &self,
        id: &str,
        payload: &RecordPayload,
    ) -> Result<DnsRecord, ProviderError> {
        let request = self.http.put(self.record_url(id)).json(payload);
        require_result(self.send(request).await?)
    }

    async fn delete_record(&self, id: &str) -> Result<(), ProviderError> {
        let request = self.http.delete(self.record_url(id));
        let _: Envelope<serde_json::Value> = self.send(request).await?;
        Ok(())
    }
}

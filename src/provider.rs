//! HTTP client for the upstream market data provider
//!
//! The provider speaks a single POST endpoint: the request names an API
//! and its parameters, the response carries column names and row-major
//! items. Long-lived reqwest client for connection pooling.

use crate::error::HubError;
use crate::tabular::TabularResult;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct ProviderRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: &'a BTreeMap<String, String>,
    fields: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<ProviderData>,
}

#[derive(Debug, Deserialize)]
struct ProviderData {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

/// Reusable provider client (connection-pooled)
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ProviderClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `api_name` once and convert the payload into a frame
    pub async fn query(
        &self,
        api_name: &str,
        params: &BTreeMap<String, String>,
        fields: &[&str],
    ) -> Result<TabularResult> {
        let request = ProviderRequest {
            api_name,
            token: &self.token,
            params,
            fields: fields.join(","),
        };

        debug!(api = %api_name, params = ?params, "Calling data provider");

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .inspect_err(|e| error!("Provider request failed for {}: {}", api_name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::Provider(format!(
                "provider returned {} for {}: {}",
                status, api_name, body
            )));
        }

        let body = response.text().await?;
        decode_payload(api_name, parse_response(&body)?)
    }
}

fn parse_response(body: &str) -> Result<ProviderResponse> {
    Ok(serde_json::from_str(body)?)
}

fn decode_payload(api_name: &str, payload: ProviderResponse) -> Result<TabularResult> {
    if payload.code != 0 {
        return Err(HubError::Provider(format!(
            "{} rejected with code {}: {}",
            api_name,
            payload.code,
            payload.msg.unwrap_or_default()
        )));
    }

    match payload.data {
        Some(data) => TabularResult::from_rows(&data.fields, &data.items),
        None => Ok(TabularResult::empty()),
    }
}

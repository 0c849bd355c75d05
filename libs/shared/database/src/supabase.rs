use anyhow::Result;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// A non-2xx answer from PostgREST, kept typed so callers can downcast it out
/// of `anyhow::Error` and react to constraint violations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Supabase API error ({status}): {message}")]
pub struct SupabaseApiError {
    pub status: StatusCode,
    /// Postgres SQLSTATE or PostgREST error code, when one was returned.
    pub code: Option<String>,
    pub message: String,
}

impl SupabaseApiError {
    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some("23505")
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.message.contains(needle)
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, &[]).await
    }

    /// Header names must be lowercase.
    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: &[(&'static str, &str)],
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body, extra_headers).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Runs a select with `Prefer: count=exact` and returns the rows together
    /// with the total taken from `Content-Range`.
    pub async fn request_with_count<T>(&self, path: &str) -> Result<(Vec<T>, u64)>
    where
        T: DeserializeOwned,
    {
        let response = self
            .send(Method::GET, path, None, &[("prefer", "count=exact")])
            .await?;

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let rows = response.json::<Vec<T>>().await?;
        let total = total.unwrap_or(rows.len() as u64);
        Ok((rows, total))
    }

    /// Calls a Postgres function exposed under `/rest/v1/rpc/{name}`.
    pub async fn rpc<T>(&self, function: &str, args: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, Some(args)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: &[(&'static str, &str)],
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        for &(name, value) in extra_headers {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            let parsed = serde_json::from_str::<PostgrestErrorBody>(&error_text).ok();
            let (code, message) = match parsed {
                Some(body) => {
                    let message = match (body.message, body.details) {
                        (Some(m), Some(d)) => format!("{} {}", m, d),
                        (Some(m), None) => m,
                        (None, Some(d)) => d,
                        (None, None) => error_text.clone(),
                    };
                    (body.code, message)
                }
                None => (None, error_text),
            };

            return Err(SupabaseApiError { status, code, message }.into());
        }

        Ok(response)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// `0-9/42` or `*/0` → the total after the slash.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.parse().ok())
}

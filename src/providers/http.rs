use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;

pub fn build_client(provider: &str, timeout_secs: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| ProviderError::Request {
            provider: provider.to_string(),
            detail: format!("build HTTP client: {e}"),
        })
}

/// Sends `req` and decodes a JSON body, mapping transport and status failures.
pub fn send_json<T: DeserializeOwned>(
    provider: &str,
    endpoint: &str,
    hint: &str,
    req: RequestBuilder,
) -> Result<T, ProviderError> {
    let resp = req.send().map_err(|e| map_send_error(provider, endpoint, hint, &e))?;
    let status = resp.status();
    let body = resp.text().map_err(|e| ProviderError::Request {
        provider: provider.to_string(),
        detail: format!("read response body: {e}"),
    })?;
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: crate::textutil::clip_for_log(&body, 400),
        });
    }
    serde_json::from_str(&body).map_err(|e| ProviderError::MalformedResponse {
        provider: provider.to_string(),
        detail: e.to_string(),
    })
}

pub fn map_send_error(provider: &str, endpoint: &str, hint: &str, err: &reqwest::Error) -> ProviderError {
    if err.is_connect() {
        return ProviderError::ConnectionRefused {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            hint: hint.to_string(),
        };
    }
    let detail = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    ProviderError::Request {
        provider: provider.to_string(),
        detail,
    }
}

/// Joins a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

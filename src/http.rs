//! # Discord REST transport
//!
//! Signed requests against the Discord API with a per-request timeout and a
//! single automatic retry on HTTP 429.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Shared by the command registry and the interaction response client

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{BridgeError, BridgeResult};

/// Used when a 429 carries neither a JSON `retry_after` nor a header.
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);
/// Longest wait honoured before the retry.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Clone)]
pub struct DiscordHttp {
    client: Client,
    base_url: String,
}

impl DiscordHttp {
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> BridgeResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|_| BridgeError::Validation("bot token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends the request built by `build`, rebuilding it once if Discord answers 429.
    ///
    /// `build` must produce the same method, target and body on every call;
    /// multipart forms cannot be cloned, hence the builder closure.
    pub async fn execute<F>(&self, build: F) -> BridgeResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(&self.client).send().await?;
        let response = if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let delay = retry_after(response).await;
            warn!(
                "⏳ Rate limited by Discord, retrying once in {:.2}s",
                delay.as_secs_f64()
            );
            sleep(delay).await;

            let retried = build(&self.client).send().await?;
            if retried.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(BridgeError::RateLimited {
                    retry_after: retry_after(retried).await,
                });
            }
            retried
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Discord answered {} with body: {}", status, body);
            return Err(BridgeError::Registry {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

async fn retry_after(response: Response) -> Duration {
    let header = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());

    let body = response
        .json::<RateLimitBody>()
        .await
        .ok()
        .map(|b| b.retry_after);

    retry_delay(body.or(header))
}

fn retry_delay(secs: Option<f64>) -> Duration {
    secs.filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())))
        .unwrap_or(FALLBACK_RETRY_AFTER)
}

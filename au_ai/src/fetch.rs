//! ABOUTME: Download helper for stored images
//! ABOUTME: Bounded fixed-delay retry loop around a plain GET

use au_core::{Error, Result};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// GET `url`, retrying up to `attempts` times with a fixed `delay` between tries
///
/// Any non-success status or transport error counts as a failed attempt.
pub async fn fetch_image(
    client: &Client,
    url: &str,
    attempts: u32,
    delay: Duration,
) -> Result<(Bytes, Option<String>)> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Error::External(format!("Failed to read image body: {}", e)))?;
                debug!(url, attempt, bytes = body.len(), "Fetched image");
                return Ok((body, content_type));
            }
            Ok(response) => {
                last_error = format!("status {}", response.status());
            }
            Err(e) => {
                last_error = e.to_string();
            }
        }

        warn!(url, attempt, "Image fetch failed: {}", last_error);
        if attempt < attempts {
            sleep(delay).await;
        }
    }

    Err(Error::External(format!(
        "Failed to fetch image after {} attempts: {}",
        attempts, last_error
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_succeeds_after_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/a.png"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/a.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(test_support::tiny_png()),
            )
            .mount(&server)
            .await;

        let (bytes, content_type) = fetch_image(
            &Client::new(),
            &format!("{}/media/a.png", server.uri()),
            DEFAULT_FETCH_ATTEMPTS,
            Duration::from_millis(5),
        )
        .await
        .unwrap();

        assert_eq!(bytes.as_ref(), test_support::tiny_png().as_slice());
        assert_eq!(content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_fetch_stops_after_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetch_image(
            &Client::new(),
            &format!("{}/missing.png", server.uri()),
            3,
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
    }
}

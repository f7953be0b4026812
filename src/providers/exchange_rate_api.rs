use super::util::with_retry;
use crate::core::{FetchError, RateSnapshot, RateSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Rate source backed by the exchangerate-api.com `latest/{BASE}` endpoint.
pub struct ExchangeRateApiProvider {
    base_url: String,
}

impl ExchangeRateApiProvider {
    pub fn new(base_url: &str) -> Self {
        ExchangeRateApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    base: Option<String>,
    rates: HashMap<String, f64>,
    #[serde(
        default,
        alias = "time_last_update_unix",
        alias = "last_updated"
    )]
    time_last_updated: Option<LastUpdated>,
}

/// Providers report the update time either as unix seconds or as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LastUpdated {
    Unix(i64),
    Text(String),
}

impl LastUpdated {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LastUpdated::Unix(secs) => DateTime::from_timestamp(*secs, 0),
            LastUpdated::Text(text) => DateTime::parse_from_rfc3339(text)
                .or_else(|_| DateTime::parse_from_rfc2822(text))
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiProvider {
    #[instrument(name = "ExchangeRateApiFetch", skip(self))]
    async fn fetch(&self, base: &str) -> Result<RateSnapshot, FetchError> {
        let url = format!("{}/{}", self.base_url, base);
        debug!("Requesting exchange rates from {}", url);

        let transport = |e: reqwest::Error| FetchError::Transport {
            base: base.to_string(),
            message: e.to_string(),
        };
        let malformed = |message: String| FetchError::Malformed {
            base: base.to_string(),
            message,
        };

        let client = reqwest::Client::builder()
            .user_agent("quickcurrency/0.1")
            .build()
            .map_err(transport)?;
        let response = with_retry(|| async { client.get(&url).send().await }, 3, 500)
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                base: base.to_string(),
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await.map_err(transport)?;
        let data: LatestRatesResponse =
            serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?;

        if let Some(reported) = &data.base
            && reported != base
        {
            return Err(malformed(format!(
                "response is for base currency {reported}"
            )));
        }

        let published_at = match &data.time_last_updated {
            Some(raw) => {
                let parsed = raw.to_datetime();
                if parsed.is_none() {
                    warn!(value = ?raw, "Ignoring unparsable last-updated time");
                }
                parsed
            }
            None => None,
        };

        let snapshot = RateSnapshot::new(base, data.rates, Utc::now())
            .map_err(|e| malformed(e.to_string()))?
            .with_published_at(published_at);
        debug!(
            currencies = snapshot.rates().len(),
            "Successfully fetched rates for {}", base
        );
        Ok(snapshot)
    }
}

//! Yahoo Finance price provider.
//!
//! Fetches daily OHLCV observations from Yahoo's v8 chart API. Handles the
//! request timeout, opt-in retries with exponential backoff, response
//! parsing, and the circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. `CsvProvider` is the offline fallback.

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ProviderConfig;
use crate::domain::Observation;
use crate::provider::{PriceProvider, ProviderError};
use chrono::{NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Upper bound on any single retry wait.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(
        config: &ProviderConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            timeout: config.timeout(),
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        })
    }

    /// Chart API URL for `[start, end)`. Both bounds are midnight UTC, so
    /// `period2` excludes the session dated `end`.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end.and_time(NaiveTime::MIN).and_utc().timestamp();
        format!(
            "{CHART_BASE_URL}/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true&events=div%2Csplit"
        )
    }

    fn chart_error(symbol: &str, err: ChartError) -> ProviderError {
        if err.code == "Not Found" {
            ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            }
        } else {
            ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
        }
    }

    /// Parse the chart API response into observations.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<Observation>, ProviderError> {
        let chart = resp.chart;
        let result = match (chart.result, chart.error) {
            (_, Some(err)) => return Err(Self::chart_error(symbol, err)),
            (Some(result), None) => result,
            (None, None) => {
                return Err(ProviderError::ResponseFormatChanged(
                    "empty result with no error".into(),
                ))
            }
        };

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;

        // Yahoo omits `timestamp` entirely when the range holds no sessions.
        let Some(timestamps) = data.timestamp else {
            return Err(ProviderError::NoData {
                symbol: symbol.to_string(),
            });
        };

        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose)
            .unwrap_or_default();

        let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

        let mut observations = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let obs = Observation {
                date,
                open: at(&quote.open, i),
                high: at(&quote.high, i),
                low: at(&quote.low, i),
                close: at(&quote.close, i),
                volume: quote.volume.get(i).copied().flatten(),
                adj_close: at(&adj_closes, i),
            };

            // Holidays come back as all-null rows.
            if obs.is_empty() {
                continue;
            }
            observations.push(obs);
        }

        if observations.is_empty() {
            return Err(ProviderError::NoData {
                symbol: symbol.to_string(),
            });
        }

        Ok(observations)
    }

    fn classify_transport_error(&self, e: &reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ProviderError::NetworkUnreachable(e.to_string())
        }
    }

    /// One request per attempt; retries only when `max_retries > 0`.
    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, ProviderError> {
        let url = Self::chart_url(symbol, start, end);
        debug!(%symbol, %url, "requesting chart");
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let retry_after = match &last_error {
                    Some(ProviderError::RateLimited { retry_after_secs }) => {
                        Some(*retry_after_secs)
                    }
                    _ => None,
                };
                let delay = backoff_delay(self.base_delay, attempt, retry_after);
                warn!(%symbol, attempt, ?delay, "retrying after failure");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                warn!(
                    %symbol,
                    remaining = ?self.circuit_breaker.remaining_cooldown(),
                    "circuit breaker open"
                );
                return Err(ProviderError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    let err = self.classify_transport_error(&e);
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = resp.status();

            if status == StatusCode::FORBIDDEN {
                // IP ban: stop talking to the provider for the cooldown.
                self.circuit_breaker.trip();
                return Err(ProviderError::CircuitBreakerTripped);
            }

            if status == StatusCode::NOT_FOUND {
                // A 404 still means the service answered.
                self.circuit_breaker.record_success();
                return Err(ProviderError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(ProviderError::RateLimited { retry_after_secs });
                continue;
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(ProviderError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                if e.is_timeout() {
                    self.classify_transport_error(&e)
                } else {
                    ProviderError::ResponseFormatChanged(format!(
                        "failed to parse response for {symbol}: {e}"
                    ))
                }
            })?;

            self.circuit_breaker.record_success();
            return Self::parse_response(symbol, chart);
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt-1)`, raised to
/// the server's `Retry-After` when one was sent, never above [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let exponential = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(MAX_BACKOFF);
    let requested = retry_after_secs.map_or(Duration::ZERO, Duration::from_secs);
    exponential.max(requested).min(MAX_BACKOFF)
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, ProviderError> {
        self.fetch_with_retry(symbol, start, end)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

//! # Metrics Aggregation
//!
//! Running statistics over named (component, metric) pairs, the API-call
//! ledger, and trend detection. All updates are O(1); derived values
//! (averages, success rates) are computed at read time so they can never
//! drift from the underlying counters.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Maximum samples retained per series for trend detection
pub const RECENT_WINDOW_SIZE: usize = 100;

/// Relative change between window means that counts as a trend
const TREND_THRESHOLD: f64 = 0.10;

/// Samples compared on each side of the trend window
const TREND_SPAN: usize = 5;

/// One timestamped observation in a metric series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Running statistics for one (component, metric) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    /// Bounded window of the most recent samples, oldest evicted first
    pub recent: VecDeque<MetricSample>,
}

impl MetricSeries {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            recent: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }

    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if self.recent.len() == RECENT_WINDOW_SIZE {
            self.recent.pop_front();
        }
        self.recent.push_back(MetricSample {
            value,
            recorded_at: Utc::now(),
        });
    }

    /// Mean of all recorded samples; always `sum / count`
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Direction of recent movement in a metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increasing => write!(f, "increasing"),
            Self::Decreasing => write!(f, "decreasing"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Optional quota and rate-limit context supplied with an API call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCallDetails {
    pub quota_used: Option<u64>,
    pub quota_limit: Option<u64>,
    pub rate_limit_remaining: Option<u64>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
}

/// Call ledger for one (service, endpoint) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUsageRecord {
    pub service: String,
    pub endpoint: String,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_response_time_ms: u64,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    pub last_call_at: Option<DateTime<Utc>>,
    pub quota_used: Option<u64>,
    pub quota_limit: Option<u64>,
    pub rate_limit_remaining: Option<u64>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
}

impl ApiUsageRecord {
    fn new(service: &str, endpoint: &str) -> Self {
        Self {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            total_response_time_ms: 0,
            min_response_time_ms: None,
            max_response_time_ms: None,
            last_call_at: None,
            quota_used: None,
            quota_limit: None,
            rate_limit_remaining: None,
            rate_limit_reset_at: None,
        }
    }

    /// Mean response time; recomputed from the totals, never stored
    pub fn average_response_time_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.total_calls as f64
        }
    }

    /// Fraction of calls that succeeded, in [0, 1]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }

    /// Fraction of quota consumed, when both sides are known
    pub fn quota_usage_ratio(&self) -> Option<f64> {
        match (self.quota_used, self.quota_limit) {
            (Some(used), Some(limit)) if limit > 0 => Some(used as f64 / limit as f64),
            _ => None,
        }
    }
}

/// Aggregator owning every metric series and API usage record for the process
///
/// Entries are created lazily on first observation and live until an explicit
/// `reset()`. Each map sits behind its own lock.
pub struct MetricsAggregator {
    series: RwLock<HashMap<(String, String), MetricSeries>>,
    api_usage: RwLock<HashMap<(String, String), ApiUsageRecord>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            api_usage: RwLock::new(HashMap::new()),
        }
    }

    /// Record one sample for a (component, metric) pair
    pub fn record_sample(&self, component: &str, metric: &str, value: f64) {
        let mut series = self.series.write();
        series
            .entry((component.to_string(), metric.to_string()))
            .or_insert_with(MetricSeries::new)
            .record(value);
    }

    /// Record an external API call outcome in the ledger
    ///
    /// Also feeds a call-count sample and, when timing is known, a
    /// response-time sample into the metric series for the service.
    pub fn track_api_call(
        &self,
        service: &str,
        endpoint: &str,
        response_time_ms: Option<u64>,
        success: bool,
        details: Option<ApiCallDetails>,
    ) {
        {
            let mut usage = self.api_usage.write();
            let record = usage
                .entry((service.to_string(), endpoint.to_string()))
                .or_insert_with(|| ApiUsageRecord::new(service, endpoint));

            record.total_calls += 1;
            if success {
                record.successful_calls += 1;
            } else {
                record.failed_calls += 1;
            }
            if let Some(rt) = response_time_ms {
                record.total_response_time_ms += rt;
                record.min_response_time_ms =
                    Some(record.min_response_time_ms.map_or(rt, |min| min.min(rt)));
                record.max_response_time_ms =
                    Some(record.max_response_time_ms.map_or(rt, |max| max.max(rt)));
            }
            record.last_call_at = Some(Utc::now());

            if let Some(details) = details {
                if details.quota_used.is_some() {
                    record.quota_used = details.quota_used;
                }
                if details.quota_limit.is_some() {
                    record.quota_limit = details.quota_limit;
                }
                if details.rate_limit_remaining.is_some() {
                    record.rate_limit_remaining = details.rate_limit_remaining;
                }
                if details.rate_limit_reset_at.is_some() {
                    record.rate_limit_reset_at = details.rate_limit_reset_at;
                }
            }
        }

        self.record_sample(service, "api_calls", 1.0);
        if let Some(rt) = response_time_ms {
            self.record_sample(service, "response_time_ms", rt as f64);
        }

        debug!(
            service = %service,
            endpoint = %endpoint,
            response_time_ms = response_time_ms,
            success = success,
            "API call tracked"
        );
    }

    /// Snapshot one series
    pub fn series(&self, component: &str, metric: &str) -> Option<MetricSeries> {
        self.series
            .read()
            .get(&(component.to_string(), metric.to_string()))
            .cloned()
    }

    /// Snapshot the full API usage ledger, ordered by (service, endpoint)
    pub fn api_usage(&self) -> Vec<ApiUsageRecord> {
        let usage = self.api_usage.read();
        let mut records: Vec<_> = usage.values().cloned().collect();
        records.sort_by(|a, b| (&a.service, &a.endpoint).cmp(&(&b.service, &b.endpoint)));
        records
    }

    /// Snapshot one API usage record
    pub fn api_record(&self, service: &str, endpoint: &str) -> Option<ApiUsageRecord> {
        self.api_usage
            .read()
            .get(&(service.to_string(), endpoint.to_string()))
            .cloned()
    }

    /// Compare the mean of the last 5 samples against the preceding 5
    ///
    /// Reports `Stable` until 10 samples exist or while the relative change
    /// stays within 10%.
    pub fn trend(&self, component: &str, metric: &str) -> Trend {
        let series = self.series.read();
        let Some(series) = series.get(&(component.to_string(), metric.to_string())) else {
            return Trend::Stable;
        };

        if series.recent.len() < TREND_SPAN * 2 {
            return Trend::Stable;
        }

        let values: Vec<f64> = series.recent.iter().map(|s| s.value).collect();
        let recent_mean: f64 =
            values[values.len() - TREND_SPAN..].iter().sum::<f64>() / TREND_SPAN as f64;
        let prior_mean: f64 = values[values.len() - TREND_SPAN * 2..values.len() - TREND_SPAN]
            .iter()
            .sum::<f64>()
            / TREND_SPAN as f64;

        if prior_mean == 0.0 {
            return if recent_mean == 0.0 {
                Trend::Stable
            } else {
                Trend::Increasing
            };
        }

        let relative_change = (recent_mean - prior_mean) / prior_mean;
        if relative_change > TREND_THRESHOLD {
            Trend::Increasing
        } else if relative_change < -TREND_THRESHOLD {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    /// Drop every series and ledger entry
    pub fn reset(&self) {
        self.series.write().clear();
        self.api_usage.write().clear();
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

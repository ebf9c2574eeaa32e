//! Prometheus metrics

use crate::round::{Direction, RoundResult, Token};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterMetric {
    /// Bet committed to the ledger
    BetAccepted,
    /// Bet rejected, labelled by reason
    BetRejected(&'static str),
    /// Round transitioned Scheduled -> Live
    RoundOpened,
    /// Round transitioned Live -> Settled
    RoundSettled(RoundResult),
    /// Upstream price source failure
    FeedSourceError(String),
    /// Boundary capture retried after a stale or failed read
    CaptureRetry,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeMetric {
    /// Current live round number
    LiveRound,
    /// Last fresh price from the feed
    LastPrice,
    /// Live pool for one token and side
    LivePool(Token, Direction),
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One scheduler reconcile pass
    SchedulerTick,
    /// One settlement, price capture included
    Settlement,
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    match metric {
        CounterMetric::BetAccepted => metrics::counter!("updown_bets_accepted_total").increment(1),
        CounterMetric::BetRejected(reason) => {
            metrics::counter!("updown_bets_rejected_total", "reason" => reason).increment(1)
        }
        CounterMetric::RoundOpened => metrics::counter!("updown_rounds_opened_total").increment(1),
        CounterMetric::RoundSettled(result) => {
            metrics::counter!("updown_rounds_settled_total", "result" => result.as_str())
                .increment(1)
        }
        CounterMetric::FeedSourceError(source) => {
            metrics::counter!("updown_feed_source_errors_total", "source" => source).increment(1)
        }
        CounterMetric::CaptureRetry => {
            metrics::counter!("updown_capture_retries_total").increment(1)
        }
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    match metric {
        GaugeMetric::LiveRound => metrics::gauge!("updown_live_round_number").set(value),
        GaugeMetric::LastPrice => metrics::gauge!("updown_last_price").set(value),
        GaugeMetric::LivePool(token, side) => metrics::gauge!(
            "updown_live_pool",
            "token" => token.as_str(),
            "side" => side.as_str()
        )
        .set(value),
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let millis = duration.as_secs_f64() * 1_000.0;
    match metric {
        LatencyMetric::SchedulerTick => {
            metrics::histogram!("updown_tick_duration_ms").record(millis)
        }
        LatencyMetric::Settlement => {
            metrics::histogram!("updown_settlement_duration_ms").record(millis)
        }
    }
}

/// Install the Prometheus exporter with an HTTP listener on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

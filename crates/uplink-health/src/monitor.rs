//! Health monitor: one probe batch in, one verdict out.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use uplink_core::ProbeConfig;

use crate::probe::{ProbeBatch, ProbeError, Prober};

/// Loss and latency of one probe batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSample {
    /// Mean RTT of the replies. With no replies this is the per-packet
    /// timeout, so a dead link reads as maximally slow.
    pub avg_latency_ms: f64,
    pub loss_percent: f64,
    pub sent: u32,
    pub received: u32,
}

impl HealthSample {
    pub fn from_batch(batch: &ProbeBatch, timeout_ms: f64) -> Self {
        let sent = batch.sent();
        let received = batch.received().min(sent);
        let loss_percent = if sent == 0 {
            100.0
        } else {
            f64::from(sent - received) / f64::from(sent) * 100.0
        };
        let avg_latency_ms = match batch.avg_rtt_ms {
            Some(rtt) if received > 0 => rtt,
            _ => timeout_ms,
        };
        Self {
            avg_latency_ms,
            loss_percent,
            sent,
            received,
        }
    }
}

impl fmt::Display for HealthSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} replies, {:.1}% loss, {:.1} ms avg",
            self.received, self.sent, self.loss_percent, self.avg_latency_ms
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub max_latency_ms: f64,
    pub max_loss_percent: f64,
}

impl From<&ProbeConfig> for Thresholds {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            max_latency_ms: config.max_latency_ms,
            max_loss_percent: config.max_loss_percent,
        }
    }
}

impl Thresholds {
    pub fn classify(&self, sample: &HealthSample) -> HealthVerdict {
        if is_unhealthy(
            sample.avg_latency_ms,
            sample.loss_percent,
            self.max_latency_ms,
            self.max_loss_percent,
        ) {
            HealthVerdict::Unhealthy
        } else {
            HealthVerdict::Healthy
        }
    }
}

/// Reaching either threshold is enough.
pub fn is_unhealthy(latency_ms: f64, loss_percent: f64, max_latency_ms: f64, max_loss_percent: f64) -> bool {
    latency_ms >= max_latency_ms || loss_percent >= max_loss_percent
}

/// Probes the configured target and classifies the result.
pub struct HealthMonitor {
    config: ProbeConfig,
    prober: Arc<dyn Prober>,
}

impl HealthMonitor {
    pub fn new(config: ProbeConfig, prober: Arc<dyn Prober>) -> Self {
        Self { config, prober }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from(&self.config)
    }

    /// Run one probe batch.
    pub async fn sample(&self) -> Result<HealthSample, ProbeError> {
        let timeout = self.config.timeout();
        debug!(
            target = %self.config.target,
            count = self.config.count,
            size = self.config.size,
            "probing primary uplink"
        );

        let batch = self
            .prober
            .probe(&self.config.target, self.config.size, self.config.count, timeout)
            .await
            .inspect_err(|e| warn!(target = %self.config.target, error = %e, "probe failed"))?;

        Ok(HealthSample::from_batch(&batch, timeout.as_secs_f64() * 1000.0))
    }

    /// Sample and classify.
    pub async fn check(&self) -> Result<(HealthSample, HealthVerdict), ProbeError> {
        let sample = self.sample().await?;
        let verdict = self.thresholds().classify(&sample);
        match verdict {
            HealthVerdict::Healthy => info!(target = %self.config.target, %sample, "uplink healthy"),
            HealthVerdict::Unhealthy => warn!(
                target = %self.config.target,
                %sample,
                max_latency_ms = self.config.max_latency_ms,
                max_loss_percent = self.config.max_loss_percent,
                "uplink unhealthy"
            ),
        }
        Ok((sample, verdict))
    }
}

use std::time::Duration;

use anyhow::Result;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Per-run counters, written out as a Prometheus text file when requested.
#[derive(Clone)]
pub struct RunMetrics {
    registry: Registry,
    stage_outcomes: IntCounterVec,
    request_duration: HistogramVec,
}

impl RunMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let stage_outcomes = IntCounterVec::new(
            Opts::new(
                "qa_verify_stage_outcomes_total",
                "Scenario stages grouped by outcome",
            ),
            &["stage", "outcome"],
        )?;
        registry.register(Box::new(stage_outcomes.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "qa_verify_request_duration_seconds",
                "Round-trip time of scenario API calls",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["stage"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            stage_outcomes,
            request_duration,
        })
    }

    pub fn stage_outcome(&self, stage: &str, outcome: &str) {
        self.stage_outcomes.with_label_values(&[stage, outcome]).inc();
    }

    pub fn observe_request(&self, stage: &str, elapsed: Duration) {
        self.request_duration
            .with_label_values(&[stage])
            .observe(elapsed.as_secs_f64());
    }

    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

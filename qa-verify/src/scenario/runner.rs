use serde::Serialize;
use tracing::{info, warn};

use super::{RunState, ScenarioError, Stage, Verdict};
use crate::client::ApiClient;
use crate::config::ScenarioConfig;
use crate::metrics::RunMetrics;
use crate::report::Reporter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Aborted { stage: &'static str },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub stage: &'static str,
    pub status: u16,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub steps: Vec<StepRecord>,
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Drives an ordered list of stages against one API, strictly one call at a time.
pub struct ScenarioRunner {
    client: ApiClient,
    config: ScenarioConfig,
    stages: Vec<Stage>,
    metrics: RunMetrics,
}

impl ScenarioRunner {
    pub fn new(
        client: ApiClient,
        config: ScenarioConfig,
        stages: Vec<Stage>,
        metrics: RunMetrics,
    ) -> Self {
        Self {
            client,
            config,
            stages,
            metrics,
        }
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Runs every stage in order until one aborts.
    ///
    /// Aborts are a normal result. Only transport failures and stages whose
    /// prerequisites were never recorded come back as `Err`.
    pub async fn run(&self, report: &mut Reporter) -> Result<RunSummary, ScenarioError> {
        let mut state = RunState::default();
        let mut steps = Vec::with_capacity(self.stages.len());
        report.info("Starting E2E Verification");

        for stage in &self.stages {
            let call = (stage.prepare)(&self.config, &mut state, report)?;
            let token = if call.authenticated {
                Some(state.token.clone().ok_or(ScenarioError::MissingState {
                    stage: stage.name,
                    missing: "session token",
                })?)
            } else {
                None
            };
            let headers: Vec<(&str, String)> = call
                .headers
                .iter()
                .map(|(name, value)| (*name, value.clone()))
                .collect();

            let response = self
                .client
                .send(
                    call.method.clone(),
                    &call.path,
                    call.body.as_ref(),
                    token.as_deref(),
                    &headers,
                )
                .await?;
            self.metrics.observe_request(stage.name, response.elapsed);

            let verdict = (stage.evaluate)(&self.config, &response, &mut state, report);
            self.metrics.stage_outcome(stage.name, verdict.as_str());
            steps.push(StepRecord {
                stage: stage.name,
                status: response.status.as_u16(),
                verdict,
            });

            if verdict == Verdict::Abort {
                warn!(stage = stage.name, status = response.status.as_u16(), "scenario aborted");
                return Ok(RunSummary {
                    outcome: RunOutcome::Aborted { stage: stage.name },
                    steps,
                    passed: report.passed(),
                    failed: report.failed(),
                });
            }
        }

        report.info("E2E Verification Complete");
        info!(stages = steps.len(), "scenario completed");
        Ok(RunSummary {
            outcome: RunOutcome::Completed,
            steps,
            passed: report.passed(),
            failed: report.failed(),
        })
    }
}

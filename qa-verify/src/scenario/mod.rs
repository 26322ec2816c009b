//! Linear, stateful API scenario.
//!
//! A scenario is an ordered list of [`Stage`] descriptors. Each stage builds
//! one [`Call`] from the configuration and the state gathered so far, then
//! judges the response. The first stage that returns [`Verdict::Abort`] ends
//! the run; nothing created before that point is cleaned up.

pub mod runner;
pub mod stages;

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::client::{ApiResponse, ClientError};
use crate::config::ScenarioConfig;
use crate::quantity::Quantity;
use crate::report::Reporter;

pub use runner::{RunOutcome, RunSummary, ScenarioRunner, StepRecord};
pub use stages::inventory_fulfillment_stages;

pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("stage '{stage}' requires {missing} from an earlier stage")]
    MissingState {
        stage: &'static str,
        missing: &'static str,
    },
}

/// Server-owned identifier, either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntityId(Value);

impl EntityId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(_) => Some(Self(value.clone())),
            Value::String(s) if !s.is_empty() => Some(Self(value.clone())),
            _ => None,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Loose comparison against another JSON scalar: `7` matches `"7"`.
    pub fn matches(&self, other: &Value) -> bool {
        EntityId::from_value(other).is_some_and(|other| other.to_string() == self.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Reserved quantity per product in the configured warehouse.
pub type ReservedSnapshot = BTreeMap<i64, Quantity>;

/// State threaded from stage to stage for the lifetime of one run.
#[derive(Debug, Default)]
pub struct RunState {
    pub token: Option<String>,
    pub request_id: Option<EntityId>,
    pub task_id: Option<EntityId>,
    pub idempotency_key: Option<String>,
    pub reserve_payload: Option<Value>,
    pub reserve_result: Option<Value>,
    pub reserved_baseline: Option<ReservedSnapshot>,
    pub reserved_after_reserve: Option<ReservedSnapshot>,
    pub reserved_after_replay: Option<ReservedSnapshot>,
}

impl RunState {
    pub fn request_id(&self, stage: &'static str) -> Result<&EntityId, ScenarioError> {
        self.request_id.as_ref().ok_or(ScenarioError::MissingState {
            stage,
            missing: "request id",
        })
    }

    pub fn task_id(&self, stage: &'static str) -> Result<&EntityId, ScenarioError> {
        self.task_id.as_ref().ok_or(ScenarioError::MissingState {
            stage,
            missing: "task id",
        })
    }
}

/// One HTTP request a stage wants issued.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub authenticated: bool,
    pub headers: Vec<(&'static str, String)>,
}

impl Call {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            authenticated: true,
            headers: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(path)
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Continue,
    Abort,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Continue => "continue",
            Verdict::Abort => "abort",
        }
    }
}

pub type PrepareFn =
    fn(&ScenarioConfig, &mut RunState, &mut Reporter) -> Result<Call, ScenarioError>;
pub type EvaluateFn = fn(&ScenarioConfig, &ApiResponse, &mut RunState, &mut Reporter) -> Verdict;

/// Named step of a scenario: how to build its request and how to judge the reply.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub prepare: PrepareFn,
    pub evaluate: EvaluateFn,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

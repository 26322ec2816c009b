use anyhow::{anyhow, Context, Result};
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::env;

use crate::quantity::Quantity;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5119/api";

/// One product line on the inventory request being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLine {
    pub product_id: i64,
    pub qty_requested: Quantity,
}

/// One line of the fulfillment reserve movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReserveLine {
    pub product_id: i64,
    pub qty_delta_reserved: Quantity,
    pub qty_delta_on_hand: Quantity,
}

/// Everything the scenario needs to know about the target deployment.
///
/// Warehouse, department and product identifiers must already exist on the
/// server; the run never seeds them. Request and reserve lines are fixture
/// data and are not overridable.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioConfig {
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub warehouse_id: i64,
    pub department_id: i64,
    pub request_lines: Vec<RequestLine>,
    pub reserve_lines: Vec<ReserveLine>,
    pub notes: String,
    pub approve_notes: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: "admin".to_string(),
            password: "admin123".to_string(),
            warehouse_id: 1,
            department_id: 1,
            request_lines: vec![RequestLine {
                product_id: 1,
                qty_requested: BigDecimal::from(10),
            }],
            reserve_lines: vec![ReserveLine {
                product_id: 1,
                qty_delta_reserved: BigDecimal::from(5),
                qty_delta_on_hand: BigDecimal::from(0),
            }],
            notes: "E2E Test".to_string(),
            approve_notes: "QA Approved".to_string(),
        }
    }
}

impl ScenarioConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Reserved quantity the reserve call is expected to add, per product.
    pub fn expected_reserved_delta(&self, product_id: i64) -> Quantity {
        self.reserve_lines
            .iter()
            .filter(|line| line.product_id == product_id)
            .fold(BigDecimal::from(0), |total, line| total + &line.qty_delta_reserved)
    }
}

pub fn load_scenario_config() -> Result<ScenarioConfig> {
    let defaults = ScenarioConfig::default();

    let base_url = env::var("QA_BASE_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.base_url);
    let username = env::var("QA_USERNAME")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.username);
    let password = env::var("QA_PASSWORD").unwrap_or(defaults.password);

    let warehouse_id = env::var("QA_WAREHOUSE_ID")
        .ok()
        .map(|value| parse_id(&value))
        .transpose()
        .context("Failed to parse QA_WAREHOUSE_ID")?
        .unwrap_or(defaults.warehouse_id);
    let department_id = env::var("QA_DEPARTMENT_ID")
        .ok()
        .map(|value| parse_id(&value))
        .transpose()
        .context("Failed to parse QA_DEPARTMENT_ID")?
        .unwrap_or(defaults.department_id);

    let notes = env::var("QA_NOTES").unwrap_or(defaults.notes);
    let approve_notes = env::var("QA_APPROVE_NOTES").unwrap_or(defaults.approve_notes);

    Ok(ScenarioConfig {
        base_url,
        username,
        password,
        warehouse_id,
        department_id,
        request_lines: defaults.request_lines,
        reserve_lines: defaults.reserve_lines,
        notes,
        approve_notes,
    })
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_id(value: &str) -> Result<i64> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .map_err(|err| anyhow!("Invalid identifier '{trimmed}': {err}"))
}

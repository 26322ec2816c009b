pub mod client;
pub mod config;
pub mod metrics;
pub mod quantity;
pub mod report;
pub mod scenario;

pub use client::{ApiClient, ApiResponse, ClientError, ResponseBody};
pub use config::{load_scenario_config, ScenarioConfig};
pub use quantity::Quantity;
pub use scenario::{inventory_fulfillment_stages, RunOutcome, RunSummary, ScenarioRunner};

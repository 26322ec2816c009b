#![allow(dead_code)]

//! In-process stand-in for the inventory/workflow API, bound to an ephemeral
//! loopback port. Behaviour switches let tests drive each abort path.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const MOCK_TOKEN: &str = "mock-access-token";

#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub reject_login: bool,
    pub identity_fails: bool,
    pub no_tasks: bool,
    pub claim_conflict: bool,
    pub reserve_rejected: bool,
    /// Replays get the cached response but the delta is applied again.
    pub double_apply_on_replay: bool,
    /// Appends a task belonging to another request after ours.
    pub decoy_task: bool,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub behavior: MockBehavior,
    pub next_request_id: i64,
    pub next_task_id: i64,
    pub next_movement_id: i64,
    pub requests: HashMap<i64, MockRequest>,
    pub tasks: Vec<MockTask>,
    /// Serialized as JSON floats (`5.0`), like the server's decimal columns.
    pub reserved: HashMap<i64, f64>,
    pub idempotency: HashMap<String, (StatusCode, Value)>,
    pub reserve_calls: Vec<(Option<String>, Value)>,
    pub approvals: Vec<Value>,
    pub unauthorized_calls: usize,
}

#[derive(Debug, Clone)]
pub struct MockRequest {
    pub body: Value,
    pub submitted: bool,
    pub approved: bool,
}

#[derive(Debug, Clone)]
pub struct MockTask {
    pub id: i64,
    pub request_id: i64,
    pub claimed: bool,
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockApi {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: Shared,
}

impl MockApi {
    pub fn reserved_qty(&self, product_id: i64) -> f64 {
        self.state.lock().unwrap().reserved.get(&product_id).copied().unwrap_or(0.0)
    }

    pub fn reserve_calls(&self) -> Vec<(Option<String>, Value)> {
        self.state.lock().unwrap().reserve_calls.clone()
    }

    pub fn approvals(&self) -> Vec<Value> {
        self.state.lock().unwrap().approvals.clone()
    }

    pub fn unauthorized_calls(&self) -> usize {
        self.state.lock().unwrap().unauthorized_calls
    }

    pub fn tasks(&self) -> Vec<MockTask> {
        self.state.lock().unwrap().tasks.clone()
    }
}

pub async fn spawn_mock_api(behavior: MockBehavior) -> MockApi {
    let state: Shared = Arc::new(Mutex::new(MockState {
        behavior,
        next_request_id: 1001,
        next_task_id: 501,
        next_movement_id: 9001,
        ..MockState::default()
    }));

    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/inventory/requests", post(create_request))
        .route("/inventory/requests/:id", get(get_request))
        .route("/inventory/requests/:id/submit", post(submit_request))
        .route("/inventory/requests/:id/fulfillment-details", get(fulfillment_details))
        .route("/inventory/requests/:id/fulfillment/reserve", post(reserve))
        .route("/workflow/tasks/my", get(my_tasks))
        .route("/workflow/tasks/:id/claim", post(claim_task))
        .route("/workflow/tasks/:id/action", post(task_action))
        .route("/debug/echo", post(echo).get(echo))
        .route("/debug/plain", get(plain_text))
        .route("/debug/empty", get(empty_body))
        .route("/debug/teapot", get(teapot_json))
        .with_state(state.clone());
    let app = Router::new().nest("/api", api);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock api");
    let addr = listener.local_addr().expect("mock api addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock api");
    });

    MockApi {
        base_url: format!("http://{addr}/api"),
        addr,
        state,
    }
}

fn authorized(state: &Shared, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {MOCK_TOKEN}");
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        state.lock().unwrap().unauthorized_calls += 1;
    }
    ok
}

fn ok(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let reject = state.lock().unwrap().behavior.reject_login;
    let valid = body["username"] == "admin" && body["password"] == "admin123";
    if reject || !valid {
        return error(StatusCode::UNAUTHORIZED, "Invalid username or password.");
    }
    ok(json!({ "accessToken": MOCK_TOKEN, "refreshToken": "" }))
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.lock().unwrap().behavior.identity_fails {
        return StatusCode::NOT_FOUND.into_response();
    }
    ok(json!({ "userId": 1, "username": "admin", "displayName": "Administrator" }))
}

async fn create_request(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut guard = state.lock().unwrap();
    let id = guard.next_request_id;
    guard.next_request_id += 1;
    guard.requests.insert(
        id,
        MockRequest {
            body,
            submitted: false,
            approved: false,
        },
    );
    ok(json!(id))
}

async fn get_request(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let guard = state.lock().unwrap();
    match guard.requests.get(&id) {
        Some(req) => {
            let status = if req.approved {
                "FULFILLMENT"
            } else if req.submitted {
                "PENDING_APPROVAL"
            } else {
                "DRAFT"
            };
            ok(json!({ "requestId": id, "statusCode": status }))
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn submit_request(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut guard = state.lock().unwrap();
    let behavior = guard.behavior.clone();
    match guard.requests.get_mut(&id) {
        Some(req) => req.submitted = true,
        None => return StatusCode::NOT_FOUND.into_response(),
    }
    if !behavior.no_tasks {
        let task_id = guard.next_task_id;
        guard.next_task_id += 1;
        guard.tasks.push(MockTask {
            id: task_id,
            request_id: id,
            claimed: false,
        });
        if behavior.decoy_task {
            let decoy_id = guard.next_task_id;
            guard.next_task_id += 1;
            guard.tasks.push(MockTask {
                id: decoy_id,
                request_id: id + 500,
                claimed: false,
            });
        }
    }
    ok(json!(id))
}

async fn my_tasks(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let guard = state.lock().unwrap();
    let tasks: Vec<Value> = guard
        .tasks
        .iter()
        .map(|t| {
            let status = if t.claimed { "CLAIMED" } else { "AVAILABLE" };
            json!({
                "id": t.id,
                "workflowTaskId": t.id,
                "requestId": t.request_id,
                "status": status,
            })
        })
        .collect();
    let total = tasks.len();
    (
        StatusCode::OK,
        Json(json!({ "data": tasks, "pageNumber": 1, "pageSize": 10, "totalRecords": total })),
    )
        .into_response()
}

async fn claim_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut guard = state.lock().unwrap();
    let conflict = guard.behavior.claim_conflict;
    let Some(task) = guard.tasks.iter_mut().find(|t| t.id == id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if conflict || task.claimed {
        return error(StatusCode::CONFLICT, "Task is already claimed.");
    }
    task.claimed = true;
    ok(json!("Task claimed successfully."))
}

async fn task_action(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut guard = state.lock().unwrap();
    let Some(task) = guard.tasks.iter().find(|t| t.id == id).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !task.claimed || body["actionCode"] != "APPROVE" {
        return error(StatusCode::CONFLICT, "Task must be claimed before acting.");
    }
    guard.tasks.retain(|t| t.id != id);
    if let Some(req) = guard.requests.get_mut(&task.request_id) {
        req.approved = true;
    }
    guard.approvals.push(body);
    ok(json!("Action processed."))
}

async fn fulfillment_details(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let guard = state.lock().unwrap();
    let Some(req) = guard.requests.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let warehouse_id = req.body["warehouseId"].as_i64().unwrap_or(1);
    let lines: Vec<Value> = req.body["lines"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|line| {
            let product_id = line["productId"].as_i64().unwrap_or_default();
            let reserved = guard.reserved.get(&product_id).copied().unwrap_or(0.0);
            json!({
                "productId": product_id,
                "qtyRequested": line["qtyRequested"],
                "stock": [
                    { "warehouseId": warehouse_id + 1, "onHandQty": 40.0, "reservedQty": 3.0 },
                    { "warehouseId": warehouse_id, "onHandQty": 100.0, "reservedQty": reserved },
                ],
            })
        })
        .collect();
    ok(json!({ "requestId": id, "warehouseId": warehouse_id, "lines": lines }))
}

async fn reserve(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let key = headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut guard = state.lock().unwrap();
    guard.reserve_calls.push((key.clone(), body.clone()));

    let approved = guard.requests.get(&id).is_some_and(|r| r.approved);
    if guard.behavior.reserve_rejected || !approved {
        return error(StatusCode::BAD_REQUEST, "Request is not in a fulfillment step.");
    }
    let Some(key) = key else {
        return error(
            StatusCode::BAD_REQUEST,
            "X-Idempotency-Key header is required for fulfillment operations.",
        );
    };

    let cached = guard.idempotency.get(&key).cloned();
    if cached.is_none() || guard.behavior.double_apply_on_replay {
        for line in body["lines"].as_array().cloned().unwrap_or_default() {
            let product_id = line["productId"].as_i64().unwrap_or_default();
            let delta = line["qtyDeltaReserved"].as_f64().unwrap_or_default();
            *guard.reserved.entry(product_id).or_insert(0.0) += delta;
        }
    }
    if let Some((status, cached_body)) = cached {
        return (status, Json(cached_body)).into_response();
    }

    let movement_id = guard.next_movement_id;
    guard.next_movement_id += 1;
    let response = json!({ "success": true, "data": movement_id });
    guard.idempotency.insert(key, (StatusCode::OK, response.clone()));
    (StatusCode::OK, Json(response)).into_response()
}

async fn echo(headers: HeaderMap, body: String) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    (
        StatusCode::OK,
        Json(json!({
            "authorization": header("authorization"),
            "contentType": header("content-type"),
            "idempotencyKey": header("x-idempotency-key"),
            "body": body,
        })),
    )
        .into_response()
}

async fn plain_text() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid origin.").into_response()
}

async fn empty_body() -> Response {
    StatusCode::OK.into_response()
}

async fn teapot_json() -> Response {
    error(StatusCode::IM_A_TEAPOT, "short and stout")
}

/// In-memory sink standing in for stdout.
#[derive(Clone, Default)]
pub struct Captured(pub Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).lines().map(str::to_string).collect()
    }
}

impl Write for Captured {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

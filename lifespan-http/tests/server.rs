use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use lifespan::{
    AddScopedServiceExt as _, App, AppBuilder, Release, Scope, ScopedService, Service, StdError,
};
use lifespan_base::test::FreePort;
use lifespan_base::{CancellationToken, Config, RunDaemonsExt as _};
use lifespan_http::{
    AddRouterExt as _, HttpServerConfig, HttpServerPlugin, Json, Router, RouterBuilder, Scoped,
    routing,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde_json::{Value, json};

static GREETINGS_BUILT: AtomicUsize = AtomicUsize::new(0);
static GREETINGS_RELEASED: AtomicUsize = AtomicUsize::new(0);
static TICKETS_RELEASED: AtomicUsize = AtomicUsize::new(0);

struct Greeting {
    number: usize,
}

impl Release for Greeting {
    fn release(&self) {
        GREETINGS_RELEASED.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScopedService for Greeting {
    type Handle = Arc<Self>;

    async fn build(_scope: &Scope) -> Result<Self::Handle, StdError> {
        let number = GREETINGS_BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Self { number }))
    }

    fn release(handle: &Self::Handle) {
        Release::release(&**handle);
    }
}

struct Ticket;

impl ScopedService for Ticket {
    type Handle = Arc<Self>;

    async fn build(_scope: &Scope) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }

    fn release(_handle: &Self::Handle) {
        TICKETS_RELEASED.fetch_add(1, Ordering::SeqCst);
    }
}

struct Unbound;

struct GreetingRouter;

impl Service for GreetingRouter {
    type Handle = Arc<Self>;

    async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

impl RouterBuilder for GreetingRouter {
    fn build_router(self: Arc<Self>, _app: &App) -> Router {
        Router::new()
            .route("/ready", routing::get(|| async { StatusCode::OK }))
            .route("/greeting", routing::get(greeting))
            .route("/unbound", routing::get(unbound))
            .route("/ticket/fail", routing::get(failing_ticket))
            .route("/ticket/panic", routing::get(panicking_ticket))
    }
}

async fn greeting(
    Scoped(first): Scoped<Arc<Greeting>>,
    Scoped(second): Scoped<Arc<Greeting>>,
) -> Json<Value> {
    Json(json!({
        "number": first.number,
        "same": Arc::ptr_eq(&first, &second),
    }))
}

async fn unbound(Scoped(_unbound): Scoped<Arc<Unbound>>) -> StatusCode {
    StatusCode::OK
}

async fn failing_ticket(Scoped(_ticket): Scoped<Arc<Ticket>>) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn panicking_ticket(Scoped(_ticket): Scoped<Arc<Ticket>>) -> StatusCode {
    panic!("handler failed");
}

async fn start_server(port: &FreePort) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let app = App::builder()
        .add_plugin(HttpServerPlugin)
        .add_router::<GreetingRouter>()
        .add_scoped_service::<Greeting>()
        .add_scoped_service::<Ticket>()
        .add_component(Config::new().with(
            "http_server",
            HttpServerConfig {
                addr: port.as_addr(),
            },
        ))
        .build()
        .await
        .unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            app.run_daemons(shutdown).await.unwrap();
        }
    });
    (shutdown, task)
}

async fn wait_ready(base_url: &str) {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(5);
    let client: ClientWithMiddleware = ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();
    let response = client
        .get(format!("{base_url}/ready"))
        .send()
        .await
        .expect("Server is not ready");
    assert_eq!(response.status(), 200);
}

async fn wait_for(counter: &AtomicUsize, expected: usize) -> usize {
    for _ in 0..50 {
        if counter.load(Ordering::SeqCst) >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    counter.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_scopes() {
    let port = FreePort::new();
    let (shutdown, task) = start_server(&port).await;
    let base_url = format!("http://{}", port.as_addr());
    wait_ready(&base_url).await;
    let client = reqwest::Client::new();

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let response = client
            .get(format!("{base_url}/greeting"))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.expect("Failed to read body");
        assert_eq!(body["same"], json!(true));
        numbers.push(body["number"].as_u64().unwrap());
    }
    numbers.dedup();
    assert_eq!(numbers.len(), 3);
    assert_eq!(GREETINGS_BUILT.load(Ordering::SeqCst), 3);
    assert_eq!(wait_for(&GREETINGS_RELEASED, 3).await, 3);

    let response = client
        .get(format!("{base_url}/unbound"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.expect("Failed to read body");
    assert_eq!(body["kind"], json!("configuration"));
    assert!(body["message"].as_str().unwrap().contains("Unbound"));

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_release_on_failure() {
    let port = FreePort::new();
    let (shutdown, task) = start_server(&port).await;
    let base_url = format!("http://{}", port.as_addr());
    wait_ready(&base_url).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base_url}/ticket/fail"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 500);
    assert_eq!(wait_for(&TICKETS_RELEASED, 1).await, 1);

    let response = client
        .get(format!("{base_url}/ticket/panic"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.expect("Failed to read body");
    assert_eq!(body, json!({"kind": "panic", "message": "handler failed"}));
    assert_eq!(wait_for(&TICKETS_RELEASED, 2).await, 2);

    let response = client
        .get(format!("{base_url}/ready"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}

#[tokio::test]
async fn test_plugin_requires_config() {
    let result = App::builder()
        .add_plugin(HttpServerPlugin)
        .add_router::<GreetingRouter>()
        .build()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_has_router() {
    let mut builder = App::builder();
    assert!(!builder.has_router::<GreetingRouter>());
    builder.add_router::<GreetingRouter>();
    assert!(builder.has_router::<GreetingRouter>());
}

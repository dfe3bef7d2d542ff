use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::{HeaderValue, StatusCode};
use rpcox_jsonrpc::{
    Context, Instance, MethodError, Params, Redirect, ResponseHeaders, RichValue, Server, ServiceDef,
};

/// Number of `TestService` instances built so far, across all tests in the binary
pub static TEST_SERVICE_INSTANCES: AtomicUsize = AtomicUsize::new(0);

/// The service behind `/rpc/test`.  Its behavior matches the expectations in the `testdata/`
/// folder, so it can be used to exercise the whole stack end to end.
pub struct TestService {
    caller: Option<String>,
}

impl TestService {
    fn new(cx: &rpcox_jsonrpc::RequestContext) -> Self {
        TEST_SERVICE_INSTANCES.fetch_add(1, Ordering::SeqCst);
        Self {
            caller: cx.header("x-caller").map(str::to_string),
        }
    }
}

/// The service behind `/rpc/test2`
pub struct TestService2;

pub fn test_service() -> ServiceDef<TestService> {
    ServiceDef::new("TestService", TestService::new)
        .method("hello", hello)
        .method("complex", complex)
        .method("echo", echo)
        .method("add", add)
        .method("greet", greet)
        .method("whoami", whoami)
        .method("path", path)
        .method("setCookie", set_cookie)
        .method("fail", fail)
        .method("failMessage", fail_message)
        .method("failInternal", fail_internal)
        .method("panic", panic)
}

pub fn test_service2() -> ServiceDef<TestService2> {
    ServiceDef::new("TestService2", |_| TestService2).method("redir", redir)
}

/// A server with the test services at `/rpc/test` and `/rpc/test2`
pub fn test_server() -> Server {
    Server::builder()
        .with_base_path("/rpc")
        .with_service("/test", test_service())
        .and_then(|builder| builder.with_service("/test2", test_service2()))
        .expect("test routes are distinct")
        .build()
}

async fn hello(Params((name,)): Params<(String,)>) -> String {
    format!("Hello {name}!")
}

async fn complex() -> BTreeSet<i64> {
    BTreeSet::from([1, 2, 3])
}

async fn echo(Params(params): Params<Vec<RichValue>>) -> RichValue {
    params.into_iter().next().unwrap_or(RichValue::Undefined)
}

async fn add(Params((a, b)): Params<(i64, i64)>) -> i64 {
    a + b
}

/// Optional second parameter, so callers can leave it off
async fn greet(Params((name, greeting)): Params<(String, Option<String>)>) -> String {
    format!("{}, {name}!", greeting.as_deref().unwrap_or("Hi"))
}

async fn whoami(Instance(svc): Instance<TestService>) -> Option<String> {
    svc.caller.clone()
}

async fn path(Context(cx): Context) -> String {
    cx.path().to_string()
}

async fn set_cookie(headers: ResponseHeaders) {
    headers.insert(http::header::SET_COOKIE, HeaderValue::from_static("session=abc"));
}

async fn fail() -> Result<String, MethodError> {
    Err(MethodError::rpc(42, "Custom failure").with_status(StatusCode::BAD_REQUEST))
}

async fn fail_message() -> Result<String, MethodError> {
    Err(MethodError::rpc(-32000, "Something went wrong"))
}

async fn fail_internal() -> anyhow::Result<String> {
    Err(anyhow::anyhow!("secret database password is hunter2"))
}

async fn panic() -> String {
    panic!("method panicked")
}

async fn redir() -> Redirect {
    Redirect::moved_permanently("/neo/profile")
}

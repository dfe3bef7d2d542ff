//! Two small services hosted on a local port, and a client calling them over HTTP.
//!
//! Run with `RUST_LOG=debug` to see each call being dispatched.
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rpcox::{
    HttpTransport, Instance, Params, Redirect, RequestContext, RpcClients, RpcHost, Server, ServiceDef,
    rpc_client,
};
use tokio::net::TcpListener;

/// Greets callers.  A fresh one is built for every call.
struct TestService {
    started: DateTime<Utc>,
}

impl TestService {
    fn new(_cx: &RequestContext) -> Self {
        Self { started: Utc::now() }
    }
}

struct TestService2;

rpc_client! {
    /// Client for `TestService`
    struct TestClient {
        fn hello(name: String) -> String;
        fn complex() -> BTreeSet<i64>;
        fn started() -> DateTime<Utc>;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let server = Server::builder()
        .with_base_path("/rpc")
        .with_service(
            "/test",
            ServiceDef::new("TestService", TestService::new)
                .method("hello", |Params((name,)): Params<(String,)>| async move {
                    format!("Hello {name}!")
                })
                .method("complex", || async { BTreeSet::from([1i64, 2, 3]) })
                .method("started", |Instance(svc): Instance<TestService>| async move { svc.started }),
        )?
        .with_service(
            "/test2",
            ServiceDef::new("TestService2", |_| TestService2)
                .method("redir", || async { Redirect::moved_permanently("/neo/profile") }),
        )?
        .build();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(RpcHost::new(server).serve(listener));

    let clients = RpcClients::with_transport(format!("http://{addr}/rpc"), HttpTransport::new()?);
    let test = TestClient::new(clients.service("Test"));

    println!("hello: {}", test.hello("world".into()).await?);
    println!("complex: {:?}", test.complex().await?);
    println!("started: {}", test.started().await?);

    match clients.service("Test2").invoke("redir", vec![]).await {
        Ok(value) => println!("redir: {value:?}"),
        Err(e) => println!("redir: {e} ({:?})", e.code),
    }

    Ok(())
}

//! Serve over a real socket and talk to it with a plain HTTP client.
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use rpcox_jsonrpc::{Params, Redirect, Server, ServiceDef};
use rpcox_server::{HostConfig, RpcHost};
use serde_json::{Value as JsonValue, json};
use tokio::net::TcpListener;

#[path = "../../rpcox-jsonrpc/src/testing.rs"]
mod test_helpers;

struct Greeter;

fn server() -> Server {
    Server::builder()
        .with_base_path("/rpc")
        .with_service(
            "/greeter",
            ServiceDef::new("GreeterService", |_| Greeter)
                .method("hello", |Params((name,)): Params<(String,)>| async move {
                    format!("Hello {name}!")
                })
                .method("away", || async { Redirect::found("/elsewhere") }),
        )
        .unwrap()
        .build()
}

async fn start(host: RpcHost) -> SocketAddr {
    test_helpers::init_test_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(host.serve(listener));
    addr
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn serves_calls() {
    let addr = start(RpcHost::new(server())).await;

    let response = http_client()
        .post(format!("http://{addr}/rpc/greeter"))
        .header("content-type", "application/json")
        .body(json!({"jsonrpc": "2.0", "id": 1, "method": "hello", "params": ["Ann"]}).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-rpc"], "1");
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body, json!({"jsonrpc": "2.0", "id": 1, "result": "Hello Ann!"}));
}

#[tokio::test]
async fn redirects_are_passed_through() {
    let addr = start(RpcHost::new(server())).await;

    let response = http_client()
        .post(format!("http://{addr}/rpc/greeter"))
        .body(json!({"jsonrpc": "2.0", "id": 1, "method": "away", "params": []}).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/elsewhere");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn other_paths_go_to_the_fallback() {
    let addr = start(RpcHost::new(server())).await;
    let response = http_client().get(format!("http://{addr}/index.html")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Not Found.");

    let host = RpcHost::new(server()).with_fallback(|request| async move {
        Response::new(Full::new(Bytes::from(format!("page at {}", request.uri().path()))))
    });
    let addr = start(host).await;
    let response = http_client().get(format!("http://{addr}/index.html")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "page at /index.html");

    // RPC routes still go to the server, even with a method the fallback would have accepted
    let response = http_client().get(format!("http://{addr}/rpc/greeter")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bind_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = HostConfig {
        bind_addr: listener.local_addr().unwrap(),
    };
    assert!(RpcHost::bind(&config).await.is_err());
    assert_eq!(HostConfig::default().bind_addr.port(), 3000);
}

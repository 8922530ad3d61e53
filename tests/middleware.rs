use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tor_exit_block::{tor_block, Config, TorBlock};

fn exit_document(addresses: &[&str]) -> String {
    addresses
        .iter()
        .enumerate()
        .map(|(i, ip)| {
            format!(
                "ExitNode RELAY{i:040}\n\
                 Published 2024-05-01 10:00:00\n\
                 LastStatus 2024-05-01 11:00:00\n\
                 ExitAddress {ip} 2024-05-01 11:30:00\n"
            )
        })
        .collect()
}

async fn spawn_list_server(document: String) -> SocketAddr {
    let app = Router::new().route(
        "/exit-addresses",
        get(move || {
            let document = document.clone();
            async move { document }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_guarded_app(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

fn guard_for(list_addr: SocketAddr) -> TorBlock {
    let config = Config {
        exit_address_url: format!("http://{list_addr}/exit-addresses"),
        timeout_ms: 5_000,
        ..Config::default()
    };
    config.validate().unwrap();
    TorBlock::new(config).unwrap()
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_listed_caller_is_rejected() {
    let list_addr = spawn_list_server(exit_document(&["10.0.0.1", "127.0.0.1"])).await;
    let guard = guard_for(list_addr);

    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .layer(guard.layer());
    let app_addr = spawn_guarded_app(app).await;

    let resp = client()
        .get(format!("http://{app_addr}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "Bad Host");

    let list = guard.current_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.find("127.0.0.1").unwrap().exit_node_id, format!("RELAY{:040}", 1));
}

#[tokio::test]
async fn test_unlisted_caller_is_served() {
    let list_addr = spawn_list_server(exit_document(&["10.0.0.1", "10.0.0.2"])).await;
    let guard = guard_for(list_addr);

    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .layer(axum::middleware::from_fn_with_state(guard.clone(), tor_block));
    let app_addr = spawn_guarded_app(app).await;

    let resp = client()
        .get(format!("http://{app_addr}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "hello");
    assert_eq!(guard.current_list().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreachable_list_fails_open() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let guard = guard_for(dead_addr);
    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .layer(guard.layer());
    let app_addr = spawn_guarded_app(app).await;

    let resp = client()
        .get(format!("http://{app_addr}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(guard.current_list().is_none());
}

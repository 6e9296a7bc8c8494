//! End-to-end failover exercise against an in-process inventory server.
//!
//! Drives a real `InventoryClient` through the full lifecycle: discovery via
//! a stub name directory, streaming and unary RPCs, loss of the server,
//! re-registration at a new port, and transparent reconnection on the next
//! call.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use inventory_client::{ClientConfig, ClientError, ConnectionState, InventoryClient};
use inventory_protocol::inventory_service_server::{InventoryService, InventoryServiceServer};
use inventory_protocol::{Empty, InventoryOperationRequest, InventoryOperationResponse, Item};

fn sample_items() -> Vec<Item> {
    vec![
        Item {
            item_code: "SKU-001".to_string(),
            name: "Widget".to_string(),
            quantity: 40,
            price: 9.99,
        },
        Item {
            item_code: "SKU-002".to_string(),
            name: "Sprocket".to_string(),
            quantity: 12,
            price: 24.50,
        },
    ]
}

/// Minimal in-process inventory service.
struct StubInventory {
    label: &'static str,
}

#[tonic::async_trait]
impl InventoryService for StubInventory {
    type GetInventoryStream = tokio_stream::Iter<std::vec::IntoIter<Result<Item, Status>>>;

    async fn get_inventory(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::GetInventoryStream>, Status> {
        let items: Vec<Result<Item, Status>> = sample_items().into_iter().map(Ok).collect();
        Ok(Response::new(tokio_stream::iter(items)))
    }

    async fn update_inventory(
        &self,
        request: Request<InventoryOperationRequest>,
    ) -> Result<Response<InventoryOperationResponse>, Status> {
        let op = request.into_inner();
        Ok(Response::new(InventoryOperationResponse {
            status: format!("{}: updated {} by {}", self.label, op.item_code, op.quantity),
        }))
    }

    async fn order_item(
        &self,
        request: Request<InventoryOperationRequest>,
    ) -> Result<Response<InventoryOperationResponse>, Status> {
        let op = request.into_inner();
        if op.order_id == 0 {
            return Err(Status::invalid_argument("missing order id"));
        }
        Ok(Response::new(InventoryOperationResponse {
            status: format!("{}: order {} accepted", self.label, op.order_id),
        }))
    }
}

/// Start an inventory server on an ephemeral port. Returns the port and a
/// shutdown trigger.
async fn spawn_inventory_server(label: &'static str) -> (u16, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(InventoryServiceServer::new(StubInventory { label }))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (port, shutdown_tx)
}

/// Stub name directory speaking just enough etcd v2 HTTP for the resolver.
///
/// Every lookup is answered with the port currently stored in the shared
/// atomic, so a test can "re-register" the service by storing a new port.
async fn spawn_registry(service_port: Arc<AtomicU16>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let port = service_port.load(Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let value = format!(r#"{{"ip": "127.0.0.1", "port": {port}}}"#);
                let body = serde_json::json!({ "node": { "value": value } }).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            });
        }
    });

    base
}

fn test_config(registry_url: String, counter_path: std::path::PathBuf) -> ClientConfig {
    ClientConfig {
        registry_url,
        counter_path,
        // Short backoff keeps the failover scenario fast.
        reconnect_backoff: std::time::Duration::from_millis(100),
        ..ClientConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_lifecycle_with_failover() {
    let dir = tempfile::tempdir().unwrap();
    let counter_path = dir.path().join("order-id.counter");

    let (port_a, shutdown_a) = spawn_inventory_server("server-a").await;
    let service_port = Arc::new(AtomicU16::new(port_a));
    let registry_url = spawn_registry(Arc::clone(&service_port)).await;

    let client = InventoryClient::connect(test_config(registry_url, counter_path)).unwrap();

    // Discovery plus first connection, then a streamed inventory fetch.
    let items = client.get_inventory().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].item_code, "SKU-001");
    assert_eq!(client.state().await, ConnectionState::Ready);

    // First order mints identifier 1.
    let confirmation = client.place_order("SKU-001", 3).await.unwrap();
    assert_eq!(confirmation.order_id, 1);
    assert!(confirmation.status.contains("server-a"));
    assert!(confirmation.status.contains("order 1"));

    // The service goes away mid-session.
    shutdown_a.send(()).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // The failed call surfaces to the caller and degrades the connection;
    // nothing is retried on its behalf.
    let err = client.update_inventory("SKU-002", 5).await.unwrap_err();
    assert!(matches!(err, ClientError::RpcStatus(_)));
    assert_eq!(client.state().await, ConnectionState::Degraded);

    // The service comes back elsewhere and re-registers.
    let (port_b, shutdown_b) = spawn_inventory_server("server-b").await;
    service_port.store(port_b, Ordering::SeqCst);

    // Next call re-resolves and reconnects on its own; the order identifier
    // keeps counting from the durable file.
    let confirmation = client.place_order("SKU-002", 1).await.unwrap();
    assert_eq!(confirmation.order_id, 2);
    assert!(confirmation.status.contains("server-b"));
    assert_eq!(client.state().await, ConnectionState::Ready);

    // Unary updates keep working on the re-established channel.
    let status = client.update_inventory("SKU-001", -4).await.unwrap();
    assert!(status.contains("updated SKU-001 by -4"));
    assert_eq!(client.state().await, ConnectionState::Ready);

    client.shutdown().await;
    assert!(matches!(
        client.get_inventory().await,
        Err(ClientError::SupervisorClosed)
    ));

    shutdown_b.send(()).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_order_ids_survive_client_restart() {
    let dir = tempfile::tempdir().unwrap();
    let counter_path = dir.path().join("order-id.counter");

    let (port, shutdown) = spawn_inventory_server("server").await;
    let service_port = Arc::new(AtomicU16::new(port));
    let registry_url = spawn_registry(Arc::clone(&service_port)).await;

    let first = InventoryClient::connect(test_config(
        registry_url.clone(),
        counter_path.clone(),
    ))
    .unwrap();
    assert_eq!(first.place_order("SKU-001", 1).await.unwrap().order_id, 1);
    assert_eq!(first.place_order("SKU-001", 1).await.unwrap().order_id, 2);
    first.shutdown().await;

    // A fresh client over the same counter file resumes, never reuses.
    let second = InventoryClient::connect(test_config(registry_url, counter_path)).unwrap();
    assert_eq!(second.place_order("SKU-001", 1).await.unwrap().order_id, 3);
    second.shutdown().await;

    shutdown.send(()).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streaming_handle_is_caller_owned() {
    let dir = tempfile::tempdir().unwrap();

    let (port, shutdown) = spawn_inventory_server("server").await;
    let service_port = Arc::new(AtomicU16::new(port));
    let registry_url = spawn_registry(Arc::clone(&service_port)).await;

    let client =
        InventoryClient::connect(test_config(registry_url, dir.path().join("counter"))).unwrap();

    let mut stream = client.stream_inventory().await.unwrap();
    let mut codes = Vec::new();
    while let Some(item) = stream.message().await.unwrap() {
        codes.push(item.item_code);
    }
    assert_eq!(codes, vec!["SKU-001", "SKU-002"]);

    client.shutdown().await;
    shutdown.send(()).unwrap();
}

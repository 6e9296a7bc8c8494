//! High-level inventory client facade.
//!
//! Wires the registry resolver, the gRPC connector, the connection
//! supervisor, and the durable order-id counter together behind one handle.
//! Every operation obtains a fresh [`ReadyHandle`] first, issues exactly one
//! RPC attempt on it, and reports transport-level failures back to the
//! supervisor so the next call reconnects. Failed RPCs are surfaced to the
//! caller, never replayed: an order that may have reached the server must not
//! be submitted twice.

use inventory_protocol::convert::OperationType;
use inventory_protocol::inventory_service_client::InventoryServiceClient;
use inventory_protocol::{Empty, InventoryOperationRequest, Item};
use tonic::transport::Channel;
use tonic::Code;

use crate::config::ClientConfig;
use crate::counter::DurableCounter;
use crate::error::{ClientError, Result};
use crate::resolver::RegistryResolver;
use crate::supervisor::{ConnectionState, ConnectionSupervisor, ReadyHandle};
use crate::transport::GrpcConnector;

/// Outcome of a successfully submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    /// Client-minted durable order identifier.
    pub order_id: u64,
    /// Server-reported status line.
    pub status: String,
}

/// Client for one named inventory service instance.
///
/// Construction is cheap; the first operation triggers discovery and
/// connection. All methods take `&self` and may be called concurrently.
pub struct InventoryClient {
    supervisor: ConnectionSupervisor<RegistryResolver, GrpcConnector>,
    counter: DurableCounter,
}

/// Whether a status code indicates the channel itself is bad, as opposed to
/// the server rejecting the request.
fn is_transport_code(code: Code) -> bool {
    matches!(code, Code::Unavailable | Code::Unknown)
}

impl InventoryClient {
    /// Build a client from configuration.
    ///
    /// Validates the registry URL eagerly but does not contact the directory:
    /// discovery runs lazily on the first operation.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let registry_url = config.validated_registry_url()?;
        tracing::info!(
            registry = %registry_url,
            service = %config.service_name,
            "Inventory client configured"
        );

        let supervisor = ConnectionSupervisor::new(
            RegistryResolver::new(registry_url),
            GrpcConnector::new(config.channel),
            config.service_name,
            config.reconnect_backoff,
        );

        Ok(Self {
            supervisor,
            counter: DurableCounter::new(config.counter_path),
        })
    }

    /// Current connection state (observational).
    pub async fn state(&self) -> ConnectionState {
        self.supervisor.state().await
    }

    /// Fetch the full inventory as a collected list.
    pub async fn get_inventory(&self) -> Result<Vec<Item>> {
        let handle = self.supervisor.ensure_ready().await?;
        let mut stream = match self.open_inventory_stream(&handle).await {
            Ok(stream) => stream,
            Err(status) => return Err(self.classify(&handle, status).await),
        };

        let mut items = Vec::new();
        loop {
            match stream.message().await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => break,
                // A stream cut mid-flight is a channel problem, not a
                // server-side rejection.
                Err(status) => return Err(self.classify(&handle, status).await),
            }
        }
        tracing::debug!(count = items.len(), "Inventory fetched");
        Ok(items)
    }

    /// Open the inventory as a raw server stream.
    ///
    /// The caller owns the stream; transport failures observed on it after
    /// this call returns surface on the stream itself and are not fed back
    /// into the supervisor.
    pub async fn stream_inventory(&self) -> Result<tonic::Streaming<Item>> {
        let handle = self.supervisor.ensure_ready().await?;
        match self.open_inventory_stream(&handle).await {
            Ok(stream) => Ok(stream),
            Err(status) => Err(self.classify(&handle, status).await),
        }
    }

    /// Change the stocked quantity of an item. Returns the server status.
    pub async fn update_inventory(&self, item_code: &str, quantity: i32) -> Result<String> {
        let handle = self.supervisor.ensure_ready().await?;
        let request = InventoryOperationRequest {
            item_code: item_code.to_string(),
            operation_type: OperationType::Update.to_string(),
            quantity,
            order_id: 0,
        };

        let mut client = InventoryServiceClient::new(handle.channel().clone());
        match client.update_inventory(request).await {
            Ok(response) => {
                let status = response.into_inner().status;
                tracing::info!(item_code, quantity, status = %status, "Inventory updated");
                Ok(status)
            }
            Err(status) => Err(self.classify(&handle, status).await),
        }
    }

    /// Place an order for an item.
    ///
    /// The order identifier is minted from the durable counter before the RPC
    /// is issued, so it is unique even across crashes; a failed RPC wastes the
    /// identifier rather than reusing it. Exactly one attempt is made — on
    /// transport failure the connection is degraded and the error surfaces,
    /// the caller decides whether to order again (with a fresh identifier).
    pub async fn place_order(&self, item_code: &str, quantity: i32) -> Result<OrderConfirmation> {
        let order_id = self.next_order_id().await?;

        let handle = self.supervisor.ensure_ready().await?;
        let request = InventoryOperationRequest {
            item_code: item_code.to_string(),
            operation_type: OperationType::Order.to_string(),
            quantity,
            order_id: i64::try_from(order_id)
                .map_err(|_| ClientError::InvalidConfig(format!("order id {order_id} overflow")))?,
        };

        let mut client = InventoryServiceClient::new(handle.channel().clone());
        match client.order_item(request).await {
            Ok(response) => {
                let status = response.into_inner().status;
                tracing::info!(item_code, quantity, order_id, status = %status, "Order placed");
                Ok(OrderConfirmation { order_id, status })
            }
            Err(status) => {
                tracing::warn!(item_code, order_id, error = %status, "Order RPC failed");
                Err(self.classify(&handle, status).await)
            }
        }
    }

    /// Shut the client down. Idempotent; in-flight `ensure_ready` waiters
    /// fail with [`ClientError::SupervisorClosed`].
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    /// Mint the next durable order identifier off the async runtime.
    async fn next_order_id(&self) -> Result<u64> {
        let counter = self.counter.clone();
        // File locking and fsync are blocking calls.
        tokio::task::spawn_blocking(move || counter.next())
            .await
            .map_err(|e| ClientError::CounterIo {
                path: self.counter.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
    }

    async fn open_inventory_stream(
        &self,
        handle: &ReadyHandle<Channel>,
    ) -> std::result::Result<tonic::Streaming<Item>, tonic::Status> {
        let mut client = InventoryServiceClient::new(handle.channel().clone());
        let response = client.get_inventory(Empty {}).await?;
        Ok(response.into_inner())
    }

    /// Degrade the connection if the status is transport-level, then convert.
    async fn classify(&self, handle: &ReadyHandle<Channel>, status: tonic::Status) -> ClientError {
        if is_transport_code(status.code()) {
            self.supervisor.report_failure(handle).await;
        }
        ClientError::RpcStatus(status)
    }
}

//! Connection state machine and supervised reconnection.
//!
//! The supervisor owns the logical connection to the inventory service and
//! keeps it usable despite the service being rescheduled or becoming
//! unreachable. Callers never hold the channel itself; they obtain a
//! short-lived [`ReadyHandle`] from [`ConnectionSupervisor::ensure_ready`]
//! before every request, so a stale channel can never be used after a
//! reconnect.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──ensure_ready()──> Connecting
//!                                      │
//!                                success / failure
//!                                      ▼
//!                                 Ready / Degraded
//!                                      │
//!                         reported transport failure
//!                                      ▼
//!                                  Degraded ──re-resolve──> Connecting
//!
//! shutdown() from any state ──> ShuttingDown (terminal)
//! ```
//!
//! A `Degraded` connection re-enters discovery rather than reusing the last
//! address: the remote process may have been rescheduled elsewhere, so the
//! resolver is asked again on every reconnect cycle. A fixed backoff between
//! cycles prevents a reconnect storm against a directory that is itself down.

use std::time::Duration;
use tokio::sync::{watch, Mutex};

use crate::error::{ClientError, Result};
use crate::resolver::Resolve;
use crate::transport::Connect;

/// Connection lifecycle state, owned exclusively by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No address known, no channel (initial).
    Disconnected,
    /// A placement has been resolved and channel construction is in flight.
    Connecting,
    /// The channel is live; `ensure_ready` returns immediately.
    Ready,
    /// The connection is known-bad; the next cycle re-enters discovery.
    Degraded,
    /// Explicit shutdown; terminal.
    ShuttingDown,
}

impl ConnectionState {
    /// Returns true if the channel is currently usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true once the supervisor has been shut down.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }

    /// Returns a short status label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Ready => "Ready",
            Self::Degraded => "Degraded",
            Self::ShuttingDown => "Shutting down",
        }
    }
}

/// Short-lived reference to a currently-usable channel.
///
/// Valid only until the next reconnect; callers must not store it across
/// requests. The generation ties the handle to the connect cycle that
/// produced it, so a failure report from an old handle cannot degrade a
/// newer connection.
#[derive(Debug, Clone)]
pub struct ReadyHandle<T> {
    channel: T,
    generation: u64,
}

impl<T> ReadyHandle<T> {
    /// The transport channel this handle refers to.
    #[must_use]
    pub fn channel(&self) -> &T {
        &self.channel
    }

    /// Connect cycle that produced this handle (1-based).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Inner<T> {
    state: ConnectionState,
    channel: Option<T>,
    generation: u64,
}

/// Supervises the logical connection to one named service.
///
/// Reconnection is fully sequential: concurrent callers serialize on the
/// internal mutex, so two `ensure_ready` calls can never race to construct
/// two channels out of `Degraded`.
pub struct ConnectionSupervisor<R, C: Connect> {
    resolver: R,
    connector: C,
    service_name: String,
    backoff: Duration,
    inner: Mutex<Inner<C::Channel>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<R: Resolve, C: Connect> ConnectionSupervisor<R, C> {
    /// Create a supervisor in the `Disconnected` state.
    pub fn new(resolver: R, connector: C, service_name: impl Into<String>, backoff: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            resolver,
            connector,
            service_name: service_name.into(),
            backoff,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                channel: None,
                generation: 0,
            }),
            shutdown_tx,
        }
    }

    /// Current connection state (observational).
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Suspend until the connection is `Ready` and return a handle to it.
    ///
    /// Re-resolves and reconnects as many times as needed; discovery retries
    /// indefinitely with the configured fixed backoff. The returned handle is
    /// never one whose channel had already signalled failure at the instant
    /// of return. Fails with [`ClientError::SupervisorClosed`] if the
    /// supervisor is shut down, including mid-wait.
    pub async fn ensure_ready(&self) -> Result<ReadyHandle<C::Channel>> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut inner = self.inner.lock().await;

        loop {
            if *shutdown_rx.borrow() {
                return Err(ClientError::SupervisorClosed);
            }

            match inner.state {
                ConnectionState::ShuttingDown => return Err(ClientError::SupervisorClosed),
                ConnectionState::Ready => {
                    if let Some(channel) = &inner.channel {
                        return Ok(ReadyHandle {
                            channel: channel.clone(),
                            generation: inner.generation,
                        });
                    }
                    // Ready without a channel cannot normally happen; recover
                    // by re-entering discovery.
                    inner.state = ConnectionState::Disconnected;
                }
                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::Degraded => {
                    // The address may have changed since the last cycle, so
                    // every reconnect starts with a fresh lookup. Shutdown
                    // must also win over a lookup in flight: the resolver
                    // contract bounds nothing, so the await cannot be bare.
                    let resolved = tokio::select! {
                        _ = shutdown_rx.changed() => {
                            return Err(ClientError::SupervisorClosed);
                        }
                        result = self.resolver.resolve(&self.service_name) => result,
                    };
                    let descriptor = match resolved {
                        Ok(descriptor) => descriptor,
                        Err(e) => {
                            tracing::warn!(
                                service = %self.service_name,
                                error = %e,
                                "Service lookup failed; retrying after backoff"
                            );
                            self.wait_backoff(&mut shutdown_rx).await?;
                            continue;
                        }
                    };

                    inner.state = ConnectionState::Connecting;
                    tracing::info!(%descriptor, "Connecting to resolved placement");

                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            // Shutdown wins over the in-progress attempt; the
                            // pending connect future is dropped here.
                            return Err(ClientError::SupervisorClosed);
                        }
                        result = self.connector.connect(&descriptor) => match result {
                            Ok(channel) => {
                                inner.generation += 1;
                                inner.channel = Some(channel);
                                inner.state = ConnectionState::Ready;
                                tracing::info!(
                                    %descriptor,
                                    generation = inner.generation,
                                    "Connection ready"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(%descriptor, error = %e, "Connection attempt failed");
                                inner.state = ConnectionState::Degraded;
                                self.wait_backoff(&mut shutdown_rx).await?;
                            }
                        },
                    }
                }
            }
        }
    }

    /// Report a transport-level failure observed on a handle.
    ///
    /// Degrades the connection only if the handle belongs to the current
    /// connect cycle; a report from a handle that predates the last reconnect
    /// is ignored.
    pub async fn report_failure(&self, handle: &ReadyHandle<C::Channel>) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Ready && inner.generation == handle.generation {
            tracing::warn!(
                generation = handle.generation,
                "Transport failure reported; connection degraded"
            );
            inner.channel = None;
            inner.state = ConnectionState::Degraded;
        } else {
            tracing::debug!(
                reported = handle.generation,
                current = inner.generation,
                state = inner.state.label(),
                "Ignored stale failure report"
            );
        }
    }

    /// Shut the supervisor down. Idempotent; wakes any waiter mid-backoff.
    pub async fn shutdown(&self) {
        // Signal before taking the lock so an ensure_ready holding it
        // observes the shutdown at its next suspension point.
        self.shutdown_tx.send_replace(true);
        let mut inner = self.inner.lock().await;
        if !inner.state.is_shutting_down() {
            inner.channel = None;
            inner.state = ConnectionState::ShuttingDown;
            tracing::info!("Connection supervisor shut down");
        }
    }

    async fn wait_backoff(&self, shutdown_rx: &mut watch::Receiver<bool>) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => Ok(()),
            _ = shutdown_rx.changed() => Err(ClientError::SupervisorClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ServiceDescriptor;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn descriptor(host: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "InventoryManagementSystem".to_string(),
            host: host.to_string(),
            port: 9090,
        }
    }

    enum ResolveOutcome {
        NotFound,
        Found(ServiceDescriptor),
    }

    /// Resolver that replays a script, then keeps returning a fallback.
    struct ScriptedResolver {
        script: StdMutex<VecDeque<ResolveOutcome>>,
        fallback: ServiceDescriptor,
        calls: AtomicUsize,
    }

    impl ScriptedResolver {
        fn new(script: Vec<ResolveOutcome>, fallback: ServiceDescriptor) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Resolve for &'static ScriptedResolver {
        async fn resolve(&self, service_name: &str) -> crate::error::Result<ServiceDescriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(ResolveOutcome::NotFound) => {
                    Err(ClientError::ServiceNotFound(service_name.to_string()))
                }
                Some(ResolveOutcome::Found(descriptor)) => Ok(descriptor),
                None => Ok(self.fallback.clone()),
            }
        }
    }

    /// Channel stand-in recording which placement it was built for.
    #[derive(Debug, Clone)]
    struct MockChannel {
        host: String,
    }

    /// Connector that fails a configured number of attempts, then succeeds.
    struct MockConnector {
        failures_remaining: StdMutex<usize>,
    }

    impl MockConnector {
        fn reliable() -> Self {
            Self {
                failures_remaining: StdMutex::new(0),
            }
        }

        fn failing(times: usize) -> Self {
            Self {
                failures_remaining: StdMutex::new(times),
            }
        }
    }

    #[async_trait]
    impl Connect for MockConnector {
        type Channel = MockChannel;

        async fn connect(
            &self,
            descriptor: &ServiceDescriptor,
        ) -> crate::error::Result<MockChannel> {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::RpcStatus(tonic::Status::unavailable(
                    "injected connect failure",
                )));
            }
            Ok(MockChannel {
                host: descriptor.host.clone(),
            })
        }
    }

    fn leak(resolver: ScriptedResolver) -> &'static ScriptedResolver {
        Box::leak(Box::new(resolver))
    }

    fn supervisor(
        resolver: &'static ScriptedResolver,
        connector: MockConnector,
    ) -> ConnectionSupervisor<&'static ScriptedResolver, MockConnector> {
        ConnectionSupervisor::new(
            resolver,
            connector,
            "InventoryManagementSystem",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_ensure_ready_connects_then_reuses_channel() {
        let resolver = leak(ScriptedResolver::new(vec![], descriptor("10.0.0.5")));
        let sup = supervisor(resolver, MockConnector::reliable());

        let first = sup.ensure_ready().await.unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(first.channel().host, "10.0.0.5");
        assert!(sup.state().await.is_ready());

        // Ready state short-circuits: no second lookup, same generation.
        let second = sup.ensure_ready().await.unwrap();
        assert_eq!(second.generation(), 1);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_convergence_after_transient_failures() {
        let resolver = leak(ScriptedResolver::new(
            vec![ResolveOutcome::NotFound, ResolveOutcome::NotFound],
            descriptor("10.0.0.5"),
        ));
        let sup = supervisor(resolver, MockConnector::failing(1));

        // Two lookup failures and one connect failure, then convergence.
        let handle = sup.ensure_ready().await.unwrap();
        assert_eq!(handle.generation(), 1);
        assert!(sup.state().await.is_ready());
        assert!(resolver.calls() >= 3);
    }

    #[tokio::test]
    async fn test_reported_failure_reconnects_to_new_placement() {
        // First cycle lands on 10.0.0.5; after the failure report the
        // service has moved to 10.0.0.9.
        let resolver = leak(ScriptedResolver::new(
            vec![ResolveOutcome::Found(descriptor("10.0.0.5"))],
            descriptor("10.0.0.9"),
        ));
        let sup = supervisor(resolver, MockConnector::reliable());

        let first = sup.ensure_ready().await.unwrap();
        assert_eq!(first.channel().host, "10.0.0.5");

        sup.report_failure(&first).await;
        assert_eq!(sup.state().await, ConnectionState::Degraded);

        let second = sup.ensure_ready().await.unwrap();
        assert_eq!(second.channel().host, "10.0.0.9");
        assert!(second.generation() > first.generation());
    }

    #[tokio::test]
    async fn test_stale_failure_report_is_ignored() {
        let resolver = leak(ScriptedResolver::new(vec![], descriptor("10.0.0.5")));
        let sup = supervisor(resolver, MockConnector::reliable());

        let old = sup.ensure_ready().await.unwrap();
        sup.report_failure(&old).await;
        let fresh = sup.ensure_ready().await.unwrap();
        assert!(fresh.generation() > old.generation());

        // A late report from the pre-reconnect handle must not degrade the
        // new connection.
        sup.report_failure(&old).await;
        assert!(sup.state().await.is_ready());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_ensure_ready() {
        let resolver = leak(ScriptedResolver::new(vec![], descriptor("10.0.0.5")));
        let sup = supervisor(resolver, MockConnector::reliable());

        sup.shutdown().await;
        assert!(sup.state().await.is_shutting_down());
        assert!(matches!(
            sup.ensure_ready().await,
            Err(ClientError::SupervisorClosed)
        ));

        // Idempotent.
        sup.shutdown().await;
        assert!(sup.state().await.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wins_over_reconnect_wait() {
        // Resolver never succeeds, so ensure_ready sits in the
        // lookup/backoff cycle until shutdown interrupts it.
        let resolver = leak(ScriptedResolver::new(vec![], descriptor("10.0.0.5")));
        resolver
            .script
            .lock()
            .unwrap()
            .extend((0..10_000).map(|_| ResolveOutcome::NotFound));

        let sup = std::sync::Arc::new(supervisor(resolver, MockConnector::reliable()));
        let waiter = {
            let sup = std::sync::Arc::clone(&sup);
            tokio::spawn(async move { sup.ensure_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        sup.shutdown().await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ClientError::SupervisorClosed)));
    }

    /// Resolver whose lookup never completes.
    struct StalledResolver;

    #[async_trait]
    impl Resolve for StalledResolver {
        async fn resolve(&self, _service_name: &str) -> crate::error::Result<ServiceDescriptor> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wins_over_inflight_lookup() {
        // The lookup itself hangs, not the backoff between lookups; shutdown
        // must still complete and fail the waiter promptly.
        let sup = std::sync::Arc::new(ConnectionSupervisor::new(
            StalledResolver,
            MockConnector::reliable(),
            "InventoryManagementSystem",
            Duration::from_secs(5),
        ));
        let waiter = {
            let sup = std::sync::Arc::clone(&sup);
            tokio::spawn(async move { sup.ensure_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(2), sup.shutdown())
            .await
            .unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ClientError::SupervisorClosed)));
        assert!(sup.state().await.is_shutting_down());
    }

    #[test]
    fn test_connection_state_labels() {
        assert_eq!(ConnectionState::Disconnected.label(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.label(), "Connecting...");
        assert_eq!(ConnectionState::Ready.label(), "Ready");
        assert_eq!(ConnectionState::Degraded.label(), "Degraded");
        assert_eq!(ConnectionState::ShuttingDown.label(), "Shutting down");
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Degraded.is_ready());
    }
}

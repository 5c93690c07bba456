use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{RcAuthError, Result};

/// Authorization code delivered to the loopback redirect target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub code: String,
    pub state: Option<String>,
}

/// Local loopback server receiving browser redirects
///
/// The HTTP side lives outside this crate; implementations only have to
/// honor start/stop and forward every received code on `events`.
#[async_trait::async_trait]
pub trait CallbackServer: Send + Sync {
    async fn start(&self, events: mpsc::Sender<CallbackEvent>) -> Result<()>;

    async fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Owns one [`CallbackServer`] for the lifetime of a single authentication attempt
///
/// The gateway is not `Clone`: whoever holds it is the attempt
/// that started the server and the only one able to stop it. Stopping twice
/// is a no-op.
pub struct CallbackGateway {
    server: Box<dyn CallbackServer>,
    phase: Mutex<Phase>,
    events: Mutex<Option<mpsc::Receiver<CallbackEvent>>>,
}

impl CallbackGateway {
    pub fn new(server: impl CallbackServer + 'static) -> Self {
        Self {
            server: Box::new(server),
            phase: Mutex::new(Phase::Idle),
            events: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut phase = self.phase.lock().await;
        match *phase {
            Phase::Idle => {}
            Phase::Running => {
                return Err(RcAuthError::CallbackServer(
                    "callback server is already running".to_string(),
                ));
            }
            Phase::Stopped => {
                return Err(RcAuthError::CallbackServer(
                    "callback server was already stopped".to_string(),
                ));
            }
        }

        let (tx, rx) = mpsc::channel(4);
        self.server.start(tx).await?;
        *self.events.lock().await = Some(rx);
        *phase = Phase::Running;
        info!("Callback server started");
        Ok(())
    }

    pub async fn stop(&self) {
        let mut phase = self.phase.lock().await;
        if *phase != Phase::Running {
            debug!("Callback server not running, nothing to stop");
            return;
        }

        self.server.stop().await;
        *phase = Phase::Stopped;
        info!("Callback server stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.phase.lock().await == Phase::Running
    }

    /// Wait for the next authorization code
    ///
    /// Returns `None` when cancelled, when the gateway was never started or
    /// when the server dropped its sender.
    pub async fn wait_for_code(&self, cancel: &CancellationToken) -> Option<CallbackEvent> {
        let mut events = self.events.lock().await;
        let rx = events.as_mut()?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stopped waiting for authorization code");
                None
            }
            event = rx.recv() => event,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts start/stop calls and keeps the event sender for the test to drive
    #[derive(Default, Clone)]
    pub(crate) struct SpyServer {
        pub starts: Arc<AtomicUsize>,
        pub stops: Arc<AtomicUsize>,
        pub sender: Arc<std::sync::Mutex<Option<mpsc::Sender<CallbackEvent>>>>,
    }

    impl SpyServer {
        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        pub async fn deliver(&self, code: &str, state: Option<&str>) {
            let sender = self.sender.lock().unwrap().clone();
            if let Some(sender) = sender {
                sender
                    .send(CallbackEvent {
                        code: code.to_string(),
                        state: state.map(str::to_string),
                    })
                    .await
                    .unwrap();
            }
        }
    }

    #[async_trait::async_trait]
    impl CallbackServer for SpyServer {
        async fn start(&self, events: mpsc::Sender<CallbackEvent>) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.sender.lock().unwrap() = Some(events);
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.sender.lock().unwrap().take();
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let spy = SpyServer::default();
        let gateway = CallbackGateway::new(spy.clone());

        gateway.start().await.unwrap();
        assert!(gateway.is_running().await);

        gateway.stop().await;
        gateway.stop().await;

        assert!(!gateway.is_running().await);
        assert_eq!(spy.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let spy = SpyServer::default();
        let gateway = CallbackGateway::new(spy.clone());

        gateway.stop().await;
        assert_eq!(spy.stop_count(), 0);

        gateway.start().await.unwrap();
        assert_eq!(spy.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_is_rejected() {
        let gateway = CallbackGateway::new(SpyServer::default());

        gateway.start().await.unwrap();
        assert!(matches!(
            gateway.start().await,
            Err(RcAuthError::CallbackServer(_))
        ));

        gateway.stop().await;
        assert!(matches!(
            gateway.start().await,
            Err(RcAuthError::CallbackServer(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_for_code_receives_event() {
        let spy = SpyServer::default();
        let gateway = CallbackGateway::new(spy.clone());
        gateway.start().await.unwrap();

        spy.deliver("M.C507_BAY.2.U.code", Some("xyz")).await;

        let event = gateway
            .wait_for_code(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(event.code, "M.C507_BAY.2.U.code");
        assert_eq!(event.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_wait_for_code_honors_cancellation() {
        let gateway = CallbackGateway::new(SpyServer::default());
        gateway.start().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(gateway.wait_for_code(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_wait_without_start_returns_none() {
        let gateway = CallbackGateway::new(SpyServer::default());
        assert!(
            gateway
                .wait_for_code(&CancellationToken::new())
                .await
                .is_none()
        );
    }
}

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::HubError;
use crate::handler::InboundHandler;
use crate::message::{ConnectionId, Message};
use crate::registry::Registry;

pub(crate) enum HubCommand {
    Register {
        id: ConnectionId,
        flag: String,
        tx: mpsc::Sender<Arc<Message>>,
        kick: watch::Sender<bool>,
    },
    Unregister {
        id: ConnectionId,
    },
    Broadcast {
        msg: Arc<Message>,
    },
    Inbound {
        payload: Vec<u8>,
    },
}

/// The broadcast/registry authority. All membership mutation and fan-out
/// happens on its single dispatch loop; everything else talks to it through
/// a [`HubHandle`].
pub struct Hub {
    registry: Registry,
    rx: mpsc::Receiver<HubCommand>,
    handler: Arc<dyn InboundHandler>,
    handle: HubHandle,
}

/// Cloneable submission point for the hub's command queue.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Construct the hub and its handle. `command_cap` bounds the command
    /// queue shared by registrations, broadcasts, and inbound payloads.
    pub fn build(command_cap: usize, handler: Arc<dyn InboundHandler>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(command_cap);
        let handle = HubHandle { tx };
        (
            Self {
                registry: Registry::default(),
                rx,
                handler,
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Dispatch loop. Start exactly once, typically
    /// `tokio::spawn(hub.run(shutdown_rx))`.
    ///
    /// Exits when the shutdown watch flips to true (or every handle is
    /// dropped), after clearing the registry, which closes every
    /// connection's outbound queue and lets the write pumps terminate.
    #[instrument(name = "hub", skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("hub started");
        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => self.process(cmd).await,
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let connections = self.registry.len();
        self.registry.clear();
        info!(connections, "hub stopped");
    }

    async fn process(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { id, flag, tx, kick } => {
                self.registry.insert(id, flag, tx, kick);
                debug!(conn_id = %id, clients = self.registry.len(), "registered");
            }
            HubCommand::Unregister { id } => {
                if self.registry.remove(id) {
                    debug!(conn_id = %id, clients = self.registry.len(), "unregistered");
                }
            }
            HubCommand::Broadcast { msg } => self.fan_out(msg),
            HubCommand::Inbound { payload } => {
                if let Err(e) = self.handler.handle(&payload, &self.handle).await {
                    let e = HubError::Handler(e.to_string());
                    warn!(error = %e, "inbound payload rejected");
                }
            }
        }
    }

    /// Enqueue `msg` onto every target's outbound queue without blocking.
    /// A full queue marks that client as unresponsive: it is dropped on the
    /// spot so one slow reader can never stall the fan-out.
    fn fan_out(&mut self, msg: Arc<Message>) {
        for id in self.registry.targets(&msg.user_flag) {
            let Some(tx) = self.registry.sender(id) else {
                continue;
            };
            match tx.try_send(Arc::clone(&msg)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %id, "outbound queue full, dropping slow client");
                    self.registry.remove(id);
                }
                Err(TrySendError::Closed(_)) => {
                    // write pump already gone, forget the stale entry
                    self.registry.remove(id);
                }
            }
        }
    }
}

impl HubHandle {
    /// Submit a message for fan-out. Empty `user_flag` reaches every
    /// connection; a flag with no members is a silent no-op.
    ///
    /// Never blocks: a saturated command queue yields [`HubError::Saturated`]
    /// and a stopped hub yields [`HubError::Closed`]. Callers that don't
    /// care may ignore the result.
    pub fn broadcast(&self, msg: Message) -> Result<(), HubError> {
        self.tx
            .try_send(HubCommand::Broadcast { msg: Arc::new(msg) })
            .map_err(|e| match e {
                TrySendError::Full(_) => HubError::Saturated,
                TrySendError::Closed(_) => HubError::Closed,
            })
    }

    /// Register a connection's outbound queue. Called by the upgrade entry
    /// point; visible to broadcasts once the dispatch loop processes it.
    ///
    /// The hub holds `kick` until the connection is removed; its drop is the
    /// session's signal to close the transport, whatever the trigger
    /// (backpressure kick, transport error on the other pump, shutdown).
    pub async fn register(
        &self,
        id: ConnectionId,
        flag: impl Into<String>,
        tx: mpsc::Sender<Arc<Message>>,
        kick: watch::Sender<bool>,
    ) {
        let cmd = HubCommand::Register {
            id,
            flag: flag.into(),
            tx,
            kick,
        };
        if self.tx.send(cmd).await.is_err() {
            debug!(conn_id = %id, "register after shutdown dropped");
        }
    }

    /// Remove a connection. Safe to call from both pumps; removal is
    /// idempotent.
    pub async fn unregister(&self, id: ConnectionId) {
        if self.tx.send(HubCommand::Unregister { id }).await.is_err() {
            debug!(conn_id = %id, "unregister after shutdown dropped");
        }
    }

    /// Forward an inbound payload to the hub's handler.
    pub async fn inbound(&self, payload: Vec<u8>) {
        if self.tx.send(HubCommand::Inbound { payload }).await.is_err() {
            debug!("inbound payload after shutdown dropped");
        }
    }
}

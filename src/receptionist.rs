//! # Receptionist
//!
//! In-process registry mapping string keys to the gossip shells registered
//! under them. Subscribers get the current listing immediately and a
//! refreshed listing on every change, which is what makes receptionist
//! discovery symmetric: every shell registered under a key eventually
//! lists all the others.
//!
//! Registered shells are watched; a shell that terminates is dropped from
//! its listings and subscribers are refreshed.

use indexmap::IndexMap;
use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::peer::{PeerRef, ShellAddr};

const REGISTRY_MAILBOX: usize = 256;
const LISTING_BUFFER: usize = 32;

enum RegistryCommand<E> {
    Register {
        key: String,
        peer: PeerRef<E>,
    },
    Subscribe {
        key: String,
        listing_tx: mpsc::Sender<Vec<PeerRef<E>>>,
    },
    Deregister {
        key: String,
        addr: ShellAddr,
    },
}

/// Handle to a receptionist actor. Cheap to clone; all clones address the
/// same registry.
pub struct Receptionist<E> {
    cmd_tx: mpsc::Sender<RegistryCommand<E>>,
}

impl<E> Clone for Receptionist<E> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
        }
    }
}

impl<E: Send + 'static> Receptionist<E> {
    /// Spawn a fresh registry actor and return its handle.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(REGISTRY_MAILBOX);
        let actor = RegistryActor {
            cmd_tx: cmd_tx.clone(),
            listings: HashMap::new(),
            subscribers: HashMap::new(),
        };
        tokio::spawn(actor.run(cmd_rx));
        Self { cmd_tx }
    }

    /// Register a shell under `key`. Registration is idempotent per
    /// address and lasts until the shell terminates.
    pub async fn register(&self, key: impl Into<String>, peer: PeerRef<E>) {
        let _ = self
            .cmd_tx
            .send(RegistryCommand::Register {
                key: key.into(),
                peer,
            })
            .await;
    }

    /// Subscribe to listings for `key`. The current listing is delivered
    /// first, then one listing per change.
    pub async fn subscribe(&self, key: impl Into<String>) -> mpsc::Receiver<Vec<PeerRef<E>>> {
        let (listing_tx, listing_rx) = mpsc::channel(LISTING_BUFFER);
        let _ = self
            .cmd_tx
            .send(RegistryCommand::Subscribe {
                key: key.into(),
                listing_tx,
            })
            .await;
        listing_rx
    }
}

struct RegistryActor<E> {
    cmd_tx: mpsc::Sender<RegistryCommand<E>>,
    listings: HashMap<String, IndexMap<ShellAddr, PeerRef<E>>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<Vec<PeerRef<E>>>>>,
}

impl<E: Send + 'static> RegistryActor<E> {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<RegistryCommand<E>>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                RegistryCommand::Register { key, peer } => self.handle_register(key, peer).await,
                RegistryCommand::Subscribe { key, listing_tx } => {
                    let listing = self.listing(&key);
                    if listing_tx.send(listing).await.is_ok() {
                        self.subscribers.entry(key).or_default().push(listing_tx);
                    }
                }
                RegistryCommand::Deregister { key, addr } => {
                    let removed = self
                        .listings
                        .get_mut(&key)
                        .map(|l| l.shift_remove(&addr).is_some())
                        .unwrap_or(false);
                    if removed {
                        debug!(key = %key, shell = %addr, "registered shell terminated");
                        self.publish(&key).await;
                    }
                }
            }
        }
    }

    async fn handle_register(&mut self, key: String, peer: PeerRef<E>) {
        let entry = self.listings.entry(key.clone()).or_default();
        let addr = peer.addr().clone();
        if entry.insert(addr.clone(), peer.clone()).is_some() {
            return;
        }
        debug!(key = %key, shell = %addr, "shell registered");

        // Watch: drop the registration when the shell's mailbox closes.
        let cmd_tx = self.cmd_tx.clone();
        let watch_key = key.clone();
        tokio::spawn(async move {
            peer.closed().await;
            let _ = cmd_tx
                .send(RegistryCommand::Deregister {
                    key: watch_key,
                    addr,
                })
                .await;
        });

        self.publish(&key).await;
    }

    fn listing(&self, key: &str) -> Vec<PeerRef<E>> {
        self.listings
            .get(key)
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn publish(&mut self, key: &str) {
        let listing = self.listing(key);
        if let Some(subs) = self.subscribers.get_mut(key) {
            // Prune subscribers that went away.
            let mut live = Vec::with_capacity(subs.len());
            for tx in subs.drain(..) {
                if tx.send(listing.clone()).await.is_ok() {
                    live.push(tx);
                }
            }
            *subs = live;
        }
    }
}

//! In-process stand-ins for the cluster used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

use crate::cache::Cache;
use crate::container::{CacheValue, DataContainer, LockManager};
use crate::context::InvocationContext;
use crate::distribution::{DistributionManager, TopologyManager, TopologyProvider};
use crate::error::Result;
use crate::membership::types::Address;
use crate::notifications::{CacheNotifier, ListenerRegistry};
use crate::remoting::http::collect_responses;
use crate::remoting::protocol::CommandRequest;
use crate::remoting::{BoxFuture, Invocation, Response, ResponseFilter, ResponseMode, Transport};

pub fn addr(name: &str) -> Address {
    Address::from(name)
}

pub fn text(value: &str) -> CacheValue {
    CacheValue::Text(value.to_string())
}

/// One call made through a `MockTransport`.
#[derive(Debug, Clone)]
pub struct SentInvocation {
    pub targets: Vec<Address>,
    pub invocation: Invocation,
    pub mode: ResponseMode,
}

type Responder = Arc<dyn Fn(&Address, &Invocation) -> Option<Response> + Send + Sync>;

/// Transport whose peers answer from a script.
///
/// A responder returning `None` models a peer that never replies.
pub struct MockTransport {
    local: Address,
    members: Mutex<Vec<Address>>,
    responder: Mutex<Responder>,
    delay: Mutex<Duration>,
    sent: Mutex<Vec<SentInvocation>>,
}

impl MockTransport {
    pub fn new(local: Address, members: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            local,
            members: Mutex::new(members),
            responder: Mutex::new(Arc::new(|_, _| Some(Response::Unsuccessful))),
            delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Address, &Invocation) -> Option<Response> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Arc::new(responder);
    }

    pub fn set_members(&self, members: Vec<Address>) {
        *self.members.lock().unwrap() = members;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<SentInvocation> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn address(&self) -> Address {
        self.local.clone()
    }

    fn members(&self) -> Vec<Address> {
        self.members.lock().unwrap().clone()
    }

    fn invoke_remotely<'a>(
        &'a self,
        targets: Vec<Address>,
        invocation: Invocation,
        mode: ResponseMode,
        timeout: Duration,
        filter: Option<Box<dyn ResponseFilter>>,
    ) -> BoxFuture<'a, Result<HashMap<Address, Response>>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(SentInvocation {
                targets: targets.clone(),
                invocation: invocation.clone(),
                mode,
            });

            let responder = self.responder.lock().unwrap().clone();
            let delay = *self.delay.lock().unwrap();
            let mut seen = HashSet::new();
            let mut calls = JoinSet::new();
            for target in targets {
                if target == self.local || !seen.insert(target.clone()) {
                    continue;
                }
                let reply = responder(&target, &invocation);
                calls.spawn(async move {
                    tokio::time::sleep(delay).await;
                    match reply {
                        Some(reply) => (target, reply),
                        None => std::future::pending().await,
                    }
                });
            }

            collect_responses(calls, mode, filter, None, timeout).await
        })
    }
}

/// Transport that delivers commands straight into other in-process caches.
pub struct ClusterTransport {
    local: Address,
    peers: Arc<Mutex<HashMap<Address, Arc<Cache>>>>,
}

impl Transport for ClusterTransport {
    fn address(&self) -> Address {
        self.local.clone()
    }

    fn members(&self) -> Vec<Address> {
        let mut members: Vec<Address> = self.peers.lock().unwrap().keys().cloned().collect();
        members.sort();
        members
    }

    fn invoke_remotely<'a>(
        &'a self,
        targets: Vec<Address>,
        invocation: Invocation,
        mode: ResponseMode,
        timeout: Duration,
        filter: Option<Box<dyn ResponseFilter>>,
    ) -> BoxFuture<'a, Result<HashMap<Address, Response>>> {
        Box::pin(async move {
            let request = CommandRequest {
                op_id: invocation.op_id.clone(),
                origin: self.local.clone(),
                command_id: invocation.command.command_id(),
                parameters: invocation.command.parameters(),
            };

            let mut calls = JoinSet::new();
            for target in targets {
                if target == self.local {
                    continue;
                }
                let Some(peer) = self.peers.lock().unwrap().get(&target).cloned() else {
                    continue;
                };
                let request = request.clone();
                calls.spawn(async move { (target, peer.handle_remote(request).await) });
            }

            collect_responses(calls, mode, filter, None, timeout).await
        })
    }
}

/// A fully wired node of an in-process cluster.
pub struct TestNode {
    pub address: Address,
    pub cache: Arc<Cache>,
    pub topology: Arc<TopologyManager>,
    pub container: Arc<DataContainer>,
}

/// Builds `names.len()` nodes sharing one steady topology over all of them.
pub fn cluster(names: &[&str], num_owners: usize) -> Vec<TestNode> {
    let members: Vec<Address> = names.iter().map(|name| addr(name)).collect();
    let peers = Arc::new(Mutex::new(HashMap::new()));

    let nodes: Vec<TestNode> = members
        .iter()
        .map(|address| {
            let topology = Arc::new(TopologyManager::new(address.clone(), num_owners, 16, true).unwrap());
            topology.start_rehash(&members).unwrap();
            let id = topology.current_topology().id;
            topology.complete_rehash(id);

            let transport = Arc::new(ClusterTransport {
                local: address.clone(),
                peers: peers.clone(),
            });
            let dm = Arc::new(DistributionManager::new(
                topology.clone(),
                transport,
                Duration::from_secs(2),
                1_000,
            ));
            let container = Arc::new(DataContainer::new(16));
            let cache = Cache::new(
                dm,
                container.clone(),
                Arc::new(LockManager::new(Duration::from_secs(1))),
                ListenerRegistry::new(),
                true,
            );
            TestNode {
                address: address.clone(),
                cache,
                topology,
                container,
            }
        })
        .collect();

    for node in &nodes {
        peers
            .lock()
            .unwrap()
            .insert(node.address.clone(), node.cache.clone());
    }
    nodes
}

/// Notifier that keeps every event as `(key, value, pre)`.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(String, Option<CacheValue>, bool)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(String, Option<CacheValue>, bool)> {
        self.events.lock().unwrap().clone()
    }
}

impl CacheNotifier for RecordingNotifier {
    fn notify_cache_entry_modified(
        &self,
        key: &str,
        value: Option<&CacheValue>,
        pre: bool,
        _ctx: &InvocationContext,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((key.to_string(), value.cloned(), pre));
    }
}

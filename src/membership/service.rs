use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use std::{net::SocketAddr, time::Duration};
use tokio::net::UdpSocket;
use tokio::sync::{RwLock, watch};
use tracing::info;

use super::types::{Address, GossipMessage, Node, NodeState};

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<Address, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
    /// Sorted addresses of every member that is not `Dead`.
    view_tx: watch::Sender<Vec<Address>>,
}

impl MembershipService {
    pub async fn new(
        bind_addr: SocketAddr,
        http_addr: SocketAddr,
        seed_nodes: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let gossip_addr = socket.local_addr()?;
        let incarnation_counter = Arc::new(RwLock::new(1));
        let current_inc = *incarnation_counter.read().await;
        let local_node = Node {
            address: Address::new(),
            gossip_addr,
            http_addr,
            state: NodeState::Alive,
            incarnation: current_inc,
            last_seen: Some(Instant::now()),
        };
        let members = Arc::new(DashMap::new());
        members.insert(local_node.address.clone(), local_node.clone());

        if !seed_nodes.is_empty() {
            info!("Joining cluster via {} seed node(s)", seed_nodes.len());

            for seed_node in seed_nodes.iter() {
                let msg = GossipMessage::Join {
                    node: local_node.clone(),
                };

                let encoded = bincode::serialize(&msg)?;
                socket.send_to(&encoded, seed_node).await?;
                info!("Sent join request to {}", seed_node);
            }
        }

        let (view_tx, _) = watch::channel(vec![local_node.address.clone()]);

        Ok(Arc::new(Self {
            local_node,
            members,
            socket: Arc::new(socket),
            incarnation: incarnation_counter,
            view_tx,
        }))
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting membership service...");

        let _gossip_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.gossip_loop().await;
            })
        };

        let _receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        let _failure_detection_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.failure_detection_loop().await;
            })
        };

        tracing::info!("All background tasks started");
    }

    pub fn local_address(&self) -> Address {
        self.local_node.address.clone()
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_member(&self, address: &Address) -> Option<Node> {
        self.members
            .get(address)
            .filter(|entry| entry.value().state != NodeState::Dead)
            .map(|entry| entry.value().clone())
    }

    /// Current live view. Suspected members stay in the view until declared dead.
    pub fn view(&self) -> Vec<Address> {
        self.view_tx.borrow().clone()
    }

    /// Receiver notified every time the live view changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Address>> {
        self.view_tx.subscribe()
    }

    fn publish_view(&self) {
        let mut view: Vec<Address> = self
            .members
            .iter()
            .filter(|entry| entry.value().state != NodeState::Dead)
            .map(|entry| entry.key().clone())
            .collect();
        view.sort();

        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            tracing::info!("Membership view changed: {} member(s)", view.len());
            *current = view;
            true
        });
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);

        loop {
            interval.tick().await;

            let alive_members: Vec<Node> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().address != self.local_node.address
                        && entry.value().state != NodeState::Dead
                })
                .map(|entry| entry.value().clone())
                .collect();

            if alive_members.is_empty() {
                continue;
            }

            use rand::Rng;
            let idx = rand::thread_rng().gen_range(0..alive_members.len());
            let target = &alive_members[idx];

            let incarnation = *self.incarnation.read().await;
            let msg = GossipMessage::Ping {
                from: self.local_node.address.clone(),
                incarnation,
            };

            match bincode::serialize(&msg) {
                Ok(encoded) => {
                    if let Err(e) = self.socket.send_to(&encoded, target.gossip_addr).await {
                        tracing::warn!("Failed to send ping to {}: {}", target.address, e);
                    } else {
                        tracing::trace!("Sent ping to {}", target.address);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize ping: {}", e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling message from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping { from, incarnation } => {
                self.handle_ping(from, incarnation, src).await?;
            }

            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.handle_ack(from, incarnation, members).await;
            }

            GossipMessage::Join { node } => {
                self.handle_join(node).await?;
            }

            GossipMessage::Suspect {
                address,
                incarnation,
            } => {
                self.handle_suspect(address, incarnation).await;
            }

            GossipMessage::Alive {
                address,
                incarnation,
            } => {
                self.handle_alive(address, incarnation);
            }
        }

        self.publish_view();
        Ok(())
    }

    async fn handle_ping(&self, from: Address, from_incarnation: u64, src: SocketAddr) -> Result<()> {
        tracing::trace!("Received ping from {}", from);

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());

            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
        } else {
            // The HTTP address is unknown until the sender's Join or an Ack carrying it arrives.
            tracing::debug!("Ping from unknown member {} at {}", from, src);
        }

        self.send_ack(src).await
    }

    async fn send_ack(&self, target: SocketAddr) -> Result<()> {
        let all_members: Vec<Node> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let my_incarnation = *self.incarnation.read().await;
        let reply = GossipMessage::Ack {
            from: self.local_node.address.clone(),
            incarnation: my_incarnation,
            members: all_members,
        };

        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, target).await?;

        tracing::trace!("Sent ack to {} with {} members", target, self.members.len());

        Ok(())
    }

    async fn handle_ack(&self, from: Address, from_incarnation: u64, members: Vec<Node>) {
        tracing::trace!(
            "Received ack from {} (inc={}) with {} members",
            from,
            from_incarnation,
            members.len()
        );

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());
            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
        }

        for member in members {
            self.merge_member(member);
        }
    }

    fn merge_member(&self, new_member: Node) {
        if new_member.address == self.local_node.address {
            return;
        }

        match self.members.get_mut(&new_member.address) {
            Some(mut existing) => {
                if new_member.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        new_member.address,
                        existing.incarnation,
                        new_member.incarnation,
                    );

                    existing.state = new_member.state;
                    existing.incarnation = new_member.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{} refuted suspicion", new_member.address);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                if new_member.state == NodeState::Dead {
                    return;
                }
                tracing::info!(
                    "Discovered new member: {} at {}",
                    new_member.address,
                    new_member.gossip_addr
                );

                let mut member_with_timestamp = new_member;
                member_with_timestamp.last_seen = Some(Instant::now());

                self.members
                    .insert(member_with_timestamp.address.clone(), member_with_timestamp);
            }
        }
    }

    async fn handle_suspect(&self, address: Address, incarnation: u64) {
        if address == self.local_node.address {
            let my_incarnation = {
                let mut inc = self.incarnation.write().await;
                *inc = (*inc).max(incarnation) + 1;
                *inc
            };
            tracing::info!("Refuting suspicion about ourselves (inc={})", my_incarnation);

            if let Some(mut local) = self.members.get_mut(&address) {
                local.incarnation = my_incarnation;
            }

            self.broadcast_message(GossipMessage::Alive {
                address,
                incarnation: my_incarnation,
            })
            .await;
            return;
        }

        match self.members.get_mut(&address) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    tracing::info!("Node {} at {} suspected", existing.address, existing.gossip_addr);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Suspected node {} doesn't exist", address);
            }
        }
    }

    fn handle_alive(&self, address: Address, incarnation: u64) {
        match self.members.get_mut(&address) {
            Some(mut existing) => {
                if incarnation > existing.incarnation
                    || (incarnation == existing.incarnation && existing.state == NodeState::Suspect)
                {
                    tracing::info!(
                        "Node {} at {} is Alive (inc={})",
                        existing.address,
                        existing.gossip_addr,
                        incarnation
                    );
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Alive message for unknown node {}", address);
            }
        }
    }

    async fn handle_join(&self, mut node: Node) -> Result<()> {
        tracing::info!("Node {} joining cluster at {}", node.address, node.gossip_addr);

        node.last_seen = Some(Instant::now());
        node.state = NodeState::Alive;
        let gossip_addr = node.gossip_addr;

        self.members.insert(node.address.clone(), node);

        tracing::info!("Cluster size now: {}", self.members.len());

        // Hand the joiner our member list right away instead of waiting for its first ping.
        self.send_ack(gossip_addr).await
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);

        loop {
            interval.tick().await;
            let now = Instant::now();

            let mut messages_to_broadcast = Vec::new();

            for mut entry in self.members.iter_mut() {
                let member = entry.value_mut();

                if member.address == self.local_node.address {
                    continue;
                }

                let Some(last_seen) = member.last_seen else {
                    member.last_seen = Some(now);
                    continue;
                };
                let elapsed = now.duration_since(last_seen);

                match member.state {
                    NodeState::Alive if elapsed > SUSPECT_TIMEOUT => {
                        tracing::warn!(
                            "Node {} suspected (no contact for {:?})",
                            member.address,
                            elapsed
                        );

                        member.state = NodeState::Suspect;

                        messages_to_broadcast.push(GossipMessage::Suspect {
                            address: member.address.clone(),
                            incarnation: member.incarnation,
                        });
                    }
                    NodeState::Suspect if elapsed > DEAD_TIMEOUT => {
                        tracing::warn!(
                            "Node {} declared DEAD (no contact for {:?})",
                            member.address,
                            elapsed
                        );

                        member.state = NodeState::Dead;
                    }
                    _ => {}
                }
            }

            self.publish_view();

            for msg in messages_to_broadcast {
                self.broadcast_message(msg).await;
            }
        }
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        let encoded = match bincode::serialize(&msg) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to serialize broadcast: {}", e);
                return;
            }
        };

        let targets: Vec<(Address, SocketAddr)> = self
            .members
            .iter()
            .filter(|entry| {
                entry.value().address != self.local_node.address
                    && entry.value().state == NodeState::Alive
            })
            .map(|entry| (entry.value().address.clone(), entry.value().gossip_addr))
            .collect();

        for (address, gossip_addr) in targets {
            if let Err(e) = self.socket.send_to(&encoded, gossip_addr).await {
                tracing::warn!("Failed to broadcast to {}: {}", address, e);
            }
        }
    }
}

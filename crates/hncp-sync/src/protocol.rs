//! Synchronization state machine.
//!
//! The engine is a set of reactive handlers plus the Trickle-driven
//! announcer. It owns the node store, the links and their timers, and talks
//! to the outside world only through an [`Io`] implementation passed into
//! [`SyncEngine::poll`], [`SyncEngine::run`] and [`SyncEngine::handle_datagram`].
//!
//! ```text
//! Node A                                   Node B
//!   |--- LINK_ID NETWORK_HASH NODE_STATE* -->|   (multicast, Trickle)
//!   |<-- LINK_ID REQ_NODE_DATA* -------------|   (hash differs)
//!   |--- LINK_ID NODE_STATE+NODE_DATA ------>|   (one per request)
//!   |<-- LINK_ID NETWORK_HASH NODE_STATE* ---|   (B changed, resets Trickle)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use hncp_core::{tlv_type, Digest, EncodeError, NodeIdentifier, Record, Tlv, TlvSet};
use hncp_store::{
    node_hash, unreachable_nodes, HashEngine, MemoryStore, NodeStore, UpsertResult,
};

use crate::error::{Result, SyncError};
use crate::io::{Datagram, Io, HNCP_MULTICAST};
use crate::links::{LinkManager, LivenessAction, NeighborEvent};
use crate::messages::{
    LinkId, Message, MessageBuilder, NetworkHash, NodeState, ReqNetHash, ReqNodeData,
};
use crate::trickle::Trickle;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Shortest Trickle interval.
    pub trickle_imin: Duration,
    /// Longest Trickle interval.
    pub trickle_imax: Duration,
    /// Consistent announcements that suppress our own.
    pub trickle_k: u32,
    /// A neighbor unheard this long is dropped. It is probed at half of it.
    pub neighbor_timeout: Duration,
    /// How long an unreachable node is kept before removal.
    pub node_grace_period: Duration,
    /// Count one-way adjacencies as reachability edges.
    pub assume_bidirectional_reachability: bool,
    /// Largest datagram the engine will build.
    pub max_message_size: usize,
    /// Seed for timer jitter. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            trickle_imin: Duration::from_millis(200),
            trickle_imax: Duration::from_secs(40),
            trickle_k: 1,
            neighbor_timeout: Duration::from_secs(120),
            node_grace_period: Duration::from_secs(60),
            assume_bidirectional_reachability: false,
            max_message_size: 1280,
            rng_seed: None,
        }
    }
}

impl SyncConfig {
    pub fn with_trickle(mut self, imin: Duration, imax: Duration, k: u32) -> Self {
        self.trickle_imin = imin;
        self.trickle_imax = imax;
        self.trickle_k = k;
        self
    }

    pub fn with_neighbor_timeout(mut self, timeout: Duration) -> Self {
        self.neighbor_timeout = timeout;
        self
    }

    pub fn with_node_grace_period(mut self, grace: Duration) -> Self {
        self.node_grace_period = grace;
        self
    }

    pub fn with_assume_bidirectional_reachability(mut self, assume: bool) -> Self {
        self.assume_bidirectional_reachability = assume;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Counters for everything the engine drops, rejects or reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub messages_received: u64,
    pub messages_sent: u64,
    /// Datagrams dropped whole: unparseable, no sender, or unknown link.
    pub messages_discarded: u64,
    /// Our own multicast heard back.
    pub loopback_dropped: u64,
    /// Single records dropped from otherwise usable datagrams.
    pub malformed_records: u64,
    pub ordering_violations: u64,
    pub hash_mismatches: u64,
    pub stale_updates: u64,
    pub consistent_heard: u64,
    pub inconsistent_heard: u64,
    pub announcements_sent: u64,
    pub node_requests_sent: u64,
    pub network_requests_sent: u64,
    pub probes_sent: u64,
    pub trickle_resets: u64,
    pub own_update_bumps: u64,
    pub neighbors_discovered: u64,
    pub neighbors_dropped: u64,
    pub nodes_removed: u64,
    pub encode_failures: u64,
    pub send_failures: u64,
}

/// One protocol instance: a router's view of the network.
pub struct SyncEngine<S: NodeStore = MemoryStore> {
    config: SyncConfig,
    store: S,
    hashes: HashEngine,
    links: LinkManager,
    rng: StdRng,
    /// Records published by the local user, without neighbor records.
    published: TlvSet,
    data_changed: bool,
    unreachable_since: BTreeMap<NodeIdentifier, i64>,
    reachability_generation: Option<u64>,
    diagnostics: Diagnostics,
}

impl SyncEngine<MemoryStore> {
    /// Create an engine with an in-memory store.
    pub fn new(own_id: NodeIdentifier, config: SyncConfig, now: i64) -> Self {
        Self::with_store(MemoryStore::new(own_id, now), config, now)
    }
}

impl<S: NodeStore> SyncEngine<S> {
    /// Create an engine over an existing store. The local node is republished
    /// immediately so its update number moves past anything stored.
    pub fn with_store(store: S, config: SyncConfig, now: i64) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let published = store
            .self_node()
            .tlvs()
            .iter()
            .filter(|t| t.ty() != tlv_type::NODE_DATA_NEIGHBOR)
            .cloned()
            .collect();

        let mut engine = Self {
            config,
            store,
            hashes: HashEngine::new(),
            links: LinkManager::new(),
            rng,
            published,
            data_changed: false,
            unreachable_since: BTreeMap::new(),
            reachability_generation: None,
            diagnostics: Diagnostics::default(),
        };
        engine.republish(now);
        engine
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn own_id(&self) -> NodeIdentifier {
        self.store.own_id()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn links(&self) -> &LinkManager {
        &self.links
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Records published through [`SyncEngine::publish`].
    pub fn published(&self) -> &TlvSet {
        &self.published
    }

    /// The current network hash, recomputed if anything changed.
    pub fn network_hash(&mut self) -> Digest {
        self.hashes.network_hash(&mut self.store)
    }

    /// The network hash if it is still valid, without recomputing.
    pub fn cached_network_hash(&self) -> Option<Digest> {
        self.hashes.cached_network_hash(&self.store)
    }

    pub fn node_hash(&mut self, id: &NodeIdentifier) -> Option<Digest> {
        self.hashes.node_hash(&mut self.store, id)
    }

    /// Nodes waiting out the grace period, with the time they became
    /// unreachable.
    pub fn removal_candidates(&self) -> impl Iterator<Item = (&NodeIdentifier, &i64)> + '_ {
        self.unreachable_since.iter()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Start running the protocol on a link.
    pub fn enable_link(&mut self, name: &str, address: Ipv6Addr, now: i64) -> Result<u32> {
        let trickle = Trickle::new(
            millis(self.config.trickle_imin),
            millis(self.config.trickle_imax),
            self.config.trickle_k,
            now,
            &mut self.rng,
        );
        let id = self.links.enable(name, address, trickle)?;
        tracing::info!(link = name, id, %address, "link enabled");
        Ok(id)
    }

    /// Stop running the protocol on a link, forgetting its neighbors.
    pub fn disable_link(&mut self, name: &str, now: i64) -> Result<()> {
        let link = self.links.disable(name)?;
        tracing::info!(link = name, id = link.id(), "link disabled");
        if link.neighbor_count() > 0 {
            self.data_changed = true;
            self.flush(now);
        }
        Ok(())
    }

    /// Publish a record in the local node's data.
    ///
    /// Returns false if it was already published.
    pub fn publish(&mut self, tlv: Tlv, now: i64) -> bool {
        let inserted = self.published.insert(tlv);
        if inserted {
            self.data_changed = true;
            self.flush(now);
        }
        inserted
    }

    /// Publish a typed record.
    pub fn publish_record<R: Record>(&mut self, record: &R, now: i64) -> Result<bool> {
        let tlv = record.to_tlv().map_err(EncodeError::from)?;
        Ok(self.publish(tlv, now))
    }

    /// Withdraw a published record. Returns false if it was not published.
    pub fn unpublish(&mut self, tlv: &Tlv, now: i64) -> bool {
        let removed = self.published.remove(tlv);
        if removed {
            self.data_changed = true;
            self.flush(now);
        }
        removed
    }

    fn own_tlvs(&self) -> TlvSet {
        let mut tlvs = self.published.clone();
        for record in self.links.neighbor_records() {
            match record.to_tlv() {
                Ok(tlv) => {
                    tlvs.insert(tlv);
                }
                Err(e) => tracing::warn!(error = %e, "cannot encode neighbor record"),
            }
        }
        tlvs
    }

    /// Republish the local node if its data changed since the last call.
    fn flush(&mut self, now: i64) {
        if !self.data_changed {
            return;
        }
        self.data_changed = false;
        if self.own_tlvs() != *self.store.self_node().tlvs() {
            self.republish(now);
        }
    }

    fn republish(&mut self, now: i64) {
        let tlvs = self.own_tlvs();
        let update_number = self.store.publish_self(tlvs, now);
        self.data_changed = false;
        tracing::debug!(update_number, "local node republished");
        self.reset_all_trickles(now);
    }

    /// Something inconsistent was heard on `link`.
    fn inconsistent_on(&mut self, link: u32, now: i64) {
        if let Some(l) = self.links.get_mut(link) {
            if l.trickle.hear_inconsistent(now, &mut self.rng) {
                self.diagnostics.trickle_resets += 1;
            }
        }
    }

    /// Local state changed: every link announces within one minimum interval.
    fn reset_all_trickles(&mut self, now: i64) {
        for l in self.links.iter_mut() {
            l.trickle.reset(now, &mut self.rng);
            self.diagnostics.trickle_resets += 1;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event loop entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle every waiting datagram, then run timers.
    pub fn poll<I: Io + ?Sized>(&mut self, io: &mut I) {
        while let Some(datagram) = io.recv() {
            self.handle_datagram(io, datagram);
        }
        self.run(io);
    }

    /// Run due timers and schedule the next wakeup.
    pub fn run<I: Io + ?Sized>(&mut self, io: &mut I) {
        let now = io.now();
        self.check_liveness(io, now);
        self.flush(now);
        self.prune_unreachable(now);

        let ids: Vec<u32> = self.links.iter().map(|l| l.id()).collect();
        for id in ids {
            let fire = match self.links.get_mut(id) {
                Some(link) => link.trickle.poll(now, &mut self.rng),
                None => false,
            };
            if fire {
                self.diagnostics.announcements_sent += 1;
                self.send_network_state(io, id, HNCP_MULTICAST, now);
            }
        }

        let next = self.next_wakeup(now);
        io.schedule((next - now).max(1));
    }

    /// The next time [`SyncEngine::run`] has work to do.
    pub fn next_wakeup(&self, now: i64) -> i64 {
        let trickles = self.links.iter().map(|l| l.trickle().next_wakeup());
        let liveness = self
            .links
            .next_liveness_deadline(millis(self.config.neighbor_timeout));
        let grace = millis(self.config.node_grace_period);
        let removals = self
            .unreachable_since
            .values()
            .map(|since| since.saturating_add(grace));

        trickles
            .chain(liveness)
            .chain(removals)
            .min()
            .unwrap_or_else(|| now.saturating_add(millis(self.config.trickle_imax)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Receiving
    // ─────────────────────────────────────────────────────────────────────────

    /// Process one datagram. Never fails: problems are logged and counted.
    pub fn handle_datagram<I: Io + ?Sized>(&mut self, io: &mut I, datagram: Datagram) {
        let now = io.now();
        self.diagnostics.messages_received += 1;

        let msg = match Message::decode(&datagram.payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.diagnostics.messages_discarded += 1;
                tracing::debug!(link = datagram.link, src = %datagram.src, error = %e, "discarding datagram");
                return;
            }
        };

        self.diagnostics.malformed_records += msg.errors.len() as u64;
        for e in &msg.errors {
            tracing::debug!(src = %datagram.src, error = %e, "dropped malformed record");
        }
        if let Some(e) = &msg.ordering_violation {
            self.diagnostics.ordering_violations += 1;
            tracing::warn!(src = %datagram.src, error = %e, "peer sent records out of canonical order");
        }

        let Some(sender) = msg.link_id else {
            self.diagnostics.messages_discarded += 1;
            tracing::debug!(src = %datagram.src, "datagram without link id");
            return;
        };
        if sender.node == self.own_id() {
            self.diagnostics.loopback_dropped += 1;
            return;
        }

        let link = datagram.link;
        let src = datagram.src;
        let event = match self
            .links
            .observe(link, sender.node, sender.link_id, src, now)
        {
            Ok(event) => event,
            Err(e) => {
                self.diagnostics.messages_discarded += 1;
                tracing::debug!(link, error = %e, "datagram on unknown link");
                return;
            }
        };
        if event == NeighborEvent::Discovered {
            self.diagnostics.neighbors_discovered += 1;
            tracing::info!(link, neighbor = %sender.node, remote_link = sender.link_id, %src, "neighbor discovered");
            self.inconsistent_on(link, now);
            self.data_changed = true;
        }

        // Full node data first, so the hash comparison below sees it.
        let mut merged = BTreeSet::new();
        for state in msg.node_states.iter().filter(|s| s.data.is_some()) {
            self.merge_node_state(state, now);
            merged.insert(state.node);
        }
        self.flush(now);

        if msg.req_net_hash {
            self.send_network_state(io, link, src, now);
        }
        for id in &msg.req_node_data {
            self.send_node_state(io, link, src, id, now);
        }

        let mut wanted = BTreeSet::new();
        let differs = match msg.network_hash {
            Some(remote) => {
                let local = self.network_hash();
                if remote == local {
                    self.diagnostics.consistent_heard += 1;
                    if let Some(l) = self.links.get_mut(link) {
                        l.trickle.hear_consistent();
                    }
                    false
                } else {
                    self.diagnostics.inconsistent_heard += 1;
                    tracing::debug!(link, neighbor = %sender.node, %remote, %local, "network hash differs");
                    self.inconsistent_on(link, now);
                    true
                }
            }
            None => false,
        };

        if differs || msg.network_hash.is_none() {
            for summary in msg.node_states.iter().filter(|s| !merged.contains(&s.node)) {
                if self.wants(summary, now) {
                    wanted.insert(summary.node);
                }
            }
        }
        if event == NeighborEvent::Discovered && !self.store.contains(&sender.node) {
            wanted.insert(sender.node);
        }

        if !wanted.is_empty() {
            self.request_nodes(io, link, src, &wanted);
        } else if differs && msg.node_states.is_empty() {
            self.request_network_state(io, link, src);
        }

        self.flush(now);
    }

    /// Whether a summary describes data newer than ours.
    fn wants(&mut self, summary: &NodeState, now: i64) -> bool {
        if summary.node == self.own_id() {
            self.check_own_copy(summary.update_number, summary.node_hash, now);
            return false;
        }
        match self.store.get(&summary.node) {
            Some(node) => summary.update_number > node.update_number(),
            None => true,
        }
    }

    /// Someone holds a copy of our node that is at least as new as ours but
    /// differs, e.g. from before a restart. Jump past it.
    fn check_own_copy(&mut self, update_number: u32, hash: Digest, now: i64) {
        let own = self.own_id();
        let current = self.store.self_node().update_number();
        let ours = self.store.node_hash(&own);
        if update_number > current || (update_number == current && ours != Some(hash)) {
            let bumped = self.store.bump_self_update_number(update_number, now);
            self.diagnostics.own_update_bumps += 1;
            tracing::warn!(seen = update_number, now = bumped, "newer copy of own node seen, republishing");
            self.reset_all_trickles(now);
        }
    }

    fn merge_node_state(&mut self, state: &NodeState, now: i64) {
        let Some(data) = &state.data else {
            return;
        };
        let computed = node_hash(&state.node, state.update_number, data);
        if computed != state.node_hash {
            self.diagnostics.hash_mismatches += 1;
            tracing::warn!(node = %state.node, update = state.update_number, "node hash does not match data");
            return;
        }
        if state.node == self.own_id() {
            self.check_own_copy(state.update_number, state.node_hash, now);
            return;
        }

        let origination = now - i64::from(state.ms_since_origination);
        match self
            .store
            .upsert(state.node, state.update_number, origination, data.clone())
        {
            Ok(UpsertResult::Inserted) => {
                tracing::info!(node = %state.node, update = state.update_number, "node added");
                self.reset_all_trickles(now);
            }
            Ok(UpsertResult::Replaced) => {
                tracing::debug!(node = %state.node, update = state.update_number, "node updated");
                self.reset_all_trickles(now);
            }
            Ok(UpsertResult::Stale) => {
                self.diagnostics.stale_updates += 1;
            }
            Err(e) => tracing::debug!(node = %state.node, error = %e, "merge refused"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    fn builder(&self, link: u32) -> std::result::Result<MessageBuilder, EncodeError> {
        MessageBuilder::new(
            LinkId {
                node: self.own_id(),
                link_id: link,
            },
            self.config.max_message_size,
        )
    }

    fn summary(&mut self, id: &NodeIdentifier, hash: Digest, now: i64) -> Option<NodeState> {
        let node = self.store.get(id)?;
        Some(NodeState {
            node: *id,
            update_number: node.update_number(),
            ms_since_origination: u32::try_from(node.age(now).max(0)).unwrap_or(u32::MAX),
            node_hash: hash,
            data: None,
        })
    }

    /// The network hash plus every node summary, split over as many
    /// datagrams as the size limit requires.
    fn network_state_messages(&mut self, link: u32, now: i64) -> Result<Vec<Vec<u8>>> {
        let network = NetworkHash(self.network_hash());
        let hashes = self.store.node_hashes();

        let mut out = Vec::new();
        let mut builder = self.builder(link)?;
        builder.push(&network)?;
        let mut in_message = 0usize;

        for (id, hash) in hashes {
            let Some(summary) = self.summary(&id, hash, now) else {
                continue;
            };
            match builder.push(&summary) {
                Ok(()) => in_message += 1,
                Err(EncodeError::MessageTooLarge { .. }) if in_message > 0 => {
                    out.push(builder.finish()?);
                    builder = self.builder(link)?;
                    builder.push(&network)?;
                    builder.push(&summary)?;
                    in_message = 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        out.push(builder.finish()?);
        Ok(out)
    }

    fn send_network_state<I: Io + ?Sized>(
        &mut self,
        io: &mut I,
        link: u32,
        dst: Ipv6Addr,
        now: i64,
    ) {
        match self.network_state_messages(link, now) {
            Ok(messages) => {
                for payload in messages {
                    self.transmit(io, link, dst, &payload);
                }
            }
            Err(e) => self.encode_failed(link, &e),
        }
    }

    /// A message carrying a single record after the sender's link id.
    fn single_record<R: Record>(
        &self,
        link: u32,
        record: &R,
    ) -> std::result::Result<Vec<u8>, EncodeError> {
        let mut builder = self.builder(link)?;
        builder.push(record)?;
        builder.finish()
    }

    fn node_request_messages(
        &self,
        link: u32,
        ids: &BTreeSet<NodeIdentifier>,
    ) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        let mut builder = self.builder(link)?;
        for id in ids {
            let request = ReqNodeData(*id);
            match builder.push(&request) {
                Ok(()) => {}
                Err(EncodeError::MessageTooLarge { .. }) if !builder.is_empty() => {
                    out.push(builder.finish()?);
                    builder = self.builder(link)?;
                    builder.push(&request)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        out.push(builder.finish()?);
        Ok(out)
    }

    fn send_node_state<I: Io + ?Sized>(
        &mut self,
        io: &mut I,
        link: u32,
        dst: Ipv6Addr,
        id: &NodeIdentifier,
        now: i64,
    ) {
        let Some(hash) = self.store.node_hash(id) else {
            tracing::debug!(node = %id, "request for unknown node ignored");
            return;
        };
        let Some(mut state) = self.summary(id, hash, now) else {
            return;
        };
        state.data = self.store.get(id).map(|n| n.tlvs().clone());

        match self.single_record(link, &state) {
            Ok(payload) => self.transmit(io, link, dst, &payload),
            Err(e) => self.encode_failed(link, &e.into()),
        }
    }

    fn request_nodes<I: Io + ?Sized>(
        &mut self,
        io: &mut I,
        link: u32,
        dst: Ipv6Addr,
        ids: &BTreeSet<NodeIdentifier>,
    ) {
        match self.node_request_messages(link, ids) {
            Ok(messages) => {
                self.diagnostics.node_requests_sent += ids.len() as u64;
                tracing::debug!(link, %dst, count = ids.len(), "requesting node data");
                for payload in messages {
                    self.transmit(io, link, dst, &payload);
                }
            }
            Err(e) => self.encode_failed(link, &e),
        }
    }

    fn request_network_state<I: Io + ?Sized>(&mut self, io: &mut I, link: u32, dst: Ipv6Addr) {
        match self.single_record(link, &ReqNetHash) {
            Ok(payload) => {
                self.diagnostics.network_requests_sent += 1;
                self.transmit(io, link, dst, &payload);
            }
            Err(e) => self.encode_failed(link, &e.into()),
        }
    }

    fn transmit<I: Io + ?Sized>(&mut self, io: &mut I, link: u32, dst: Ipv6Addr, payload: &[u8]) {
        match io.send(link, dst, payload) {
            Ok(()) => self.diagnostics.messages_sent += 1,
            Err(e) => {
                self.diagnostics.send_failures += 1;
                tracing::debug!(link, %dst, error = %e, "send failed");
            }
        }
    }

    fn encode_failed(&mut self, link: u32, error: &SyncError) {
        self.diagnostics.encode_failures += 1;
        tracing::warn!(link, %error, "outbound message abandoned");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────────────────────

    fn check_liveness<I: Io + ?Sized>(&mut self, io: &mut I, now: i64) {
        let timeout = millis(self.config.neighbor_timeout);
        for action in self.links.check_liveness(now, timeout) {
            match action {
                LivenessAction::Probe { link, neighbor } => {
                    self.diagnostics.probes_sent += 1;
                    tracing::debug!(link, neighbor = %neighbor.node, "probing quiet neighbor");
                    self.request_network_state(io, link, neighbor.address);
                }
                LivenessAction::Dropped { link, neighbor } => {
                    self.diagnostics.neighbors_dropped += 1;
                    tracing::info!(link, neighbor = %neighbor.node, "neighbor lost");
                    self.data_changed = true;
                }
            }
        }
    }

    fn prune_unreachable(&mut self, now: i64) {
        let generation = self.store.generation();
        if self.reachability_generation != Some(generation) {
            let unreachable: BTreeSet<NodeIdentifier> =
                unreachable_nodes(&self.store, self.config.assume_bidirectional_reachability)
                    .into_iter()
                    .collect();
            self.unreachable_since
                .retain(|id, _| unreachable.contains(id));
            for id in unreachable {
                self.unreachable_since.entry(id).or_insert_with(|| {
                    tracing::debug!(node = %id, "node unreachable");
                    now
                });
            }
            self.reachability_generation = Some(generation);
        }

        let grace = millis(self.config.node_grace_period);
        let expired: Vec<NodeIdentifier> = self
            .unreachable_since
            .iter()
            .filter(|(_, since)| now.saturating_sub(**since) >= grace)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.unreachable_since.remove(&id);
            if self.store.remove(&id).is_ok() {
                self.diagnostics.nodes_removed += 1;
                tracing::info!(node = %id, "unreachable node removed");
            }
        }
    }
}

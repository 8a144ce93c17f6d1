//! The round coordinator
//!
//! One `Coordinator` value owns all protocol state: the current round
//! parameters, the in-flight proposition, and the socket map keyed by
//! witness account. A 3-second tick drives proposing, retrying and
//! timing out; socket callbacks drive handshakes and verification. All
//! handlers run on one event loop, so a single async mutex over the
//! state is enough.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use meridian_anchor::{AnchorSubmitter, CustomJsonOperation};
use meridian_core::constants::{
    AUTH_TOKEN_LEN, CHAIN_COLLECTION, MAX_ROUND_WAITING_PERIODS, PARAMS_TABLE, ROUND_QUORUM,
    ROUND_TICK_INTERVAL_MS, SCHEDULES_TABLE, WITNESSES_CONTRACT, WITNESSES_TABLE,
};
use meridian_core::crypto::keys::{self, KeyPair};
use meridian_core::crypto::sha256_hex;
use meridian_core::types::{RoundProposition, ScheduleEntry, WitnessParams, WitnessRecord};
use meridian_store::Database;

use crate::error::{WitnessError, WitnessResult};
use crate::message::{
    HandshakeAckPayload, HandshakePayload, PeerEvent, PeerMessage, ProposeRoundAckPayload,
    ProposeRoundPayload, SocketId,
};
use crate::transport::PeerTransport;

const ERR_ROUND_HASH_DIFFERENT: &str = "round hash different";
const ERR_INVALID_SIGNATURE: &str = "invalid signature";
const ERR_NOT_AUTHENTICATED: &str = "not authenticated";
const ERR_NOT_SCHEDULED: &str = "witness not scheduled for this round";
const PROPOSE_ROUND_ACTION: &str = "proposeRound";

#[derive(Debug, Default)]
struct SocketState {
    address: String,
    account: Option<String>,
    /// Challenge token this node issued on the socket.
    issued_token: Option<String>,
    /// The peer's handshake verified against its registered key.
    peer_verified: bool,
    /// The peer countersigned our token correctly.
    proven_to_me: bool,
}

impl SocketState {
    fn authenticated(&self) -> bool {
        self.peer_verified && self.proven_to_me
    }
}

#[derive(Default)]
struct CoordinatorState {
    current_round: u64,
    last_block_round: u64,
    last_verified_block_number: u64,
    current_witness: String,
    last_proposed_round: u64,
    last_verified_round: u64,
    proposition: Option<RoundProposition>,
    waiting_periods: u32,
    submitting: bool,
    sockets: HashMap<SocketId, SocketState>,
    /// Authenticated account -> socket.
    accounts: HashMap<String, SocketId>,
}

/// Per-witness round state machine.
pub struct Coordinator {
    account: String,
    keys: KeyPair,
    chain_id: String,
    db: Arc<Database>,
    transport: Arc<dyn PeerTransport>,
    submitter: AnchorSubmitter,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    pub fn new(
        account: impl Into<String>,
        keys: KeyPair,
        chain_id: impl Into<String>,
        db: Arc<Database>,
        transport: Arc<dyn PeerTransport>,
        submitter: AnchorSubmitter,
    ) -> Self {
        Self {
            account: account.into(),
            keys,
            chain_id: chain_id.into(),
            db,
            transport,
            submitter,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Drive the coordinator until shutdown: the 3-second tick plus the
    /// transport's event stream, interleaved on one loop.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(Duration::from_millis(ROUND_TICK_INTERVAL_MS));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(account = %self.account, "round coordinator stopped");
    }

    /// Dispatch one transport event.
    pub async fn handle_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::Connected { socket, address } => self.on_connected(socket, address).await,
            PeerEvent::Disconnected { socket } => self.on_disconnected(socket).await,
            PeerEvent::Message { socket, message } => match message {
                PeerMessage::Handshake(payload) => self.on_handshake(socket, payload).await,
                PeerMessage::HandshakeAck(payload) => self.on_handshake_ack(socket, payload).await,
                PeerMessage::ProposeRound(payload) => {
                    self.on_propose_round(socket, payload).await
                }
                PeerMessage::ProposeRoundAck(payload) => {
                    self.on_propose_round_ack(socket, payload).await
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    async fn on_connected(&self, socket: SocketId, address: String) {
        {
            let mut state = self.state.lock().await;
            state.sockets.insert(
                socket,
                SocketState {
                    address,
                    ..SocketState::default()
                },
            );
        }
        self.send_challenge(socket).await;
    }

    async fn on_disconnected(&self, socket: SocketId) {
        let mut state = self.state.lock().await;
        if let Some(removed) = state.sockets.remove(&socket) {
            if let Some(account) = removed.account {
                if state.accounts.get(&account) == Some(&socket) {
                    state.accounts.remove(&account);
                    debug!(account = %account, "peer disconnected");
                }
            }
        }
    }

    /// Issue a fresh 32-char token on the socket and challenge the peer.
    async fn send_challenge(&self, socket: SocketId) {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(AUTH_TOKEN_LEN)
            .map(char::from)
            .collect();

        let signature = match self.keys.sign_json(&json!({ "authToken": token })) {
            Ok(signature) => signature,
            Err(e) => {
                warn!(error = %e, "failed to sign handshake token");
                return;
            }
        };

        {
            let mut state = self.state.lock().await;
            let Some(entry) = state.sockets.get_mut(&socket) else {
                return;
            };
            entry.issued_token = Some(token.clone());
        }

        self.send_or_drop(
            socket,
            PeerMessage::Handshake(HandshakePayload {
                auth_token: token,
                signature,
                account: self.account.clone(),
            }),
        )
        .await;
    }

    async fn on_handshake(&self, socket: SocketId, payload: HandshakePayload) {
        if !payload.is_well_formed() {
            warn!(socket, "malformed handshake");
            self.drop_socket(socket).await;
            return;
        }

        let Some(witness) = self.witness_record(&payload.account) else {
            warn!(socket, account = %payload.account, "handshake from unknown witness");
            self.drop_socket(socket).await;
            return;
        };
        if !witness.enabled {
            warn!(socket, account = %payload.account, "handshake from disabled witness");
            self.drop_socket(socket).await;
            return;
        }

        let peer_ip = {
            let state = self.state.lock().await;
            state
                .sockets
                .get(&socket)
                .map(|entry| peer_host(&entry.address))
        };
        match peer_ip {
            Some(ip) if ip == normalize_ip(&witness.ip) => {}
            _ => {
                warn!(socket, account = %payload.account, "handshake from unregistered address");
                self.drop_socket(socket).await;
                return;
            }
        }

        let challenge = json!({ "authToken": payload.auth_token });
        if !keys::verify_json(&challenge, &payload.signature, &witness.signing_key) {
            warn!(socket, account = %payload.account, "handshake signature invalid");
            self.drop_socket(socket).await;
            return;
        }

        let needs_challenge = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.sockets.get_mut(&socket) else {
                return;
            };
            if entry
                .account
                .as_ref()
                .is_some_and(|existing| existing != &payload.account)
            {
                drop(state);
                self.drop_socket(socket).await;
                return;
            }
            entry.account = Some(payload.account.clone());
            entry.peer_verified = true;
            entry.issued_token.is_none()
        };

        // countersign the peer's token
        let signature = match self.keys.sign_json(&challenge) {
            Ok(signature) => signature,
            Err(e) => {
                warn!(error = %e, "failed to countersign handshake");
                return;
            }
        };
        self.send_or_drop(
            socket,
            PeerMessage::HandshakeAck(HandshakeAckPayload {
                auth_token: payload.auth_token,
                signature,
                account: self.account.clone(),
            }),
        )
        .await;

        if needs_challenge {
            self.send_challenge(socket).await;
        }
        self.finalize_authentication(socket).await;
    }

    async fn on_handshake_ack(&self, socket: SocketId, payload: HandshakeAckPayload) {
        if !payload.is_well_formed() {
            self.drop_socket(socket).await;
            return;
        }

        let issued = {
            let state = self.state.lock().await;
            state
                .sockets
                .get(&socket)
                .and_then(|entry| entry.issued_token.clone())
        };
        let Some(issued) = issued else {
            // countersignature without a challenge
            self.drop_socket(socket).await;
            return;
        };
        if issued != payload.auth_token {
            self.drop_socket(socket).await;
            return;
        }

        let Some(witness) = self.witness_record(&payload.account) else {
            self.drop_socket(socket).await;
            return;
        };
        if !keys::verify_json(
            &json!({ "authToken": issued }),
            &payload.signature,
            &witness.signing_key,
        ) {
            warn!(socket, account = %payload.account, "handshake countersignature invalid");
            self.drop_socket(socket).await;
            return;
        }

        {
            let mut state = self.state.lock().await;
            let Some(entry) = state.sockets.get_mut(&socket) else {
                return;
            };
            if entry
                .account
                .as_ref()
                .is_some_and(|existing| existing != &payload.account)
            {
                drop(state);
                self.drop_socket(socket).await;
                return;
            }
            entry.account = Some(payload.account.clone());
            entry.proven_to_me = true;
        }
        self.finalize_authentication(socket).await;
    }

    /// Once both directions verified, bind account -> socket. A second
    /// socket for an already-authenticated account is dropped.
    async fn finalize_authentication(&self, socket: SocketId) {
        let duplicate = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.sockets.get(&socket) else {
                return;
            };
            if !entry.authenticated() {
                return;
            }
            let account = entry.account.clone().expect("authenticated without account");
            match state.accounts.get(&account) {
                Some(existing) if *existing != socket => true,
                _ => {
                    state.accounts.insert(account.clone(), socket);
                    info!(account = %account, socket, "peer authenticated");
                    false
                }
            }
        };
        if duplicate {
            warn!(socket, "duplicate authenticated socket for account");
            self.drop_socket(socket).await;
        }
    }

    // ------------------------------------------------------------------
    // Round tick
    // ------------------------------------------------------------------

    /// One 3-second step of the state machine.
    pub async fn tick(&self) {
        let Some(params) = self.params() else {
            debug!("round params unavailable");
            return;
        };

        {
            let mut state = self.state.lock().await;
            state.current_round = params.round;
            state.last_block_round = params.last_block_round;
            state.last_verified_block_number = params.last_verified_block_number;
            state.current_witness = params.current_witness.clone();
        }

        let in_flight = { self.state.lock().await.proposition.is_some() };
        if in_flight {
            self.drive_in_flight_proposition().await;
        } else {
            self.maybe_propose(&params).await;
        }
    }

    /// Retry, submit or time out the current proposition.
    async fn drive_in_flight_proposition(&self) {
        let (quorum_reached, proposal) = {
            let mut state = self.state.lock().await;
            let Some(proposition) = state.proposition.as_ref() else {
                return;
            };
            let quorum = proposition.signature_count() >= ROUND_QUORUM;
            let proposal = self.own_proposal(proposition);
            let round = proposition.round;

            if !quorum {
                state.waiting_periods += 1;
                if state.waiting_periods >= MAX_ROUND_WAITING_PERIODS {
                    warn!(
                        round,
                        periods = state.waiting_periods,
                        "proposition timed out, discarding"
                    );
                    state.proposition = None;
                    state.waiting_periods = 0;
                    // allow the same round to be proposed again next tick
                    state.last_proposed_round = state.current_round.saturating_sub(1);
                    return;
                }
            }
            (quorum, proposal)
        };

        if quorum_reached {
            self.submit_proposition().await;
        } else if let Some(proposal) = proposal {
            self.broadcast_proposal(&proposal).await;
        }
    }

    /// Propose if scheduled: compute the round hash, sign it, record the
    /// proposition and broadcast it to the round's witnesses.
    async fn maybe_propose(&self, params: &WitnessParams) {
        if params.current_witness != self.account {
            return;
        }
        {
            let state = self.state.lock().await;
            if params.round <= state.last_proposed_round {
                return;
            }
        }
        if params.last_block_round <= params.last_verified_block_number {
            return;
        }

        let round_hash = match self.round_hash(
            params.last_verified_block_number,
            params.last_block_round,
        ) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "cannot compute round hash");
                return;
            }
        };
        let signature = match self.keys.sign_hex_digest(&round_hash) {
            Ok(signature) => signature,
            Err(e) => {
                warn!(error = %e, "cannot sign round hash");
                return;
            }
        };

        let proposal = ProposeRoundPayload {
            round: params.round,
            round_hash: round_hash.clone(),
            signature: signature.clone(),
        };
        {
            let mut state = self.state.lock().await;
            let mut proposition = RoundProposition::new(params.round, round_hash);
            proposition.add_signature(self.account.clone(), signature);
            state.proposition = Some(proposition);
            state.waiting_periods = 0;
            state.last_proposed_round = params.round;
        }
        info!(round = params.round, "proposing round");
        self.broadcast_proposal(&proposal).await;
    }

    fn own_proposal(&self, proposition: &RoundProposition) -> Option<ProposeRoundPayload> {
        proposition
            .signatures
            .iter()
            .find(|(account, _)| account == &self.account)
            .map(|(_, signature)| ProposeRoundPayload {
                round: proposition.round,
                round_hash: proposition.round_hash.clone(),
                signature: signature.clone(),
            })
    }

    /// Send the proposal to every other witness scheduled for the round,
    /// connecting to the ones we have no authenticated socket for yet.
    async fn broadcast_proposal(&self, proposal: &ProposeRoundPayload) {
        let entries = self.schedule_for(proposal.round);
        let already_signed: Vec<String> = {
            let state = self.state.lock().await;
            state
                .proposition
                .as_ref()
                .map(|p| p.signatures.iter().map(|(a, _)| a.clone()).collect())
                .unwrap_or_default()
        };

        for entry in entries {
            if entry.witness == self.account || already_signed.contains(&entry.witness) {
                continue;
            }
            let socket = {
                let state = self.state.lock().await;
                state.accounts.get(&entry.witness).copied()
            };
            match socket {
                Some(socket) => {
                    self.send_or_drop(socket, PeerMessage::ProposeRound(proposal.clone()))
                        .await;
                }
                None => self.connect_to_witness(&entry.witness).await,
            }
        }
    }

    /// Open a socket to a registered witness; the handshake continues on
    /// the event stream and the proposal reaches it on a later tick.
    async fn connect_to_witness(&self, account: &str) {
        let Some(witness) = self.witness_record(account) else {
            return;
        };
        let address = format!("{}:{}", witness.ip, witness.p2p_port);
        if let Err(e) = self.transport.connect(&address).await {
            debug!(account = %account, address = %address, error = %e, "peer connect failed");
        }
    }

    // ------------------------------------------------------------------
    // Verifier side
    // ------------------------------------------------------------------

    async fn on_propose_round(&self, socket: SocketId, payload: ProposeRoundPayload) {
        let account = self.authenticated_account(socket).await;
        let Some(account) = account else {
            self.reply(socket, ProposeRoundAckPayload::error(ERR_NOT_AUTHENTICATED))
                .await;
            return;
        };

        if !payload.is_well_formed() {
            self.reply(socket, ProposeRoundAckPayload::error(ERR_INVALID_SIGNATURE))
                .await;
            return;
        }

        if !self.is_scheduled(payload.round, &account) {
            self.reply(socket, ProposeRoundAckPayload::error(ERR_NOT_SCHEDULED))
                .await;
            return;
        }

        let Some(witness) = self.witness_record(&account) else {
            self.reply(socket, ProposeRoundAckPayload::error(ERR_INVALID_SIGNATURE))
                .await;
            return;
        };
        if !keys::verify_hex_digest(&payload.round_hash, &payload.signature, &witness.signing_key)
        {
            warn!(account = %account, round = payload.round, "proposal signature invalid");
            self.reply(socket, ProposeRoundAckPayload::error(ERR_INVALID_SIGNATURE))
                .await;
            return;
        }

        let Some(params) = self.params() else {
            self.reply(
                socket,
                ProposeRoundAckPayload::error(ERR_ROUND_HASH_DIFFERENT),
            )
            .await;
            return;
        };
        let local_hash = match self.round_hash(
            params.last_verified_block_number,
            params.last_block_round,
        ) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(error = %e, "cannot verify proposal yet");
                self.reply(
                    socket,
                    ProposeRoundAckPayload::error(ERR_ROUND_HASH_DIFFERENT),
                )
                .await;
                return;
            }
        };

        if local_hash != payload.round_hash {
            warn!(
                account = %account,
                round = payload.round,
                "round hash disagreement"
            );
            self.reply(
                socket,
                ProposeRoundAckPayload::error(ERR_ROUND_HASH_DIFFERENT),
            )
            .await;
            return;
        }

        let signature = match self.keys.sign_hex_digest(&local_hash) {
            Ok(signature) => signature,
            Err(e) => {
                warn!(error = %e, "cannot sign verified round hash");
                return;
            }
        };
        {
            let mut state = self.state.lock().await;
            state.last_verified_round = state.last_verified_round.max(payload.round);
        }
        info!(round = payload.round, proposer = %account, "round verified");
        self.reply(
            socket,
            ProposeRoundAckPayload::ok(ProposeRoundPayload {
                round: payload.round,
                round_hash: local_hash,
                signature,
            }),
        )
        .await;
    }

    async fn reply(&self, socket: SocketId, ack: ProposeRoundAckPayload) {
        self.send_or_drop(socket, PeerMessage::ProposeRoundAck(ack))
            .await;
    }

    // ------------------------------------------------------------------
    // Proposer side aggregation
    // ------------------------------------------------------------------

    async fn on_propose_round_ack(&self, socket: SocketId, payload: ProposeRoundAckPayload) {
        let Some(account) = self.authenticated_account(socket).await else {
            return;
        };

        if let Some(err) = payload.err {
            warn!(account = %account, error = %err, "round verification rejected");
            return;
        }
        let Some(data) = payload.data else {
            return;
        };
        if !data.is_well_formed() {
            return;
        }

        let quorum_reached = {
            let mut state = self.state.lock().await;
            let Some(proposition) = state.proposition.as_mut() else {
                // already anchored or discarded; late acks are ignored
                return;
            };
            if data.round != proposition.round || data.round_hash != proposition.round_hash {
                warn!(account = %account, "ack for a different proposition");
                return;
            }
            let Some(witness) = self.witness_record(&account) else {
                return;
            };
            if !keys::verify_hex_digest(&data.round_hash, &data.signature, &witness.signing_key) {
                warn!(account = %account, "ack signature invalid");
                return;
            }
            if !proposition.add_signature(account.clone(), data.signature) {
                return;
            }
            debug!(
                account = %account,
                signatures = proposition.signature_count(),
                "round signature collected"
            );
            proposition.signature_count() >= ROUND_QUORUM
        };

        if quorum_reached {
            self.submit_proposition().await;
        }
    }

    /// Anchor the quorum-signed proposition. The `submitting` flag keeps
    /// exactly one submission in flight even if more acks arrive.
    async fn submit_proposition(&self) {
        let proposition = {
            let mut state = self.state.lock().await;
            if state.submitting {
                return;
            }
            let Some(proposition) = state.proposition.clone() else {
                return;
            };
            state.submitting = true;
            proposition
        };

        let operation = CustomJsonOperation::new(
            &self.account,
            &self.chain_id,
            WITNESSES_CONTRACT,
            PROPOSE_ROUND_ACTION,
            json!({
                "round": proposition.round,
                "roundHash": proposition.round_hash,
                "signatures": proposition.signatures,
            }),
        );
        let operation = match operation {
            Ok(operation) => operation,
            Err(e) => {
                warn!(error = %e, "cannot build round operation");
                self.state.lock().await.submitting = false;
                return;
            }
        };

        let result = self.submitter.submit(&operation).await;
        let mut state = self.state.lock().await;
        state.submitting = false;
        match result {
            Ok(()) => {
                info!(
                    round = proposition.round,
                    signatures = proposition.signature_count(),
                    "round anchored"
                );
                state.proposition = None;
                state.waiting_periods = 0;
            }
            Err(e) => {
                warn!(round = proposition.round, error = %e, "round submission failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Round hash and store reads
    // ------------------------------------------------------------------

    /// Fold the block hashes of `(last_verified, last_block]` into the
    /// incremental round hash.
    pub fn round_hash(&self, last_verified: u64, last_block: u64) -> WitnessResult<String> {
        let mut hash = String::new();
        for block_number in (last_verified + 1)..=last_block {
            let block = self
                .db
                .find_one(CHAIN_COLLECTION, &json!({ "blockNumber": block_number }))
                .ok_or(WitnessError::MissingBlock(block_number))?;
            let block_hash = block
                .get("hash")
                .and_then(Value::as_str)
                .ok_or(WitnessError::MissingBlock(block_number))?;
            hash = sha256_hex(format!("{hash}{block_hash}"));
        }
        Ok(hash)
    }

    fn params(&self) -> Option<WitnessParams> {
        let row = self.db.find_one(PARAMS_TABLE, &json!({}))?;
        serde_json::from_value(strip_id(row)).ok()
    }

    fn witness_record(&self, account: &str) -> Option<WitnessRecord> {
        let row = self
            .db
            .find_one(WITNESSES_TABLE, &json!({ "account": account }))?;
        serde_json::from_value(strip_id(row)).ok()
    }

    fn schedule_for(&self, round: u64) -> Vec<ScheduleEntry> {
        self.db
            .find(SCHEDULES_TABLE, &json!({ "round": round }))
            .into_iter()
            .filter_map(|row| serde_json::from_value(strip_id(row)).ok())
            .collect()
    }

    fn is_scheduled(&self, round: u64, account: &str) -> bool {
        self.db
            .find_one(SCHEDULES_TABLE, &json!({ "round": round, "witness": account }))
            .is_some()
    }

    // ------------------------------------------------------------------
    // Socket helpers
    // ------------------------------------------------------------------

    async fn authenticated_account(&self, socket: SocketId) -> Option<String> {
        let state = self.state.lock().await;
        state
            .sockets
            .get(&socket)
            .filter(|entry| entry.authenticated())
            .and_then(|entry| entry.account.clone())
    }

    async fn send_or_drop(&self, socket: SocketId, message: PeerMessage) {
        if let Err(e) = self.transport.send(socket, &message).await {
            debug!(socket, kind = message.kind(), error = %e, "send failed");
            self.drop_socket(socket).await;
        }
    }

    async fn drop_socket(&self, socket: SocketId) {
        let _ = self.transport.disconnect(socket).await;
        self.on_disconnected(socket).await;
    }

    // ------------------------------------------------------------------
    // Test and introspection surface
    // ------------------------------------------------------------------

    pub async fn proposition(&self) -> Option<RoundProposition> {
        self.state.lock().await.proposition.clone()
    }

    pub async fn last_proposed_round(&self) -> u64 {
        self.state.lock().await.last_proposed_round
    }

    pub async fn last_verified_round(&self) -> u64 {
        self.state.lock().await.last_verified_round
    }

    pub async fn is_peer_authenticated(&self, account: &str) -> bool {
        let state = self.state.lock().await;
        state
            .accounts
            .get(account)
            .and_then(|socket| state.sockets.get(socket))
            .is_some_and(SocketState::authenticated)
    }
}

/// Host part of `ip:port`, with IPv6-mapped IPv4 normalized.
fn peer_host(address: &str) -> String {
    let host = address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address);
    normalize_ip(host)
}

/// Strip the IPv6-mapped prefix so `::ffff:10.0.0.1` authorizes as
/// `10.0.0.1`.
fn normalize_ip(ip: &str) -> String {
    ip.strip_prefix("::ffff:").unwrap_or(ip).to_string()
}

fn strip_id(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove("_id");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_host_strips_port_and_mapped_prefix() {
        assert_eq!(peer_host("10.0.0.1:5001"), "10.0.0.1");
        assert_eq!(peer_host("::ffff:10.0.0.1:5001"), "10.0.0.1");
        assert_eq!(peer_host("10.0.0.1"), "10.0.0.1");
        assert_eq!(normalize_ip("::ffff:10.0.0.1"), "10.0.0.1");
        assert_eq!(normalize_ip("10.0.0.1"), "10.0.0.1");
    }
}

//! Per-auction live session: room membership, event routing, bid submission.
//!
//! One [`AuctionSession`] is one open auction view. All of its mutable state
//! — the live price view, the bid ledger, the join flag, the in-flight bid —
//! is owned by a single task, and every input (broadcast events, user
//! commands, connection transitions, resync results, ack deadlines) is an arm
//! of that task's `select!` loop. Ordering is arrival order and nothing needs
//! a lock.
//!
//! Bid round trips do not block the loop: a submission parks as an
//! `InFlightBid` and the loop keeps applying broadcasts while the server
//! decides, so the price can move under an unresolved bid exactly as it does
//! for every other observer.

use std::future;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use mandi_shared::{AuctionSnapshot, BidRecord, ClientCommand, ServerEvent, WsEnvelope};

use crate::api_client::ApiClient;
use crate::bidding::{self, BidReceipt, InFlightBid, ViewerRole};
use crate::config::LiveConfig;
use crate::error::{ApiError, BidError, JoinError};
use crate::ledger::{BidEntry, BidHistoryLedger};
use crate::live_state::AuctionLiveState;
use crate::ws::{ConnectionState, WsConnection, WsHandle};

/// Identity of the viewer joining an auction room.
#[derive(Debug, Clone, Copy)]
pub struct JoinParams {
    pub auction_id: i64,
    pub user_id: i64,
    pub role: ViewerRole,
}

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bounded wait for join/bid acknowledgments.
    pub ack_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&LiveConfig> for SessionConfig {
    fn from(config: &LiveConfig) -> Self {
        Self {
            ack_timeout: config.ack_timeout,
        }
    }
}

/// A joined auction view.
///
/// Created by [`AuctionSession::join`]; destroyed by
/// [`leave`](AuctionSession::leave) or by dropping. Per-auction state is
/// never shared between sessions — two views
/// of the same auction each run their own session over the (shareable)
/// connection.
#[derive(Debug)]
pub struct AuctionSession {
    auction_id: i64,
    commands: mpsc::Sender<SessionCommand>,
    live: watch::Receiver<AuctionLiveState>,
    bids: watch::Receiver<Vec<BidEntry>>,
    joined: watch::Receiver<bool>,
}

enum SessionCommand {
    SubmitBid {
        increment: Decimal,
        reply: oneshot::Sender<Result<BidReceipt, BidError>>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

enum ResyncOutcome {
    Fresh {
        snapshot: AuctionSnapshot,
        history: Option<Vec<BidRecord>>,
    },
    Failed(ApiError),
}

impl AuctionSession {
    /// Join an auction room and spin up the session.
    ///
    /// Sends the join request, awaits the server's ack within the configured
    /// timeout, then fetches the snapshot and bid history from the REST
    /// collaborator to initialize the live state and seed the ledger.
    /// Broadcasts that arrive between the join ack and the seed are held back
    /// and applied afterwards, deduplicated against the seeded history.
    pub async fn join(
        connection: &WsConnection,
        api: ApiClient,
        params: JoinParams,
        config: SessionConfig,
    ) -> Result<Self, JoinError> {
        let conn_state = connection.state();
        if !conn_state.borrow().is_connected() {
            return Err(JoinError::NotConnected);
        }

        // Subscribe before sending the join so nothing slips past.
        let mut events = connection.events();
        let handle = connection.handle();

        let join_nonce = handle
            .send(ClientCommand::JoinAuction {
                auction_id: params.auction_id,
                user_id: params.user_id,
            })
            .map_err(|_| JoinError::NotConnected)?;

        let mut backlog = Vec::new();
        let deadline = Instant::now() + config.ack_timeout;
        loop {
            let envelope = match timeout_at(deadline, events.recv()).await {
                Err(_) => return Err(JoinError::Timeout),
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(JoinError::ConnectionLost)
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "event stream lagged while awaiting join ack");
                    continue;
                }
                Ok(Ok(envelope)) => envelope,
            };
            match &envelope.payload {
                ServerEvent::Ack { nonce, .. } if *nonce == join_nonce => break,
                ServerEvent::Error {
                    correlation_id: Some(correlation),
                    message,
                    ..
                } if *correlation == join_nonce => {
                    return Err(JoinError::Rejected(message.clone()));
                }
                _ => backlog.push(envelope),
            }
        }
        info!(auction_id = params.auction_id, "joined auction room");

        let snapshot = api.fetch_auction_snapshot(params.auction_id).await?;
        let history = api.fetch_bid_history(params.auction_id).await?;

        let mut live = AuctionLiveState::new(params.auction_id);
        live.initialize(&snapshot);
        let mut ledger = BidHistoryLedger::new();
        ledger.seed(history.iter().map(BidEntry::from_record).collect());

        let (live_tx, live_rx) = watch::channel(live);
        let (bids_tx, bids_rx) = watch::channel(ledger.entries().to_vec());
        let (joined_tx, joined_rx) = watch::channel(true);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (resync_tx, resync_rx) = mpsc::channel(4);

        let mut task = SessionTask {
            auction_id: params.auction_id,
            user_id: params.user_id,
            role: params.role,
            ack_timeout: config.ack_timeout,
            handle,
            api,
            live,
            ledger,
            joined: true,
            in_flight: None,
            pending_join: None,
            live_tx,
            bids_tx,
            joined_tx,
            resync_tx,
        };

        for envelope in backlog {
            task.handle_event(envelope);
        }

        tokio::spawn(task.run(events, conn_state, cmd_rx, resync_rx));

        Ok(Self {
            auction_id: params.auction_id,
            commands: cmd_tx,
            live: live_rx,
            bids: bids_rx,
            joined: joined_rx,
        })
    }

    pub fn auction_id(&self) -> i64 {
        self.auction_id
    }

    /// Observe the synchronized live state.
    pub fn live_state(&self) -> watch::Receiver<AuctionLiveState> {
        self.live.clone()
    }

    /// Observe the bid ledger, ascending by observation time.
    pub fn bids(&self) -> watch::Receiver<Vec<BidEntry>> {
        self.bids.clone()
    }

    /// Observe room membership. Goes false on transport loss and back to
    /// true once the automatic re-join is acknowledged.
    pub fn joined(&self) -> watch::Receiver<bool> {
        self.joined.clone()
    }

    /// Validate and submit a bid of `increment` over the current price.
    ///
    /// Validation failures resolve immediately without touching the network.
    /// On success the ledger is NOT updated here — the `bidPlaced` broadcast
    /// is the single update path for every observer, submitter included.
    pub async fn submit_bid(&self, increment: Decimal) -> Result<BidReceipt, BidError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::SubmitBid {
                increment,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BidError::SessionClosed)?;
        reply_rx.await.map_err(|_| BidError::SessionClosed)?
    }

    /// Leave the auction room. Best-effort: the leave frame may be lost if
    /// the transport is down, which is fine — the session is over either way.
    pub async fn leave(self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Leave { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

struct PendingJoin {
    nonce: String,
    deadline: Instant,
}

struct SessionTask {
    auction_id: i64,
    user_id: i64,
    role: ViewerRole,
    ack_timeout: Duration,
    handle: WsHandle,
    api: ApiClient,
    live: AuctionLiveState,
    ledger: BidHistoryLedger,
    joined: bool,
    in_flight: Option<InFlightBid>,
    pending_join: Option<PendingJoin>,
    live_tx: watch::Sender<AuctionLiveState>,
    bids_tx: watch::Sender<Vec<BidEntry>>,
    joined_tx: watch::Sender<bool>,
    resync_tx: mpsc::Sender<ResyncOutcome>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<WsEnvelope<ServerEvent>>,
        mut conn_state: watch::Receiver<ConnectionState>,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut resyncs: mpsc::Receiver<ResyncOutcome>,
    ) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::SubmitBid { increment, reply }) => {
                        self.handle_submit(increment, reply);
                    }
                    Some(SessionCommand::Leave { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        return;
                    }
                    // The session handle was dropped; same as leaving.
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                event = events.recv() => match event {
                    Ok(envelope) => self.handle_event(envelope),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            auction_id = self.auction_id,
                            skipped, "event stream lagged; resyncing"
                        );
                        self.start_resync();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.on_transport_down();
                        self.shutdown();
                        return;
                    }
                },
                changed = conn_state.changed() => match changed {
                    Ok(()) => {
                        let state = conn_state.borrow_and_update().clone();
                        self.handle_connection_transition(state);
                    }
                    Err(_) => {
                        self.on_transport_down();
                        self.shutdown();
                        return;
                    }
                },
                outcome = resyncs.recv() => {
                    if let Some(outcome) = outcome {
                        self.handle_resync_outcome(outcome);
                    }
                },
                _ = sleep_until_or_forever(deadline) => self.handle_ack_deadline(),
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (&self.in_flight, &self.pending_join) {
            (Some(bid), Some(join)) => Some(bid.deadline.min(join.deadline)),
            (Some(bid), None) => Some(bid.deadline),
            (None, Some(join)) => Some(join.deadline),
            (None, None) => None,
        }
    }

    fn handle_submit(
        &mut self,
        increment: Decimal,
        reply: oneshot::Sender<Result<BidReceipt, BidError>>,
    ) {
        let joined = self.joined && self.handle.is_connected();
        let bid_amount = match bidding::validate_bid(
            joined,
            self.role,
            increment,
            &self.live,
            self.in_flight.is_some(),
        ) {
            Ok(amount) => amount,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        match self.handle.send(ClientCommand::PlaceBid {
            auction_id: self.auction_id,
            bidder_user_id: self.user_id,
            bid_amount,
        }) {
            Ok(nonce) => {
                debug!(auction_id = self.auction_id, %bid_amount, "bid submitted");
                self.in_flight = Some(InFlightBid {
                    nonce,
                    bid_amount,
                    deadline: Instant::now() + self.ack_timeout,
                    reply,
                });
            }
            // Transport dropped between the validation check and the send.
            Err(_) => {
                let _ = reply.send(Err(BidError::NotJoined));
            }
        }
    }

    fn handle_event(&mut self, envelope: WsEnvelope<ServerEvent>) {
        match envelope.payload {
            ServerEvent::BidPlaced {
                auction_id,
                current_price,
                min_increment,
                user_id,
            } => {
                if self
                    .live
                    .apply_bid_placed(auction_id, current_price, min_increment)
                {
                    self.publish_live();
                    self.ledger.observe(BidEntry {
                        price: current_price,
                        bidder_user_id: user_id,
                        observed_at: envelope.ts,
                    });
                    self.publish_bids();
                }
            }
            ServerEvent::PriceTick {
                auction_id,
                current_price,
                min_increment,
                status,
            } => {
                // A tick tagged for another auction is not ours; untagged
                // ticks belong to the room they were delivered on.
                if auction_id.map_or(true, |id| id == self.auction_id) {
                    self.live.apply_price_tick(current_price, min_increment, status);
                    self.publish_live();
                }
            }
            ServerEvent::Ack {
                nonce,
                current_price,
            } => self.handle_ack(nonce, current_price),
            ServerEvent::Error {
                code,
                message,
                current_price,
                correlation_id,
            } => self.handle_server_error(code, message, current_price, correlation_id),
        }
    }

    fn handle_ack(&mut self, nonce: String, current_price: Option<Decimal>) {
        if self
            .pending_join
            .as_ref()
            .is_some_and(|pending| pending.nonce == nonce)
        {
            info!(auction_id = self.auction_id, "re-joined auction room");
            self.pending_join = None;
            self.set_joined(true);
            // The gap may have swallowed events; trust nothing, refetch.
            self.start_resync();
            return;
        }

        match self.in_flight.take() {
            Some(bid) if bid.nonce == nonce => {
                let _ = bid.reply.send(Ok(BidReceipt {
                    bid_amount: bid.bid_amount,
                    confirmed_price: current_price,
                }));
            }
            other => {
                self.in_flight = other;
                debug!(auction_id = self.auction_id, %nonce, "ack for unknown request");
            }
        }
    }

    fn handle_server_error(
        &mut self,
        code: String,
        message: String,
        current_price: Option<Decimal>,
        correlation_id: Option<String>,
    ) {
        let Some(correlation) = correlation_id else {
            warn!(auction_id = self.auction_id, %code, %message, "server error");
            return;
        };

        if self
            .pending_join
            .as_ref()
            .is_some_and(|pending| pending.nonce == correlation)
        {
            // The server refused the re-join (auction gone, for instance).
            // Stay un-joined; bids keep failing with NotJoined.
            error!(auction_id = self.auction_id, %code, %message, "re-join rejected");
            self.pending_join = None;
            return;
        }

        match self.in_flight.take() {
            Some(bid) if bid.nonce == correlation => {
                let _ = bid.reply.send(Err(BidError::Rejected {
                    message,
                    current_price,
                }));
            }
            other => {
                self.in_flight = other;
                warn!(auction_id = self.auction_id, %code, %message, "server error");
            }
        }
    }

    fn handle_connection_transition(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                // The transport only announces Connected on reconnects (the
                // initial Connected predates this session), and the watch
                // channel coalesces rapid transitions — so even if the loss
                // itself was never observed, membership is gone and must be
                // re-established.
                self.on_transport_down();
                self.send_join();
            }
            ConnectionState::Reconnecting { .. }
            | ConnectionState::Disconnected
            | ConnectionState::Failed { .. } => self.on_transport_down(),
            ConnectionState::Connecting => {}
        }
    }

    fn on_transport_down(&mut self) {
        self.pending_join = None;
        if self.joined {
            self.set_joined(false);
        }
        if let Some(bid) = self.in_flight.take() {
            let _ = bid.reply.send(Err(BidError::ConnectionLost));
        }
    }

    fn send_join(&mut self) {
        match self.handle.send(ClientCommand::JoinAuction {
            auction_id: self.auction_id,
            user_id: self.user_id,
        }) {
            Ok(nonce) => {
                debug!(auction_id = self.auction_id, "re-joining auction room");
                self.pending_join = Some(PendingJoin {
                    nonce,
                    deadline: Instant::now() + self.ack_timeout,
                });
            }
            Err(e) => debug!(auction_id = self.auction_id, error = %e, "cannot re-join yet"),
        }
    }

    fn handle_ack_deadline(&mut self) {
        let now = Instant::now();

        if self
            .in_flight
            .as_ref()
            .is_some_and(|bid| bid.deadline <= now)
        {
            if let Some(bid) = self.in_flight.take() {
                warn!(auction_id = self.auction_id, "bid acknowledgment timed out");
                let _ = bid.reply.send(Err(BidError::Timeout));
            }
        }

        if self
            .pending_join
            .as_ref()
            .is_some_and(|pending| pending.deadline <= now)
        {
            warn!(auction_id = self.auction_id, "join acknowledgment timed out; retrying");
            self.pending_join = None;
            self.send_join();
        }
    }

    fn start_resync(&self) {
        let api = self.api.clone();
        let auction_id = self.auction_id;
        let outcomes = self.resync_tx.clone();
        // Fetched off the session loop so broadcasts keep applying while the
        // round trip is in the air.
        tokio::spawn(async move {
            let outcome = match api.fetch_auction_snapshot(auction_id).await {
                Ok(snapshot) => {
                    let history = match api.fetch_bid_history(auction_id).await {
                        Ok(rows) => Some(rows),
                        Err(e) => {
                            warn!(auction_id, error = %e, "history refetch failed during resync");
                            None
                        }
                    };
                    ResyncOutcome::Fresh { snapshot, history }
                }
                Err(e) => ResyncOutcome::Failed(e),
            };
            let _ = outcomes.send(outcome).await;
        });
    }

    fn handle_resync_outcome(&mut self, outcome: ResyncOutcome) {
        match outcome {
            ResyncOutcome::Fresh { snapshot, history } => {
                info!(auction_id = self.auction_id, "resynced from snapshot");
                self.live.resync(&snapshot);
                self.publish_live();
                if let Some(rows) = history {
                    for row in &rows {
                        self.ledger.observe(BidEntry::from_record(row));
                    }
                    self.publish_bids();
                }
            }
            ResyncOutcome::Failed(e) => {
                // Stays stale until the next reconnect or lag trigger.
                error!(auction_id = self.auction_id, error = %e, "resync fetch failed");
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(bid) = self.in_flight.take() {
            let _ = bid.reply.send(Err(BidError::SessionClosed));
        }
        // Best-effort; the room ends with the session either way.
        if let Err(e) = self.handle.send(ClientCommand::LeaveAuction {
            auction_id: self.auction_id,
        }) {
            debug!(auction_id = self.auction_id, error = %e, "leave not sent");
        }
        info!(auction_id = self.auction_id, "auction session closed");
    }

    fn set_joined(&mut self, joined: bool) {
        self.joined = joined;
        self.joined_tx.send_replace(joined);
    }

    fn publish_live(&self) {
        self.live_tx.send_replace(self.live);
    }

    fn publish_bids(&self) {
        self.bids_tx.send_replace(self.ledger.entries().to_vec());
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}

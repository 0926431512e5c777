//! In-process collaborators for integration tests: a mock live-auction
//! WebSocket server and a mock REST server for snapshots and bid history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use mandi_client::shared::{
    AuctionSnapshot, AuctionStatus, BidRecord, ClientCommand, PageInfo, PagedResponse,
    ServerEvent, WsEnvelope,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_test_writer()
        .try_init();
}

// --- Mock live-auction WebSocket server ---

pub struct ServerOptions {
    pub auction_id: i64,
    pub start_price: Decimal,
    pub min_increment: Decimal,
    /// Delay before answering `placeBid` frames (join acks stay immediate).
    pub bid_ack_delay: Duration,
    /// Close the socket right after acking the first join, to exercise the
    /// client's reconnect/re-join path.
    pub drop_after_first_join: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            auction_id: 7,
            start_price: Decimal::from(1000),
            min_increment: Decimal::from(50),
            bid_ack_delay: Duration::ZERO,
            drop_after_first_join: false,
        }
    }
}

struct Room {
    price: Decimal,
    min_increment: Decimal,
    open: bool,
}

struct ServerState {
    options: ServerOptions,
    room: Mutex<Room>,
    joins: AtomicU32,
    leaves: AtomicU32,
    bids_received: AtomicU32,
    broadcast: broadcast::Sender<WsEnvelope<ServerEvent>>,
}

pub struct MockAuctionServer {
    pub ws_url: String,
    state: Arc<ServerState>,
}

impl MockAuctionServer {
    pub async fn spawn(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let ws_url = format!("ws://{}", listener.local_addr().expect("addr"));

        let (broadcast_tx, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            room: Mutex::new(Room {
                price: options.start_price,
                min_increment: options.min_increment,
                open: true,
            }),
            options,
            joins: AtomicU32::new(0),
            leaves: AtomicU32::new(0),
            bids_received: AtomicU32::new(0),
            broadcast: broadcast_tx,
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_socket(stream, accept_state.clone()));
            }
        });

        Self { ws_url, state }
    }

    pub fn joins(&self) -> u32 {
        self.state.joins.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> u32 {
        self.state.leaves.load(Ordering::SeqCst)
    }

    pub fn bids_received(&self) -> u32 {
        self.state.bids_received.load(Ordering::SeqCst)
    }

    /// Raise the server-side floor without telling anyone, simulating a bid
    /// accepted elsewhere that this client has not yet heard about.
    pub fn set_price(&self, price: Decimal) {
        self.state.room.lock().expect("lock").price = price;
    }

    /// Broadcast a status-only price tick to every joined connection.
    pub fn broadcast_status(&self, status: AuctionStatus) {
        if !status.is_open() {
            self.state.room.lock().expect("lock").open = false;
        }
        let tick = ServerEvent::PriceTick {
            auction_id: Some(self.state.options.auction_id),
            current_price: None,
            min_increment: None,
            status: Some(status),
        };
        let _ = self.state.broadcast.send(envelope(tick, None));
    }
}

fn envelope(payload: ServerEvent, correlation_id: Option<String>) -> WsEnvelope<ServerEvent> {
    WsEnvelope {
        id: uuid::Uuid::new_v4().to_string(),
        payload,
        ts: Utc::now(),
        correlation_id,
    }
}

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

async fn send_event(write: &mut WsWriter, event: WsEnvelope<ServerEvent>) -> bool {
    let json = serde_json::to_string(&event).expect("serialize event");
    write.send(Message::text(json)).await.is_ok()
}

async fn handle_socket(stream: TcpStream, state: Arc<ServerState>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws.split();
    let mut events = state.broadcast.subscribe();
    let mut joined = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else { break };
                if joined && !send_event(&mut write, event).await {
                    break;
                }
            }
            frame = read.next() => {
                let Some(Ok(frame)) = frame else { break };
                let Message::Text(text) = frame else { continue };
                let Ok(request) = serde_json::from_str::<WsEnvelope<ClientCommand>>(text.as_str())
                else {
                    continue;
                };
                if !handle_command(request, &state, &mut joined, &mut write).await {
                    break;
                }
            }
        }
    }
}

/// Returns whether the connection should keep serving.
async fn handle_command(
    request: WsEnvelope<ClientCommand>,
    state: &Arc<ServerState>,
    joined: &mut bool,
    write: &mut WsWriter,
) -> bool {
    match request.payload {
        ClientCommand::JoinAuction { auction_id, .. } => {
            if auction_id != state.options.auction_id {
                let error = ServerEvent::Error {
                    code: "AUCTION_NOT_FOUND".to_string(),
                    message: format!("auction {auction_id} not found"),
                    current_price: None,
                    correlation_id: Some(request.id.clone()),
                };
                return send_event(write, envelope(error, Some(request.id))).await;
            }

            let join_number = state.joins.fetch_add(1, Ordering::SeqCst) + 1;
            *joined = true;
            let ack = ServerEvent::Ack {
                nonce: request.id.clone(),
                current_price: None,
            };
            if !send_event(write, envelope(ack, Some(request.id))).await {
                return false;
            }
            if state.options.drop_after_first_join && join_number == 1 {
                let _ = write.send(Message::Close(None)).await;
                return false;
            }
            true
        }

        ClientCommand::LeaveAuction { .. } => {
            state.leaves.fetch_add(1, Ordering::SeqCst);
            *joined = false;
            let ack = ServerEvent::Ack {
                nonce: request.id.clone(),
                current_price: None,
            };
            send_event(write, envelope(ack, Some(request.id))).await
        }

        ClientCommand::PlaceBid {
            auction_id,
            bidder_user_id,
            bid_amount,
        } => {
            state.bids_received.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(state.options.bid_ack_delay).await;

            let verdict = {
                let mut room = state.room.lock().expect("lock");
                if !room.open {
                    Err(("AUCTION_CLOSED", "auction is closed".to_string(), room.price))
                } else if bid_amount < room.price + room.min_increment {
                    Err((
                        "BID_TOO_LOW",
                        format!("bid {bid_amount} is below the floor"),
                        room.price,
                    ))
                } else {
                    room.price = bid_amount;
                    Ok((room.price, room.min_increment))
                }
            };

            match verdict {
                Ok((price, min_increment)) => {
                    let _ = state.broadcast.send(envelope(
                        ServerEvent::BidPlaced {
                            auction_id,
                            current_price: price,
                            min_increment,
                            user_id: bidder_user_id,
                        },
                        None,
                    ));
                    let ack = ServerEvent::Ack {
                        nonce: request.id.clone(),
                        current_price: Some(price),
                    };
                    send_event(write, envelope(ack, Some(request.id))).await
                }
                Err((code, message, price)) => {
                    let error = ServerEvent::Error {
                        code: code.to_string(),
                        message,
                        current_price: Some(price),
                        correlation_id: Some(request.id.clone()),
                    };
                    send_event(write, envelope(error, Some(request.id))).await
                }
            }
        }
    }
}

// --- Mock REST collaborator ---

#[derive(Clone)]
struct RestState {
    snapshot: Arc<Mutex<AuctionSnapshot>>,
    history: Arc<Mutex<Vec<BidRecord>>>,
    page_size: usize,
}

pub struct MockRestServer {
    pub base_url: String,
    state: RestState,
}

impl MockRestServer {
    pub async fn spawn(snapshot: AuctionSnapshot, history: Vec<BidRecord>) -> Self {
        let state = RestState {
            snapshot: Arc::new(Mutex::new(snapshot)),
            history: Arc::new(Mutex::new(history)),
            page_size: 2,
        };

        let app = Router::new()
            .route("/api/auctions/:id", get(get_snapshot))
            .route("/api/auctions/:id/bids", get(get_bids))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("rest server");
        });

        Self { base_url, state }
    }

    pub fn update_snapshot(&self, update: impl FnOnce(&mut AuctionSnapshot)) {
        update(&mut self.state.snapshot.lock().expect("lock"));
    }
}

async fn get_snapshot(State(state): State<RestState>) -> Json<AuctionSnapshot> {
    Json(state.snapshot.lock().expect("lock").clone())
}

async fn get_bids(
    State(state): State<RestState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<PagedResponse<BidRecord>> {
    let offset: usize = params
        .get("cursor")
        .and_then(|cursor| cursor.parse().ok())
        .unwrap_or(0);
    let rows = state.history.lock().expect("lock");
    let items: Vec<_> = rows.iter().skip(offset).take(state.page_size).cloned().collect();
    let end = offset + items.len();
    let next_cursor = (end < rows.len()).then(|| end.to_string());
    Json(PagedResponse {
        items,
        page: PageInfo {
            next_cursor,
            prev_cursor: None,
        },
    })
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker WebSocket sessions.
//!
//! Each connected hub gets one session task pumping frames between the
//! socket and the broker loop. The first frame must be `ready`; everything
//! after flows through [`BrokerHandle::worker_frame`]. One writer per
//! session: the broker's outbound channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hearth_proto::{keys, Frame};

use crate::state::GatewayState;

use super::core::WorkerRegistration;

/// How long a fresh socket may dawdle before sending `ready`.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// `GET /ws/worker` — WebSocket upgrade for hub workers.
pub async fn ws_worker_handler(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_worker_socket(state, socket))
}

async fn handle_worker_socket(state: Arc<GatewayState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Registration frame first.
    let ready = tokio::time::timeout(READY_TIMEOUT, ws_rx.next()).await;
    let (service, identity, public_key) = match ready {
        Ok(Some(Ok(Message::Text(text)))) => match Frame::decode(text.as_str()) {
            Ok(Frame::Ready { service, identity, public_key }) => {
                (service, identity, public_key)
            }
            other => {
                debug!(?other, "worker sent a non-ready first frame");
                return;
            }
        },
        other => {
            debug!(timed_out = other.is_err(), "worker never sent ready");
            return;
        }
    };

    if identity.is_empty() {
        warn!("worker ready frame without an identity");
        return;
    }
    // Key material is carried and format-checked; verification is a
    // pluggable step that does not run here.
    if let Some(ref key) = public_key {
        if !key.is_empty() && !keys::is_valid_public_key(key) {
            warn!(identity, "rejecting worker with malformed public key");
            return;
        }
    }

    let session = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    let cancel = CancellationToken::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);
    state
        .broker
        .register_worker(WorkerRegistration {
            identity: identity.clone(),
            service,
            public_key,
            outbound: outbound_tx,
            cancel: cancel.clone(),
            session,
        })
        .await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let Ok(text) = frame.encode() else { continue };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match Frame::decode(text.as_str()) {
                            Ok(frame) => {
                                state.broker.worker_frame(&identity, session, frame).await;
                            }
                            Err(e) => {
                                debug!(identity, err = %e, "undecodable worker frame dropped");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        state.broker.worker_frame(&identity, session, Frame::Heartbeat).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(identity, err = %e, "worker socket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broker.session_closed(&identity, session).await;
    debug!(identity, session, "worker session ended");
}

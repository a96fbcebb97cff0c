// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker session: one long-lived WebSocket per hub.
//!
//! Connects to the gateway broker, advertises `hub.control` under the
//! hub's identity, serves dispatched requests, and heartbeats. On any
//! loss it backs off (10 s doubling to 60 s, reset on successful
//! registration) and reconnects; in-flight requests are abandoned and the
//! broker times them out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hearth_proto::{Frame, ServiceErrorCode, ServiceResponse, HUB_CONTROL_SERVICE};

use crate::handlers::HubState;

/// Observable session state, reported by the `status` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Ready,
    Handling,
    Backoff,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Handling => "handling",
            Self::Backoff => "backoff",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Connection parameters for the session loop.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub broker_url: String,
    pub hub_id: String,
    pub public_key: Option<String>,
    pub heartbeat: Duration,
    pub liveness: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

enum SessionEnd {
    Shutdown,
    Lost,
}

enum FrameOutcome {
    Continue,
    Lost,
}

/// Run the session loop until shutdown: connect, serve, back off, repeat.
pub async fn run(state: Arc<HubState>, opts: WorkerOptions, shutdown: CancellationToken) {
    let mut delay = opts.reconnect_initial;
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        set_state(&state, SessionState::Connecting).await;
        match serve_session(&state, &opts, &shutdown, &mut delay).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost => {
                set_state(&state, SessionState::Backoff).await;
                debug!(hub_id = %opts.hub_id, delay_secs = delay.as_secs(), "reconnecting after backoff");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => break,
                }
                delay = next_backoff(delay, opts.reconnect_max);
            }
        }
    }
    set_state(&state, SessionState::Disconnected).await;
}

/// One connection attempt and, if registration succeeds, its serve loop.
async fn serve_session(
    state: &Arc<HubState>,
    opts: &WorkerOptions,
    shutdown: &CancellationToken,
    delay: &mut Duration,
) -> SessionEnd {
    let (ws, _) = match connect_async(&opts.broker_url).await {
        Ok(conn) => conn,
        Err(e) => {
            debug!(broker = %opts.broker_url, err = %e, "broker connect failed");
            return SessionEnd::Lost;
        }
    };
    let (mut ws_tx, mut ws_rx) = ws.split();

    let ready = Frame::Ready {
        service: HUB_CONTROL_SERVICE.to_owned(),
        identity: opts.hub_id.clone(),
        public_key: opts.public_key.clone(),
    };
    if send_frame(&mut ws_tx, &ready).await.is_err() {
        return SessionEnd::Lost;
    }
    info!(broker = %opts.broker_url, hub_id = %opts.hub_id, "registered with broker");
    *delay = opts.reconnect_initial;
    set_state(state, SessionState::Ready).await;

    // Replies from in-flight handler tasks funnel through one writer.
    let (reply_tx, mut reply_rx) = mpsc::channel::<Frame>(64);

    let mut heartbeat = tokio::time::interval(opts.heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await; // immediate first tick

    let mut liveness_check = tokio::time::interval(liveness_check_interval(opts.liveness));
    liveness_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = send_frame(&mut ws_tx, &Frame::Disconnect { reason: Some("shutdown".to_owned()) }).await;
                return SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                if send_frame(&mut ws_tx, &Frame::Heartbeat).await.is_err() {
                    return SessionEnd::Lost;
                }
            }
            _ = liveness_check.tick() => {
                if last_seen.elapsed() > opts.liveness {
                    warn!(hub_id = %opts.hub_id, "broker silent past the liveness window");
                    return SessionEnd::Lost;
                }
            }
            Some(frame) = reply_rx.recv() => {
                if send_frame(&mut ws_tx, &frame).await.is_err() {
                    return SessionEnd::Lost;
                }
                set_state(state, SessionState::Ready).await;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match handle_frame(state, text.as_str(), &reply_tx).await {
                            FrameOutcome::Continue => {}
                            FrameOutcome::Lost => return SessionEnd::Lost,
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(hub_id = %opts.hub_id, "broker closed the session");
                        return SessionEnd::Lost;
                    }
                    Some(Err(e)) => {
                        debug!(hub_id = %opts.hub_id, err = %e, "session read failed");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Process one inbound text frame.
async fn handle_frame(
    state: &Arc<HubState>,
    text: &str,
    reply_tx: &mpsc::Sender<Frame>,
) -> FrameOutcome {
    match Frame::decode(text) {
        Ok(Frame::Dispatch { request, .. }) => {
            set_state(state, SessionState::Handling).await;
            let state = Arc::clone(state);
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let response = state.handle(request).await;
                // Session may be gone by now; the broker times the request out.
                let _ = reply_tx.send(Frame::Reply { response }).await;
            });
            FrameOutcome::Continue
        }
        Ok(Frame::Heartbeat) => FrameOutcome::Continue,
        Ok(Frame::Disconnect { reason }) => {
            debug!(reason = reason.as_deref().unwrap_or(""), "broker requested disconnect");
            FrameOutcome::Lost
        }
        Ok(other) => {
            debug!(?other, "ignoring unexpected frame");
            FrameOutcome::Continue
        }
        Err(_) => {
            let message_id = salvage_message_id(text).unwrap_or_else(|| "unknown".to_owned());
            let response = ServiceResponse::failure(
                &message_id,
                HUB_CONTROL_SERVICE,
                None,
                ServiceErrorCode::BadRequest.as_str(),
            );
            let _ = reply_tx.send(Frame::Reply { response }).await;
            FrameOutcome::Continue
        }
    }
}

/// Pull a `message_id` out of a malformed envelope when possible.
pub(crate) fn salvage_message_id(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value
        .pointer("/request/message_id")
        .or_else(|| value.get("message_id"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

/// Doubling backoff with a ceiling.
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Check cadence for broker silence: a quarter of the window, at least 1 s.
fn liveness_check_interval(liveness: Duration) -> Duration {
    (liveness / 4).max(Duration::from_secs(1))
}

async fn send_frame<S>(ws_tx: &mut S, frame: &Frame) -> Result<(), ()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    let text = frame.encode().map_err(|_| ())?;
    ws_tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn set_state(state: &Arc<HubState>, next: SessionState) {
    *state.session_state.write().await = next;
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

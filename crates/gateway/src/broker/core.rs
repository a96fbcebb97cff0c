// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker event loop: sole owner of the services/workers/pending
//! tables. Single-threaded state mutation; everything arrives as a
//! [`Command`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hearth_proto::{Frame, ServiceErrorCode, ServiceRequest, ServiceResponse};

use super::events::BrokerEvent;
use super::{BrokerSettings, BrokerStats, WorkerInfo};

/// Deadline and expiry scan cadence.
const TICK: Duration = Duration::from_millis(100);

/// A worker session announcing itself to the loop.
pub(crate) struct WorkerRegistration {
    pub identity: String,
    pub service: String,
    pub public_key: Option<String>,
    pub outbound: mpsc::Sender<Frame>,
    pub cancel: CancellationToken,
    pub session: u64,
}

pub(crate) enum Command {
    Register(WorkerRegistration),
    WorkerFrame {
        identity: String,
        session: u64,
        frame: Frame,
    },
    SessionClosed {
        identity: String,
        session: u64,
    },
    Request {
        request: ServiceRequest,
        target: Option<String>,
        timeout: Option<Duration>,
        resp: oneshot::Sender<ServiceResponse>,
    },
    RequestNf {
        request: ServiceRequest,
        target: Option<String>,
    },
    Stats {
        resp: oneshot::Sender<BrokerStats>,
    },
    Workers {
        resp: oneshot::Sender<Vec<WorkerInfo>>,
    },
}

struct WorkerState {
    service: String,
    last_ping: Instant,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    session: u64,
    #[allow(dead_code)] // carried for a pluggable verification step
    public_key: Option<String>,
}

#[derive(Default)]
struct ServiceEntry {
    workers: Vec<String>,
    next: usize,
}

struct PendingEntry {
    resp: Option<oneshot::Sender<ServiceResponse>>,
    deadline: Instant,
    worker: String,
    service: String,
    nonce: Option<String>,
}

#[derive(Default)]
struct Counters {
    dispatched: u64,
    fire_and_forget: u64,
    replies: u64,
    orphan_replies: u64,
    timeouts: u64,
    no_worker: u64,
    superseded: u64,
    worker_gone: u64,
}

enum Gone {
    Disconnected,
    Expired,
}

pub(crate) struct BrokerCore {
    settings: BrokerSettings,
    services: HashMap<String, ServiceEntry>,
    workers: HashMap<String, WorkerState>,
    pending: HashMap<String, PendingEntry>,
    counters: Counters,
    events: broadcast::Sender<BrokerEvent>,
    last_heartbeat: Instant,
}

impl BrokerCore {
    pub(crate) fn new(settings: BrokerSettings, events: broadcast::Sender<BrokerEvent>) -> Self {
        Self {
            settings,
            services: HashMap::new(),
            workers: HashMap::new(),
            pending: HashMap::new(),
            counters: Counters::default(),
            events,
            last_heartbeat: Instant::now(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        shutdown: CancellationToken,
    ) {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => self.tick(),
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
            }
        }

        // Tear down: every session cancelled, every pending failed.
        for (_, worker) in self.workers.drain() {
            let _ = worker.outbound.try_send(Frame::Disconnect { reason: Some("shutdown".to_owned()) });
            worker.cancel.cancel();
        }
        for (message_id, mut entry) in self.pending.drain() {
            if let Some(resp) = entry.resp.take() {
                let _ = resp.send(ServiceResponse::failure(
                    &message_id,
                    &entry.service,
                    entry.nonce.clone(),
                    ServiceErrorCode::WorkerGone.as_str(),
                ));
            }
        }
        debug!("broker loop stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register(registration) => self.register(registration),
            Command::WorkerFrame { identity, session, frame } => {
                self.worker_frame(&identity, session, frame)
            }
            Command::SessionClosed { identity, session } => {
                if self.workers.get(&identity).is_some_and(|w| w.session == session) {
                    self.remove_worker(&identity, Gone::Disconnected);
                }
            }
            Command::Request { request, target, timeout, resp } => {
                self.dispatch(request, target, timeout, Some(resp))
            }
            Command::RequestNf { request, target } => self.dispatch(request, target, None, None),
            Command::Stats { resp } => {
                let _ = resp.send(self.stats());
            }
            Command::Workers { resp } => {
                let _ = resp.send(self.worker_snapshot());
            }
        }
    }

    // -- Worker lifecycle -----------------------------------------------------

    fn register(&mut self, registration: WorkerRegistration) {
        let WorkerRegistration { identity, service, public_key, outbound, cancel, session } =
            registration;

        if let Some(old) = self.workers.remove(&identity) {
            debug!(identity, "replacing stale worker session");
            old.cancel.cancel();
            self.detach_from_service(&old.service, &identity);
            // Anything dispatched to the old socket will never come back.
            self.cancel_worker_pendings(&identity);
        }

        let entry = self.services.entry(service.clone()).or_default();
        if !entry.workers.iter().any(|w| w == &identity) {
            entry.workers.push(identity.clone());
        }
        self.workers.insert(
            identity.clone(),
            WorkerState {
                service: service.clone(),
                last_ping: Instant::now(),
                outbound,
                cancel,
                session,
                public_key,
            },
        );

        info!(identity, service, "worker registered");
        let _ = self.events.send(BrokerEvent::WorkerAdded { identity, service });
    }

    fn worker_frame(&mut self, identity: &str, session: u64, frame: Frame) {
        let Some(worker) = self.workers.get_mut(identity) else {
            debug!(identity, "frame from unknown worker dropped");
            return;
        };
        if worker.session != session {
            debug!(identity, "frame from a stale session dropped");
            return;
        }
        worker.last_ping = Instant::now();

        match frame {
            Frame::Reply { response } => self.resolve_reply(identity, response),
            Frame::Heartbeat => {}
            Frame::Disconnect { reason } => {
                debug!(identity, reason = reason.as_deref().unwrap_or(""), "worker disconnecting");
                self.remove_worker(identity, Gone::Disconnected);
            }
            Frame::Ready { .. } => {
                debug!(identity, "duplicate ready ignored");
            }
            other => {
                debug!(identity, ?other, "unexpected worker frame dropped");
            }
        }
    }

    fn remove_worker(&mut self, identity: &str, gone: Gone) {
        let Some(worker) = self.workers.remove(identity) else {
            return;
        };
        worker.cancel.cancel();
        self.detach_from_service(&worker.service, identity);
        self.cancel_worker_pendings(identity);

        let event = match gone {
            Gone::Disconnected => {
                info!(identity, service = %worker.service, "worker disconnected");
                BrokerEvent::WorkerDisconnected {
                    identity: identity.to_owned(),
                    service: worker.service.clone(),
                }
            }
            Gone::Expired => {
                warn!(identity, service = %worker.service, "worker expired");
                let _ = worker
                    .outbound
                    .try_send(Frame::Disconnect { reason: Some("expired".to_owned()) });
                BrokerEvent::WorkerExpired {
                    identity: identity.to_owned(),
                    service: worker.service.clone(),
                }
            }
        };
        let _ = self.events.send(event);
    }

    fn detach_from_service(&mut self, service: &str, identity: &str) {
        if let Some(entry) = self.services.get_mut(service) {
            entry.workers.retain(|w| w != identity);
            if entry.workers.is_empty() {
                self.services.remove(service);
            }
        }
    }

    /// Fail every pending entry assigned to a worker with `worker_gone`.
    fn cancel_worker_pendings(&mut self, identity: &str) {
        let affected: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.worker == identity)
            .map(|(id, _)| id.clone())
            .collect();
        for message_id in affected {
            if let Some(mut entry) = self.pending.remove(&message_id) {
                self.counters.worker_gone += 1;
                if let Some(resp) = entry.resp.take() {
                    let _ = resp.send(ServiceResponse::failure(
                        &message_id,
                        &entry.service,
                        entry.nonce.clone(),
                        ServiceErrorCode::WorkerGone.as_str(),
                    ));
                }
            }
        }
    }

    // -- Request routing ------------------------------------------------------

    fn dispatch(
        &mut self,
        request: ServiceRequest,
        target: Option<String>,
        timeout: Option<Duration>,
        resp: Option<oneshot::Sender<ServiceResponse>>,
    ) {
        let worker_id = match target {
            Some(identity) => self
                .workers
                .get(&identity)
                .filter(|w| w.service == request.service && self.is_live(w))
                .map(|_| identity),
            None => self.pick_round_robin(&request.service),
        };

        let Some(worker_id) = worker_id else {
            self.counters.no_worker += 1;
            debug!(service = %request.service, message_id = %request.message_id, "no live worker");
            fail(resp, &request, ServiceErrorCode::NoWorker);
            return;
        };

        // A duplicate message_id supersedes the older exchange.
        if let Some(mut old) = self.pending.remove(&request.message_id) {
            self.counters.superseded += 1;
            if let Some(tx) = old.resp.take() {
                let _ = tx.send(ServiceResponse::failure(
                    &request.message_id,
                    &old.service,
                    old.nonce.clone(),
                    ServiceErrorCode::Superseded.as_str(),
                ));
            }
        }

        let frame = Frame::Dispatch { client: "gateway".to_owned(), request: request.clone() };
        let sent = self
            .workers
            .get(&worker_id)
            .map(|w| w.outbound.try_send(frame).is_ok())
            .unwrap_or(false);
        if !sent {
            warn!(identity = %worker_id, "worker outbound full, failing dispatch");
            self.counters.no_worker += 1;
            fail(resp, &request, ServiceErrorCode::NoWorker);
            return;
        }

        self.counters.dispatched += 1;
        match resp {
            Some(resp) => {
                let deadline =
                    Instant::now() + timeout.unwrap_or(self.settings.default_timeout);
                self.pending.insert(
                    request.message_id.clone(),
                    PendingEntry {
                        resp: Some(resp),
                        deadline,
                        worker: worker_id,
                        service: request.service,
                        nonce: request.nonce,
                    },
                );
            }
            None => self.counters.fire_and_forget += 1,
        }
    }

    fn resolve_reply(&mut self, identity: &str, response: ServiceResponse) {
        match self.pending.remove(&response.message_id) {
            Some(mut entry) => {
                self.counters.replies += 1;
                if let Some(resp) = entry.resp.take() {
                    let _ = resp.send(response);
                }
            }
            None => {
                // Fire-and-forget completion or a post-timeout straggler.
                self.counters.orphan_replies += 1;
                debug!(
                    identity,
                    message_id = %response.message_id,
                    success = response.success,
                    "reply without a pending entry"
                );
                let _ = self.events.send(BrokerEvent::OrphanReply {
                    identity: identity.to_owned(),
                    message_id: response.message_id,
                    nonce: response.nonce,
                    success: response.success,
                });
            }
        }
    }

    fn pick_round_robin(&mut self, service: &str) -> Option<String> {
        // Collect liveness outside the entry borrow.
        let live: Vec<String> = self
            .services
            .get(service)?
            .workers
            .iter()
            .filter(|id| self.workers.get(*id).map(|w| self.is_live(w)).unwrap_or(false))
            .cloned()
            .collect();
        if live.is_empty() {
            return None;
        }
        let entry = self.services.get_mut(service)?;
        let picked = live[entry.next % live.len()].clone();
        entry.next = entry.next.wrapping_add(1);
        Some(picked)
    }

    fn is_live(&self, worker: &WorkerState) -> bool {
        worker.last_ping.elapsed() <= self.settings.liveness_window
    }

    // -- Periodic work --------------------------------------------------------

    fn tick(&mut self) {
        let now = Instant::now();

        // Pending deadlines.
        let timed_out: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for message_id in timed_out {
            if let Some(mut entry) = self.pending.remove(&message_id) {
                self.counters.timeouts += 1;
                debug!(message_id, worker = %entry.worker, "pending request timed out");
                if let Some(resp) = entry.resp.take() {
                    let _ = resp.send(ServiceResponse::failure(
                        &message_id,
                        &entry.service,
                        entry.nonce.clone(),
                        ServiceErrorCode::Timeout.as_str(),
                    ));
                }
            }
        }

        // Worker expiry.
        let dead: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, w)| w.last_ping.elapsed() > self.settings.liveness_window)
            .map(|(id, _)| id.clone())
            .collect();
        for identity in dead {
            self.remove_worker(&identity, Gone::Expired);
        }

        // Keepalives toward workers.
        if self.last_heartbeat.elapsed() >= self.settings.heartbeat_interval {
            self.last_heartbeat = now;
            for worker in self.workers.values() {
                let _ = worker.outbound.try_send(Frame::Heartbeat);
            }
        }
    }

    // -- Snapshots ------------------------------------------------------------

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            workers: self.workers.len(),
            live_workers: self.workers.values().filter(|w| self.is_live(w)).count(),
            services: self.services.len(),
            pending: self.pending.len(),
            dispatched: self.counters.dispatched,
            fire_and_forget: self.counters.fire_and_forget,
            replies: self.counters.replies,
            orphan_replies: self.counters.orphan_replies,
            timeouts: self.counters.timeouts,
            no_worker: self.counters.no_worker,
            superseded: self.counters.superseded,
            worker_gone: self.counters.worker_gone,
        }
    }

    fn worker_snapshot(&self) -> Vec<WorkerInfo> {
        self.workers
            .iter()
            .map(|(identity, w)| WorkerInfo {
                identity: identity.clone(),
                service: w.service.clone(),
                last_ping_secs_ago: w.last_ping.elapsed().as_secs(),
                live: self.is_live(w),
            })
            .collect()
    }
}

/// Synthesize a failure toward an awaiting client, if any.
fn fail(
    resp: Option<oneshot::Sender<ServiceResponse>>,
    request: &ServiceRequest,
    code: ServiceErrorCode,
) {
    if let Some(resp) = resp {
        let _ = resp.send(ServiceResponse::failure(
            &request.message_id,
            &request.service,
            request.nonce.clone(),
            code.as_str(),
        ));
    }
}

#[cfg(test)]
#[path = "core_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hearth_proto::keys::KeyPair;

use crate::broker::BrokerHandle;
use crate::config::GatewayConfig;
use crate::registry::ServiceRegistry;
use crate::repository::Repository;

/// Shared gateway state.
///
/// The broker owns worker liveness; the repository is the source of truth
/// across restarts. Everything learned over the broker is reflected into
/// the repository through idempotent upserts.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub repo: Arc<dyn Repository>,
    pub broker: BrokerHandle,
    pub registry: ServiceRegistry,
    pub keys: KeyPair,
    pub shutdown: CancellationToken,
}

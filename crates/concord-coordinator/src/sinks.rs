//! External collaborator sinks.
//!
//! Everything here is fire-and-forget: the trait methods return nothing,
//! implementations must never block the caller, and failures are logged
//! with context and dropped. The HTTP implementations spawn their request
//! onto the runtime and must therefore be called from within one.

use std::sync::Arc;

use concord_contracts::Contract;

pub use concord_contracts::{ItemRegistry, RegistryError, StaticItemRegistry};

/// Gateway notification sink: tells a gateway that the partner list of its
/// owning organisation changed, once per affected gateway.
pub trait GatewayNotifier: Send + Sync {
    fn notify_partners_changed(&self, agid: &str);
}

/// Gateway notifier that drops every notification. For tests and
/// deployments without gateway push.
#[derive(Debug, Default)]
pub struct NullGatewayNotifier;

impl GatewayNotifier for NullGatewayNotifier {
    fn notify_partners_changed(&self, _agid: &str) {}
}

/// Gateway notifier that POSTs to each gateway's callback endpoint.
pub struct HttpGatewayNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGatewayNotifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl GatewayNotifier for HttpGatewayNotifier {
    fn notify_partners_changed(&self, agid: &str) {
        let client = self.client.clone();
        let url = format!(
            "{}/gateways/{}/partners-changed",
            self.base_url.trim_end_matches('/'),
            agid
        );
        let agid = agid.to_string();
        tokio::spawn(async move {
            match client.post(&url).send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => tracing::debug!(agid = %agid, "gateway notified of partner change"),
                Err(e) => tracing::warn!(agid = %agid, error = %e, "gateway notification failed"),
            }
        });
    }
}

/// External ledger/mirror sink: keeps a remote ledger's view of contracts
/// and their items in step with the local store.
pub trait LedgerMirror: Send + Sync {
    fn contract_created(&self, contract: &Contract);
    fn contract_removed(&self, ctid: &str);
    fn contract_accepted(&self, ctid: &str, cid: &str);
    fn contract_rejected(&self, ctid: &str, cid: &str);
    fn item_added(&self, ctid: &str, oid: &str);
    fn item_removed(&self, ctid: &str, oid: &str);
}

/// Ledger mirror that mirrors nothing.
#[derive(Debug, Default)]
pub struct NullLedgerMirror;

impl LedgerMirror for NullLedgerMirror {
    fn contract_created(&self, _contract: &Contract) {}
    fn contract_removed(&self, _ctid: &str) {}
    fn contract_accepted(&self, _ctid: &str, _cid: &str) {}
    fn contract_rejected(&self, _ctid: &str, _cid: &str) {}
    fn item_added(&self, _ctid: &str, _oid: &str) {}
    fn item_removed(&self, _ctid: &str, _oid: &str) {}
}

/// Ledger mirror speaking HTTP to an external ledger service. When the
/// feature flag is off every call short-circuits to a no-op.
pub struct HttpLedgerMirror {
    enabled: bool,
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerMirror {
    pub fn new(enabled: bool, base_url: impl Into<String>) -> Self {
        Self {
            enabled,
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn post(&self, path: String, body: serde_json::Value) {
        if !self.enabled {
            return;
        }
        let client = self.client.clone();
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        tokio::spawn(async move {
            if let Err(e) = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                tracing::warn!(url = %url, error = %e, "ledger mirror call failed");
            }
        });
    }
}

impl LedgerMirror for HttpLedgerMirror {
    fn contract_created(&self, contract: &Contract) {
        self.post(
            "/contracts".to_string(),
            serde_json::json!({
                "ctid": contract.ctid,
                "type": contract.contract_type,
                "description": contract.description,
                "organisations": contract.organisations,
                "items": contract.items,
            }),
        );
    }

    fn contract_removed(&self, ctid: &str) {
        self.post(
            format!("/contracts/{ctid}/remove"),
            serde_json::json!({ "ctid": ctid }),
        );
    }

    fn contract_accepted(&self, ctid: &str, cid: &str) {
        self.post(
            format!("/contracts/{ctid}/accept"),
            serde_json::json!({ "cid": cid }),
        );
    }

    fn contract_rejected(&self, ctid: &str, cid: &str) {
        self.post(
            format!("/contracts/{ctid}/reject"),
            serde_json::json!({ "cid": cid }),
        );
    }

    fn item_added(&self, ctid: &str, oid: &str) {
        self.post(
            format!("/contracts/{ctid}/items"),
            serde_json::json!({ "oid": oid }),
        );
    }

    fn item_removed(&self, ctid: &str, oid: &str) {
        self.post(
            format!("/contracts/{ctid}/items/remove"),
            serde_json::json!({ "oid": oid }),
        );
    }
}

/// Operational metrics sink.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str);
    fn record_error(&self, operation: &str, message: &str);
}

/// Metrics sink that records nothing.
#[derive(Debug, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn incr_counter(&self, _name: &str) {}
    fn record_error(&self, _operation: &str, _message: &str) {}
}

/// Metrics sink that writes counters to the local log output.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn incr_counter(&self, name: &str) {
        tracing::info!(counter = name, "metric");
    }

    fn record_error(&self, operation: &str, message: &str) {
        tracing::info!(operation, message, "metric error");
    }
}

/// Shared handles the coordinator holds on its collaborators.
#[derive(Clone)]
pub struct Sinks {
    pub registry: Arc<dyn ItemRegistry>,
    pub gateways: Arc<dyn GatewayNotifier>,
    pub ledger: Arc<dyn LedgerMirror>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Sinks {
    /// Sinks that do nothing, with an empty item registry. A convenient
    /// starting point for tests and embedders that wire their own.
    pub fn disconnected() -> Self {
        Self {
            registry: Arc::new(StaticItemRegistry::new()),
            gateways: Arc::new(NullGatewayNotifier),
            ledger: Arc::new(NullLedgerMirror),
            metrics: Arc::new(NullMetricsSink),
        }
    }
}

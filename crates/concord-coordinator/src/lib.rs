//! Relationship coordinator for the Concord platform.
//!
//! Orchestrates every cross-organisation lifecycle operation: partnership
//! request/accept/reject/cancel, contract propose/join/decline/modify/
//! dissolve, and the organisation/gateway registry maintenance around them.
//! Each operation validates current state, performs the store mutations in
//! a fixed order, creates the notification and audit records the transition
//! requires, and drives the external sinks for any gateway whose visibility
//! changed.
//!
//! The coordinator holds no persistent state of its own — it is a pure
//! orchestration layer over the organisation, contract, mailbox, and audit
//! stores, reached through one pooled connection per operation.
//!
//! # Consistency model
//!
//! There is no transaction spanning more than one entity. A lifecycle
//! operation is an ordered sequence of independent writes; a failure at
//! step *k* leaves steps `1..k-1` applied and is surfaced as a hard error
//! with no automatic rollback. Every operation is therefore written to be
//! idempotent: re-invoking it against a state that already reflects the
//! intended outcome is a safe no-op, which is what makes client retries and
//! partial-failure replays survivable. Peripheral side effects (audit
//! writes, notification response-transitions, sink calls) are caught and
//! logged, never propagated.

pub mod config;
mod contracts;
mod error;
mod partnerships;
pub mod sinks;
pub mod telemetry;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use concord_audit::{AuditRecord, NewAudit};
use concord_contracts::{Contract, GatewayGrant};
use concord_db::{DbPool, DbRuntimeSettings};
use concord_mailbox::Notification;
use concord_orgs::Organisation;
use concord_types::{
    AuditLabels, CommonContractStatus, EntityRef, EventKind, RelationshipState,
};

pub use contracts::ContractProposal;
pub use error::CoordinatorError;
pub use sinks::{
    GatewayNotifier, HttpGatewayNotifier, HttpLedgerMirror, ItemRegistry, LedgerMirror,
    LogMetricsSink, MetricsSink, NullGatewayNotifier, NullLedgerMirror, NullMetricsSink,
    RegistryError, Sinks, StaticItemRegistry,
};

/// Errors that can occur while bootstrapping a coordinator from
/// configuration.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Pool(#[from] concord_db::PoolError),
    #[error(transparent)]
    Migration(#[from] concord_db::MigrationError),
    #[error("connection pool error: {0}")]
    Checkout(#[from] r2d2::Error),
}

/// Relationship state plus private-contract classification for an ordered
/// organisation pair, as one read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerOverview {
    pub relationship: RelationshipState,
    pub contracts: CommonContractStatus,
}

/// The relationship coordinator. Cheap to clone-by-handle: the pool and
/// every sink are shared references.
#[derive(Clone)]
pub struct Coordinator {
    pool: DbPool,
    sinks: Sinks,
}

impl Coordinator {
    /// Builds a coordinator over an already-migrated pool and a set of
    /// collaborator sinks.
    pub fn new(pool: DbPool, sinks: Sinks) -> Self {
        Self { pool, sinks }
    }

    /// Bootstraps a coordinator from configuration: creates the pool, runs
    /// migrations, and wires the HTTP sinks the config enables. The item
    /// registry is always supplied by the embedder.
    pub fn from_config(
        config: &config::Config,
        registry: Arc<dyn ItemRegistry>,
    ) -> Result<Self, BootstrapError> {
        let pool = concord_db::create_pool(
            &config.database.path,
            DbRuntimeSettings {
                busy_timeout_ms: config.database.busy_timeout_ms,
                pool_max_size: config.database.pool_max_size,
            },
        )?;
        let conn = pool.get()?;
        concord_db::run_migrations(&conn)?;
        drop(conn);

        let gateways: Arc<dyn GatewayNotifier> = if config.gateway_sink.base_url.is_empty() {
            Arc::new(NullGatewayNotifier)
        } else {
            Arc::new(HttpGatewayNotifier::new(&config.gateway_sink.base_url))
        };

        let ledger: Arc<dyn LedgerMirror> =
            if config.ledger.enabled && !config.ledger.base_url.is_empty() {
                Arc::new(HttpLedgerMirror::new(true, &config.ledger.base_url))
            } else {
                Arc::new(NullLedgerMirror)
            };

        Ok(Self::new(
            pool,
            Sinks {
                registry,
                gateways,
                ledger,
                metrics: Arc::new(LogMetricsSink),
            },
        ))
    }

    /// The underlying connection pool, for embedders that need direct
    /// store reads.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Runs a synchronous store sequence on the blocking pool with one
    /// checked-out connection. Primary failures are pushed to the metrics
    /// sink under `op` before they propagate.
    pub(crate) async fn run_blocking<T, F>(
        &self,
        op: &'static str,
        f: F,
    ) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, CoordinatorError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let result = match tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        {
            Ok(inner) => inner,
            Err(join) => Err(CoordinatorError::from(join)),
        };

        if let Err(e) = &result {
            self.sinks.metrics.record_error(op, &e.to_string());
        }
        result
    }

    // ── Organisation / gateway registry maintenance ──────────────────

    /// Registers an organisation. Replaying a registration is a no-op.
    pub async fn register_organisation(
        &self,
        cid: &str,
        name: &str,
    ) -> Result<(), CoordinatorError> {
        let cid = cid.to_string();
        let name = name.to_string();
        let created = self
            .run_blocking("register_organisation", move |conn| {
                let created = concord_orgs::create_organisation(conn, &cid, &name)?;
                if created {
                    let org = concord_orgs::get_organisation(conn, &cid)?;
                    best_effort(
                        "write organisation registration audit",
                        concord_audit::create_audit(
                            conn,
                            &NewAudit {
                                cid: org.cid.clone(),
                                actor: org_ref(&org),
                                target: org_ref(&org),
                                object: None,
                                kind: EventKind::CompanyRegistered,
                                labels: system_labels(),
                            },
                        ),
                    );
                }
                Ok(created)
            })
            .await?;
        if created {
            self.sinks.metrics.incr_counter("organisation_register");
        }
        Ok(())
    }

    /// Registers a gateway identity under an organisation.
    pub async fn register_node(&self, cid: &str, agid: &str) -> Result<(), CoordinatorError> {
        let cid = cid.to_string();
        let agid = agid.to_string();
        self.run_blocking("register_node", move |conn| {
            let org = concord_orgs::get_organisation(conn, &cid)?;
            concord_orgs::register_node(conn, &cid, &agid)?;
            best_effort(
                "write gateway registration audit",
                concord_audit::create_audit(
                    conn,
                    &NewAudit {
                        cid: org.cid.clone(),
                        actor: org_ref(&org),
                        target: org_ref(&org),
                        object: Some(EntityRef::new(&agid, &agid)),
                        kind: EventKind::NodeRegistered,
                        labels: system_labels(),
                    },
                ),
            );
            Ok(())
        })
        .await
    }

    /// Removes a gateway identity from an organisation.
    pub async fn deregister_node(&self, cid: &str, agid: &str) -> Result<(), CoordinatorError> {
        let cid = cid.to_string();
        let agid = agid.to_string();
        self.run_blocking("deregister_node", move |conn| {
            let org = concord_orgs::get_organisation(conn, &cid)?;
            concord_orgs::deregister_node(conn, &cid, &agid)?;
            best_effort(
                "write gateway removal audit",
                concord_audit::create_audit(
                    conn,
                    &NewAudit {
                        cid: org.cid.clone(),
                        actor: org_ref(&org),
                        target: org_ref(&org),
                        object: Some(EntityRef::new(&agid, &agid)),
                        kind: EventKind::NodeDeregistered,
                        labels: system_labels(),
                    },
                ),
            );
            Ok(())
        })
        .await
    }

    // ── Read-through queries ─────────────────────────────────────────

    /// Fetches an organisation record.
    pub async fn get_organisation(&self, cid: &str) -> Result<Organisation, CoordinatorError> {
        let cid = cid.to_string();
        self.run_blocking("get_organisation", move |conn| Ok(concord_orgs::get_organisation(conn, &cid)?))
            .await
    }

    /// Relationship state plus private-contract classification for an
    /// ordered pair.
    pub async fn partner_overview(
        &self,
        cid_a: &str,
        cid_b: &str,
    ) -> Result<PartnerOverview, CoordinatorError> {
        let a = cid_a.to_string();
        let b = cid_b.to_string();
        self.run_blocking("partner_overview", move |conn| {
            Ok(PartnerOverview {
                relationship: concord_orgs::relationship_between(conn, &a, &b)?,
                contracts: concord_contracts::common_contract_status(conn, &a, &b)?,
            })
        })
        .await
    }

    /// Fetches a contract with membership and grants.
    pub async fn get_contract(&self, ctid: &str) -> Result<Contract, CoordinatorError> {
        let ctid = ctid.to_string();
        self.run_blocking("get_contract", move |conn| Ok(concord_contracts::get_contract(conn, &ctid)?))
            .await
    }

    /// Lists the non-deleted contracts an organisation participates in.
    pub async fn list_contracts(&self, cid: &str) -> Result<Vec<Contract>, CoordinatorError> {
        let cid = cid.to_string();
        self.run_blocking("list_contracts", move |conn| Ok(concord_contracts::list_contracts_for_org(conn, &cid)?))
            .await
    }

    /// The authorization-resolution query: which items may `agid` expose
    /// under this contract, and with what access mode.
    pub async fn resolve_gateway_items(
        &self,
        ctid: &str,
        agid: &str,
    ) -> Result<Vec<GatewayGrant>, CoordinatorError> {
        let ctid = ctid.to_string();
        let agid = agid.to_string();
        let registry = self.sinks.registry.clone();
        self.run_blocking("resolve_gateway_items", move |conn| {
            Ok(concord_contracts::resolve_items_for_gateway(
                conn, &*registry, &ctid, &agid,
            )?)
        })
        .await
    }

    /// Inbox page for a set of mailbox owners, newest first.
    pub async fn get_inbox(
        &self,
        owners: Vec<String>,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, CoordinatorError> {
        self.run_blocking("get_inbox", move |conn| {
            Ok(concord_mailbox::get_notifications(
                conn,
                &owners,
                unread_only,
                limit,
                offset,
            )?)
        })
        .await
    }

    /// Audit trail for an organisation about a target, within a day window.
    pub async fn get_audit_trail(
        &self,
        cid: &str,
        target_id: &str,
        days: u64,
    ) -> Result<Vec<AuditRecord>, CoordinatorError> {
        let cid = cid.to_string();
        let target_id = target_id.to_string();
        self.run_blocking("get_audit_trail", move |conn| {
            Ok(concord_audit::get_audits(conn, &cid, &target_id, days)?)
        })
        .await
    }
}

// ── Shared internals ─────────────────────────────────────────────────

/// Logs and swallows a peripheral failure; the primary operation carries
/// on. Returns the value on success so callers can keep using fallible
/// reads in best-effort position.
pub(crate) fn best_effort<T, E: std::fmt::Display>(
    context: &'static str,
    result: Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(context, error = %e, "peripheral side effect failed; continuing");
            None
        }
    }
}

pub(crate) fn org_ref(org: &Organisation) -> EntityRef {
    EntityRef::new(&org.cid, &org.name)
}

pub(crate) fn contract_ref(contract: &Contract) -> EntityRef {
    let name = if contract.description.is_empty() {
        contract.ctid.clone()
    } else {
        contract.description.clone()
    };
    EntityRef::new(&contract.ctid, name)
}

pub(crate) fn system_labels() -> AuditLabels {
    AuditLabels {
        status: "SUCCEEDED".to_string(),
        source: "coordinator".to_string(),
        origin: "api".to_string(),
        ip: None,
    }
}

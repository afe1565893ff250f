//! Contract lifecycle operations.
//!
//! A contract starts as a proposal from one organisation to its partners,
//! collects acceptances until every invitee has responded, and is then
//! approved. Membership and item grants can change over the contract's
//! life; deletion is terminal and soft. Every operation here follows the
//! same sequence: validate, mutate the contract store, create the
//! notifications the transition requires, then run the best-effort tail
//! (audit records, ledger mirror, metrics).

use concord_audit::NewAudit;
use concord_contracts::{Contract, ItemGrant, NewContract};
use concord_mailbox::NewNotification;
use concord_types::{ContractType, EntityRef, EventKind, NotificationStatus, RelationshipState};

use crate::{best_effort, contract_ref, org_ref, system_labels, Coordinator, CoordinatorError};

/// Input for [`Coordinator::propose_contract`].
#[derive(Debug, Clone)]
pub struct ContractProposal {
    pub proposer_cid: String,
    pub contract_type: ContractType,
    pub description: String,
    /// Partner organisations invited to join; all must be current friends
    /// of the proposer.
    pub invited_cids: Vec<String>,
    /// Initial item grants; all must be owned by the proposer.
    pub items: Vec<ItemGrant>,
}

impl Coordinator {
    /// Proposes a new contract. The proposer becomes the first confirmed
    /// member; every invitee receives a `WAITING` proposal in its inbox and
    /// must be a current partner of the proposer.
    pub async fn propose_contract(
        &self,
        proposal: ContractProposal,
    ) -> Result<Contract, CoordinatorError> {
        let registry = self.sinks.registry.clone();

        let contract = self
            .run_blocking("propose_contract", move |conn| {
                let proposer = concord_orgs::get_organisation(conn, &proposal.proposer_cid)?;

                let mut invitees = Vec::with_capacity(proposal.invited_cids.len());
                for cid in &proposal.invited_cids {
                    let invitee = concord_orgs::get_organisation(conn, cid)?;
                    if concord_orgs::relationship_between(conn, &proposer.cid, &invitee.cid)?
                        != RelationshipState::Friends
                    {
                        return Err(CoordinatorError::Conflict(format!(
                            "{} must be a partner of {} before contracting",
                            invitee.cid, proposer.cid
                        )));
                    }
                    invitees.push(invitee);
                }

                for item in &proposal.items {
                    ensure_item_owned(&*registry, &proposer.cid, item)?;
                }

                let contract = concord_contracts::create_contract(
                    conn,
                    &NewContract {
                        contract_type: proposal.contract_type,
                        description: proposal.description.clone(),
                        creator_cid: proposer.cid.clone(),
                        invited_cids: proposal.invited_cids.clone(),
                        items: proposal.items.clone(),
                    },
                )?;

                for invitee in &invitees {
                    concord_mailbox::create_notification(
                        conn,
                        &NewNotification {
                            owner_cid: invitee.cid.clone(),
                            actor: org_ref(&proposer),
                            target: contract_ref(&contract),
                            object: Some(org_ref(invitee)),
                            kind: EventKind::ContractProposed,
                            status: NotificationStatus::Waiting,
                        },
                    )?;
                }

                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: proposer.cid.clone(),
                        actor: org_ref(&proposer),
                        target: contract_ref(&contract),
                        object: None,
                        kind: EventKind::ContractProposalSent,
                        status: NotificationStatus::Info,
                    },
                )?;

                best_effort(
                    "write contract proposal audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: proposer.cid.clone(),
                            actor: org_ref(&proposer),
                            target: contract_ref(&contract),
                            object: None,
                            kind: EventKind::ContractProposed,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(contract)
            })
            .await?;

        self.sinks.ledger.contract_created(&contract);
        self.sinks.metrics.incr_counter("contract_propose");
        Ok(contract)
    }

    /// Accepts a pending contract invitation: the organisation becomes a
    /// confirmed member, the original `WAITING` proposal is responded, and
    /// every existing member is notified. Joining twice is a no-op;
    /// joining without an invitation is a conflict.
    pub async fn join_contract(&self, ctid: &str, cid: &str) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let cid_arg = cid.to_string();

        let joined = self
            .run_blocking("join_contract", move |conn| {
                let org = concord_orgs::get_organisation(conn, &cid_arg)?;
                if !concord_contracts::accept_membership(conn, &ctid_arg, &org.cid)? {
                    return Ok(false);
                }
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;

                respond_waiting_for_contract(conn, &org.cid, EventKind::ContractProposed, &ctid_arg);
                respond_waiting_for_contract(conn, &org.cid, EventKind::ContractInvited, &ctid_arg);

                notify_members(
                    conn,
                    &contract.organisations,
                    &org.cid,
                    &org_ref(&org),
                    &contract_ref(&contract),
                    None,
                    EventKind::ContractJoined,
                    NotificationStatus::Accepted,
                )?;

                best_effort(
                    "write contract join audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: org.cid.clone(),
                            actor: org_ref(&org),
                            target: contract_ref(&contract),
                            object: None,
                            kind: EventKind::ContractJoined,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(true)
            })
            .await?;

        if joined {
            self.sinks.ledger.contract_accepted(ctid, cid);
            self.sinks.metrics.incr_counter("contract_join");
        }
        Ok(())
    }

    /// Declines a pending contract invitation. The invitation disappears,
    /// the original `WAITING` proposal is responded, and the confirmed
    /// members are notified. Declining an invitation that no longer exists
    /// is a no-op.
    pub async fn decline_contract(&self, ctid: &str, cid: &str) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let cid_arg = cid.to_string();

        let declined = self
            .run_blocking("decline_contract", move |conn| {
                let org = concord_orgs::get_organisation(conn, &cid_arg)?;
                if !concord_contracts::decline_membership(conn, &ctid_arg, &org.cid)? {
                    return Ok(false);
                }
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;

                respond_waiting_for_contract(conn, &org.cid, EventKind::ContractProposed, &ctid_arg);
                respond_waiting_for_contract(conn, &org.cid, EventKind::ContractInvited, &ctid_arg);

                notify_members(
                    conn,
                    &contract.organisations,
                    &org.cid,
                    &org_ref(&org),
                    &contract_ref(&contract),
                    None,
                    EventKind::ContractDeclined,
                    NotificationStatus::Rejected,
                )?;

                best_effort(
                    "write contract decline audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: org.cid.clone(),
                            actor: org_ref(&org),
                            target: contract_ref(&contract),
                            object: None,
                            kind: EventKind::ContractDeclined,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(true)
            })
            .await?;

        if declined {
            self.sinks.ledger.contract_rejected(ctid, cid);
            self.sinks.metrics.incr_counter("contract_decline");
        }
        Ok(())
    }

    /// Invites another organisation into an existing contract. The inviter
    /// must be a confirmed member and a current partner of the invitee; an
    /// approved contract drops back to pending until the invitee responds.
    pub async fn invite_to_contract(
        &self,
        ctid: &str,
        inviter_cid: &str,
        invitee_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let inviter_cid = inviter_cid.to_string();
        let invitee_cid = invitee_cid.to_string();

        let invited = self
            .run_blocking("invite_to_contract", move |conn| {
                let inviter = concord_orgs::get_organisation(conn, &inviter_cid)?;
                let invitee = concord_orgs::get_organisation(conn, &invitee_cid)?;
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;

                ensure_member(&contract, &inviter.cid)?;
                if concord_orgs::relationship_between(conn, &inviter.cid, &invitee.cid)?
                    != RelationshipState::Friends
                {
                    return Err(CoordinatorError::Conflict(format!(
                        "{} must be a partner of {} before contracting",
                        invitee.cid, inviter.cid
                    )));
                }

                if !concord_contracts::add_pending_organisation(conn, &ctid_arg, &invitee.cid)? {
                    return Ok(false);
                }
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;

                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: invitee.cid.clone(),
                        actor: org_ref(&inviter),
                        target: contract_ref(&contract),
                        object: Some(org_ref(&invitee)),
                        kind: EventKind::ContractInvited,
                        status: NotificationStatus::Waiting,
                    },
                )?;

                best_effort(
                    "write contract invite audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: inviter.cid.clone(),
                            actor: org_ref(&inviter),
                            target: org_ref(&invitee),
                            object: Some(contract_ref(&contract)),
                            kind: EventKind::ContractInvited,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(true)
            })
            .await?;

        if invited {
            self.sinks.metrics.incr_counter("contract_invite");
        }
        Ok(())
    }

    /// Withdraws a confirmed member from a contract: membership and every
    /// grant the organisation owns disappear in one contract write, the
    /// withdrawal lands in the removal history, and the remaining members
    /// are notified. Withdrawing a non-member is a no-op.
    pub async fn leave_contract(&self, ctid: &str, cid: &str) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let cid_arg = cid.to_string();

        let stripped = self
            .run_blocking("leave_contract", move |conn| {
                let org = concord_orgs::get_organisation(conn, &cid_arg)?;
                let before = concord_contracts::get_contract(conn, &ctid_arg)?;
                let stripped: Vec<String> = before
                    .items
                    .iter()
                    .filter(|item| item.cid == org.cid)
                    .map(|item| item.oid.clone())
                    .collect();

                if !concord_contracts::remove_organisation_from_contract(conn, &ctid_arg, &org.cid)?
                {
                    return Ok(None);
                }
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;

                notify_members(
                    conn,
                    &contract.organisations,
                    &org.cid,
                    &org_ref(&org),
                    &contract_ref(&contract),
                    None,
                    EventKind::ContractLeft,
                    NotificationStatus::Info,
                )?;

                best_effort(
                    "write contract withdrawal audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: org.cid.clone(),
                            actor: org_ref(&org),
                            target: contract_ref(&contract),
                            object: None,
                            kind: EventKind::ContractLeft,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(Some(stripped))
            })
            .await?;

        if let Some(oids) = stripped {
            for oid in &oids {
                self.sinks.ledger.item_removed(ctid, oid);
            }
            self.sinks.metrics.incr_counter("contract_leave");
        }
        Ok(())
    }

    /// Adds (or replaces) an item grant. Only a confirmed member may grant,
    /// only for items its own organisation owns according to the item
    /// registry.
    pub async fn add_contract_item(
        &self,
        ctid: &str,
        actor_cid: &str,
        item: ItemGrant,
    ) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let actor_cid = actor_cid.to_string();
        let registry = self.sinks.registry.clone();
        let oid = item.oid.clone();

        self.run_blocking("add_contract_item", move |conn| {
            let org = concord_orgs::get_organisation(conn, &actor_cid)?;
            let contract = concord_contracts::get_contract(conn, &ctid_arg)?;
            ensure_member(&contract, &org.cid)?;
            ensure_item_owned(&*registry, &org.cid, &item)?;

            concord_contracts::upsert_item_grant(conn, &ctid_arg, &item)?;

            let item_ref = EntityRef::new(&item.oid, &item.oid);
            notify_members(
                conn,
                &contract.organisations,
                &org.cid,
                &org_ref(&org),
                &contract_ref(&contract),
                Some(item_ref.clone()),
                EventKind::ContractItemAdded,
                NotificationStatus::Info,
            )?;

            best_effort(
                "write item grant audit",
                concord_audit::create_audit(
                    conn,
                    &NewAudit {
                        cid: org.cid.clone(),
                        actor: org_ref(&org),
                        target: contract_ref(&contract),
                        object: Some(item_ref),
                        kind: EventKind::ContractItemAdded,
                        labels: system_labels(),
                    },
                ),
            );

            Ok(())
        })
        .await?;

        self.sinks.ledger.item_added(ctid, &oid);
        self.sinks.metrics.incr_counter("contract_item_add");
        Ok(())
    }

    /// Enables or disables an existing grant. Only the granting
    /// organisation may toggle its own grants. Setting the state a grant
    /// already has is a no-op.
    pub async fn set_contract_item_enabled(
        &self,
        ctid: &str,
        actor_cid: &str,
        oid: &str,
        enabled: bool,
    ) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let actor_cid = actor_cid.to_string();
        let oid_arg = oid.to_string();

        let changed = self
            .run_blocking("set_contract_item_enabled", move |conn| {
                let org = concord_orgs::get_organisation(conn, &actor_cid)?;
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;
                ensure_member(&contract, &org.cid)?;
                let grant = find_grant(&contract, &oid_arg)?;
                ensure_granting_org(grant, &org.cid)?;
                if grant.enabled == enabled {
                    return Ok(false);
                }

                concord_contracts::set_item_enabled(conn, &ctid_arg, &oid_arg, enabled)?;

                let kind = if enabled {
                    EventKind::ContractItemEnabled
                } else {
                    EventKind::ContractItemDisabled
                };
                let item_ref = EntityRef::new(&oid_arg, &oid_arg);
                notify_members(
                    conn,
                    &contract.organisations,
                    &org.cid,
                    &org_ref(&org),
                    &contract_ref(&contract),
                    Some(item_ref.clone()),
                    kind,
                    NotificationStatus::Info,
                )?;

                best_effort(
                    "write item toggle audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: org.cid.clone(),
                            actor: org_ref(&org),
                            target: contract_ref(&contract),
                            object: Some(item_ref),
                            kind,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(true)
            })
            .await?;

        if changed {
            self.sinks.metrics.incr_counter("contract_item_toggle");
        }
        Ok(())
    }

    /// Removes an item grant. Only the granting organisation may withdraw
    /// its own grants. Removing a grant that no longer exists is a no-op.
    pub async fn remove_contract_item(
        &self,
        ctid: &str,
        actor_cid: &str,
        oid: &str,
    ) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let actor_cid = actor_cid.to_string();
        let oid_arg = oid.to_string();

        let removed = self
            .run_blocking("remove_contract_item", move |conn| {
                let org = concord_orgs::get_organisation(conn, &actor_cid)?;
                let contract = concord_contracts::get_contract(conn, &ctid_arg)?;
                ensure_member(&contract, &org.cid)?;
                match contract.items.iter().find(|item| item.oid == oid_arg) {
                    Some(grant) => ensure_granting_org(grant, &org.cid)?,
                    None => return Ok(false),
                }

                concord_contracts::remove_item_grant(conn, &ctid_arg, &oid_arg)?;

                let item_ref = EntityRef::new(&oid_arg, &oid_arg);
                notify_members(
                    conn,
                    &contract.organisations,
                    &org.cid,
                    &org_ref(&org),
                    &contract_ref(&contract),
                    Some(item_ref.clone()),
                    EventKind::ContractItemRemoved,
                    NotificationStatus::Info,
                )?;

                best_effort(
                    "write item removal audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: org.cid.clone(),
                            actor: org_ref(&org),
                            target: contract_ref(&contract),
                            object: Some(item_ref),
                            kind: EventKind::ContractItemRemoved,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(true)
            })
            .await?;

        if removed {
            self.sinks.ledger.item_removed(ctid, oid);
            self.sinks.metrics.incr_counter("contract_item_remove");
        }
        Ok(())
    }

    /// Dissolves a contract: terminal soft deletion. Every other involved
    /// organisation — confirmed or still pending — is notified. Dissolving
    /// an already-deleted contract is a no-op.
    pub async fn dissolve_contract(
        &self,
        ctid: &str,
        actor_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let ctid_arg = ctid.to_string();
        let actor_cid = actor_cid.to_string();

        let dissolved = self
            .run_blocking("dissolve_contract", move |conn| {
                let org = concord_orgs::get_organisation(conn, &actor_cid)?;
                let before = concord_contracts::get_contract(conn, &ctid_arg)?;
                if before.status == concord_types::ContractStatus::Deleted {
                    return Ok(false);
                }
                ensure_member(&before, &org.cid)?;

                concord_contracts::delete_contract(conn, &ctid_arg)?;

                // Outstanding invitations can no longer be acted on.
                for pending in &before.pending_organisations {
                    respond_waiting_for_contract(conn, pending, EventKind::ContractProposed, &ctid_arg);
                    respond_waiting_for_contract(conn, pending, EventKind::ContractInvited, &ctid_arg);
                }

                let mut recipients = before.organisations.clone();
                recipients.extend(before.pending_organisations.clone());
                notify_members(
                    conn,
                    &recipients,
                    &org.cid,
                    &org_ref(&org),
                    &contract_ref(&before),
                    None,
                    EventKind::ContractDissolved,
                    NotificationStatus::Info,
                )?;

                best_effort(
                    "write contract dissolution audit",
                    concord_audit::create_audit(
                        conn,
                        &NewAudit {
                            cid: org.cid.clone(),
                            actor: org_ref(&org),
                            target: contract_ref(&before),
                            object: None,
                            kind: EventKind::ContractDissolved,
                            labels: system_labels(),
                        },
                    ),
                );

                Ok(true)
            })
            .await?;

        if dissolved {
            self.sinks.ledger.contract_removed(ctid);
            self.sinks.metrics.incr_counter("contract_dissolve");
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn ensure_member(contract: &Contract, cid: &str) -> Result<(), CoordinatorError> {
    if !contract.organisations.iter().any(|member| member == cid) {
        return Err(CoordinatorError::Conflict(format!(
            "{cid} is not a confirmed member of {}",
            contract.ctid
        )));
    }
    Ok(())
}

fn ensure_granting_org(grant: &ItemGrant, cid: &str) -> Result<(), CoordinatorError> {
    if grant.cid != cid {
        return Err(CoordinatorError::Conflict(format!(
            "grant for {} belongs to {}, not {cid}",
            grant.oid, grant.cid
        )));
    }
    Ok(())
}

fn find_grant<'a>(contract: &'a Contract, oid: &str) -> Result<&'a ItemGrant, CoordinatorError> {
    contract
        .items
        .iter()
        .find(|item| item.oid == oid)
        .ok_or_else(|| {
            CoordinatorError::Conflict(format!("no grant for {oid} in {}", contract.ctid))
        })
}

/// A grant may only cover an item the granting organisation owns; the item
/// registry is the authority on ownership.
fn ensure_item_owned(
    registry: &dyn concord_contracts::ItemRegistry,
    cid: &str,
    item: &ItemGrant,
) -> Result<(), CoordinatorError> {
    if item.cid != cid {
        return Err(CoordinatorError::Conflict(format!(
            "grant for {} names owner {}, expected {cid}",
            item.oid, item.cid
        )));
    }
    match registry.resolve_owning_org(&item.oid)? {
        Some(owner) if owner == cid => Ok(()),
        Some(owner) => Err(CoordinatorError::Conflict(format!(
            "item {} belongs to {owner}, not {cid}",
            item.oid
        ))),
        None => Err(CoordinatorError::Conflict(format!(
            "item {} is not known to the registry",
            item.oid
        ))),
    }
}

/// Delivers one notification per listed member, skipping the acting
/// organisation. Notification creation is part of the primary sequence, so
/// a failure here propagates.
#[allow(clippy::too_many_arguments)]
fn notify_members(
    conn: &rusqlite::Connection,
    members: &[String],
    acting_cid: &str,
    actor: &EntityRef,
    target: &EntityRef,
    object: Option<EntityRef>,
    kind: EventKind,
    status: NotificationStatus,
) -> Result<(), CoordinatorError> {
    for member in members {
        if member == acting_cid {
            continue;
        }
        concord_mailbox::create_notification(
            conn,
            &NewNotification {
                owner_cid: member.clone(),
                actor: actor.clone(),
                target: target.clone(),
                object: object.clone(),
                kind,
                status,
            },
        )?;
    }
    Ok(())
}

/// Responds every matching `WAITING` notification for a contract,
/// independently per record.
fn respond_waiting_for_contract(
    conn: &rusqlite::Connection,
    owner_cid: &str,
    kind: EventKind,
    ctid: &str,
) {
    let matches = best_effort(
        "find waiting contract notifications for response transition",
        concord_mailbox::find_active_notifications(
            conn,
            &[owner_cid.to_string()],
            NotificationStatus::Waiting,
            kind,
            Some(ctid),
        ),
    )
    .unwrap_or_default();

    for notification in matches {
        best_effort(
            "respond waiting contract notification",
            concord_mailbox::respond(conn, &notification.notification_id),
        );
    }
}

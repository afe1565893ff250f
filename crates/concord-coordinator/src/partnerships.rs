//! Partnership lifecycle operations.
//!
//! State machine per ordered pair A→B: `None`, `OutgoingPending`,
//! `IncomingPending`, `Friends`. Each operation validates the current
//! state, mutates both halves of the edge pair through one store call, and
//! emits the notification/audit/gateway side effects the transition
//! requires. The idempotency rule throughout: an operation whose intended
//! outcome already holds is a silent no-op; an operation whose precondition
//! is missing *and* whose outcome does not hold is a conflict.

use concord_audit::NewAudit;
use concord_mailbox::NewNotification;
use concord_orgs::Organisation;
use concord_types::{EventKind, NotificationStatus, RelationshipState};

use crate::{best_effort, org_ref, system_labels, Coordinator, CoordinatorError};

impl Coordinator {
    /// `send_request(A, B)`: A asks B for a partnership.
    ///
    /// Creates the outgoing/incoming edge pair, a `WAITING` request in B's
    /// inbox, and an informational confirmation in A's. Replaying an
    /// already-pending request is a no-op; requesting an existing partner,
    /// yourself, or an organisation that has already requested *you* is a
    /// conflict.
    pub async fn send_partnership_request(
        &self,
        requester_cid: &str,
        recipient_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let requester_cid = requester_cid.to_string();
        let recipient_cid = recipient_cid.to_string();

        let sent = self
            .run_blocking("send_partnership_request", move |conn| {
                let requester = concord_orgs::get_organisation(conn, &requester_cid)?;
                let recipient = concord_orgs::get_organisation(conn, &recipient_cid)?;
                if requester.cid == recipient.cid {
                    return Err(CoordinatorError::Conflict(
                        "an organisation cannot partner with itself".to_string(),
                    ));
                }

                match concord_orgs::relationship_between(conn, &requester.cid, &recipient.cid)? {
                    RelationshipState::OutgoingPending => return Ok(false),
                    RelationshipState::Friends => {
                        return Err(CoordinatorError::Conflict(format!(
                            "{} and {} are already partners",
                            requester.cid, recipient.cid
                        )))
                    }
                    RelationshipState::IncomingPending => {
                        return Err(CoordinatorError::Conflict(format!(
                            "{} has already requested {}; respond to that request instead",
                            recipient.cid, requester.cid
                        )))
                    }
                    RelationshipState::None => {}
                }

                concord_orgs::record_request(conn, &requester.cid, &recipient.cid)?;

                // The WAITING request in the recipient's inbox. target is the
                // requesting organisation so the response transition can find
                // exactly this record later.
                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: recipient.cid.clone(),
                        actor: org_ref(&requester),
                        target: org_ref(&requester),
                        object: Some(org_ref(&recipient)),
                        kind: EventKind::PartnershipRequested,
                        status: NotificationStatus::Waiting,
                    },
                )?;

                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: requester.cid.clone(),
                        actor: org_ref(&requester),
                        target: org_ref(&recipient),
                        object: None,
                        kind: EventKind::PartnershipRequestSent,
                        status: NotificationStatus::Info,
                    },
                )?;

                Ok(true)
            })
            .await?;

        if sent {
            self.sinks.metrics.incr_counter("partnership_request");
        }
        Ok(())
    }

    /// `accept(A, B)`: A, the responder, confirms the request from B.
    ///
    /// Confirms both friend edges, responds the original `WAITING`
    /// notification(s), delivers an `ACCEPTED` notification to B, writes
    /// one audit record per organisation, and tells every gateway of both
    /// organisations that partner visibility changed. Accepting an
    /// already-confirmed partnership is a no-op; accepting without a
    /// pending request is a conflict.
    pub async fn accept_partnership(
        &self,
        responder_cid: &str,
        requester_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let responder_cid = responder_cid.to_string();
        let requester_cid = requester_cid.to_string();

        let affected = self
            .run_blocking("accept_partnership", move |conn| {
                let responder = concord_orgs::get_organisation(conn, &responder_cid)?;
                let requester = concord_orgs::get_organisation(conn, &requester_cid)?;

                match concord_orgs::relationship_between(conn, &responder.cid, &requester.cid)? {
                    RelationshipState::IncomingPending => {}
                    RelationshipState::Friends => return Ok(None),
                    _ => {
                        return Err(CoordinatorError::Conflict(format!(
                            "no pending partnership request from {} to {}",
                            requester.cid, responder.cid
                        )))
                    }
                }

                concord_orgs::confirm_friendship(conn, &responder.cid, &requester.cid)?;

                respond_waiting(
                    conn,
                    &responder.cid,
                    EventKind::PartnershipRequested,
                    &requester.cid,
                );

                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: requester.cid.clone(),
                        actor: org_ref(&responder),
                        target: org_ref(&requester),
                        object: None,
                        kind: EventKind::PartnershipAccepted,
                        status: NotificationStatus::Accepted,
                    },
                )?;

                audit_pair(conn, &responder, &requester, EventKind::PartnershipAccepted);

                Ok(Some(partner_gateways(conn, &responder, &requester)))
            })
            .await?;

        if let Some(agids) = affected {
            for agid in &agids {
                self.sinks.gateways.notify_partners_changed(agid);
            }
            self.sinks.metrics.incr_counter("partnership_accept");
        }
        Ok(())
    }

    /// `reject(A, B)`: A, the responder, declines the request from B.
    ///
    /// Removes both pending edges, responds the original `WAITING`
    /// notification(s), and delivers a `REJECTED` notification to B. No
    /// friendship results. Rejecting when no request is pending is a no-op
    /// unless the pair is already partnered, which is a conflict.
    pub async fn reject_partnership(
        &self,
        responder_cid: &str,
        requester_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let responder_cid = responder_cid.to_string();
        let requester_cid = requester_cid.to_string();

        let rejected = self
            .run_blocking("reject_partnership", move |conn| {
                let responder = concord_orgs::get_organisation(conn, &responder_cid)?;
                let requester = concord_orgs::get_organisation(conn, &requester_cid)?;

                match concord_orgs::relationship_between(conn, &responder.cid, &requester.cid)? {
                    RelationshipState::IncomingPending => {}
                    RelationshipState::Friends => {
                        return Err(CoordinatorError::Conflict(format!(
                            "{} and {} are already partners",
                            responder.cid, requester.cid
                        )))
                    }
                    _ => return Ok(false),
                }

                concord_orgs::dissolve_request(conn, &responder.cid, &requester.cid)?;

                respond_waiting(
                    conn,
                    &responder.cid,
                    EventKind::PartnershipRequested,
                    &requester.cid,
                );

                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: requester.cid.clone(),
                        actor: org_ref(&responder),
                        target: org_ref(&requester),
                        object: None,
                        kind: EventKind::PartnershipRejected,
                        status: NotificationStatus::Rejected,
                    },
                )?;

                Ok(true)
            })
            .await?;

        if rejected {
            self.sinks.metrics.incr_counter("partnership_reject");
        }
        Ok(())
    }

    /// `cancel(A, B)`: A, the requester, withdraws its own pending request
    /// to B.
    ///
    /// Removes both pending edges, responds the `WAITING` notification in
    /// B's inbox, and leaves B an informational cancellation notice.
    /// Cancelling a request that no longer exists is a no-op unless the
    /// pair is already partnered, which is a conflict.
    pub async fn cancel_partnership_request(
        &self,
        requester_cid: &str,
        recipient_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let requester_cid = requester_cid.to_string();
        let recipient_cid = recipient_cid.to_string();

        let cancelled = self
            .run_blocking("cancel_partnership_request", move |conn| {
                let requester = concord_orgs::get_organisation(conn, &requester_cid)?;
                let recipient = concord_orgs::get_organisation(conn, &recipient_cid)?;

                match concord_orgs::relationship_between(conn, &requester.cid, &recipient.cid)? {
                    RelationshipState::OutgoingPending => {}
                    RelationshipState::Friends => {
                        return Err(CoordinatorError::Conflict(format!(
                            "{} and {} are already partners",
                            requester.cid, recipient.cid
                        )))
                    }
                    _ => return Ok(false),
                }

                concord_orgs::dissolve_request(conn, &requester.cid, &recipient.cid)?;

                respond_waiting(
                    conn,
                    &recipient.cid,
                    EventKind::PartnershipRequested,
                    &requester.cid,
                );

                concord_mailbox::create_notification(
                    conn,
                    &NewNotification {
                        owner_cid: recipient.cid.clone(),
                        actor: org_ref(&requester),
                        target: org_ref(&recipient),
                        object: None,
                        kind: EventKind::PartnershipRequestCancelled,
                        status: NotificationStatus::Info,
                    },
                )?;

                Ok(true)
            })
            .await?;

        if cancelled {
            self.sinks.metrics.incr_counter("partnership_cancel");
        }
        Ok(())
    }

    /// `cancel_friendship(A, B)`: dissolves an established partnership.
    ///
    /// Removes both friend edges, writes one audit record per organisation,
    /// and tells every gateway of both organisations that partner
    /// visibility changed. Dissolving a partnership that does not exist is
    /// a silent no-op.
    pub async fn cancel_friendship(
        &self,
        initiator_cid: &str,
        partner_cid: &str,
    ) -> Result<(), CoordinatorError> {
        let initiator_cid = initiator_cid.to_string();
        let partner_cid = partner_cid.to_string();

        let affected = self
            .run_blocking("cancel_friendship", move |conn| {
                let initiator = concord_orgs::get_organisation(conn, &initiator_cid)?;
                let partner = concord_orgs::get_organisation(conn, &partner_cid)?;

                if concord_orgs::relationship_between(conn, &initiator.cid, &partner.cid)?
                    != RelationshipState::Friends
                {
                    return Ok(None);
                }

                concord_orgs::dissolve_friendship(conn, &initiator.cid, &partner.cid)?;

                audit_pair(conn, &initiator, &partner, EventKind::PartnershipDissolved);

                Ok(Some(partner_gateways(conn, &initiator, &partner)))
            })
            .await?;

        if let Some(agids) = affected {
            for agid in &agids {
                self.sinks.gateways.notify_partners_changed(agid);
            }
            self.sinks.metrics.incr_counter("partnership_dissolve");
        }
        Ok(())
    }
}

/// Responds every matching `WAITING` notification independently: one
/// record's failure is logged and the rest proceed.
fn respond_waiting(
    conn: &rusqlite::Connection,
    owner_cid: &str,
    kind: EventKind,
    target_id: &str,
) {
    let matches = best_effort(
        "find waiting notifications for response transition",
        concord_mailbox::find_active_notifications(
            conn,
            &[owner_cid.to_string()],
            NotificationStatus::Waiting,
            kind,
            Some(target_id),
        ),
    )
    .unwrap_or_default();

    for notification in matches {
        best_effort(
            "respond waiting notification",
            concord_mailbox::respond(conn, &notification.notification_id),
        );
    }
}

/// Writes the two per-organisation audit records for a partnership
/// transition, each best-effort. `first` is the acting organisation.
fn audit_pair(
    conn: &rusqlite::Connection,
    first: &Organisation,
    second: &Organisation,
    kind: EventKind,
) {
    for (own, peer) in [(first, second), (second, first)] {
        best_effort(
            "write partnership audit record",
            concord_audit::create_audit(
                conn,
                &NewAudit {
                    cid: own.cid.clone(),
                    actor: org_ref(first),
                    target: org_ref(peer),
                    object: None,
                    kind,
                    labels: system_labels(),
                },
            ),
        );
    }
}

/// Collects the gateways of both organisations for partner-change
/// notification. A listing failure is peripheral: the transition stands,
/// the affected gateways are simply not pushed to.
fn partner_gateways(
    conn: &rusqlite::Connection,
    a: &Organisation,
    b: &Organisation,
) -> Vec<String> {
    let mut agids = Vec::new();
    for org in [a, b] {
        if let Some(nodes) = best_effort(
            "list gateways for partner-change notification",
            concord_orgs::list_nodes(conn, &org.cid),
        ) {
            agids.extend(nodes);
        }
    }
    agids
}

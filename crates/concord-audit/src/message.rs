//! Pure derivation of the human-readable audit message.

use concord_types::EventKind;

/// Renders the audit message for an event kind and the involved names.
///
/// Total and pure: every kind yields a sentence, and identical inputs always
/// produce identical output. Kinds without a dedicated template fall back to
/// a generic sentence.
pub fn render_message(
    kind: EventKind,
    actor_name: &str,
    target_name: &str,
    object_name: Option<&str>,
) -> String {
    let object = object_name.unwrap_or("an item");
    match kind {
        EventKind::PartnershipRequested => {
            format!("{actor_name} requested a partnership with {target_name}")
        }
        EventKind::PartnershipRequestSent => {
            format!("{actor_name} sent a partnership request to {target_name}")
        }
        EventKind::PartnershipAccepted => {
            format!("{actor_name} accepted the partnership request from {target_name}")
        }
        EventKind::PartnershipRejected => {
            format!("{actor_name} rejected the partnership request from {target_name}")
        }
        EventKind::PartnershipRequestCancelled => {
            format!("{actor_name} withdrew the partnership request to {target_name}")
        }
        EventKind::PartnershipDissolved => {
            format!("{actor_name} dissolved the partnership with {target_name}")
        }
        EventKind::ContractProposed => {
            format!("{actor_name} proposed a contract to {target_name}")
        }
        EventKind::ContractProposalSent => {
            format!("{actor_name} sent a contract proposal to {target_name}")
        }
        EventKind::ContractJoined => {
            format!("{actor_name} joined the contract {target_name}")
        }
        EventKind::ContractDeclined => {
            format!("{actor_name} declined the contract proposal {target_name}")
        }
        EventKind::ContractInvited => {
            format!("{actor_name} invited {target_name} into a contract")
        }
        EventKind::ContractLeft => {
            format!("{actor_name} withdrew from the contract {target_name}")
        }
        EventKind::ContractDissolved => {
            format!("{actor_name} dissolved the contract {target_name}")
        }
        EventKind::ContractUpdated => {
            format!("{actor_name} updated the contract {target_name}")
        }
        EventKind::ContractItemAdded => {
            format!("{actor_name} added {object} to the contract {target_name}")
        }
        EventKind::ContractItemRemoved => {
            format!("{actor_name} removed {object} from the contract {target_name}")
        }
        EventKind::ContractItemEnabled => {
            format!("{actor_name} enabled {object} in the contract {target_name}")
        }
        EventKind::ContractItemDisabled => {
            format!("{actor_name} disabled {object} in the contract {target_name}")
        }
        EventKind::NodeRegistered => {
            format!("{actor_name} registered the gateway {object} for {target_name}")
        }
        EventKind::NodeDeregistered => {
            format!("{actor_name} removed the gateway {object} from {target_name}")
        }
        EventKind::CompanyRegistered => {
            format!("{actor_name} registered the organisation {target_name}")
        }
        EventKind::CompanyDeleted => {
            format!("{actor_name} deleted the organisation {target_name}")
        }
        // Remaining kinds share the generic sentence.
        _ => format!("{actor_name} performed {} on {target_name}", kind.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_deterministic() {
        let a = render_message(EventKind::PartnershipAccepted, "Acme", "Globex", None);
        let b = render_message(EventKind::PartnershipAccepted, "Acme", "Globex", None);
        assert_eq!(a, b);
    }

    #[test]
    fn every_kind_renders_a_nonempty_sentence() {
        for kind in EventKind::all() {
            let msg = render_message(*kind, "Acme", "Globex", Some("dataset-1"));
            assert!(!msg.is_empty());
            assert!(msg.contains("Acme"), "{msg} should name the actor");
        }
    }

    #[test]
    fn unhandled_kinds_use_the_generic_sentence() {
        let msg = render_message(EventKind::UserRoleChanged, "Acme", "Globex", None);
        assert_eq!(msg, "Acme performed USER_ROLE_CHANGED on Globex");
    }
}

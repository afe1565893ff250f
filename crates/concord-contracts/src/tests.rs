//! Unit tests for the contract store.

use rusqlite::Connection;

use crate::resolve::{common_contract_status, resolve_items_for_gateway, StaticItemRegistry};
use crate::store::{
    accept_membership, add_pending_organisation, create_contract, decline_membership,
    delete_contract, get_contract, list_contracts_for_org, remove_item_grant,
    remove_organisation_from_contract, set_item_enabled, upsert_item_grant,
};
use crate::types::{ItemGrant, NewContract};
use crate::ContractError;
use concord_types::{ContractStatus, ContractType};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    concord_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn grant(oid: &str, cid: &str) -> ItemGrant {
    ItemGrant {
        oid: oid.to_string(),
        cid: cid.to_string(),
        uid: "user-1".to_string(),
        user_mail: "user@example.org".to_string(),
        item_type: "dataset".to_string(),
        rw: false,
        enabled: true,
    }
}

fn proposal(creator: &str, invited: &[&str]) -> NewContract {
    NewContract {
        contract_type: ContractType::Private,
        description: "shared telemetry".to_string(),
        creator_cid: creator.to_string(),
        invited_cids: invited.iter().map(|s| s.to_string()).collect(),
        items: vec![grant("item-1", creator)],
    }
}

/// Asserts the derived-status invariant on a freshly loaded contract.
fn assert_status_invariant(conn: &Connection, ctid: &str) {
    let contract = get_contract(conn, ctid).expect("get contract");
    if contract.status == ContractStatus::Deleted {
        return;
    }
    let expect_approved =
        !contract.organisations.is_empty() && contract.pending_organisations.is_empty();
    assert_eq!(
        contract.status == ContractStatus::Approved,
        expect_approved,
        "status invariant violated: {:?}",
        contract
    );
}

#[test]
fn create_with_invitees_is_pending() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");

    assert_eq!(contract.status, ContractStatus::Pending);
    assert_eq!(contract.organisations, vec!["org-a"]);
    assert_eq!(contract.pending_organisations, vec!["org-b"]);
    assert_status_invariant(&conn, &contract.ctid);
}

#[test]
fn create_without_invitees_is_approved() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");
    assert_eq!(contract.status, ContractStatus::Approved);
}

#[test]
fn last_acceptance_approves_the_contract() {
    let mut conn = test_db();
    let contract =
        create_contract(&mut conn, &proposal("org-a", &["org-b", "org-c"])).expect("create");

    assert!(accept_membership(&mut conn, &contract.ctid, "org-b").expect("accept"));
    assert_status_invariant(&conn, &contract.ctid);
    assert_eq!(
        get_contract(&conn, &contract.ctid).expect("get").status,
        ContractStatus::Pending,
        "one invitation still open"
    );

    assert!(accept_membership(&mut conn, &contract.ctid, "org-c").expect("accept"));
    let approved = get_contract(&conn, &contract.ctid).expect("get");
    assert_eq!(approved.status, ContractStatus::Approved);
    assert_eq!(approved.organisations, vec!["org-a", "org-b", "org-c"]);
}

#[test]
fn accept_twice_is_a_no_op() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");

    assert!(accept_membership(&mut conn, &contract.ctid, "org-b").expect("accept"));
    assert!(!accept_membership(&mut conn, &contract.ctid, "org-b").expect("replay"));
}

#[test]
fn accept_without_invitation_is_a_conflict() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");

    let err = accept_membership(&mut conn, &contract.ctid, "org-z").expect_err("should fail");
    assert!(matches!(err, ContractError::Conflict(_)));
}

#[test]
fn invite_reopens_an_approved_contract() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");
    assert_eq!(contract.status, ContractStatus::Approved);

    assert!(add_pending_organisation(&mut conn, &contract.ctid, "org-b").expect("invite"));
    let reopened = get_contract(&conn, &contract.ctid).expect("get");
    assert_eq!(reopened.status, ContractStatus::Pending);
    assert_status_invariant(&conn, &contract.ctid);

    // Re-inviting is a no-op; inviting a member is a conflict.
    assert!(!add_pending_organisation(&mut conn, &contract.ctid, "org-b").expect("replay"));
    let err =
        add_pending_organisation(&mut conn, &contract.ctid, "org-a").expect_err("should fail");
    assert!(matches!(err, ContractError::Conflict(_)));
}

#[test]
fn decline_clears_the_invitation() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");

    assert!(decline_membership(&mut conn, &contract.ctid, "org-b").expect("decline"));
    let after = get_contract(&conn, &contract.ctid).expect("get");
    assert!(after.pending_organisations.is_empty());
    assert_eq!(after.status, ContractStatus::Approved);

    assert!(!decline_membership(&mut conn, &contract.ctid, "org-b").expect("replay is a no-op"));
}

#[test]
fn withdrawal_strips_grants_and_records_history() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");
    accept_membership(&mut conn, &contract.ctid, "org-b").expect("accept");
    upsert_item_grant(&mut conn, &contract.ctid, &grant("item-b1", "org-b")).expect("grant");
    upsert_item_grant(&mut conn, &contract.ctid, &grant("item-b2", "org-b")).expect("grant");

    assert!(remove_organisation_from_contract(&mut conn, &contract.ctid, "org-b").expect("remove"));

    let after = get_contract(&conn, &contract.ctid).expect("get");
    assert!(!after.organisations.contains(&"org-b".to_string()));
    assert!(after.removed_organisations.contains(&"org-b".to_string()));
    assert!(
        after.items.iter().all(|item| item.cid != "org-b"),
        "withdrawn organisation must not keep grants"
    );
    assert_status_invariant(&conn, &contract.ctid);

    assert!(
        !remove_organisation_from_contract(&mut conn, &contract.ctid, "org-b").expect("replay"),
        "withdrawing a non-member is a no-op"
    );
}

#[test]
fn one_grant_per_item_within_a_contract() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");

    let mut replacement = grant("item-1", "org-a");
    replacement.rw = true;
    upsert_item_grant(&mut conn, &contract.ctid, &replacement).expect("re-grant");

    let after = get_contract(&conn, &contract.ctid).expect("get");
    assert_eq!(after.items.len(), 1, "re-granting must overwrite, not append");
    assert!(after.items[0].rw);
}

#[test]
fn remove_item_grant_is_a_no_op_when_absent() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");

    assert!(remove_item_grant(&mut conn, &contract.ctid, "item-1").expect("remove"));
    assert!(!remove_item_grant(&mut conn, &contract.ctid, "item-1").expect("replay"));

    let after = get_contract(&conn, &contract.ctid).expect("get");
    assert!(after.items.is_empty());
}

#[test]
fn set_enabled_on_missing_grant_is_not_found() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");

    let err =
        set_item_enabled(&mut conn, &contract.ctid, "no-such-item", false).expect_err("fail");
    assert!(matches!(err, ContractError::NotFound(_)));
}

#[test]
fn delete_soft_clears_but_keeps_the_record() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");
    accept_membership(&mut conn, &contract.ctid, "org-b").expect("accept");
    remove_organisation_from_contract(&mut conn, &contract.ctid, "org-b").expect("remove");

    assert!(delete_contract(&mut conn, &contract.ctid).expect("delete"));
    assert!(!delete_contract(&mut conn, &contract.ctid).expect("replay is a no-op"));

    let after = get_contract(&conn, &contract.ctid).expect("record must persist");
    assert_eq!(after.status, ContractStatus::Deleted);
    assert!(after.organisations.is_empty());
    assert!(after.pending_organisations.is_empty());
    assert!(after.items.is_empty());
    assert_eq!(
        after.removed_organisations,
        vec!["org-b"],
        "removal history survives deletion"
    );

    // Terminal: no further mutation is accepted.
    let err = add_pending_organisation(&mut conn, &contract.ctid, "org-c").expect_err("fail");
    assert!(matches!(err, ContractError::Conflict(_)));
}

#[test]
fn resolution_returns_only_enabled_grants_on_the_gateway() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");
    upsert_item_grant(&mut conn, &contract.ctid, &grant("item-2", "org-a")).expect("grant");
    upsert_item_grant(&mut conn, &contract.ctid, &grant("item-3", "org-a")).expect("grant");
    set_item_enabled(&mut conn, &contract.ctid, "item-2", false).expect("disable");

    let mut registry = StaticItemRegistry::new();
    registry.insert("item-1", "gw-1", "org-a");
    registry.insert("item-2", "gw-1", "org-a");
    registry.insert("item-3", "gw-2", "org-a");

    let grants =
        resolve_items_for_gateway(&conn, &registry, &contract.ctid, "gw-1").expect("resolve");

    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].oid, "item-1");

    // Unknown gateway resolves to nothing; unknown contract is an error.
    assert!(resolve_items_for_gateway(&conn, &registry, &contract.ctid, "gw-9")
        .expect("resolve")
        .is_empty());
    assert!(matches!(
        resolve_items_for_gateway(&conn, &registry, "no-such-contract", "gw-1"),
        Err(ContractError::NotFound(_))
    ));
}

#[test]
fn resolution_skips_grants_the_registry_no_longer_knows() {
    let mut conn = test_db();
    let contract = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");

    let registry = StaticItemRegistry::new();
    let grants =
        resolve_items_for_gateway(&conn, &registry, &contract.ctid, "gw-1").expect("resolve");
    assert!(grants.is_empty());
}

#[test]
fn pair_classification_tracks_contract_state() {
    let mut conn = test_db();

    assert_eq!(
        common_contract_status(&conn, "org-a", "org-a").expect("self pair"),
        Default::default()
    );

    let contract = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");

    let pending = common_contract_status(&conn, "org-a", "org-b").expect("classify");
    assert!(!pending.contracted);
    assert!(pending.contract_requested);

    accept_membership(&mut conn, &contract.ctid, "org-b").expect("accept");
    let confirmed = common_contract_status(&conn, "org-a", "org-b").expect("classify");
    assert!(confirmed.contracted);
    assert!(!confirmed.contract_requested);

    delete_contract(&mut conn, &contract.ctid).expect("delete");
    let gone = common_contract_status(&conn, "org-a", "org-b").expect("classify");
    assert_eq!(gone, Default::default());
}

#[test]
fn community_contracts_do_not_classify_pairs() {
    let mut conn = test_db();
    let mut params = proposal("org-a", &["org-b"]);
    params.contract_type = ContractType::Community;
    let contract = create_contract(&mut conn, &params).expect("create");
    accept_membership(&mut conn, &contract.ctid, "org-b").expect("accept");

    let status = common_contract_status(&conn, "org-a", "org-b").expect("classify");
    assert_eq!(status, Default::default());
}

#[test]
fn list_contracts_for_org_excludes_deleted() {
    let mut conn = test_db();
    let first = create_contract(&mut conn, &proposal("org-a", &[])).expect("create");
    let second = create_contract(&mut conn, &proposal("org-a", &["org-b"])).expect("create");

    delete_contract(&mut conn, &first.ctid).expect("delete");

    let contracts = list_contracts_for_org(&conn, "org-a").expect("list");
    assert_eq!(contracts.len(), 1);
    assert_eq!(contracts[0].ctid, second.ctid);
}

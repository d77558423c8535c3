// Integration tests for the share lifecycle and the side index.

mod common;

use common::{
    assert_index_pairing, plan_named, plans_of, remote, share_index, shares_of, Device,
    HookedRemote,
};
use plan_sync_core::{
    EngineError, RemoteStore, ShareIndexEntry, ShareRecord, ShareStatus, WorkoutPlan, WriteBatch,
};

async fn owner_plan(device: &Device, id: &str) -> WorkoutPlan {
    device.engine.get(id).await.unwrap()
}

#[tokio::test]
async fn share_then_accept() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();

    owner.engine.share(&id, "friend").await.unwrap();
    assert_index_pairing(&remote, &["owner"]);

    let inbox = friend.engine.list_shared_with_me().await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].plan.id, id);
    assert_eq!(inbox[0].plan.name, "Leg Day");
    assert_eq!(inbox[0].share.status, ShareStatus::Pending);
    assert_eq!(inbox[0].share.shared_by, "owner");

    friend.engine.accept(&id).await.unwrap();

    let inbox = friend.engine.list_shared_with_me().await.unwrap();
    assert_eq!(inbox[0].share.status, ShareStatus::Accepted);
    assert!(inbox[0].share.responded_at.is_some());

    let plan = owner_plan(&owner, &id).await;
    assert_eq!(plan.shared_with, vec!["friend".to_string()]);
    assert!(plan.is_shared);
    assert_index_pairing(&remote, &["owner"]);
}

#[tokio::test]
async fn reject_removes_membership_and_is_not_repeatable() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();

    friend.engine.reject(&id).await.unwrap();

    let plan = owner_plan(&owner, &id).await;
    assert!(plan.shared_with.is_empty());
    assert!(!plan.is_shared);
    assert!(friend.engine.list_shared_with_me().await.unwrap().is_empty());
    assert!(remote.documents(&share_index()).is_empty());
    assert_index_pairing(&remote, &["owner"]);

    let err = friend.engine.reject(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictAlreadyProcessed));
    let err = friend.engine.accept(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictAlreadyProcessed));
}

#[tokio::test]
async fn reject_keeps_plan_shared_with_remaining_recipients() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();
    owner.engine.share(&id, "rival").await.unwrap();

    friend.engine.reject(&id).await.unwrap();

    let plan = owner_plan(&owner, &id).await;
    assert_eq!(plan.shared_with, vec!["rival".to_string()]);
    assert!(plan.is_shared);
    assert_index_pairing(&remote, &["owner"]);
}

#[tokio::test]
async fn accept_twice_is_a_conflict() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();

    friend.engine.accept(&id).await.unwrap();
    let err = friend.engine.accept(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictAlreadyProcessed));
    let err = friend.engine.reject(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictAlreadyProcessed));
}

#[tokio::test]
async fn accept_without_share_is_a_conflict() {
    let remote = remote();
    let friend = Device::new(&remote, Some("friend"));
    let err = friend.engine.accept("nothing").await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictAlreadyProcessed));
}

#[tokio::test]
async fn unshare_removes_record_index_and_membership() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();
    friend.engine.accept(&id).await.unwrap();

    owner.engine.unshare(&id, "friend").await.unwrap();

    let plan = owner_plan(&owner, &id).await;
    assert!(plan.shared_with.is_empty());
    assert!(!plan.is_shared);
    assert!(remote.documents(&shares_of("owner")).is_empty());
    assert!(remote.documents(&share_index()).is_empty());
    assert!(friend.engine.list_shared_with_me().await.unwrap().is_empty());

    // Repeating the cleanup is harmless.
    owner.engine.unshare(&id, "friend").await.unwrap();
    assert_index_pairing(&remote, &["owner"]);
}

#[tokio::test]
async fn only_the_owner_may_share_or_unshare() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();

    let err = friend.engine.share(&id, "stranger").await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
    let err = friend.engine.unshare(&id, "friend").await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let err = friend.engine.share("no-such-plan", "stranger").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn share_guards_against_bad_targets() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();

    let err = owner.engine.share(&id, "owner").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = owner.engine.share(&id, " ").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    owner.engine.share(&id, "friend").await.unwrap();
    let err = owner.engine.share(&id, "friend").await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictAlreadyProcessed));
    assert_eq!(remote.documents(&share_index()).len(), 1);
}

#[tokio::test]
async fn local_only_plans_cannot_be_shared() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    remote.set_reachable(false);
    let id = owner.engine.create(plan_named("Push Day")).await.unwrap();
    remote.set_reachable(true);

    let err = owner.engine.share(&id, "friend").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn sharing_surfaces_unavailable_store() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();

    remote.set_reachable(false);
    let err = owner.engine.share(&id, "friend").await.unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    let err = friend.engine.list_shared_with_me().await.unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));

    remote.set_reachable(true);
    owner.identity.sign_out();
    let err = owner.engine.share(&id, "friend").await.unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));

    // Nothing half-written.
    assert!(remote.documents(&shares_of("owner")).is_empty());
    assert!(remote.documents(&share_index()).is_empty());
}

#[tokio::test]
async fn failed_batch_leaves_no_partial_share() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();

    remote.fail_writes_for(format!("friend_owner_{}", id));
    assert!(owner.engine.share(&id, "friend").await.is_err());

    assert!(remote.documents(&shares_of("owner")).is_empty());
    assert!(remote.documents(&share_index()).is_empty());
    let stored = &remote.documents(&plans_of("owner"))[0].data;
    assert_eq!(stored["isShared"], serde_json::json!(false));
}

#[tokio::test]
async fn plan_can_be_shared_again_after_rejection() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();
    friend.engine.reject(&id).await.unwrap();

    owner.engine.share(&id, "friend").await.unwrap();

    let inbox = friend.engine.list_shared_with_me().await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].share.status, ShareStatus::Pending);
    assert_index_pairing(&remote, &["owner"]);
}

#[tokio::test]
async fn inbox_gathers_shares_from_several_sharers() {
    let remote = remote();
    let alice = Device::new(&remote, Some("alice"));
    let bob = Device::new(&remote, Some("bob"));
    let carol = Device::new(&remote, Some("carol"));

    let legs = alice.engine.create(plan_named("Leg Day")).await.unwrap();
    let arms = alice.engine.create(plan_named("Arm Day")).await.unwrap();
    let core = bob.engine.create(plan_named("Core Day")).await.unwrap();
    alice.engine.share(&legs, "carol").await.unwrap();
    alice.engine.share(&arms, "carol").await.unwrap();
    bob.engine.share(&core, "carol").await.unwrap();
    alice.engine.share(&legs, "bob").await.unwrap();

    let mut names: Vec<String> = carol
        .engine
        .list_shared_with_me()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.plan.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Arm Day", "Core Day", "Leg Day"]);

    let bobs = bob.engine.list_shared_with_me().await.unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].plan.id, legs);
    assert_index_pairing(&remote, &["alice", "bob"]);
}

#[tokio::test]
async fn owner_sees_outgoing_shares() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();
    owner.engine.share(&id, "friend").await.unwrap();
    owner.engine.share(&id, "rival").await.unwrap();
    friend.engine.accept(&id).await.unwrap();

    let records = owner.engine.list_outgoing_shares(&id).await.unwrap();
    assert_eq!(records.len(), 2);
    let friend_record = records.iter().find(|r| r.shared_with == "friend").unwrap();
    assert_eq!(friend_record.status, ShareStatus::Accepted);
    let rival_record = records.iter().find(|r| r.shared_with == "rival").unwrap();
    assert_eq!(rival_record.status, ShareStatus::Pending);
}

#[tokio::test]
async fn shared_flag_tracks_recipients_through_lifecycle() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let friend = Device::new(&remote, Some("friend"));
    let rival = Device::new(&remote, Some("rival"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();

    let check = |plan: WorkoutPlan| assert_eq!(plan.is_shared, !plan.shared_with.is_empty());

    check(owner_plan(&owner, &id).await);
    owner.engine.share(&id, "friend").await.unwrap();
    check(owner_plan(&owner, &id).await);
    owner.engine.share(&id, "rival").await.unwrap();
    check(owner_plan(&owner, &id).await);
    friend.engine.accept(&id).await.unwrap();
    check(owner_plan(&owner, &id).await);
    rival.engine.reject(&id).await.unwrap();
    check(owner_plan(&owner, &id).await);
    owner.engine.unshare(&id, "friend").await.unwrap();
    let plan = owner_plan(&owner, &id).await;
    assert!(!plan.is_shared);
    check(plan);
    assert_index_pairing(&remote, &["owner"]);
}

#[tokio::test]
async fn response_racing_an_unshare_is_a_conflict() {
    let remote = remote();
    let owner = Device::new(&remote, Some("owner"));
    let racing = HookedRemote::new(&remote);
    let friend = Device::with_remote(racing.clone(), Some("friend"));
    let id = owner.engine.create(plan_named("Leg Day")).await.unwrap();

    for respond_with_accept in [true, false] {
        owner.engine.share(&id, "friend").await.unwrap();

        // The owner withdraws the share after the friend looked it up.
        let store = remote.clone();
        let plan_id = id.clone();
        racing.before_next_write(move || async move {
            let mut batch = WriteBatch::new();
            batch.delete(shares_of("owner"), ShareRecord::document_id(&plan_id, "friend"));
            batch.delete(
                share_index(),
                ShareIndexEntry::document_id("friend", "owner", &plan_id),
            );
            store.commit(batch).await.unwrap();
        });

        let result = if respond_with_accept {
            friend.engine.accept(&id).await
        } else {
            friend.engine.reject(&id).await
        };
        assert!(matches!(result, Err(EngineError::ConflictAlreadyProcessed)));
        assert!(remote.documents(&shares_of("owner")).is_empty());

        // Reset membership for the next round.
        owner.engine.unshare(&id, "friend").await.unwrap();
    }
}

//! End-to-end admission scenarios against the in-memory store.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use huddle_core::events::{ChangeReason, DomainEvent, ParticipationEvent};
use huddle_core::service::JoinRequest;
use huddle_core::types::{
    ActivityJoinMode, MembershipStatus, OrgJoinMode, ParticipationStatus, SessionJoinMode,
    SessionStatus, UserIdentifier,
};
use huddle_core::{EngineError, ErrorKind};
use huddle_testing::World;

#[tokio::test]
async fn test_waitlist_promotion_on_cancel() {
    let world = World::new().await;
    let session = world.published_session(2, 1).await;
    let alice = world.member("alice").await;
    let bob = world.member("bob").await;
    let carol = world.member("carol").await;

    let a = world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect("alice joins");
    let b = world
        .service
        .join(&bob, session.id, JoinRequest::default())
        .await
        .expect("bob joins");
    let c = world
        .service
        .join(&carol, session.id, JoinRequest::default())
        .await
        .expect("carol joins");

    assert_eq!(a.status, ParticipationStatus::Joined);
    assert_eq!(b.status, ParticipationStatus::Joined);
    assert_eq!(c.status, ParticipationStatus::Waitlisted);

    world.publisher.clear();
    let cancelled = world.service.cancel(&alice, a.id).await.expect("alice cancels");
    assert_eq!(cancelled.status, ParticipationStatus::Cancelled);

    let mut joined = world.joined_users(session.id).await;
    joined.sort();
    let mut expected = vec![bob.user_id, carol.user_id];
    expected.sort();
    assert_eq!(joined, expected);

    let events = world.publisher.events();
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::Participation(ParticipationEvent::ParticipantPromoted { user_id, .. })
            if *user_id == carol.user_id
    )));
}

#[tokio::test]
async fn test_full_session_with_full_waitlist_rejects() {
    let world = World::new().await;
    let session = world.published_session(1, 1).await;

    for name in ["alice", "bob"] {
        let caller = world.member(name).await;
        world
            .service
            .join(&caller, session.id, JoinRequest::default())
            .await
            .expect("seat or waitlist available");
    }

    let dave = world.member("dave").await;
    let err = world
        .service
        .join(&dave, session.id, JoinRequest::default())
        .await
        .expect_err("no room left");

    assert_eq!(err, EngineError::SessionFull);
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(world.roster(session.id).await.len(), 2);
}

#[tokio::test]
async fn test_approval_when_full_lands_on_waitlist() {
    let world = World::new().await;
    let session = world
        .session_with(|s| {
            s.join_mode = SessionJoinMode::ApprovalRequired;
            s.max_capacity = 1;
            s.max_waitlist = 1;
        })
        .await;

    let seated = world.member("seated").await;
    world
        .service
        .admin_add(&world.admin, session.id, &UserIdentifier::Id(seated.user_id))
        .await
        .expect("admin add");

    let dave = world.member("dave").await;
    let request = world
        .service
        .join(&dave, session.id, JoinRequest::default())
        .await
        .expect("request recorded");
    assert_eq!(request.status, ParticipationStatus::Pending);

    let approved = world
        .service
        .approve_pending(&world.admin, request.id)
        .await
        .expect("approval");

    assert_eq!(approved.status, ParticipationStatus::Waitlisted);
}

#[tokio::test]
async fn test_completed_session_cannot_be_republished() {
    let world = World::new().await;
    let session = world
        .session_with(|s| s.status = SessionStatus::Completed)
        .await;

    let err = world
        .service
        .update_session_status(&world.admin, session.id, SessionStatus::Published)
        .await
        .expect_err("terminal session");

    assert_eq!(
        err,
        EngineError::InvalidSessionTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Published,
        }
    );
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_invite_activity_forbids_non_members() {
    let world = World::with_modes(OrgJoinMode::Open, ActivityJoinMode::Invite).await;
    let session = world.published_session(5, 0).await;
    let member = world.member("erin").await;
    let guest = world.guest("frank").await;

    for caller in [&member, &guest] {
        let err = world
            .service
            .join(caller, session.id, JoinRequest::default())
            .await
            .expect_err("invite-only activity");
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
    assert!(world.roster(session.id).await.is_empty());
}

#[tokio::test]
async fn test_move_to_other_organization_is_not_found() {
    let world = World::new().await;
    let session = world.published_session(5, 0).await;
    let foreign = world.foreign_session().await;
    let alice = world.member("alice").await;

    let participation = world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect("join");

    let err = world
        .service
        .move_participation(&world.admin, participation.id, foreign.id)
        .await
        .expect_err("foreign target");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    let roster = world.roster(session.id).await;
    assert_eq!(roster, vec![participation]);
    assert!(world.roster(foreign.id).await.is_empty());
}

#[tokio::test]
async fn test_cancelling_twice_promotes_once() {
    let world = World::new().await;
    let session = world.published_session(1, 2).await;
    let alice = world.member("alice").await;
    let bob = world.member("bob").await;
    let carol = world.member("carol").await;

    let a = world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect("alice");
    world
        .service
        .join(&bob, session.id, JoinRequest::default())
        .await
        .expect("bob");
    let c = world
        .service
        .join(&carol, session.id, JoinRequest::default())
        .await
        .expect("carol");

    world.service.cancel(&alice, a.id).await.expect("first cancel");
    let second = world.service.cancel(&alice, a.id).await;

    assert_eq!(second, Err(EngineError::ParticipationNotFound));
    assert_eq!(world.joined_users(session.id).await, vec![bob.user_id]);
    let roster = world.roster(session.id).await;
    let carol_row = roster.iter().find(|p| p.id == c.id).expect("carol row");
    assert_eq!(carol_row.status, ParticipationStatus::Waitlisted);
}

#[tokio::test]
async fn test_promotion_is_fifo() {
    let world = World::new().await;
    let session = world.published_session(1, 3).await;
    let seated = world.member("seated").await;
    let first = world.member("first").await;
    let second = world.member("second").await;

    let seat = world
        .service
        .join(&seated, session.id, JoinRequest::default())
        .await
        .expect("seat");
    for caller in [&first, &second] {
        world
            .service
            .join(caller, session.id, JoinRequest::default())
            .await
            .expect("waitlist");
    }

    world
        .service
        .remove_participant(&world.admin, seat.id)
        .await
        .expect("removal");

    assert_eq!(world.joined_users(session.id).await, vec![first.user_id]);
}

#[tokio::test]
async fn test_open_activity_join_activates_membership() {
    let world = World::new().await;
    let session = world.published_session(5, 0).await;
    let alice = world.member("alice").await;
    world
        .activity_membership(&world.activity, &alice, MembershipStatus::Rejected)
        .await;

    world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect("join");

    let tables = world.store.snapshot().await;
    let membership = tables
        .activity_memberships
        .get(&(world.activity.id, alice.user_id))
        .expect("membership row");
    assert_eq!(membership.status, MembershipStatus::Active);
}

#[tokio::test]
async fn test_require_approval_activity_needs_membership() {
    let world = World::with_modes(OrgJoinMode::Open, ActivityJoinMode::RequireApproval).await;
    let session = world.published_session(5, 0).await;
    let alice = world.member("alice").await;

    let err = world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect_err("needs activity membership");
    assert_eq!(err, EngineError::ActivityMembershipRequired);
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    world
        .activity_membership(&world.activity, &alice, MembershipStatus::Active)
        .await;
    let joined = world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect("active member joins");
    assert_eq!(joined.status, ParticipationStatus::Joined);
}

#[tokio::test]
async fn test_rejecting_joined_participant_promotes() {
    let world = World::new().await;
    let session = world.published_session(1, 1).await;
    let alice = world.member("alice").await;
    let bob = world.member("bob").await;

    let a = world
        .service
        .join(&alice, session.id, JoinRequest::default())
        .await
        .expect("alice");
    world
        .service
        .join(&bob, session.id, JoinRequest::default())
        .await
        .expect("bob");
    world.publisher.clear();

    world
        .service
        .reject_pending(&world.admin, a.id)
        .await
        .expect("reject");

    assert_eq!(world.joined_users(session.id).await, vec![bob.user_id]);
    assert!(world.publisher.events().iter().any(|e| matches!(
        e,
        DomainEvent::Participation(ParticipationEvent::ParticipantStatusChanged {
            reason: ChangeReason::Rejected,
            ..
        })
    )));
}

//! Decisions on the same request must serialize: no interleaving can corrupt
//! the approval chain or invoke the effect applier more than once.

use std::sync::Arc;

use countersign::{
    Action, AnyChangeRequest, ApprovalEngine, ApprovalStatus, CountersignError, Decision,
    InMemoryAuditLog, InMemoryRequestStore, MockEffectApplier, Priority, RequestId, UserId,
};

type TestEngine = ApprovalEngine<InMemoryRequestStore, MockEffectApplier, InMemoryAuditLog>;

fn setup() -> (Arc<TestEngine>, Arc<MockEffectApplier>, Arc<InMemoryAuditLog>) {
    let store = Arc::new(InMemoryRequestStore::new());
    let effect = Arc::new(MockEffectApplier::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let engine = Arc::new(ApprovalEngine::new(store, effect.clone(), audit.clone()));
    (engine, effect, audit)
}

async fn submit(engine: &TestEngine, approvers: &[&str]) -> RequestId {
    engine
        .submit_request(
            UserId::from("john.mwangi"),
            Action::new("user-management", "Create User", "create alice"),
            Priority::Normal,
            approvers.iter().map(|a| UserId::from(*a)).collect(),
        )
        .await
        .expect("Failed to submit request")
        .id()
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_racing_approvals_serialize_to_single_approved_state() {
    let (engine, effect, audit) = setup();
    let request_id = submit(&engine, &["sarah.kimani", "david.ochieng"]).await;

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .record_decision(
                    request_id,
                    &UserId::from("sarah.kimani"),
                    Decision::Approve,
                    None,
                )
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .record_decision(
                    request_id,
                    &UserId::from("david.ochieng"),
                    Decision::Approve,
                    None,
                )
                .await
        })
    };

    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert!(ra.is_ok(), "approval by sarah failed: {:?}", ra.err());
    assert!(rb.is_ok(), "approval by david failed: {:?}", rb.err());

    // Both decisions committed; the chain completed exactly once
    let snapshot = engine.get(request_id).await.unwrap();
    let AnyChangeRequest::Approved(approved) = &snapshot else {
        panic!("Expected approved request, got {}", snapshot.variant());
    };
    assert!(
        approved
            .state
            .approvals
            .iter()
            .all(|e| e.status == ApprovalStatus::Approved)
    );
    assert_eq!(effect.apply_count(), 1, "effect applier must run exactly once");
    assert_eq!(audit.events().len(), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_approval_racing_rejection_resolves_deterministically() {
    let (engine, effect, _audit) = setup();
    let request_id = submit(&engine, &["sarah.kimani", "david.ochieng"]).await;

    let approve = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .record_decision(
                    request_id,
                    &UserId::from("sarah.kimani"),
                    Decision::Approve,
                    None,
                )
                .await
        })
    };
    let reject = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .record_decision(
                    request_id,
                    &UserId::from("david.ochieng"),
                    Decision::Reject,
                    Some("budget freeze".to_string()),
                )
                .await
        })
    };

    let approve_result = approve.await.unwrap();
    let reject_result = reject.await.unwrap();

    // With a two-approver chain, an approval can never complete it while a
    // rejection is outstanding: whichever serializes first, the rejection
    // terminates the chain. The approval either committed before the
    // rejection (Ok) or arrived after the terminal commit (RequestTerminal).
    let snapshot = engine.get(request_id).await.unwrap();
    let AnyChangeRequest::Rejected(rejected) = &snapshot else {
        panic!("Expected rejected request, got {}", snapshot.variant());
    };
    assert_eq!(rejected.state.rejected_by, UserId::from("david.ochieng"));

    assert!(reject_result.is_ok(), "rejection failed: {:?}", reject_result.err());
    match approve_result {
        Ok(s) => {
            // Approval won the race to commit first; its entry is on record
            assert!(s.is_pending());
            assert_eq!(
                rejected.state.approvals[0].status,
                ApprovalStatus::Approved
            );
        }
        Err(CountersignError::RequestTerminal(id, _)) => {
            assert_eq!(id, request_id);
            assert_eq!(
                rejected.state.approvals[0].status,
                ApprovalStatus::NotRequired
            );
        }
        Err(e) => panic!("Unexpected error from racing approval: {:?}", e),
    }

    assert_eq!(effect.apply_count(), 0, "rejected request must never apply");
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_duplicate_decision_storm_commits_exactly_once() {
    let (engine, _effect, _audit) = setup();
    let request_id = submit(&engine, &["sarah.kimani", "david.ochieng"]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .record_decision(
                    request_id,
                    &UserId::from("sarah.kimani"),
                    Decision::Approve,
                    None,
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut already_decided = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CountersignError::AlreadyDecided { .. }) => already_decided += 1,
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1, "exactly one duplicate may commit");
    assert_eq!(already_decided, 7);

    // The chain is unchanged beyond sarah's single entry
    let snapshot = engine.get(request_id).await.unwrap();
    assert!(snapshot.is_pending());
    assert_eq!(snapshot.approvals()[0].status, ApprovalStatus::Approved);
    assert_eq!(snapshot.approvals()[1].status, ApprovalStatus::Pending);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 8))]
async fn test_many_approver_chain_converges_under_contention() {
    let (engine, effect, audit) = setup();
    let approvers: Vec<String> = (0..6).map(|i| format!("checker-{}", i)).collect();
    let approver_refs: Vec<&str> = approvers.iter().map(String::as_str).collect();
    let request_id = submit(&engine, &approver_refs).await;

    let mut handles = Vec::new();
    for approver in &approvers {
        let engine = engine.clone();
        let approver = UserId::from(approver.clone());
        handles.push(tokio::spawn(async move {
            engine
                .record_decision(request_id, &approver, Decision::Approve, None)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("each distinct approver commits once");
    }

    let snapshot = engine.get(request_id).await.unwrap();
    let AnyChangeRequest::Approved(approved) = &snapshot else {
        panic!("Expected approved request, got {}", snapshot.variant());
    };
    assert_eq!(approved.state.approvals.len(), 6);
    assert!(
        approved
            .state
            .approvals
            .iter()
            .all(|e| e.status == ApprovalStatus::Approved)
    );
    // No partial approval count mismatch is observable after convergence
    assert_eq!(effect.apply_count(), 1);
    assert_eq!(audit.events().len(), 1);
}

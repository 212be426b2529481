mod common;

use common::{Reply, ScriptedClient, init_tracing};
use converge_core::{
    CancellationToken, Classifier, Converged, EngineError, Method, Mutation, OperationHandle,
    OperationKind, PollSpec, Reconciler, RemoteClient, ResourceScope, TransientRule, TransportError,
    Vocabulary, WaitContext,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn wait() -> PollSpec {
    PollSpec::new(Duration::from_secs(60)).with_poll_interval(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_missing_resource_succeeds_without_polling() {
    init_tracing();
    let path = "/cloud/project/p1/network/private/pn-1";
    let client = ScriptedClient::new().on_submit(
        Method::Delete,
        path,
        Reply::Status(404, "This network does not exist"),
    );

    let result = Reconciler::new(&client)
        .submit_and_wait(
            Method::Delete,
            path,
            None,
            OperationKind::Delete,
            Vocabulary::PrivateNetwork,
            ResourceScope::new("p1").with_resource_id("pn-1"),
            &wait(),
        )
        .await;

    assert_eq!(assert_ok!(result), Converged::Absent);
    assert_eq!(client.calls(), vec![format!("DELETE {}", path)]);
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_terminated_service_succeeds() {
    let path = "/dbaas/logs/ldp-1/output/graylog/stream/s-1";
    let client = ScriptedClient::new().on_submit(Method::Delete, path, Reply::Status(460, "Service expired"));

    let converged = Reconciler::new(&client)
        .reconcile(OperationKind::Delete, &wait(), |c| async move {
            c.submit(Method::Delete, path, None)
                .await
                .map(|_| Mutation::Settled(json!(null)))
        })
        .await
        .unwrap();

    assert!(converged.is_absent());
}

#[tokio::test(start_paused = true)]
async fn test_not_found_during_create_is_fatal() {
    let path = "/cloud/project/p1/user";
    let client = ScriptedClient::new().on_submit(Method::Post, path, Reply::Status(404, "project not found"));

    let err = Reconciler::new(&client)
        .submit_and_wait(
            Method::Post,
            path,
            Some(&json!({"description": "ci"})),
            OperationKind::Create,
            Vocabulary::CloudUser,
            ResourceScope::new("p1"),
            &wait(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(404));
    assert!(err.to_string().contains("POST /cloud/project/p1/user"));
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_endpoint_returns_state_unchanged() {
    let client = ScriptedClient::new();
    let state = json!({"id": "r-1", "name": "edge"});
    let expected = state.clone();

    let converged = Reconciler::new(&client)
        .reconcile(OperationKind::Update, &wait(), |_| async move { Ok::<_, TransportError>(Mutation::Settled(state)) })
        .await
        .unwrap();

    assert_eq!(converged, Converged::State(expected));
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_private_network_waits_for_active() {
    let collection = "/cloud/project/p1/network/private";
    let path = "/cloud/project/p1/network/private/pn-1";
    let client = ScriptedClient::new()
        .on_submit(
            Method::Post,
            collection,
            Reply::Ok(json!({"id": "pn-1", "status": "BUILDING"})),
        )
        .on_get(
            path,
            vec![
                Reply::Ok(json!({"id": "pn-1", "status": "BUILDING"})),
                Reply::Ok(json!({"id": "pn-1", "status": "ACTIVE"})),
            ],
        );

    let converged = Reconciler::new(&client)
        .submit_and_wait(
            Method::Post,
            collection,
            Some(&json!({"name": "backend", "vlanId": 42})),
            OperationKind::Create,
            Vocabulary::PrivateNetwork,
            ResourceScope::new("p1"),
            &wait(),
        )
        .await
        .unwrap();

    assert_eq!(converged.state().unwrap()["status"], "ACTIVE");
    assert_eq!(client.count(Method::Post, collection), 1);
    assert_eq!(client.count(Method::Get, path), 2);
}

#[tokio::test(start_paused = true)]
async fn test_delete_private_network_waits_for_absence() {
    let path = "/cloud/project/p1/network/private/pn-1";
    let client = ScriptedClient::new()
        .on_submit(Method::Delete, path, Reply::Ok(json!(null)))
        .on_get(
            path,
            vec![
                Reply::Ok(json!({"id": "pn-1", "status": "DELETING"})),
                Reply::Ok(json!({"id": "pn-1", "status": "DELETING"})),
                Reply::Status(404, "This network does not exist"),
            ],
        );

    let converged = Reconciler::new(&client)
        .submit_and_wait(
            Method::Delete,
            path,
            None,
            OperationKind::Delete,
            Vocabulary::PrivateNetwork,
            ResourceScope::new("p1").with_resource_id("pn-1"),
            &wait(),
        )
        .await
        .unwrap();

    assert_eq!(converged, Converged::Absent);
    assert_eq!(client.count(Method::Get, path), 3);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_becomes_single_error_and_mutation_is_not_repeated() {
    let collection = "/dbaas/logs/ldp-1/output/graylog/stream";
    let op_path = "/dbaas/logs/ldp-1/operation/op-2";
    let client = ScriptedClient::new()
        .on_submit(Method::Post, collection, Reply::Ok(json!({"operationId": "op-2"})))
        .on_get(
            op_path,
            vec![
                Reply::Ok(json!({"state": "PENDING"})),
                Reply::Ok(json!({"state": "REVOKED", "error": "stream limit reached"})),
            ],
        );

    let err = Reconciler::new(&client)
        .submit_and_wait(
            Method::Post,
            collection,
            Some(&json!({"title": "audit"})),
            OperationKind::Create,
            Vocabulary::LogsOperation,
            ResourceScope::new("ldp-1"),
            &wait(),
        )
        .await
        .unwrap_err();

    match &err {
        EngineError::TerminalFailure {
            endpoint,
            status,
            reason,
        } => {
            assert_eq!(endpoint, op_path);
            assert_eq!(status, "REVOKED");
            assert_eq!(reason, "stream limit reached");
        }
        other => panic!("expected terminal failure, got {other:?}"),
    }
    assert_eq!(client.count(Method::Post, collection), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_kind_must_match_reconcile_kind() {
    let client = ScriptedClient::new();
    let handle = OperationHandle::new(
        "op-1",
        ResourceScope::new("p1"),
        OperationKind::Create,
        Vocabulary::ProjectOperation,
    );

    let err = Reconciler::new(&client)
        .reconcile(OperationKind::Delete, &wait(), |_| async move { Ok::<_, TransportError>(Mutation::Pending(handle)) })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidHandle(_)));
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_wait_spec_skips_mutation() {
    let client = ScriptedClient::new();
    let spec = PollSpec::new(Duration::from_secs(1)).with_poll_interval(Duration::from_secs(5));
    let called = std::sync::atomic::AtomicBool::new(false);

    let result = Reconciler::new(&client)
        .reconcile(OperationKind::Create, &spec, |_| {
            called.store(true, std::sync::atomic::Ordering::SeqCst);
            async { Ok::<_, TransportError>(Mutation::Settled(json!({}))) }
        })
        .await;

    assert!(matches!(assert_err!(result), EngineError::InvalidSpec(_)));
    assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_the_wait() {
    let collection = "/cloud/project/p1/kube";
    let path = "/cloud/project/p1/kube/k-1";
    let client = ScriptedClient::new()
        .on_submit(Method::Post, collection, Reply::Ok(json!({"id": "k-1", "status": "INSTALLING"})))
        .on_get(path, vec![Reply::Ok(json!({"id": "k-1", "status": "INSTALLING"}))]);
    let token = CancellationToken::new();
    let reconciler = Reconciler::new(&client).with_context(WaitContext::new().with_cancellation(token.clone()));

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    };
    let body = json!({"name": "prod"});
    let wait_spec = wait();
    let reconcile = reconciler.submit_and_wait(
        Method::Post,
        collection,
        Some(&body),
        OperationKind::Create,
        Vocabulary::KubeCluster,
        ResourceScope::new("p1"),
        &wait_spec,
    );

    let (result, ()) = tokio::join!(reconcile, canceller);

    match result.unwrap_err() {
        EngineError::Cancelled { endpoint, last_status } => {
            assert_eq!(endpoint, path);
            assert_eq!(last_status.as_deref(), Some("INSTALLING"));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_configured_rule_makes_conflict_retryable() {
    let path = "/ipLoadbalancing/lb-1/task/9";
    let client = ScriptedClient::new().on_get(
        path,
        vec![
            Reply::Status(409, "task is locked"),
            Reply::Ok(json!({"id": 9, "status": "done"})),
        ],
    );
    let handle = OperationHandle::new(
        "9",
        ResourceScope::new("lb-1"),
        OperationKind::Create,
        Vocabulary::IpLoadbalancingTask,
    );

    let strict = Reconciler::new(&client);
    assert!(strict.track(&handle, &wait()).await.is_err());

    let client = ScriptedClient::new().on_get(
        path,
        vec![
            Reply::Status(409, "task is locked"),
            Reply::Ok(json!({"id": 9, "status": "done"})),
        ],
    );
    let lenient = Reconciler::new(&client)
        .with_classifier(Classifier::default().with_rule(TransientRule::retryable(409).containing("locked")));
    let converged = lenient.track(&handle, &wait()).await.unwrap();
    assert_eq!(converged.state().unwrap()["status"], "done");
}

#[tokio::test(start_paused = true)]
async fn test_independent_reconciliations_run_concurrently() {
    let client = Arc::new(
        ScriptedClient::new()
            .on_get(
                "/cloud/project/p1/user/u-1",
                vec![
                    Reply::Ok(json!({"status": "creating"})),
                    Reply::Ok(json!({"status": "ok", "username": "user-a"})),
                ],
            )
            .on_get(
                "/cloud/project/p1/user/u-2",
                vec![
                    Reply::Ok(json!({"status": "creating"})),
                    Reply::Ok(json!({"status": "creating"})),
                    Reply::Ok(json!({"status": "ok", "username": "user-b"})),
                ],
            ),
    );

    let tasks = ["u-1", "u-2"].map(|id| {
        let client = Arc::clone(&client);
        async move {
            let handle = OperationHandle::new(
                id,
                ResourceScope::new("p1"),
                OperationKind::Create,
                Vocabulary::CloudUser,
            );
            Reconciler::new(&client).track(&handle, &wait()).await
        }
    });

    let results = futures_util::future::join_all(tasks).await;

    let users: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().into_state().unwrap()["username"].clone())
        .collect();
    assert_eq!(users, vec![json!("user-a"), json!("user-b")]);
}

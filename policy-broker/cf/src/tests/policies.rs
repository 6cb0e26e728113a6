use super::*;
use crate::{ApiError, CfPolicyStore};
use policy_broker_core::{store::PolicyStore, Action, PolicyTriple, Protocol};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn lists_single_port_policies() {
    let (mut server, client, _token) = mk_server().await;
    let _policies = mock_json(
        &mut server,
        "GET",
        "/networking/v1/external/policies",
        r#"{
            "total_policies": 4,
            "policies": [
                { "source": { "id": "a1" },
                  "destination": { "id": "a2", "protocol": "tcp", "ports": { "start": 9090, "end": 9090 } } },
                { "source": { "id": "a1" },
                  "destination": { "id": "a3", "protocol": "udp", "ports": { "start": 53, "end": 53 } } },
                { "source": { "id": "a1" },
                  "destination": { "id": "a4", "protocol": "tcp", "ports": { "start": 8000, "end": 8100 } } },
                { "source": { "id": "a1" },
                  "destination": { "id": "a5", "protocol": "icmp", "ports": { "start": 0, "end": 0 } } }
            ]
        }"#,
    )
    .await;

    let policies = CfPolicyStore::new(client).list_all_policies().await.unwrap();
    assert_eq!(
        policies,
        vec![
            PolicyTriple::new("a1", "a2", Protocol::Tcp, 9090),
            PolicyTriple::new("a1", "a3", Protocol::Udp, 53),
        ]
    );
}

#[tokio::test]
async fn writes_create_and_delete_batches() {
    let (mut server, client, _token) = mk_server().await;
    let body = Matcher::Json(json!({
        "policies": [
            { "source": { "id": "a1" },
              "destination": { "id": "a2", "protocol": "tcp", "ports": { "start": 9090, "end": 9090 } } },
            { "source": { "id": "a3" },
              "destination": { "id": "a2", "protocol": "udp", "ports": { "start": 5000, "end": 5000 } } }
        ]
    }));
    let create = server
        .mock("POST", "/networking/v1/external/policies")
        .match_header("authorization", TOKEN)
        .match_body(body.clone())
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let delete = server
        .mock("POST", "/networking/v1/external/policies/delete")
        .match_header("authorization", TOKEN)
        .match_body(body)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let store = CfPolicyStore::new(client);
    let batch = [
        PolicyTriple::new("a1", "a2", Protocol::Tcp, 9090),
        PolicyTriple::new("a3", "a2", Protocol::Udp, 5000),
    ];
    store.apply_policies(Action::Create, &batch).await.unwrap();
    store.apply_policies(Action::Delete, &batch).await.unwrap();
    create.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn rejected_writes_fail() {
    let (mut server, client, _token) = mk_server().await;
    let _create = server
        .mock("POST", "/networking/v1/external/policies")
        .with_status(400)
        .with_body(r#"{"error":"too many policies"}"#)
        .create_async()
        .await;

    let error = CfPolicyStore::new(client)
        .apply_policies(
            Action::Create,
            &[PolicyTriple::new("a1", "a2", Protocol::Tcp, 9090)],
        )
        .await
        .expect_err("write must fail");
    let error = error.downcast_ref::<ApiError>().expect("API error");
    assert_eq!(error.status, reqwest::StatusCode::BAD_REQUEST);
}

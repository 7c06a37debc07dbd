mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn confirm_pickup_registers_order_and_marks_erp_shipped() {
    let app = TestApp::new().await;

    let data = app.confirm_pickup("10234").await;

    assert_eq!(data["order"]["order_number"], "10234");
    assert_eq!(data["order"]["erp_order_id"], "erp-10234");
    assert_eq!(data["order"]["internal_status"], "RETIRADO");
    assert_eq!(data["pickup"]["status"], "RETIRADO");
    assert_eq!(data["pickup"]["pickup_number"], 1);
    assert_eq!(data["pickup"]["retriever_cpf"], "123456");
    assert_eq!(data["pickup"]["operator_name"], "Otavio Expedicao");
    assert_eq!(data["pickup"]["items"][0]["sku"], "CAN-01");
    assert_eq!(data["erp_sync"]["synced"], true);
    assert_eq!(app.erp.shipped(), vec!["erp-10234".to_string()]);
}

#[tokio::test]
async fn pickups_require_a_bearer_token() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/retiradas", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_order_is_rejected_without_local_rows() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/pickups",
            Some(json!({
                "order_number": "99999",
                "retriever_name": "João",
                "retriever_cpf": "123"
            })),
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{}", body);

    let (_, list) = app
        .call(Method::GET, "/api/v1/retiradas", None, &app.operator)
        .await;
    assert_eq!(list["data"]["total"], 0);
}

#[tokio::test]
async fn erp_failure_keeps_the_pickup_and_retry_syncs_it() {
    let app = TestApp::new().await;
    app.erp.with_order("555");
    app.erp.fail_shipped(true);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/pickups",
            Some(json!({
                "order_number": "555",
                "retriever_name": "Carlos",
                "retriever_cpf": "98765432100"
            })),
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["erp_sync"]["synced"], false);
    assert!(body["message"].as_str().unwrap().contains("sincronizar-erp"));
    assert!(body["data"]["pickup"]["erp_error"].is_string());
    let pickup_id = body["data"]["pickup"]["id"].as_str().unwrap().to_string();

    app.erp.fail_shipped(false);
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/retiradas/{}/sincronizar-erp", pickup_id),
            None,
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["erp_sync"]["synced"], true);
    assert!(body["data"]["pickup"]["erp_error"].is_null());
    assert!(body["data"]["pickup"]["erp_synced_at"].is_string());
    assert_eq!(app.erp.shipped(), vec!["erp-555".to_string()]);
}

#[tokio::test]
async fn second_confirmation_of_a_picked_up_order_fails() {
    let app = TestApp::new().await;
    app.confirm_pickup("777").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/pickups",
            Some(json!({
                "order_number": "777",
                "retriever_name": "Outra Pessoa",
                "retriever_cpf": "111"
            })),
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("already picked up"));
}

#[tokio::test]
async fn tracking_saved_before_pickup_is_promoted_on_confirmation() {
    let app = TestApp::new().await;
    app.erp.with_order("4321");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/retiradas/rastreio",
            Some(json!({ "order_number": "4321", "tracking_code": "BR001", "carrier": "Correios" })),
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], true);
    assert_eq!(body["data"]["pickup"]["status"], "AGUARDANDO_RETIRADA");
    let awaiting_id = body["data"]["pickup"]["id"].clone();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/pickups",
            Some(json!({
                "order_number": "4321",
                "retriever_name": "Bruna",
                "retriever_cpf": "123.45"
            })),
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["pickup"]["id"], awaiting_id);
    assert_eq!(body["data"]["pickup"]["status"], "RETIRADO");
    assert_eq!(body["data"]["pickup"]["tracking_code"], "BR001");
    assert_eq!(body["data"]["pickup"]["pickup_number"], 1);
}

#[tokio::test]
async fn tracking_update_keeps_only_the_previous_code() {
    let app = TestApp::new().await;
    let data = app.confirm_pickup("2020").await;
    let uri = format!("/api/v1/retiradas/{}", data["pickup"]["id"].as_str().unwrap());

    for code in ["AA1", "BB2", "CC3"] {
        let (status, _) = app
            .call(
                Method::PATCH,
                &uri,
                Some(json!({ "tracking_code": code })),
                &app.operator,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app.call(Method::GET, &uri, None, &app.operator).await;
    let pickup = &body["data"]["pickup"];
    assert_eq!(pickup["tracking_code"], "CC3");
    assert_eq!(pickup["previous_tracking_code"], "BB2");
    assert!(pickup["tracking_updated_at"].is_string());

    // Same code again is a no-op
    let (_, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some(json!({ "tracking_code": "CC3" })),
            &app.operator,
        )
        .await;
    assert_eq!(body["data"]["previous_tracking_code"], "BB2");
}

#[tokio::test]
async fn list_filters_by_status_and_order_number() {
    let app = TestApp::new().await;
    app.confirm_pickup("3001").await;
    app.confirm_pickup("3002").await;
    app.erp.with_order("4001");
    app.call(
        Method::POST,
        "/api/v1/retiradas/rastreio",
        Some(json!({ "order_number": "4001", "tracking_code": "XX9" })),
        &app.operator,
    )
    .await;

    let (_, all) = app
        .call(Method::GET, "/api/v1/retiradas", None, &app.operator)
        .await;
    assert_eq!(all["data"]["total"], 3);
    assert_eq!(all["data"]["items"][0]["open_occurrences"], 0);
    assert_eq!(all["data"]["items"][0]["has_open_line"], false);

    let (_, awaiting) = app
        .call(
            Method::GET,
            "/api/v1/retiradas?status=AGUARDANDO_RETIRADA",
            None,
            &app.operator,
        )
        .await;
    assert_eq!(awaiting["data"]["total"], 1);
    assert_eq!(awaiting["data"]["items"][0]["order_number"], "4001");

    let (_, by_number) = app
        .call(
            Method::GET,
            "/api/v1/retiradas?order_number=300&limit=1",
            None,
            &app.operator,
        )
        .await;
    assert_eq!(by_number["data"]["total"], 2);
    assert_eq!(by_number["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(by_number["data"]["total_pages"], 2);
}

#[tokio::test]
async fn only_admins_delete_pickups() {
    let app = TestApp::new().await;
    let data = app.confirm_pickup("6060").await;
    let uri = format!("/api/v1/retiradas/{}", data["pickup"]["id"].as_str().unwrap());

    let (status, _) = app
        .call(Method::DELETE, &uri, None, &app.operator)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call(Method::DELETE, &uri, None, &app.admin).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, &uri, None, &app.admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_reports_occurrence_counters_and_pending_filter() {
    let app = TestApp::new().await;
    let busy = app.confirm_pickup("7001").await;
    app.confirm_pickup("7002").await;

    let lines_uri = format!(
        "/api/v1/retiradas/{}/linhas-tempo",
        busy["pickup"]["id"].as_str().unwrap()
    );
    let (_, line) = app
        .call(Method::POST, &lines_uri, None, &app.operator)
        .await;
    let occurrences_uri = format!(
        "{}/{}/ocorrencias",
        lines_uri,
        line["data"]["id"].as_str().unwrap()
    );
    app.call(
        Method::POST,
        &occurrences_uri,
        Some(json!({ "description": "Caixa amassada", "destination_department": "SAC" })),
        &app.operator,
    )
    .await;
    let (status, reply) = app
        .call(
            Method::POST,
            &occurrences_uri,
            Some(json!({ "description": "Pode seguir", "destination_department": "EXPEDICAO" })),
            &app.manager,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listed) = app
        .call(Method::GET, "/api/v1/retiradas?order_number=7001", None, &app.operator)
        .await;
    let item = &listed["data"]["items"][0];
    assert_eq!(item["open_occurrences"], 1);
    assert_eq!(item["last_occurrence_status"], "PENDENTE");
    assert_eq!(item["has_open_line"], true);

    let (_, pending) = app
        .call(Method::GET, "/api/v1/retiradas?pending_only=true", None, &app.operator)
        .await;
    assert_eq!(pending["data"]["total"], 1);
    assert_eq!(pending["data"]["items"][0]["order_number"], "7001");

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!(
                "/api/v1/ocorrencias/{}/resolver",
                reply["data"]["occurrence"]["id"].as_str().unwrap()
            ),
            None,
            &app.operator,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, pending) = app
        .call(Method::GET, "/api/v1/retiradas?pending_only=true", None, &app.operator)
        .await;
    assert_eq!(pending["data"]["total"], 0);

    let (_, listed) = app
        .call(Method::GET, "/api/v1/retiradas?order_number=7001", None, &app.operator)
        .await;
    let item = &listed["data"]["items"][0];
    assert_eq!(item["open_occurrences"], 0);
    assert_eq!(item["last_occurrence_status"], "RESOLVIDA");
}

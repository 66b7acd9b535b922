use axum::http::StatusCode;
use axum_test::TestServer;
use feature_lens::api::create_router;
use feature_lens::db::Database;
use feature_lens::models::ModelImport;
use feature_lens::protocol::{Dispatcher, Failure};
use serde_json::Value;

fn setup() -> TestServer {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let model: ModelImport = serde_json::from_value(serde_json::json!({
        "root": "Root",
        "features": [
            { "name": "X", "children": [ { "name": "Y" } ] },
            { "name": "W" }
        ]
    }))
    .expect("valid model");
    db.import_model(&model).expect("Failed to import");

    let app = create_router(Dispatcher::new(db));
    TestServer::new(app).expect("Failed to create test server")
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();

        let response = server.get("/api/v1/health").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");
    }
}

mod query {
    use super::*;

    #[tokio::test]
    async fn returns_the_tree_payload() {
        let server = setup();

        let response = server.post("/api/v1/query").text("tree").await;

        response.assert_status_ok();
        let payload: Value = response.json();
        assert_eq!(payload["features"][0]["id"], "X");
        assert_eq!(payload["features"][0]["children"][0]["id"], "X.Y");
        assert_eq!(payload["tanglingLinks"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn applies_mutations() {
        let server = setup();

        let response = server
            .post("/api/v1/query")
            .text("moveFeature,X.Y,W")
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");

        let tree: Value = server.post("/api/v1/query").text("tree").await.json();
        assert_eq!(tree["features"][1]["children"][0]["id"], "W.Y");
    }

    #[tokio::test]
    async fn rejected_mutation_is_unprocessable() {
        let server = setup();

        let response = server
            .post("/api/v1/query")
            .text("moveFeature,X.Y,X")
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let failure: Failure = response.json();
        assert_eq!(failure.code, -2);
    }

    #[tokio::test]
    async fn unknown_command_is_unprocessable() {
        let server = setup();

        let response = server.post("/api/v1/query").text("launch").await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Failure>().code, -6);
    }
}

use std::cell::RefCell;

use feature_lens::db::Database;
use feature_lens::hierarchy::FeatureHierarchy;
use feature_lens::models::*;
use feature_lens::protocol::{Dispatcher, Failure, QueryCallback, ACK};
use serde_json::Value;

fn setup(model: Value) -> Dispatcher<Database> {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let model: ModelImport = serde_json::from_value(model).expect("valid model");
    db.import_model(&model).expect("Failed to import");
    Dispatcher::new(db)
}

/// Root{A{A1},B} with A.A1 and B sharing lines in one file.
fn tangled_model() -> Value {
    serde_json::json!({
        "root": "Root",
        "features": [
            {
                "name": "A",
                "blocks": [ { "path": "src/a.rs", "type": "code", "start": 1, "end": 4 } ],
                "children": [
                    {
                        "name": "A1",
                        "blocks": [ { "path": "src/shared.rs", "type": "code", "start": 1, "end": 10 } ]
                    }
                ]
            },
            {
                "name": "B",
                "blocks": [ { "path": "src/shared.rs", "type": "code", "start": 5, "end": 12 } ]
            }
        ]
    })
}

fn nested_model() -> Value {
    serde_json::json!({
        "root": "Root",
        "features": [
            { "name": "X", "children": [ { "name": "Y", "children": [ { "name": "Z" } ] } ] },
            { "name": "W", "children": [ { "name": "Y" } ] }
        ]
    })
}

fn lpqs(dispatcher: &Dispatcher<Database>) -> Vec<String> {
    let roots = dispatcher.host().snapshot().expect("Failed to snapshot");
    preorder(&roots).iter().map(|f| f.lpq.clone()).collect()
}

async fn json(dispatcher: &Dispatcher<Database>, request: &str) -> Value {
    let payload = dispatcher.dispatch(request).await.expect("request should succeed");
    serde_json::from_str(&payload).expect("payload is JSON")
}

async fn failure(dispatcher: &Dispatcher<Database>, request: &str) -> Failure {
    dispatcher
        .dispatch(request)
        .await
        .expect_err("request should fail")
}

mod graph {
    use super::*;

    #[tokio::test]
    async fn tree_nests_children_under_top_level_features() {
        let dispatcher = setup(tangled_model());
        let payload = json(&dispatcher, "tree").await;

        let features = payload["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["id"], "A");
        assert_eq!(features[0]["children"][0]["id"], "A.A1");
        assert_eq!(features[0]["children"][0]["name"], "A1");
        assert_eq!(features[1]["id"], "B");
    }

    #[tokio::test]
    async fn tangled_pair_yields_exactly_one_link() {
        let dispatcher = setup(tangled_model());
        let payload = json(&dispatcher, "tree").await;

        assert_eq!(
            payload["tanglingLinks"],
            serde_json::json!([ { "source": "A.A1", "target": "B" } ])
        );
    }

    #[tokio::test]
    async fn total_lines_include_descendants() {
        let dispatcher = setup(tangled_model());
        let payload = json(&dispatcher, "tree").await;

        let a = &payload["features"][0];
        assert_eq!(a["lines"], 4);
        assert_eq!(a["totalLines"], 14);
        assert_eq!(a["children"][0]["totalLines"], 10);
        assert_eq!(a["children"][0]["tanglingDegree"], 1);
        assert_eq!(a["tanglingDegree"], 0);
    }

    #[tokio::test]
    async fn tangling_view_lists_every_feature_at_the_top() {
        let dispatcher = setup(tangled_model());
        let payload = json(&dispatcher, "tanglingGraph").await;

        let ids: Vec<&str> = payload["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["A", "A.A1", "B"]);
        assert_eq!(payload["features"][0]["children"][0]["id"], "A.A1");
        assert_eq!(payload["features"][1]["children"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn locations_carry_file_names_and_block_types() {
        let dispatcher = setup(tangled_model());
        let payload = json(&dispatcher, "treeMap").await;

        let location = &payload["features"][1]["locations"][0];
        assert_eq!(location["path"], "src/shared.rs");
        assert_eq!(location["fileName"], "shared.rs");
        assert_eq!(location["lines"], 8);
        assert_eq!(location["blocks"][0]["type"], "code");
    }

    #[tokio::test]
    async fn empty_model_serializes_to_empty_lists() {
        let dispatcher = setup(serde_json::json!({ "root": "Root" }));
        let payload = json(&dispatcher, "tree").await;

        assert_eq!(payload["features"], serde_json::json!([]));
        assert_eq!(payload["tanglingLinks"], serde_json::json!([]));
    }
}

mod mutations {
    use super::*;

    #[tokio::test]
    async fn move_to_current_parent_is_already_child() {
        let dispatcher = setup(nested_model());
        let before = lpqs(&dispatcher);

        let f = failure(&dispatcher, "moveFeature,X.Y,X").await;

        assert_eq!(f.code, -2);
        assert_eq!(lpqs(&dispatcher), before);
    }

    #[tokio::test]
    async fn move_below_own_descendant_is_cyclic() {
        let dispatcher = setup(nested_model());

        assert_eq!(failure(&dispatcher, "moveFeature,X,X.Y.Z").await.code, -1);
        assert_eq!(failure(&dispatcher, "moveFeature,X,X").await.code, -1);
    }

    #[tokio::test]
    async fn cycle_wins_over_duplicate_sibling_name() {
        let dispatcher = setup(serde_json::json!({
            "root": "Root",
            "features": [ { "name": "X", "children": [ { "name": "Y", "children": [ { "name": "X" } ] } ] } ]
        }));

        let f = failure(&dispatcher, "moveFeature,X,X.Y").await;

        assert_eq!(f.code, -1);
        assert_eq!(lpqs(&dispatcher), vec!["X", "X.Y", "X.Y.X"]);
    }

    #[tokio::test]
    async fn move_onto_a_sibling_name_is_duplicate() {
        let dispatcher = setup(nested_model());
        assert_eq!(failure(&dispatcher, "moveFeature,W.Y,X").await.code, -3);
    }

    #[tokio::test]
    async fn move_applies_and_rewrites_lpqs() {
        let dispatcher = setup(nested_model());

        let ack = dispatcher.dispatch("moveFeature,X.Y.Z,W").await;

        assert_eq!(ack, Ok(ACK.to_string()));
        assert_eq!(lpqs(&dispatcher), vec!["X", "X.Y", "W", "W.Y", "W.Z"]);
    }

    #[tokio::test]
    async fn move_to_the_root_by_name() {
        let dispatcher = setup(nested_model());

        dispatcher.dispatch("moveFeature,X.Y.Z,Root").await.expect("move applies");

        assert!(lpqs(&dispatcher).contains(&"Z".to_string()));
    }

    #[tokio::test]
    async fn rename_rejects_trailing_whitespace() {
        let dispatcher = setup(serde_json::json!({
            "root": "Root",
            "features": [ { "name": "A", "children": [ { "name": "B" } ] } ]
        }));

        let f = failure(&dispatcher, "renameFeature,A.B,B ").await;

        assert_eq!(f.code, -1);
        assert_eq!(lpqs(&dispatcher), vec!["A", "A.B"]);
    }

    #[tokio::test]
    async fn rename_and_add_report_duplicates_as_minus_two() {
        let dispatcher = setup(nested_model());

        assert_eq!(failure(&dispatcher, "renameFeature,X,W").await.code, -2);
        assert_eq!(failure(&dispatcher, "addFeature,X,Y").await.code, -2);
    }

    #[tokio::test]
    async fn add_feature_applies() {
        let dispatcher = setup(nested_model());

        let ack = dispatcher.dispatch("addFeature,W,Q").await;

        assert_eq!(ack, Ok(ACK.to_string()));
        assert!(lpqs(&dispatcher).contains(&"W.Q".to_string()));
    }

    #[tokio::test]
    async fn add_feature_with_invalid_name() {
        let dispatcher = setup(nested_model());
        assert_eq!(failure(&dispatcher, "addFeature,W,a.b").await.code, -1);
    }

    #[tokio::test]
    async fn delete_feature_removes_the_subtree() {
        let dispatcher = setup(nested_model());

        dispatcher.dispatch("deleteFeature,X").await.expect("delete applies");

        assert_eq!(lpqs(&dispatcher), vec!["W", "W.Y"]);
    }

    #[tokio::test]
    async fn drop_feature_is_applied_by_the_edit_queue() {
        let dispatcher = setup(tangled_model());

        dispatcher.dispatch("dropFeature,A").await.expect("drop is accepted");
        dispatcher.host().flush_edits().expect("queue drains");

        assert_eq!(lpqs(&dispatcher), vec!["B"]);
        let payload = json(&dispatcher, "tree").await;
        assert_eq!(payload["features"][0]["lines"], 8);
        assert_eq!(payload["tanglingLinks"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_targets_are_not_found() {
        let dispatcher = setup(nested_model());

        for request in [
            "addFeature,Nope,A",
            "deleteFeature,Nope",
            "dropFeature,Nope",
            "moveFeature,Nope,X",
            "moveFeature,X,Nope",
            "renameFeature,Nope,A",
        ] {
            assert_eq!(failure(&dispatcher, request).await.code, -4, "{}", request);
        }
    }
}

mod requests {
    use super::*;

    #[tokio::test]
    async fn malformed_requests_are_minus_five() {
        let dispatcher = setup(nested_model());

        assert_eq!(failure(&dispatcher, "moveFeature,X").await.code, -5);
        assert_eq!(failure(&dispatcher, "openPath,src/a.rs,x").await.code, -5);
        assert_eq!(failure(&dispatcher, "").await.code, -5);
    }

    #[tokio::test]
    async fn unknown_commands_are_minus_six() {
        let dispatcher = setup(nested_model());
        assert_eq!(failure(&dispatcher, "explode").await.code, -6);
    }

    #[tokio::test]
    async fn navigation_and_refresh_acknowledge() {
        let dispatcher = setup(nested_model());

        for request in ["refresh", "highlightFeature,X.Y", "openPath,src/a.rs,3,1"] {
            assert_eq!(dispatcher.dispatch(request).await, Ok(ACK.to_string()));
        }
    }

    #[tokio::test]
    async fn feature_history_uses_the_requested_schema() {
        let dispatcher = setup(serde_json::json!({
            "root": "Root",
            "features": [ { "name": "A" } ],
            "commits": [
                {
                    "hash": "c1",
                    "committed_at": "2024-05-01T10:00:00Z",
                    "message": "start",
                    "author": "dev",
                    "events": [ { "feature_name": "A", "kind": "codeAnnotation" } ]
                }
            ]
        }));

        let current = json(&dispatcher, "featureHistory").await;
        assert_eq!(current["type"], "featureHistory");
        assert_eq!(current["features"], serde_json::json!(["A"]));
        assert_eq!(current["commits"], serde_json::json!(["2024-05-01 10:00:00"]));
        assert_eq!(current["codeAnnotations"][0]["message"], "start");

        let legacy = json(&dispatcher, "featureHistory,legacy").await;
        assert_eq!(legacy["seriesData"][0]["commitHash"], "c1");
        assert!(legacy.get("codeAnnotations").is_none());
    }

    struct Recorder {
        calls: RefCell<Vec<Result<String, (i32, String)>>>,
    }

    impl QueryCallback for Recorder {
        fn success(&self, response: String) {
            self.calls.borrow_mut().push(Ok(response));
        }

        fn failure(&self, code: i32, message: String) {
            self.calls.borrow_mut().push(Err((code, message)));
        }
    }

    #[tokio::test]
    async fn on_query_answers_exactly_once() {
        let dispatcher = setup(nested_model());
        let recorder = Recorder {
            calls: RefCell::new(Vec::new()),
        };

        assert!(dispatcher.on_query("refresh", &recorder).await);
        assert!(!dispatcher.on_query("moveFeature,X.Y,X", &recorder).await);

        let calls = recorder.calls.into_inner();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Ok(ACK.to_string()));
        assert!(matches!(&calls[1], Err((-2, _))));
    }
}

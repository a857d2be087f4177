//! API integration tests.
//!
//! Tests the complete request flow: HTTP → routes → resolver → engine,
//! against a temporary artifact directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use tower::ServiceExt;

use stemma_api::config::Config;
use stemma_api::server::{AppState, Server};

/// `A → B → C` plus a test node and a reference-tagged seed, with a
/// catalog and a backup pair whose row count differs by 30%.
fn write_artifacts(root: &Path) {
    let manifest = serde_json::json!({
        "metadata": {
            "dbt_schema_version": "https://schemas.getdbt.com/dbt/manifest/v11.json",
            "dbt_version": "1.7.0",
            "generated_at": "2026-03-01T00:00:00Z"
        },
        "nodes": {
            "model.app.a": {
                "unique_id": "model.app.a",
                "name": "a",
                "resource_type": "model",
                "columns": {"id": {"data_type": "bigint"}},
                "depends_on": {"nodes": ["model.app.b"]}
            },
            "model.app.b": {
                "unique_id": "model.app.b",
                "name": "b",
                "resource_type": "model",
                "depends_on": {"nodes": ["model.app.c"]}
            },
            "model.app.c": {
                "unique_id": "model.app.c",
                "name": "c",
                "resource_type": "model"
            },
            "test.app.not_null_a_id": {
                "unique_id": "test.app.not_null_a_id",
                "name": "not_null_a_id",
                "resource_type": "test",
                "depends_on": {"nodes": ["model.app.a"]},
                "config": {"severity": "error"},
                "test_metadata": {"name": "not_null", "kwargs": {"column_name": "id"}}
            }
        },
        "sources": {},
        "macros": {}
    });
    let catalog = serde_json::json!({
        "metadata": {"dbt_version": "1.7.0", "generated_at": "2026-03-01T00:05:00Z"},
        "nodes": {
            "model.app.a": {
                "metadata": {"schema": "app", "name": "a", "type": "BASE TABLE"},
                "columns": {"id": {"type": "bigint", "index": 1}},
                "stats": {"num_rows": {"value": 1300}}
            }
        },
        "sources": {}
    });
    let manifest_backup = serde_json::json!({
        "metadata": {"dbt_version": "1.7.0", "generated_at": "2026-02-01T00:00:00Z"},
        "nodes": {
            "model.app.a": {
                "unique_id": "model.app.a",
                "name": "a",
                "resource_type": "model",
                "columns": {"id": {"data_type": "bigint"}},
                "depends_on": {"nodes": ["model.app.b"]}
            }
        }
    });
    let catalog_backup = serde_json::json!({
        "metadata": {"dbt_version": "1.7.0"},
        "nodes": {
            "model.app.a": {
                "metadata": {"schema": "app", "name": "a", "type": "BASE TABLE"},
                "columns": {"id": {"type": "bigint", "index": 1}},
                "stats": {"num_rows": 1000}
            }
        }
    });

    std::fs::write(root.join("manifest.json"), manifest.to_string()).unwrap();
    std::fs::write(root.join("catalog.json"), catalog.to_string()).unwrap();
    std::fs::write(root.join("manifest_backup.json"), manifest_backup.to_string()).unwrap();
    std::fs::write(root.join("catalog_backup.json"), catalog_backup.to_string()).unwrap();
}

fn test_state(root: &Path) -> Arc<AppState> {
    let config = Config {
        artifact_root: root.to_path_buf(),
        debug: true,
        ..Config::default()
    };
    Arc::new(AppState::new(config))
}

fn test_router(state: &Arc<AppState>) -> axum::Router {
    Server::router_with_state(Arc::clone(state))
}

mod helpers {
    use super::*;

    pub async fn send(
        router: axum::Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Result<axum::response::Response> {
        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).context("serialize request body")?),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .context("build request")?;
        let response = router.oneshot(request).await?;
        Ok(response)
    }

    pub async fn body_json(
        response: axum::response::Response,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .context("read response body")?;
        let json = serde_json::from_slice(&body).with_context(|| {
            format!(
                "parse JSON response (status={status}): {}",
                String::from_utf8_lossy(&body)
            )
        })?;
        Ok((status, json))
    }

    pub async fn get_json(
        router: axum::Router,
        uri: &str,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let response = send(router, Method::GET, uri, None).await?;
        body_json(response).await
    }
}

#[tokio::test]
async fn health_is_always_ok() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path());
    let (status, body) = helpers::get_json(test_router(&state), "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn ready_reflects_manifest_presence() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path());

    let (status, body) = helpers::get_json(test_router(&state), "/ready").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    write_artifacts(tmp.path());
    let (status, body) = helpers::get_json(test_router(&state), "/ready").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    Ok(())
}

#[tokio::test]
async fn dag_returns_lineage_with_depths_and_observability() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let response = helpers::send(
        test_router(&state),
        Method::GET,
        "/dag/model.app.a?maxDepth=10",
        None,
    )
    .await?;
    assert_eq!(
        response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok()),
        Some("MISS")
    );
    assert_eq!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=1800")
    );
    assert!(response.headers().get(header::ETAG).is_some());

    let (status, body) = helpers::body_json(response).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodeId"], "model.app.a");
    assert_eq!(body["cached"], false);
    assert_eq!(body["data"]["root"]["unique_id"], "model.app.a");
    assert_eq!(body["data"]["parent_depth"]["model.app.b"], 1);
    assert_eq!(body["data"]["parent_depth"]["model.app.c"], 2);
    assert_eq!(body["data"]["depth"]["upstream"], 2);
    assert_eq!(body["data"]["depth"]["downstream"], 0);
    assert_eq!(body["metadata"]["manifestVersion"], "1.7.0");
    assert_eq!(body["metadata"]["comparison"]["previousSource"], "backup");

    // 1000 → 1300 rows is a 30% deviation: the volume check fails and
    // the style key reflects exactly that.
    let observability = &body["data"]["root"]["observability"];
    assert_eq!(observability["volume"]["status"], "fail");
    assert_eq!(observability["schema"]["status"], "pass");
    assert_eq!(observability["style_key"], "volume");
    Ok(())
}

#[tokio::test]
async fn dag_serves_cached_payload_on_repeat() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (_, first) =
        helpers::get_json(test_router(&state), "/dag/model.app.a?maxDepth=5").await?;
    assert_eq!(first["cached"], false);

    let response = helpers::send(
        test_router(&state),
        Method::GET,
        "/dag/model.app.a?maxDepth=5",
        None,
    )
    .await?;
    assert_eq!(
        response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok()),
        Some("HIT")
    );
    let (status, second) = helpers::body_json(response).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["computeTimeMs"], 0);
    // The data payload itself is byte-for-byte stable across requests.
    assert_eq!(first["data"], second["data"]);

    // fresh=true bypasses the cache.
    let (_, third) = helpers::get_json(
        test_router(&state),
        "/dag/model.app.a?maxDepth=5&fresh=true",
    )
    .await?;
    assert_eq!(third["cached"], false);
    Ok(())
}

#[tokio::test]
async fn dag_unknown_node_is_404() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (status, body) = helpers::get_json(test_router(&state), "/dag/model.app.ghost").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn dag_missing_manifest_is_503() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path());

    let (status, body) = helpers::get_json(test_router(&state), "/dag/model.app.a").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ARTIFACT_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn dag_partial_explicit_pair_is_400() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (status, _) = helpers::get_json(
        test_router(&state),
        "/dag/model.app.a?previousManifestPath=manifest_backup.json",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn dag_traversal_path_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (status, _) = helpers::get_json(
        test_router(&state),
        "/dag/model.app.a?previousManifestPath=../evil.json&previousCatalogPath=../evil2.json",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn dag_max_depth_zero_keeps_only_the_root() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (_, body) =
        helpers::get_json(test_router(&state), "/dag/model.app.a?maxDepth=0").await?;
    assert!(body["data"]["parents"].as_array().unwrap().is_empty());
    assert!(body["data"]["children"].as_array().unwrap().is_empty());
    assert_eq!(body["data"]["depth"]["upstream"], 0);
    Ok(())
}

#[tokio::test]
async fn dag_invalidate_action_drops_cached_payloads() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let _ = helpers::get_json(test_router(&state), "/dag/model.app.a?maxDepth=5").await?;

    let response = helpers::send(
        test_router(&state),
        Method::POST,
        "/dag/model.app.a?action=invalidate",
        None,
    )
    .await?;
    let (status, body) = helpers::body_json(response).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["nodeId"], "model.app.a");
    assert_eq!(body["invalidatedCount"], 1);

    // Unknown actions are rejected.
    let response = helpers::send(
        test_router(&state),
        Method::POST,
        "/dag/model.app.a?action=nuke",
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn errors_reports_tests_and_synthetic_checks() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let response =
        helpers::send(test_router(&state), Method::GET, "/errors/model.app.a", None).await?;
    assert_eq!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=300")
    );
    let (status, body) = helpers::body_json(response).await?;
    assert_eq!(status, StatusCode::OK);

    let data = &body["data"];
    assert_eq!(data["node_id"], "model.app.a");
    // One attached test plus three synthetic broad checks.
    assert_eq!(data["total_tests"], 4);
    assert_eq!(data["failing_tests"], 1);
    assert_eq!(data["broad_checks"]["style_key"], "volume");
    assert_eq!(data["comparison"]["previous_source"], "backup");
    Ok(())
}

#[tokio::test]
async fn errors_filters_apply_after_counting() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (_, body) = helpers::get_json(
        test_router(&state),
        "/errors/model.app.a?statusFilter=fail",
    )
    .await?;
    let data = &body["data"];
    assert_eq!(data["failing_tests"], 1);
    let tests = data["tests"].as_array().unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0]["name"], "volume_change");
    Ok(())
}

#[tokio::test]
async fn errors_rejects_unknown_filters() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (status, _) = helpers::get_json(
        test_router(&state),
        "/errors/model.app.a?testType=bogus",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = helpers::get_json(
        test_router(&state),
        "/errors/model.app.a?statusFilter=meh",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn cache_stats_and_clear_round_trip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    // Populate the warm layer via a lineage request.
    let _ = helpers::get_json(test_router(&state), "/dag/model.app.a?maxDepth=5").await?;

    let (status, stats) = helpers::get_json(test_router(&state), "/cache/stats").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["cache"]["totalEntries"], 1);
    assert_eq!(stats["cache"]["byLayer"]["warm"], 1);
    assert_eq!(stats["ttl"]["warmSeconds"], 2700);
    assert!(stats["timestamp"].is_string());

    let response = helpers::send(
        test_router(&state),
        Method::POST,
        "/cache/clear",
        Some(serde_json::json!({"action": "clear-all"})),
    )
    .await?;
    let (status, body) = helpers::body_json(response).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["totalItemsCleared"], 1);
    assert!(body["clearedAt"].is_string());

    let (_, stats) = helpers::get_json(test_router(&state), "/cache/stats").await?;
    assert_eq!(stats["cache"]["totalEntries"], 0);
    Ok(())
}

#[tokio::test]
async fn cache_clear_validates_action_and_layer() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let response = helpers::send(
        test_router(&state),
        Method::POST,
        "/cache/clear",
        Some(serde_json::json!({"action": "clear-everything"})),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = helpers::send(
        test_router(&state),
        Method::POST,
        "/cache/clear",
        Some(serde_json::json!({"action": "clear-layer", "layer": "lukewarm"})),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = helpers::send(
        test_router(&state),
        Method::POST,
        "/cache/clear",
        Some(serde_json::json!({"action": "clear-layer", "layer": "warm"})),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn cache_stats_rejects_unknown_layer() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());
    let state = test_state(tmp.path());

    let (status, _) =
        helpers::get_json(test_router(&state), "/cache/stats?layer=tepid").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn snapshot_comparison_is_honored() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_artifacts(tmp.path());

    // One labelled snapshot with a different generated_at and half the
    // current row count.
    let snapshot_dir = tmp
        .path()
        .join("samples/adventureworks-batches/batch-2026-01");
    std::fs::create_dir_all(&snapshot_dir)?;
    std::fs::write(
        snapshot_dir.join("manifest.json"),
        serde_json::json!({
            "metadata": {"dbt_version": "1.7.0", "generated_at": "2026-01-15T00:00:00Z"},
            "nodes": {
                "model.app.a": {
                    "unique_id": "model.app.a",
                    "name": "a",
                    "resource_type": "model"
                }
            }
        })
        .to_string(),
    )?;
    std::fs::write(
        snapshot_dir.join("catalog.json"),
        serde_json::json!({
            "nodes": {
                "model.app.a": {
                    "metadata": {"type": "BASE TABLE"},
                    "stats": {"num_rows": 650}
                }
            }
        })
        .to_string(),
    )?;
    std::fs::write(
        tmp.path().join("samples/adventureworks-batches/index.json"),
        r#"["batch-2026-01"]"#,
    )?;

    let state = test_state(tmp.path());
    let (status, body) = helpers::get_json(
        test_router(&state),
        "/dag/model.app.a?previousSnapshot=batch-2026-01",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["metadata"]["comparison"]["previousSource"],
        "snapshot:batch-2026-01"
    );
    // 650 → 1300 rows doubles the volume: deviation 100%.
    let volume = &body["data"]["root"]["observability"]["volume"];
    assert_eq!(volume["status"], "fail");
    assert_eq!(volume["previous_row_count"], 650.0);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(tmp.path());
    let (status, doc) =
        helpers::get_json(test_router(&state), "/api-docs/openapi.json").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/dag/{id}"].is_object());
    assert!(doc["paths"]["/errors/{id}"].is_object());
    Ok(())
}

//! End-to-end cluster checks against mocked replicas.
//!
//! Each test stands up a small cluster of mockito servers and runs the full
//! check pipeline: status, history collection, entity bodies, pointers,
//! audit metadata and content availability.

use std::collections::BTreeSet;

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

use replicheck::{CheckConfig, CheckError, ClusterChecker};

/// Cluster fixture: two scene entities where QmE1 (newer) overwrote QmE0 on
/// the shared pointer "10,20".
#[derive(Clone)]
struct ReplicaOptions {
    history: Vec<(&'static str, i64)>,
    /// Timestamp served in QmE1's entity body; change it to fake a body
    /// mismatch on one replica.
    e1_timestamp: i64,
    /// When set, this replica reports QmE1 overwritten by the given entity,
    /// whose own audit carries the given deployment timestamp.
    e1_overwritten_by: Option<(&'static str, i64)>,
    unavailable_hashes: Vec<&'static str>,
    /// When false, this replica resolves pointer "10,20" to nothing.
    pointer_resolves: bool,
    /// Hashes whose `/contents/{hash}` bytes differ on this replica.
    corrupt_hashes: Vec<&'static str>,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        Self {
            history: vec![("QmE1", 200), ("QmE0", 100)],
            e1_timestamp: 200,
            e1_overwritten_by: None,
            unavailable_hashes: Vec::new(),
            pointer_resolves: true,
            corrupt_hashes: Vec::new(),
        }
    }
}

fn scene_entity(id: &str, timestamp: i64, content_hash: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "scene",
        "pointers": ["10,20"],
        "timestamp": timestamp,
        "content": [{"file": "model.glb", "hash": content_hash}],
        "metadata": {"title": "plaza"}
    })
}

fn history_body(events: &[(&str, i64)]) -> String {
    let events: Vec<serde_json::Value> = events
        .iter()
        .map(|(id, timestamp)| {
            json!({
                "entityType": "scene",
                "entityId": id,
                "serverName": "origin",
                "timestamp": timestamp
            })
        })
        .collect();
    json!({
        "events": events,
        "pagination": {"offset": 0, "limit": 500, "moreData": false}
    })
    .to_string()
}

fn audit_body(deployed_timestamp: i64, overwritten_by: Option<&str>) -> String {
    let mut body = json!({
        "version": "v3",
        "deployedTimestamp": deployed_timestamp,
        "authChain": [{"type": "SIGNER", "payload": "0xabc"}]
    });
    if let Some(id) = overwritten_by {
        body["overwrittenBy"] = json!(id);
    }
    body.to_string()
}

async fn mock_replica(server: &mut ServerGuard, opts: ReplicaOptions) -> Vec<Mock> {
    let mut mocks = Vec::new();
    mocks.push(
        server
            .mock("GET", "/status")
            .with_body(json!({"healthy": true}).to_string())
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/history")
            .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
            .with_body(history_body(&opts.history))
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/entities/scene")
            .match_query(Matcher::Regex("id=QmE1&id=QmE0".into()))
            .with_body(
                json!([
                    scene_entity("QmE1", opts.e1_timestamp, "QmH1"),
                    scene_entity("QmE0", 100, "QmH0"),
                ])
                .to_string(),
            )
            .create_async()
            .await,
    );
    let resolved = if opts.pointer_resolves {
        json!([scene_entity("QmE1", opts.e1_timestamp, "QmH1")])
    } else {
        json!([])
    };
    mocks.push(
        server
            .mock("GET", "/entities/scene")
            .match_query(Matcher::UrlEncoded("pointer".into(), "10,20".into()))
            .with_body(resolved.to_string())
            .create_async()
            .await,
    );
    // QmE0 is consistently overwritten by QmE1 on every replica.
    mocks.push(
        server
            .mock("GET", "/audit/scene/QmE0")
            .with_body(audit_body(100, Some("QmE1")))
            .create_async()
            .await,
    );
    let e1_overwriter = opts.e1_overwritten_by.map(|(id, _)| id);
    mocks.push(
        server
            .mock("GET", "/audit/scene/QmE1")
            .with_body(audit_body(200, e1_overwriter))
            .create_async()
            .await,
    );
    if let Some((id, deployed_timestamp)) = opts.e1_overwritten_by {
        mocks.push(
            server
                .mock("GET", format!("/audit/scene/{id}").as_str())
                .with_body(audit_body(deployed_timestamp, None))
                .create_async()
                .await,
        );
    }
    let entries: Vec<serde_json::Value> = ["QmE0", "QmE1", "QmH1"]
        .iter()
        .map(|hash| {
            json!({
                "cid": hash,
                "available": !opts.unavailable_hashes.contains(hash)
            })
        })
        .collect();
    mocks.push(
        server
            .mock("GET", "/available-content")
            .match_query(Matcher::Any)
            .with_body(json!(entries).to_string())
            .create_async()
            .await,
    );
    for (hash, bytes) in [
        ("QmE0", "entity-doc-e0"),
        ("QmE1", "entity-doc-e1"),
        ("QmH1", "model-bytes"),
    ] {
        let body = if opts.corrupt_hashes.contains(&hash) {
            format!("{bytes}-corrupted")
        } else {
            bytes.to_string()
        };
        mocks.push(
            server
                .mock("GET", format!("/contents/{hash}").as_str())
                .with_body(body)
                .create_async()
                .await,
        );
    }
    mocks
}

fn test_config(output: &TempDir) -> CheckConfig {
    CheckConfig {
        output_dir: output.path().to_path_buf(),
        retries: 1,
        concurrency: 4,
        min_backoff_ms: 1,
        max_backoff_ms: 1,
        request_timeout_secs: 5,
        ..CheckConfig::default()
    }
}

#[tokio::test]
async fn consistent_cluster_reports_no_failures() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, ReplicaOptions::default()).await,
        mock_replica(&mut c, ReplicaOptions::default()).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    assert_eq!(report.total_failures(), 0);
    // QmE0 lost the pointer race against the newer QmE1.
    assert!(checker.overwritten().contains("QmE0"));
    assert!(!checker.overwritten().contains("QmE1"));

    let failed = std::fs::read_to_string(output.path().join("failed.txt"))
        .expect("failed.txt should exist");
    assert!(failed.is_empty(), "unexpected failures: {failed}");
}

#[tokio::test]
async fn missing_content_is_reported_as_failed_content_only() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    let opts_c = ReplicaOptions {
        unavailable_hashes: vec!["QmH1"],
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, ReplicaOptions::default()).await,
        mock_replica(&mut c, opts_c).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    let expected: BTreeSet<String> = ["QmH1".to_string()].into_iter().collect();
    assert_eq!(report.failed_content, expected);
    assert!(report.failed_entities.is_empty());
    assert!(report.failed_audit.is_empty());
    assert!(report.failed_pointers.is_empty());
    assert!(report.failed_content_files.is_empty());
}

#[tokio::test]
async fn one_sided_overwrite_by_a_newer_entity_is_benign() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    // Replica B already saw QmE1 overwritten by QmE2, deployed later (300).
    let opts_b = ReplicaOptions {
        e1_overwritten_by: Some(("QmE2", 300)),
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, opts_b).await,
        mock_replica(&mut c, ReplicaOptions::default()).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    assert_eq!(report.total_failures(), 0);
    assert!(checker.overwritten().contains("QmE1"));
}

#[tokio::test]
async fn one_sided_overwrite_by_an_older_entity_fails_audit() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    // QmE2 claims to overwrite QmE1 but was deployed earlier (150 < 200).
    let opts_b = ReplicaOptions {
        e1_overwritten_by: Some(("QmE2", 150)),
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, opts_b).await,
        mock_replica(&mut c, ReplicaOptions::default()).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    let failed_ids: Vec<&str> = report.failed_audit.keys().map(String::as_str).collect();
    assert_eq!(failed_ids, vec!["QmE1"]);
    assert!(report.failed_entities.is_empty());
    assert!(report.failed_pointers.is_empty());
    assert!(report.failed_content.is_empty());
}

#[tokio::test]
async fn diverged_replica_is_excluded_not_fatal() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    let opts_c = ReplicaOptions {
        history: vec![("QmE1", 200)],
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, ReplicaOptions::default()).await,
        mock_replica(&mut c, opts_c).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    // A and B still agree; C's divergence is reported, not fatal.
    assert_eq!(report.total_failures(), 0);
    let failed = std::fs::read_to_string(output.path().join("failed.txt"))
        .expect("failed.txt should exist");
    assert!(failed.contains(&c.url()), "divergence not recorded: {failed}");
}

#[tokio::test]
async fn without_fail_fast_divergences_accumulate_across_phases() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    // B's entity bodies diverge; C additionally drops the active pointer
    // and a referenced content hash.
    let opts_b = ReplicaOptions {
        e1_timestamp: 999,
        ..ReplicaOptions::default()
    };
    let opts_c = ReplicaOptions {
        pointer_resolves: false,
        unavailable_hashes: vec!["QmH1"],
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, opts_b).await,
        mock_replica(&mut c, opts_c).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    // The entity mismatch is recorded and the run keeps going: the pointer
    // and content phases still detect C's problems.
    assert_eq!(report.failed_entities.len(), 2);
    let failed_pointers: Vec<&str> = report.failed_pointers.keys().map(String::as_str).collect();
    assert_eq!(failed_pointers, vec!["10,20"]);
    let expected: BTreeSet<String> = ["QmH1".to_string()].into_iter().collect();
    assert_eq!(report.failed_content, expected);
}

#[tokio::test]
async fn corrupted_content_bytes_land_in_failed_content_files() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    let opts_b = ReplicaOptions {
        corrupt_hashes: vec!["QmH1"],
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, opts_b).await,
        mock_replica(&mut c, ReplicaOptions::default()).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let mut config = test_config(&output);
    // Sample everything so the diverging payload is always downloaded.
    config.content_sample_percent = 100;
    let checker = ClusterChecker::new(config)
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    let expected: BTreeSet<String> = ["QmH1".to_string()].into_iter().collect();
    assert_eq!(report.failed_content_files, expected);
    // Every hash was available everywhere; only the bytes disagreed.
    assert!(report.failed_content.is_empty());
    assert_eq!(report.total_failures(), 1);
}

#[tokio::test]
async fn entity_mismatch_with_fail_fast_skips_later_phases() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mut c = mockito::Server::new_async().await;
    let opts_b = ReplicaOptions {
        e1_timestamp: 999,
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, opts_b).await,
        mock_replica(&mut c, ReplicaOptions::default()).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let mut config = test_config(&output);
    config.fail_fast = true;
    let checker = ClusterChecker::new(config)
        .await
        .expect("failed to build checker");
    let report = checker
        .run(&[a.url(), b.url(), c.url()])
        .await
        .expect("check run failed");

    // The whole mismatching chunk is reported, then everything else stops.
    assert_eq!(report.failed_entities.len(), 2);
    assert!(report.failed_pointers.is_empty());
    assert!(report.failed_audit.is_empty());
    assert!(report.failed_content.is_empty());
    assert!(report.failed_content_files.is_empty());
}

#[tokio::test]
async fn fewer_than_two_servers_is_fatal() {
    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let err = checker
        .run(&["http://localhost:1".to_string()])
        .await
        .expect_err("a single replica cannot be checked");
    assert!(matches!(err, CheckError::InsufficientServers(1)));
}

#[tokio::test]
async fn fewer_than_two_synced_replicas_is_fatal() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let opts_b = ReplicaOptions {
        history: vec![("QmE1", 200)],
        ..ReplicaOptions::default()
    };
    let _mocks = (
        mock_replica(&mut a, ReplicaOptions::default()).await,
        mock_replica(&mut b, opts_b).await,
    );

    let output = TempDir::new().expect("failed to create temp dir");
    let checker = ClusterChecker::new(test_config(&output))
        .await
        .expect("failed to build checker");
    let err = checker
        .run(&[a.url(), b.url()])
        .await
        .expect_err("diverged pair cannot be checked");
    assert!(matches!(err, CheckError::InsufficientSyncedReplicas(1)));
}

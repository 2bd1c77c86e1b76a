// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use routekit_core::loopback::LoopbackSdk;
use routekit_core::router::{Router, RouterConfig};
use routekit_core::sdk::SdkSession;
use routekit_core::PreviewMonitor;
use routekit_server::server::create_app;
use routekit_server::AppState;

async fn start_test_server(sources: &[&str]) -> Option<(SocketAddr, LoopbackSdk)> {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return None,
        Err(e) => panic!("Failed to bind test server listener: {e}"),
    };
    let addr = listener.local_addr().unwrap();

    let sdk = LoopbackSdk::with_sources(sources.iter().copied());
    let session = Arc::new(SdkSession::open(Arc::new(sdk.clone())).unwrap());
    let preview = Arc::new(Mutex::new(PreviewMonitor::new(Arc::clone(&session))));
    let router = Router::spawn(session, RouterConfig::default(), Arc::clone(&preview))
        .await
        .expect("Failed to spawn router");

    let app = create_app(AppState { router, preview });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((addr, sdk))
}

#[tokio::test]
async fn test_fresh_boot_has_default_matrix() {
    let Some((addr, _sdk)) = start_test_server(&[]).await else {
        eprintln!("Skipping HTTP matrix tests: local TCP bind not permitted");
        return;
    };
    let client = reqwest::Client::new();

    let slots: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/source-slots"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let slots = slots.as_array().unwrap();
    assert_eq!(slots.len(), 16);
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot["slotNumber"], i as u64 + 1);
        assert_eq!(slot["isAssigned"], false);
        assert_eq!(slot["displayName"], format!("Slot {}", i + 1));
        assert_eq!(slot["assignedNdiSource"], "");
    }

    let destinations: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/destinations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let destinations = destinations.as_array().unwrap();
    assert_eq!(destinations.len(), 4);
    for (i, dest) in destinations.iter().enumerate() {
        assert_eq!(dest["slotNumber"], i as u64 + 1);
        assert_eq!(dest["name"], format!("NDI Output {}", i + 1));
        assert_eq!(dest["currentSourceSlot"], 0);
        assert_eq!(dest["enabled"], true);
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let Some((addr, _sdk)) = start_test_server(&[]).await else {
        return;
    };
    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("http://{addr}/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_assign_and_route_flow() {
    let Some((addr, _sdk)) = start_test_server(&["CAM1"]).await else {
        return;
    };
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/matrix/source-slots/assign"))
        .json(&serde_json::json!({
            "slotNumber": 3,
            "ndiSourceName": "CAM1",
            "displayName": "Main"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let resp = client
        .post(format!("http://{addr}/api/matrix/routes"))
        .json(&serde_json::json!({ "sourceSlot": 3, "destinationSlot": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let routes: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/routes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let routes = routes.as_array().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["sourceSlot"], 3);
    assert_eq!(routes[0]["destinationSlot"], 2);
    assert_eq!(routes[0]["active"], true);
    assert!(routes[0]["id"].as_str().unwrap().len() == 9);

    // Creating the identical route again is idempotent.
    client
        .post(format!("http://{addr}/api/matrix/routes"))
        .json(&serde_json::json!({ "sourceSlot": 3, "destinationSlot": 2 }))
        .send()
        .await
        .unwrap();
    let routes: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/routes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes.as_array().unwrap().len(), 1);

    let destinations: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/destinations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let dest2 = destinations
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["slotNumber"] == 2)
        .unwrap();
    assert_eq!(dest2["currentSourceSlot"], 3);

    // Routes-by-source view.
    let by_source: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/routes/source/3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_source["sourceSlot"], 3);
    assert_eq!(by_source["destinations"], serde_json::json!([2]));

    // Unassigning the slot cascades the route away.
    let resp = client
        .delete(format!("http://{addr}/api/matrix/source-slots/3"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let routes: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/routes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(routes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_route_to_unassigned_slot_is_rejected() {
    let Some((addr, _sdk)) = start_test_server(&[]).await else {
        return;
    };
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/matrix/routes"))
        .json(&serde_json::json!({ "sourceSlot": 3, "destinationSlot": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not assigned"));
}

#[tokio::test]
async fn test_malformed_body_returns_400_envelope() {
    let Some((addr, _sdk)) = start_test_server(&[]).await else {
        return;
    };
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/matrix/routes"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().is_some());

    // Missing required field.
    let resp = client
        .post(format!("http://{addr}/api/matrix/routes"))
        .json(&serde_json::json!({ "sourceSlot": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let Some((addr, _sdk)) = start_test_server(&[]).await else {
        return;
    };
    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/api/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_sources_exclude_own_destinations() {
    let Some((addr, sdk)) = start_test_server(&["CAM1", "CAM2"]).await else {
        return;
    };
    sdk.add_source("Desk (Studio Monitor)", "");
    let client = reqwest::Client::new();

    let sources: serde_json::Value = client
        .get(format!("http://{addr}/api/sources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> =
        sources.as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"CAM1"));
    assert!(names.contains(&"CAM2"));
    assert!(names.iter().all(|n| !n.starts_with("NDI Output")));
    assert!(sources.as_array().unwrap().iter().all(|s| s["connected"] == true));

    let monitors: serde_json::Value = client
        .get(format!("http://{addr}/api/studio-monitors"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(monitors.as_array().unwrap().len(), 1);

    let reset: serde_json::Value = client
        .post(format!("http://{addr}/api/studio-monitors/reset"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["success"], true);
    assert_eq!(reset["count"], 1);
    assert_eq!(reset["monitors"], serde_json::json!(["Desk (Studio Monitor)"]));
}

#[tokio::test]
async fn test_destination_lifecycle_over_http() {
    let Some((addr, _sdk)) = start_test_server(&[]).await else {
        return;
    };
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/matrix/destinations"))
        .json(&serde_json::json!({ "name": "Program", "description": "Main program out" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Duplicate names are rejected.
    let resp = client
        .post(format!("http://{addr}/api/matrix/destinations"))
        .json(&serde_json::json!({ "name": "Program" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let destinations: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/destinations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(destinations.as_array().unwrap().len(), 5);
    let program = destinations
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["name"] == "Program")
        .unwrap();
    assert_eq!(program["slotNumber"], 5);

    let resp = client
        .delete(format!("http://{addr}/api/matrix/destinations/5"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .delete(format!("http://{addr}/api/matrix/destinations/5"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_multiple_routes_and_source_wide_delete() {
    let Some((addr, _sdk)) = start_test_server(&["CAM1"]).await else {
        return;
    };
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/api/matrix/source-slots/assign"))
        .json(&serde_json::json!({ "slotNumber": 1, "ndiSourceName": "CAM1" }))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("http://{addr}/api/matrix/routes/multiple"))
        .json(&serde_json::json!({ "sourceSlot": 1, "destinationSlots": [1, 2, 3] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let routes: serde_json::Value = client
        .get(format!("http://{addr}/api/matrix/routes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes.as_array().unwrap().len(), 3);

    let resp = client
        .delete(format!("http://{addr}/api/matrix/routes/source/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // A second source-wide delete has nothing to remove.
    let resp = client
        .delete(format!("http://{addr}/api/matrix/routes/source/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Removing a single route via DELETE with a JSON body.
    client
        .post(format!("http://{addr}/api/matrix/routes"))
        .json(&serde_json::json!({ "sourceSlot": 1, "destinationSlot": 2 }))
        .send()
        .await
        .unwrap();
    let resp = client
        .delete(format!("http://{addr}/api/matrix/routes"))
        .json(&serde_json::json!({ "sourceSlot": 1, "destinationSlot": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

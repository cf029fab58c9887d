//! Straight-line happy path: a boot-then-shutdown chain against a healthy
//! remote ends COMPLETED with one detail per node.

mod common;

use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;

use common::MockStore;
use lap_config::LayoutApplyConfig;
use lap_engine::{Action, Scheduler};
use lap_hwctl::HttpDispatcher;
use lap_schemas::{DetailStatus, Operation};

#[tokio::test]
async fn boot_then_shutdown_chain_completes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/v1/devices/dev-1/power-operation")
                .json_body(json!({"action": "on"}));
            then.status(200).json_body(json!({}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/devices/dev-1/os-boot");
            then.status(200)
                .json_body(json!({"status": true, "IPAddress": "192.168.122.11"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/v1/devices/dev-2/power-operation")
                .json_body(json!({"action": "off"}));
            then.status(200).json_body(json!({}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/devices/dev-2/device-info");
            then.status(200)
                .json_body(json!({"type": "CPU", "powerState": "Off", "powerCapability": false}));
        })
        .await;

    let mut config = LayoutApplyConfig::default();
    config.hardware_control.host = "127.0.0.1".into();
    config.hardware_control.port = server.port();
    config.hardware_control.uri = "api/v1".into();
    config.hardware_control.isosboot.polling.interval = 0;
    config.get_information.host = "127.0.0.1".into();
    config.get_information.port = server.port();
    config.get_information.uri = "api/v1".into();
    config.get_information.polling.interval = 0;

    let store = Arc::new(MockStore::in_progress());
    let dispatcher = Arc::new(HttpDispatcher::new(Arc::new(config)));
    let scheduler = Scheduler::new(store.clone(), dispatcher, "0123456789", Some(2));

    let plan = vec![
        common::node(1, Operation::Boot, &[]),
        common::node(2, Operation::Shutdown, &[1]),
    ];
    scheduler.run(plan, Action::Request).await;

    let update = store.last_update();
    assert_eq!(update.status, Some(lap_schemas::ApplyStatus::Completed));

    let details = update.apply_result.expect("applyResult written");
    assert_eq!(details.len(), 2, "one detail per procedure");
    assert!(details.iter().all(|d| d.status == DetailStatus::Completed));

    // Dependency order: node 2 only ran after node 1 completed.
    assert_eq!(details[0].operation_id, 1);
    assert_eq!(details[1].operation_id, 2);
    assert!(details[0].is_os_boot.is_some(), "boot evidence embedded");
    assert!(
        details[1].get_information.is_some(),
        "shutdown evidence embedded"
    );
    assert!(update.rollback_procedures.is_none(), "nothing was canceled");
    assert!(update.resume_procedures.is_none(), "nothing was suspended");
}

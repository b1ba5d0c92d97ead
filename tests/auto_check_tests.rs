//! Automatic version check passes: alerts and the batch event.

mod common;

use common::{DownloadPlan, TestHarness, NEW_VERSION};
use hypanel::models::prelude::*;
use hypanel::services::update::UpdateEvent;
use sea_orm::EntityTrait;

#[tokio::test]
async fn auto_check_raises_an_alert_once() {
    let h = TestHarness::new(DownloadPlan::Succeed).await;
    let mut rx = h.svc.subscribe();

    h.svc.run_auto_check().await.unwrap();

    let alerts = Alert::find().all(&h.db).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].server_id, Some(h.server.id));
    assert_eq!(alerts[0].severity, "info");
    assert!(alerts[0].message.contains(NEW_VERSION));

    let events = common::drain_events(&mut rx);
    let servers = events
        .iter()
        .find_map(|e| match e {
            UpdateEvent::UpdatesAvailable { servers } => Some(servers.clone()),
            _ => None,
        })
        .expect("no updates:available event");
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].available_version, NEW_VERSION);

    // A second pass sees the same known version: no duplicate alert, but the
    // batch event still reflects the pending update
    h.svc.run_auto_check().await.unwrap();
    assert_eq!(Alert::find().all(&h.db).await.unwrap().len(), 1);
    let events = common::drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, UpdateEvent::UpdatesAvailable { .. })));
}

#[tokio::test]
async fn auto_check_with_nothing_new_stays_quiet() {
    let h = TestHarness::new(DownloadPlan::Succeed).await;
    h.downloads.set_latest(Some(common::OLD_VERSION));
    let mut rx = h.svc.subscribe();

    h.svc.run_auto_check().await.unwrap();

    assert!(Alert::find().all(&h.db).await.unwrap().is_empty());
    let events = common::drain_events(&mut rx);
    assert!(events.is_empty());
}

#[tokio::test]
async fn auto_check_survives_provider_outage() {
    let h = TestHarness::new(DownloadPlan::Succeed).await;
    h.downloads
        .latest_fails
        .store(true, std::sync::atomic::Ordering::SeqCst);

    h.svc.run_auto_check().await.unwrap();
    assert!(Alert::find().all(&h.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn alert_fires_again_when_a_newer_version_appears() {
    let h = TestHarness::new(DownloadPlan::Succeed).await;

    h.svc.run_auto_check().await.unwrap();
    h.downloads.set_latest(Some("1.2.0"));
    h.svc.run_auto_check().await.unwrap();

    let alerts = Alert::find().all(&h.db).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().any(|a| a.message.contains("1.2.0")));
}

#[tokio::test]
async fn auto_check_loop_starts_and_stops() {
    let h = TestHarness::new(DownloadPlan::Succeed).await;

    let handle = h.svc.start_auto_check();
    // The first tick is immediate; give it a moment to land
    for _ in 0..200 {
        if !Alert::find().all(&h.db).await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert_eq!(Alert::find().all(&h.db).await.unwrap().len(), 1);

    handle.stop().await;
}

mod common;

use std::time::Duration;

use fieldledger_events::SyncEventKind;
use serde_json::json;

use common::{harness, job_op, Harness};

async fn enqueue_note(h: &Harness) {
    h.ctx
        .queue()
        .enqueue(job_op("acme", "add-note", "J1", json!({"note": "on site"})))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnect_drains_after_the_delay() {
    let h = harness();
    h.connectivity.set_online(false);
    enqueue_note(&h).await;
    let mut events = h.ctx.bus().subscribe();

    let relay = h.ctx.connectivity_relay();
    let scheduler = h.ctx.scheduler("acme");
    tokio::task::yield_now().await;
    h.connectivity.set_online(true);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.ctx.queue().count_pending("acme").await.unwrap(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.ctx.queue().count_pending("acme").await.unwrap(), 0);
    assert_eq!(h.remote.applied().len(), 1);

    let first = events.try_recv().unwrap();
    assert_eq!(first.kind, SyncEventKind::ConnectivityChanged { online: true });

    scheduler.shutdown().await;
    relay.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn interval_drains_only_when_there_is_work() {
    let h = harness();
    let scheduler = h.ctx.scheduler("acme");

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(h.remote.fetch_count(), 0);
    assert!(h.ctx.status("acme").await.unwrap().last_sync_at.is_none());

    enqueue_note(&h).await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.ctx.queue().count_pending("acme").await.unwrap(), 0);
    assert!(h.ctx.status("acme").await.unwrap().last_sync_at.is_some());

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn requested_sync_runs_without_waiting_for_the_interval() {
    let h = harness();
    enqueue_note(&h).await;
    let scheduler = h.ctx.scheduler("acme");

    scheduler.request_sync();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.ctx.queue().count_pending("acme").await.unwrap(), 0);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_scheduled_drains() {
    let h = harness();
    let scheduler = h.ctx.scheduler("acme");
    scheduler.shutdown().await;

    enqueue_note(&h).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.ctx.queue().count_pending("acme").await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_scheduled_drains() {
    let h = harness();
    let scheduler = h.ctx.scheduler("acme");
    drop(scheduler);
    tokio::task::yield_now().await;

    enqueue_note(&h).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.ctx.queue().count_pending("acme").await.unwrap(), 1);
    assert_eq!(h.remote.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn going_offline_publishes_once_without_draining() {
    let h = harness();
    enqueue_note(&h).await;
    h.ctx
        .queue()
        .enqueue(job_op("globex", "add-note", "J7", json!({"note": "ladder on van"})))
        .await
        .unwrap();
    let mut events = h.ctx.bus().subscribe();
    let relay = h.ctx.connectivity_relay();
    let acme = h.ctx.scheduler("acme");
    let globex = h.ctx.scheduler("globex");
    tokio::task::yield_now().await;

    h.connectivity.set_online(false);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(kinds, vec![SyncEventKind::ConnectivityChanged { online: false }]);
    assert_eq!(h.remote.fetch_count(), 0);

    acme.shutdown().await;
    globex.shutdown().await;
    relay.shutdown().await;
}

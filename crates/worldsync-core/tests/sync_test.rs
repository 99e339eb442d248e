#![allow(clippy::unwrap_used)]
// End-to-end tests for `WorldSync` over the in-memory connector.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

use worldsync_api::transport::{MemoryConnector, MemoryListener, MemoryPeer, TimerPurpose};
use worldsync_api::{Envelope, MessageKind};
use worldsync_core::{
    ConnectionState, CoreError, DeltaKind, Freshness, REFRESH_PRESETS, RawEntity, RefreshOutcome,
    SnapshotSource, StaticSnapshotSource, SyncConfig, TaskPurpose, WorldSnapshot, WorldSync,
    demo_snapshot,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    sync: WorldSync,
    source: Arc<StaticSnapshotSource>,
    connector: MemoryConnector,
    listener: MemoryListener,
}

fn config() -> SyncConfig {
    SyncConfig::new(
        Url::parse("ws://world.test/ws").unwrap(),
        Url::parse("http://world.test/api/snapshot").unwrap(),
    )
}

fn world(entities: &[(&str, &str)]) -> WorldSnapshot {
    WorldSnapshot::from_entities(
        entities
            .iter()
            .map(|(id, status)| {
                RawEntity::new(*id, "agent")
                    .with_property("name", json!(id.to_uppercase()))
                    .with_property("status", json!(status))
            })
            .collect(),
    )
}

fn harness(config: SyncConfig, initial: WorldSnapshot) -> Harness {
    harness_with(config, StaticSnapshotSource::new(initial))
}

fn harness_with(config: SyncConfig, source: StaticSnapshotSource) -> Harness {
    let source = Arc::new(source);
    let dyn_source: Arc<dyn SnapshotSource> = source.clone();
    let (connector, listener) = MemoryConnector::new();
    let sync = WorldSync::new(config, dyn_source, connector.clone());
    Harness {
        sync,
        source,
        connector,
        listener,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Start the sync and return the server side once `subscribe` arrived.
async fn start(h: &mut Harness) -> MemoryPeer {
    h.sync.start().await.unwrap();
    let mut peer = h.listener.accept().await.unwrap();
    assert_eq!(peer.recv_envelope().await.unwrap().kind(), MessageKind::Subscribe);
    settle().await;
    peer
}

// ── Start ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_loads_snapshot_spawns_tasks_and_connects() {
    let mut h = harness(config(), world(&[("a", "idle"), ("b", "busy")]));
    let _peer = start(&mut h).await;

    let store = h.sync.store();
    assert_eq!(store.freshness(), Freshness::Live);
    assert_eq!(store.entity_count(), 2);
    assert_eq!(h.source.fetch_count(), 1);
    assert_eq!(
        h.sync.pending_tasks().await,
        vec![TaskPurpose::Bridge, TaskPurpose::Sweep, TaskPurpose::Poll]
    );
    assert_eq!(h.sync.transport().state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn start_twice_is_a_no_op() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let _peer = start(&mut h).await;

    h.sync.start().await.unwrap();
    settle().await;

    assert_eq!(h.source.fetch_count(), 1);
    assert_eq!(h.connector.open_count(), 1);
}

// ── Push-driven refresh ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn update_message_refetches_and_publishes_deltas() {
    let mut h = harness(config(), world(&[("a", "pending")]));
    let peer = start(&mut h).await;
    let mut deltas = h.sync.store().deltas();

    h.source.set(world(&[("a", "done"), ("c", "idle")]));
    peer.send_envelope(&Envelope::new(MessageKind::Update));
    settle().await;

    assert_eq!(h.source.fetch_count(), 2);
    let batch = deltas.recv().await.unwrap();
    let kinds: Vec<(&str, DeltaKind)> = batch.iter().map(|d| (d.id.as_str(), d.kind)).collect();
    assert_eq!(kinds, vec![("a", DeltaKind::Status), ("c", DeltaKind::Added)]);
    assert_eq!(batch[0].label, "A: pending -> done");
}

#[tokio::test(start_paused = true)]
async fn graph_update_and_empty_snapshot_refetch() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let peer = start(&mut h).await;

    peer.send_envelope(&Envelope::new(MessageKind::GraphUpdate));
    peer.send_envelope(&Envelope::new(MessageKind::Snapshot).with_data(json!({"changed": 1})));
    settle().await;

    assert_eq!(h.source.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn inline_snapshot_is_applied_without_fetching() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let peer = start(&mut h).await;

    let inline = serde_json::to_value(world(&[("a", "idle"), ("z", "new")])).unwrap();
    peer.send_envelope(&Envelope::new(MessageKind::Snapshot).with_data(inline));
    settle().await;

    assert_eq!(h.source.fetch_count(), 1);
    assert!(h.sync.store().entity("z").is_some());
    assert_eq!(h.sync.store().last_deltas().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn other_messages_reach_transport_subscribers_only() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.sync.transport().on_message({
        let seen = Arc::clone(&seen);
        move |msg: &Envelope| seen.lock().unwrap().push(msg.message_type.clone())
    });
    let peer = start(&mut h).await;

    peer.send_text(r#"{"type":"telemetry","data":{"cpu":0.4}}"#);
    peer.send_text(r#"{"type":"persona_entry","data":{"text":"hello"}}"#);
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec!["telemetry", "persona_entry"]);
    assert_eq!(h.source.fetch_count(), 1);
}

// ── Failures and fallback ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fetch_failure_keeps_data_and_marks_stale() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let peer = start(&mut h).await;

    h.source.set_failing(true);
    peer.send_envelope(&Envelope::new(MessageKind::Update));
    settle().await;

    assert!(matches!(h.sync.store().freshness(), Freshness::Stale { .. }));
    assert_eq!(h.sync.store().entity_count(), 1);

    h.source.set_failing(false);
    assert!(h.sync.refresh().await.is_ok());
    assert_eq!(h.sync.store().freshness(), Freshness::Live);
}

#[tokio::test(start_paused = true)]
async fn demo_fallback_serves_synthetic_world_until_server_answers() {
    let mut cfg = config();
    cfg.demo_fallback = true;
    let mut h = harness(cfg, world(&[("real", "idle")]));
    h.source.set_failing(true);
    let peer = start(&mut h).await;

    assert_eq!(h.sync.store().freshness(), Freshness::Synthetic);
    assert_eq!(
        h.sync.store().entity_count(),
        demo_snapshot().entities.len()
    );

    h.source.set_failing(false);
    peer.send_envelope(&Envelope::new(MessageKind::Update));
    settle().await;

    assert_eq!(h.sync.store().freshness(), Freshness::Live);
    assert_eq!(h.sync.store().entity_count(), 1);
}

// ── Connection changes ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn drop_marks_stale_and_reconnect_refetches() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let peer = start(&mut h).await;

    peer.close(1001, "restart");
    settle().await;
    assert!(matches!(h.sync.store().freshness(), Freshness::Stale { .. }));

    h.source.set(world(&[("a", "busy")]));
    tokio::time::sleep(Duration::from_millis(1250)).await;
    let _peer = h.listener.accept().await.unwrap();
    settle().await;

    assert_eq!(h.sync.transport().state(), ConnectionState::Connected);
    assert_eq!(h.source.fetch_count(), 2);
    assert_eq!(h.sync.store().freshness(), Freshness::Live);
    assert_eq!(
        h.sync.store().entity("a").unwrap().status.as_deref(),
        Some("busy")
    );
}

#[tokio::test(start_paused = true)]
async fn drop_during_slow_refetch_is_not_missed() {
    let source =
        StaticSnapshotSource::new(world(&[("a", "idle")])).with_latency(Duration::from_secs(3));
    let mut h = harness_with(config(), source);
    let peer = start(&mut h).await;
    assert_eq!(h.source.fetch_count(), 1);

    h.source.set(world(&[("a", "busy")]));
    peer.send_envelope(&Envelope::new(MessageKind::Update));
    tokio::time::sleep(Duration::from_millis(10)).await;
    peer.close(1001, "restart");
    settle().await;
    assert!(matches!(h.sync.store().freshness(), Freshness::Stale { .. }));

    // The socket comes back while the push refetch is still in flight.
    tokio::time::sleep(Duration::from_millis(1250)).await;
    let _peer = h.listener.accept().await.unwrap();
    settle().await;
    assert_eq!(h.sync.transport().state(), ConnectionState::Connected);
    assert_eq!(h.source.fetch_count(), 2);

    // Push refetch ends at ~3 s, then the reconnect refetch takes 3 s more.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(h.source.fetch_count(), 3);
    assert_eq!(h.sync.store().freshness(), Freshness::Live);
    assert_eq!(
        h.sync.store().entity("a").unwrap().status.as_deref(),
        Some("busy")
    );
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_can_be_toggled_at_runtime() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let _peer = start(&mut h).await;
    assert_eq!(h.sync.refresh_interval(), None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.source.fetch_count(), 1);

    h.sync.set_refresh_interval(Some(REFRESH_PRESETS[0]));
    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert_eq!(h.source.fetch_count(), 2);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.source.fetch_count(), 3);

    h.sync.set_refresh_interval(None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.source.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn configured_interval_polls_from_start() {
    let mut cfg = config();
    cfg.refresh_interval = Some(REFRESH_PRESETS[1]);
    let mut h = harness(cfg, world(&[("a", "idle")]));
    let _peer = start(&mut h).await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.source.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_reports_outcome() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let _peer = start(&mut h).await;

    h.source.set(world(&[("a", "idle"), ("b", "idle")]));
    let outcome = h.sync.refresh().await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Applied { deltas: 1 });
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_requires_a_running_sync() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    assert!(matches!(h.sync.refresh().await, Err(CoreError::NotRunning)));
    assert_eq!(h.source.fetch_count(), 0);

    let _peer = start(&mut h).await;
    assert!(h.sync.refresh().await.is_ok());

    h.sync.stop().await;
    assert!(matches!(h.sync.refresh().await, Err(CoreError::NotRunning)));
    assert_eq!(h.source.fetch_count(), 2);
}

// ── Highlights ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn changed_entities_highlight_then_decay() {
    let mut h = harness(config(), world(&[("a", "idle"), ("b", "idle")]));
    let peer = start(&mut h).await;

    // Let the initial "added" highlights expire first.
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(h.sync.store().highlights().is_empty());

    h.source.set(world(&[("a", "moving"), ("b", "idle")]));
    peer.send_envelope(&Envelope::new(MessageKind::Update));
    settle().await;

    let highlights = h.sync.store().highlights();
    assert_eq!(highlights.len(), 1);
    assert_eq!(highlights.get("a").unwrap().kind, DeltaKind::Status);

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(highlights.get("a").is_some());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(highlights.get("a").is_none());
}

// ── Stop ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_cancels_tasks_and_timers() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let peer = start(&mut h).await;
    assert_eq!(h.sync.transport().pending_timers(), vec![TimerPurpose::Ping]);

    h.sync.stop().await;

    assert!(h.sync.pending_tasks().await.is_empty());
    assert!(!h.sync.is_running().await);
    assert!(h.sync.transport().pending_timers().is_empty());
    assert_eq!(h.sync.transport().state(), ConnectionState::Disconnected);
    assert!(peer.is_client_gone());
}

#[tokio::test(start_paused = true)]
async fn stop_during_reconnect_backoff_prevents_reopen() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let peer = start(&mut h).await;

    peer.close(1006, "gone");
    settle().await;
    assert_eq!(
        h.sync.transport().pending_timers(),
        vec![TimerPurpose::Reconnect]
    );

    h.sync.stop().await;
    assert!(h.sync.transport().pending_timers().is_empty());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.open_count(), 1);
    assert_eq!(h.source.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop() {
    let mut h = harness(config(), world(&[("a", "idle")]));
    let _peer = start(&mut h).await;
    h.sync.stop().await;

    let _peer = start(&mut h).await;
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.source.fetch_count(), 2);
    assert_eq!(h.sync.pending_tasks().await.len(), 3);
}

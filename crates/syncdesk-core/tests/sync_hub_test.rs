#![allow(clippy::unwrap_used)]
// Hub scenarios driven through the public API.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

use syncdesk_api::{RecordClient, TransportConfig};
use syncdesk_core::{
    Actor, BroadcastRequest, CacheStore, ChangeKind, ExecutorConfig, FrameKind, HubConfig,
    HubMessage, OperationExecutor, RecordService, SubscriptionFilter, SubscriptionParams,
    SyncEvent, SyncHub, Table,
};

fn service(hub: Arc<SyncHub>) -> RecordService<RecordClient> {
    // Broadcast ingress never reaches the remote store.
    let client = RecordClient::new(
        Url::parse("http://127.0.0.1:1/rest").unwrap(),
        &TransportConfig::default(),
    )
    .unwrap();
    let executor =
        OperationExecutor::new(client, Arc::new(CacheStore::new()), ExecutorConfig::default());
    RecordService::new(executor, hub)
}

fn projects_filter() -> Vec<SubscriptionFilter> {
    let params = SubscriptionParams {
        tables: Some("Proyectos".into()),
        ..SubscriptionParams::default()
    };
    vec![SubscriptionFilter::from_params(&params).unwrap()]
}

#[tokio::test]
async fn broadcast_reaches_every_project_subscriber() {
    let hub = Arc::new(SyncHub::default());
    let svc = service(Arc::clone(&hub));

    let mut first = hub.connect(&Actor::new("u1", "Ana"), projects_filter());
    let mut second = hub.connect(&Actor::new("u2", "Luis"), projects_filter());
    assert_eq!(first.recv().await.unwrap().event, FrameKind::Connected);
    assert_eq!(second.recv().await.unwrap().event, FrameKind::Connected);

    let request: BroadcastRequest = serde_json::from_value(json!({
        "table": "Proyectos",
        "operation": "update",
        "recordId": "p7",
        "data": { "status": "active" },
        "version": 2
    }))
    .unwrap();
    svc.broadcast(request, &Actor::new("svc", "Importer")).unwrap();

    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert_eq!(a.event, FrameKind::SyncEvent);
    assert_eq!(b.event, FrameKind::SyncEvent);
    assert_eq!(a.id, b.id);
    assert_eq!(a.data["recordId"], "p7");
    assert_eq!(b.data["recordId"], "p7");
    assert_eq!(a.data["id"], b.data["id"]);
}

#[tokio::test]
async fn fan_out_skips_other_tables() {
    let hub = Arc::new(SyncHub::default());
    let mut materials = hub.connect(
        &Actor::default(),
        vec![SubscriptionFilter::for_tables([Table::Materiales])],
    );
    let mut projects = hub.connect(
        &Actor::default(),
        vec![SubscriptionFilter::for_tables([Table::Proyectos])],
    );
    materials.try_recv().unwrap();
    projects.try_recv().unwrap();

    hub.publish(SyncEvent::new(
        Table::Materiales,
        ChangeKind::Update,
        "m1",
        json!({ "stock": 10 }),
    ));

    assert_eq!(materials.try_recv().map(|f| f.event), Some(FrameKind::SyncEvent));
    assert!(projects.try_recv().is_none());
}

#[tokio::test]
async fn listener_observes_broadcast_conflicts() {
    let hub = Arc::new(SyncHub::default());
    let svc = service(Arc::clone(&hub));
    let mut listener = hub.subscribe();

    for session in ["tab-a", "tab-b"] {
        let request: BroadcastRequest = serde_json::from_value(json!({
            "table": "Pedidos",
            "operation": "update",
            "recordId": "o1",
            "data": { "quantity": 3 },
            "version": 5,
            "sessionId": session
        }))
        .unwrap();
        svc.broadcast(request, &Actor::new("u1", "Ana")).unwrap();
    }

    let mut conflicts = 0;
    let wait = Duration::from_millis(50);
    while let Ok(Some(message)) = tokio::time::timeout(wait, listener.recv()).await {
        if matches!(message, HubMessage::Conflict(_)) {
            conflicts += 1;
        }
    }
    assert_eq!(conflicts, 1);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_task_evicts_only_silent_connections() {
    let hub = Arc::new(SyncHub::new(HubConfig::with_heartbeat_interval(Duration::from_secs(10))));
    let cancel = tokio_util::sync::CancellationToken::new();
    let task = hub.spawn_heartbeat(cancel.clone());

    let mut silent = hub.connect(&Actor::default(), Vec::new());
    let mut reader = hub.connect(&Actor::default(), Vec::new());
    let silent_id = silent.id().to_owned();
    assert_eq!(hub.connection_count(), 2);

    // Four intervals, twice the liveness window.
    let mut heartbeats = 0;
    while heartbeats < 4 {
        let frame = reader.recv().await.unwrap();
        if frame.event == FrameKind::Heartbeat {
            heartbeats += 1;
        }
    }

    assert!(hub.connection(&silent_id).is_none());
    assert!(hub.connection(reader.id()).is_some());
    assert_eq!(hub.connection_count(), 1);
    let event = SyncEvent::new(Table::Materiales, ChangeKind::Create, "m1", json!({}));
    let mut matched = 0;
    hub.registry().for_each_matching(&event, |_, _| matched += 1);
    assert_eq!(matched, 1);

    // The evicted queue still drains what was sent before it closed.
    while silent.recv().await.is_some() {}

    cancel.cancel();
    task.await.unwrap();
}

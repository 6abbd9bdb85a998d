//! End-to-end engine tests against an in-memory remote.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use magazzino_channel::{ChannelEvent, InMemoryChannel, NotificationChannel, EVENT_MAGAZZINO_UPDATE};
use magazzino_core::{
    EntityType, Ingredient, MovementKind, OperationKind, Record, RecordId, StockMovement,
};
use magazzino_sync::{
    ListOptions, ManualProbe, MemoryStore, PendingQueue, RemoteApi, RemoteError, SyncConfig,
    SyncEngine, SyncError, SyncOutcome, SyncWorker,
};

/// In-memory stand-in for the REST API: stores records, mints `srv-{n}` ids,
/// keeps a call log, and fails the next N calls with programmed errors.
#[derive(Default)]
struct FakeRemote {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    records: HashMap<EntityType, Vec<Record>>,
    calls: Vec<String>,
    failures: VecDeque<RemoteError>,
    next_id: u32,
}

impl FakeRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn seed(&self, entity: EntityType, records: Vec<Record>) {
        self.state.lock().unwrap().records.insert(entity, records);
    }

    fn fail_next(&self, error: RemoteError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn stored(&self, entity: EntityType) -> Vec<Record> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    fn begin(&self, call: String) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn list(
        &self,
        entity: EntityType,
        _options: &ListOptions,
    ) -> Result<Vec<Record>, RemoteError> {
        self.begin(format!("list {entity}"))?;
        Ok(self.stored(entity))
    }

    async fn create(&self, record: &Record) -> Result<Record, RemoteError> {
        let entity = record.entity_type();
        self.begin(format!("create {entity}"))?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut confirmed = record.clone();
        confirmed.set_id(RecordId::new(format!("srv-{}", state.next_id)));
        confirmed.set_offline(false);
        state
            .records
            .entry(entity)
            .or_default()
            .push(confirmed.clone());
        Ok(confirmed)
    }

    async fn update(&self, record: &Record) -> Result<Record, RemoteError> {
        let entity = record.entity_type();
        self.begin(format!("update {entity} {}", record.id()))?;

        let mut state = self.state.lock().unwrap();
        let records = state.records.entry(entity).or_default();
        match records.iter_mut().find(|slot| slot.id() == record.id()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(record.clone())
            }
            None => Err(RemoteError::Api(404, "not found".to_string())),
        }
    }

    async fn delete(&self, entity: EntityType, id: &RecordId) -> Result<(), RemoteError> {
        self.begin(format!("delete {entity} {id}"))?;

        let mut state = self.state.lock().unwrap();
        state
            .records
            .entry(entity)
            .or_default()
            .retain(|slot| slot.id() != id);
        Ok(())
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    store: Arc<MemoryStore>,
    remote: Arc<FakeRemote>,
    probe: Arc<ManualProbe>,
    channel: Arc<InMemoryChannel<ChannelEvent>>,
}

impl Harness {
    /// Direct view of the persisted queue, bypassing the engine.
    fn queue(&self) -> PendingQueue {
        PendingQueue::new(self.store.clone())
    }
}

fn harness(online: bool) -> Harness {
    harness_with(online, SyncConfig::default())
}

fn harness_with(online: bool, config: SyncConfig) -> Harness {
    magazzino_observability::init();
    let store = Arc::new(MemoryStore::new());
    let remote = FakeRemote::new();
    let probe = Arc::new(ManualProbe::new(online));
    let channel = Arc::new(InMemoryChannel::new());
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        remote.clone(),
        probe.clone(),
        channel.clone(),
        config,
    ));
    Harness {
        engine,
        store,
        remote,
        probe,
        channel,
    }
}

/// Poll until `pred` holds or the deadline passes.
async fn wait_for<F, Fut>(pred: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if pred().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}

fn ingredient(id: &str, nome: &str, quantita: f64) -> Record {
    Record::Ingredient(Ingredient {
        id: RecordId::new(id),
        nome: nome.to_string(),
        quantita,
        unita: Some("kg".to_string()),
        soglia_minima: None,
        is_offline: false,
    })
}

fn new_ingredient(nome: &str, quantita: f64) -> Record {
    let mut record = ingredient("", nome, quantita);
    record.set_id(RecordId::unassigned());
    record
}

#[tokio::test]
async fn fetch_online_refreshes_cache_and_returns_remote_data() {
    let h = harness(true);
    h.remote
        .seed(EntityType::Ingredient, vec![ingredient("1", "Farina", 10.0)]);

    let records = h.engine.fetch(EntityType::Ingredient, &ListOptions::default()).await;
    assert_eq!(records.len(), 1);

    // The refreshed cache serves subsequent offline reads.
    h.probe.set_offline();
    let cached = h.engine.fetch(EntityType::Ingredient, &ListOptions::default()).await;
    assert_eq!(cached, records);
}

#[tokio::test]
async fn fetch_falls_back_to_cache_when_remote_fails() {
    let h = harness(true);
    h.remote.seed(
        EntityType::Ingredient,
        vec![ingredient("1", "Farina", 10.0)],
    );
    h.engine
        .fetch(EntityType::Ingredient, &ListOptions::default())
        .await;

    h.remote.fail_next(RemoteError::Network("reset".to_string()));
    let records = h
        .engine
        .fetch(EntityType::Ingredient, &ListOptions::default())
        .await;
    assert_eq!(records, vec![ingredient("1", "Farina", 10.0)]);
}

#[tokio::test]
async fn fetch_of_empty_cache_is_empty_not_an_error() {
    let h = harness(false);
    let records = h.engine.fetch(EntityType::Recipe, &ListOptions::default()).await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn online_create_confirms_and_notifies() {
    let h = harness(true);
    let sub = h.channel.subscribe();

    let confirmed = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap()
        .expect("create returns the confirmed record");

    assert_eq!(confirmed.id().as_str(), "srv-1");
    assert!(!confirmed.is_offline());
    assert!(!h.engine.has_pending_operations().await);

    let event = sub.try_recv().expect("mutation event published");
    assert_eq!(event.name, EVENT_MAGAZZINO_UPDATE);
    assert_eq!(event.entity, Some(EntityType::Ingredient));
    assert_eq!(event.kind, Some(OperationKind::Create));

    // Cache mirrors the confirmed record.
    h.probe.set_offline();
    let cached = h.engine.fetch(EntityType::Ingredient, &ListOptions::default()).await;
    assert_eq!(cached, vec![confirmed]);
}

#[tokio::test]
async fn offline_create_is_optimistic_and_queued() {
    let h = harness(false);
    let sub = h.channel.subscribe();

    let record = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap()
        .expect("offline create returns the optimistic record");

    assert!(record.id().is_local());
    assert!(record.is_offline());
    assert_eq!(h.engine.pending_count().await, 1);
    assert!(h.remote.calls().is_empty());
    assert!(sub.try_recv().is_err(), "no notification while offline");

    let cached = h.engine.fetch(EntityType::Ingredient, &ListOptions::default()).await;
    assert_eq!(cached, vec![record]);
}

#[tokio::test]
async fn offline_delete_removes_from_cache_and_queues() {
    let h = harness(true);
    h.remote
        .seed(EntityType::Ingredient, vec![ingredient("7", "Sale", 2.0)]);
    h.engine
        .fetch(EntityType::Ingredient, &ListOptions::default())
        .await;

    h.probe.set_offline();
    let result = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Delete,
            None,
            Some(RecordId::new("7")),
        )
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(h.engine.pending_count().await, 1);
    assert!(h
        .engine
        .fetch(EntityType::Ingredient, &ListOptions::default())
        .await
        .is_empty());
}

#[tokio::test]
async fn online_retryable_failure_queues_and_propagates() {
    let h = harness(true);
    h.remote.fail_next(RemoteError::Api(503, "unavailable".to_string()));

    let err = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap_err();
    match err {
        SyncError::Remote(RemoteError::Api(503, _)) => {}
        other => panic!("Expected 503 remote error, got {other:?}"),
    }

    assert_eq!(h.engine.pending_count().await, 1);

    // The queued entry carries the failure diagnostics from the attempt.
    let queued = h.queue().list().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert!(queued[0]
        .last_error
        .as_deref()
        .is_some_and(|msg| msg.contains("503")));
    assert!(queued[0].last_attempt.is_some());
}

#[tokio::test]
async fn online_permanent_rejection_is_not_queued() {
    let h = harness(true);
    h.remote.fail_next(RemoteError::Api(422, "invalid".to_string()));

    let err = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap_err();
    match err {
        SyncError::Remote(RemoteError::Api(422, _)) => {}
        other => panic!("Expected 422 remote error, got {other:?}"),
    }

    assert!(!h.engine.has_pending_operations().await);
}

#[tokio::test]
async fn stock_movement_update_is_unsupported() {
    let h = harness(true);
    let movement = Record::StockMovement(StockMovement {
        id: RecordId::new("m1"),
        ingrediente_id: RecordId::new("1"),
        tipo: MovementKind::Carico,
        quantita: 5.0,
        data: chrono::Utc::now(),
        is_offline: false,
    });

    let err = h
        .engine
        .perform(
            EntityType::StockMovement,
            OperationKind::Update,
            Some(movement),
            None,
        )
        .await
        .unwrap_err();
    match err {
        SyncError::Domain(magazzino_core::DomainError::UnsupportedOperation { .. }) => {}
        other => panic!("Expected unsupported operation, got {other:?}"),
    }
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn invalid_record_is_rejected_before_any_io() {
    let h = harness(true);
    let err = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("", 10.0)),
            None,
        )
        .await
        .unwrap_err();
    match err {
        SyncError::Domain(magazzino_core::DomainError::Validation(_)) => {}
        other => panic!("Expected validation error, got {other:?}"),
    }
    assert!(h.remote.calls().is_empty());
    assert!(!h.engine.has_pending_operations().await);
}

#[tokio::test]
async fn synchronize_offline_leaves_queue_untouched() {
    let h = harness(false);
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap();

    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Offline);
    assert_eq!(h.engine.pending_count().await, 1);
    assert!(h.engine.last_sync().await.is_none());
}

#[tokio::test]
async fn synchronize_with_empty_queue_reports_nothing_to_sync() {
    let h = harness(true);
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::NothingToSync);
    assert_eq!(report.message(), "nothing to sync");
}

#[tokio::test]
async fn synchronize_replays_in_create_update_delete_order() {
    let h = harness(true);
    h.remote.seed(
        EntityType::Ingredient,
        vec![ingredient("10", "Sale", 2.0), ingredient("11", "Zucchero", 4.0)],
    );
    h.engine
        .fetch(EntityType::Ingredient, &ListOptions::default())
        .await;
    h.probe.set_offline();

    // Enqueued as delete, create, update; replay must reorder.
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Delete,
            None,
            Some(RecordId::new("10")),
        )
        .await
        .unwrap();
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap();
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Update,
            Some(ingredient("11", "Zucchero di canna", 4.0)),
            None,
        )
        .await
        .unwrap();

    h.probe.set_online();
    let calls_before = h.remote.calls().len();
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(report.successful, 3);
    assert!(report.success());

    let replayed: Vec<_> = h.remote.calls()[calls_before..]
        .iter()
        .map(|call| call.split(' ').next().unwrap().to_string())
        .collect();
    assert_eq!(replayed, vec!["create", "update", "delete"]);
    assert!(!h.engine.has_pending_operations().await);
    assert!(h.engine.last_sync().await.is_some());
}

#[tokio::test]
async fn synchronize_reconciles_local_ids_in_cache() {
    let h = harness(false);
    let offline = h
        .engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap()
        .unwrap();
    assert!(offline.id().is_local());

    h.probe.set_online();
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.successful, 1);

    h.probe.set_offline();
    let cached = h.engine.fetch(EntityType::Ingredient, &ListOptions::default()).await;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id().as_str(), "srv-1");
    assert!(!cached[0].is_offline());
}

#[tokio::test]
async fn synchronize_keeps_retryable_failures_queued_with_diagnostics() {
    let h = harness(false);
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap();

    h.probe.set_online();
    h.remote.fail_next(RemoteError::Network("reset".to_string()));
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(report.failed, 1);
    assert!(!report.success());
    assert!(!report.issues[0].permanent);
    assert_eq!(h.engine.pending_count().await, 1);

    // A later pass without the fault drains it.
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.successful, 1);
    assert!(!h.engine.has_pending_operations().await);
}

#[tokio::test]
async fn synchronize_drops_permanently_rejected_operations() {
    let h = harness(false);
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap();

    h.probe.set_online();
    h.remote.fail_next(RemoteError::Api(422, "invalid".to_string()));
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.issues[0].permanent);
    assert!(
        !h.engine.has_pending_operations().await,
        "permanent rejections must not be retried"
    );
}

#[tokio::test]
async fn one_failure_does_not_abort_the_batch() {
    let h = harness(false);
    for nome in ["Farina", "Lievito", "Sale"] {
        h.engine
            .perform(
                EntityType::Ingredient,
                OperationKind::Create,
                Some(new_ingredient(nome, 1.0)),
                None,
            )
            .await
            .unwrap();
    }

    h.probe.set_online();
    h.remote.fail_next(RemoteError::Network("reset".to_string()));
    let report = h.engine.synchronize().await.unwrap();
    assert_eq!(report.total_operations, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(h.engine.pending_count().await, 1);
}

#[tokio::test]
async fn status_reflects_queue_connectivity_and_last_sync() {
    let h = harness(false);
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap();

    let status = h.engine.status().await;
    assert_eq!(status.pending_operations, 1);
    assert!(!status.online);
    assert!(status.last_sync.is_none());

    h.probe.set_online();
    h.engine.synchronize().await.unwrap();

    let status = h.engine.status().await;
    assert_eq!(status.pending_operations, 0);
    assert!(status.online);
    assert!(status.last_sync.is_some());
}

#[tokio::test]
async fn backup_snapshots_all_partitions_and_evicts_beyond_retention() {
    let h = harness(true);
    h.remote
        .seed(EntityType::Ingredient, vec![ingredient("1", "Farina", 10.0)]);

    let retention = SyncConfig::default().backup_retention;
    let mut last = None;
    for _ in 0..retention + 2 {
        last = Some(h.engine.backup().await.unwrap());
    }
    let last = last.expect("at least one backup taken");

    let retained = h.engine.backups().await.unwrap();
    assert_eq!(retained.len(), retention);
    // Oldest evicted, newest kept.
    assert_eq!(*retained.last().unwrap(), last.timestamp);

    assert_eq!(
        last.records_for(EntityType::Ingredient),
        &[ingredient("1", "Farina", 10.0)]
    );
    assert!(last.records_for(EntityType::Order).is_empty());
}

#[tokio::test]
async fn restore_overwrites_cache_but_not_the_queue() {
    let h = harness(true);
    h.remote
        .seed(EntityType::Ingredient, vec![ingredient("1", "Farina", 10.0)]);
    let snapshot = h.engine.backup().await.unwrap();

    // Diverge: queue an offline create and empty the remote view.
    h.probe.set_offline();
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Lievito", 3.0)),
            None,
        )
        .await
        .unwrap();

    h.engine.restore(snapshot.timestamp).await.unwrap();

    let cached = h.engine.fetch(EntityType::Ingredient, &ListOptions::default()).await;
    assert_eq!(cached, vec![ingredient("1", "Farina", 10.0)]);
    assert_eq!(h.engine.pending_count().await, 1, "queue survives restore");
}

#[tokio::test]
async fn restore_of_unknown_timestamp_fails() {
    let h = harness(true);
    let err = h.engine.restore(chrono::Utc::now()).await.unwrap_err();
    match err {
        SyncError::SnapshotNotFound(_) => {}
        other => panic!("Expected snapshot not found, got {other:?}"),
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        sync_interval: std::time::Duration::from_millis(50),
        ..SyncConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_drains_queue_when_connectivity_returns() {
    let h = harness_with(false, fast_config());
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Farina", 10.0)),
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.engine.pending_count().await, 1);

    let mut worker = SyncWorker::new(h.engine.clone());
    worker.start();
    worker.start(); // second start is a no-op
    assert!(worker.is_running());

    h.probe.set_online();
    assert!(
        wait_for(|| async { h.engine.pending_count().await == 0 }).await,
        "worker never drained the queue"
    );
    assert!(h.engine.last_sync().await.is_some());

    worker.shutdown().await;
    assert!(!worker.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_poke_triggers_an_immediate_pass() {
    // Interval long enough that only the wakeup can explain a drain.
    let config = SyncConfig {
        sync_interval: std::time::Duration::from_secs(3600),
        ..SyncConfig::default()
    };
    let h = harness_with(false, config);
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Lievito", 3.0)),
            None,
        )
        .await
        .unwrap();

    let mut worker = SyncWorker::new(h.engine.clone());
    worker.start();

    h.probe.set_online();
    worker.poke();
    assert!(
        wait_for(|| async { h.engine.pending_count().await == 0 }).await,
        "poke did not trigger a sync pass"
    );

    worker.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_retries_through_transient_failures() {
    let h = harness_with(false, fast_config());
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Sale", 1.0)),
            None,
        )
        .await
        .unwrap();

    // The first two background passes hit a transient fault; the operation
    // must survive them and drain on a later pass.
    h.remote.fail_next(RemoteError::Network("reset".to_string()));
    h.remote.fail_next(RemoteError::Network("reset".to_string()));

    let mut worker = SyncWorker::new(h.engine.clone());
    worker.start();
    h.probe.set_online();

    assert!(
        wait_for(|| async { h.engine.pending_count().await == 0 }).await,
        "worker never recovered from transient failures"
    );

    worker.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_stops_draining_after_shutdown() {
    let h = harness_with(true, fast_config());
    let mut worker = SyncWorker::new(h.engine.clone());
    worker.start();
    worker.shutdown().await;

    h.probe.set_offline();
    h.engine
        .perform(
            EntityType::Ingredient,
            OperationKind::Create,
            Some(new_ingredient("Zucchero", 2.0)),
            None,
        )
        .await
        .unwrap();
    h.probe.set_online();

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(h.engine.pending_count().await, 1, "stopped worker must not sync");
}

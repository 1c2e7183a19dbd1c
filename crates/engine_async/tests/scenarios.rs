//! End-to-end behaviour of the scheduler against the in-memory engine.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use engine_async::{AsyncCollector, AsyncError, AsyncErrorKind, AsyncScheduler, RequestId, SessionState};
use engine_component::{Action, AnyValue, Codec, Component, ComponentTypeId, Entity};
use engine_system::{ExecutionCollector, ExecutionEngine, ExecutionError, InMemoryEngine, NativeOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: u32,
}

impl Component for Counter {
    fn type_name() -> &'static str {
        "Counter"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Bump {
    by: u32,
}

impl Action for Bump {
    fn type_name() -> &'static str {
        "Bump"
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Change {
    Init(Entity, u32),
    Update(Entity, u32),
    Remove(Entity, u32),
    Created(Entity),
    Destroyed(Entity),
}

#[derive(Default)]
struct Changes(Vec<Change>);

fn counter(type_id: ComponentTypeId, value: &dyn AnyValue) -> u32 {
    assert_eq!(type_id, Counter::component_type_id());
    value
        .downcast_ref::<Counter>()
        .map(|counter| counter.value)
        .unwrap_or(u32::MAX)
}

impl ExecutionCollector for Changes {
    fn on_component_init(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        self.0.push(Change::Init(entity, counter(type_id, value)));
    }

    fn on_component_update(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        self.0.push(Change::Update(entity, counter(type_id, value)));
    }

    fn on_component_remove(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        self.0.push(Change::Remove(entity, counter(type_id, value)));
    }

    fn on_entity_created(&mut self, entity: Entity) {
        self.0.push(Change::Created(entity));
    }

    fn on_entity_destroyed(&mut self, entity: Entity) {
        self.0.push(Change::Destroyed(entity));
    }
}

#[derive(Default)]
struct Outcomes {
    errors: Vec<AsyncError>,
    created: Vec<(Entity, RequestId)>,
    failures: Vec<(ExecutionError, Vec<RequestId>)>,
}

impl AsyncCollector for Outcomes {
    fn on_async_error(&mut self, error: &AsyncError) {
        self.errors.push(error.clone());
    }

    fn on_system_execution_error(&mut self, error: &ExecutionError, request_ids: &[RequestId]) {
        self.failures.push((error.clone(), request_ids.to_vec()));
    }

    fn on_entity_created(&mut self, entity: Entity, request_id: RequestId) {
        self.created.push((entity, request_id));
    }
}

impl Outcomes {
    fn total(&self) -> usize {
        self.errors.len() + self.created.len() + self.failures.len()
    }
}

fn codec() -> Codec {
    Codec::new()
        .with_component::<Counter>()
        .with_action::<Bump>()
}

fn scheduler() -> AsyncScheduler {
    AsyncScheduler::new(Arc::new(InMemoryEngine::new()), codec())
}

/// Flush until `done` holds or five seconds pass.
fn flush_until(
    scheduler: &AsyncScheduler,
    changes: &mut Changes,
    outcomes: &mut Outcomes,
    mut done: impl FnMut(&Changes, &Outcomes) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        scheduler.flush_events(Some(&mut *changes), Some(&mut *outcomes));
        if done(changes, outcomes) {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn create_entity(scheduler: &AsyncScheduler, changes: &mut Changes, outcomes: &mut Outcomes) -> Entity {
    let request = scheduler.create_entity();
    assert!(flush_until(scheduler, changes, outcomes, |_, o| {
        o.created.iter().any(|(_, id)| *id == request)
    }));
    outcomes
        .created
        .iter()
        .find(|(_, id)| *id == request)
        .map(|(entity, _)| *entity)
        .unwrap()
}

#[test]
fn test_unknown_host_stays_disconnected_and_reports_only_the_refusal() {
    let scheduler = scheduler();
    for input in ["bad", "bad?tick_rate=25", "", "?tick_rate=25", "goodish?tick_rate=25"] {
        let request = scheduler.connect(input);
        assert_eq!(scheduler.state(), SessionState::Disconnected);

        let mut changes = Changes::default();
        let mut outcomes = Outcomes::default();
        scheduler.flush_events(Some(&mut changes), Some(&mut outcomes));
        assert_eq!(
            outcomes.errors,
            vec![AsyncError::single(AsyncErrorKind::PermissionDenied, request)],
            "connecting to {input:?}"
        );
        assert_eq!(outcomes.total(), 1);
        assert!(changes.0.is_empty());
    }
}

#[test]
fn test_missing_tick_rate_queues_one_invalid_connection_string() {
    let scheduler = scheduler();
    let request = scheduler.connect("good?registry=arena");
    assert_eq!(scheduler.state(), SessionState::Disconnected);

    let mut outcomes = Outcomes::default();
    scheduler.flush_events(None, Some(&mut outcomes));
    assert_eq!(
        outcomes.errors,
        vec![AsyncError::single(AsyncErrorKind::InvalidConnectionString, request)]
    );
    assert_eq!(outcomes.total(), 1);
}

#[test]
fn test_every_disconnected_request_is_denied() {
    let scheduler = scheduler();
    let mut batch = NativeOptions::new();
    batch.add_component(Entity(1), Counter { value: 1 });

    let requests = vec![
        scheduler.create_entity(),
        scheduler.enqueue_execution_options(&batch.as_options()),
        scheduler.create_entity(),
        scheduler.enqueue_execution_options(&batch.as_options()),
    ];

    let mut outcomes = Outcomes::default();
    scheduler.flush_events(None, Some(&mut outcomes));
    let denied: Vec<_> = outcomes
        .errors
        .iter()
        .map(|error| {
            assert_eq!(error.kind, AsyncErrorKind::PermissionDenied);
            error.request_ids.clone()
        })
        .collect();
    assert_eq!(denied, requests.into_iter().map(|id| vec![id]).collect::<Vec<_>>());
}

#[test]
fn test_add_component_reports_one_init() {
    let scheduler = scheduler();
    scheduler.connect("good?tick_rate=25");
    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();

    let entity = create_entity(&scheduler, &mut changes, &mut outcomes);
    let mut batch = NativeOptions::new();
    batch.add_component(entity, Counter { value: 1 });
    scheduler.enqueue_execution_options(&batch.as_options());

    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Init(entity, 1))
    }));
    // A few more ticks must not repeat it.
    thread::sleep(Duration::from_millis(80));
    scheduler.flush_events(Some(&mut changes), Some(&mut outcomes));

    let inits: Vec<_> = changes
        .0
        .iter()
        .filter(|change| matches!(change, Change::Init(..)))
        .collect();
    assert_eq!(inits, vec![&Change::Init(entity, 1)]);
    assert!(outcomes.errors.is_empty());
}

#[test]
fn test_init_update_remove_each_reported_once() {
    let scheduler = scheduler();
    scheduler.connect("good?tick_rate=25");
    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();
    let entity = create_entity(&scheduler, &mut changes, &mut outcomes);

    let mut add = NativeOptions::new();
    add.add_component(entity, Counter { value: 1 });
    scheduler.enqueue_execution_options(&add.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Init(entity, 1))
    }));

    let mut update = NativeOptions::new();
    update.update_component(entity, Counter { value: 6 });
    scheduler.enqueue_execution_options(&update.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Update(entity, 6))
    }));

    let mut remove = NativeOptions::new();
    remove.remove_component::<Counter>(entity);
    scheduler.enqueue_execution_options(&remove.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Remove(entity, 6))
    }));

    thread::sleep(Duration::from_millis(80));
    scheduler.flush_events(Some(&mut changes), Some(&mut outcomes));
    assert_eq!(
        changes.0,
        vec![
            Change::Init(entity, 1),
            Change::Update(entity, 6),
            Change::Remove(entity, 6),
        ]
    );
    assert!(outcomes.errors.is_empty());
}

#[test]
fn test_update_and_remove_enqueued_back_to_back() {
    let scheduler = scheduler();
    scheduler.connect("good?tick_rate=200");
    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();
    let entity = create_entity(&scheduler, &mut changes, &mut outcomes);

    let mut add = NativeOptions::new();
    add.add_component(entity, Counter { value: 1 });
    scheduler.enqueue_execution_options(&add.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Init(entity, 1))
    }));

    let mut update = NativeOptions::new();
    update.update_component(entity, Counter { value: 6 });
    let mut remove = NativeOptions::new();
    remove.remove_component::<Counter>(entity);
    scheduler.enqueue_execution_options(&update.as_options());
    scheduler.enqueue_execution_options(&remove.as_options());

    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Remove(entity, 6))
    }));
    assert_eq!(
        changes.0,
        vec![
            Change::Init(entity, 1),
            Change::Update(entity, 6),
            Change::Remove(entity, 6),
        ]
    );
    assert!(outcomes.errors.is_empty());
    assert_eq!(scheduler.state(), SessionState::Connected);
}

#[test]
fn test_same_tick_adds_conflict() {
    let scheduler = scheduler();
    scheduler.connect("good?tick_rate=200");
    // Let the first validation pass go by so both submissions share a bucket.
    thread::sleep(Duration::from_millis(20));

    let mut first = NativeOptions::new();
    first.add_component(Entity(1), Counter { value: 1 });
    let mut second = NativeOptions::new();
    second.add_component(Entity(1), Counter { value: 2 });
    let submissions = [
        scheduler.enqueue_execution_options(&first.as_options()),
        scheduler.enqueue_execution_options(&second.as_options()),
    ];

    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |_, o| {
        !o.errors.is_empty()
    }));
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |_, _| {
        scheduler.state() == SessionState::Disconnected
    }));
    scheduler.flush_events(Some(&mut changes), Some(&mut outcomes));

    assert_eq!(outcomes.errors.len(), 1);
    let error = &outcomes.errors[0];
    assert_eq!(error.kind, AsyncErrorKind::ExecutionMergeFailure);
    assert_eq!(error.request_ids.len(), 1);
    assert!(submissions.contains(&error.request_ids[0]));
    assert!(outcomes.failures.is_empty());
}

#[test]
fn test_unknown_host_is_denied_once_on_flush() {
    let scheduler = scheduler();
    let request = scheduler.connect("bad");

    let mut outcomes = Outcomes::default();
    scheduler.flush_events(None, Some(&mut outcomes));
    assert_eq!(
        outcomes.errors,
        vec![AsyncError::single(AsyncErrorKind::PermissionDenied, request)]
    );
    assert_eq!(outcomes.total(), 1);

    scheduler.flush_events(None, Some(&mut outcomes));
    assert_eq!(outcomes.total(), 1);
}

#[test]
fn test_unknown_host_then_request_denies_both() {
    let scheduler = scheduler();
    let connect = scheduler.connect("bad");
    let request = scheduler.create_entity();

    let mut outcomes = Outcomes::default();
    scheduler.flush_events(None, Some(&mut outcomes));
    assert_eq!(
        outcomes.errors,
        vec![
            AsyncError::single(AsyncErrorKind::PermissionDenied, connect),
            AsyncError::single(AsyncErrorKind::PermissionDenied, request),
        ]
    );
}

#[test]
fn test_tick_never_decreases() {
    let scheduler = scheduler();
    assert_eq!(scheduler.current_tick(), 0);
    scheduler.connect("good?tick_rate=2");

    let mut last = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while last < 10 && Instant::now() < deadline {
        let tick = scheduler.current_tick();
        assert!(tick >= last, "tick went from {last} to {tick}");
        last = tick;
        thread::sleep(Duration::from_millis(1));
    }
    assert!(last >= 10);

    scheduler.disconnect();
    let stopped = scheduler.current_tick();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(scheduler.current_tick(), stopped);
}

#[test]
fn test_actions_reach_systems() {
    let engine = InMemoryEngine::new().with_system("bump", |ctx| {
        let total: u32 = ctx.actions::<Bump>().map(|bump| bump.by).sum();
        if total == 0 {
            return Ok(());
        }
        for entity in ctx.entities_with::<Counter>() {
            let current = ctx.get::<Counter>(entity).map_or(0, |c| c.value);
            ctx.set(entity, Counter { value: current + total })
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    });
    let scheduler = AsyncScheduler::new(Arc::new(engine), codec());
    scheduler.connect("good?tick_rate=10");
    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();
    let entity = create_entity(&scheduler, &mut changes, &mut outcomes);

    let mut add = NativeOptions::new();
    add.add_component(entity, Counter { value: 1 });
    scheduler.enqueue_execution_options(&add.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Init(entity, 1))
    }));

    let mut bump = NativeOptions::new();
    bump.push_action(Bump { by: 2 }).push_action(Bump { by: 3 });
    scheduler.enqueue_execution_options(&bump.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Update(entity, 6))
    }));
    assert!(outcomes.errors.is_empty());
}

#[test]
fn test_created_and_destroyed_entities_in_batches() {
    let scheduler = scheduler();
    scheduler.connect("good?tick_rate=10");
    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();

    let mut spawn = NativeOptions::new();
    spawn.create_entity(Entity(1000)).with(Counter { value: 4 });
    scheduler.enqueue_execution_options(&spawn.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.iter().any(|change| matches!(change, Change::Created(_)))
    }));
    let Some(&Change::Created(entity)) = changes.0.iter().find(|c| matches!(c, Change::Created(_))) else {
        panic!("no entity created");
    };
    assert!(changes.0.contains(&Change::Init(entity, 4)));

    let mut destroy = NativeOptions::new();
    destroy.destroy_entity(entity);
    scheduler.enqueue_execution_options(&destroy.as_options());
    assert!(flush_until(&scheduler, &mut changes, &mut outcomes, |c, _| {
        c.0.contains(&Change::Destroyed(entity))
    }));
    assert!(changes.0.contains(&Change::Remove(entity, 4)));
}

#[test]
fn test_disconnect_drops_unflushed_events() {
    let engine = Arc::new(InMemoryEngine::new());
    let scheduler = AsyncScheduler::new(Arc::clone(&engine) as Arc<dyn ExecutionEngine>, codec());
    scheduler.connect("good?tick_rate=5");
    scheduler.create_entity();
    thread::sleep(Duration::from_millis(50));

    scheduler.disconnect();
    assert_eq!(engine.registry_count(), 0);

    let mut changes = Changes::default();
    let mut outcomes = Outcomes::default();
    scheduler.flush_events(Some(&mut changes), Some(&mut outcomes));
    assert_eq!(outcomes.total(), 0);
    assert!(changes.0.is_empty());
}

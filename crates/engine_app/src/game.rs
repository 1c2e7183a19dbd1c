//! Demo components, actions and systems.

use serde::{Deserialize, Serialize};

use engine_component::{Action, Codec, Component};
use engine_system::{InMemoryEngine, SystemContext};

/// Hit points of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Component for Health {
    fn type_name() -> &'static str {
        "Health"
    }
}

/// Tag for entities that regenerate every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regenerating;

impl Component for Regenerating {
    fn type_name() -> &'static str {
        "Regenerating"
    }
}

/// Damage dealt to every entity with [`Health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    pub amount: u32,
}

impl Action for Damage {
    fn type_name() -> &'static str {
        "Damage"
    }
}

/// Codec with every demo type registered.
pub fn codec() -> Codec {
    Codec::new()
        .with_component::<Health>()
        .with_component::<Regenerating>()
        .with_action::<Damage>()
}

/// Engine running the demo systems.
pub fn engine() -> InMemoryEngine {
    InMemoryEngine::new()
        .with_system("damage", damage)
        .with_system("regenerate", regenerate)
}

fn damage(ctx: &mut SystemContext<'_>) -> Result<(), String> {
    let total: u32 = ctx.actions::<Damage>().map(|damage| damage.amount).sum();
    if total == 0 {
        return Ok(());
    }
    for entity in ctx.entities_with::<Health>() {
        if let Some(health) = ctx.get::<Health>(entity) {
            let current = health.current.saturating_sub(total);
            ctx.set(entity, Health { current, ..health })
                .map_err(|err| err.to_string())?;
        }
    }
    Ok(())
}

fn regenerate(ctx: &mut SystemContext<'_>) -> Result<(), String> {
    for entity in ctx.entities_with::<Regenerating>() {
        let Some(health) = ctx.get::<Health>(entity) else {
            continue;
        };
        if health.current < health.max {
            ctx.set(
                entity,
                Health {
                    current: health.current + 1,
                    ..health
                },
            )
            .map_err(|err| err.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use engine_async::AsyncScheduler;
    use engine_component::{AnyValue, ComponentTypeId, Entity};
    use engine_system::{ExecutionCollector, NativeOptions};

    use super::*;

    #[derive(Default)]
    struct LastHealth(Option<u32>);

    impl ExecutionCollector for LastHealth {
        fn on_component_update(&mut self, _entity: Entity, _: ComponentTypeId, value: &dyn AnyValue) {
            if let Some(health) = value.downcast_ref::<Health>() {
                self.0 = Some(health.current);
            }
        }
    }

    #[test]
    fn test_damage_then_regenerate() {
        let scheduler = AsyncScheduler::new(Arc::new(engine()), codec());
        scheduler.connect("good?tick_rate=5");

        let mut spawn = NativeOptions::new();
        spawn
            .create_entity(Entity(1))
            .with(Health { current: 10, max: 10 })
            .with(Regenerating);
        scheduler.enqueue_execution_options(&spawn.as_options());

        let mut hit = NativeOptions::new();
        hit.push_action(Damage { amount: 4 });
        std::thread::sleep(Duration::from_millis(30));
        scheduler.enqueue_execution_options(&hit.as_options());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut last = LastHealth::default();
        while Instant::now() < deadline && last.0 != Some(10) {
            scheduler.flush_events(Some(&mut last), None);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(last.0, Some(10));
    }
}

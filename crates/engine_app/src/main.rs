//! # engine_app
//!
//! Drives the in-memory engine through an [`AsyncScheduler`]: connects with
//! the given connection string, spawns a few entities, deals damage every few
//! ticks and logs everything that comes back from `flush_events`.

mod game;
mod report;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine_async::{AsyncScheduler, SessionState};
use engine_component::Entity;
use engine_system::NativeOptions;

use game::{Damage, Health, Regenerating};
use report::{EventLog, ExecutionLog};

#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Run the ECS engine behind the async tick scheduler")]
struct Args {
    /// Connection string, `host?tick_rate=<ms>[&registry=<name>]`
    #[arg(short, long, env = "ENGINE_CONNECTION", default_value = "good?tick_rate=25")]
    connection: String,

    /// Number of ticks to run before disconnecting
    #[arg(short, long, default_value_t = 40)]
    ticks: u64,

    /// Time between two flushes, in milliseconds
    #[arg(short, long, default_value_t = 50)]
    flush_interval_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let args = Args::parse();
    info!(connection = %args.connection, ticks = args.ticks, "engine app starting");

    let scheduler = AsyncScheduler::new(Arc::new(game::engine()), game::codec());
    let mut events = EventLog::default();
    let mut changes = ExecutionLog::default();

    let request = scheduler.connect(&args.connection);
    scheduler.flush_events(None, Some(&mut events));
    if scheduler.state() != SessionState::Connected {
        bail!("connect request {request} failed: {:?}", events.errors);
    }

    let mut spawn = NativeOptions::new();
    for (placeholder, max) in [(1, 10), (2, 25), (3, 50)] {
        let created = spawn
            .create_entity(Entity(placeholder))
            .with(Health { current: max, max });
        if placeholder % 2 == 1 {
            created.with(Regenerating);
        }
    }
    scheduler.enqueue_execution_options(&spawn.as_options());
    scheduler.create_entity();

    let flush_interval = Duration::from_millis(args.flush_interval_ms);
    let mut last_hit = 0;
    while scheduler.current_tick() < args.ticks {
        let tick = scheduler.current_tick();
        if tick >= last_hit + 10 {
            let mut hit = NativeOptions::new();
            hit.push_action(Damage { amount: 3 });
            scheduler.enqueue_execution_options(&hit.as_options());
            last_hit = tick;
        }

        thread::sleep(flush_interval);
        scheduler.flush_events(Some(&mut changes), Some(&mut events));
        if scheduler.state() != SessionState::Connected {
            bail!("session stopped at tick {tick}: {:?}", events.errors);
        }
    }

    scheduler.disconnect();
    info!(
        ticks = scheduler.current_tick(),
        created = events.created,
        inits = changes.inits,
        updates = changes.updates,
        removes = changes.removes,
        "engine app shut down"
    );
    Ok(())
}

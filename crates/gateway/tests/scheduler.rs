//! Scheduler behavior over the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gort_data::{DataAccess, DataAccessHolder, DynDataAccess, MemoryDataAccess};
use gort_domain::{Bundle, BundleCommand, CommandRequest, Group, ScheduledCommand, User};
use gort_gateway::scheduler::Scheduler;
use tokio::sync::mpsc;

async fn seeded_holder() -> (Arc<DataAccessHolder>, DynDataAccess) {
    let da: DynDataAccess = Arc::new(MemoryDataAccess::new());
    let holder = Arc::new(DataAccessHolder::new());
    holder.install(da.clone()).await;

    let user = User {
        username: "jsmith".into(),
        email: "jsmith@example.com".into(),
        password_hash: gort_auth::hash_password("pw-pw-pw-pw!").unwrap(),
        ..User::default()
    };
    da.user_create(&user).await.unwrap();
    da.group_create(&Group { name: "ops".into() }).await.unwrap();
    da.group_user_add("ops", "jsmith").await.unwrap();
    da.role_create("runner").await.unwrap();
    da.group_role_add("ops", "runner").await.unwrap();
    da.role_permission_add("runner", "tick", "can_tick").await.unwrap();

    let mut commands = HashMap::new();
    commands.insert(
        "tick".to_owned(),
        BundleCommand {
            name: "tick".into(),
            description: "tick".into(),
            executable: vec!["/bin/true".into()],
            rules: vec!["must have tick:can_tick".into()],
            ..BundleCommand::default()
        },
    );
    da.bundle_create(&Bundle {
        gort_bundle_version: 1,
        name: "tick".into(),
        version: "1.0.0".into(),
        description: "tick bundle".into(),
        commands,
        ..Bundle::default()
    })
    .await
    .unwrap();
    da.bundle_enable("tick", "1.0.0").await.unwrap();

    (holder, da)
}

fn schedule(cron: &str) -> ScheduledCommand {
    ScheduledCommand {
        schedule_id: 0,
        cron: cron.into(),
        command: "tick:tick".into(),
        adapter: "slack".into(),
        channel_id: "C1".into(),
        user_id: "U1".into(),
        user_email: "jsmith@example.com".into(),
        user_name: "jsmith".into(),
    }
}

#[tokio::test]
async fn every_second_schedules_fire_at_least_once_per_second() {
    let (holder, _da) = seeded_holder().await;
    let (tx, mut rx) = mpsc::channel::<CommandRequest>(100);
    let scheduler = Arc::new(Scheduler::new(holder, tx));

    let n: u64 = 3;
    for _ in 0..n {
        scheduler.create(&mut schedule("@every 1s")).await.unwrap();
    }
    let runner = tokio::spawn(scheduler.clone().run());

    // n schedules at 1s cadence: after n seconds (+ slack) at least n
    // fires must have crossed the channel.
    tokio::time::sleep(Duration::from_millis(n * 1_000 + 600)).await;
    runner.abort();

    let mut fired: u64 = 0;
    while let Ok(request) = rx.try_recv() {
        assert_ne!(request.request_id, 0, "fires are begun before emission");
        assert_eq!(request.entry.command.name, "tick");
        assert_eq!(request.user_name, "jsmith");
        fired += 1;
    }
    assert!(fired >= n, "expected at least {n} fires, saw {fired}");
}

#[tokio::test]
async fn cancel_halts_further_fires() {
    let (holder, da) = seeded_holder().await;
    let (tx, mut rx) = mpsc::channel::<CommandRequest>(100);
    let scheduler = Arc::new(Scheduler::new(holder, tx));

    let mut sched = schedule("@every 1s");
    let id = scheduler.create(&mut sched).await.unwrap();
    let runner = tokio::spawn(scheduler.clone().run());

    tokio::time::sleep(Duration::from_millis(1_300)).await;
    scheduler.cancel(id).await.unwrap();
    // Drain anything emitted up to (and within one tick of) the cancel.
    while rx.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    runner.abort();
    assert!(rx.try_recv().is_err(), "no fires after cancel");

    // The durable row is gone too.
    assert!(da.schedules_get().await.unwrap().is_empty());
}

#[tokio::test]
async fn bad_cron_expressions_are_rejected_at_create() {
    let (holder, _da) = seeded_holder().await;
    let (tx, _rx) = mpsc::channel::<CommandRequest>(100);
    let scheduler = Scheduler::new(holder, tx);

    assert!(scheduler.create(&mut schedule("not a cron")).await.is_err());
    assert!(scheduler.create(&mut schedule("@every bogus")).await.is_err());
}

#[tokio::test]
async fn hydrate_registers_rows_and_skips_unresolvable_commands() {
    let (holder, da) = seeded_holder().await;
    let (tx, _rx) = mpsc::channel::<CommandRequest>(100);

    // Two durable rows: one resolvable, one pointing at a command that
    // no longer exists.
    let mut good = schedule("@every 1m");
    da.schedule_create(&mut good).await.unwrap();
    let mut stale = schedule("@every 1m");
    stale.command = "gone:gone".into();
    da.schedule_create(&mut stale).await.unwrap();

    let scheduler = Scheduler::new(holder, tx);
    let registered = scheduler.hydrate().await.unwrap();
    assert_eq!(registered, 1);
    assert_eq!(scheduler.job_ids(), vec![good.schedule_id]);

    // The unresolvable row stays durable for a later retry.
    let rows = da.schedules_get().await.unwrap();
    assert!(rows.iter().any(|s| s.schedule_id == stale.schedule_id));
}

#[tokio::test]
async fn hydrating_twice_rejects_duplicate_tags() {
    let (holder, da) = seeded_holder().await;
    let (tx, _rx) = mpsc::channel::<CommandRequest>(100);

    let mut row = schedule("@every 1m");
    da.schedule_create(&mut row).await.unwrap();

    let scheduler = Scheduler::new(holder, tx);
    assert_eq!(scheduler.hydrate().await.unwrap(), 1);
    // Same rows again: every tag already lives in the wheel.
    assert_eq!(scheduler.hydrate().await.unwrap(), 0);
    assert_eq!(scheduler.job_ids().len(), 1);
}

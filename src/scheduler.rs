use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{Local, NaiveDateTime, Timelike, Utc};
use log::{error, info, warn};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    schedule::{Schedule, ScheduleStore},
    tracker::{PortfolioTracker, RunStatus},
};

/// Polls the schedule store and runs the tracker for schedules whose minute has come.
pub struct Scheduler {
    tracker: Arc<PortfolioTracker>,
    store: Arc<ScheduleStore>,
    tick: Duration,
    fired: Mutex<HashMap<u64, NaiveDateTime>>,
}

impl Scheduler {
    pub fn new(tracker: Arc<PortfolioTracker>, store: Arc<ScheduleStore>, tick: Duration) -> Scheduler {
        Scheduler {
            tracker,
            store,
            tick,
            fired: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(&self) {
        info!("Scheduler started, checking every {}s", self.tick.as_secs());
        let mut ticks = interval(self.tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            self.tick(Local::now().naive_local()).await;
        }
    }

    /// Starts every schedule due at `now` that has not fired in this minute yet.
    /// Runs proceed in their own tasks, so a slow run never holds up the next tick.
    pub async fn tick(&self, now: NaiveDateTime) -> Vec<(u64, JoinHandle<RunStatus>)> {
        let minute = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let due = self.store.due(now).await;

        let mut fired = self.fired.lock().await;
        fired.retain(|_, at| *at == minute);

        let mut started = vec![];
        for schedule in due {
            if fired.get(&schedule.id) == Some(&minute) {
                continue;
            }
            fired.insert(schedule.id, minute);

            info!("Running schedule {} ({})", schedule.id, schedule.name);
            let id = schedule.id;
            let task = tokio::spawn(run_schedule(self.tracker.clone(), self.store.clone(), schedule));
            started.push((id, task));
        }
        started
    }
}

async fn run_schedule(tracker: Arc<PortfolioTracker>, store: Arc<ScheduleStore>, schedule: Schedule) -> RunStatus {
    let report = tracker.run_selected(&schedule.selected_sources).await;
    match report.status {
        RunStatus::Success | RunStatus::PartialSuccess => {
            if let Err(e) = store.mark_run(schedule.id, Utc::now()).await {
                warn!("Could not record run of schedule {}: {}", schedule.id, e);
            }
        }
        _ => error!(
            "Scheduled update {} finished with {:?}: {}",
            schedule.id, report.status, report.message
        ),
    }
    report.status
}

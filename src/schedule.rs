use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound(u64),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Daily,
    Weekly,
}

/// A recurring tracker run. `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub id: u64,
    pub name: String,
    pub schedule_type: ScheduleType,
    #[serde(serialize_with = "serialize_hhmm")]
    pub time: NaiveTime,
    pub day_of_week: Option<u8>,
    pub selected_sources: Vec<String>,
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn serialize_hhmm<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format("%H:%M"))
}

impl Schedule {
    /// True when the wall clock `now` falls inside this schedule's minute.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        if !self.active || now.hour() != self.time.hour() || now.minute() != self.time.minute() {
            return false;
        }
        match self.schedule_type {
            ScheduleType::Daily => true,
            ScheduleType::Weekly => {
                self.day_of_week == Some(now.weekday().num_days_from_monday() as u8)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub name: String,
    pub schedule_type: ScheduleType,
    pub time: String,
    #[serde(default)]
    pub day_of_week: Option<u8>,
    pub selected_sources: Vec<String>,
}

/// Partial update; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub schedule_type: Option<ScheduleType>,
    pub time: Option<String>,
    pub day_of_week: Option<u8>,
    pub selected_sources: Option<Vec<String>>,
    pub active: Option<bool>,
}

fn parse_time(time: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| ScheduleError::Invalid(format!("Invalid time '{}', expected HH:MM", time)))
}

fn validate(schedule: &Schedule) -> Result<(), ScheduleError> {
    if schedule.name.trim().is_empty() {
        return Err(ScheduleError::Invalid("Schedule name must not be empty".to_owned()));
    }
    if schedule.selected_sources.is_empty() {
        return Err(ScheduleError::Invalid("At least one source must be selected".to_owned()));
    }
    match schedule.day_of_week {
        Some(day) if day > 6 => Err(ScheduleError::Invalid(format!(
            "Invalid day_of_week {}, expected 0-6",
            day
        ))),
        None if schedule.schedule_type == ScheduleType::Weekly => Err(ScheduleError::Invalid(
            "Weekly schedules need a day_of_week".to_owned(),
        )),
        _ => Ok(()),
    }
}

#[derive(Default)]
struct Schedules {
    entries: BTreeMap<u64, Schedule>,
    last_id: u64,
}

/// In-memory schedule table shared by the API and the scheduler.
#[derive(Default)]
pub struct ScheduleStore {
    schedules: RwLock<Schedules>,
}

impl ScheduleStore {
    pub fn new() -> ScheduleStore {
        ScheduleStore::default()
    }

    pub async fn create(&self, new: NewSchedule) -> Result<Schedule, ScheduleError> {
        let now = Utc::now();
        let mut schedule = Schedule {
            id: 0,
            name: new.name,
            schedule_type: new.schedule_type,
            time: parse_time(&new.time)?,
            day_of_week: new.day_of_week,
            selected_sources: new.selected_sources,
            active: true,
            last_run: None,
            created_at: now,
            updated_at: now,
        };
        validate(&schedule)?;

        let mut schedules = self.schedules.write().await;
        schedules.last_id += 1;
        schedule.id = schedules.last_id;
        schedules.entries.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    pub async fn list(&self) -> Vec<Schedule> {
        self.schedules.read().await.entries.values().cloned().collect()
    }

    pub async fn get(&self, id: u64) -> Result<Schedule, ScheduleError> {
        self.schedules
            .read()
            .await
            .entries
            .get(&id)
            .cloned()
            .ok_or(ScheduleError::NotFound(id))
    }

    pub async fn update(&self, id: u64, update: ScheduleUpdate) -> Result<Schedule, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        let current = schedules.entries.get(&id).ok_or(ScheduleError::NotFound(id))?;

        let mut schedule = current.clone();
        if let Some(name) = update.name {
            schedule.name = name;
        }
        if let Some(schedule_type) = update.schedule_type {
            schedule.schedule_type = schedule_type;
        }
        if let Some(time) = update.time {
            schedule.time = parse_time(&time)?;
        }
        if let Some(day) = update.day_of_week {
            schedule.day_of_week = Some(day);
        }
        if let Some(sources) = update.selected_sources {
            schedule.selected_sources = sources;
        }
        if let Some(active) = update.active {
            schedule.active = active;
        }
        validate(&schedule)?;
        schedule.updated_at = Utc::now();

        schedules.entries.insert(id, schedule.clone());
        Ok(schedule)
    }

    pub async fn delete(&self, id: u64) -> Result<Schedule, ScheduleError> {
        self.schedules
            .write()
            .await
            .entries
            .remove(&id)
            .ok_or(ScheduleError::NotFound(id))
    }

    pub async fn mark_run(&self, id: u64, at: DateTime<Utc>) -> Result<(), ScheduleError> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules.entries.get_mut(&id).ok_or(ScheduleError::NotFound(id))?;
        schedule.last_run = Some(at);
        Ok(())
    }

    pub async fn due(&self, now: NaiveDateTime) -> Vec<Schedule> {
        self.schedules
            .read()
            .await
            .entries
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect()
    }
}

//! crates/plan_sync_core/src/query.rs
//!
//! Read-only views derived from the caller's plans.

use chrono::{Datelike, Local, NaiveDate, Weekday};

use crate::domain::WorkoutPlan;
use crate::engine::PlanEngine;
use crate::error::EngineResult;

/// English day name as stored in `Day::day_name`.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

impl PlanEngine {
    /// The caller's plans with real work scheduled on `day` (any casing).
    pub async fn plans_for_weekday(&self, day: &str) -> EngineResult<Vec<WorkoutPlan>> {
        let day = day.trim();
        Ok(self
            .list_own()
            .await?
            .into_iter()
            .filter(|plan| plan.trains_on(day))
            .collect())
    }

    pub async fn plans_for_date(&self, date: NaiveDate) -> EngineResult<Vec<WorkoutPlan>> {
        self.plans_for_weekday(weekday_name(date.weekday())).await
    }

    /// Plans for the current day of the device's local calendar.
    pub async fn plans_for_today(&self) -> EngineResult<Vec<WorkoutPlan>> {
        self.plans_for_date(Local::now().date_naive()).await
    }
}

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

pub const WORKOUT_LIMIT: i64 = 50;
pub const SLEEP_LIMIT: i64 = 30;
pub const NUTRITION_LIMIT: i64 = 50;
pub const INSIGHT_LIMIT: i64 = 20;
pub const NOTIFICATION_LIMIT: i64 = 30;

/// Glasses of water per day assumed when no hydration row exists.
pub const DEFAULT_HYDRATION_GOAL: i64 = 8;

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

/// Which rows a query may see.
///
/// `Global` is the default tenant used when no user is signed in: it covers
/// exactly the rows whose `user_id` is NULL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    User(String),
    Global,
}

impl Scope {
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            Self::Global => None,
        }
    }

    /// Non-null rendering of the scope, covered by UNIQUE constraints on
    /// single-row-per-scope tables.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Global => "global".to_string(),
        }
    }
}

impl From<Option<&str>> for Scope {
    fn from(user_id: Option<&str>) -> Self {
        user_id.map_or(Self::Global, |id| Self::User(id.to_string()))
    }
}

impl From<Option<String>> for Scope {
    fn from(user_id: Option<String>) -> Self {
        user_id.map_or(Self::Global, Self::User)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user {id}"),
            Self::Global => f.write_str("global scope"),
        }
    }
}

// --- Enums stored as TEXT ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

impl Intensity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl FromStr for Intensity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            _ => bail!("Invalid intensity '{s}'. Must be one of: low, moderate, high"),
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Intensity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Intensity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

impl FromStr for Units {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            _ => bail!("Invalid units '{s}'. Must be one of: metric, imperial"),
        }
    }
}

impl ToSql for Units {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Units {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

// --- Users ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub display_name: Option<String>,
}

// --- Workouts ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub id: i64,
    pub user_id: Option<String>,
    pub workout_type: String,
    pub icon: String,
    pub duration_minutes: i64,
    pub calories: i64,
    pub date: NaiveDate,
    pub intensity: Intensity,
    pub avg_heart_rate: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub user_id: Option<String>,
    pub workout_type: String,
    pub icon: String,
    pub duration_minutes: i64,
    pub calories: i64,
    pub date: NaiveDate,
    pub intensity: Intensity,
    pub avg_heart_rate: Option<i64>,
}

// --- Body measurements ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyMeasurement {
    pub id: i64,
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub chest_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hips_cm: Option<f64>,
    pub arm_cm: Option<f64>,
    pub thigh_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewBodyMeasurement {
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub chest_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hips_cm: Option<f64>,
    pub arm_cm: Option<f64>,
    pub thigh_cm: Option<f64>,
    pub notes: Option<String>,
}

// --- Goals ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goals {
    pub id: i64,
    pub user_id: Option<String>,
    pub daily_steps: Option<i64>,
    pub daily_calories: Option<i64>,
    pub weekly_workouts: Option<i64>,
    pub target_weight_kg: Option<f64>,
    pub daily_water_glasses: Option<i64>,
    pub sleep_hours: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewGoals {
    pub user_id: Option<String>,
    pub daily_steps: Option<i64>,
    pub daily_calories: Option<i64>,
    pub weekly_workouts: Option<i64>,
    pub target_weight_kg: Option<f64>,
    pub daily_water_glasses: Option<i64>,
    pub sleep_hours: Option<f64>,
}

impl NewGoals {
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::from(self.user_id.as_deref())
    }
}

// --- Hydration ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationLog {
    pub id: i64,
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub glasses: i64,
    pub goal: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A day's hydration as seen by readers; `id` is absent when nothing was
/// logged and the default was synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationDay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub glasses: i64,
    pub goal: i64,
}

impl HydrationDay {
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            id: None,
            date,
            glasses: 0,
            goal: DEFAULT_HYDRATION_GOAL,
        }
    }
}

impl From<HydrationLog> for HydrationDay {
    fn from(log: HydrationLog) -> Self {
        Self {
            id: Some(log.id),
            date: log.date,
            glasses: log.glasses,
            goal: log.goal,
        }
    }
}

// --- Sleep ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub duration_minutes: i64,
    pub quality: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewSleepEntry {
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub duration_minutes: i64,
    pub quality: Option<i64>,
    pub bedtime: Option<String>,
    pub wake_time: Option<String>,
    pub notes: Option<String>,
}

// --- Nutrition ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub meal_type: String,
    pub name: String,
    pub calories: i64,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewNutritionEntry {
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub meal_type: String,
    pub name: String,
    pub calories: i64,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
}

// --- Insights & notifications ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiInsight {
    pub id: i64,
    pub user_id: Option<String>,
    pub category: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewInsight {
    pub user_id: Option<String>,
    pub category: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub message: String,
}

// --- Preferences ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub id: i64,
    pub user_id: Option<String>,
    pub units: Units,
    pub theme: String,
    pub notifications_enabled: bool,
    pub reminder_time: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPreferences {
    pub units: Units,
    pub theme: String,
    pub notifications_enabled: bool,
    pub reminder_time: Option<String>,
}

impl Default for NewPreferences {
    fn default() -> Self {
        Self {
            units: Units::Metric,
            theme: "system".to_string(),
            notifications_enabled: true,
            reminder_time: None,
        }
    }
}

// --- Validation ---
//
// The storage layer trusts its callers; request handlers run these first.

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(_) => bail!("Invalid date '{s}'. Use YYYY-MM-DD"),
    }
}

pub fn validate_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        bail!("username must not be empty");
    }
    if trimmed.len() > 64 {
        bail!("username must be at most 64 characters");
    }
    if trimmed.chars().any(char::is_whitespace) {
        bail!("username must not contain whitespace");
    }
    Ok(trimmed.to_string())
}

pub fn validate_new_workout(workout: &NewWorkout) -> Result<()> {
    if workout.workout_type.trim().is_empty() {
        bail!("workout_type must not be empty");
    }
    if workout.duration_minutes <= 0 {
        bail!("duration_minutes must be greater than 0");
    }
    if workout.calories < 0 {
        bail!("calories must not be negative");
    }
    if let Some(hr) = workout.avg_heart_rate {
        if !(20..=250).contains(&hr) {
            bail!("avg_heart_rate must be between 20 and 250 (got {hr})");
        }
    }
    Ok(())
}

pub fn validate_body_measurement(m: &NewBodyMeasurement) -> Result<()> {
    let fields = [
        ("weight_kg", m.weight_kg),
        ("body_fat_pct", m.body_fat_pct),
        ("chest_cm", m.chest_cm),
        ("waist_cm", m.waist_cm),
        ("hips_cm", m.hips_cm),
        ("arm_cm", m.arm_cm),
        ("thigh_cm", m.thigh_cm),
    ];
    if fields.iter().all(|(_, v)| v.is_none()) {
        bail!("At least one measurement must be provided");
    }
    for (name, value) in fields {
        if value.is_some_and(|v| v <= 0.0) {
            bail!("{name} must be greater than 0");
        }
    }
    if m.body_fat_pct.is_some_and(|v| v >= 100.0) {
        bail!("body_fat_pct must be below 100");
    }
    Ok(())
}

pub fn validate_sleep_entry(entry: &NewSleepEntry) -> Result<()> {
    if !(1..=24 * 60).contains(&entry.duration_minutes) {
        bail!("duration_minutes must be between 1 and 1440");
    }
    if let Some(q) = entry.quality {
        if !(1..=10).contains(&q) {
            bail!("quality must be between 1 and 10 (got {q})");
        }
    }
    Ok(())
}

pub fn validate_goals(goals: &NewGoals) -> Result<()> {
    let counts = [
        ("daily_steps", goals.daily_steps),
        ("daily_calories", goals.daily_calories),
        ("weekly_workouts", goals.weekly_workouts),
        ("daily_water_glasses", goals.daily_water_glasses),
    ];
    for (name, value) in counts {
        if value.is_some_and(|v| v < 0) {
            bail!("{name} must not be negative");
        }
    }
    if goals.target_weight_kg.is_some_and(|v| v <= 0.0) {
        bail!("target_weight_kg must be greater than 0");
    }
    if goals.sleep_hours.is_some_and(|v| !(0.0..=24.0).contains(&v)) {
        bail!("sleep_hours must be between 0 and 24");
    }
    Ok(())
}

pub fn validate_glasses(glasses: i64) -> Result<()> {
    if glasses < 0 {
        bail!("glasses must not be negative");
    }
    Ok(())
}

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    AiInsight, BodyMeasurement, DEFAULT_HYDRATION_GOAL, Goals, HydrationDay, HydrationLog,
    INSIGHT_LIMIT, NOTIFICATION_LIMIT, NUTRITION_LIMIT, NewBodyMeasurement, NewGoals, NewInsight,
    NewNotification, NewNutritionEntry, NewPreferences, NewSleepEntry, NewUser, NewWorkout,
    Notification, NutritionEntry, SLEEP_LIMIT, Scope, SleepEntry, User, UserPreference,
    WORKOUT_LIMIT, Workout,
};

const SCHEMA_VERSION: i64 = 1;

const USER_COLUMNS: &str = "id, username, display_name, created_at";
const WORKOUT_COLUMNS: &str = "id, user_id, workout_type, icon, duration_minutes, calories, date, intensity, avg_heart_rate, created_at";
const MEASUREMENT_COLUMNS: &str = "id, user_id, date, weight_kg, body_fat_pct, chest_cm, waist_cm, hips_cm, arm_cm, thigh_cm, notes, created_at";
const GOALS_COLUMNS: &str = "id, user_id, daily_steps, daily_calories, weekly_workouts, target_weight_kg, daily_water_glasses, sleep_hours, created_at, updated_at";
const HYDRATION_COLUMNS: &str = "id, user_id, date, glasses, goal, created_at, updated_at";
const SLEEP_COLUMNS: &str =
    "id, user_id, date, duration_minutes, quality, bedtime, wake_time, notes, created_at";
const NUTRITION_COLUMNS: &str =
    "id, user_id, date, meal_type, name, calories, protein_g, carbs_g, fat_g, created_at";
const INSIGHT_COLUMNS: &str = "id, user_id, category, title, body, read, created_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, read, created_at";
const PREFERENCE_COLUMNS: &str =
    "id, user_id, units, theme, notifications_enabled, reminder_time, created_at, updated_at";

/// Current time as an RFC 3339 UTC string. Microsecond precision keeps
/// lexical and chronological order identical.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// True when `err` is a store error from a violated UNIQUE (or other)
/// constraint, e.g. a duplicate username.
#[must_use]
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<rusqlite::Error>()
        .and_then(rusqlite::Error::sqlite_error_code)
        .is_some_and(|code| code == rusqlite::ErrorCode::ConstraintViolation)
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            debug!(from = version, to = SCHEMA_VERSION, "migrating database schema");
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY NOT NULL,
                    username TEXT NOT NULL UNIQUE,
                    display_name TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    workout_type TEXT NOT NULL,
                    icon TEXT NOT NULL,
                    duration_minutes INTEGER NOT NULL,
                    calories INTEGER NOT NULL,
                    date TEXT NOT NULL,
                    intensity TEXT NOT NULL CHECK (intensity IN ('low', 'moderate', 'high')),
                    avg_heart_rate INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS body_measurements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    date TEXT NOT NULL,
                    weight_kg REAL,
                    body_fat_pct REAL,
                    chest_cm REAL,
                    waist_cm REAL,
                    hips_cm REAL,
                    arm_cm REAL,
                    thigh_cm REAL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scope_key TEXT NOT NULL UNIQUE,
                    user_id TEXT,
                    daily_steps INTEGER,
                    daily_calories INTEGER,
                    weekly_workouts INTEGER,
                    target_weight_kg REAL,
                    daily_water_glasses INTEGER,
                    sleep_hours REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS hydration_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scope_key TEXT NOT NULL,
                    user_id TEXT,
                    date TEXT NOT NULL,
                    glasses INTEGER NOT NULL DEFAULT 0,
                    goal INTEGER NOT NULL DEFAULT 8,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (scope_key, date)
                );

                CREATE TABLE IF NOT EXISTS sleep_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    date TEXT NOT NULL,
                    duration_minutes INTEGER NOT NULL,
                    quality INTEGER,
                    bedtime TEXT,
                    wake_time TEXT,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS nutrition_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    date TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    calories INTEGER NOT NULL,
                    protein_g REAL,
                    carbs_g REAL,
                    fat_g REAL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ai_insights (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    category TEXT NOT NULL,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    kind TEXT NOT NULL,
                    title TEXT NOT NULL,
                    message TEXT NOT NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_preferences (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scope_key TEXT NOT NULL UNIQUE,
                    user_id TEXT,
                    units TEXT NOT NULL DEFAULT 'metric',
                    theme TEXT NOT NULL DEFAULT 'system',
                    notifications_enabled INTEGER NOT NULL DEFAULT 1,
                    reminder_time TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_workouts_user ON workouts(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_measurements_user ON body_measurements(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_sleep_user ON sleep_entries(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_nutrition_user ON nutrition_entries(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_insights_user ON ai_insights(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn workout_from_row(row: &rusqlite::Row) -> rusqlite::Result<Workout> {
        Ok(Workout {
            id: row.get(0)?,
            user_id: row.get(1)?,
            workout_type: row.get(2)?,
            icon: row.get(3)?,
            duration_minutes: row.get(4)?,
            calories: row.get(5)?,
            date: row.get(6)?,
            intensity: row.get(7)?,
            avg_heart_rate: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn measurement_from_row(row: &rusqlite::Row) -> rusqlite::Result<BodyMeasurement> {
        Ok(BodyMeasurement {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            weight_kg: row.get(3)?,
            body_fat_pct: row.get(4)?,
            chest_cm: row.get(5)?,
            waist_cm: row.get(6)?,
            hips_cm: row.get(7)?,
            arm_cm: row.get(8)?,
            thigh_cm: row.get(9)?,
            notes: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn goals_from_row(row: &rusqlite::Row) -> rusqlite::Result<Goals> {
        Ok(Goals {
            id: row.get(0)?,
            user_id: row.get(1)?,
            daily_steps: row.get(2)?,
            daily_calories: row.get(3)?,
            weekly_workouts: row.get(4)?,
            target_weight_kg: row.get(5)?,
            daily_water_glasses: row.get(6)?,
            sleep_hours: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn hydration_from_row(row: &rusqlite::Row) -> rusqlite::Result<HydrationLog> {
        Ok(HydrationLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            glasses: row.get(3)?,
            goal: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn sleep_from_row(row: &rusqlite::Row) -> rusqlite::Result<SleepEntry> {
        Ok(SleepEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            duration_minutes: row.get(3)?,
            quality: row.get(4)?,
            bedtime: row.get(5)?,
            wake_time: row.get(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn nutrition_from_row(row: &rusqlite::Row) -> rusqlite::Result<NutritionEntry> {
        Ok(NutritionEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            meal_type: row.get(3)?,
            name: row.get(4)?,
            calories: row.get(5)?,
            protein_g: row.get(6)?,
            carbs_g: row.get(7)?,
            fat_g: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn insight_from_row(row: &rusqlite::Row) -> rusqlite::Result<AiInsight> {
        Ok(AiInsight {
            id: row.get(0)?,
            user_id: row.get(1)?,
            category: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            read: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn notification_from_row(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        Ok(Notification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            message: row.get(4)?,
            read: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn preference_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserPreference> {
        Ok(UserPreference {
            id: row.get(0)?,
            user_id: row.get(1)?,
            units: row.get(2)?,
            theme: row.get(3)?,
            notifications_enabled: row.get(4)?,
            reminder_time: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    /// Newest-first rows of `table` visible to `scope`, at most `limit`.
    /// `user_id IS ?` matches NULL for the global scope.
    fn list_scoped<T>(
        &self,
        columns: &str,
        table: &str,
        scope: &Scope,
        limit: Option<i64>,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {columns} FROM {table}
             WHERE user_id IS ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![scope.user_id(), limit.unwrap_or(-1)], map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Users ---

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Fails with the store's UNIQUE violation when the username is taken.
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        self.conn.execute(
            "INSERT INTO users (id, username, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, user.username, user.display_name, created_at],
        )?;
        Ok(User {
            id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            created_at,
        })
    }

    // --- Workouts ---

    pub fn get_workouts(&self, scope: &Scope) -> Result<Vec<Workout>> {
        self.list_scoped(
            WORKOUT_COLUMNS,
            "workouts",
            scope,
            Some(WORKOUT_LIMIT),
            Self::workout_from_row,
        )
    }

    pub fn get_workout(&self, id: i64) -> Result<Option<Workout>> {
        let workout = self
            .conn
            .query_row(
                &format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = ?1"),
                params![id],
                Self::workout_from_row,
            )
            .optional()?;
        Ok(workout)
    }

    pub fn create_workout(&self, workout: &NewWorkout) -> Result<Workout> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO workouts (user_id, workout_type, icon, duration_minutes, calories, date, intensity, avg_heart_rate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                workout.user_id,
                workout.workout_type,
                workout.icon,
                workout.duration_minutes,
                workout.calories,
                workout.date,
                workout.intensity,
                workout.avg_heart_rate,
                created_at,
            ],
        )?;
        Ok(Workout {
            id: self.conn.last_insert_rowid(),
            user_id: workout.user_id.clone(),
            workout_type: workout.workout_type.clone(),
            icon: workout.icon.clone(),
            duration_minutes: workout.duration_minutes,
            calories: workout.calories,
            date: workout.date,
            intensity: workout.intensity,
            avg_heart_rate: workout.avg_heart_rate,
            created_at,
        })
    }

    /// Deleting a missing id is not an error.
    pub fn delete_workout(&self, id: i64) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM workouts WHERE id = ?1", params![id])?;
        debug!(id, rows, "deleted workout");
        Ok(())
    }

    // --- Body measurements ---

    pub fn get_body_measurements(&self, scope: &Scope) -> Result<Vec<BodyMeasurement>> {
        self.list_scoped(
            MEASUREMENT_COLUMNS,
            "body_measurements",
            scope,
            None,
            Self::measurement_from_row,
        )
    }

    pub fn create_body_measurement(&self, m: &NewBodyMeasurement) -> Result<BodyMeasurement> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO body_measurements (user_id, date, weight_kg, body_fat_pct, chest_cm, waist_cm, hips_cm, arm_cm, thigh_cm, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                m.user_id,
                m.date,
                m.weight_kg,
                m.body_fat_pct,
                m.chest_cm,
                m.waist_cm,
                m.hips_cm,
                m.arm_cm,
                m.thigh_cm,
                m.notes,
                created_at,
            ],
        )?;
        Ok(BodyMeasurement {
            id: self.conn.last_insert_rowid(),
            user_id: m.user_id.clone(),
            date: m.date,
            weight_kg: m.weight_kg,
            body_fat_pct: m.body_fat_pct,
            chest_cm: m.chest_cm,
            waist_cm: m.waist_cm,
            hips_cm: m.hips_cm,
            arm_cm: m.arm_cm,
            thigh_cm: m.thigh_cm,
            notes: m.notes.clone(),
            created_at,
        })
    }

    // --- Goals ---

    pub fn get_goals(&self, scope: &Scope) -> Result<Option<Goals>> {
        let goals = self
            .conn
            .query_row(
                &format!("SELECT {GOALS_COLUMNS} FROM goals WHERE scope_key = ?1"),
                params![scope.key()],
                Self::goals_from_row,
            )
            .optional()?;
        Ok(goals)
    }

    /// Inserts the scope's goals row or updates it in place. Fields left as
    /// `None` keep their stored value on update.
    pub fn upsert_goals(&self, goals: &NewGoals) -> Result<Goals> {
        let scope = goals.scope();
        let now = now();
        self.conn.execute(
            "INSERT INTO goals (scope_key, user_id, daily_steps, daily_calories, weekly_workouts, target_weight_kg, daily_water_glasses, sleep_hours, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(scope_key) DO UPDATE SET
                daily_steps = COALESCE(excluded.daily_steps, goals.daily_steps),
                daily_calories = COALESCE(excluded.daily_calories, goals.daily_calories),
                weekly_workouts = COALESCE(excluded.weekly_workouts, goals.weekly_workouts),
                target_weight_kg = COALESCE(excluded.target_weight_kg, goals.target_weight_kg),
                daily_water_glasses = COALESCE(excluded.daily_water_glasses, goals.daily_water_glasses),
                sleep_hours = COALESCE(excluded.sleep_hours, goals.sleep_hours),
                updated_at = excluded.updated_at",
            params![
                scope.key(),
                scope.user_id(),
                goals.daily_steps,
                goals.daily_calories,
                goals.weekly_workouts,
                goals.target_weight_kg,
                goals.daily_water_glasses,
                goals.sleep_hours,
                now,
            ],
        )?;
        debug!(%scope, "upserted goals");
        self.get_goals(&scope)?
            .context("Goals not found after upsert")
    }

    // --- Hydration ---

    /// The logged row for the day, or an empty day with the default goal.
    pub fn get_hydration(&self, scope: &Scope, date: NaiveDate) -> Result<HydrationDay> {
        Ok(self
            .get_hydration_log(scope, date)?
            .map_or_else(|| HydrationDay::empty(date), HydrationDay::from))
    }

    fn get_hydration_log(&self, scope: &Scope, date: NaiveDate) -> Result<Option<HydrationLog>> {
        let log = self
            .conn
            .query_row(
                &format!(
                    "SELECT {HYDRATION_COLUMNS} FROM hydration_logs WHERE scope_key = ?1 AND date = ?2"
                ),
                params![scope.key(), date],
                Self::hydration_from_row,
            )
            .optional()?;
        Ok(log)
    }

    pub fn log_hydration(&self, scope: &Scope, date: NaiveDate, glasses: i64) -> Result<HydrationLog> {
        let now = now();
        self.conn.execute(
            "INSERT INTO hydration_logs (scope_key, user_id, date, glasses, goal, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(scope_key, date) DO UPDATE SET
                glasses = excluded.glasses,
                updated_at = excluded.updated_at",
            params![
                scope.key(),
                scope.user_id(),
                date,
                glasses,
                DEFAULT_HYDRATION_GOAL,
                now,
            ],
        )?;
        debug!(%scope, %date, glasses, "logged hydration");
        self.get_hydration_log(scope, date)?
            .context("Hydration log not found after upsert")
    }

    pub fn hydration_history(&self, scope: &Scope, days: i64) -> Result<Vec<HydrationLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HYDRATION_COLUMNS} FROM hydration_logs
             WHERE scope_key = ?1
             ORDER BY date DESC
             LIMIT ?2"
        ))?;
        let logs = stmt
            .query_map(params![scope.key(), days], Self::hydration_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    // --- Sleep ---

    pub fn get_sleep_entries(&self, scope: &Scope) -> Result<Vec<SleepEntry>> {
        self.list_scoped(
            SLEEP_COLUMNS,
            "sleep_entries",
            scope,
            Some(SLEEP_LIMIT),
            Self::sleep_from_row,
        )
    }

    pub fn create_sleep_entry(&self, entry: &NewSleepEntry) -> Result<SleepEntry> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO sleep_entries (user_id, date, duration_minutes, quality, bedtime, wake_time, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.user_id,
                entry.date,
                entry.duration_minutes,
                entry.quality,
                entry.bedtime,
                entry.wake_time,
                entry.notes,
                created_at,
            ],
        )?;
        Ok(SleepEntry {
            id: self.conn.last_insert_rowid(),
            user_id: entry.user_id.clone(),
            date: entry.date,
            duration_minutes: entry.duration_minutes,
            quality: entry.quality,
            bedtime: entry.bedtime.clone(),
            wake_time: entry.wake_time.clone(),
            notes: entry.notes.clone(),
            created_at,
        })
    }

    // --- Nutrition ---

    pub fn get_nutrition_entries(&self, scope: &Scope) -> Result<Vec<NutritionEntry>> {
        self.list_scoped(
            NUTRITION_COLUMNS,
            "nutrition_entries",
            scope,
            Some(NUTRITION_LIMIT),
            Self::nutrition_from_row,
        )
    }

    pub fn create_nutrition_entry(&self, entry: &NewNutritionEntry) -> Result<NutritionEntry> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO nutrition_entries (user_id, date, meal_type, name, calories, protein_g, carbs_g, fat_g, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.user_id,
                entry.date,
                entry.meal_type,
                entry.name,
                entry.calories,
                entry.protein_g,
                entry.carbs_g,
                entry.fat_g,
                created_at,
            ],
        )?;
        Ok(NutritionEntry {
            id: self.conn.last_insert_rowid(),
            user_id: entry.user_id.clone(),
            date: entry.date,
            meal_type: entry.meal_type.clone(),
            name: entry.name.clone(),
            calories: entry.calories,
            protein_g: entry.protein_g,
            carbs_g: entry.carbs_g,
            fat_g: entry.fat_g,
            created_at,
        })
    }

    // --- AI insights ---

    pub fn get_insights(&self, scope: &Scope) -> Result<Vec<AiInsight>> {
        self.list_scoped(
            INSIGHT_COLUMNS,
            "ai_insights",
            scope,
            Some(INSIGHT_LIMIT),
            Self::insight_from_row,
        )
    }

    pub fn create_insight(&self, insight: &NewInsight) -> Result<AiInsight> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO ai_insights (user_id, category, title, body, read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                insight.user_id,
                insight.category,
                insight.title,
                insight.body,
                created_at,
            ],
        )?;
        Ok(AiInsight {
            id: self.conn.last_insert_rowid(),
            user_id: insight.user_id.clone(),
            category: insight.category.clone(),
            title: insight.title.clone(),
            body: insight.body.clone(),
            read: false,
            created_at,
        })
    }

    pub fn mark_insight_read(&self, id: i64) -> Result<()> {
        self.conn
            .execute("UPDATE ai_insights SET read = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Notifications ---

    pub fn get_notifications(&self, scope: &Scope) -> Result<Vec<Notification>> {
        self.list_scoped(
            NOTIFICATION_COLUMNS,
            "notifications",
            scope,
            Some(NOTIFICATION_LIMIT),
            Self::notification_from_row,
        )
    }

    pub fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let created_at = now();
        self.conn.execute(
            "INSERT INTO notifications (user_id, kind, title, message, read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                notification.user_id,
                notification.kind,
                notification.title,
                notification.message,
                created_at,
            ],
        )?;
        Ok(Notification {
            id: self.conn.last_insert_rowid(),
            user_id: notification.user_id.clone(),
            kind: notification.kind.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            read: false,
            created_at,
        })
    }

    pub fn mark_notification_read(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Returns the number of notifications that flipped to read.
    pub fn mark_all_notifications_read(&self, scope: &Scope) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE user_id IS ?1 AND read = 0",
            params![scope.user_id()],
        )?;
        Ok(rows)
    }

    pub fn unread_notification_count(&self, scope: &Scope) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id IS ?1 AND read = 0",
            params![scope.user_id()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Preferences ---

    pub fn get_preferences(&self, scope: &Scope) -> Result<Option<UserPreference>> {
        let prefs = self
            .conn
            .query_row(
                &format!("SELECT {PREFERENCE_COLUMNS} FROM user_preferences WHERE scope_key = ?1"),
                params![scope.key()],
                Self::preference_from_row,
            )
            .optional()?;
        Ok(prefs)
    }

    pub fn upsert_preferences(
        &self,
        scope: &Scope,
        prefs: &NewPreferences,
    ) -> Result<UserPreference> {
        let now = now();
        self.conn.execute(
            "INSERT INTO user_preferences (scope_key, user_id, units, theme, notifications_enabled, reminder_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(scope_key) DO UPDATE SET
                units = excluded.units,
                theme = excluded.theme,
                notifications_enabled = excluded.notifications_enabled,
                reminder_time = excluded.reminder_time,
                updated_at = excluded.updated_at",
            params![
                scope.key(),
                scope.user_id(),
                prefs.units,
                prefs.theme,
                prefs.notifications_enabled,
                prefs.reminder_time,
                now,
            ],
        )?;
        debug!(%scope, "upserted preferences");
        self.get_preferences(scope)?
            .context("Preferences not found after upsert")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intensity, Units};
    use std::thread::sleep;
    use std::time::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_workout(user_id: Option<&str>) -> NewWorkout {
        NewWorkout {
            user_id: user_id.map(str::to_string),
            workout_type: "Running".to_string(),
            icon: "figure.run".to_string(),
            duration_minutes: 45,
            calories: 420,
            date: d(2024, 6, 15),
            intensity: Intensity::High,
            avg_heart_rate: Some(152),
        }
    }

    fn user(id: &str) -> Scope {
        Scope::User(id.to_string())
    }

    fn count_rows(db: &Database, sql: &str) -> i64 {
        db.conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_create_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_user(&NewUser {
                username: "alice".to_string(),
                display_name: Some("Alice".to_string()),
            })
            .unwrap();

        assert!(Uuid::parse_str(&created.id).is_ok());
        let by_id = db.get_user(&created.id).unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.display_name.as_deref(), Some("Alice"));

        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
    }

    #[test]
    fn test_get_user_missing_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user("nope").unwrap().is_none());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn test_create_user_duplicate_username_propagates_store_error() {
        let db = Database::open_in_memory().unwrap();
        let new = NewUser {
            username: "alice".to_string(),
            display_name: None,
        };
        db.create_user(&new).unwrap();
        let err = db.create_user(&new).unwrap_err();

        let sqlite_err = err
            .downcast_ref::<rusqlite::Error>()
            .expect("store error should be passed through");
        assert_eq!(
            sqlite_err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
        assert!(is_constraint_violation(&err));
        assert!(!is_constraint_violation(&anyhow::anyhow!("not a store error")));
    }

    #[test]
    fn test_create_workout_then_list_includes_it() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_workout(&sample_workout(Some("u1"))).unwrap();
        let second = db.create_workout(&sample_workout(Some("u1"))).unwrap();

        let workouts = db.get_workouts(&user("u1")).unwrap();
        assert_eq!(workouts.len(), 2);
        assert_eq!(workouts[0].id, second.id);
        assert_eq!(workouts[1].id, first.id);
        assert_eq!(workouts[0].intensity, Intensity::High);
        assert_eq!(workouts[0].date, d(2024, 6, 15));
        assert!(workouts[0].created_at >= workouts[1].created_at);
    }

    #[test]
    fn test_get_workouts_caps_at_fifty_most_recent() {
        let db = Database::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..60 {
            let mut w = sample_workout(Some("u1"));
            w.calories = i;
            ids.push(db.create_workout(&w).unwrap().id);
        }

        let workouts = db.get_workouts(&user("u1")).unwrap();
        assert_eq!(workouts.len(), 50);

        let expected: Vec<i64> = ids.iter().rev().take(50).copied().collect();
        let got: Vec<i64> = workouts.iter().map(|w| w.id).collect();
        assert_eq!(got, expected);
        assert!(
            workouts
                .windows(2)
                .all(|pair| pair[0].created_at >= pair[1].created_at)
        );
    }

    #[test]
    fn test_get_workouts_scopes_are_disjoint() {
        let db = Database::open_in_memory().unwrap();
        db.create_workout(&sample_workout(Some("u1"))).unwrap();
        db.create_workout(&sample_workout(Some("u2"))).unwrap();
        let global = db.create_workout(&sample_workout(None)).unwrap();

        assert_eq!(db.get_workouts(&user("u1")).unwrap().len(), 1);
        assert_eq!(db.get_workouts(&user("u2")).unwrap().len(), 1);
        let guest = db.get_workouts(&Scope::Global).unwrap();
        assert_eq!(guest.len(), 1);
        assert_eq!(guest[0].id, global.id);
        assert!(guest[0].user_id.is_none());
    }

    #[test]
    fn test_delete_workout_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let w = db.create_workout(&sample_workout(None)).unwrap();

        db.delete_workout(w.id).unwrap();
        db.delete_workout(w.id).unwrap();
        db.delete_workout(9999).unwrap();

        assert!(db.get_workout(w.id).unwrap().is_none());
    }

    #[test]
    fn test_body_measurements_uncapped_newest_first() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..75 {
            db.create_body_measurement(&NewBodyMeasurement {
                user_id: Some("u1".to_string()),
                date: d(2024, 1, 1),
                weight_kg: Some(80.0 - f64::from(i) * 0.1),
                ..Default::default()
            })
            .unwrap();
        }

        let all = db.get_body_measurements(&user("u1")).unwrap();
        assert_eq!(all.len(), 75);
        assert!(all.windows(2).all(|pair| pair[0].id > pair[1].id));
        assert!(db.get_body_measurements(&Scope::Global).unwrap().is_empty());
    }

    #[test]
    fn test_get_goals_none_when_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_goals(&Scope::Global).unwrap().is_none());
        assert!(db.get_goals(&user("u1")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_goals_updates_same_row() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .upsert_goals(&NewGoals {
                user_id: Some("u1".to_string()),
                daily_steps: Some(8000),
                daily_calories: Some(2200),
                ..Default::default()
            })
            .unwrap();

        sleep(Duration::from_millis(5));

        let second = db
            .upsert_goals(&NewGoals {
                user_id: Some("u1".to_string()),
                daily_steps: Some(10_000),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.daily_steps, Some(10_000));
        // untouched fields keep their stored value
        assert_eq!(second.daily_calories, Some(2200));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(count_rows(&db, "SELECT COUNT(*) FROM goals"), 1);
    }

    #[test]
    fn test_global_goals_single_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_goals(&NewGoals {
            weekly_workouts: Some(3),
            ..Default::default()
        })
        .unwrap();
        db.upsert_goals(&NewGoals {
            weekly_workouts: Some(4),
            ..Default::default()
        })
        .unwrap();
        db.upsert_goals(&NewGoals {
            user_id: Some("u1".to_string()),
            weekly_workouts: Some(5),
            ..Default::default()
        })
        .unwrap();

        let global = db.get_goals(&Scope::Global).unwrap().unwrap();
        assert_eq!(global.weekly_workouts, Some(4));
        assert!(global.user_id.is_none());
        assert_eq!(
            count_rows(&db, "SELECT COUNT(*) FROM goals WHERE user_id IS NULL"),
            1
        );
        assert_eq!(
            db.get_goals(&user("u1")).unwrap().unwrap().weekly_workouts,
            Some(5)
        );
    }

    #[test]
    fn test_get_hydration_default_when_missing() {
        let db = Database::open_in_memory().unwrap();
        let day = db.get_hydration(&user("u1"), d(2024, 6, 1)).unwrap();
        assert_eq!(day, HydrationDay::empty(d(2024, 6, 1)));
        assert_eq!(day.glasses, 0);
        assert_eq!(day.goal, 8);
    }

    #[test]
    fn test_log_hydration_upserts_by_user_and_date() {
        let db = Database::open_in_memory().unwrap();
        let date = d(2024, 6, 1);
        let first = db.log_hydration(&user("u1"), date, 5).unwrap();
        let second = db.log_hydration(&user("u1"), date, 7).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.glasses, 7);
        assert_eq!(second.goal, DEFAULT_HYDRATION_GOAL);
        assert_eq!(count_rows(&db, "SELECT COUNT(*) FROM hydration_logs"), 1);

        let day = db.get_hydration(&user("u1"), date).unwrap();
        assert_eq!(day.glasses, 7);
        assert_eq!(day.id, Some(first.id));
    }

    #[test]
    fn test_log_hydration_keys_are_independent() {
        let db = Database::open_in_memory().unwrap();
        db.log_hydration(&user("u1"), d(2024, 6, 1), 3).unwrap();
        db.log_hydration(&user("u1"), d(2024, 6, 2), 4).unwrap();
        db.log_hydration(&user("u2"), d(2024, 6, 1), 6).unwrap();
        db.log_hydration(&Scope::Global, d(2024, 6, 1), 2).unwrap();
        db.log_hydration(&Scope::Global, d(2024, 6, 1), 9).unwrap();

        assert_eq!(count_rows(&db, "SELECT COUNT(*) FROM hydration_logs"), 4);
        assert_eq!(
            db.get_hydration(&Scope::Global, d(2024, 6, 1)).unwrap().glasses,
            9
        );
        assert_eq!(
            db.get_hydration(&user("u2"), d(2024, 6, 1)).unwrap().glasses,
            6
        );
    }

    #[test]
    fn test_hydration_history_newest_first() {
        let db = Database::open_in_memory().unwrap();
        for day in 1..=10 {
            db.log_hydration(&user("u1"), d(2024, 6, day), i64::from(day))
                .unwrap();
        }
        let history = db.hydration_history(&user("u1"), 7).unwrap();
        assert_eq!(history.len(), 7);
        assert_eq!(history[0].date, d(2024, 6, 10));
        assert_eq!(history[6].date, d(2024, 6, 4));
    }

    #[test]
    fn test_sleep_entries_capped_at_thirty() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..35 {
            db.create_sleep_entry(&NewSleepEntry {
                user_id: Some("u1".to_string()),
                date: d(2024, 5, 1),
                duration_minutes: 400 + i,
                quality: Some(7),
                bedtime: Some("23:00".to_string()),
                wake_time: Some("06:40".to_string()),
                notes: None,
            })
            .unwrap();
        }
        let entries = db.get_sleep_entries(&user("u1")).unwrap();
        assert_eq!(entries.len(), 30);
        assert_eq!(entries[0].duration_minutes, 434);
    }

    #[test]
    fn test_nutrition_entries_capped_at_fifty() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..55 {
            db.create_nutrition_entry(&NewNutritionEntry {
                user_id: None,
                date: d(2024, 5, 1),
                meal_type: "lunch".to_string(),
                name: format!("Salad {i}"),
                calories: 350,
                protein_g: Some(12.0),
                carbs_g: None,
                fat_g: None,
            })
            .unwrap();
        }
        let entries = db.get_nutrition_entries(&Scope::Global).unwrap();
        assert_eq!(entries.len(), 50);
        assert_eq!(entries[0].name, "Salad 54");
    }

    #[test]
    fn test_insights_cap_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let mut last = None;
        for i in 0..25 {
            last = Some(
                db.create_insight(&NewInsight {
                    user_id: Some("u1".to_string()),
                    category: "recovery".to_string(),
                    title: format!("Insight {i}"),
                    body: "Take a rest day".to_string(),
                })
                .unwrap(),
            );
        }
        let last = last.unwrap();
        assert!(!last.read);

        let insights = db.get_insights(&user("u1")).unwrap();
        assert_eq!(insights.len(), 20);
        assert_eq!(insights[0].id, last.id);

        db.mark_insight_read(last.id).unwrap();
        db.mark_insight_read(last.id).unwrap();
        db.mark_insight_read(12_345).unwrap();
        assert!(db.get_insights(&user("u1")).unwrap()[0].read);
    }

    #[test]
    fn test_notifications_mark_read_twice() {
        let db = Database::open_in_memory().unwrap();
        let n = db
            .create_notification(&NewNotification {
                user_id: Some("u1".to_string()),
                kind: "goal".to_string(),
                title: "Goal reached".to_string(),
                message: "You hit 10,000 steps".to_string(),
            })
            .unwrap();

        db.mark_notification_read(n.id).unwrap();
        assert!(db.get_notifications(&user("u1")).unwrap()[0].read);
        db.mark_notification_read(n.id).unwrap();
        assert!(db.get_notifications(&user("u1")).unwrap()[0].read);
    }

    #[test]
    fn test_notifications_capped_and_unread_count() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..33 {
            db.create_notification(&NewNotification {
                user_id: Some("u1".to_string()),
                kind: "reminder".to_string(),
                title: format!("Reminder {i}"),
                message: "Drink water".to_string(),
            })
            .unwrap();
        }
        db.create_notification(&NewNotification {
            user_id: None,
            kind: "system".to_string(),
            title: "Welcome".to_string(),
            message: "Hello".to_string(),
        })
        .unwrap();

        assert_eq!(db.get_notifications(&user("u1")).unwrap().len(), 30);
        assert_eq!(db.unread_notification_count(&user("u1")).unwrap(), 33);

        assert_eq!(db.mark_all_notifications_read(&user("u1")).unwrap(), 33);
        assert_eq!(db.unread_notification_count(&user("u1")).unwrap(), 0);
        assert_eq!(db.mark_all_notifications_read(&user("u1")).unwrap(), 0);
        assert_eq!(db.unread_notification_count(&Scope::Global).unwrap(), 1);
    }

    #[test]
    fn test_preferences_upsert_single_row() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_preferences(&user("u1")).unwrap().is_none());

        let first = db
            .upsert_preferences(&user("u1"), &NewPreferences::default())
            .unwrap();
        assert_eq!(first.units, Units::Metric);
        assert!(first.notifications_enabled);

        let second = db
            .upsert_preferences(
                &user("u1"),
                &NewPreferences {
                    units: Units::Imperial,
                    theme: "dark".to_string(),
                    notifications_enabled: false,
                    reminder_time: Some("07:30".to_string()),
                },
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.units, Units::Imperial);
        assert_eq!(second.theme, "dark");
        assert!(!second.notifications_enabled);
        assert_eq!(second.user_id.as_deref(), Some("u1"));
        assert_eq!(count_rows(&db, "SELECT COUNT(*) FROM user_preferences"), 1);
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_on_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_workout(&sample_workout(Some("u1"))).unwrap();
            db.log_hydration(&user("u1"), d(2024, 6, 1), 4).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_workouts(&user("u1")).unwrap().len(), 1);
        assert_eq!(db.get_hydration(&user("u1"), d(2024, 6, 1)).unwrap().glasses, 4);
    }
}

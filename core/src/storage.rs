use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{
    AiInsight, BodyMeasurement, Goals, HydrationDay, HydrationLog, NewBodyMeasurement, NewGoals,
    NewInsight, NewNotification, NewNutritionEntry, NewPreferences, NewSleepEntry, NewUser,
    NewWorkout, Notification, NutritionEntry, Scope, SleepEntry, User, UserPreference, Workout,
};

/// Async gateway over [`Database`].
///
/// Cheap to clone; all clones share one connection. Each call runs on tokio's
/// blocking pool and holds the connection only for its own statement(s), so
/// concurrent callers are serialized at the connection rather than racing.
/// Store errors are returned as-is.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Mutex<Database>>,
}

impl Storage {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let path: PathBuf = path.to_path_buf();
        let db = tokio::task::spawn_blocking(move || Database::open(&path))
            .await
            .context("database open task failed")??;
        Ok(Self::new(db))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&db)
        })
        .await
        .context("storage task failed")?
    }

    // --- Users ---

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        self.run(move |db| db.get_user(&id)).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.run(move |db| db.get_user_by_username(&username)).await
    }

    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        self.run(move |db| db.create_user(&user)).await
    }

    // --- Workouts ---

    pub async fn get_workouts(&self, scope: Scope) -> Result<Vec<Workout>> {
        self.run(move |db| db.get_workouts(&scope)).await
    }

    pub async fn get_workout(&self, id: i64) -> Result<Option<Workout>> {
        self.run(move |db| db.get_workout(id)).await
    }

    pub async fn create_workout(&self, workout: NewWorkout) -> Result<Workout> {
        self.run(move |db| db.create_workout(&workout)).await
    }

    pub async fn delete_workout(&self, id: i64) -> Result<()> {
        self.run(move |db| db.delete_workout(id)).await
    }

    // --- Body measurements ---

    pub async fn get_body_measurements(&self, scope: Scope) -> Result<Vec<BodyMeasurement>> {
        self.run(move |db| db.get_body_measurements(&scope)).await
    }

    pub async fn create_body_measurement(
        &self,
        measurement: NewBodyMeasurement,
    ) -> Result<BodyMeasurement> {
        self.run(move |db| db.create_body_measurement(&measurement))
            .await
    }

    // --- Goals ---

    pub async fn get_goals(&self, scope: Scope) -> Result<Option<Goals>> {
        self.run(move |db| db.get_goals(&scope)).await
    }

    pub async fn upsert_goals(&self, goals: NewGoals) -> Result<Goals> {
        self.run(move |db| db.upsert_goals(&goals)).await
    }

    // --- Hydration ---

    pub async fn get_hydration(&self, scope: Scope, date: NaiveDate) -> Result<HydrationDay> {
        self.run(move |db| db.get_hydration(&scope, date)).await
    }

    pub async fn log_hydration(
        &self,
        scope: Scope,
        date: NaiveDate,
        glasses: i64,
    ) -> Result<HydrationLog> {
        self.run(move |db| db.log_hydration(&scope, date, glasses))
            .await
    }

    pub async fn hydration_history(&self, scope: Scope, days: i64) -> Result<Vec<HydrationLog>> {
        self.run(move |db| db.hydration_history(&scope, days)).await
    }

    // --- Sleep & nutrition ---

    pub async fn get_sleep_entries(&self, scope: Scope) -> Result<Vec<SleepEntry>> {
        self.run(move |db| db.get_sleep_entries(&scope)).await
    }

    pub async fn create_sleep_entry(&self, entry: NewSleepEntry) -> Result<SleepEntry> {
        self.run(move |db| db.create_sleep_entry(&entry)).await
    }

    pub async fn get_nutrition_entries(&self, scope: Scope) -> Result<Vec<NutritionEntry>> {
        self.run(move |db| db.get_nutrition_entries(&scope)).await
    }

    pub async fn create_nutrition_entry(&self, entry: NewNutritionEntry) -> Result<NutritionEntry> {
        self.run(move |db| db.create_nutrition_entry(&entry)).await
    }

    // --- Insights ---

    pub async fn get_insights(&self, scope: Scope) -> Result<Vec<AiInsight>> {
        self.run(move |db| db.get_insights(&scope)).await
    }

    pub async fn create_insight(&self, insight: NewInsight) -> Result<AiInsight> {
        self.run(move |db| db.create_insight(&insight)).await
    }

    pub async fn mark_insight_read(&self, id: i64) -> Result<()> {
        self.run(move |db| db.mark_insight_read(id)).await
    }

    // --- Notifications ---

    pub async fn get_notifications(&self, scope: Scope) -> Result<Vec<Notification>> {
        self.run(move |db| db.get_notifications(&scope)).await
    }

    pub async fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
        self.run(move |db| db.create_notification(&notification))
            .await
    }

    pub async fn mark_notification_read(&self, id: i64) -> Result<()> {
        self.run(move |db| db.mark_notification_read(id)).await
    }

    pub async fn mark_all_notifications_read(&self, scope: Scope) -> Result<usize> {
        self.run(move |db| db.mark_all_notifications_read(&scope))
            .await
    }

    pub async fn unread_notification_count(&self, scope: Scope) -> Result<i64> {
        self.run(move |db| db.unread_notification_count(&scope))
            .await
    }

    // --- Preferences ---

    pub async fn get_preferences(&self, scope: Scope) -> Result<Option<UserPreference>> {
        self.run(move |db| db.get_preferences(&scope)).await
    }

    pub async fn upsert_preferences(
        &self,
        scope: Scope,
        prefs: NewPreferences,
    ) -> Result<UserPreference> {
        self.run(move |db| db.upsert_preferences(&scope, &prefs))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Intensity;

    fn workout(user_id: Option<&str>) -> NewWorkout {
        NewWorkout {
            user_id: user_id.map(str::to_string),
            workout_type: "Cycling".to_string(),
            icon: "bicycle".to_string(),
            duration_minutes: 60,
            calories: 550,
            date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            intensity: Intensity::Moderate,
            avg_heart_rate: None,
        }
    }

    #[tokio::test]
    async fn test_storage_workout_lifecycle() {
        let storage = Storage::open_in_memory().unwrap();
        let created = storage.create_workout(workout(Some("u1"))).await.unwrap();

        let listed = storage
            .get_workouts(Scope::User("u1".to_string()))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);

        storage.delete_workout(created.id).await.unwrap();
        storage.delete_workout(created.id).await.unwrap();
        assert!(storage.get_workout(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_get_goals_global() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage.get_goals(Scope::Global).await.unwrap().is_none());

        storage
            .upsert_goals(NewGoals {
                daily_steps: Some(6000),
                ..Default::default()
            })
            .await
            .unwrap();

        let goals = storage.get_goals(Scope::Global).await.unwrap().unwrap();
        assert_eq!(goals.daily_steps, Some(6000));
    }

    #[tokio::test]
    async fn test_storage_concurrent_hydration_upserts_single_row() {
        let storage = Storage::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();

        let mut handles = Vec::new();
        for glasses in 1..=16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .log_hydration(Scope::User("u1".to_string()), date, glasses)
                    .await
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let history = storage
            .hydration_history(Scope::User("u1".to_string()), 30)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_duplicate_username_error_passes_through() {
        let storage = Storage::open_in_memory().unwrap();
        let new = NewUser {
            username: "sam".to_string(),
            display_name: None,
        };
        storage.create_user(new.clone()).await.unwrap();
        let err = storage.create_user(new).await.unwrap_err();
        assert!(err.downcast_ref::<rusqlite::Error>().is_some());
    }

    #[tokio::test]
    async fn test_storage_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.db");
        let storage = Storage::open(&path).await.unwrap();
        storage
            .create_notification(NewNotification {
                user_id: None,
                kind: "system".to_string(),
                title: "Hi".to_string(),
                message: "Welcome to stride".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            storage.unread_notification_count(Scope::Global).await.unwrap(),
            1
        );
    }
}

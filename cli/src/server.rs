use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use stride_core::models::{
    AiInsight, BodyMeasurement, Goals, HydrationDay, HydrationLog, Intensity, NewBodyMeasurement,
    NewGoals, NewInsight, NewNotification, NewNutritionEntry, NewPreferences, NewSleepEntry,
    NewUser, NewWorkout, Notification, NutritionEntry, Scope, SleepEntry, Units, User,
    UserPreference, Workout, parse_iso_date, validate_body_measurement, validate_glasses,
    validate_goals, validate_meal_type, validate_new_workout, validate_sleep_entry,
    validate_username,
};
use stride_core::db::is_constraint_violation;
use stride_core::storage::Storage;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    storage: Storage,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize, Default)]
struct ScopeQuery {
    user_id: Option<String>,
}

impl ScopeQuery {
    fn scope(self) -> Scope {
        Scope::from(owner(self.user_id))
    }
}

/// Owner of a row written through the API. An empty id means the global
/// scope, same as an empty `?user_id=`.
fn owner(user_id: Option<String>) -> Option<String> {
    user_id.filter(|id| !id.is_empty())
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    display_name: Option<String>,
}

fn default_icon() -> String {
    "figure.walk".to_string()
}

#[derive(Deserialize)]
struct CreateWorkoutRequest {
    user_id: Option<String>,
    workout_type: String,
    #[serde(default = "default_icon")]
    icon: String,
    duration_minutes: i64,
    calories: i64,
    date: String,
    intensity: String,
    avg_heart_rate: Option<i64>,
}

#[derive(Deserialize)]
struct CreateMeasurementRequest {
    user_id: Option<String>,
    date: String,
    weight_kg: Option<f64>,
    body_fat_pct: Option<f64>,
    chest_cm: Option<f64>,
    waist_cm: Option<f64>,
    hips_cm: Option<f64>,
    arm_cm: Option<f64>,
    thigh_cm: Option<f64>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct UpsertGoalsRequest {
    daily_steps: Option<i64>,
    daily_calories: Option<i64>,
    weekly_workouts: Option<i64>,
    target_weight_kg: Option<f64>,
    daily_water_glasses: Option<i64>,
    sleep_hours: Option<f64>,
}

#[derive(Deserialize)]
struct LogHydrationRequest {
    glasses: i64,
}

#[derive(Deserialize)]
struct CreateSleepRequest {
    user_id: Option<String>,
    date: String,
    duration_minutes: i64,
    quality: Option<i64>,
    bedtime: Option<String>,
    wake_time: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct CreateNutritionRequest {
    user_id: Option<String>,
    date: String,
    meal_type: String,
    name: String,
    calories: i64,
    protein_g: Option<f64>,
    carbs_g: Option<f64>,
    fat_g: Option<f64>,
}

#[derive(Deserialize)]
struct CreateInsightRequest {
    user_id: Option<String>,
    category: String,
    title: String,
    body: String,
}

#[derive(Deserialize)]
struct CreateNotificationRequest {
    user_id: Option<String>,
    kind: String,
    title: String,
    message: String,
}

#[derive(Deserialize)]
struct UpsertPreferencesRequest {
    units: Option<String>,
    theme: Option<String>,
    notifications_enabled: Option<bool>,
    reminder_time: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- User handlers ---

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let username = validate_username(&req.username).map_err(|e| bad_request(&e))?;

    match state
        .storage
        .create_user(NewUser {
            username: username.clone(),
            display_name: req.display_name,
        })
        .await
    {
        Ok(user) => Ok((StatusCode::CREATED, Json(user))),
        Err(err) if is_constraint_violation(&err) => Err(ApiError::Conflict(format!(
            "Username '{username}' is already taken"
        ))),
        Err(err) => Err(err.into()),
    }
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .storage
        .get_user(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;
    Ok(Json(user))
}

async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .storage
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User '{username}' not found")))?;
    Ok(Json(user))
}

// --- Workout handlers ---

async fn list_workouts(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Workout>>, ApiError> {
    let workouts = state.storage.get_workouts(query.scope()).await?;
    Ok(Json(workouts))
}

async fn create_workout(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkoutRequest>,
) -> Result<(StatusCode, Json<Workout>), ApiError> {
    let intensity: Intensity = req.intensity.parse().map_err(|e| bad_request(&e))?;
    let date = parse_iso_date(&req.date).map_err(|e| bad_request(&e))?;

    let workout = NewWorkout {
        user_id: owner(req.user_id),
        workout_type: req.workout_type.trim().to_string(),
        icon: req.icon,
        duration_minutes: req.duration_minutes,
        calories: req.calories,
        date,
        intensity,
        avg_heart_rate: req.avg_heart_rate,
    };
    validate_new_workout(&workout).map_err(|e| bad_request(&e))?;

    let created = state.storage.create_workout(workout).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_workout(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete_workout(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Body measurement handlers ---

async fn list_measurements(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<BodyMeasurement>>, ApiError> {
    let measurements = state.storage.get_body_measurements(query.scope()).await?;
    Ok(Json(measurements))
}

async fn create_measurement(
    State(state): State<AppState>,
    Json(req): Json<CreateMeasurementRequest>,
) -> Result<(StatusCode, Json<BodyMeasurement>), ApiError> {
    let date = parse_iso_date(&req.date).map_err(|e| bad_request(&e))?;
    let measurement = NewBodyMeasurement {
        user_id: owner(req.user_id),
        date,
        weight_kg: req.weight_kg,
        body_fat_pct: req.body_fat_pct,
        chest_cm: req.chest_cm,
        waist_cm: req.waist_cm,
        hips_cm: req.hips_cm,
        arm_cm: req.arm_cm,
        thigh_cm: req.thigh_cm,
        notes: req.notes,
    };
    validate_body_measurement(&measurement).map_err(|e| bad_request(&e))?;

    let created = state.storage.create_body_measurement(measurement).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// --- Goals handlers ---

async fn get_goals(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Goals>, ApiError> {
    let scope = query.scope();
    let goals = state
        .storage
        .get_goals(scope.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No goals set for {scope}")))?;
    Ok(Json(goals))
}

async fn upsert_goals(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
    Json(req): Json<UpsertGoalsRequest>,
) -> Result<Json<Goals>, ApiError> {
    let goals = NewGoals {
        user_id: query.scope().user_id().map(str::to_string),
        daily_steps: req.daily_steps,
        daily_calories: req.daily_calories,
        weekly_workouts: req.weekly_workouts,
        target_weight_kg: req.target_weight_kg,
        daily_water_glasses: req.daily_water_glasses,
        sleep_hours: req.sleep_hours,
    };
    validate_goals(&goals).map_err(|e| bad_request(&e))?;

    let goals = state.storage.upsert_goals(goals).await?;
    Ok(Json(goals))
}

// --- Hydration handlers ---

async fn get_hydration(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<HydrationDay>, ApiError> {
    let date = parse_iso_date(&date_str).map_err(|e| bad_request(&e))?;
    let day = state.storage.get_hydration(query.scope(), date).await?;
    Ok(Json(day))
}

async fn log_hydration(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Query(query): Query<ScopeQuery>,
    Json(req): Json<LogHydrationRequest>,
) -> Result<Json<HydrationLog>, ApiError> {
    let date = parse_iso_date(&date_str).map_err(|e| bad_request(&e))?;
    validate_glasses(req.glasses).map_err(|e| bad_request(&e))?;
    let log = state
        .storage
        .log_hydration(query.scope(), date, req.glasses)
        .await?;
    Ok(Json(log))
}

// --- Sleep & nutrition handlers ---

async fn list_sleep(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<SleepEntry>>, ApiError> {
    let entries = state.storage.get_sleep_entries(query.scope()).await?;
    Ok(Json(entries))
}

async fn create_sleep(
    State(state): State<AppState>,
    Json(req): Json<CreateSleepRequest>,
) -> Result<(StatusCode, Json<SleepEntry>), ApiError> {
    let date = parse_iso_date(&req.date).map_err(|e| bad_request(&e))?;
    let entry = NewSleepEntry {
        user_id: owner(req.user_id),
        date,
        duration_minutes: req.duration_minutes,
        quality: req.quality,
        bedtime: req.bedtime,
        wake_time: req.wake_time,
        notes: req.notes,
    };
    validate_sleep_entry(&entry).map_err(|e| bad_request(&e))?;

    let created = state.storage.create_sleep_entry(entry).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_nutrition(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<NutritionEntry>>, ApiError> {
    let entries = state.storage.get_nutrition_entries(query.scope()).await?;
    Ok(Json(entries))
}

async fn create_nutrition(
    State(state): State<AppState>,
    Json(req): Json<CreateNutritionRequest>,
) -> Result<(StatusCode, Json<NutritionEntry>), ApiError> {
    let date = parse_iso_date(&req.date).map_err(|e| bad_request(&e))?;
    let meal_type = validate_meal_type(&req.meal_type).map_err(|e| bad_request(&e))?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if req.calories < 0 {
        return Err(ApiError::BadRequest(
            "calories must not be negative".to_string(),
        ));
    }
    for (field, value) in [
        ("protein_g", req.protein_g),
        ("carbs_g", req.carbs_g),
        ("fat_g", req.fat_g),
    ] {
        if value.is_some_and(|v| v < 0.0) {
            return Err(ApiError::BadRequest(format!("{field} must not be negative")));
        }
    }

    let created = state
        .storage
        .create_nutrition_entry(NewNutritionEntry {
            user_id: owner(req.user_id),
            date,
            meal_type,
            name,
            calories: req.calories,
            protein_g: req.protein_g,
            carbs_g: req.carbs_g,
            fat_g: req.fat_g,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// --- Insight handlers ---

async fn list_insights(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<AiInsight>>, ApiError> {
    let insights = state.storage.get_insights(query.scope()).await?;
    Ok(Json(insights))
}

async fn create_insight(
    State(state): State<AppState>,
    Json(req): Json<CreateInsightRequest>,
) -> Result<(StatusCode, Json<AiInsight>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let created = state
        .storage
        .create_insight(NewInsight {
            user_id: owner(req.user_id),
            category: req.category,
            title: req.title,
            body: req.body,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn mark_insight_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.storage.mark_insight_read(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Notification handlers ---

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state.storage.get_notifications(query.scope()).await?;
    Ok(Json(notifications))
}

async fn create_notification(
    State(state): State<AppState>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let created = state
        .storage
        .create_notification(NewNotification {
            user_id: owner(req.user_id),
            kind: req.kind,
            title: req.title,
            message: req.message,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.storage.mark_notification_read(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .storage
        .mark_all_notifications_read(query.scope())
        .await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn unread_notification_count(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let unread = state
        .storage
        .unread_notification_count(query.scope())
        .await?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

// --- Preference handlers ---

async fn get_preferences(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<UserPreference>, ApiError> {
    let scope = query.scope();
    let prefs = state
        .storage
        .get_preferences(scope.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No preferences saved for {scope}")))?;
    Ok(Json(prefs))
}

async fn upsert_preferences(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
    Json(req): Json<UpsertPreferencesRequest>,
) -> Result<Json<UserPreference>, ApiError> {
    let defaults = NewPreferences::default();
    let units = req
        .units
        .as_deref()
        .map(str::parse::<Units>)
        .transpose()
        .map_err(|e| bad_request(&e))?
        .unwrap_or(defaults.units);

    let prefs = NewPreferences {
        units,
        theme: req.theme.unwrap_or(defaults.theme),
        notifications_enabled: req
            .notifications_enabled
            .unwrap_or(defaults.notifications_enabled),
        reminder_time: req.reminder_time,
    };

    let saved = state
        .storage
        .upsert_preferences(query.scope(), prefs)
        .await?;
    Ok(Json(saved))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/users/by-username/{username}", get(get_user_by_username))
        .route("/api/workouts", get(list_workouts).post(create_workout))
        .route("/api/workouts/{id}", delete(delete_workout))
        .route(
            "/api/measurements",
            get(list_measurements).post(create_measurement),
        )
        .route("/api/goals", get(get_goals).put(upsert_goals))
        .route(
            "/api/hydration/{date}",
            get(get_hydration).put(log_hydration),
        )
        .route("/api/sleep", get(list_sleep).post(create_sleep))
        .route("/api/nutrition", get(list_nutrition).post(create_nutrition))
        .route("/api/insights", get(list_insights).post(create_insight))
        .route("/api/insights/{id}/read", post(mark_insight_read))
        .route(
            "/api/notifications",
            get(list_notifications).post(create_notification),
        )
        .route(
            "/api/notifications/{id}/read",
            post(mark_notification_read),
        )
        .route(
            "/api/notifications/read-all",
            post(mark_all_notifications_read),
        )
        .route(
            "/api/notifications/unread-count",
            get(unread_notification_count),
        )
        .route(
            "/api/preferences",
            get(get_preferences).put(upsert_preferences),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key, or a mask when it is too short
/// to abbreviate.
fn key_hint(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    storage: Storage,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        storage,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        info!(
            "API key: {} (see api_key file in data directory)",
            key_hint(key)
        );
    } else {
        warn!("authentication disabled (--no-auth); API is open to anyone");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        warn!(
            bind,
            "listening on a non-loopback address with no authentication; any device on your network can access this API"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

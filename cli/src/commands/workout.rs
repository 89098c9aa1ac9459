use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::db::Database;
use stride_core::models::{Intensity, NewWorkout, Scope, validate_new_workout};

use super::helpers::{or_dash, parse_date, truncate};

pub(crate) struct WorkoutArgs {
    pub workout_type: String,
    pub duration: i64,
    pub calories: i64,
    pub intensity: String,
    pub icon: String,
    pub heart_rate: Option<i64>,
    pub date: Option<String>,
}

pub(crate) fn cmd_workout_log(
    db: &Database,
    scope: &Scope,
    args: WorkoutArgs,
    json: bool,
) -> Result<()> {
    let intensity: Intensity = args.intensity.parse()?;
    let date = parse_date(args.date)?;

    let workout = NewWorkout {
        user_id: scope.user_id().map(str::to_string),
        workout_type: args.workout_type.trim().to_string(),
        icon: args.icon,
        duration_minutes: args.duration,
        calories: args.calories,
        date,
        intensity,
        avg_heart_rate: args.heart_rate,
    };
    validate_new_workout(&workout)?;

    let created = db.create_workout(&workout)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!(
            "Logged {} ({} min, {} kcal, {}) for {} [id {}]",
            created.workout_type,
            created.duration_minutes,
            created.calories,
            created.intensity,
            created.date.format("%Y-%m-%d"),
            created.id
        );
    }

    Ok(())
}

pub(crate) fn cmd_workout_list(db: &Database, scope: &Scope, json: bool) -> Result<()> {
    let workouts = db.get_workouts(scope)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workouts)?);
    } else if workouts.is_empty() {
        eprintln!("No workouts for {scope}. Use `stride workout log` to record one.");
    } else {
        #[derive(Tabled)]
        struct WorkoutRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Type")]
            workout_type: String,
            #[tabled(rename = "Min")]
            minutes: i64,
            #[tabled(rename = "Kcal")]
            calories: i64,
            #[tabled(rename = "Avg HR")]
            heart_rate: String,
            #[tabled(rename = "Intensity")]
            intensity: String,
        }

        let rows: Vec<WorkoutRow> = workouts
            .iter()
            .map(|w| WorkoutRow {
                id: w.id,
                date: w.date.format("%Y-%m-%d").to_string(),
                workout_type: truncate(&w.workout_type, 24),
                minutes: w.duration_minutes,
                calories: w.calories,
                heart_rate: or_dash(w.avg_heart_rate),
                intensity: w.intensity.to_string(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..6)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) fn cmd_workout_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    db.delete_workout(id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted workout {id}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(intensity: &str) -> WorkoutArgs {
        WorkoutArgs {
            workout_type: "  Rowing ".to_string(),
            duration: 30,
            calories: 280,
            intensity: intensity.to_string(),
            icon: "figure.rower".to_string(),
            heart_rate: Some(140),
            date: Some("2024-03-02".to_string()),
        }
    }

    #[test]
    fn test_workout_log_scoped() {
        let db = Database::open_in_memory().unwrap();
        let scope = Scope::User("u1".to_string());

        cmd_workout_log(&db, &scope, args("high"), true).unwrap();

        let workouts = db.get_workouts(&scope).unwrap();
        assert_eq!(workouts.len(), 1);
        assert_eq!(workouts[0].workout_type, "Rowing");
        assert_eq!(workouts[0].intensity, Intensity::High);
        assert!(db.get_workouts(&Scope::Global).unwrap().is_empty());
    }

    #[test]
    fn test_workout_log_rejects_bad_intensity() {
        let db = Database::open_in_memory().unwrap();
        assert!(cmd_workout_log(&db, &Scope::Global, args("brutal"), true).is_err());
        assert!(db.get_workouts(&Scope::Global).unwrap().is_empty());
    }

    #[test]
    fn test_workout_delete_missing_is_ok() {
        let db = Database::open_in_memory().unwrap();
        assert!(cmd_workout_delete(&db, 404, true).is_ok());
    }
}

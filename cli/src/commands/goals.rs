use anyhow::{Result, bail};

use stride_core::db::Database;
use stride_core::models::{Goals, NewGoals, Scope, validate_goals};

use super::helpers::{json_error, or_dash};

fn print_goals(goals: &Goals) {
    println!("Daily steps:      {}", or_dash(goals.daily_steps));
    println!("Daily calories:   {}", or_dash(goals.daily_calories));
    println!("Weekly workouts:  {}", or_dash(goals.weekly_workouts));
    println!(
        "Target weight:    {}",
        goals
            .target_weight_kg
            .map_or_else(|| "-".to_string(), |v| format!("{v:.1} kg"))
    );
    println!("Water (glasses):  {}", or_dash(goals.daily_water_glasses));
    println!(
        "Sleep:            {}",
        goals
            .sleep_hours
            .map_or_else(|| "-".to_string(), |v| format!("{v:.1} h"))
    );
}

/// Only the fields given are written; the rest keep their stored values.
pub(crate) fn cmd_goals_set(db: &Database, scope: &Scope, goals: NewGoals, json: bool) -> Result<()> {
    let goals = NewGoals {
        user_id: scope.user_id().map(str::to_string),
        ..goals
    };
    let nothing_given = goals.daily_steps.is_none()
        && goals.daily_calories.is_none()
        && goals.weekly_workouts.is_none()
        && goals.target_weight_kg.is_none()
        && goals.daily_water_glasses.is_none()
        && goals.sleep_hours.is_none();
    if nothing_given {
        bail!("Nothing to set. Provide at least one of --steps, --calories, --workouts, --weight, --water, --sleep");
    }
    validate_goals(&goals)?;

    let saved = db.upsert_goals(&goals)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Goals saved for {scope}");
        print_goals(&saved);
    }

    Ok(())
}

pub(crate) fn cmd_goals_show(db: &Database, scope: &Scope, json: bool) -> Result<()> {
    match db.get_goals(scope)? {
        Some(goals) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&goals)?);
            } else {
                print_goals(&goals);
            }
        }
        None => {
            if json {
                println!("{}", json_error(&format!("No goals set for {scope}")));
            } else {
                eprintln!("No goals set for {scope}. Use `stride goals set` to set some.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goals_set_requires_a_field() {
        let db = Database::open_in_memory().unwrap();
        assert!(cmd_goals_set(&db, &Scope::Global, NewGoals::default(), true).is_err());
    }

    #[test]
    fn test_goals_set_uses_scope() {
        let db = Database::open_in_memory().unwrap();
        let scope = Scope::User("u7".to_string());
        let goals = NewGoals {
            user_id: None,
            weekly_workouts: Some(4),
            ..Default::default()
        };

        cmd_goals_set(&db, &scope, goals, true).unwrap();

        let saved = db.get_goals(&scope).unwrap().unwrap();
        assert_eq!(saved.user_id.as_deref(), Some("u7"));
        assert_eq!(saved.weekly_workouts, Some(4));
        assert!(db.get_goals(&Scope::Global).unwrap().is_none());
    }

    #[test]
    fn test_goals_show_missing_is_ok() {
        let db = Database::open_in_memory().unwrap();
        assert!(cmd_goals_show(&db, &Scope::Global, true).is_ok());
    }
}

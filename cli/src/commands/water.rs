use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::db::Database;
use stride_core::models::{Scope, validate_glasses};

use super::helpers::parse_date;

fn progress_bar(glasses: i64, goal: i64) -> String {
    let filled = usize::try_from(glasses.min(goal).max(0)).unwrap_or(0);
    let empty = usize::try_from((goal - glasses).max(0)).unwrap_or(0);
    format!("{}{}", "●".repeat(filled), "○".repeat(empty))
}

pub(crate) fn cmd_water_log(
    db: &Database,
    scope: &Scope,
    glasses: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    validate_glasses(glasses)?;
    let date = parse_date(date)?;

    let log = db.log_hydration(scope, date, glasses)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        println!(
            "{}: {}/{} glasses {}",
            log.date.format("%Y-%m-%d"),
            log.glasses,
            log.goal,
            progress_bar(log.glasses, log.goal)
        );
    }

    Ok(())
}

pub(crate) fn cmd_water_show(
    db: &Database,
    scope: &Scope,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let day = db.get_hydration(scope, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&day)?);
    } else {
        println!(
            "{}: {}/{} glasses {}",
            day.date.format("%Y-%m-%d"),
            day.glasses,
            day.goal,
            progress_bar(day.glasses, day.goal)
        );
    }

    Ok(())
}

pub(crate) fn cmd_water_history(db: &Database, scope: &Scope, days: u32, json: bool) -> Result<()> {
    let logs = db.hydration_history(scope, i64::from(days))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if logs.is_empty() {
        eprintln!("No hydration logged for {scope}. Use `stride water log` to record some.");
    } else {
        #[derive(Tabled)]
        struct WaterRow {
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Glasses")]
            glasses: i64,
            #[tabled(rename = "Goal")]
            goal: i64,
            #[tabled(rename = "")]
            bar: String,
        }

        let rows: Vec<WaterRow> = logs
            .iter()
            .map(|l| WaterRow {
                date: l.date.format("%Y-%m-%d").to_string(),
                glasses: l.glasses,
                goal: l.goal,
                bar: progress_bar(l.glasses, l.goal),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(3, 5), "●●●○○");
        assert_eq!(progress_bar(0, 2), "○○");
        assert_eq!(progress_bar(10, 3), "●●●");
    }

    #[test]
    fn test_water_log_overwrites_same_day() {
        let db = Database::open_in_memory().unwrap();
        let scope = Scope::User("u1".to_string());
        let date = Some("2024-05-05".to_string());

        cmd_water_log(&db, &scope, 3, date.clone(), true).unwrap();
        cmd_water_log(&db, &scope, 6, date, true).unwrap();

        let day = db
            .get_hydration(&scope, NaiveDate::from_ymd_opt(2024, 5, 5).unwrap())
            .unwrap();
        assert_eq!(day.glasses, 6);
        assert_eq!(db.hydration_history(&scope, 30).unwrap().len(), 1);
    }

    #[test]
    fn test_water_log_rejects_negative() {
        let db = Database::open_in_memory().unwrap();
        assert!(cmd_water_log(&db, &Scope::Global, -1, None, true).is_err());
    }
}

use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::db::Database;
use stride_core::models::Scope;

use super::helpers::truncate;

pub(crate) fn cmd_notify_list(db: &Database, scope: &Scope, json: bool) -> Result<()> {
    let notifications = db.get_notifications(scope)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&notifications)?);
        return Ok(());
    }

    if notifications.is_empty() {
        eprintln!("No notifications for {scope}");
        return Ok(());
    }

    #[derive(Tabled)]
    struct NotificationRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "")]
        unread: &'static str,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Message")]
        message: String,
    }

    let rows: Vec<NotificationRow> = notifications
        .iter()
        .map(|n| NotificationRow {
            id: n.id,
            unread: if n.read { "" } else { "●" },
            kind: n.kind.clone(),
            title: truncate(&n.title, 30),
            message: truncate(&n.message, 50),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let unread = db.unread_notification_count(scope)?;
    println!("{unread} unread");

    Ok(())
}

/// Mark one notification read, or every notification in `scope` when `id` is `None`.
pub(crate) fn cmd_notify_read(
    db: &Database,
    scope: &Scope,
    id: Option<i64>,
    json: bool,
) -> Result<()> {
    if let Some(id) = id {
        db.mark_notification_read(id)?;
        if json {
            println!("{}", serde_json::json!({ "read": id }));
        } else {
            println!("Marked notification {id} as read");
        }
    } else {
        let updated = db.mark_all_notifications_read(scope)?;
        if json {
            println!("{}", serde_json::json!({ "updated": updated }));
        } else {
            println!("Marked {updated} notification(s) as read");
        }
    }

    Ok(())
}

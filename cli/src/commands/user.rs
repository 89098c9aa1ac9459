use anyhow::{Result, bail};
use std::process;

use stride_core::db::{Database, is_constraint_violation};
use stride_core::models::{NewUser, User, validate_username};

use super::helpers::json_error;

fn print_user(user: &User) {
    println!("{} ({})", user.username, user.id);
    if let Some(ref name) = user.display_name {
        println!("  Display name: {name}");
    }
    println!("  Created: {}", user.created_at);
}

pub(crate) fn cmd_user_create(
    db: &Database,
    username: &str,
    display_name: Option<String>,
    json: bool,
) -> Result<()> {
    let username = validate_username(username)?;

    let user = match db.create_user(&NewUser {
        username: username.clone(),
        display_name,
    }) {
        Ok(user) => user,
        Err(err) if is_constraint_violation(&err) => {
            bail!("Username '{username}' is already taken")
        }
        Err(err) => return Err(err),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Created user");
        print_user(&user);
    }

    Ok(())
}

/// Look up by id first, then by username.
fn find_user(db: &Database, user: &str) -> Result<Option<User>> {
    match db.get_user(user)? {
        Some(u) => Ok(Some(u)),
        None => db.get_user_by_username(user),
    }
}

pub(crate) fn cmd_user_show(db: &Database, user: &str, json: bool) -> Result<()> {
    if let Some(u) = find_user(db, user)? {
        if json {
            println!("{}", serde_json::to_string_pretty(&u)?);
        } else {
            print_user(&u);
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("User '{user}' not found")));
        } else {
            eprintln!("User '{user}' not found");
        }
        process::exit(2);
    }
}

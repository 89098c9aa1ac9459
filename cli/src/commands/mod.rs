mod goals;
mod helpers;
mod notify;
mod user;
mod water;
mod workout;

pub(crate) use goals::{cmd_goals_set, cmd_goals_show};
pub(crate) use helpers::scope_for;
pub(crate) use notify::{cmd_notify_list, cmd_notify_read};
pub(crate) use user::{cmd_user_create, cmd_user_show};
pub(crate) use water::{cmd_water_history, cmd_water_log, cmd_water_show};
pub(crate) use workout::{WorkoutArgs, cmd_workout_delete, cmd_workout_list, cmd_workout_log};

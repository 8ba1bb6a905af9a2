mod dial;
mod events;
mod helpers;
mod import;
mod log;
mod plan;
mod profile;
mod session;
mod summary;

pub(crate) use dial::cmd_dial;
pub(crate) use events::{cmd_events, cmd_validate};
pub(crate) use import::cmd_import;
pub(crate) use log::cmd_log;
pub(crate) use plan::{cmd_coach, cmd_plan, cmd_plan_status};
pub(crate) use profile::{cmd_profile_set, cmd_profile_show, cmd_profile_use};
pub(crate) use session::{cmd_session_reset, cmd_session_start, cmd_session_status};
pub(crate) use summary::cmd_summary;

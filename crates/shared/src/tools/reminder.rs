use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ReminderStatus, ScheduledReminder, TurnContext};
use crate::timeparse::{TimeParseError, format_pretty, resolve_future_instant};
use crate::timezone::parse_time_zone_or_default;

const REMINDER_TITLE: &str = "Your Reminder";
const GENERIC_FAILURE: &str = "Something went wrong while setting the reminder.";

/// Resolves the phrase, stages a pending reminder onto the turn's
/// write set, and returns a confirmation. Validation failures come back
/// as explanatory text for the model to fold into its reply; this
/// function never fails.
pub fn invoke(ctx: &mut TurnContext, datetime_phrase: &str, reminder_content: &str) -> String {
    if reminder_content.trim().is_empty() {
        warn!(user_id = %ctx.user_id, "schedule_reminder called without content");
        return GENERIC_FAILURE.to_string();
    }

    let tz = parse_time_zone_or_default(&ctx.user_time_zone);

    let scheduled_at = match resolve_future_instant(datetime_phrase, tz, ctx.now) {
        Ok(scheduled_at) => scheduled_at,
        Err(TimeParseError::Unparseable(phrase)) => {
            return format!("Could not parse '{phrase}'. Try being more specific.");
        }
        Err(TimeParseError::PastTime) => {
            return "Date must be in the future.".to_string();
        }
    };

    let reminder = ScheduledReminder {
        id: Uuid::new_v4(),
        user_id: ctx.user_id,
        title: REMINDER_TITLE.to_string(),
        body: reminder_content.trim().to_string(),
        scheduled_at,
        time_zone: tz.name().to_string(),
        status: ReminderStatus::Pending,
        created_at: ctx.now,
    };
    ctx.pending_writes.push(reminder);
    info!(user_id = %ctx.user_id, scheduled_at = %scheduled_at, "reminder staged for commit");

    let pretty_local = format_pretty(scheduled_at.with_timezone(&tz));
    format!(
        "SUCCESS. Reminder was scheduled for {pretty_local} ({}). Confirm the details with the user.",
        tz.name()
    )
}

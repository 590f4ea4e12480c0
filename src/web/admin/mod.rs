mod actions;
mod auth;
mod dashboard;
mod flash;

pub use actions::{
    cleanup_reminders, delete_scholarship, import_logs, import_upload, reminder_stats,
    reset_reminders, run_reminders, save_settings, save_templates, scholarship_reminders,
    send_test_email, update_scholarship, user_reminders, DEFAULT_CLEANUP_DAYS,
};
pub use dashboard::dashboard;

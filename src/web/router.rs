use axum::routing::{get, post};
use axum::Router;

use crate::web::{admin, pages, webhook, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(pages::healthz))
        .route("/scholarships", get(pages::list_page))
        .route("/scholarships/:id", get(pages::detail_page))
        .route("/api/scholarships", get(pages::list_json))
        .route("/api/scholarships/closing-soon", get(pages::closing_soon_json))
        .route("/api/scholarships/recent", get(pages::recent_json))
        .route("/api/scholarships/:id", get(pages::detail_json))
        .route("/aviation/v1/import-webhook", post(webhook::import_webhook))
        .route("/admin", get(admin::dashboard))
        .route("/admin/import", post(admin::import_upload))
        .route("/admin/settings", post(admin::save_settings))
        .route("/admin/templates", post(admin::save_templates))
        .route("/admin/reminders/run", post(admin::run_reminders))
        .route("/admin/reminders/test", post(admin::send_test_email))
        .route("/admin/reminders/cleanup", post(admin::cleanup_reminders))
        .route("/admin/scholarships/delete", post(admin::delete_scholarship))
        .route("/admin/scholarships/update", post(admin::update_scholarship))
        .route("/admin/scholarships/reset-reminders", post(admin::reset_reminders))
        .route("/admin/api/stats", get(admin::reminder_stats))
        .route("/admin/api/logs", get(admin::import_logs))
        .route("/admin/api/reminders/user/:id", get(admin::user_reminders))
        .route(
            "/admin/api/reminders/scholarship/:id",
            get(admin::scholarship_reminders),
        )
        .with_state(state)
}

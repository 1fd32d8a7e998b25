mod report;

use axum::{routing::get, Router};

use crate::AppState;

pub use report::Reports;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(report::list_reports).post(report::create_report))
        .route("/{report_id}", get(report::show_report).put(report::update_report).delete(report::delete_report))
}

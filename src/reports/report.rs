use axum::{debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::{self, Report, ReportRow, Room}, extract::{Json, Path}, rooms::RoomDirectory, session::Identity, AppError, AppResult, AppState};

/// Report records. Filing one opens (or joins) the room for its alleged party.
#[derive(Clone)]
pub struct Reports {
    db_pool: SqlitePool,
    directory: RoomDirectory,
}

fn alleged_party(raw: &str) -> AppResult<&str> {
    let party = raw.trim();
    if party.is_empty() {
        return Err(AppError::Validation("Accused party cannot be blank".to_owned()));
    }
    Ok(party)
}

impl Reports {
    pub fn new(db_pool: SqlitePool, directory: RoomDirectory) -> Self {
        Self { db_pool, directory }
    }

    /// Files the report and opens its room in one transaction.
    pub async fn file(&self, alleged: &str, reporter_id: Uuid) -> AppResult<(Report, Room)> {
        let alleged = alleged_party(alleged)?;
        let mut tx = self.db_pool.begin().await?;
        let room_id = RoomDirectory::open_room(&mut tx, alleged, reporter_id).await?;

        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO reports (id,alleged_party,reporter_id,created_at) VALUES (?,?,?,?)")
            .bind(id.to_string())
            .bind(alleged)
            .bind(reporter_id.to_string())
            .bind(db::now_millis())
            .execute(&mut *tx)
            .await
            .map_err(|err| AppError::missing_on_fk(err, "user"))?;

        tx.commit().await?;
        tracing::info!(report_id = %id, %room_id, "report filed");

        Ok((self.get(id).await?, self.directory.get_room(room_id).await?))
    }

    pub async fn list(&self) -> AppResult<Vec<Report>> {
        let rows: Vec<ReportRow> = sqlx::query_as("SELECT id,alleged_party,reporter_id,created_at FROM reports ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter().map(Report::try_from).collect()
    }

    pub async fn get(&self, report_id: Uuid) -> AppResult<Report> {
        let row: Option<ReportRow> = sqlx::query_as("SELECT id,alleged_party,reporter_id,created_at FROM reports WHERE id=?")
            .bind(report_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        row.ok_or(AppError::NotFound("report"))?.try_into()
    }

    pub async fn update(&self, report_id: Uuid, alleged: &str) -> AppResult<Report> {
        let alleged = alleged_party(alleged)?;
        let updated = sqlx::query("UPDATE reports SET alleged_party=? WHERE id=?")
            .bind(alleged)
            .bind(report_id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound("report"));
        }
        self.get(report_id).await
    }

    pub async fn delete(&self, report_id: Uuid) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM reports WHERE id=?")
            .bind(report_id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound("report"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportQuery {
    alleged_party: String,
}

#[derive(Serialize)]
pub(crate) struct FiledReport {
    report: Report,
    room: Room,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_report(
    identity: Identity,
    State(reports): State<Reports>,

    Json(ReportQuery { alleged_party }): Json<ReportQuery>,
) -> AppResult<Json<FiledReport>> {
    let reporter_id = identity.require_user()?;
    let (report, room) = reports.file(&alleged_party, reporter_id).await?;
    Ok(Json(FiledReport { report, room }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_reports(
    identity: Identity,
    State(reports): State<Reports>,
) -> AppResult<Json<Vec<Report>>> {
    identity.require_user()?;
    Ok(Json(reports.list().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn show_report(
    identity: Identity,
    State(reports): State<Reports>,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<Report>> {
    identity.require_user()?;
    Ok(Json(reports.get(report_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_report(
    identity: Identity,
    State(reports): State<Reports>,
    Path(report_id): Path<Uuid>,

    Json(ReportQuery { alleged_party }): Json<ReportQuery>,
) -> AppResult<Json<Report>> {
    identity.require_user()?;
    Ok(Json(reports.update(report_id, &alleged_party).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_report(
    identity: Identity,
    State(reports): State<Reports>,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    identity.require_user()?;
    reports.delete(report_id).await?;
    Ok(Json(json!({ "message": "Report deleted successfully." })))
}

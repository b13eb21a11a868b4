use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::extract::AuthUser;
use crate::errors::AppError;
use crate::models::application::ApplicationStatus;
use crate::models::feedback::{FeedbackRow, FeedbackType};
use crate::state::AppState;
use crate::tags;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDto {
    pub id: Uuid,
    pub job_application_id: Uuid,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub title: String,
    pub content: String,
    pub scheduled_follow_up_date: Option<DateTime<Utc>>,
    pub is_follow_up_completed: bool,
    pub interviewer_name: Option<String>,
    pub interview_type: Option<String>,
    pub rating: Option<i32>,
    pub attachment_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_dto(row: FeedbackRow) -> FeedbackDto {
    FeedbackDto {
        id: row.id,
        job_application_id: row.job_application_id,
        feedback_type: row.feedback_type.parse().unwrap_or_default(),
        title: row.title,
        content: row.content,
        scheduled_follow_up_date: row.scheduled_follow_up_date,
        is_follow_up_completed: row.is_follow_up_completed,
        interviewer_name: row.interviewer_name,
        interview_type: row.interview_type,
        rating: row.rating,
        attachment_paths: tags::decode(row.attachment_paths.as_deref()),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

async fn fetch_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> Result<FeedbackRow, AppError> {
    sqlx::query_as("SELECT * FROM feedback WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Feedback not found".to_string()))
}

async fn verify_application_owned(
    db: &PgPool,
    application_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    let exists: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM job_applications WHERE id = $1 AND user_id = $2")
            .bind(application_id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Job application not found".to_string()))
}

fn validate_rating(rating: Option<i32>) -> Result<(), AppError> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(AppError::Validation(
            "Rating must be between 1 and 5".to_string(),
        )),
        _ => Ok(()),
    }
}

/// GET /api/feedback/application/:application_id
pub async fn handle_list_for_application(
    State(state): State<AppState>,
    user: AuthUser,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Vec<FeedbackDto>>, AppError> {
    verify_application_owned(&state.db, application_id, user.id).await?;

    let rows: Vec<FeedbackRow> = sqlx::query_as(
        "SELECT * FROM feedback WHERE job_application_id = $1 ORDER BY created_at DESC",
    )
    .bind(application_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(to_dto).collect()))
}

/// GET /api/feedback/:id
pub async fn handle_get_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackDto>, AppError> {
    let row = fetch_owned(&state.db, id, user.id).await?;
    Ok(Json(to_dto(row)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedbackRequest {
    pub job_application_id: Uuid,
    #[serde(rename = "type", default)]
    pub feedback_type: FeedbackType,
    pub title: String,
    pub content: String,
    pub scheduled_follow_up_date: Option<DateTime<Utc>>,
    pub interviewer_name: Option<String>,
    pub interview_type: Option<String>,
    pub rating: Option<i32>,
    #[serde(default)]
    pub attachment_paths: Vec<String>,
}

/// POST /api/feedback
pub async fn handle_create_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("Content is required".to_string()));
    }
    validate_rating(req.rating)?;

    verify_application_owned(&state.db, req.job_application_id, user.id)
        .await
        .map_err(|_| {
            AppError::Validation("Job application not found or access denied".to_string())
        })?;

    let row: FeedbackRow = sqlx::query_as(
        r#"
        INSERT INTO feedback
            (job_application_id, user_id, feedback_type, title, content,
             scheduled_follow_up_date, interviewer_name, interview_type, rating,
             attachment_paths)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(req.job_application_id)
    .bind(user.id)
    .bind(req.feedback_type.as_str())
    .bind(&req.title)
    .bind(&req.content)
    .bind(req.scheduled_follow_up_date)
    .bind(&req.interviewer_name)
    .bind(&req.interview_type)
    .bind(req.rating)
    .bind(tags::encode(&req.attachment_paths))
    .fetch_one(&state.db)
    .await?;

    let location = format!("/api/feedback/{}", row.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(to_dto(row)),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeedbackRequest {
    #[serde(rename = "type")]
    pub feedback_type: Option<FeedbackType>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub scheduled_follow_up_date: Option<DateTime<Utc>>,
    pub is_follow_up_completed: Option<bool>,
    pub interviewer_name: Option<String>,
    pub interview_type: Option<String>,
    pub rating: Option<i32>,
    pub attachment_paths: Option<Vec<String>>,
}

/// PUT /api/feedback/:id
/// Patch semantics: fields absent from the request keep their prior value.
pub async fn handle_update_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFeedbackRequest>,
) -> Result<StatusCode, AppError> {
    validate_rating(req.rating)?;
    let existing = fetch_owned(&state.db, id, user.id).await?;

    let feedback_type = req
        .feedback_type
        .map(|t| t.as_str().to_string())
        .unwrap_or(existing.feedback_type);
    let title = match req.title {
        Some(t) if !t.trim().is_empty() => t,
        _ => existing.title,
    };
    let content = match req.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => existing.content,
    };
    let attachments_value = match req.attachment_paths {
        Some(ref p) => tags::encode(p),
        None => existing.attachment_paths,
    };

    sqlx::query(
        r#"
        UPDATE feedback
        SET feedback_type = $1, title = $2, content = $3, scheduled_follow_up_date = $4,
            is_follow_up_completed = $5, interviewer_name = $6, interview_type = $7,
            rating = $8, attachment_paths = $9, updated_at = $10
        WHERE id = $11
        "#,
    )
    .bind(&feedback_type)
    .bind(&title)
    .bind(&content)
    .bind(
        req.scheduled_follow_up_date
            .or(existing.scheduled_follow_up_date),
    )
    .bind(
        req.is_follow_up_completed
            .unwrap_or(existing.is_follow_up_completed),
    )
    .bind(req.interviewer_name.or(existing.interviewer_name))
    .bind(req.interview_type.or(existing.interview_type))
    .bind(req.rating.or(existing.rating))
    .bind(&attachments_value)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/feedback/:id
pub async fn handle_delete_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    fetch_owned(&state.db, id, user.id).await?;

    sqlx::query("DELETE FROM feedback WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpApplication {
    pub id: Uuid,
    pub job_title: String,
    pub company_name: String,
    pub status: ApplicationStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFollowUpDto {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub scheduled_follow_up_date: DateTime<Utc>,
    pub job_application: FollowUpApplication,
}

#[derive(FromRow)]
struct PendingFollowUpRow {
    id: Uuid,
    title: String,
    feedback_type: String,
    scheduled_follow_up_date: DateTime<Utc>,
    application_id: Uuid,
    job_title: String,
    company_name: String,
    status: String,
}

/// GET /api/feedback/follow-ups
/// Scheduled, not yet completed, and due within the next 7 days.
pub async fn handle_pending_follow_ups(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PendingFollowUpDto>>, AppError> {
    let rows: Vec<PendingFollowUpRow> = sqlx::query_as(
        r#"
        SELECT f.id, f.title, f.feedback_type, f.scheduled_follow_up_date,
               ja.id AS application_id, ja.job_title, c.name AS company_name, ja.status
        FROM feedback f
        JOIN job_applications ja ON ja.id = f.job_application_id
        JOIN companies c ON c.id = ja.company_id
        WHERE f.user_id = $1
          AND f.scheduled_follow_up_date IS NOT NULL
          AND NOT f.is_follow_up_completed
          AND f.scheduled_follow_up_date <= now() + interval '7 days'
        ORDER BY f.scheduled_follow_up_date ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    let result = rows
        .into_iter()
        .map(|r| PendingFollowUpDto {
            id: r.id,
            title: r.title,
            feedback_type: r.feedback_type.parse().unwrap_or_default(),
            scheduled_follow_up_date: r.scheduled_follow_up_date,
            job_application: FollowUpApplication {
                id: r.application_id,
                job_title: r.job_title,
                company_name: r.company_name,
                status: r.status.parse().unwrap_or_default(),
            },
        })
        .collect();

    Ok(Json(result))
}

/// POST /api/feedback/:id/complete-followup
pub async fn handle_complete_follow_up(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    fetch_owned(&state.db, id, user.id).await?;

    sqlx::query(
        "UPDATE feedback SET is_follow_up_completed = TRUE, updated_at = $1 WHERE id = $2",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::auth::extract::AuthUser;
use crate::errors::AppError;
use crate::models::resume::{ResumeRow, ResumeVersionRow};
use crate::pagination::{offset, page_headers, ListParams};
use crate::state::AppState;
use crate::storage;
use crate::tags;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDto {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub tags: Vec<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub usage_count: i64,
}

#[derive(FromRow)]
struct ResumeListRow {
    #[sqlx(flatten)]
    resume: ResumeRow,
    usage_count: i64,
}

fn to_dto(resume: ResumeRow, usage_count: i64) -> ResumeDto {
    ResumeDto {
        id: resume.id,
        title: resume.title,
        description: resume.description,
        file_path: resume.file_path,
        file_type: resume.file_type,
        file_size_bytes: resume.file_size_bytes,
        tags: tags::decode(resume.tags.as_deref()),
        is_default: resume.is_default,
        created_at: resume.created_at,
        updated_at: resume.updated_at,
        usage_count,
    }
}

async fn fetch_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> Result<ResumeRow, AppError> {
    sqlx::query_as("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found".to_string()))
}

async fn usage_count(db: &PgPool, resume_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM job_applications WHERE resume_id = $1")
        .bind(resume_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}

/// GET /api/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<(HeaderMap, Json<Vec<ResumeDto>>), AppError> {
    let filter = r#"
        user_id = $1
        AND ($2::text IS NULL
             OR title ILIKE '%' || $2 || '%'
             OR description ILIKE '%' || $2 || '%'
             OR tags ILIKE '%' || $2 || '%')
    "#;

    let total_count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM resumes WHERE {filter}"))
            .bind(user.id)
            .bind(&params.search)
            .fetch_one(&state.db)
            .await?;

    let rows: Vec<ResumeListRow> = sqlx::query_as(&format!(
        r#"
        SELECT r.*,
               (SELECT COUNT(*) FROM job_applications ja WHERE ja.resume_id = r.id)
                   AS usage_count
        FROM resumes r
        WHERE {filter}
        ORDER BY is_default DESC, updated_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(user.id)
    .bind(&params.search)
    .bind(params.page_size)
    .bind(offset(params.page, params.page_size))
    .fetch_all(&state.db)
    .await?;

    let result = rows
        .into_iter()
        .map(|r| to_dto(r.resume, r.usage_count))
        .collect();

    Ok((
        page_headers(total_count, params.page, params.page_size),
        Json(result),
    ))
}

/// GET /api/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeDto>, AppError> {
    let resume = fetch_owned(&state.db, id, user.id).await?;
    let count = usage_count(&state.db, resume.id).await?;
    Ok(Json(to_dto(resume, count)))
}

#[derive(Default)]
struct UploadForm {
    file: Option<(Option<String>, Bytes)>,
    fields: std::collections::HashMap<String, String>,
}

/// Collects a multipart payload: the `file` part plus any text fields.
async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
            form.file = Some((file_name, bytes));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read field '{name}': {e}")))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// POST /api/resumes (multipart: file, title, description?, tags?, isDefault?)
pub async fn handle_create_resume(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_upload(multipart).await?;

    let title = form
        .fields
        .get("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?;
    let description = form.fields.get("description").cloned();
    let tag_list = form
        .fields
        .get("tags")
        .map(|t| split_tags(t))
        .unwrap_or_default();
    let is_default = form
        .fields
        .get("isDefault")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let (file_name, bytes) = form
        .file
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;
    let file_name = file_name.unwrap_or_default();

    let stored = state
        .files
        .store(user.id, "resumes", &bytes, &file_name)
        .await?;

    // Clearing the previous default and inserting the new row commit together,
    // so "at most one default" holds even under concurrent readers.
    let mut tx = state.db.begin().await?;
    if is_default {
        sqlx::query("UPDATE resumes SET is_default = FALSE WHERE user_id = $1 AND is_default")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
    }
    let resume: ResumeRow = sqlx::query_as(
        r#"
        INSERT INTO resumes
            (user_id, title, description, file_path, file_type, file_size_bytes, tags, is_default)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&title)
    .bind(&description)
    .bind(&stored.path)
    .bind(&stored.file_type)
    .bind(stored.size_bytes)
    .bind(tags::encode(&tag_list))
    .bind(is_default)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("Stored resume {} for user {}", resume.id, user.id);

    let location = format!("/api/resumes/{}", resume.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(to_dto(resume, 0)),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResumeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_default: Option<bool>,
}

/// PUT /api/resumes/:id
/// Patch semantics: fields absent from the request keep their prior value.
pub async fn handle_update_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateResumeRequest>,
) -> Result<StatusCode, AppError> {
    let resume = fetch_owned(&state.db, id, user.id).await?;

    let title = match req.title {
        Some(t) if !t.trim().is_empty() => t,
        _ => resume.title,
    };
    let description = req.description.or(resume.description);
    let tags_value = match req.tags {
        Some(ref t) => tags::encode(t),
        None => resume.tags,
    };
    let is_default = req.is_default.unwrap_or(resume.is_default);

    let mut tx = state.db.begin().await?;
    if is_default && !resume.is_default {
        sqlx::query(
            "UPDATE resumes SET is_default = FALSE WHERE user_id = $1 AND is_default AND id <> $2",
        )
        .bind(user.id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query(
        r#"
        UPDATE resumes
        SET title = $1, description = $2, tags = $3, is_default = $4, updated_at = $5
        WHERE id = $6
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&tags_value)
    .bind(is_default)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/resumes/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let resume = fetch_owned(&state.db, id, user.id).await?;

    if usage_count(&state.db, resume.id).await? > 0 {
        return Err(AppError::Conflict(
            "Cannot delete resume that is being used by job applications".to_string(),
        ));
    }

    let version_paths: Vec<String> =
        sqlx::query_scalar("SELECT file_path FROM resume_versions WHERE resume_id = $1")
            .bind(id)
            .fetch_all(&state.db)
            .await?;

    sqlx::query("DELETE FROM resumes WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    state.files.remove(&resume.file_path).await;
    for path in &version_paths {
        state.files.remove(path).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

fn attachment_response(bytes: Vec<u8>, file_type: &str, file_name: String) -> impl IntoResponse {
    (
        [
            (
                header::CONTENT_TYPE,
                storage::content_type(file_type).to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
}

/// GET /api/resumes/:id/download
pub async fn handle_download_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let resume = fetch_owned(&state.db, id, user.id).await?;
    let bytes = state.files.retrieve(&resume.file_path).await?;

    let file_name = format!("{}.{}", resume.title, resume.file_type.to_lowercase());
    Ok(attachment_response(bytes, &resume.file_type, file_name))
}

/// GET /api/resumes/:id/versions
pub async fn handle_list_versions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ResumeVersionRow>>, AppError> {
    fetch_owned(&state.db, id, user.id).await?;

    let versions: Vec<ResumeVersionRow> = sqlx::query_as(
        "SELECT * FROM resume_versions WHERE resume_id = $1 ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(versions))
}

/// POST /api/resumes/:id/versions
/// (multipart: file, versionName, changes?, jobDescription?, aiPrompt?)
pub async fn handle_create_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let resume = fetch_owned(&state.db, id, user.id).await?;
    let form = read_upload(multipart).await?;

    let version_name = form
        .fields
        .get("versionName")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("Version name is required".to_string()))?;

    let (file_name, bytes) = form
        .file
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;
    let file_name = file_name.unwrap_or_default();

    // A version must keep the parent resume's format.
    let expected = resume.file_type.to_lowercase();
    if storage::extension_of(&file_name).as_deref() != Some(expected.as_str()) {
        return Err(AppError::Validation(format!(
            "File type must match original resume type ({})",
            resume.file_type
        )));
    }

    let stored = state
        .files
        .store(user.id, "resumes/versions", &bytes, &file_name)
        .await?;

    let version: ResumeVersionRow = sqlx::query_as(
        r#"
        INSERT INTO resume_versions
            (resume_id, version_name, file_path, changes, job_description, ai_prompt)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&version_name)
    .bind(&stored.path)
    .bind(form.fields.get("changes"))
    .bind(form.fields.get("jobDescription"))
    .bind(form.fields.get("aiPrompt"))
    .fetch_one(&state.db)
    .await?;

    let location = format!("/api/resumes/{id}/versions");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(version),
    ))
}

/// GET /api/resumes/:resume_id/versions/:version_id/download
pub async fn handle_download_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path((resume_id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let resume = fetch_owned(&state.db, resume_id, user.id).await?;

    let version: Option<ResumeVersionRow> =
        sqlx::query_as("SELECT * FROM resume_versions WHERE id = $1 AND resume_id = $2")
            .bind(version_id)
            .bind(resume_id)
            .fetch_optional(&state.db)
            .await?;
    let version =
        version.ok_or_else(|| AppError::NotFound("Resume version not found".to_string()))?;

    let bytes = state.files.retrieve(&version.file_path).await?;

    let file_name = format!(
        "{}_{}.{}",
        resume.title,
        version.version_name,
        resume.file_type.to_lowercase()
    );
    Ok(attachment_response(bytes, &resume.file_type, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("rust, backend ,api"), vec!["rust", "backend", "api"]);
        assert!(split_tags("").is_empty());
        assert!(split_tags(" , ,").is_empty());
    }

    async fn insert_resume(db: &PgPool, user_id: Uuid, is_default: bool) -> Uuid {
        sqlx::query_scalar(
            r#"
            INSERT INTO resumes (user_id, title, file_path, file_type, file_size_bytes, is_default)
            VALUES ($1, $2, '/tmp/none.pdf', 'PDF', 1, $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(format!("Resume {}", Uuid::new_v4()))
        .bind(is_default)
        .fetch_one(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_at_most_one_default_resume() {
        let db = testing::pool().await;
        let user = testing::create_user(&db).await;
        let first = insert_resume(&db, user.id, true).await;
        let second = insert_resume(&db, user.id, false).await;

        let req = UpdateResumeRequest {
            title: None,
            description: None,
            tags: None,
            is_default: Some(true),
        };
        handle_update_resume(
            State(testing::state(db.clone())),
            user.clone(),
            Path(second),
            Json(req),
        )
        .await
        .unwrap();

        let defaults: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM resumes WHERE user_id = $1 AND is_default")
                .bind(user.id)
                .fetch_all(&db)
                .await
                .unwrap();
        assert_eq!(defaults, vec![second]);
        assert_ne!(first, second);
    }
}

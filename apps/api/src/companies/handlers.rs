use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::extract::AuthUser;
use crate::errors::AppError;
use crate::models::company::{CompanyContactRow, CompanyRow};
use crate::pagination::{offset, page_headers, ListParams};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDto {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub job_applications_count: i64,
}

#[derive(FromRow)]
struct CompanyListRow {
    #[sqlx(flatten)]
    company: CompanyRow,
    job_applications_count: i64,
}

fn to_dto(company: CompanyRow, job_applications_count: i64) -> CompanyDto {
    CompanyDto {
        id: company.id,
        name: company.name,
        location: company.location,
        website: company.website,
        industry: company.industry,
        size: company.size,
        description: company.description,
        notes: company.notes,
        created_at: company.created_at,
        updated_at: company.updated_at,
        job_applications_count,
    }
}

async fn fetch_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> Result<CompanyRow, AppError> {
    sqlx::query_as("SELECT * FROM companies WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".to_string()))
}

async fn application_count(db: &PgPool, company_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM job_applications WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}

/// GET /api/companies
pub async fn handle_list_companies(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<(HeaderMap, Json<Vec<CompanyDto>>), AppError> {
    let filter = r#"
        user_id = $1
        AND ($2::text IS NULL
             OR name ILIKE '%' || $2 || '%'
             OR industry ILIKE '%' || $2 || '%'
             OR location ILIKE '%' || $2 || '%')
    "#;

    let total_count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM companies WHERE {filter}"))
            .bind(user.id)
            .bind(&params.search)
            .fetch_one(&state.db)
            .await?;

    let rows: Vec<CompanyListRow> = sqlx::query_as(&format!(
        r#"
        SELECT c.*,
               (SELECT COUNT(*) FROM job_applications ja WHERE ja.company_id = c.id)
                   AS job_applications_count
        FROM companies c
        WHERE {filter}
        ORDER BY name ASC
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
        .map(|r| to_dto(r.company, r.job_applications_count))
        .collect();

    Ok((
        page_headers(total_count, params.page, params.page_size),
        Json(result),
    ))
}

/// GET /api/companies/:id
pub async fn handle_get_company(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyDto>, AppError> {
    let company = fetch_owned(&state.db, id, user.id).await?;
    let count = application_count(&state.db, company.id).await?;
    Ok(Json(to_dto(company, count)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyRequest {
    pub name: String,
    pub location: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/companies
pub async fn handle_create_company(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Company name is required".to_string()));
    }

    let duplicate: Option<CompanyRow> =
        sqlx::query_as("SELECT * FROM companies WHERE user_id = $1 AND name = $2")
            .bind(user.id)
            .bind(&req.name)
            .fetch_optional(&state.db)
            .await?;
    if duplicate.is_some() {
        return Err(AppError::Conflict(
            "A company with this name already exists".to_string(),
        ));
    }

    let company: CompanyRow = sqlx::query_as(
        r#"
        INSERT INTO companies (user_id, name, location, website, industry, size, description, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&req.name)
    .bind(&req.location)
    .bind(&req.website)
    .bind(&req.industry)
    .bind(&req.size)
    .bind(&req.description)
    .bind(&req.notes)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::on_conflict(e, "A company with this name already exists"))?;

    let location = format!("/api/companies/{}", company.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(to_dto(company, 0)),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// PUT /api/companies/:id
/// Patch semantics: fields absent from the request keep their prior value.
pub async fn handle_update_company(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCompanyRequest>,
) -> Result<StatusCode, AppError> {
    let company = fetch_owned(&state.db, id, user.id).await?;

    let name = match req.name {
        Some(ref n) if !n.trim().is_empty() => {
            if *n != company.name {
                let duplicate: Option<CompanyRow> = sqlx::query_as(
                    "SELECT * FROM companies WHERE user_id = $1 AND name = $2 AND id <> $3",
                )
                .bind(user.id)
                .bind(n)
                .bind(id)
                .fetch_optional(&state.db)
                .await?;
                if duplicate.is_some() {
                    return Err(AppError::Conflict(
                        "A company with this name already exists".to_string(),
                    ));
                }
            }
            n.clone()
        }
        _ => company.name,
    };

    sqlx::query(
        r#"
        UPDATE companies
        SET name = $1, location = $2, website = $3, industry = $4,
            size = $5, description = $6, notes = $7, updated_at = $8
        WHERE id = $9
        "#,
    )
    .bind(&name)
    .bind(req.location.or(company.location))
    .bind(req.website.or(company.website))
    .bind(req.industry.or(company.industry))
    .bind(req.size.or(company.size))
    .bind(req.description.or(company.description))
    .bind(req.notes.or(company.notes))
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await
    .map_err(|e| AppError::on_conflict(e, "A company with this name already exists"))?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/companies/:id
pub async fn handle_delete_company(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let company = fetch_owned(&state.db, id, user.id).await?;

    if application_count(&state.db, company.id).await? > 0 {
        return Err(AppError::Conflict(
            "Cannot delete company with associated job applications".to_string(),
        ));
    }

    sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/companies/:id/contacts
pub async fn handle_list_contacts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CompanyContactRow>>, AppError> {
    fetch_owned(&state.db, id, user.id).await?;

    let contacts: Vec<CompanyContactRow> =
        sqlx::query_as("SELECT * FROM company_contacts WHERE company_id = $1 ORDER BY name ASC")
            .bind(id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(contacts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequest {
    pub name: String,
    pub position: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/companies/:id/contacts
pub async fn handle_create_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateContactRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Contact name is required".to_string()));
    }

    fetch_owned(&state.db, id, user.id).await?;

    let contact: CompanyContactRow = sqlx::query_as(
        r#"
        INSERT INTO company_contacts (company_id, name, position, email, phone, linkedin, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.position)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.linkedin)
    .bind(&req.notes)
    .fetch_one(&state.db)
    .await?;

    let location = format!("/api/companies/{id}/contacts");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(contact),
    ))
}

/// DELETE /api/companies/:company_id/contacts/:contact_id
pub async fn handle_delete_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path((company_id, contact_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    fetch_owned(&state.db, company_id, user.id).await?;

    let deleted = sqlx::query("DELETE FROM company_contacts WHERE id = $1 AND company_id = $2")
        .bind(contact_id)
        .bind(company_id)
        .execute(&state.db)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Company contact not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    #[ignore]
    async fn test_company_scoped_to_owner() {
        let db = testing::pool().await;
        let owner = testing::create_user(&db).await;
        let other = testing::create_user(&db).await;
        let id = testing::create_company(&db, owner.id).await;

        assert!(fetch_owned(&db, id, owner.id).await.is_ok());
        let err = fetch_owned(&db, id, other.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_duplicate_name_maps_to_conflict() {
        let db = testing::pool().await;
        let owner = testing::create_user(&db).await;
        let name = format!("Acme {}", Uuid::new_v4());

        let insert = "INSERT INTO companies (user_id, name) VALUES ($1, $2)";
        sqlx::query(insert)
            .bind(owner.id)
            .bind(&name)
            .execute(&db)
            .await
            .unwrap();
        let err = sqlx::query(insert)
            .bind(owner.id)
            .bind(&name)
            .execute(&db)
            .await
            .unwrap_err();

        let mapped = AppError::on_conflict(err, "A company with this name already exists");
        assert!(matches!(mapped, AppError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_delete_blocked_by_applications() {
        let db = testing::pool().await;
        let owner = testing::create_user(&db).await;
        let company_id = testing::create_company(&db, owner.id).await;
        sqlx::query(
            "INSERT INTO job_applications (user_id, company_id, job_title) VALUES ($1, $2, $3)",
        )
        .bind(owner.id)
        .bind(company_id)
        .bind("Backend Engineer")
        .execute(&db)
        .await
        .unwrap();

        let err = handle_delete_company(State(testing::state(db.clone())), owner, Path(company_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}

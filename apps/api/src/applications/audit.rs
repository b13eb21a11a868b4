//! Field-level audit trail for job applications. Every create, tracked-field
//! update, and delete appends a row to `audit_logs`; nothing ever updates or
//! deletes audit rows.

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::JobApplicationRow;

const ENTITY_TYPE: &str = "JobApplication";

/// The subset of fields whose change history matters for the product:
/// captured before and after an update and compared field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSnapshot {
    pub job_title: String,
    pub status: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub property: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AuditSnapshot {
    pub fn of(row: &JobApplicationRow) -> Self {
        AuditSnapshot {
            job_title: row.job_title.clone(),
            status: row.status.clone(),
            location: row.location.clone(),
            notes: row.notes.clone(),
        }
    }

    /// One entry per tracked field whose value actually changed.
    pub fn diff(&self, after: &AuditSnapshot) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        if self.job_title != after.job_title {
            changes.push(FieldChange {
                property: "JobTitle",
                old_value: Some(self.job_title.clone()),
                new_value: Some(after.job_title.clone()),
            });
        }
        if self.status != after.status {
            changes.push(FieldChange {
                property: "Status",
                old_value: Some(self.status.clone()),
                new_value: Some(after.status.clone()),
            });
        }
        if self.location != after.location {
            changes.push(FieldChange {
                property: "Location",
                old_value: self.location.clone(),
                new_value: after.location.clone(),
            });
        }
        if self.notes != after.notes {
            changes.push(FieldChange {
                property: "Notes",
                old_value: self.notes.clone(),
                new_value: after.notes.clone(),
            });
        }
        changes
    }
}

async fn append(
    db: &PgPool,
    entity_id: Uuid,
    action: &str,
    property: Option<&str>,
    old_value: Option<&str>,
    new_value: Option<&str>,
    user_id: Uuid,
    job_application_id: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs
            (entity_type, entity_id, action, property_name, old_value, new_value,
             user_id, job_application_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(ENTITY_TYPE)
    .bind(entity_id)
    .bind(action)
    .bind(property)
    .bind(old_value)
    .bind(new_value)
    .bind(user_id)
    .bind(job_application_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn record_create(db: &PgPool, application_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    append(
        db,
        application_id,
        "Create",
        None,
        None,
        None,
        user_id,
        Some(application_id),
    )
    .await
}

pub async fn record_update(
    db: &PgPool,
    application_id: Uuid,
    user_id: Uuid,
    changes: &[FieldChange],
) -> Result<(), AppError> {
    for change in changes {
        append(
            db,
            application_id,
            "Update",
            Some(change.property),
            change.old_value.as_deref(),
            change.new_value.as_deref(),
            user_id,
            Some(application_id),
        )
        .await?;
    }
    Ok(())
}

/// Recorded after the row is gone, so the back-reference is left unset;
/// a reference to the deleted application would be cascade-removed anyway.
pub async fn record_delete(
    db: &PgPool,
    application_id: Uuid,
    deleted_title: &str,
    user_id: Uuid,
) -> Result<(), AppError> {
    append(
        db,
        application_id,
        "Delete",
        None,
        Some(deleted_title),
        None,
        user_id,
        None,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AuditSnapshot {
        AuditSnapshot {
            job_title: "Backend Engineer".to_string(),
            status: "Applied".to_string(),
            location: Some("Berlin".to_string()),
            notes: None,
        }
    }

    #[test]
    fn test_no_changes_no_entries() {
        let before = snapshot();
        assert!(before.diff(&before.clone()).is_empty());
    }

    #[test]
    fn test_status_change_yields_one_entry() {
        let before = snapshot();
        let mut after = snapshot();
        after.status = "Interviewing".to_string();

        let changes = before.diff(&after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].property, "Status");
        assert_eq!(changes[0].old_value.as_deref(), Some("Applied"));
        assert_eq!(changes[0].new_value.as_deref(), Some("Interviewing"));
    }

    #[test]
    fn test_multiple_changes() {
        let before = snapshot();
        let mut after = snapshot();
        after.job_title = "Staff Engineer".to_string();
        after.notes = Some("phone screen done".to_string());

        let changes = before.diff(&after);
        let properties: Vec<_> = changes.iter().map(|c| c.property).collect();
        assert_eq!(properties, vec!["JobTitle", "Notes"]);
    }

    #[test]
    fn test_optional_field_cleared() {
        let before = snapshot();
        let mut after = snapshot();
        after.location = None;

        let changes = before.diff(&after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].property, "Location");
        assert_eq!(changes[0].old_value.as_deref(), Some("Berlin"));
        assert_eq!(changes[0].new_value, None);
    }
}

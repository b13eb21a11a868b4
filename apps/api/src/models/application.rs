use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Application status lifecycle. Persisted as text; an unrecognized stored
/// value degrades to `Applied` on read rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[default]
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Accepted,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Interviewing => "Interviewing",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Withdrawn => "Withdrawn",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Applied" => Ok(ApplicationStatus::Applied),
            "Interviewing" => Ok(ApplicationStatus::Interviewing),
            "Offer" => Ok(ApplicationStatus::Offer),
            "Rejected" => Ok(ApplicationStatus::Rejected),
            "Accepted" => Ok(ApplicationStatus::Accepted),
            "Withdrawn" => Ok(ApplicationStatus::Withdrawn),
            other => Err(format!("Unknown application status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobApplicationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub job_title: String,
    pub location: Option<String>,
    pub job_url: Option<String>,
    pub status: String,
    pub date_applied: DateTime<Utc>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub contact_person_name: Option<String>,
    pub contact_person_email: Option<String>,
    pub contact_person_phone: Option<String>,
    pub notes: Option<String>,
    pub resume_id: Option<Uuid>,
    pub attachment_paths: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            ApplicationStatus::Applied,
            ApplicationStatus::Interviewing,
            ApplicationStatus::Offer,
            ApplicationStatus::Rejected,
            ApplicationStatus::Accepted,
            ApplicationStatus::Withdrawn,
        ] {
            assert_eq!(s.as_str().parse::<ApplicationStatus>().unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_status_is_error() {
        assert!("OnHold".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn test_default_is_applied() {
        assert_eq!(ApplicationStatus::default(), ApplicationStatus::Applied);
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of feedback attached to an application. Persisted as text; an
/// unrecognized stored value degrades to `General` on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedbackType {
    #[default]
    General,
    Interview,
    PhoneScreen,
    TechnicalInterview,
    OnSite,
    Rejection,
    Offer,
    FollowUp,
    Reference,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::General => "General",
            FeedbackType::Interview => "Interview",
            FeedbackType::PhoneScreen => "PhoneScreen",
            FeedbackType::TechnicalInterview => "TechnicalInterview",
            FeedbackType::OnSite => "OnSite",
            FeedbackType::Rejection => "Rejection",
            FeedbackType::Offer => "Offer",
            FeedbackType::FollowUp => "FollowUp",
            FeedbackType::Reference => "Reference",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "General" => Ok(FeedbackType::General),
            "Interview" => Ok(FeedbackType::Interview),
            "PhoneScreen" => Ok(FeedbackType::PhoneScreen),
            "TechnicalInterview" => Ok(FeedbackType::TechnicalInterview),
            "OnSite" => Ok(FeedbackType::OnSite),
            "Rejection" => Ok(FeedbackType::Rejection),
            "Offer" => Ok(FeedbackType::Offer),
            "FollowUp" => Ok(FeedbackType::FollowUp),
            "Reference" => Ok(FeedbackType::Reference),
            other => Err(format!("Unknown feedback type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedbackRow {
    pub id: Uuid,
    pub job_application_id: Uuid,
    pub user_id: Uuid,
    pub feedback_type: String,
    pub title: String,
    pub content: String,
    pub scheduled_follow_up_date: Option<DateTime<Utc>>,
    pub is_follow_up_completed: bool,
    pub interviewer_name: Option<String>,
    pub interview_type: Option<String>,
    pub rating: Option<i32>,
    pub attachment_paths: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_roundtrip() {
        for t in [
            FeedbackType::General,
            FeedbackType::Interview,
            FeedbackType::PhoneScreen,
            FeedbackType::TechnicalInterview,
            FeedbackType::OnSite,
            FeedbackType::Rejection,
            FeedbackType::Offer,
            FeedbackType::FollowUp,
            FeedbackType::Reference,
        ] {
            assert_eq!(t.as_str().parse::<FeedbackType>().unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!("Casual".parse::<FeedbackType>().is_err());
    }
}

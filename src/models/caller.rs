use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human caller that leads can be routed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Caller {
    pub id: Uuid,
    pub name: String,
    pub role: Option<String>,
    pub languages: Vec<String>,
    /// Maximum assignments per business date; 0 means unlimited.
    pub daily_limit: i32,
    pub status: CallerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "caller_status", rename_all = "lowercase")]
pub enum CallerStatus {
    Active,
    Paused,
}

impl Default for CallerStatus {
    fn default() -> Self {
        CallerStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCallerRequest {
    pub name: String,
    pub role: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub daily_limit: i32,
    #[serde(default)]
    pub assigned_states: Vec<String>,
    #[serde(default)]
    pub status: CallerStatus,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCallerRequest {
    pub role: Option<String>,
    pub languages: Option<Vec<String>>,
    pub daily_limit: Option<i32>,
    pub assigned_states: Option<Vec<String>>,
    pub status: Option<CallerStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerStatusUpdate {
    pub status: CallerStatus,
}

/// Caller as presented over the API, with routing states and today's load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerOut {
    pub id: Uuid,
    pub name: String,
    pub role: Option<String>,
    pub languages: Vec<String>,
    pub daily_limit: i32,
    pub assigned_states: Vec<String>,
    pub leads_assigned_today: i32,
    pub status: CallerStatus,
}

impl CallerOut {
    pub fn from_caller(caller: Caller, assigned_states: Vec<String>, leads_assigned_today: i32) -> Self {
        Self {
            id: caller.id,
            name: caller.name,
            role: caller.role,
            languages: caller.languages,
            daily_limit: caller.daily_limit,
            assigned_states,
            leads_assigned_today,
            status: caller.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CallerStatus::Active).unwrap(), "\"active\"");
        assert_eq!(serde_json::to_string(&CallerStatus::Paused).unwrap(), "\"paused\"");
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateCallerRequest = serde_json::from_str(r#"{"name": "Alice"}"#).unwrap();
        assert_eq!(req.name, "Alice");
        assert!(req.languages.is_empty());
        assert_eq!(req.daily_limit, 0);
        assert!(req.assigned_states.is_empty());
        assert_eq!(req.status, CallerStatus::Active);
    }
}

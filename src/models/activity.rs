use crate::error::app_error::AppError;
use crate::models::session::{ClientMeta, clamp};
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed enumeration of auditable user actions. Anything else is rejected
/// before a write is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Login,
    Logout,
    ProfileUpdate,
    PasswordChange,
    ApiAccess,
    FileUpload,
    SettingsChange,
    DataExport,
}

impl ActivityType {
    pub const ALL: [ActivityType; 8] = [
        ActivityType::Login,
        ActivityType::Logout,
        ActivityType::ProfileUpdate,
        ActivityType::PasswordChange,
        ActivityType::ApiAccess,
        ActivityType::FileUpload,
        ActivityType::SettingsChange,
        ActivityType::DataExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Login => "login",
            ActivityType::Logout => "logout",
            ActivityType::ProfileUpdate => "profile_update",
            ActivityType::PasswordChange => "password_change",
            ActivityType::ApiAccess => "api_access",
            ActivityType::FileUpload => "file_upload",
            ActivityType::SettingsChange => "settings_change",
            ActivityType::DataExport => "data_export",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "login" => Ok(ActivityType::Login),
            "logout" => Ok(ActivityType::Logout),
            "profile_update" => Ok(ActivityType::ProfileUpdate),
            "password_change" => Ok(ActivityType::PasswordChange),
            "api_access" => Ok(ActivityType::ApiAccess),
            "file_upload" => Ok(ActivityType::FileUpload),
            "settings_change" => Ok(ActivityType::SettingsChange),
            "data_export" => Ok(ActivityType::DataExport),
            other => Err(AppError::InvalidActivityType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ActivityType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Append-only audit row. There is deliberately no update path for these.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub activity_type: ActivityType,
    pub description: String,
    pub metadata: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location_country: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for one audit record.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub activity_type: ActivityType,
    pub description: String,
    pub metadata: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location_country: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
}

impl NewActivity {
    pub fn new(user_id: Uuid, activity_type: ActivityType, description: impl Into<String>) -> Self {
        Self {
            user_id,
            activity_type,
            description: description.into(),
            metadata: None,
            ip_address: None,
            user_agent: None,
            location_country: None,
            location_city: None,
            location_region: None,
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = clamp(ip_address, ClientMeta::MAX_IP_LEN);
        self.user_agent = clamp(user_agent, ClientMeta::MAX_USER_AGENT_LEN);
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Coarse geo attribution attached by callers that resolve it.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, validator::Validate)]
pub struct ActivityLocation {
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub region: Option<String>,
}

/// Request body for POST /activities. The type arrives as a plain string so
/// that unknown kinds surface as InvalidActivityType instead of a parse
/// failure.
#[derive(Debug, Deserialize, JsonSchema, validator::Validate)]
pub struct LogActivityRequest {
    pub activity_type: String,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub metadata: Option<JsonValue>,
    #[validate(nested)]
    pub location: Option<ActivityLocation>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub activity_type: ActivityType,
    pub description: String,
    pub metadata: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<ActivityLocation>,
    pub timestamp: DateTime<Utc>,
}

impl From<&UserActivity> for ActivityResponse {
    fn from(activity: &UserActivity) -> Self {
        let location = if activity.location_country.is_some() || activity.location_city.is_some() || activity.location_region.is_some() {
            Some(ActivityLocation {
                country: activity.location_country.clone(),
                city: activity.location_city.clone(),
                region: activity.location_region.clone(),
            })
        } else {
            None
        };

        Self {
            id: activity.id,
            activity_type: activity.activity_type,
            description: activity.description.clone(),
            metadata: activity.metadata.clone(),
            ip_address: activity.ip_address.clone(),
            user_agent: activity.user_agent.clone(),
            location,
            timestamp: activity.timestamp,
        }
    }
}

/// One row of the per-type aggregation over a trailing window.
#[derive(Debug, Clone, Serialize, JsonSchema, sqlx::FromRow)]
pub struct ActivityStats {
    #[sqlx(try_from = "String")]
    pub activity_type: ActivityType,
    pub count: i64,
    pub last_activity: DateTime<Utc>,
}

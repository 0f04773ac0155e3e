use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bug status codes as the backend stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BugStatus {
    Open = 1,
    InProgress = 2,
    Resolved = 3,
    Closed = 4,
}

impl BugStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            BugStatus::Open => "Open",
            BugStatus::InProgress => "In Progress",
            BugStatus::Resolved => "Resolved",
            BugStatus::Closed => "Closed",
        }
    }
}

impl From<BugStatus> for u8 {
    fn from(status: BugStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for BugStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(BugStatus::Open),
            2 => Ok(BugStatus::InProgress),
            3 => Ok(BugStatus::Resolved),
            4 => Ok(BugStatus::Closed),
            other => Err(format!("unknown bug status code {other}")),
        }
    }
}

impl std::fmt::Display for BugStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BugPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl BugPriority {
    /// Rank used for priority sorting: Critical=4 down to Low=1.
    pub fn rank(self) -> u8 {
        match self {
            BugPriority::Critical => 4,
            BugPriority::High => 3,
            BugPriority::Medium => 2,
            BugPriority::Low => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BugPriority::Low => "Low",
            BugPriority::Medium => "Medium",
            BugPriority::High => "High",
            BugPriority::Critical => "Critical",
        }
    }
}

impl std::str::FromStr for BugPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" | "low" => Ok(BugPriority::Low),
            "Medium" | "medium" => Ok(BugPriority::Medium),
            "High" | "high" => Ok(BugPriority::High),
            "Critical" | "critical" => Ok(BugPriority::Critical),
            other => Err(format!("unknown priority {other:?}")),
        }
    }
}

impl std::fmt::Display for BugPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Developer,
    Reporter,
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(UserRole::Admin),
            "Developer" => Ok(UserRole::Developer),
            "Reporter" => Ok(UserRole::Reporter),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Admin => "Admin",
            UserRole::Developer => "Developer",
            UserRole::Reporter => "Reporter",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub priority: BugPriority,
    pub status: BugStatus,
    pub created_date: DateTime<Utc>,
    /// Not every backend deployment sends this yet; sorting falls back to
    /// created_date when it is absent.
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub assigned_to_name: Option<String>,
    #[serde(default)]
    pub reproduction_steps: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<BugAttachment>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugAttachment {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub length: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Identity decoded from the access token. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub can_report_bugs: bool,
}

// === auth payloads ===

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_name: String,
    pub email: String,
    pub password: String,
    pub role_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub can_report_bugs: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBug {
    pub bug_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user_id: String,
}

// === reference lists ===

#[derive(Debug, Clone, Deserialize)]
pub struct RoleInfo {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeverityLevel {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeveloperInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BugStatusInfo {
    pub id: u8,
    pub name: String,
}

/// The four reference lists fetched together for the dashboard and forms.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLists {
    pub roles: Vec<RoleInfo>,
    pub severity_levels: Vec<SeverityLevel>,
    pub developers: Vec<DeveloperInfo>,
    pub statuses: Vec<BugStatusInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for (code, status) in [
            (1u8, BugStatus::Open),
            (2, BugStatus::InProgress),
            (3, BugStatus::Resolved),
            (4, BugStatus::Closed),
        ] {
            assert_eq!(status.code(), code);
            assert_eq!(BugStatus::try_from(code).unwrap(), status);
        }
        assert!(BugStatus::try_from(5).is_err());
        assert!(BugStatus::try_from(0).is_err());
    }

    #[test]
    fn status_serializes_as_number() {
        let json = serde_json::to_string(&BugStatus::InProgress).unwrap();
        assert_eq!(json, "2");
        let back: BugStatus = serde_json::from_str("3").unwrap();
        assert_eq!(back, BugStatus::Resolved);
    }

    #[test]
    fn priority_rank_order() {
        assert_eq!(BugPriority::Critical.rank(), 4);
        assert_eq!(BugPriority::High.rank(), 3);
        assert_eq!(BugPriority::Medium.rank(), 2);
        assert_eq!(BugPriority::Low.rank(), 1);
    }

    #[test]
    fn bug_deserializes_from_camel_case() {
        let json = r#"{
            "id": "ab12",
            "title": "Login button dead",
            "priority": "High",
            "status": 1,
            "createdDate": "2025-03-01T10:00:00Z",
            "reporterName": "Sarah Reporter",
            "attachments": [{
                "id": "f1",
                "fileName": "shot.png",
                "contentType": "image/png",
                "length": 2048,
                "uploadedAt": "2025-03-01T10:01:00Z"
            }]
        }"#;
        let bug: Bug = serde_json::from_str(json).unwrap();
        assert_eq!(bug.status, BugStatus::Open);
        assert_eq!(bug.priority, BugPriority::High);
        assert!(bug.updated_date.is_none());
        assert_eq!(bug.attachments.as_ref().unwrap()[0].file_name, "shot.png");
        assert!(bug.description.is_none());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Role of whoever initiates a scheduling call. The chat-driven booking
/// flow acts on behalf of a patient and carries the patient role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Practitioner,
    Staff,
    Owner,
}

impl ActorRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "patient" => Some(ActorRole::Patient),
            "practitioner" | "doctor" | "dentist" => Some(ActorRole::Practitioner),
            "staff" | "receptionist" => Some(ActorRole::Staff),
            "owner" | "admin" => Some(ActorRole::Owner),
            _ => None,
        }
    }

    /// Privileged actors skip the approval step and may resolve requests.
    pub fn is_privileged(&self) -> bool {
        !matches!(self, ActorRole::Patient)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Practitioner => write!(f, "practitioner"),
            ActorRole::Staff => write!(f, "staff"),
            ActorRole::Owner => write!(f, "owner"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn actor_role(&self) -> Option<ActorRole> {
        self.role.as_deref().and_then(ActorRole::parse)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}

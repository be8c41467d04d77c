use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_TEAM: &str = "No Team";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slack mention markup for this user.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles are ordered by privilege: `Member < Leader < Exec`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Leader,
    Exec,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Exec, Role::Leader, Role::Member];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Leader => "leader",
            Self::Exec => "exec",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "member" => Some(Self::Member),
            "leader" => Some(Self::Leader),
            "exec" => Some(Self::Exec),
            _ => None,
        }
    }

    /// `exec, leader, member`, used in corrective replies.
    pub fn valid_values() -> String {
        Self::ALL.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| DomainError::InvalidRole { value: value.to_owned() })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub bits: i64,
    pub team: String,
    pub last_checkin_token: Option<String>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            role: Role::Member,
            bits: 0,
            team: DEFAULT_TEAM.to_owned(),
            last_checkin_token: None,
        }
    }

    /// A user is checked in for the current attendance period when the token
    /// recorded at their last check-in is the current password hash.
    pub fn is_checked_in(&self, current_password_hash: &str) -> bool {
        self.last_checkin_token.as_deref() == Some(current_password_hash)
    }
}

/// Orders users for the leaderboard: bits descending, ties broken by id.
pub fn leaderboard_order(left: &User, right: &User) -> std::cmp::Ordering {
    right.bits.cmp(&left.bits).then_with(|| left.id.cmp(&right.id))
}

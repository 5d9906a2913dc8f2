use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account details returned on login and cached alongside the tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub league_id: Option<i64>,
    pub league_name: Option<String>,
    pub budget: Option<i64>,
    pub overall_rating: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user_info: UserInfo,
}

/// New account plus the team it is assigned.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterDetails {
    pub username: String,
    pub email: String,
    pub password: String,
    pub team_name: String,
    pub arena_name: String,
    pub primary_color: String,
    pub secondary_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStanding {
    pub team_name: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_for: i64,
    pub points_against: i64,
    pub points_difference: i64,
    pub win_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub position_primary: String,
    pub rating: i64,
    pub market_value: i64,
    pub team_name: Option<String>,
    #[serde(default)]
    pub contract_years: u32,
    #[serde(default)]
    pub health_status: Option<String>,
    #[serde(default)]
    pub fitness: Option<i64>,
    #[serde(default)]
    pub is_injured: bool,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub weight: Option<i64>,
    /// Remaining skill ratings (shooting, rebounding, defense and so on).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Player {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    #[serde(default)]
    pub id: Option<i64>,
    pub league: Option<i64>,
    #[serde(default)]
    pub league_name: Option<String>,
    pub home_team_name: String,
    pub away_team_name: String,
    pub match_date: DateTime<Utc>,
    pub match_round: u32,
    pub home_team_score: Option<i64>,
    pub away_team_score: Option<i64>,
    #[serde(default)]
    pub completed: bool,
}

/// Server acknowledgement of a transfer. Only `detail` is stable across versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

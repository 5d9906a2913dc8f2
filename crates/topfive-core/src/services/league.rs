use crate::http::{ApiResult, AuthClient};
use crate::models::{Match, TeamStanding};

/// League tables and fixtures.
#[derive(Clone)]
pub struct LeagueService {
    client: AuthClient,
}

impl LeagueService {
    pub fn new(client: AuthClient) -> Self {
        Self { client }
    }

    pub async fn standings(&self, league_id: i64) -> ApiResult<Vec<TeamStanding>> {
        self.client
            .get_json(&format!("/leagues/{league_id}/standings/"))
            .await
    }

    pub async fn matches(&self, league_id: i64) -> ApiResult<Vec<Match>> {
        self.client
            .get_json(&format!("/matches/{league_id}/"))
            .await
    }

    pub async fn all_matches(&self) -> ApiResult<Vec<Match>> {
        self.client.get_json("/matches/").await
    }
}

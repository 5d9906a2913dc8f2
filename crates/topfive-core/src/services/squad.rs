use crate::http::{ApiResult, AuthClient};
use crate::models::{Player, TeamStanding};

/// Rosters for the signed-in manager's team and for other teams.
#[derive(Clone)]
pub struct SquadService {
    client: AuthClient,
}

impl SquadService {
    pub fn new(client: AuthClient) -> Self {
        Self { client }
    }

    pub async fn squad(&self) -> ApiResult<Vec<Player>> {
        self.client.get_json("/team/squad/").await
    }

    pub async fn team_squad(&self, team_id: i64) -> ApiResult<Vec<Player>> {
        self.client
            .get_json(&format!("/teams/{team_id}/squad/"))
            .await
    }

    pub async fn team_standing(&self, team_id: i64) -> ApiResult<TeamStanding> {
        self.client
            .get_json(&format!("/teams/{team_id}/standing/"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;
    use crate::config::ClientConfig;
    use httpmock::prelude::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn other_team_squad_uses_team_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/teams/4/squad/");
            then.status(200).json_body(serde_json::json!([{
                "id": 11,
                "first_name": "Lou",
                "last_name": "Post",
                "age": 29,
                "position_primary": "C",
                "rating": 70,
                "market_value": 450000,
                "team_name": "Owls",
                "rebounding": 82
            }]));
        });

        let config = ClientConfig::new(&format!("{}/api", server.base_url())).unwrap();
        let store = Arc::new(MemoryCredentialStore::with_tokens(Some("A1"), Some("R1")));
        let squad = SquadService::new(AuthClient::new(config, store).unwrap())
            .team_squad(4)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(squad[0].full_name(), "Lou Post");
        assert_eq!(squad[0].contract_years, 0);
        assert_eq!(squad[0].attributes["rebounding"], 82);
    }

    #[tokio::test]
    async fn team_standing_reads_single_row() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/teams/4/standing/")
                .header("authorization", "Bearer A1");
            then.status(200).json_body(serde_json::json!({
                "team_name": "Owls",
                "games_played": 6,
                "wins": 2,
                "losses": 4,
                "points_for": 480,
                "points_against": 502,
                "points_difference": -22,
                "win_percentage": 0.333
            }));
        });

        let config = ClientConfig::new(&format!("{}/api", server.base_url())).unwrap();
        let store = Arc::new(MemoryCredentialStore::with_tokens(Some("A1"), Some("R1")));
        let standing = SquadService::new(AuthClient::new(config, store).unwrap())
            .team_standing(4)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(standing.team_name, "Owls");
        assert_eq!(standing.points_difference, -22);
    }
}

use serde::Serialize;
use thiserror::Error;

use crate::http::{ApiError, AuthClient};
use crate::models::{Player, PurchaseReceipt};

const CONTRACT_YEARS: std::ops::RangeInclusive<u32> = 1..=5;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("contract length must be between 1 and 5 years, got {0}")]
    InvalidContractLength(u32),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Transfer market listing and purchases.
#[derive(Clone)]
pub struct TransferService {
    client: AuthClient,
}

impl TransferService {
    pub fn new(client: AuthClient) -> Self {
        Self { client }
    }

    /// Free agents and players offered by other teams.
    pub async fn market(&self) -> Result<Vec<Player>, ApiError> {
        self.client.get_json("/players/transfer-market/").await
    }

    pub async fn buy(
        &self,
        player_id: i64,
        contract_years: u32,
    ) -> Result<PurchaseReceipt, TransferError> {
        #[derive(Serialize)]
        struct Offer {
            contract_years: u32,
        }

        if !CONTRACT_YEARS.contains(&contract_years) {
            return Err(TransferError::InvalidContractLength(contract_years));
        }

        let receipt = self
            .client
            .post_json(
                &format!("/players/{player_id}/buy/"),
                &Offer { contract_years },
            )
            .await?;
        Ok(receipt)
    }
}

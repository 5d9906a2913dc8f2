pub mod league;
pub mod squad;
pub mod transfers;

pub use league::LeagueService;
pub use squad::SquadService;
pub use transfers::{TransferError, TransferService};

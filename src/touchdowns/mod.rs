pub mod aggregator;
pub mod extractor;
pub mod probability;
pub mod sync;

pub use probability::{estimate_player_probabilities, predict_first_scorers};
pub use sync::{sync_season, sync_week, SyncOptions};

pub mod rows;
pub mod schema;
pub mod store;

pub use rows::{LeaderboardRow, LogCounters, LogEventKind, PlayerRecord, ServerTotals};
pub use store::Store;

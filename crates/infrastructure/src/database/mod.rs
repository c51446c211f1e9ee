pub mod manager;
pub mod memory;
pub mod postgres;

pub use manager::DatabaseManager;
pub use memory::*;
pub use postgres::*;

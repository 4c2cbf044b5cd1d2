pub mod errors;
pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;

pub use errors::DbError;
pub use memory::MemoryDatabase;
pub use models::*;
pub use repositories::*;

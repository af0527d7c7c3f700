pub mod memory_store;
pub mod models;
pub mod pool;
pub mod repository;
pub mod schema;

pub use memory_store::InMemoryChatStore;
pub use models::*;
pub use pool::DbPool;
pub use repository::PgChatStore;
pub use schema::ensure_schema;

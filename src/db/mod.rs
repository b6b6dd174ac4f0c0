pub mod gateway;
pub mod pool;
pub mod schema;

pub use gateway::Gateway;
pub use pool::ConnectionPool;

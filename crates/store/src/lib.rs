mod convert;

mod postgres;
pub use postgres::PgEntityStore;

mod memory;
pub use memory::MemEntityStore;

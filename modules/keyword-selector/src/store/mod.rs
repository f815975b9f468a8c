pub mod postgres;

pub use postgres::PgSignalReader;

pub mod postgres;

pub use postgres::{BudgetReservation, PostgresStore, TransactionFilter};

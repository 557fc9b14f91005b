pub mod money;
pub mod record;

pub use money::Money;
pub use record::{BankRecord, CashflowTransaction, Direction};

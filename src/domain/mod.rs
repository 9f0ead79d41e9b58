pub mod money;
pub mod transaction;

pub use transaction::{
    check_transition, generate_tx_ref, Customer, PaymentMethod, Transaction, Transition, TxStatus,
};

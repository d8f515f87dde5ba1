pub mod confirm;
pub mod send;

pub use confirm::{ReceiptWaitConfig, wait_for_user_op_receipt};
pub use send::SmartAccountClient;

pub mod atomic_batch;
pub mod user_op;

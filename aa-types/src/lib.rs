pub mod userop;

pub use userop::{
    UserOpError, compute_user_op_v07_hash, packed_init_code, packed_paymaster_and_data,
};

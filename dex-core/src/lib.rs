pub mod contracts;
pub mod swap;

pub use swap::{DexAddresses, Quote, SwapHelper, SwapPlan, SwapRequest, min_amount_out};

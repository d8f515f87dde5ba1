use alloy::primitives::{Bytes, U256};
use batchwire_core::{
    error::FlowError,
    transaction::{Batch, CallRequest, parse_ether_amount, validate_recipient},
};

/// Accumulates calls for one batch. Recipients are checked on entry.
#[derive(Debug, Clone, Default)]
pub struct CallBatchBuilder {
    calls: Vec<CallRequest>,
}

impl CallBatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call and returns its position.
    pub fn add(&mut self, call: CallRequest) -> Result<usize, FlowError> {
        validate_recipient(&call.to)?;
        self.calls.push(call);
        Ok(self.calls.len() - 1)
    }

    /// Appends a plain transfer of a decimal ether amount.
    pub fn add_transfer(&mut self, to: &str, ether_amount: &str) -> Result<usize, FlowError> {
        let value = parse_ether_amount(ether_amount)?;
        self.add(CallRequest::new(to, value))
    }

    pub fn add_contract_call(
        &mut self,
        to: &str,
        data: Bytes,
        value: U256,
    ) -> Result<usize, FlowError> {
        self.add(CallRequest::new(to, value).with_data(data))
    }

    pub fn calls(&self) -> &[CallRequest] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Snapshot of the current entries as a batch.
    pub fn build(&self, version: &str, atomic_required: bool) -> Batch {
        Batch {
            calls: self.calls.clone(),
            version: version.to_string(),
            atomic_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchwire_core::constants::SEND_CALLS_VERSION;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn bad_recipients_never_enter_the_batch() {
        let mut builder = CallBatchBuilder::new();
        assert!(matches!(
            builder.add_transfer("0x1234", "0.01"),
            Err(FlowError::InvalidRecipient { .. })
        ));
        assert!(matches!(
            builder.add_transfer(A, "lots"),
            Err(FlowError::InvalidAmount { .. })
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn build_preserves_entry_order() {
        let mut builder = CallBatchBuilder::new();
        assert_eq!(builder.add_transfer(A, "0.01").unwrap(), 0);
        assert_eq!(builder.add_transfer(B, "0.02").unwrap(), 1);

        let batch = builder.build(SEND_CALLS_VERSION, true);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.calls[0].to, A);
        assert_eq!(batch.calls[1].value, parse_ether_amount("0.02").unwrap());
        assert!(batch.atomic_required);
        assert_eq!(batch.version, "2.0.0");

        builder.clear();
        assert!(builder.build(SEND_CALLS_VERSION, true).is_empty());
    }
}

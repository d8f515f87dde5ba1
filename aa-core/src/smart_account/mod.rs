use alloy::{
    primitives::{Address, Bytes},
    providers::Provider,
    sol,
    sol_types::SolCall,
};
use batchwire_core::{
    chain::Chain,
    error::{AlloyRpcErrorToFlowError, FlowError},
    transaction::Call,
};

sol! {
    function execute(address _target, uint256 _value, bytes _calldata);
}

sol! {
    function executeBatch(address[] _target, uint256[] _value, bytes[] _calldata);
}

pub trait SmartAccount {
    fn address(&self) -> &Address;

    #[allow(async_fn_in_trait)]
    async fn is_deployed(&self, chain: &impl Chain) -> Result<bool, FlowError> {
        let code = chain
            .provider()
            .get_code_at(*self.address())
            .await
            .map_err(|e| e.to_flow_error(chain))?;

        Ok(!code.is_empty())
    }

    fn encode_execute(&self, call: &Call) -> Bytes {
        executeCall {
            _target: call.to,
            _value: call.value,
            _calldata: call.data_or_empty(),
        }
        .abi_encode()
        .into()
    }

    fn encode_execute_batch(&self, calls: &[Call]) -> Bytes {
        executeBatchCall {
            _target: calls.iter().map(|call| call.to).collect(),
            _value: calls.iter().map(|call| call.value).collect(),
            _calldata: calls.iter().map(Call::data_or_empty).collect(),
        }
        .abi_encode()
        .into()
    }

    /// `execute` for a single call, `executeBatch` otherwise.
    fn encode_calls(&self, calls: &[Call]) -> Bytes {
        match calls {
            [single] => self.encode_execute(single),
            _ => self.encode_execute_batch(calls),
        }
    }
}

/// A smart account bound to its owner and factory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmartAccountHandle {
    pub address: Address,
    pub owner: Address,
    pub factory_address: Address,
    pub implementation_address: Address,
    pub salt_data: Bytes,
    /// `createAccount` calldata, sent as factory data until the account is deployed.
    pub init_calldata: Bytes,
}

impl SmartAccount for SmartAccountHandle {
    fn address(&self) -> &Address {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{U256, address, bytes};
    use batchwire_core::rpc_clients::mock::ScriptedTransport;
    use batchwire_core::chain::NodeChain;

    fn handle() -> SmartAccountHandle {
        SmartAccountHandle {
            address: address!("0x1111111111111111111111111111111111111111"),
            owner: address!("0x2222222222222222222222222222222222222222"),
            factory_address: Address::ZERO,
            implementation_address: Address::ZERO,
            salt_data: Bytes::new(),
            init_calldata: Bytes::new(),
        }
    }

    #[test]
    fn single_call_uses_execute() {
        let call = Call::transfer(
            address!("0x3333333333333333333333333333333333333333"),
            U256::from(5),
        );
        let encoded = handle().encode_calls(std::slice::from_ref(&call));
        assert_eq!(&encoded[..4], &executeCall::SELECTOR);

        let decoded = executeCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded._target, call.to);
        assert_eq!(decoded._value, U256::from(5));
        assert!(decoded._calldata.is_empty());
    }

    #[test]
    fn batch_keeps_call_order() {
        let calls = vec![
            Call::transfer(address!("0x3333333333333333333333333333333333333333"), U256::from(1)),
            Call {
                to: address!("0x4444444444444444444444444444444444444444"),
                value: U256::ZERO,
                data: Some(bytes!("0xabcd")),
            },
        ];
        let encoded = handle().encode_calls(&calls);
        let decoded = executeBatchCall::abi_decode(&encoded).unwrap();

        assert_eq!(decoded._target, vec![calls[0].to, calls[1].to]);
        assert_eq!(decoded._calldata[1], bytes!("0xabcd"));
    }

    #[tokio::test]
    async fn deployment_is_read_from_code() {
        let transport = ScriptedTransport::new();
        transport.push_success("eth_getCode", "0x");
        transport.push_success("eth_getCode", "0x6080");

        let chain = NodeChain::from_parts(
            84532,
            "http://node.invalid".parse().unwrap(),
            "http://bundler.invalid".parse().unwrap(),
            transport.provider(),
            transport.bundler_client(),
        );

        assert!(!handle().is_deployed(&chain).await.unwrap());
        assert!(handle().is_deployed(&chain).await.unwrap());
    }
}

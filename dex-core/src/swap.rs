//! Uniswap V3 single-hop quoting and swap call construction.

use alloy::primitives::{
    Address, Bytes, U256,
    aliases::{U24, U160},
};
use alloy::sol_types::SolCall;
use batchwire_core::{
    chain::Chain,
    constants::{
        UNISWAP_V3_FACTORY_BASE_SEPOLIA, UNISWAP_V3_QUOTER_V2_BASE_SEPOLIA,
        UNISWAP_V3_ROUTER_BASE_SEPOLIA, WETH_OP_STACK,
    },
    error::{ContractErrorToFlowError, FlowError},
    transaction::Call,
};
use serde::{Deserialize, Serialize};

use crate::contracts::{IQuoterV2, ISwapRouter, IUniswapV3Factory, IWETH9};

const BPS_DENOMINATOR: u64 = 10_000;

/// Seconds a swap stays valid when no deadline is given.
pub const DEFAULT_DEADLINE_SECS: i64 = 1200;

/// 0.3% pool
pub const DEFAULT_FEE: u32 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexAddresses {
    pub factory: Address,
    pub quoter: Address,
    pub router: Address,
    pub weth: Address,
}

impl Default for DexAddresses {
    fn default() -> Self {
        Self {
            factory: UNISWAP_V3_FACTORY_BASE_SEPOLIA,
            quoter: UNISWAP_V3_QUOTER_V2_BASE_SEPOLIA,
            router: UNISWAP_V3_ROUTER_BASE_SEPOLIA,
            weth: WETH_OP_STACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub pool: Address,
    pub amount_out: U256,
    pub gas_estimate: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub amount_in: U256,
    pub slippage_bps: u16,
    pub token_in: Address,
    pub token_out: Address,
    pub recipient: Address,
    pub fee: u32,
    /// Unix seconds; `now + 1200` when unset.
    pub deadline: Option<u64>,
}

/// A quoted swap ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub quote: Quote,
    pub min_amount_out: U256,
    pub deadline: U256,
    pub calldata: Bytes,
}

/// `amount_out` minus the slippage allowance, with the allowance rounded down.
///
/// Exact over the whole `U256` range; slippage above 10000 bps is rejected.
pub fn min_amount_out(amount_out: U256, slippage_bps: u16) -> Result<U256, FlowError> {
    if u64::from(slippage_bps) > BPS_DENOMINATOR {
        return Err(FlowError::ValidationError {
            message: format!("Slippage of {slippage_bps} bps exceeds 100%"),
        });
    }

    // floor(a * bps / D) == (a / D) * bps + floor((a % D) * bps / D), neither term can overflow
    let denominator = U256::from(BPS_DENOMINATOR);
    let bps = U256::from(slippage_bps);
    let (whole, rest) = amount_out.div_rem(denominator);
    let allowance = whole * bps + rest * bps / denominator;

    amount_out
        .checked_sub(allowance)
        .ok_or_else(|| FlowError::InternalError {
            message: format!("Slippage allowance {allowance} exceeds {amount_out}"),
        })
}

pub fn default_deadline() -> U256 {
    U256::from((chrono::Utc::now().timestamp() + DEFAULT_DEADLINE_SECS).max(0))
}

fn fee_tier(fee: u32) -> Result<U24, FlowError> {
    U24::try_from(fee).map_err(|_| FlowError::ValidationError {
        message: format!("Fee tier {fee} does not fit in uint24"),
    })
}

/// Router calldata for a single-hop exact-input swap without a price limit.
pub fn encode_exact_input_single(
    request: &SwapRequest,
    amount_out_minimum: U256,
    deadline: U256,
) -> Result<Bytes, FlowError> {
    Ok(ISwapRouter::exactInputSingleCall {
        params: ISwapRouter::ExactInputSingleParams {
            tokenIn: request.token_in,
            tokenOut: request.token_out,
            fee: fee_tier(request.fee)?,
            recipient: request.recipient,
            deadline,
            amountIn: request.amount_in,
            amountOutMinimum: amount_out_minimum,
            sqrtPriceLimitX96: U160::ZERO,
        },
    }
    .abi_encode()
    .into())
}

/// Wraps native currency into WETH.
pub fn wrap_eth_call(weth: Address, amount: U256) -> Call {
    Call::contract_call(weth, &IWETH9::depositCall {}, amount)
}

pub fn approve_call(token: Address, spender: Address, amount: U256) -> Call {
    Call::erc20_approve(token, spender, amount)
}

pub struct SwapHelper<'a, C: Chain> {
    chain: &'a C,
    addresses: DexAddresses,
}

impl<'a, C: Chain> SwapHelper<'a, C> {
    pub fn new(chain: &'a C, addresses: DexAddresses) -> Self {
        Self { chain, addresses }
    }

    pub fn addresses(&self) -> &DexAddresses {
        &self.addresses
    }

    /// Finds the pool for the pair and simulates an exact-input swap through the quoter.
    #[tracing::instrument(skip(self), fields(chain_id = self.chain.chain_id()))]
    pub async fn quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        fee: u32,
    ) -> Result<Quote, FlowError> {
        let factory = self.addresses.factory;
        let pool = IUniswapV3Factory::new(factory, self.chain.provider().clone())
            .getPool(token_in, token_out, fee_tier(fee)?)
            .call()
            .await
            .map_err(|e| e.to_flow_error(self.chain.chain_id(), Some(factory)))?;

        if pool == Address::ZERO {
            return Err(FlowError::PoolNotFound {
                token_in,
                token_out,
                fee,
            });
        }

        let quoted = IQuoterV2::new(self.addresses.quoter, self.chain.provider().clone())
            .quoteExactInputSingle(IQuoterV2::QuoteExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                amountIn: amount_in,
                fee: fee_tier(fee)?,
                sqrtPriceLimitX96: U160::ZERO,
            })
            .call()
            .await
            .map_err(|e| FlowError::SwapFailed {
                message: format!("Quote simulation failed: {e}"),
            })?;

        tracing::debug!(%pool, amount_out = %quoted.amountOut, "quote received");

        Ok(Quote {
            pool,
            amount_out: quoted.amountOut,
            gas_estimate: quoted.gasEstimate,
        })
    }

    /// Quotes the swap and encodes it with the slippage-adjusted minimum output.
    pub async fn build_swap_calldata(&self, request: &SwapRequest) -> Result<SwapPlan, FlowError> {
        // rejects bad slippage before any node round-trip
        min_amount_out(U256::ZERO, request.slippage_bps)?;

        let quote = self
            .quote(
                request.amount_in,
                request.token_in,
                request.token_out,
                request.fee,
            )
            .await?;
        let min_amount_out = min_amount_out(quote.amount_out, request.slippage_bps)?;
        let deadline = request
            .deadline
            .map(U256::from)
            .unwrap_or_else(default_deadline);

        Ok(SwapPlan {
            quote,
            min_amount_out,
            deadline,
            calldata: encode_exact_input_single(request, min_amount_out, deadline)?,
        })
    }

    /// Approve-then-swap, to be sent together as one batch.
    pub async fn swap_calls(&self, request: &SwapRequest) -> Result<(SwapPlan, Vec<Call>), FlowError> {
        let plan = self.build_swap_calldata(request).await?;
        let calls = vec![
            approve_call(request.token_in, self.addresses.router, request.amount_in),
            Call {
                to: self.addresses.router,
                value: U256::ZERO,
                data: Some(plan.calldata.clone()),
            },
        ];
        Ok((plan, calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        hex,
        primitives::address,
        sol_types::SolValue,
    };
    use batchwire_core::{
        chain::NodeChain, constants::USDC_BASE_SEPOLIA, rpc_clients::mock::ScriptedTransport,
    };

    const POOL: Address = address!("0x46880b404CD35c165EDdefF7421019F8dD25F4Ad");

    fn chain(transport: &ScriptedTransport) -> NodeChain {
        NodeChain::from_parts(
            84532,
            "http://node.invalid".parse().unwrap(),
            "http://bundler.invalid".parse().unwrap(),
            transport.provider(),
            transport.bundler_client(),
        )
    }

    fn request() -> SwapRequest {
        SwapRequest {
            amount_in: U256::from(1_000_000_000_000u64),
            slippage_bps: 50,
            token_in: WETH_OP_STACK,
            token_out: USDC_BASE_SEPOLIA,
            recipient: address!("0x1111111111111111111111111111111111111111"),
            fee: DEFAULT_FEE,
            deadline: Some(1_700_000_000),
        }
    }

    fn script_quote(transport: &ScriptedTransport, amount_out: u64) {
        transport.push_success("eth_call", hex::encode_prefixed(POOL.abi_encode()));
        transport.push_success(
            "eth_call",
            hex::encode_prefixed(
                (U256::from(amount_out), U160::from(1u64), 3u32, U256::from(90_000u64))
                    .abi_encode_params(),
            ),
        );
    }

    #[test]
    fn min_amount_out_floors() {
        assert_eq!(
            min_amount_out(U256::from(1_000_000), 50).unwrap(),
            U256::from(995_000)
        );
        assert_eq!(min_amount_out(U256::from(999), 1).unwrap(), U256::from(999));
        assert_eq!(min_amount_out(U256::from(1_000), 10_000).unwrap(), U256::ZERO);
    }

    #[test]
    fn min_amount_out_is_exact_near_u256_max() {
        let whole = U256::MAX / U256::from(10_000);

        assert_eq!(
            min_amount_out(whole * U256::from(10_000), 50).unwrap(),
            whole * U256::from(9_950)
        );
        // remainder 9999 loses floor(9999 * 50 / 10000) = 49 on top
        let below = whole - U256::from(1);
        assert_eq!(
            min_amount_out(below * U256::from(10_000) + U256::from(9_999), 50).unwrap(),
            below * U256::from(9_950) + U256::from(9_950)
        );
        assert_eq!(min_amount_out(U256::MAX, 0).unwrap(), U256::MAX);
        assert_eq!(min_amount_out(U256::MAX, 10_000).unwrap(), U256::ZERO);
    }

    #[test]
    fn min_amount_out_rejects_slippage_above_full_amount() {
        assert!(matches!(
            min_amount_out(U256::from(1_000), 10_001),
            Err(FlowError::ValidationError { .. })
        ));
    }

    #[test]
    fn wrap_and_approve_calls() {
        let wrap = wrap_eth_call(WETH_OP_STACK, U256::from(7));
        assert_eq!(wrap.value, U256::from(7));
        assert_eq!(wrap.data.unwrap().as_ref(), IWETH9::depositCall::SELECTOR);

        let approve = approve_call(USDC_BASE_SEPOLIA, UNISWAP_V3_ROUTER_BASE_SEPOLIA, U256::from(9));
        assert_eq!(approve.to, USDC_BASE_SEPOLIA);
        assert_eq!(approve.value, U256::ZERO);
    }

    #[test]
    fn default_deadline_is_in_the_future() {
        let now = U256::from(chrono::Utc::now().timestamp());
        assert!(default_deadline() >= now + U256::from(DEFAULT_DEADLINE_SECS - 1));
    }

    #[tokio::test]
    async fn missing_pool_is_reported() {
        let transport = ScriptedTransport::new();
        transport.push_success("eth_call", hex::encode_prefixed(Address::ZERO.abi_encode()));
        let chain = chain(&transport);

        let err = SwapHelper::new(&chain, DexAddresses::default())
            .quote(U256::from(1), WETH_OP_STACK, USDC_BASE_SEPOLIA, 500)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FlowError::PoolNotFound {
                token_in: WETH_OP_STACK,
                token_out: USDC_BASE_SEPOLIA,
                fee: 500
            }
        );
        assert_eq!(transport.call_count("eth_call"), 1);
    }

    #[tokio::test]
    async fn swap_calldata_uses_slippage_adjusted_minimum() {
        let transport = ScriptedTransport::new();
        script_quote(&transport, 1_000_000);
        let chain = chain(&transport);
        let helper = SwapHelper::new(&chain, DexAddresses::default());

        let (plan, calls) = helper.swap_calls(&request()).await.unwrap();

        assert_eq!(plan.quote.pool, POOL);
        assert_eq!(plan.min_amount_out, U256::from(995_000));
        assert_eq!(plan.deadline, U256::from(1_700_000_000u64));

        let decoded = ISwapRouter::exactInputSingleCall::abi_decode(&plan.calldata).unwrap();
        assert_eq!(decoded.params.amountOutMinimum, U256::from(995_000));
        assert_eq!(decoded.params.fee, U24::from(3000));
        assert_eq!(decoded.params.recipient, request().recipient);
        assert_eq!(decoded.params.sqrtPriceLimitX96, U160::ZERO);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to, WETH_OP_STACK);
        assert_eq!(calls[1].to, UNISWAP_V3_ROUTER_BASE_SEPOLIA);
    }

    #[tokio::test]
    async fn failed_simulation_is_a_swap_failure() {
        let transport = ScriptedTransport::new();
        transport.push_success("eth_call", hex::encode_prefixed(POOL.abi_encode()));
        transport.push_error("eth_call", 3, "execution reverted: SPL");
        let chain = chain(&transport);

        let err = SwapHelper::new(&chain, DexAddresses::default())
            .quote(U256::from(1), WETH_OP_STACK, USDC_BASE_SEPOLIA, DEFAULT_FEE)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::SwapFailed { .. }));
    }

    #[tokio::test]
    async fn excessive_slippage_is_rejected_before_quoting() {
        let transport = ScriptedTransport::new();
        let chain = chain(&transport);
        let mut request = request();
        request.slippage_bps = 10_001;

        assert!(matches!(
            SwapHelper::new(&chain, DexAddresses::default())
                .build_swap_calldata(&request)
                .await,
            Err(FlowError::ValidationError { .. })
        ));
        assert!(transport.calls().is_empty());
    }
}

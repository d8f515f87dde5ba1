
use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, U256, address, bytes};
use batchwire_core::{
    constants::SEND_CALLS_VERSION,
    error::FlowError,
    rpc_clients::mock::ScriptedTransport,
    transaction::{Batch, CallRequest},
};
use batchwire_executors::atomic_batch::{
    BatchHandle, BatchSubmitter, PollConfig, PollOutcome, StaticChainMetadata,
};
use batchwire_wallet_core::{
    CallBatchBuilder, ConnectionManager, ProviderDetail, ProviderInfo, WalletProvider,
};
use fixtures::{RECIPIENT_A, RECIPIENT_B, calls_status, setup_tracing};
use serde_json::json;

const SEPOLIA: u64 = 0xaa36a7;
const FROM: Address = address!("0x9999999999999999999999999999999999999999");

fn submitter(transport: &ScriptedTransport) -> BatchSubmitter<StaticChainMetadata> {
    let metadata = StaticChainMetadata::new([(SEPOLIA, "https://sepolia.etherscan.io".to_string())]);
    BatchSubmitter::new(transport.wallet_client(), Arc::new(metadata)).with_poll_config(PollConfig {
        interval: Duration::from_secs(1),
        max_attempts: 5,
    })
}

fn two_transfers() -> Batch {
    let mut builder = CallBatchBuilder::new();
    builder.add_transfer(RECIPIENT_A, "0.01").unwrap();
    builder.add_transfer(RECIPIENT_B, "0.02").unwrap();
    builder.build(SEND_CALLS_VERSION, true)
}

fn handle(id: &str) -> BatchHandle {
    BatchHandle {
        id: id.to_string(),
        chain_id: SEPOLIA,
        from: FROM,
        call_count: 1,
    }
}

#[tokio::test]
async fn empty_batch_never_reaches_wallet() {
    let transport = ScriptedTransport::new();

    let err = submitter(&transport)
        .submit(Batch::new(vec![]), FROM, SEPOLIA)
        .await
        .unwrap_err();

    assert_eq!(err, FlowError::EmptyBatch);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn chains_outside_allow_list_are_rejected_locally() {
    let transport = ScriptedTransport::new();

    let err = submitter(&transport)
        .submit(two_transfers(), FROM, 0x89)
        .await
        .unwrap_err();

    match err {
        FlowError::NetworkUnsupported {
            chain_id,
            network,
            supported,
        } => {
            assert_eq!(chain_id, 0x89);
            assert_eq!(network, "Polygon Mainnet");
            assert!(supported.contains(&"Gnosis Chiado".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn malformed_recipient_reports_index_without_network_call() {
    let transport = ScriptedTransport::new();
    let batch = Batch::new(vec![
        CallRequest::new(RECIPIENT_A, U256::from(1)),
        CallRequest::new("0x12", U256::from(1)),
    ]);

    let err = submitter(&transport)
        .submit(batch, FROM, SEPOLIA)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FlowError::InvalidRecipient {
            index: Some(1),
            recipient: "0x12".to_string()
        }
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn send_calls_carries_ordered_calls_and_atomic_flags() {
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_sendCalls", json!({ "id": "0xabc" }));
    let mut batch = two_transfers();
    batch.calls[1] = batch.calls[1].clone().with_data(bytes!("0xa9059cbb"));

    let handle = submitter(&transport)
        .submit(batch, FROM, 0x64)
        .await
        .unwrap();

    assert_eq!(handle.id, "0xabc");
    assert_eq!(handle.call_count, 2);

    let params = &transport.calls_to("wallet_sendCalls")[0].params[0];
    assert_eq!(params["version"], "2.0.0");
    assert_eq!(params["chainId"], "0x64");
    assert_eq!(params["atomicRequired"], true);
    assert_eq!(params["calls"][0]["to"], RECIPIENT_A);
    assert_eq!(params["calls"][0]["value"], "0x2386f26fc10000");
    assert_eq!(params["calls"][1]["data"], "0xa9059cbb");
}

#[tokio::test]
async fn bare_string_id_is_accepted() {
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_sendCalls", "0xlegacy");

    let handle = submitter(&transport)
        .submit(two_transfers(), FROM, 0x1)
        .await
        .unwrap();

    assert_eq!(handle.id, "0xlegacy");
}

#[tokio::test]
async fn wallet_errors_are_classified() {
    let transport = ScriptedTransport::new();
    transport.push_error("wallet_sendCalls", 4200, "The requested method is not supported");
    transport.push_error("wallet_sendCalls", -32000, "Account upgrade required.");
    transport.push_error("wallet_sendCalls", 4001, "User denied");
    let submitter = submitter(&transport);

    assert!(matches!(
        submitter.submit(two_transfers(), FROM, SEPOLIA).await,
        Err(FlowError::UnsupportedMethod { .. })
    ));
    assert!(matches!(
        submitter.submit(two_transfers(), FROM, SEPOLIA).await,
        Err(FlowError::AccountUpgradeRequired { .. })
    ));
    assert_eq!(
        submitter.submit(two_transfers(), FROM, SEPOLIA).await,
        Err(FlowError::SubmissionFailed {
            message: "User denied".to_string()
        })
    );
}

#[tokio::test]
async fn single_status_round_trip() {
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_getCallsStatus", calls_status(202, None));

    let status = submitter(&transport)
        .poll_status(&handle("0xabc"))
        .await
        .unwrap();

    assert!(status.is_pending());
    assert!(status.receipts.is_empty());
    assert_eq!(
        transport.calls_to("wallet_getCallsStatus")[0].params,
        json!(["0xabc"])
    );
}

#[tokio::test(start_paused = true)]
async fn polling_stops_at_first_confirmed_status() {
    setup_tracing();
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_getCallsStatus", calls_status(202, None));
    transport.push_success("wallet_getCallsStatus", calls_status(202, None));
    transport.push_success("wallet_getCallsStatus", calls_status(200, Some("0xdead")));
    transport.set_sticky("wallet_getCallsStatus", calls_status(202, None));

    let outcome = submitter(&transport)
        .watch(handle("0xabc"))
        .outcome()
        .await
        .unwrap();

    match outcome {
        PollOutcome::Confirmed {
            status,
            explorer_url,
        } => {
            assert!(status.is_confirmed());
            assert_eq!(
                explorer_url.as_deref(),
                Some("https://sepolia.etherscan.io/tx/0xdead")
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(transport.call_count("wallet_getCallsStatus"), 3);
}

#[tokio::test(start_paused = true)]
async fn confirmed_on_chain_without_explorer_has_no_url() {
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_getCallsStatus", calls_status(200, Some("0xdead")));
    let mut unknown = handle("0xabc");
    unknown.chain_id = 0x64;

    let outcome = submitter(&transport).watch(unknown).outcome().await.unwrap();

    assert!(matches!(
        outcome,
        PollOutcome::Confirmed {
            explorer_url: None,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn non_pending_codes_are_terminal() {
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_getCallsStatus", calls_status(202, None));
    transport.push_success("wallet_getCallsStatus", calls_status(400, None));

    let outcome = submitter(&transport)
        .watch(handle("0xabc"))
        .outcome()
        .await
        .unwrap();

    match outcome {
        PollOutcome::Terminal { status } => assert_eq!(status.status, 400),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn ceiling_bounds_the_number_of_polls() {
    let transport = ScriptedTransport::new();
    transport.set_sticky("wallet_getCallsStatus", calls_status(202, None));

    let outcome = submitter(&transport)
        .watch_with(
            handle("0xabc"),
            PollConfig {
                interval: Duration::from_millis(500),
                max_attempts: 3,
            },
        )
        .outcome()
        .await
        .unwrap();

    assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
    assert_eq!(transport.call_count("wallet_getCallsStatus"), 3);
}

#[tokio::test(start_paused = true)]
async fn transport_hiccups_are_retried_but_wallet_errors_end_polling() {
    let transport = ScriptedTransport::new();
    transport.push_transport_failure("wallet_getCallsStatus", "connection reset");
    transport.push_success("wallet_getCallsStatus", calls_status(200, Some("0xdead")));
    let submitter = submitter(&transport);

    assert!(matches!(
        submitter.watch(handle("0xabc")).outcome().await,
        Ok(PollOutcome::Confirmed { .. })
    ));
    assert_eq!(transport.call_count("wallet_getCallsStatus"), 2);

    transport.push_error("wallet_getCallsStatus", 5730, "Unknown bundle id");
    assert!(matches!(
        submitter.watch(handle("0xabc")).outcome().await,
        Err(FlowError::WalletRpcError { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn cancelled_poller_reports_cancellation() {
    let transport = ScriptedTransport::new();
    transport.set_sticky("wallet_getCallsStatus", calls_status(202, None));

    let poll = submitter(&transport).watch(handle("0xabc"));
    poll.cancel();

    assert_eq!(
        poll.outcome().await,
        Err(FlowError::PollCancelled {
            batch_id: "0xabc".to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn new_submission_cancels_previous_poller() {
    let transport = ScriptedTransport::new();
    transport.set_sticky("wallet_getCallsStatus", calls_status(202, None));
    transport.set_sticky("wallet_sendCalls", json!({ "id": "0xdef" }));
    let submitter = submitter(&transport);

    let first = submitter.watch(handle("0xabc"));
    submitter.submit(two_transfers(), FROM, SEPOLIA).await.unwrap();

    assert!(matches!(
        first.outcome().await,
        Err(FlowError::PollCancelled { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_keeps_previous_poller() {
    let transport = ScriptedTransport::new();
    transport.push_success("wallet_getCallsStatus", calls_status(202, None));
    transport.push_success("wallet_getCallsStatus", calls_status(200, Some("0xdead")));
    transport.push_error("wallet_sendCalls", -32000, "Account upgrade required.");
    let submitter = submitter(&transport);

    let first = submitter.watch(handle("0xabc"));
    assert!(matches!(
        submitter.submit(two_transfers(), FROM, SEPOLIA).await,
        Err(FlowError::AccountUpgradeRequired { .. })
    ));

    assert!(matches!(
        first.outcome().await,
        Ok(PollOutcome::Confirmed { .. })
    ));
    assert_eq!(transport.call_count("wallet_getCallsStatus"), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_build_submit_and_confirm() {
    setup_tracing();
    let transport = ScriptedTransport::new();
    let account = Address::repeat_byte(0x42);
    transport.push_success("eth_requestAccounts", vec![account]);
    transport.push_success("eth_chainId", "0xaa36a7");
    transport.push_success("wallet_sendCalls", json!({ "id": "0xabc" }));
    transport.push_success("wallet_getCallsStatus", calls_status(202, None));
    transport.push_success("wallet_getCallsStatus", calls_status(200, Some("0xdead")));

    let wallet = ProviderDetail {
        info: ProviderInfo {
            uuid: "3e2a".to_string(),
            name: "Scripted".to_string(),
            icon: String::new(),
            rdns: "dev.scripted".to_string(),
        },
        provider: WalletProvider::new(transport.wallet_client()),
    };
    let connections = ConnectionManager::new();
    let connection = connections.connect(&wallet).await.unwrap();

    let submitter = submitter(&transport);
    let handle = submitter
        .submit(two_transfers(), connection.address, connection.chain_id)
        .await
        .unwrap();
    assert_eq!(handle.id, "0xabc");

    let outcome = submitter.watch(handle).outcome().await.unwrap();

    assert_eq!(
        outcome,
        PollOutcome::Confirmed {
            status: serde_json::from_value(calls_status(200, Some("0xdead"))).unwrap(),
            explorer_url: Some("https://sepolia.etherscan.io/tx/0xdead".to_string()),
        }
    );
    let methods: Vec<_> = transport.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(
        methods,
        [
            "eth_requestAccounts",
            "eth_chainId",
            "wallet_sendCalls",
            "wallet_getCallsStatus",
            "wallet_getCallsStatus"
        ]
    );
}

//! End-to-end checks over a small order service.

use std::sync::Arc;

use should_runtime::{client_fn, cprintln, should, LlmClient, ShouldError, StaticClient};

#[derive(Debug, PartialEq)]
struct Order {
    id: u64,
    item: String,
}

fn create_order(id: u64, item: &str) -> Order {
    tracing::info!(order_id = id, item, "order created");
    cprintln!("stored order {}", id);
    Order {
        id,
        item: item.to_string(),
    }
}

fn register_user(age: u32) -> Result<String, String> {
    tracing::info!(age, "registering user");
    if age < 18 {
        tracing::warn!("registration rejected: user is a minor");
        return Err("user must be at least 18".to_string());
    }
    Ok("user-1".to_string())
}

#[test]
fn order_creation_passes() {
    let client = StaticClient::shared("PASS");
    let result = should("logs should confirm order creation")
        .with_client(client.clone())
        .run(|| {
            create_order(7, "teapot");
        });

    assert!(matches!(result, Ok(())));

    let prompt = client.last_prompt().unwrap();
    assert!(prompt.contains("logs should confirm order creation"));
    assert!(prompt.contains("order created"));
    assert!(prompt.contains("stored order 7"));
}

#[test]
fn order_creation_fails_with_reason() {
    let err = should("logs should confirm order creation")
        .with_client(StaticClient::shared("FAIL: no confirmation found"))
        .run(|| {
            create_order(7, "teapot");
        })
        .unwrap_err();

    assert_eq!(err.reason(), Some("no confirmation found"));
    assert!(err.to_string().contains("AI assertion failed: no confirmation found"));
}

#[test]
fn returned_value_reaches_the_model() {
    let client: Arc<dyn LlmClient> = client_fn(|prompt| {
        if prompt.contains("item: \"teapot\"") {
            Ok("PASS".to_string())
        } else {
            Ok("FAIL: wrong item".to_string())
        }
    });

    let order = should("the order is for a teapot")
        .with_client(client)
        .run(|| create_order(8, "teapot"))
        .unwrap();
    assert_eq!(order.id, 8);
    assert_eq!(order.item, "teapot");
}

#[test]
fn rejected_minor_is_reported_after_pass() {
    let client = StaticClient::shared("PASS");
    let err = should("an error is raised because the user is a minor")
        .with_client(client.clone())
        .try_run(|| register_user(15).map_err(anyhow::Error::msg))
        .unwrap_err();

    match err {
        ShouldError::Function(inner) => assert_eq!(inner.to_string(), "user must be at least 18"),
        other => panic!("expected the function's own error, got {other:?}"),
    }

    let prompt = client.last_prompt().unwrap();
    assert!(prompt.contains("registration rejected: user is a minor"));
    assert!(prompt.contains("exception raised: error: user must be at least 18"));
}

#[tokio::test]
async fn async_order_creation() {
    let client = StaticClient::shared("PASS");
    let order = should("logs should confirm order creation")
        .with_client(client.clone())
        .run_async(async {
            tokio::task::yield_now().await;
            create_order(9, "kettle")
        })
        .await
        .unwrap();

    assert_eq!(order.id, 9);
    assert!(client.last_prompt().unwrap().contains("stored order 9"));
}

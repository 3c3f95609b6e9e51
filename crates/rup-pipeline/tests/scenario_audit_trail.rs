//! Every inference attempt made during a run — success or failure — lands
//! in the JSONL audit log with a dense sequence.

use std::sync::Arc;

use uuid::Uuid;

use rup_config::PlatformConfig;
use rup_ingest::BankFeedItem;
use rup_pipeline::Pipeline;
use rup_resolve::inference::InferenceExchange;
use rup_resolve::{
    verify_audit_log, InferenceClient, InferenceError, InferenceReply, InferenceRequest,
    ResolutionAuditWriter, VerifyResult,
};
use rup_store::MemStore;

/// Times out on every call, so resolution falls through to the brand table.
struct DownClient;

#[async_trait::async_trait]
impl InferenceClient for DownClient {
    fn endpoint_name(&self) -> &'static str {
        "down"
    }

    async fn infer(&self, _req: &InferenceRequest) -> Result<InferenceExchange, InferenceError> {
        Err(InferenceError::Timeout { secs: 8 })
    }
}

/// Returns the same confident reply for every merchant.
struct EchoClient;

#[async_trait::async_trait]
impl InferenceClient for EchoClient {
    fn endpoint_name(&self) -> &'static str {
        "echo"
    }

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceExchange, InferenceError> {
        let reply = InferenceReply {
            ticker: "TGT".to_string(),
            company_name: "Target Corporation".to_string(),
            confidence: 0.97,
            reasoning: Some(format!("recognized {}", req.merchant_name)),
        };
        Ok(InferenceExchange {
            raw: serde_json::to_string(&reply).unwrap(),
            reply,
        })
    }
}

fn feed_item(merchant: &str, amount: f64) -> BankFeedItem {
    BankFeedItem {
        amount,
        date: "2024-03-14".to_string(),
        description: merchant.to_string(),
        merchant_name: Some(merchant.to_string()),
        category: None,
    }
}

#[tokio::test]
async fn failed_attempts_are_logged_with_dense_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resolutions.jsonl");

    let store = Arc::new(MemStore::new());
    let mut pipeline = Pipeline::new(store, PlatformConfig::default())
        .with_inference_client(Arc::new(DownClient))
        .with_audit_writer(ResolutionAuditWriter::new(&path).unwrap());

    pipeline
        .run_bank_sync(
            Uuid::new_v4(),
            &[feed_item("Starbucks", 4.35), feed_item("Target", 7.25)],
        )
        .await
        .unwrap();

    assert_eq!(
        verify_audit_log(&path).unwrap(),
        VerifyResult::Valid { lines: 2 }
    );

    let raw = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events[0]["seq"], 0);
    assert_eq!(events[1]["seq"], 1);
    assert_eq!(events[0]["merchant"], "Starbucks");
    assert!(events[0]["error"].as_str().unwrap().contains("timed out"));
    assert!(events[0]["parsed"].is_null());
}

#[tokio::test]
async fn successful_attempts_keep_the_raw_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resolutions.jsonl");

    let store = Arc::new(MemStore::new());
    let mut pipeline = Pipeline::new(store, PlatformConfig::default())
        .with_inference_client(Arc::new(EchoClient))
        .with_audit_writer(ResolutionAuditWriter::new(&path).unwrap());

    pipeline
        .run_bank_sync(Uuid::new_v4(), &[feed_item("Target Store 22", 4.35)])
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let event: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(event["parsed"]["ticker"], "TGT");
    assert_eq!(event["error"], serde_json::Value::Null);
    assert!(event["raw_response"].as_str().unwrap().contains("0.97"));
    assert!(event["prompt"].as_str().unwrap().contains("Target Store 22"));
}

#[tokio::test]
async fn log_grows_across_pipeline_runs_without_seq_reset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resolutions.jsonl");

    let store = Arc::new(MemStore::new());
    let owner = Uuid::new_v4();

    let mut first = Pipeline::new(store.clone(), PlatformConfig::default())
        .with_inference_client(Arc::new(DownClient))
        .with_audit_writer(ResolutionAuditWriter::new(&path).unwrap());
    first
        .run_bank_sync(owner, &[feed_item("Starbucks", 4.35)])
        .await
        .unwrap();
    drop(first);

    // A fresh writer resumes the sequence from the existing file.
    let mut second = Pipeline::new(store, PlatformConfig::default())
        .with_inference_client(Arc::new(DownClient))
        .with_audit_writer(ResolutionAuditWriter::new(&path).unwrap());
    second
        .run_bank_sync(owner, &[feed_item("Chipotle", 9.10)])
        .await
        .unwrap();

    assert_eq!(
        verify_audit_log(&path).unwrap(),
        VerifyResult::Valid { lines: 2 }
    );
}

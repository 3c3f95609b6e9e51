//! rup-resolve
//!
//! Merchant Resolver: maps a free-text merchant name to a ticker symbol, a
//! confidence score, and an approval status, through an ordered chain of
//! strategies — first success wins:
//!
//! 1. Approved-cache exact match (supplied by the caller from the knowledge
//!    base; case-insensitive, highest confidence).
//! 2. Language-model inference endpoint ([`inference`]).
//! 3. Static brand/ticker fallback table ([`brand_table`]).
//! 4. Needs human review.
//!
//! The resolver performs no store or file IO.  It returns the inference
//! attempts for the caller to append to the audit log ([`audit`]) and the
//! new mapping row (if any) for the caller to persist.  A freshly inferred
//! or fuzzy-matched mapping is auto-approved only when its confidence meets
//! the platform threshold **and** the auto-approval switch is on; otherwise
//! it is persisted as pending and must not tag the current transaction.

pub mod audit;
pub mod brand_table;
pub mod inference;

pub use audit::{verify_audit_log, AuditEvent, ResolutionAttempt, ResolutionAuditWriter, VerifyResult};
pub use inference::{
    HttpInferenceClient, InferenceClient, InferenceError, InferenceReply, InferenceRequest,
};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use rup_schemas::{MappingProvenance, MappingStatus, MerchantMapping};

use crate::inference::render_prompt;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    ApprovedCache,
    Inference,
    FuzzyTable,
}

/// A successful, approved resolution the caller may tag a transaction with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTicker {
    pub ticker: String,
    pub company: String,
    pub confidence: f64,
    pub source: ResolutionSource,
}

/// The caller-visible result of one resolution run.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// Approved — tag the transaction.
    Resolved(ResolvedTicker),
    /// A plausible mapping was found but is awaiting human approval; the
    /// transaction must stay untagged.
    PendingApproval { ticker: String, confidence: f64 },
    /// Every tier was exhausted; do not invent a ticker.
    NeedsReview,
}

/// Full report: outcome, the mapping row to persist (if any), and the
/// inference attempts for the audit log.
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub outcome: ResolveOutcome,
    pub new_mapping: Option<MerchantMapping>,
    pub attempts: Vec<ResolutionAttempt>,
}

// Per-tier result, internal to the chain walk.
enum TierResult {
    Resolved(ResolvedTicker),
    /// The tier had nothing to say (no cache row, no table hit, no client).
    Deferred,
    /// The tier was consulted and failed (endpoint error / bad reply).
    Failed,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// The tier chain with its approval policy.
pub struct Resolver {
    auto_approve: bool,
    auto_approve_threshold: f64,
    client: Option<Arc<dyn InferenceClient>>,
}

impl Resolver {
    pub fn new(auto_approve: bool, auto_approve_threshold: f64) -> Self {
        Self {
            auto_approve,
            auto_approve_threshold,
            client: None,
        }
    }

    /// Attach the inference endpoint.  Without one, tier 2 defers.
    pub fn with_client(mut self, client: Arc<dyn InferenceClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Run the chain for one merchant.
    ///
    /// `cached` is the knowledge base's current best approved mapping for
    /// this merchant, looked up by the caller before the call.
    pub async fn resolve(
        &self,
        merchant: &str,
        category_hint: Option<&str>,
        cached: Option<&MerchantMapping>,
    ) -> ResolutionReport {
        self.resolve_with_hint(merchant, category_hint, cached, None)
            .await
    }

    /// [`resolve`](Self::resolve), with an operator-supplied confidence from
    /// a bulk import row.  The hint overrides the winning tier's confidence
    /// for approval gating, and the persisted mapping is stamped as
    /// bulk-import provenance.  Tier-1 cache hits ignore the hint — they are
    /// already approved.
    pub async fn resolve_with_hint(
        &self,
        merchant: &str,
        category_hint: Option<&str>,
        cached: Option<&MerchantMapping>,
        confidence_hint: Option<f64>,
    ) -> ResolutionReport {
        let mut attempts = Vec::new();

        // Tier 1: approved cache.
        if let Some(mapping) = cached {
            return ResolutionReport {
                outcome: ResolveOutcome::Resolved(ResolvedTicker {
                    ticker: mapping.ticker.clone(),
                    company: mapping.company.clone(),
                    confidence: mapping.confidence,
                    source: ResolutionSource::ApprovedCache,
                }),
                new_mapping: None,
                attempts,
            };
        }

        // Tiers 2 and 3, first success wins.
        let tiers = [ResolutionSource::Inference, ResolutionSource::FuzzyTable];
        for tier in tiers {
            let result = match tier {
                ResolutionSource::Inference => {
                    self.try_inference(merchant, category_hint, &mut attempts)
                        .await
                }
                ResolutionSource::FuzzyTable => Self::try_fuzzy(merchant),
                ResolutionSource::ApprovedCache => unreachable!("tier 1 handled above"),
            };

            if let TierResult::Resolved(hit) = result {
                return self.finish(merchant, category_hint, hit, confidence_hint, attempts);
            }
        }

        ResolutionReport {
            outcome: ResolveOutcome::NeedsReview,
            new_mapping: None,
            attempts,
        }
    }

    async fn try_inference(
        &self,
        merchant: &str,
        category_hint: Option<&str>,
        attempts: &mut Vec<ResolutionAttempt>,
    ) -> TierResult {
        let Some(client) = &self.client else {
            return TierResult::Deferred;
        };

        let request = InferenceRequest::new(merchant, category_hint.map(str::to_string));
        let prompt = render_prompt(&request);
        let started = Instant::now();
        let outcome = client.infer(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(exchange) => {
                attempts.push(ResolutionAttempt {
                    merchant: merchant.to_string(),
                    prompt,
                    raw_response: Some(exchange.raw.clone()),
                    parsed: Some(exchange.reply.clone()),
                    latency_ms,
                    error: None,
                });
                TierResult::Resolved(ResolvedTicker {
                    ticker: exchange.reply.ticker.trim().to_ascii_uppercase(),
                    company: exchange.reply.company_name,
                    confidence: exchange.reply.confidence,
                    source: ResolutionSource::Inference,
                })
            }
            Err(err) => {
                tracing::warn!(
                    merchant,
                    endpoint = client.endpoint_name(),
                    latency_ms,
                    error = %err,
                    "inference tier failed; falling through"
                );
                attempts.push(ResolutionAttempt {
                    merchant: merchant.to_string(),
                    prompt,
                    raw_response: err.raw_body().map(str::to_string),
                    parsed: None,
                    latency_ms,
                    error: Some(err.to_string()),
                });
                TierResult::Failed
            }
        }
    }

    fn try_fuzzy(merchant: &str) -> TierResult {
        match brand_table::lookup(merchant) {
            Some(hit) => TierResult::Resolved(ResolvedTicker {
                ticker: hit.ticker.to_string(),
                company: hit.company.to_string(),
                confidence: hit.confidence,
                source: ResolutionSource::FuzzyTable,
            }),
            None => TierResult::Deferred,
        }
    }

    /// Build the mapping row for a tier-2/3 hit and gate its approval.  A
    /// new row is written even when the merchant already has mappings —
    /// confidence history is preserved, never overwritten.
    fn finish(
        &self,
        merchant: &str,
        category_hint: Option<&str>,
        mut hit: ResolvedTicker,
        confidence_hint: Option<f64>,
        attempts: Vec<ResolutionAttempt>,
    ) -> ResolutionReport {
        let provenance = match confidence_hint {
            Some(supplied) => {
                hit.confidence = supplied;
                MappingProvenance::BulkImport
            }
            None => match hit.source {
                ResolutionSource::Inference => MappingProvenance::Inference,
                ResolutionSource::FuzzyTable => MappingProvenance::FuzzyTable,
                ResolutionSource::ApprovedCache => MappingProvenance::Manual,
            },
        };
        let approved = self.auto_approve && hit.confidence >= self.auto_approve_threshold;

        let mapping = MerchantMapping {
            id: Uuid::new_v4(),
            merchant: merchant.trim().to_string(),
            ticker: hit.ticker.clone(),
            company: hit.company.clone(),
            category: category_hint.map(str::to_string),
            confidence: hit.confidence,
            status: if approved {
                MappingStatus::Approved
            } else {
                MappingStatus::Pending
            },
            ai_processed: hit.source == ResolutionSource::Inference,
            provenance,
            created_at: Utc::now(),
        };

        let outcome = if approved {
            ResolveOutcome::Resolved(hit)
        } else {
            ResolveOutcome::PendingApproval {
                ticker: hit.ticker,
                confidence: hit.confidence,
            }
        };

        ResolutionReport {
            outcome,
            new_mapping: Some(mapping),
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! rup-pipeline
//!
//! Orchestration for the round-up pipeline: one entry point per purchase
//! source (bank sync, bulk CSV, receipt capture) plus the re-resolution
//! sweep.  Each run loads the owner's dedup fingerprints once, walks the
//! rows in input order in bounded chunks with a cooperative yield between
//! chunks, and reports a [`BatchSummary`].
//!
//! Failure scoping:
//! - structural problems (unreadable CSV, missing required column, invalid
//!   receipt, audit-log IO) abort the run before/at the failing point;
//! - row parse/validation failures are recorded and the batch continues;
//! - resolution failures are not row failures — the row is ingested, its
//!   transaction parked as `failed` with a placeholder order, and a later
//!   re-resolution sweep can finish the job.
//!
//! Partial progress is durable: there is no cross-row transaction, so an
//! aborted run keeps every row it already wrote.

pub mod summary;

pub use summary::{BatchSummary, ReResolveSummary, SummaryError};

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use rup_config::PlatformConfig;
use rup_ingest::{
    normalize_bank_feed, parse_bulk_csv, receipt_candidates, receipt_purchase_row, BankFeedItem,
    FingerprintSet, NamedWeight, PurchaseRow,
};
use rup_ledger::state::{apply, TxEvent};
use rup_ledger::{breakdown, LedgerQueueManager};
use rup_portfolio::{allocate, WeightedCandidate};
use rup_resolve::{
    InferenceClient, ResolutionAuditWriter, ResolveOutcome, Resolver,
};
use rup_schemas::{
    MappingStatus, MerchantMapping, ReceiptAllocation, ReceiptPayload, Transaction, TxStatus,
};
use rup_store::Store;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    store: Arc<dyn Store>,
    resolver: Resolver,
    config: PlatformConfig,
    audit: Option<ResolutionAuditWriter>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, config: PlatformConfig) -> Self {
        let resolver = Resolver::new(config.auto_approve, config.auto_approve_threshold);
        Self {
            store,
            resolver,
            config,
            audit: None,
        }
    }

    /// Attach the inference endpoint.  Without one, resolution starts at the
    /// fallback brand table.
    pub fn with_inference_client(mut self, client: Arc<dyn InferenceClient>) -> Self {
        self.resolver = self.resolver.with_client(client);
        self
    }

    /// Attach the JSONL resolution audit log.  Every inference attempt made
    /// during a run is appended; an append failure aborts the run.
    pub fn with_audit_writer(mut self, writer: ResolutionAuditWriter) -> Self {
        self.audit = Some(writer);
        self
    }

    // --- entry points ------------------------------------------------------

    /// Ingest a bulk CSV blob for one owner.
    pub async fn run_bulk_import(&mut self, owner_id: Uuid, src: &str) -> Result<BatchSummary> {
        let parsed = parse_bulk_csv(src).context("bulk csv rejected")?;

        let mut summary = BatchSummary::default();
        summary.total = parsed.rows.len() + parsed.errors.len();
        for err in &parsed.errors {
            summary.record_failure(err.line, err.message.clone(), self.config.max_reported_errors);
        }

        let rows: Vec<(usize, PurchaseRow, Option<f64>)> = parsed
            .rows
            .into_iter()
            .map(|r| (r.line, r.row, r.confidence_hint))
            .collect();
        self.ingest_rows(owner_id, rows, &mut summary).await?;
        Ok(summary)
    }

    /// Ingest one bank-feed pull for one owner.  Credits, refunds, and
    /// malformed items count as skipped, not failed.
    pub async fn run_bank_sync(
        &mut self,
        owner_id: Uuid,
        items: &[BankFeedItem],
    ) -> Result<BatchSummary> {
        let feed = normalize_bank_feed(items);

        let mut summary = BatchSummary::default();
        summary.total = items.len();
        summary.skipped = feed.skipped;

        let rows: Vec<(usize, PurchaseRow, Option<f64>)> = feed
            .rows
            .into_iter()
            .map(|(index, row)| (index, row, None))
            .collect();
        self.ingest_rows(owner_id, rows, &mut summary).await?;
        Ok(summary)
    }

    /// Ingest one captured receipt, dated to the capture day.  The whole
    /// receipt is one transaction; its round-up is split across the resolved
    /// retailer and brand candidates.
    pub async fn run_receipt(
        &mut self,
        owner_id: Uuid,
        payload: &ReceiptPayload,
        date: NaiveDate,
    ) -> Result<BatchSummary> {
        let row = receipt_purchase_row(payload, date).context("receipt rejected")?;

        let mut summary = BatchSummary {
            total: 1,
            ..BatchSummary::default()
        };

        let persisted = self.store.fingerprints_for_owner(owner_id).await?;
        let mut seen = FingerprintSet::new(persisted);
        if !seen.insert(row.fingerprint()) {
            summary.skipped = 1;
            return Ok(summary);
        }

        let tx = self.insert_transaction(owner_id, &row).await?;
        summary.queue_write_failures = self
            .settle_receipt(&tx, receipt_candidates(payload))
            .await?;
        summary.success = 1;
        Ok(summary)
    }

    /// Retry resolution for every transaction of the owner that is not yet
    /// mapped, back-filling placeholder orders on success.
    pub async fn run_re_resolution(&mut self, owner_id: Uuid) -> Result<ReResolveSummary> {
        let pending = self
            .store
            .unresolved_transactions_for_owner(owner_id)
            .await?;

        let mut summary = ReResolveSummary::default();
        for (idx, tx) in pending.into_iter().enumerate() {
            if idx > 0 && idx % self.config.bulk_batch_size == 0 {
                tokio::task::yield_now().await;
            }
            summary.examined += 1;

            let report = self
                .resolve_merchant(&tx.merchant, tx.category.as_deref(), None)
                .await?;
            match report {
                ResolveOutcome::Resolved(hit) => {
                    self.transition(&tx, TxEvent::Resolved { ticker: hit.ticker.clone() })
                        .await?;
                    let manager = LedgerQueueManager::new(self.store.as_ref());
                    let filled = manager
                        .backfill_placeholders(owner_id, tx.id, &hit.ticker)
                        .await?;
                    if filled == 0 {
                        // No placeholder to fill (e.g. queued-order write
                        // failed at ingestion); queue the allocation now.
                        let lines =
                            allocate(tx.round_up, &[WeightedCandidate::new(&hit.ticker, 1.0)])?;
                        manager.queue_allocations(&tx, &lines).await;
                    }
                    summary.resolved += 1;
                    summary.backfilled_orders += filled;
                }
                ResolveOutcome::PendingApproval { .. } | ResolveOutcome::NeedsReview => {
                    if tx.status == TxStatus::Pending {
                        self.transition(&tx, TxEvent::ResolutionFailed).await?;
                    }
                    summary.still_unresolved += 1;
                }
            }
        }
        Ok(summary)
    }

    // --- row ingestion -----------------------------------------------------

    /// Dedup-gate and ingest canonical rows, in input order.  `rows` carries
    /// each row's source position for the summary and its operator-supplied
    /// confidence, when the source has one.
    async fn ingest_rows(
        &mut self,
        owner_id: Uuid,
        rows: Vec<(usize, PurchaseRow, Option<f64>)>,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        // One fingerprint load per batch; grown in memory as rows land.
        let persisted = self.store.fingerprints_for_owner(owner_id).await?;
        let mut seen = FingerprintSet::new(persisted);

        for (idx, (position, row, confidence_hint)) in rows.into_iter().enumerate() {
            if idx > 0 && idx % self.config.bulk_batch_size == 0 {
                tokio::task::yield_now().await;
            }

            let fingerprint = row.fingerprint();
            if seen.contains(&fingerprint) {
                summary.skipped += 1;
                continue;
            }

            let tx = match self.insert_transaction(owner_id, &row).await {
                Ok(tx) => tx,
                Err(err) => {
                    summary.record_failure(
                        position,
                        err.to_string(),
                        self.config.max_reported_errors,
                    );
                    continue;
                }
            };
            // Only a persisted row dedups later ones; a failed insert must
            // not shadow an identical retry row in the same batch.
            seen.insert(fingerprint);
            summary.queue_write_failures += self.settle_single(&tx, confidence_hint).await?;
            summary.success += 1;
        }
        Ok(())
    }

    /// Compute the round-up breakdown and persist the transaction, still
    /// unresolved.
    async fn insert_transaction(&self, owner_id: Uuid, row: &PurchaseRow) -> Result<Transaction> {
        let money = breakdown(row.amount, self.config.default_round_up, self.config.fee_rate);
        let tx = Transaction {
            id: Uuid::new_v4(),
            owner_id,
            date: row.date,
            merchant: row.merchant.clone(),
            amount: row.amount,
            category: row.category.clone(),
            description: row.description.clone(),
            round_up: money.round_up,
            fee: money.fee,
            ticker: None,
            status: TxStatus::Pending,
            fingerprint: row.fingerprint(),
            source: row.source,
            created_at: Utc::now(),
        };
        self.store.insert_transaction(tx.clone()).await?;
        Ok(tx)
    }

    /// Resolve and settle a single-merchant transaction (bank or bulk row):
    /// ledger entry always, then either the full-round-up order or a
    /// placeholder.  Returns the number of failed queue writes.
    async fn settle_single(
        &mut self,
        tx: &Transaction,
        confidence_hint: Option<f64>,
    ) -> Result<usize> {
        let outcome = self
            .resolve_merchant(&tx.merchant, tx.category.as_deref(), confidence_hint)
            .await?;

        let manager = LedgerQueueManager::new(self.store.as_ref());
        manager.record_ledger(tx).await?;

        match outcome {
            ResolveOutcome::Resolved(hit) => {
                self.transition(tx, TxEvent::Resolved { ticker: hit.ticker.clone() })
                    .await?;
                let lines = allocate(tx.round_up, &[WeightedCandidate::new(&hit.ticker, 1.0)])?;
                Ok(manager.queue_allocations(tx, &lines).await.failed)
            }
            ResolveOutcome::PendingApproval { .. } | ResolveOutcome::NeedsReview => {
                self.transition(tx, TxEvent::ResolutionFailed).await?;
                Ok(self.queue_placeholder_tolerant(&manager, tx).await)
            }
        }
    }

    /// Resolve and settle a receipt transaction: every candidate name runs
    /// the resolver chain, and the round-up is split across the candidates
    /// that came back approved.
    async fn settle_receipt(&mut self, tx: &Transaction, names: Vec<NamedWeight>) -> Result<usize> {
        let mut candidates: Vec<WeightedCandidate> = Vec::new();
        // Symbol → (confidence, reason) for the allocation audit rows.
        let mut detail: HashMap<String, (f64, String)> = HashMap::new();

        for named in &names {
            let outcome = self.resolve_merchant(&named.name, None, None).await?;
            if let ResolveOutcome::Resolved(hit) = outcome {
                let symbol = hit.ticker.clone();
                detail.entry(symbol.clone()).or_insert_with(|| {
                    let kind = if named.is_retailer { "retailer" } else { "brand" };
                    (hit.confidence, format!("{kind}: {}", named.name))
                });
                candidates.push(WeightedCandidate::new(symbol, named.weight));
            }
        }

        let manager = LedgerQueueManager::new(self.store.as_ref());
        manager.record_ledger(tx).await?;

        if candidates.is_empty() {
            self.transition(tx, TxEvent::ResolutionFailed).await?;
            return Ok(self.queue_placeholder_tolerant(&manager, tx).await);
        }

        // The transaction's own ticker is the first line's symbol, which is
        // the retailer whenever the retailer resolved.
        let lines = allocate(tx.round_up, &candidates)?;
        let lead = lines[0].ticker.clone();
        self.transition(tx, TxEvent::Resolved { ticker: lead }).await?;
        let queue = manager.queue_allocations(tx, &lines).await;

        for line in &lines {
            let (confidence, reason) = detail
                .get(&line.ticker)
                .cloned()
                .unwrap_or((0.0, "unknown".to_string()));
            self.store
                .insert_receipt_allocation(ReceiptAllocation {
                    id: Uuid::new_v4(),
                    transaction_id: tx.id,
                    ticker: line.ticker.clone(),
                    amount: line.amount,
                    percentage: line.percentage,
                    confidence,
                    reason,
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(queue.failed)
    }

    // --- shared plumbing ---------------------------------------------------

    /// Run the resolver chain for one name: knowledge-base lookup, then the
    /// tier chain; persist any new mapping row and append every inference
    /// attempt to the audit log.  `confidence_hint` is an operator-supplied
    /// score from a bulk import row.
    async fn resolve_merchant(
        &mut self,
        merchant: &str,
        category_hint: Option<&str>,
        confidence_hint: Option<f64>,
    ) -> Result<ResolveOutcome> {
        let cached = self.store.best_approved_mapping(merchant).await?;
        let report = self
            .resolver
            .resolve_with_hint(merchant, category_hint, cached.as_ref(), confidence_hint)
            .await;

        if let Some(writer) = &mut self.audit {
            for attempt in report.attempts {
                writer.append(attempt).context("audit log append failed")?;
            }
        }
        if let Some(mapping) = report.new_mapping {
            if !self.pending_mapping_exists(&mapping).await? {
                self.store.insert_mapping(mapping).await?;
            }
        }
        Ok(report.outcome)
    }

    /// A pending mapping is only a review-queue request; writing the same
    /// request once per sweep would pile duplicates onto the reviewer.
    /// Approved rows are exempt — confidence history is preserved.
    async fn pending_mapping_exists(&self, mapping: &MerchantMapping) -> Result<bool> {
        if mapping.status != MappingStatus::Pending {
            return Ok(false);
        }
        let pending = self.store.pending_mappings().await?;
        Ok(pending.iter().any(|row| {
            row.merchant.eq_ignore_ascii_case(&mapping.merchant)
                && row.ticker == mapping.ticker
                && row.confidence == mapping.confidence
        }))
    }

    /// Queue-write failures never fail the row: the ledger entry already
    /// holds the money, and the re-resolution sweep re-queues the order.
    /// Returns 1 when the write failed, for the batch summary.
    async fn queue_placeholder_tolerant(
        &self,
        manager: &LedgerQueueManager<'_>,
        tx: &Transaction,
    ) -> usize {
        match manager.queue_placeholder(tx).await {
            Ok(_) => 0,
            Err(err) => {
                tracing::warn!(tx_id = %tx.id, error = %err, "placeholder order write failed");
                1
            }
        }
    }

    /// Apply a status transition through the state machine and persist it.
    /// An illegal transition is a logic fault; it is logged and the row left
    /// untouched rather than tearing down the batch.
    async fn transition(&self, tx: &Transaction, event: TxEvent) -> Result<()> {
        let next = match apply(tx.status, &event) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(tx_id = %tx.id, error = %err, "illegal status transition skipped");
                return Ok(());
            }
        };
        let ticker = match event {
            TxEvent::Resolved { ticker } => Some(ticker),
            TxEvent::ResolutionFailed => None,
        };
        self.store
            .set_transaction_resolution(tx.owner_id, tx.id, ticker, next)
            .await?;
        Ok(())
    }
}

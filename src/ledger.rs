//! Append-only cost accounting tied to a budget.
//!
//! Every externally billed call produces exactly one [`CostRecord`], priced
//! through a [`PricingTable`] keyed by model identifier. An unrecognized
//! model identifier is a hard, fail-closed [`PricingError`] — it is never
//! silently recorded as zero cost. Running totals are always recomputed by
//! summation over the records, never maintained as a separately mutable
//! counter, so the aggregate can never drift from the underlying ledger.

use chrono::Utc;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::state::CostRecord;
use crate::types::PhaseKind;

/// Per-1K-token rates for one model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPricing {
    /// Cost per 1,000 prompt tokens.
    pub input_per_1k: f64,
    /// Cost per 1,000 completion tokens.
    pub output_per_1k: f64,
}

/// Pricing lookup keyed by model identifier. Fail-closed: pricing an
/// unknown model is an error, never zero.
#[derive(Clone, Debug, Default)]
pub struct PricingTable {
    models: FxHashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the rates for a model.
    #[must_use]
    pub fn with_model(mut self, model: &str, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.models.insert(
            model.to_string(),
            ModelPricing {
                input_per_1k,
                output_per_1k,
            },
        );
        self
    }

    /// Price a call.
    pub fn price(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<f64, PricingError> {
        let pricing = self
            .models
            .get(model)
            .ok_or_else(|| PricingError::UnknownModel {
                model: model.to_string(),
            })?;
        Ok(input_tokens as f64 / 1_000.0 * pricing.input_per_1k
            + output_tokens as f64 / 1_000.0 * pricing.output_per_1k)
    }

    /// Whether the table knows the model.
    #[must_use]
    pub fn knows(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }
}

/// Pricing failures. Fatal to the ledger by design.
#[derive(Debug, Error, Diagnostic)]
pub enum PricingError {
    /// The model identifier has no configured rates.
    #[error("no pricing configured for model '{model}'")]
    #[diagnostic(
        code(turnloom::ledger::unknown_model),
        help("Add the model to the PricingTable; unpriced calls are refused rather than recorded at zero cost.")
    )]
    UnknownModel { model: String },
}

/// Append-only, concurrency-tolerant cost ledger.
///
/// The ledger is one of the two shared mutable resources that cross
/// concurrent tasks (the other is the response cache); appends take a short
/// mutex so no update is ever lost.
///
/// # Examples
///
/// ```
/// use turnloom::ledger::{CostLedger, PricingTable};
/// use turnloom::types::PhaseKind;
///
/// let pricing = PricingTable::new().with_model("mock-small", 0.5, 1.5);
/// let ledger = CostLedger::new(pricing);
///
/// ledger
///     .record(Some("atlas"), PhaseKind::Decision, 1, "mock-small", 1000, 200)
///     .unwrap();
///
/// assert!((ledger.total() - 0.8).abs() < 1e-9);
/// assert!(ledger.record(None, PhaseKind::WorldUpdate, 1, "unknown", 10, 10).is_err());
/// ```
pub struct CostLedger {
    pricing: PricingTable,
    records: Mutex<Vec<CostRecord>>,
}

impl CostLedger {
    /// Creates an empty ledger over the given pricing table.
    #[must_use]
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            pricing,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Creates a ledger seeded with existing records (used when resuming a
    /// run from a snapshot).
    #[must_use]
    pub fn with_records(pricing: PricingTable, records: Vec<CostRecord>) -> Self {
        Self {
            pricing,
            records: Mutex::new(records),
        }
    }

    /// The pricing table backing this ledger.
    #[must_use]
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Price and append exactly one record for a billed call.
    ///
    /// Fails closed on an unknown model identifier; nothing is appended in
    /// that case.
    pub fn record(
        &self,
        actor: Option<&str>,
        phase: PhaseKind,
        turn: u64,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<CostRecord, PricingError> {
        let cost = self.pricing.price(model, input_tokens, output_tokens)?;
        let record = CostRecord {
            timestamp: Utc::now(),
            actor: actor.map(str::to_string),
            phase,
            turn,
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost,
        };
        self.records.lock().push(record.clone());
        Ok(record)
    }

    /// Snapshot of every record, in append order.
    pub fn records(&self) -> Vec<CostRecord> {
        self.records.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Total spend, recomputed by summation.
    pub fn total(&self) -> f64 {
        self.records.lock().iter().map(|r| r.cost).sum()
    }

    /// Spend attributed to one actor, recomputed by summation.
    pub fn total_for_actor(&self, actor: &str) -> f64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.actor.as_deref() == Some(actor))
            .map(|r| r.cost)
            .sum()
    }

    /// Spend attributed to one phase, recomputed by summation.
    pub fn total_for_phase(&self, phase: PhaseKind) -> f64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.cost)
            .sum()
    }

    /// Strict budget check: true once cumulative cost exceeds `limit`.
    pub fn exceeds(&self, limit: f64) -> bool {
        self.total() > limit
    }
}

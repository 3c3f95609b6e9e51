//! rup-config
//!
//! Platform configuration for the round-up pipeline.
//!
//! The config is fetched **once per batch** by the caller and passed by value
//! into the calculators — never re-queried per row.  Loading validates every
//! field up front and computes a canonical-JSON SHA-256 hash so a batch
//! summary can state exactly which configuration produced it.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use rup_schemas::Cents;

// ---------------------------------------------------------------------------
// PlatformConfig
// ---------------------------------------------------------------------------

/// Platform-level knobs for one pipeline run.
///
/// All fields have production defaults; a config file only needs to name the
/// keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PlatformConfig {
    /// Fee taken from each round-up, as a fraction in `[0, 1)`.
    pub fee_rate: f64,
    /// Round-up applied to whole-unit purchase amounts, in cents.
    pub default_round_up: Cents,
    /// When `true`, resolutions at or above `auto_approve_threshold` are
    /// approved without human review.
    pub auto_approve: bool,
    /// Minimum confidence for automatic approval, in `[0, 1]`.
    pub auto_approve_threshold: f64,
    /// Inference-endpoint request timeout, seconds.
    pub inference_timeout_secs: u64,
    /// Rows per bulk-ingestion chunk; the pipeline yields between chunks.
    pub bulk_batch_size: usize,
    /// Cap on per-row error messages carried in a batch summary.
    pub max_reported_errors: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            fee_rate: 0.025,
            default_round_up: Cents::ONE_UNIT,
            auto_approve: true,
            auto_approve_threshold: 0.90,
            inference_timeout_secs: 8,
            bulk_batch_size: 500,
            max_reported_errors: 25,
        }
    }
}

impl PlatformConfig {
    /// Validate field ranges.  Called by every load path; callers
    /// constructing a config by hand should call it too.
    pub fn validate(&self) -> Result<()> {
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 || self.fee_rate >= 1.0 {
            bail!("fee_rate must be in [0, 1), got {}", self.fee_rate);
        }
        if self.default_round_up <= Cents::ZERO {
            bail!(
                "default_round_up must be positive, got {}",
                self.default_round_up
            );
        }
        if !self.auto_approve_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.auto_approve_threshold)
        {
            bail!(
                "auto_approve_threshold must be in [0, 1], got {}",
                self.auto_approve_threshold
            );
        }
        if self.inference_timeout_secs == 0 {
            bail!("inference_timeout_secs must be > 0");
        }
        if self.bulk_batch_size == 0 {
            bail!("bulk_batch_size must be > 0");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading + canonical hash
// ---------------------------------------------------------------------------

/// A validated config together with its canonical JSON and hash.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PlatformConfig,
    /// Key-sorted, whitespace-free JSON of the effective config.
    pub canonical_json: String,
    /// SHA-256 of `canonical_json`, hex-encoded.
    pub config_hash: String,
}

/// Load, validate, and hash a JSON config file.
pub fn load_file(path: impl AsRef<Path>) -> Result<LoadedConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config file '{}'", path.display()))?;
    load_str(&raw).with_context(|| format!("config file '{}'", path.display()))
}

/// Load from an in-memory JSON document (tests, embedded defaults).
pub fn load_str(raw: &str) -> Result<LoadedConfig> {
    let config: PlatformConfig = serde_json::from_str(raw).context("config json parse failed")?;
    config.validate()?;
    finish(config)
}

/// Hash the built-in defaults (used when no config file is supplied).
pub fn load_defaults() -> Result<LoadedConfig> {
    finish(PlatformConfig::default())
}

fn finish(config: PlatformConfig) -> Result<LoadedConfig> {
    let canonical_json = canonical_json(&config)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config,
        canonical_json,
        config_hash,
    })
}

/// Serialize with key-sorted maps so the hash is stable across field order.
fn canonical_json(config: &PlatformConfig) -> Result<String> {
    let value = serde_json::to_value(config).context("config serialize failed")?;
    let sorted = sort_value(value);
    serde_json::to_string(&sorted).context("canonical json serialize failed")
}

fn sort_value(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::new();
            for (k, val) in entries {
                out.insert(k, sort_value(val));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_value).collect())
        }
        other => other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

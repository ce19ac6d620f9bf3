//! Rolling per-(node, metric) baselines
//!
//! Every key keeps a bounded FIFO of the most recent raw values and an
//! exponential moving average seeded by the first observation. A baseline is
//! only reported once enough samples have been seen for the key; before that
//! the reading is *unavailable*, which is distinct from a baseline of zero.
//!
//! Keys live in a sharded [`DashMap`], so concurrent updates for unrelated
//! nodes never contend on a single lock, while two overlapping updates for
//! the same key are serialized by the shard's entry lock.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of raw values retained per key
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Number of observations required before a baseline is reported
pub const DEFAULT_READY_THRESHOLD: usize = 10;

/// EMA smoothing factor applied to the newest value
pub const DEFAULT_EMA_ALPHA: f64 = 0.3;

/// Tuning for a [`BaselineTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Bounded history length (oldest values are evicted first)
    pub history_capacity: usize,

    /// Minimum history length for a baseline to be ready
    pub ready_threshold: usize,

    /// Weight of the newest value in the moving average
    pub ema_alpha: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            ready_threshold: DEFAULT_READY_THRESHOLD,
            ema_alpha: DEFAULT_EMA_ALPHA,
        }
    }
}

/// Result of an update or lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineReading {
    /// Current smoothed estimate (meaningful only when `ready`)
    pub value: f64,

    /// Whether enough history exists for `value` to be used
    pub ready: bool,

    /// Number of values currently retained for the key
    pub samples: usize,
}

impl BaselineReading {
    fn unavailable() -> Self {
        Self {
            value: 0.0,
            ready: false,
            samples: 0,
        }
    }

    /// The baseline if it is ready, `None` otherwise
    pub fn available(&self) -> Option<f64> {
        self.ready.then_some(self.value)
    }
}

#[derive(Debug, Default)]
struct BaselineRecord {
    history: VecDeque<f64>,
    ema: Option<f64>,
}

impl BaselineRecord {
    fn push(&mut self, value: f64, config: &BaselineConfig) -> BaselineReading {
        self.history.push_back(value);
        while self.history.len() > config.history_capacity {
            self.history.pop_front();
        }

        let ema = match self.ema {
            None => value,
            Some(previous) => config.ema_alpha * value + (1.0 - config.ema_alpha) * previous,
        };
        self.ema = Some(ema);

        self.reading(config)
    }

    fn reading(&self, config: &BaselineConfig) -> BaselineReading {
        let samples = self.history.len();
        BaselineReading {
            value: self.ema.unwrap_or_default(),
            ready: samples >= config.ready_threshold,
            samples,
        }
    }
}

/// Identity of one baseline record
///
/// Node labels may themselves contain `:`, so node and metric are kept as
/// separate fields rather than joined into one string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaselineKey {
    pub node: String,
    pub metric_name: String,
}

impl BaselineKey {
    pub fn new(node: &str, metric_name: &str) -> Self {
        Self {
            node: node.to_string(),
            metric_name: metric_name.to_string(),
        }
    }
}

impl std::fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.node, self.metric_name)
    }
}

/// Concurrent store of rolling baselines keyed by (node, metric)
#[derive(Debug, Default)]
pub struct BaselineTracker {
    config: BaselineConfig,
    records: DashMap<BaselineKey, BaselineRecord>,
}

impl BaselineTracker {
    /// Create a tracker with the default window (20 values, ready at 10, alpha 0.3)
    pub fn new() -> Self {
        Self::with_config(BaselineConfig::default())
    }

    /// Create a tracker with custom tuning
    pub fn with_config(config: BaselineConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    /// Tuning in effect
    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Record `value` for the key and return the advanced baseline
    ///
    /// Non-finite values are not recorded; the current reading is returned
    /// unchanged.
    pub fn update(&self, node: &str, metric_name: &str, value: f64) -> BaselineReading {
        if !value.is_finite() {
            tracing::warn!(node = %node, metric = %metric_name, value, "Ignoring non-finite value");
            return self.get(node, metric_name);
        }

        let mut record = self
            .records
            .entry(BaselineKey::new(node, metric_name))
            .or_default();
        record.push(value, &self.config)
    }

    /// Read the current baseline without recording anything
    pub fn get(&self, node: &str, metric_name: &str) -> BaselineReading {
        self.records
            .get(&BaselineKey::new(node, metric_name))
            .map(|record| record.reading(&self.config))
            .unwrap_or_else(BaselineReading::unavailable)
    }

    /// Snapshot of the retained raw values, oldest first
    pub fn history(&self, node: &str, metric_name: &str) -> Option<Vec<f64>> {
        self.records
            .get(&BaselineKey::new(node, metric_name))
            .map(|record| record.history.iter().copied().collect())
    }

    /// Forget everything recorded for one key
    pub fn reset(&self, node: &str, metric_name: &str) {
        self.records.remove(&BaselineKey::new(node, metric_name));
    }

    /// Forget every key for a decommissioned node
    pub fn reset_node(&self, node: &str) {
        self.records.retain(|key, _| key.node != node);
    }

    /// Forget every key
    pub fn reset_all(&self) {
        self.records.clear();
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

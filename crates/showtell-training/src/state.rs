use crate::data::SplitCursors;
use crate::metrics::LangStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// serde_json writes non-finite floats as `null`; read them back as NaN.
mod null_as_nan {
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }

    pub fn map<'de, D, K>(d: D) -> Result<BTreeMap<K, f64>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord,
    {
        let raw = BTreeMap::<K, Option<f64>>::deserialize(d)?;
        Ok(raw.into_iter().map(|(k, v)| (k, v.unwrap_or(f64::NAN))).collect())
    }

    pub fn optional_map<'de, D, K>(d: D) -> Result<Option<BTreeMap<K, f64>>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord,
    {
        let raw = Option::<BTreeMap<K, Option<f64>>>::deserialize(d)?;
        Ok(raw.map(|m| m.into_iter().map(|(k, v)| (k, v.unwrap_or(f64::NAN))).collect()))
    }
}

/// Summary of one validation run, kept in the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValResult {
    #[serde(deserialize_with = "null_as_nan::float")]
    pub loss: f64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "null_as_nan::optional_map")]
    pub lang_stats: Option<LangStats>,
}

/// Progress counters of a training run.
///
/// Owned by the caller and threaded through the training loop; persisted with
/// every checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Batches processed so far.
    pub iteration: u64,
    /// Completed passes over the training split.
    pub epoch: u64,
    pub iterators: SplitCursors,
    pub best_val_score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_nan::map")]
    pub loss_history: BTreeMap<u64, f64>,
    #[serde(default, deserialize_with = "null_as_nan::map")]
    pub lr_history: BTreeMap<u64, f64>,
    #[serde(default)]
    pub val_result_history: BTreeMap<u64, ValResult>,
}

impl TrainingState {
    /// True if `score` should replace the current best. Non-finite scores never do.
    #[must_use]
    pub fn is_improvement(&self, score: f64) -> bool {
        score.is_finite() && self.best_val_score.is_none_or(|best| score > best)
    }

    pub fn record_loss(&mut self, loss: f64, learning_rate: f64) {
        self.loss_history.insert(self.iteration, loss);
        self.lr_history.insert(self.iteration, learning_rate);
    }

    pub fn record_validation(&mut self, result: ValResult) {
        self.val_result_history.insert(self.iteration, result);
    }
}

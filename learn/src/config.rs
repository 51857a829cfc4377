use network::Loss;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LearnError, Result},
    normalize::Norm,
};

/// Parameters of a training run. Every field has a default, so a partial
/// config file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    /// Normalization of the chromagram targets. Also picks the output activation.
    pub chroma_norm: Norm,
    /// Normalization of the constant-Q inputs.
    pub constant_q_norm: Norm,
    /// Songs per training call in buffered runs. Unbuffered runs ignore it.
    pub delta_train: usize,
    /// Neurons per layer, input first.
    pub layer_sizes: Vec<usize>,
    pub loss: Loss,
    pub verbose: bool,
    /// Width of the bass half of the chromagram; treble follows it.
    pub chroma_split: usize,
    /// Seed for weight initialization.
    pub seed: u64,
    /// Fail when one feature file has more rows than the other.
    pub strict_length: bool,
}

impl LearnConfig {
    /// Defaults for buffered training.
    pub fn buffered() -> Self {
        Self {
            chroma_norm: Norm::L1,
            constant_q_norm: Norm::Linf,
            delta_train: 2,
            layer_sizes: vec![256, 150, 24],
            loss: Loss::Sse,
            verbose: false,
            chroma_split: 12,
            seed: 0,
            strict_length: false,
        }
    }

    /// Defaults for a single batch over the whole corpus.
    pub fn unbuffered() -> Self {
        Self {
            layer_sizes: vec![256, 50, 24],
            ..Self::buffered()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LearnError::InvalidConfig(msg));
        if self.layer_sizes.len() < 2 {
            return invalid(format!(
                "need at least input and output layer sizes, got {:?}",
                self.layer_sizes
            ));
        }
        if self.layer_sizes.contains(&0) {
            return invalid(format!(
                "layer sizes must be non-zero, got {:?}",
                self.layer_sizes
            ));
        }
        if self.chroma_split == 0 {
            return invalid("chroma_split must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self::buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_hidden_layer() {
        let buffered = LearnConfig::buffered();
        let unbuffered = LearnConfig::unbuffered();
        assert_eq!(buffered.layer_sizes, vec![256, 150, 24]);
        assert_eq!(unbuffered.layer_sizes, vec![256, 50, 24]);
        assert_eq!(unbuffered.delta_train, buffered.delta_train);
        assert_eq!(buffered.chroma_norm, Norm::L1);
        assert_eq!(buffered.constant_q_norm, Norm::Linf);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: LearnConfig =
            serde_json::from_str(r#"{"chroma_norm": "L2", "loss": "KLDiv", "delta_train": 5}"#)
                .unwrap();
        assert_eq!(config.chroma_norm, Norm::L2);
        assert_eq!(config.loss, Loss::KlDiv);
        assert_eq!(config.delta_train, 5);
        assert_eq!(config.constant_q_norm, Norm::Linf);
        assert_eq!(config.chroma_split, 12);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad = [
            LearnConfig {
                layer_sizes: vec![24],
                ..Default::default()
            },
            LearnConfig {
                layer_sizes: vec![26, 0, 24],
                ..Default::default()
            },
            LearnConfig {
                chroma_split: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(LearnError::InvalidConfig(_))));
        }
        assert!(LearnConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_interval_is_fine_without_buffering() {
        let config = LearnConfig {
            delta_train: 0,
            ..LearnConfig::unbuffered()
        };
        assert!(config.validate().is_ok());
    }
}

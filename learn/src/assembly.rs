use network::{Activation, FeedForwardNet};

use crate::{config::LearnConfig, error::Result, normalize::Norm};

/// Output activation matching how the targets were normalized.
pub fn output_activation(chroma_norm: Norm, chroma_split: usize) -> Activation {
    match chroma_norm {
        Norm::L1 => Activation::softmax([chroma_split]),
        Norm::L2 => Activation::Identity,
        Norm::Linf => Activation::Sigmoid,
        Norm::None => Activation::Identity,
    }
}

/// Sigmoid on every hidden layer, then [`output_activation`].
pub fn layer_activations(layers: usize, chroma_norm: Norm, chroma_split: usize) -> Vec<Activation> {
    let mut activations = vec![Activation::Sigmoid; layers.saturating_sub(2)];
    activations.push(output_activation(chroma_norm, chroma_split));
    activations
}

/// Builds the fully connected network a run trains.
pub fn assemble_network(config: &LearnConfig) -> Result<FeedForwardNet> {
    config.validate()?;
    let activations = layer_activations(
        config.layer_sizes.len(),
        config.chroma_norm,
        config.chroma_split,
    );
    Ok(FeedForwardNet::new(
        config.layer_sizes.clone(),
        activations,
        config.seed,
    )?)
}

// ============================================================
// Layer 5 — Domain Discriminator
// ============================================================
// A small MLP that guesses which dataset a feature came from,
// given the encoder's representation of it:
//
//   input ─► [Linear ─► ReLU ─► Dropout] × num_layers ─► Linear ─► log_softmax
//
// Two input modes:
//   CLS   (default)   the [CLS] hidden state, d_model values
//   full  (--full-adv) every hidden state flattened,
//                     max_seq_len × d_model values; the hidden
//                     width drops to 48 to keep the first
//                     layer's weight matrix manageable
//
// Reference: Lee et al. (2019) Domain-agnostic Question-Answering
//            with Adversarial Training

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::domain::example::NUM_DOMAINS;

/// Hidden width when the whole sequence is the input
pub const FULL_ADV_HIDDEN: usize = 48;

#[derive(Config, Debug)]
pub struct DomainDiscriminatorConfig {
    pub input_size:  usize,
    pub hidden_size: usize,
    #[config(default = 6)]
    pub num_classes: usize,
    #[config(default = 3)]
    pub num_layers:  usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl DomainDiscriminatorConfig {
    /// Sizes used for a given encoder shape and input mode.
    pub fn for_encoder(d_model: usize, max_seq_len: usize, full_adv: bool) -> Self {
        let config = if full_adv {
            Self::new(max_seq_len * d_model, FULL_ADV_HIDDEN)
        } else {
            Self::new(d_model, d_model)
        };
        config.with_num_classes(NUM_DOMAINS)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DomainDiscriminator<B> {
        let hidden = (0..self.num_layers)
            .map(|i| {
                let input = if i == 0 { self.input_size } else { self.hidden_size };
                LinearConfig::new(input, self.hidden_size).init(device)
            })
            .collect();
        DomainDiscriminator {
            hidden,
            classifier: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DomainDiscriminator<B: Backend> {
    pub hidden:     Vec<Linear<B>>,
    pub classifier: Linear<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> DomainDiscriminator<B> {
    /// [batch, input_size] → log-probabilities [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.hidden {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        log_softmax(self.classifier.forward(x), 1)
    }
}

/// Select what the discriminator sees from the last hidden states.
pub fn discriminator_input<B: Backend>(hidden_states: Tensor<B, 3>, full_adv: bool) -> Tensor<B, 2> {
    let [batch, seq_len, d_model] = hidden_states.dims();
    if full_adv {
        hidden_states.reshape([batch, seq_len * d_model])
    } else {
        hidden_states
            .slice([0..batch, 0..1, 0..d_model])
            .reshape([batch, d_model])
    }
}

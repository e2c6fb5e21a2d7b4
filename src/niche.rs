/*!
Ecological niches. A breed's suitability for a cell is either read straight
from an input layer, or estimated by a small feedforward network from several
environmental covariates (elevation, slope, distance to rivers, primary
productivity, soil quality, …). The network weights can be calibrated
together with the demographic parameters.
*/
use crate::error::{invalid, Result};
use crate::landscape::{is_no_data, Landscape};
use serde_derive::{Deserialize, Serialize};

fn sigmoid(z: f64) -> f64 {
    1. / (1. + (-z).exp())
}

/**
A network with one hidden layer. Every layer sees its inputs with a constant
1 prepended as bias, and squashes its output through a sigmoid. The weights
are stored row-major: first the `(inputs + 1) × hidden` matrix, then the
`(hidden + 1) × 1` output column.

```rust
# use model::niche::NicheNetwork;
let n = NicheNetwork::new(2, 3, vec![0.; NicheNetwork::weight_count(2, 3)]).unwrap();
assert_eq!(n.suitability(&[0.3, 0.9]), 0.5);
```
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicheNetwork {
    inputs: usize,
    hidden: usize,
    weights: Vec<f64>,
}

impl NicheNetwork {
    pub fn weight_count(inputs: usize, hidden: usize) -> usize {
        (inputs + 1) * hidden + hidden + 1
    }

    pub fn new(inputs: usize, hidden: usize, weights: Vec<f64>) -> Result<Self> {
        let expected = Self::weight_count(inputs, hidden);
        if weights.len() != expected {
            return invalid(
                "weights",
                format!("network needs {} weights, got {}", expected, weights.len()),
            );
        }
        Ok(NicheNetwork {
            inputs,
            hidden,
            weights,
        })
    }

    pub fn suitability(&self, covariates: &[f64]) -> f64 {
        debug_assert_eq!(covariates.len(), self.inputs);
        let (first, output) = self.weights.split_at((self.inputs + 1) * self.hidden);
        let hidden: Vec<f64> = (0..self.hidden)
            .map(|j| {
                let z = first[j]
                    + covariates
                        .iter()
                        .enumerate()
                        .map(|(i, x)| x * first[(i + 1) * self.hidden + j])
                        .sum::<f64>();
                sigmoid(z)
            })
            .collect();
        sigmoid(output[0] + hidden.iter().zip(&output[1..]).map(|(a, w)| a * w).sum::<f64>())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Suitability {
    /// Read from the named landscape layer.
    Layer(String),
    /// Estimated from the named covariate layers.
    Network {
        covariates: Vec<String>,
        hidden: usize,
        weights: Vec<f64>,
    },
}

impl Suitability {
    /// How many calibratable weights this source has.
    pub fn weight_count(&self) -> usize {
        match self {
            Suitability::Layer(_) => 0,
            Suitability::Network {
                covariates, hidden, ..
            } => NicheNetwork::weight_count(covariates.len(), *hidden),
        }
    }

    /// The same source with its network weights replaced.
    pub fn with_weights(&self, new_weights: &[f64]) -> Suitability {
        match self {
            Suitability::Layer(_) => self.clone(),
            Suitability::Network {
                covariates, hidden, ..
            } => Suitability::Network {
                covariates: covariates.clone(),
                hidden: *hidden,
                weights: new_weights.to_vec(),
            },
        }
    }

    /// Suitability of every cell, row-major; `None` where any input is
    /// missing.
    pub fn evaluate(&self, landscape: &Landscape) -> Result<Vec<Option<f64>>> {
        match self {
            Suitability::Layer(name) => Ok(landscape
                .layer(name)?
                .values
                .iter()
                .map(|&v| if is_no_data(v) { None } else { Some(v) })
                .collect()),
            Suitability::Network {
                covariates,
                hidden,
                weights,
            } => {
                let network = NicheNetwork::new(covariates.len(), *hidden, weights.clone())?;
                let layers = covariates
                    .iter()
                    .map(|name| landscape.layer(name))
                    .collect::<Result<Vec<_>>>()?;
                let mut inputs = vec![0.; layers.len()];
                Ok((0..landscape.width * landscape.height)
                    .map(|i| {
                        for (x, layer) in inputs.iter_mut().zip(&layers) {
                            *x = layer.values[i];
                        }
                        if inputs.iter().any(|&v| is_no_data(v)) {
                            None
                        } else {
                            Some(network.suitability(&inputs))
                        }
                    })
                    .collect())
            }
        }
    }
}

use ndarray::{Array1, Array2, Array3, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::Rng;

use super::adam::{AdamStep, Moments};
use super::layer::{glorot_uniform, LayerGrads, LstmLayer, StepCache};

/// Stacked LSTM layers with dropout after each, then one linear unit.
/// Every layer but the last feeds its full sequence to the next one.
#[derive(Debug, Clone)]
pub struct LstmNetwork {
    layers: Vec<LstmLayer>,
    dense_w: Array2<f64>,
    dense_b: Array1<f64>,
    dropout: f64,
}

pub struct ForwardPass {
    pub predictions: Array1<f64>,
    caches: Vec<Vec<StepCache>>,
    /// Per layer, per emitted step; `None` when dropout is off
    masks: Vec<Vec<Option<Array2<f64>>>>,
    last_hidden: Array2<f64>,
    seq_len: usize,
}

pub struct NetworkGrads {
    layers: Vec<LayerGrads>,
    dense_w: Array2<f64>,
    dense_b: Array1<f64>,
}

pub struct NetworkMoments {
    layers: Vec<(Moments<Ix2>, Moments<Ix2>, Moments<Ix1>)>,
    dense_w: Moments<Ix2>,
    dense_b: Moments<Ix1>,
}

impl LstmNetwork {
    pub fn new(input_size: usize, units: usize, n_layers: usize, dropout: f64, rng: &mut StdRng) -> Self {
        let layers = (0..n_layers)
            .map(|l| LstmLayer::new(if l == 0 { input_size } else { units }, units, rng))
            .collect();
        Self {
            layers,
            dense_w: glorot_uniform(units, 1, rng),
            dense_b: Array1::zeros(1),
            dropout,
        }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size()).unwrap_or(0)
    }

    pub fn moments(&self) -> NetworkMoments {
        NetworkMoments {
            layers: self
                .layers
                .iter()
                .map(|l| (Moments::like(&l.kernel), Moments::like(&l.recurrent), Moments::like(&l.bias)))
                .collect(),
            dense_w: Moments::like(&self.dense_w),
            dense_b: Moments::like(&self.dense_b),
        }
    }

    /// `x` is `(batch, steps, features)`. Passing an RNG turns dropout on.
    pub fn forward(&self, x: &Array3<f64>, mut rng: Option<&mut StdRng>) -> ForwardPass {
        let seq_len = x.len_of(Axis(1));
        let mut inputs: Vec<Array2<f64>> = (0..seq_len).map(|t| x.index_axis(Axis(1), t).to_owned()).collect();
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());
        let last_layer = self.layers.len() - 1;

        for (l, layer) in self.layers.iter().enumerate() {
            let (mut outputs, layer_caches) = layer.forward(&inputs);
            caches.push(layer_caches);

            // The last layer only hands its final state onward
            if l == last_layer {
                outputs.drain(..outputs.len().saturating_sub(1));
            }

            let mut layer_masks = Vec::with_capacity(outputs.len());
            for h in outputs.iter_mut() {
                let mask = rng
                    .as_deref_mut()
                    .filter(|_| self.dropout > 0.0)
                    .map(|r| dropout_mask(h.raw_dim(), self.dropout, r));
                if let Some(m) = &mask {
                    *h *= m;
                }
                layer_masks.push(mask);
            }
            masks.push(layer_masks);
            inputs = outputs;
        }

        let last_hidden = inputs.pop().unwrap_or_else(|| Array2::zeros((x.len_of(Axis(0)), 0)));
        let predictions = last_hidden.dot(&self.dense_w).column(0).to_owned() + self.dense_b[0];

        ForwardPass {
            predictions,
            caches,
            masks,
            last_hidden,
            seq_len,
        }
    }

    /// `d_pred` is dLoss/dPrediction for each batch row
    pub fn backward(&self, pass: &ForwardPass, d_pred: &Array1<f64>) -> NetworkGrads {
        let dy = d_pred.view().insert_axis(Axis(1));
        let dense_w = pass.last_hidden.t().dot(&dy);
        let dense_b = Array1::from_elem(1, d_pred.sum());

        let mut d_hidden = dy.dot(&self.dense_w.t());
        let mut layer_grads = Vec::with_capacity(self.layers.len());
        let last_layer = self.layers.len() - 1;

        // Gradient w.r.t. each step's output of the layer being processed
        let mut d_outputs: Vec<Array2<f64>> = Vec::new();

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            if l == last_layer {
                if let Some(Some(mask)) = pass.masks[l].first() {
                    d_hidden *= mask;
                }
                let zeros = Array2::<f64>::zeros(d_hidden.raw_dim());
                d_outputs = vec![zeros; pass.seq_len];
                if let Some(last) = d_outputs.last_mut() {
                    *last = d_hidden.clone();
                }
            } else {
                for (d, mask) in d_outputs.iter_mut().zip(pass.masks[l].iter()) {
                    if let Some(m) = mask {
                        *d *= m;
                    }
                }
            }

            let (grads, d_inputs) = layer.backward(&pass.caches[l], &d_outputs);
            layer_grads.push(grads);
            d_outputs = d_inputs;
        }
        layer_grads.reverse();

        NetworkGrads {
            layers: layer_grads,
            dense_w,
            dense_b,
        }
    }

    pub fn apply(&mut self, step: AdamStep, grads: &NetworkGrads, moments: &mut NetworkMoments) {
        for ((layer, g), (mk, mr, mb)) in self
            .layers
            .iter_mut()
            .zip(grads.layers.iter())
            .zip(moments.layers.iter_mut())
        {
            mk.update(step, &mut layer.kernel, &g.kernel);
            mr.update(step, &mut layer.recurrent, &g.recurrent);
            mb.update(step, &mut layer.bias, &g.bias);
        }
        moments.dense_w.update(step, &mut self.dense_w, &grads.dense_w);
        moments.dense_b.update(step, &mut self.dense_b, &grads.dense_b);
    }

    pub fn predict(&self, x: &Array3<f64>) -> Array1<f64> {
        self.forward(x, None).predictions
    }
}

/// Inverted dropout: kept units are scaled by `1 / (1 - rate)`
fn dropout_mask(shape: ndarray::Ix2, rate: f64, rng: &mut StdRng) -> Array2<f64> {
    let keep = 1.0 - rate;
    Array2::from_shape_fn(shape, |_| if rng.random::<f64>() < keep { 1.0 / keep } else { 0.0 })
}

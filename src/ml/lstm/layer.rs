use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;

/// Gate blocks are laid out input, forget, candidate, output along the
/// 4·units axis of every weight.
#[derive(Debug, Clone)]
pub struct LstmLayer {
    pub kernel: Array2<f64>,
    pub recurrent: Array2<f64>,
    pub bias: Array1<f64>,
    units: usize,
}

/// Activations kept from the forward pass of one timestep
#[derive(Debug, Clone)]
pub struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct LayerGrads {
    pub kernel: Array2<f64>,
    pub recurrent: Array2<f64>,
    pub bias: Array1<f64>,
}

impl LstmLayer {
    /// Glorot-uniform weights, zero bias except a forget-gate bias of 1
    pub fn new<R: Rng>(input_size: usize, units: usize, rng: &mut R) -> Self {
        let kernel = glorot_uniform(input_size, 4 * units, rng);
        let recurrent = glorot_uniform(units, 4 * units, rng);
        let mut bias = Array1::zeros(4 * units);
        bias.slice_mut(s![units..2 * units]).fill(1.0);

        Self {
            kernel,
            recurrent,
            bias,
            units,
        }
    }

    pub fn input_size(&self) -> usize {
        self.kernel.nrows()
    }

    /// Runs the layer over a sequence of `(batch, input)` steps from a zero
    /// state, returning every hidden state plus the caches for backprop.
    pub fn forward(&self, inputs: &[Array2<f64>]) -> (Vec<Array2<f64>>, Vec<StepCache>) {
        let batch = inputs.first().map(|x| x.nrows()).unwrap_or(0);
        let u = self.units;
        let mut h = Array2::<f64>::zeros((batch, u));
        let mut c = Array2::<f64>::zeros((batch, u));
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut caches = Vec::with_capacity(inputs.len());

        for x in inputs {
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent) + &self.bias;
            let i = z.slice(s![.., 0..u]).mapv(sigmoid);
            let f = z.slice(s![.., u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * u..3 * u]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * u..4 * u]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            caches.push(StepCache {
                x: x.clone(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_next.clone());
            h = h_next;
            c = c_next;
        }

        (outputs, caches)
    }

    /// Backpropagation through time. `d_outputs[t]` is the loss gradient
    /// w.r.t. the hidden state emitted at step `t`. Returns the weight
    /// gradients and the gradient w.r.t. each step's input.
    pub fn backward(&self, caches: &[StepCache], d_outputs: &[Array2<f64>]) -> (LayerGrads, Vec<Array2<f64>>) {
        let u = self.units;
        let batch = caches.first().map(|c| c.x.nrows()).unwrap_or(0);
        let mut grads = LayerGrads {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent: Array2::zeros(self.recurrent.raw_dim()),
            bias: Array1::zeros(self.bias.len()),
        };
        let mut dh_next = Array2::<f64>::zeros((batch, u));
        let mut dc_next = Array2::<f64>::zeros((batch, u));
        let mut d_inputs = vec![Array2::<f64>::zeros((batch, self.input_size())); caches.len()];
        let mut dz = Array2::<f64>::zeros((batch, 4 * u));

        for t in (0..caches.len()).rev() {
            let step = &caches[t];
            let dh = &d_outputs[t] + &dh_next;

            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            dz.slice_mut(s![.., 0..u]).assign(&(d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., u..2 * u]).assign(&(d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * u..3 * u]).assign(&(d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * u..4 * u]).assign(&(d_o * &step.o.mapv(|v| v * (1.0 - v))));

            grads.kernel += &step.x.t().dot(&dz);
            grads.recurrent += &step.h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));

            d_inputs[t] = dz.dot(&self.kernel.t());
            dh_next = dz.dot(&self.recurrent.t());
        }

        (grads, d_inputs)
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn glorot_uniform<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn loss(layer: &LstmLayer, inputs: &[Array2<f64>]) -> f64 {
        let (outputs, _) = layer.forward(inputs);
        outputs.iter().map(|h| h.sum()).sum()
    }

    #[test]
    fn test_forward_shapes_and_forget_bias() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LstmLayer::new(3, 4, &mut rng);
        assert_eq!(layer.kernel.shape(), &[3, 16]);
        assert_eq!(layer.recurrent.shape(), &[4, 16]);
        assert!(layer.bias.slice(s![4..8]).iter().all(|b| *b == 1.0));

        let inputs = vec![Array2::from_elem((2, 3), 0.5); 3];
        let (outputs, caches) = layer.forward(&inputs);
        assert_eq!(outputs.len(), 3);
        assert_eq!(caches.len(), 3);
        assert_eq!(outputs[2].shape(), &[2, 4]);
        assert!(outputs.iter().flatten().all(|h| h.abs() < 1.0));
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut layer = LstmLayer::new(2, 3, &mut rng);
        let inputs = vec![
            Array2::from_shape_vec((2, 2), vec![0.1, -0.4, 0.7, 0.2]).unwrap(),
            Array2::from_shape_vec((2, 2), vec![-0.3, 0.5, 0.0, 0.9]).unwrap(),
        ];

        let (outputs, caches) = layer.forward(&inputs);
        let d_outputs: Vec<Array2<f64>> = outputs.iter().map(|h| Array2::ones(h.raw_dim())).collect();
        let (grads, d_inputs) = layer.backward(&caches, &d_outputs);

        let eps = 1e-6;
        for &(r, col) in &[(0, 0), (1, 5), (0, 11)] {
            let original = layer.kernel[[r, col]];
            layer.kernel[[r, col]] = original + eps;
            let plus = loss(&layer, &inputs);
            layer.kernel[[r, col]] = original - eps;
            let minus = loss(&layer, &inputs);
            layer.kernel[[r, col]] = original;
            let numeric = (plus - minus) / (2.0 * eps);
            assert!((numeric - grads.kernel[[r, col]]).abs() < 1e-6);
        }

        for &(r, col) in &[(0, 3), (2, 8)] {
            let original = layer.recurrent[[r, col]];
            layer.recurrent[[r, col]] = original + eps;
            let plus = loss(&layer, &inputs);
            layer.recurrent[[r, col]] = original - eps;
            let minus = loss(&layer, &inputs);
            layer.recurrent[[r, col]] = original;
            let numeric = (plus - minus) / (2.0 * eps);
            assert!((numeric - grads.recurrent[[r, col]]).abs() < 1e-6);
        }

        let mut shifted = inputs.clone();
        shifted[0][[1, 1]] += eps;
        let plus = loss(&layer, &shifted);
        shifted[0][[1, 1]] -= 2.0 * eps;
        let minus = loss(&layer, &shifted);
        let numeric = (plus - minus) / (2.0 * eps);
        assert!((numeric - d_inputs[0][[1, 1]]).abs() < 1e-6);
    }
}

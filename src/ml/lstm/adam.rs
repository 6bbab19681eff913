use ndarray::{Array, Dimension, Zip};

/// Adam with bias-corrected step size
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
        }
    }

    /// Advances the shared step counter. Call once per batch, before the
    /// per-parameter updates.
    pub fn next_step(&mut self) -> AdamStep {
        self.step += 1;
        let correction = (1.0 - self.beta2.powi(self.step)).sqrt() / (1.0 - self.beta1.powi(self.step));
        AdamStep {
            lr: self.learning_rate * correction,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdamStep {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
}

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
pub struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    pub fn like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    pub fn update(&mut self, step: AdamStep, param: &mut Array<f64, D>, grad: &Array<f64, D>) {
        Zip::from(param)
            .and(grad)
            .and(&mut self.m)
            .and(&mut self.v)
            .for_each(|p, &g, m, v| {
                *m = step.beta1 * *m + (1.0 - step.beta1) * g;
                *v = step.beta2 * *v + (1.0 - step.beta2) * g * g;
                *p -= step.lr * *m / (v.sqrt() + step.epsilon);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.01);
        let mut param = array![1.0, -1.0];
        let grad = array![0.5, -2.0];
        let mut moments = Moments::like(&param);
        moments.update(adam.next_step(), &mut param, &grad);
        // Bias-corrected first step is lr * sign(g)
        assert!((param[0] - 0.99).abs() < 1e-6);
        assert!((param[1] + 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut adam = Adam::new(0.05);
        let mut param = array![3.0];
        let mut moments = Moments::like(&param);
        for _ in 0..500 {
            let grad = param.mapv(|p| 2.0 * (p - 1.0));
            moments.update(adam.next_step(), &mut param, &grad);
        }
        assert!((param[0] - 1.0).abs() < 0.05);
    }
}

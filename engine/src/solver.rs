use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineErr, Result};
use crate::net::Net;

fn default_type() -> String {
    "SGD".to_string()
}
fn default_base_lr() -> f32 {
    0.01
}
fn default_lr_policy() -> String {
    "fixed".to_string()
}
fn default_momentum2() -> f32 {
    0.999
}
fn default_delta() -> f32 {
    1e-8
}
fn default_rms_decay() -> f32 {
    0.99
}
fn default_regularization() -> String {
    "L2".to_string()
}
fn default_average_loss() -> usize {
    1
}

/// Solver hyperparameters, read from a JSON configuration file or built in
/// memory. Field names mirror the native solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverParams {
    /// Path to the training net definition.
    pub net: PathBuf,
    #[serde(rename = "type", default = "default_type")]
    pub solver_type: String,
    #[serde(default = "default_base_lr")]
    pub base_lr: f32,
    #[serde(default = "default_lr_policy")]
    pub lr_policy: String,
    #[serde(default)]
    pub gamma: f32,
    #[serde(default)]
    pub power: f32,
    #[serde(default)]
    pub momentum: f32,
    #[serde(default = "default_momentum2")]
    pub momentum2: f32,
    #[serde(default = "default_delta")]
    pub delta: f32,
    #[serde(default = "default_rms_decay")]
    pub rms_decay: f32,
    #[serde(default)]
    pub weight_decay: f32,
    #[serde(default = "default_regularization")]
    pub regularization_type: String,
    #[serde(default)]
    pub stepsize: usize,
    pub max_iter: usize,
    #[serde(default)]
    pub display: usize,
    #[serde(default = "default_average_loss")]
    pub average_loss: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
    /// Evaluation net definitions, built alongside the training net.
    #[serde(default)]
    pub test_nets: Vec<PathBuf>,
}

impl SolverParams {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Strategy for updating one parameter blob from its accumulated gradient.
///
/// `param_id` is the blob's index within the net's parameter list, stable
/// across iterations, so rules can keep per-parameter history.
pub trait UpdateRule: Send {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()>;
}

fn check_lens(history: &[f32], diff: &[f32], data: &[f32]) -> Result<()> {
    if diff.len() != data.len() || history.len() != data.len() {
        return Err(EngineErr::ShapeMismatch {
            what: "solver update",
            got: diff.len(),
            expected: data.len(),
        });
    }
    Ok(())
}

fn zeroed_histories(lens: &[usize]) -> Vec<Box<[f32]>> {
    lens.iter().map(|&l| vec![0.0; l].into_boxed_slice()).collect()
}

/// Plain SGD with momentum: `v = mu*v + rate*g; p -= v`.
pub struct Sgd {
    momentum: f32,
    history: Vec<Box<[f32]>>,
}

impl Sgd {
    pub fn new(lens: &[usize], momentum: f32) -> Self {
        Self {
            momentum,
            history: zeroed_histories(lens),
        }
    }
}

impl UpdateRule for Sgd {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()> {
        let h = &mut self.history[param_id];
        check_lens(h, diff, data)?;
        let mu = self.momentum;
        data.iter_mut()
            .zip(diff)
            .zip(h.iter_mut())
            .for_each(|((p, g), v)| {
                *v = mu * *v + rate * g;
                *p -= *v;
            });
        Ok(())
    }
}

/// Nesterov accelerated gradient.
pub struct Nesterov {
    momentum: f32,
    history: Vec<Box<[f32]>>,
}

impl Nesterov {
    pub fn new(lens: &[usize], momentum: f32) -> Self {
        Self {
            momentum,
            history: zeroed_histories(lens),
        }
    }
}

impl UpdateRule for Nesterov {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()> {
        let h = &mut self.history[param_id];
        check_lens(h, diff, data)?;
        let mu = self.momentum;
        data.iter_mut()
            .zip(diff)
            .zip(h.iter_mut())
            .for_each(|((p, g), v)| {
                let v_prev = *v;
                *v = mu * *v + rate * g;
                *p -= (1.0 + mu) * *v - mu * v_prev;
            });
        Ok(())
    }
}

/// AdaGrad: per-weight rates from the accumulated squared gradient.
pub struct AdaGrad {
    delta: f32,
    history: Vec<Box<[f32]>>,
}

impl AdaGrad {
    pub fn new(lens: &[usize], delta: f32) -> Self {
        Self {
            delta,
            history: zeroed_histories(lens),
        }
    }
}

impl UpdateRule for AdaGrad {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()> {
        let h = &mut self.history[param_id];
        check_lens(h, diff, data)?;
        let eps = self.delta;
        data.iter_mut()
            .zip(diff)
            .zip(h.iter_mut())
            .for_each(|((p, g), acc)| {
                *acc += g * g;
                *p -= rate * g / (acc.sqrt() + eps);
            });
        Ok(())
    }
}

/// RMSProp: leaky average of squared gradients.
pub struct RmsProp {
    rms_decay: f32,
    delta: f32,
    history: Vec<Box<[f32]>>,
}

impl RmsProp {
    pub fn new(lens: &[usize], rms_decay: f32, delta: f32) -> Self {
        Self {
            rms_decay,
            delta,
            history: zeroed_histories(lens),
        }
    }
}

impl UpdateRule for RmsProp {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()> {
        let h = &mut self.history[param_id];
        check_lens(h, diff, data)?;
        let d = self.rms_decay;
        let eps = self.delta;
        data.iter_mut()
            .zip(diff)
            .zip(h.iter_mut())
            .for_each(|((p, g), acc)| {
                *acc = d * *acc + (1.0 - d) * g * g;
                *p -= rate * g / (acc.sqrt() + eps);
            });
        Ok(())
    }
}

/// AdaDelta: unit-corrected adaptive rates; `momentum` acts as the decay.
pub struct AdaDelta {
    momentum: f32,
    delta: f32,
    grad_history: Vec<Box<[f32]>>,
    update_history: Vec<Box<[f32]>>,
}

impl AdaDelta {
    pub fn new(lens: &[usize], momentum: f32, delta: f32) -> Self {
        Self {
            momentum,
            delta,
            grad_history: zeroed_histories(lens),
            update_history: zeroed_histories(lens),
        }
    }
}

impl UpdateRule for AdaDelta {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()> {
        let gh = &mut self.grad_history[param_id];
        let uh = &mut self.update_history[param_id];
        check_lens(gh, diff, data)?;
        let mu = self.momentum;
        let eps = self.delta;
        data.iter_mut()
            .zip(diff)
            .zip(gh.iter_mut().zip(uh.iter_mut()))
            .for_each(|((p, g), (g2, u2))| {
                *g2 = mu * *g2 + (1.0 - mu) * g * g;
                let update = g * ((*u2 + eps) / (*g2 + eps)).sqrt();
                *u2 = mu * *u2 + (1.0 - mu) * update * update;
                *p -= rate * update;
            });
        Ok(())
    }
}

/// Adam with bias-corrected moment estimates.
pub struct Adam {
    beta1: f32,
    beta2: f32,
    delta: f32,
    steps: Vec<u64>,
    m: Vec<Box<[f32]>>,
    v: Vec<Box<[f32]>>,
}

impl Adam {
    pub fn new(lens: &[usize], beta1: f32, beta2: f32, delta: f32) -> Self {
        Self {
            beta1,
            beta2,
            delta,
            steps: vec![0; lens.len()],
            m: zeroed_histories(lens),
            v: zeroed_histories(lens),
        }
    }
}

impl UpdateRule for Adam {
    fn update_params(
        &mut self,
        param_id: usize,
        rate: f32,
        diff: &[f32],
        data: &mut [f32],
    ) -> Result<()> {
        let m = &mut self.m[param_id];
        check_lens(m, diff, data)?;
        let v = &mut self.v[param_id];
        let (b1, b2, eps) = (self.beta1, self.beta2, self.delta);

        self.steps[param_id] += 1;
        let t = self.steps[param_id] as i32;
        let bc1 = 1.0 - b1.powi(t);
        let bc2 = 1.0 - b2.powi(t);
        let step_size = rate * bc2.sqrt() / bc1;

        data.iter_mut()
            .zip(diff)
            .zip(m.iter_mut().zip(v.iter_mut()))
            .for_each(|((p, g), (m, v))| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                *p -= step_size * *m / (v.sqrt() + eps);
            });
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SolverState {
    iter: usize,
    weights: PathBuf,
}

/// Drives iterative weight updates over one training net using a fixed
/// update-rule variant.
pub struct Solver {
    params: SolverParams,
    net: Arc<Net>,
    test_nets: Vec<Arc<Net>>,
    rule: Box<dyn UpdateRule>,
    iter: usize,
    recent_losses: VecDeque<f32>,
    smoothed_loss: f32,
}

impl Solver {
    pub fn new(
        params: SolverParams,
        net: Arc<Net>,
        test_nets: Vec<Arc<Net>>,
        rule: Box<dyn UpdateRule>,
    ) -> Result<Self> {
        match params.lr_policy.as_str() {
            "fixed" | "step" | "inv" => {}
            other => {
                return Err(EngineErr::MalformedDef {
                    what: format!("unknown lr_policy: {other}"),
                })
            }
        }
        match params.regularization_type.as_str() {
            "L1" | "L2" => {}
            other => {
                return Err(EngineErr::MalformedDef {
                    what: format!("unknown regularization_type: {other}"),
                })
            }
        }
        Ok(Self {
            params,
            net,
            test_nets,
            rule,
            iter: 0,
            recent_losses: VecDeque::new(),
            smoothed_loss: 0.0,
        })
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut SolverParams {
        &mut self.params
    }

    pub fn net(&self) -> Arc<Net> {
        Arc::clone(&self.net)
    }

    pub fn test_nets(&self) -> &[Arc<Net>] {
        &self.test_nets
    }

    pub fn iter(&self) -> usize {
        self.iter
    }

    pub fn max_iter(&self) -> usize {
        self.params.max_iter
    }

    /// Learning rate at the current iteration, per the configured policy.
    pub fn effective_lr(&self) -> f32 {
        let p = &self.params;
        match p.lr_policy.as_str() {
            "step" => {
                let exponent = if p.stepsize > 0 {
                    (self.iter / p.stepsize) as i32
                } else {
                    0
                };
                p.base_lr * p.gamma.powi(exponent)
            }
            "inv" => p.base_lr * (1.0 + p.gamma * self.iter as f32).powf(-p.power),
            _ => p.base_lr,
        }
    }

    /// Runs `iters` full iterations (forward, backward, update) and returns
    /// the smoothed loss.
    pub fn step(&mut self, iters: usize) -> Result<f32> {
        let window = self.params.average_loss.max(1);
        for _ in 0..iters {
            for blob in self.net.param_blobs() {
                blob.zero_diff();
            }
            let loss = self.net.forward_all()?;
            self.net.backward_all()?;
            self.apply_update()?;
            self.iter += 1;

            self.recent_losses.push_back(loss);
            if self.recent_losses.len() > window {
                self.recent_losses.pop_front();
            }
            self.smoothed_loss =
                self.recent_losses.iter().sum::<f32>() / self.recent_losses.len() as f32;

            if self.params.display > 0 && self.iter % self.params.display == 0 {
                log::info!(
                    "iteration {}, lr = {}, loss = {}",
                    self.iter,
                    self.effective_lr(),
                    self.smoothed_loss
                );
            }
        }
        Ok(self.smoothed_loss)
    }

    fn apply_update(&mut self) -> Result<()> {
        let rate = self.effective_lr();
        let decay = self.params.weight_decay;
        let l1 = self.params.regularization_type == "L1";
        let rule = &mut self.rule;

        for (id, blob) in self.net.param_blobs().iter().enumerate() {
            blob.apply_update(|data, diff| {
                if decay != 0.0 {
                    if l1 {
                        for (g, p) in diff.iter_mut().zip(data.iter()) {
                            *g += decay * p.signum();
                        }
                    } else {
                        for (g, p) in diff.iter_mut().zip(data.iter()) {
                            *g += decay * p;
                        }
                    }
                }
                rule.update_params(id, rate, diff, data)
            })?;
        }
        Ok(())
    }

    /// Runs until `max_iter`, optionally resuming from a checkpoint first.
    /// No snapshot is taken unless `snapshot` is called explicitly.
    pub fn solve(&mut self, resume: Option<&Path>) -> Result<()> {
        if let Some(path) = resume {
            self.restore(path)?;
        }
        let remaining = self.params.max_iter.saturating_sub(self.iter);
        self.step(remaining)?;
        Ok(())
    }

    /// Serializes the current weights and iteration to disk, returning the
    /// state file path.
    pub fn snapshot(&self) -> Result<PathBuf> {
        let prefix = self
            .params
            .snapshot_prefix
            .as_deref()
            .ok_or_else(|| EngineErr::MalformedDef {
                what: "snapshot requested but snapshot_prefix is not set".to_string(),
            })?;
        let weights = PathBuf::from(format!("{prefix}_iter_{}.safetensors", self.iter));
        let state_path = PathBuf::from(format!("{prefix}_iter_{}.solverstate.json", self.iter));

        self.net.save_weights(&weights)?;
        let state = SolverState {
            iter: self.iter,
            weights,
        };
        fs::write(&state_path, serde_json::to_string_pretty(&state)?)?;
        log::info!("snapshotted solver state to {}", state_path.display());
        Ok(state_path)
    }

    /// Loads weights and the iteration counter from a state file written by
    /// `snapshot`. Update-rule history restarts empty.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        let state: SolverState = serde_json::from_str(&text)?;
        self.net.copy_trained_layers_from(&state.weights)?;
        self.iter = state.iter;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgd_applies_momentum() {
        let mut rule = Sgd::new(&[2], 0.5);
        let mut data = [1.0, 1.0];
        rule.update_params(0, 0.1, &[1.0, 2.0], &mut data).unwrap();
        assert_eq!(data, [0.9, 0.8]);
        // Second step carries velocity: v = 0.5*0.1 + 0.1*1 = 0.15.
        rule.update_params(0, 0.1, &[1.0, 2.0], &mut data).unwrap();
        assert!((data[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn adam_first_step_moves_by_roughly_the_rate() {
        let mut rule = Adam::new(&[1], 0.9, 0.999, 1e-8);
        let mut data = [0.0];
        rule.update_params(0, 0.1, &[3.0], &mut data).unwrap();
        // Bias correction makes the first step approximately rate-sized.
        assert!((data[0] + 0.1).abs() < 1e-4);
    }

    #[test]
    fn adagrad_shrinks_effective_rate() {
        let mut rule = AdaGrad::new(&[1], 1e-8);
        let mut data = [0.0];
        rule.update_params(0, 0.1, &[2.0], &mut data).unwrap();
        let first = -data[0];
        rule.update_params(0, 0.1, &[2.0], &mut data).unwrap();
        let second = -data[0] - first;
        assert!(second < first);
    }

    #[test]
    fn update_rejects_length_mismatch() {
        let mut rule = Sgd::new(&[2], 0.0);
        let mut data = [0.0, 0.0, 0.0];
        assert!(matches!(
            rule.update_params(0, 0.1, &[1.0, 1.0, 1.0], &mut data),
            Err(EngineErr::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn step_lr_policy_decays() {
        let params = SolverParams {
            net: PathBuf::new(),
            solver_type: "SGD".to_string(),
            base_lr: 1.0,
            lr_policy: "step".to_string(),
            gamma: 0.1,
            power: 0.0,
            momentum: 0.0,
            momentum2: 0.999,
            delta: 1e-8,
            rms_decay: 0.99,
            weight_decay: 0.0,
            regularization_type: "L2".to_string(),
            stepsize: 10,
            max_iter: 100,
            display: 0,
            average_loss: 1,
            snapshot_prefix: None,
            random_seed: None,
            test_nets: vec![],
        };
        let net = Arc::new(
            crate::net::Net::build(
                &crate::netdef::NetDef {
                    name: "empty".to_string(),
                    layers: vec![],
                },
                crate::netdef::Phase::Train,
                0,
            )
            .unwrap(),
        );
        let rule = Box::new(Sgd::new(&[], 0.0));
        let mut solver = Solver::new(params, net, vec![], rule).unwrap();
        assert_eq!(solver.effective_lr(), 1.0);
        solver.iter = 10;
        assert!((solver.effective_lr() - 0.1).abs() < 1e-6);
    }
}

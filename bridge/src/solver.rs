//! Solver construction by type name, plus the gated training surface.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use engine::solver::{AdaDelta, AdaGrad, Adam, Nesterov, RmsProp, Sgd, UpdateRule};
use engine::{Net as EngineNet, NetDef, Phase, Solver as EngineSolver, SolverParams};

use crate::error::{BridgeErr, Result};
use crate::gate::HostGuard;
use crate::net::{check_file, Net};

type RuleBuilder = fn(&SolverParams, &[usize]) -> Box<dyn UpdateRule>;

/// Name-to-constructor table, matching the native solver type names.
static REGISTRY: &[(&str, RuleBuilder)] = &[
    ("SGD", |p, lens| Box::new(Sgd::new(lens, p.momentum))),
    ("Nesterov", |p, lens| {
        Box::new(Nesterov::new(lens, p.momentum))
    }),
    ("AdaGrad", |p, lens| Box::new(AdaGrad::new(lens, p.delta))),
    ("RMSProp", |p, lens| {
        Box::new(RmsProp::new(lens, p.rms_decay, p.delta))
    }),
    ("AdaDelta", |p, lens| {
        Box::new(AdaDelta::new(lens, p.momentum, p.delta))
    }),
    ("Adam", |p, lens| {
        Box::new(Adam::new(lens, p.momentum, p.momentum2, p.delta))
    }),
];

/// Names of all registered solver types.
pub fn solver_type_list() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

fn lookup_rule(params: &SolverParams, lens: &[usize]) -> Result<Box<dyn UpdateRule>> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == params.solver_type)
        .map(|(_, build)| build(params, lens))
        .ok_or_else(|| BridgeErr::UnknownSolver {
            name: params.solver_type.clone(),
        })
}

/// Host handle to a solver, owning the training and evaluation nets.
pub struct Solver {
    inner: EngineSolver,
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("type", &self.inner.params().solver_type)
            .field("iter", &self.inner.iter())
            .field("max_iter", &self.inner.max_iter())
            .finish()
    }
}

impl Solver {
    /// Reads a solver configuration file and builds the solver it describes,
    /// training net and test nets included.
    pub fn from_file(config: &Path) -> Result<Self> {
        check_file(config)?;
        let params = SolverParams::from_json_file(config)?;
        Self::from_params(params)
    }

    /// Builds a solver from in-memory configuration. The net definition
    /// files it references are still read from disk.
    pub fn from_params(params: SolverParams) -> Result<Self> {
        check_file(&params.net)?;
        let seed = params.random_seed.unwrap_or(0);
        let def = NetDef::from_json_file(&params.net)?;
        let net = Arc::new(EngineNet::build(&def, Phase::Train, seed)?);

        let mut test_nets = Vec::with_capacity(params.test_nets.len());
        for (i, path) in params.test_nets.iter().enumerate() {
            check_file(path)?;
            let def = NetDef::from_json_file(path)?;
            test_nets.push(Arc::new(EngineNet::build(
                &def,
                Phase::Test,
                seed.wrapping_add(1 + i as u64),
            )?));
        }

        let lens: Vec<usize> = net.param_blobs().iter().map(|b| b.count()).collect();
        let rule = lookup_rule(&params, &lens)?;
        log::debug!(
            "built {} solver over net {} ({} parameter blobs)",
            params.solver_type,
            net.name(),
            lens.len()
        );
        let inner = EngineSolver::new(params, net, test_nets, rule)?;
        Ok(Self { inner })
    }

    pub fn net(&self) -> Net {
        Net::from_engine(self.inner.net())
    }

    pub fn test_nets(&self) -> Vec<Net> {
        self.inner
            .test_nets()
            .iter()
            .map(|n| Net::from_engine(Arc::clone(n)))
            .collect()
    }

    pub fn iter(&self) -> usize {
        self.inner.iter()
    }

    pub fn max_iter(&self) -> usize {
        self.inner.max_iter()
    }

    pub fn params(&self) -> &SolverParams {
        self.inner.params()
    }

    pub fn params_mut(&mut self) -> &mut SolverParams {
        self.inner.params_mut()
    }

    /// Runs `iters` training iterations and returns the smoothed loss.
    /// Long-running: the host lock is released for the duration.
    pub fn step(&mut self, guard: &mut HostGuard<'_>, iters: usize) -> Result<f32> {
        let inner = &mut self.inner;
        Ok(guard.allow_threads(|| inner.step(iters))?)
    }

    /// Trains to `max_iter`, optionally restoring a checkpoint first. Takes
    /// no snapshot of its own; call `snapshot` for that.
    pub fn solve(&mut self, guard: &mut HostGuard<'_>, resume: Option<&Path>) -> Result<()> {
        let inner = &mut self.inner;
        guard.allow_threads(|| inner.solve(resume))?;
        Ok(())
    }

    /// Writes the current weights and iteration to disk, returning the state
    /// file path.
    pub fn snapshot(&self) -> Result<std::path::PathBuf> {
        Ok(self.inner.snapshot()?)
    }

    pub fn restore(&mut self, path: &Path) -> Result<()> {
        self.inner.restore(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_the_native_names() {
        assert_eq!(
            solver_type_list(),
            vec!["SGD", "Nesterov", "AdaGrad", "RMSProp", "AdaDelta", "Adam"]
        );
    }

    #[test]
    fn unknown_type_is_rejected_by_name() {
        let params = SolverParams {
            solver_type: "Rprop".to_string(),
            ..serde_json::from_value(serde_json::json!({
                "net": "unused.json",
                "max_iter": 1
            }))
            .unwrap()
        };
        let err = match lookup_rule(&params, &[]) {
            Ok(_) => panic!("Rprop should not resolve"),
            Err(e) => e,
        };
        assert_eq!(err.to_string(), "unknown solver type: Rprop");
    }
}

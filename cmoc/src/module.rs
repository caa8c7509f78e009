//! The physics-module ABI: the boundary between an [`crate::agent::Agent`]
//! and the solver it wraps. CMOC never links a solver itself -- the host
//! hands each `Agent` a `Rc<RefCell<dyn PhysicsModule>>`, obtained through a
//! [`ModuleLoader`] the host also supplies.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CoreResult;
use crate::time::Duration;

/// Called back into by [`PhysicsModule::initialize`] so the module can tell
/// its owning Agent what buffer windows it actually created (a module is
/// free to pick its own working window names; the Agent only learns them
/// through this callback).
pub trait ModuleInit {
    fn init_callback(
        &self,
        surf_window: &str,
        vol_window: &str,
        options: Option<&str>,
    ) -> CoreResult<()>;
}

/// Reentry points a [`PhysicsModule`] uses, from inside its own
/// `update_solution`, to ask its owning Agent to refresh a boundary
/// condition or a grid-motion field before continuing its own solve.
pub trait AgentCallbacks {
    /// Refresh boundary conditions at the given predictor-corrector `alpha`.
    /// `level` selects a BC sub-scheduler when an Agent maintains more than
    /// one (e.g. distinct near-field/far-field BC levels); `None` selects
    /// the default (level `0`).
    fn obtain_bc(&self, alpha: f64, level: Option<i32>) -> CoreResult<()>;

    /// Refresh the grid-motion field at the given predictor-corrector
    /// `alpha`.
    fn obtain_gm(&self, alpha: f64) -> CoreResult<()>;
}

/// The physics solver contract. A module is not an `Action`: the Agent
/// wraps it in a `PhysicsAction` and mediates every call through the
/// `AgentCallbacks`/`ModuleInit` reentry points above.
pub trait PhysicsModule {
    /// Called once, before any `update_solution`. Must eventually call back
    /// into `init.init_callback(..)`.
    fn initialize(&mut self, init: &dyn ModuleInit) -> CoreResult<()>;

    /// Advance the solver by `dt` from `t`, at predictor-corrector `alpha`.
    /// May call back into `callbacks` zero or more times.
    fn update_solution(
        &mut self,
        t: Duration,
        dt: Duration,
        alpha: f64,
        callbacks: &dyn AgentCallbacks,
    ) -> CoreResult<()>;

    /// Called once, at shutdown (skipped by the Agent if the coupling is
    /// restarting).
    fn finalize(&mut self) -> CoreResult<()>;

    /// The largest `dt` this module can currently accept, given the last
    /// step it took. Default: no opinion (identity).
    fn max_timestep(&mut self, _t: Duration, dt: Duration) -> Duration {
        dt
    }

    /// Hook called before the host writes restart files for this step.
    fn pre_out_output(&mut self, _t: Duration) -> CoreResult<()> {
        Ok(())
    }

    /// Hook called after the host writes restart files for this step.
    fn post_out_output(&mut self, _t: Duration) -> CoreResult<()> {
        Ok(())
    }

    /// Hook called when the host delivers external input for this step.
    fn input(&mut self, _t: Duration) -> CoreResult<()> {
        Ok(())
    }

    /// Hook called when the host is about to write restart files for this
    /// step.
    fn output_restart_files(&mut self, _t: Duration) -> CoreResult<()> {
        Ok(())
    }

    /// Hook called when the host is about to write visualization files for
    /// this step.
    fn output_visualization_files(&mut self, _t: Duration) -> CoreResult<()> {
        Ok(())
    }
}

/// Loads/unloads a [`PhysicsModule`] by library and (nominal) window name.
pub trait ModuleLoader {
    fn load(&self, library: &str, window: &str) -> CoreResult<Rc<RefCell<dyn PhysicsModule>>>;

    fn unload(&self, _module: Rc<RefCell<dyn PhysicsModule>>) {}
}

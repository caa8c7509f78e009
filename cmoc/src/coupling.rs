//! `Coupling`: the top-level driver. Owns every [`Agent`], an init-time
//! `User` scheduler and a runtime `User` scheduler -- both are deliberately
//! the trivial linear-chain variant, not a DDG: the
//! agent-to-agent data dependencies that matter are expressed on each
//! Agent's `PhysicsAction` ports, and `Coupling` just needs *some* fixed,
//! repeatable order to run them in).

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::agent::{physics_action_handle, Agent, CouplingClock, PhysicsAction, SharedClock};
use crate::error::{CoreError, CoreResult};
use crate::scheduler::Scheduler;
use crate::time::Duration;

/// Tunable knobs a host supplies at construction; there is no config-file or
/// CLI layer inside the core itself -- that belongs to the consuming binary.
pub struct CouplingConfig {
    pub max_pred_corr_iterations: u32,
    pub convergence_tolerance: f64,
    pub restart_info_path: PathBuf,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        CouplingConfig {
            max_pred_corr_iterations: 1,
            convergence_tolerance: 1e-6,
            restart_info_path: PathBuf::from("restart_info.txt"),
        }
    }
}

/// The top-level multiphysics driver.
pub struct Coupling {
    name: String,
    comm_rank: i32,
    config: CouplingConfig,

    agents: Vec<Rc<RefCell<Agent>>>,
    init_scheduler: Scheduler,
    runtime_scheduler: Scheduler,
    clock: SharedClock,

    init_started: Cell<bool>,
    init_remeshed: Cell<bool>,
    restarting: Cell<bool>,
}

impl Coupling {
    pub fn new(name: impl Into<String>, comm_rank: i32, config: CouplingConfig) -> Self {
        let name = name.into();
        Coupling {
            init_scheduler: Scheduler::user(format!("{name}.init")),
            runtime_scheduler: Scheduler::user(format!("{name}.runtime")),
            clock: Rc::new(RefCell::new(CouplingClock::default())),
            agents: Vec::new(),
            config,
            comm_rank,
            init_started: Cell::new(false),
            init_remeshed: Cell::new(false),
            restarting: Cell::new(false),
            name,
        }
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Register an Agent, wiring its `PhysicsAction` into both the init-time
    /// and runtime `User` schedulers in registration order.
    pub fn add_agent(&mut self, agent: Rc<RefCell<Agent>>, ports: Vec<crate::action::Port>) -> CoreResult<()> {
        let name = agent.borrow().name().to_string();
        let action = physics_action_handle(PhysicsAction::new(name, ports, agent.clone()));
        self.init_scheduler.add_action(action.clone())?;
        self.runtime_scheduler.add_action(action)?;
        self.agents.push(agent);
        Ok(())
    }

    pub fn agents(&self) -> &[Rc<RefCell<Agent>>] {
        &self.agents
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initial_start(&self) -> bool {
        !self.init_started.get()
    }

    pub fn is_restart(&self) -> bool {
        self.restarting.get()
    }

    pub fn is_initial_remeshed(&self) -> bool {
        self.init_remeshed.get()
    }

    /// Exact `t == 0.0` by design, not an epsilon compare: see `DESIGN.md`.
    pub fn new_start(&self, t: Duration) -> bool {
        t.to_seconds() == 0.0
    }

    pub fn schedule(&mut self) -> CoreResult<()> {
        for agent in &self.agents {
            agent.borrow().initialize()?;
        }
        self.init_scheduler.schedule()?;
        self.runtime_scheduler.schedule()?;
        Ok(())
    }

    /// Calls `schedule()` if it hasn't run yet, fans `Scheduler::restarting`
    /// out to every coupling-level scheduler when `reinit`, then runs
    /// `init_scheduler` at top-level `alphaT = 0`.
    pub fn init(&mut self, t: Duration, dt: Duration, reinit: bool) -> CoreResult<()> {
        if !self.init_scheduler.is_scheduled() {
            self.schedule()?;
        }
        self.clock.borrow_mut().time = t.to_seconds();

        if reinit {
            self.set_restarting(t)?;
        }

        self.init_scheduler.init_actions(t)?;
        self.runtime_scheduler.init_actions(t)?;

        self.init_scheduler.set_alpha(0.0);
        self.init_scheduler.run_actions(t, dt)?;
        self.init_started.set(true);
        Ok(())
    }

    /// The largest `dt` every Agent will currently accept, folded via `min`
    /// over `dt`.
    pub fn max_timestep(&self, t: Duration, dt: Duration) -> Duration {
        self.agents
            .iter()
            .fold(dt, |acc, a| {
                let m = a.borrow().max_timestep(t, acc);
                if m.to_seconds() < acc.to_seconds() {
                    m
                } else {
                    acc
                }
            })
    }

    /// Advance one predictor-corrector sub-iteration: records `i_pred_corr`,
    /// reduces `dt` via [`Coupling::max_timestep`], and runs the runtime
    /// scheduler once at the fixed top-level `alphaT = -1`. Returns the
    /// advanced time `t + dt * max(zoom, 1)`.
    ///
    /// This is a single invocation, not the predictor-corrector loop itself:
    /// a host that wants predictor-corrector convergence calls this
    /// repeatedly with increasing `i_pred_corr`, checking
    /// [`Coupling::check_convergence`] (and calling
    /// [`Coupling::init_convergence`] between attempts) until it converges or
    /// the iteration budget is spent.
    pub fn run(&mut self, t: Duration, dt: Duration, i_pred_corr: u32, zoom: i32) -> CoreResult<Duration> {
        self.clock.borrow_mut().time = t.to_seconds();
        self.clock.borrow_mut().pred_corr_iteration = i_pred_corr;
        if i_pred_corr == 0 {
            for agent in &self.agents {
                agent.borrow().reset_step();
            }
        }

        let dt = self.max_timestep(t, dt);

        self.runtime_scheduler.set_alpha(-1.0);
        self.runtime_scheduler.run_actions(t, dt)?;

        let scale = zoom.max(1);
        Ok(t + Duration::from_seconds(dt.to_seconds() * scale as f64))
    }

    /// Fans out to every Agent when more than one predictor-corrector
    /// iteration is configured and this isn't the first (`i == 0`) attempt.
    pub fn init_convergence(&self, i: u32) {
        if self.config.max_pred_corr_iterations > 1 && i > 0 {
            for agent in &self.agents {
                agent.borrow().init_convergence(i);
            }
        }
    }

    /// Short-circuits `true` when only one predictor-corrector iteration is
    /// configured; otherwise ANDs every Agent's own convergence check.
    pub fn check_convergence(&self) -> CoreResult<bool> {
        if self.config.max_pred_corr_iterations <= 1 {
            return Ok(true);
        }
        for agent in &self.agents {
            if !agent.borrow().check_convergence(self.config.convergence_tolerance)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn input(&self, t: Duration) -> CoreResult<()> {
        for agent in &self.agents {
            agent.borrow().input(t)?;
        }
        Ok(())
    }

    pub fn output_restart_files(&self, t: Duration) -> CoreResult<()> {
        for agent in &self.agents {
            agent.borrow().output_restart_files(t)?;
        }
        Ok(())
    }

    pub fn output_visualization_files(&self, t: Duration) -> CoreResult<()> {
        for agent in &self.agents {
            agent.borrow().output_visualization_files(t)?;
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> CoreResult<()> {
        for agent in &self.agents {
            agent.borrow().set_restarting(self.restarting.get());
        }
        self.runtime_scheduler.finalize_actions()?;
        self.init_scheduler.finalize_actions()?;
        Ok(())
    }

    /// Read the last `"<step> <time>\n"` record from the restart-info file.
    /// Required to exist whenever `t != 0`; last record wins if the file has
    /// more than one (an interrupted write leaves earlier records intact).
    pub fn read_restart_info(&self, t: Duration) -> CoreResult<(i64, f64)> {
        let path = &self.config.restart_info_path;
        if t.to_seconds() != 0.0 && !path.exists() {
            return Err(CoreError::RestartInfoNotFound {
                path: path.display().to_string(),
            });
        }
        if !path.exists() {
            return Ok((0, 0.0));
        }
        let contents = fs::read_to_string(path).map_err(|e| CoreError::RestartInfoUnwritable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut last = (0i64, 0.0f64);
        for line in contents.lines() {
            let mut parts = line.split_whitespace();
            let (Some(step), Some(time)) = (parts.next(), parts.next()) else {
                continue;
            };
            if let (Ok(step), Ok(time)) = (step.parse::<i64>(), time.parse::<f64>()) {
                last = (step, time);
            }
        }
        Ok(last)
    }

    /// Write one `"<step> <time>\n"` record: truncating the file at
    /// `t == 0` (a fresh start), appending otherwise. Only rank 0 writes.
    pub fn write_restart_info(&self, step: i64, t: Duration) -> CoreResult<()> {
        if self.comm_rank != 0 {
            return Ok(());
        }
        let path = &self.config.restart_info_path;
        let line = format!("{step} {}\n", t.to_seconds());
        let write_result = if t.to_seconds() == 0.0 {
            fs::write(path, line)
        } else {
            use std::io::Write;
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut f| f.write_all(line.as_bytes()))
        };
        write_result.map_err(|e| CoreError::RestartInfoUnwritable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn set_restarting(&mut self, t: Duration) -> CoreResult<()> {
        self.restarting.set(true);
        self.clock.borrow_mut().time = t.to_seconds();
        self.init_scheduler.restarting();
        self.runtime_scheduler.restarting();
        Ok(())
    }

    /// Restart-info path, for a host that wants to check it directly.
    pub fn restart_info_path(&self) -> &Path {
        &self.config.restart_info_path
    }
}

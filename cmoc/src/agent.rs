//! `Agent`: wraps one physics module, owns the sub-schedulers that mediate
//! its reentrant boundary-condition and grid-motion refresh calls, and
//! carries the deferred dataitem registrations a module declares before its
//! buffer windows even have real names.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::action::{Action, Port};
use crate::error::{CoreError, CoreResult};
use crate::interpolate::InterpolateAction;
use crate::module::{AgentCallbacks, ModuleInit, ModuleLoader, PhysicsModule};
use crate::numeric::NumericLib;
use crate::registry::{DataItemSignature, DataRegistry, Handle};
use crate::scheduler::{ActionHandle, Scheduler};
use crate::time::Duration;

/// Time/iteration state shared between a [`crate::coupling::Coupling`] and
/// its Agents without either owning the other: both hold an `Rc` to this,
/// avoiding a literal ownership cycle between `Coupling` and `Agent` while
/// still letting an Agent ask "is this a fresh start?" or "which
/// predictor-corrector iteration is this?".
#[derive(Default)]
pub struct CouplingClock {
    pub time: f64,
    pub pred_corr_iteration: u32,
}

pub type SharedClock = Rc<RefCell<CouplingClock>>;

/// A dataitem registration an Agent wants applied once its buffer windows
/// have real names, recorded at construction/`initialize` time and carried
/// out by [`Agent::create_registered_dataitems`].
pub enum RegistrationKind {
    New { signature: DataItemSignature },
    Clone { parent_window_attr: String },
    Use { parent_window_attr: String },
}

pub struct DataItemRegistration {
    pub window_attr: String,
    pub kind: RegistrationKind,
}

/// A pair of handles participating in predictor-corrector convergence
/// checking: `live` is the module's working solution, `backup` is the
/// snapshot taken at the last converged step.
#[derive(Clone, Copy)]
struct PcPair {
    live: Handle,
    backup: Handle,
}

/// Wraps one physics module. Owns four sub-schedulers that are never part
/// of any coupling-level DAG: they are driven reentrantly, from inside the
/// module's own `update_solution`, via [`AgentCallbacks`].
pub struct Agent {
    name: String,
    surf_window: RefCell<String>,
    vol_window: RefCell<String>,

    registry: Rc<RefCell<dyn DataRegistry>>,
    numeric: Rc<dyn NumericLib>,
    loader: Rc<dyn ModuleLoader>,
    module: Rc<RefCell<dyn PhysicsModule>>,

    clock: SharedClock,

    ic_scheduler: RefCell<Scheduler>,
    bc_init_scheduler: RefCell<Scheduler>,
    bc_schedulers: RefCell<BTreeMap<i32, Scheduler>>,
    gm_scheduler: RefCell<Scheduler>,

    registrations: RefCell<Vec<DataItemRegistration>>,
    interpolations: RefCell<Vec<Rc<RefCell<dyn InterpolateAction>>>>,
    pc_pairs: RefCell<Vec<PcPair>>,

    old_dt: Rc<Cell<f64>>,
    current_t: Cell<f64>,
    current_dt: Cell<f64>,

    bc_init_done_this_step: Cell<bool>,
    backup_due: Cell<bool>,
    restarting: Cell<bool>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        library: &str,
        module_window: &str,
        registry: Rc<RefCell<dyn DataRegistry>>,
        numeric: Rc<dyn NumericLib>,
        loader: Rc<dyn ModuleLoader>,
        clock: SharedClock,
    ) -> CoreResult<Rc<RefCell<Agent>>> {
        let module = loader
            .load(library, module_window)
            .map_err(|_| CoreError::ModuleLibraryMissing {
                library: library.to_string(),
            })?;
        let name = name.into();
        let mut bc_schedulers = BTreeMap::new();
        // Level 0 always exists so it is present (and gets scheduled) even
        // for an Agent whose module never calls `obtain_bc` with an
        // explicit level -- the common case.
        bc_schedulers.insert(0, Scheduler::ddg(format!("{name}.bc[0]")));
        Ok(Rc::new(RefCell::new(Agent {
            ic_scheduler: RefCell::new(Scheduler::ddg(format!("{name}.ic"))),
            bc_init_scheduler: RefCell::new(Scheduler::ddg(format!("{name}.bc_init"))),
            bc_schedulers: RefCell::new(bc_schedulers),
            gm_scheduler: RefCell::new(Scheduler::ddg(format!("{name}.gm"))),
            surf_window: RefCell::new(String::new()),
            vol_window: RefCell::new(String::new()),
            registry,
            numeric,
            loader,
            module,
            clock,
            registrations: RefCell::new(Vec::new()),
            interpolations: RefCell::new(Vec::new()),
            pc_pairs: RefCell::new(Vec::new()),
            old_dt: Rc::new(Cell::new(0.0)),
            current_t: Cell::new(0.0),
            current_dt: Cell::new(0.0),
            bc_init_done_this_step: Cell::new(false),
            backup_due: Cell::new(false),
            restarting: Cell::new(false),
            name,
        })))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn surf_window(&self) -> String {
        self.surf_window.borrow().clone()
    }

    pub fn vol_window(&self) -> String {
        self.vol_window.borrow().clone()
    }

    pub fn old_dt_cell(&self) -> Rc<Cell<f64>> {
        self.old_dt.clone()
    }

    /// A BC sub-scheduler for a given level, created lazily on first use.
    /// Level `0` always exists from construction. Any other level must be
    /// populated with its actions before `Coupling::schedule()` runs: that
    /// is the point at which an Agent schedules every BC sub-scheduler it
    /// currently knows about, and a level created afterwards would be run
    /// without ever having been scheduled.
    pub fn bc_scheduler_for_level(&self, level: i32) -> std::cell::RefMut<'_, Scheduler> {
        let mut map = self.bc_schedulers.borrow_mut();
        map.entry(level)
            .or_insert_with(|| Scheduler::ddg(format!("{}.bc[{level}]", self.name)));
        std::cell::RefMut::map(map, |m| m.get_mut(&level).unwrap())
    }

    pub fn ic_scheduler_mut(&self) -> std::cell::RefMut<'_, Scheduler> {
        self.ic_scheduler.borrow_mut()
    }

    pub fn bc_init_scheduler_mut(&self) -> std::cell::RefMut<'_, Scheduler> {
        self.bc_init_scheduler.borrow_mut()
    }

    pub fn gm_scheduler_mut(&self) -> std::cell::RefMut<'_, Scheduler> {
        self.gm_scheduler.borrow_mut()
    }

    pub fn register_new_dataitem(&self, window_attr: impl Into<String>, signature: DataItemSignature) {
        self.registrations.borrow_mut().push(DataItemRegistration {
            window_attr: window_attr.into(),
            kind: RegistrationKind::New { signature },
        });
    }

    pub fn register_clone_dataitem(
        &self,
        window_attr: impl Into<String>,
        parent_window_attr: impl Into<String>,
    ) {
        self.registrations.borrow_mut().push(DataItemRegistration {
            window_attr: window_attr.into(),
            kind: RegistrationKind::Clone {
                parent_window_attr: parent_window_attr.into(),
            },
        });
    }

    pub fn register_use_dataitem(
        &self,
        window_attr: impl Into<String>,
        parent_window_attr: impl Into<String>,
    ) {
        self.registrations.borrow_mut().push(DataItemRegistration {
            window_attr: window_attr.into(),
            kind: RegistrationKind::Use {
                parent_window_attr: parent_window_attr.into(),
            },
        });
    }

    pub fn register_interpolation(&self, action: Rc<RefCell<dyn InterpolateAction>>) {
        self.interpolations.borrow_mut().push(action);
    }

    pub fn register_pc_pair(&self, live: Handle, backup: Handle) {
        self.pc_pairs.borrow_mut().push(PcPair { live, backup });
    }

    /// Apply every deferred registration now that the buffer windows have
    /// real names, failing on the first incompatible redefinition.
    pub fn create_registered_dataitems(&self) -> CoreResult<()> {
        let mut reg = self.registry.borrow_mut();
        for item in self.registrations.borrow().iter() {
            match &item.kind {
                RegistrationKind::New { signature } => {
                    reg.new_dataitem(&item.window_attr, signature.clone())
                        .map_err(|(window, attr)| CoreError::IncompatibleRedefinition { window, attr })?;
                }
                RegistrationKind::Clone { parent_window_attr } => {
                    reg.clone_dataitem(&item.window_attr, parent_window_attr);
                }
                RegistrationKind::Use { parent_window_attr } => {
                    reg.use_dataitem(&item.window_attr, parent_window_attr);
                }
            }
        }
        Ok(())
    }

    pub fn set_restarting(&self, restarting: bool) {
        self.restarting.set(restarting);
    }

    /// Exact `time == 0.0` by design, not an epsilon compare: see
    /// `DESIGN.md` for why.
    pub fn is_fresh_start(&self) -> bool {
        self.clock.borrow().time == 0.0
    }

    pub fn pc_iteration(&self) -> u32 {
        self.clock.borrow().pred_corr_iteration
    }

    /// Called by the owning Coupling at the start of a predictor-corrector
    /// sub-iteration after the first: clears the bc-init-done flag so the
    /// next `obtain_bc` call refreshes boundary conditions for this
    /// sub-iteration instead of reusing the previous one's.
    pub fn init_convergence(&self, _i: u32) {
        self.bc_init_done_this_step.set(false);
    }

    /// Called by the owning Coupling at the top of every macro-step, before
    /// the runtime scheduler runs, so the next `obtain_bc` call knows to
    /// re-run the bc-init pass.
    pub fn reset_step(&self) {
        self.bc_init_done_this_step.set(false);
    }

    /// Mark that the next bc-init pass should also snapshot all registered
    /// interpolations (called by the Coupling once a predictor-corrector
    /// loop converges).
    pub fn request_backup(&self) {
        self.backup_due.set(true);
    }

    pub fn initialize(&self) -> CoreResult<()> {
        self.module.borrow_mut().initialize(self)?;
        self.create_registered_dataitems()?;
        {
            let mut reg = self.registry.borrow_mut();
            reg.window_init_done(&self.surf_window.borrow());
            reg.window_init_done(&self.vol_window.borrow());
        }

        self.ic_scheduler.borrow_mut().schedule()?;
        self.bc_init_scheduler.borrow_mut().schedule()?;
        for s in self.bc_schedulers.borrow_mut().values_mut() {
            s.schedule()?;
        }
        self.gm_scheduler.borrow_mut().schedule()?;
        Ok(())
    }

    pub fn init_time(&self, t: Duration) -> CoreResult<()> {
        self.ic_scheduler.borrow_mut().init_actions(t)?;
        self.ic_scheduler.borrow_mut().run_actions(t, Duration::from_seconds(0.0))?;
        self.bc_init_scheduler.borrow_mut().init_actions(t)?;
        for s in self.bc_schedulers.borrow_mut().values_mut() {
            s.init_actions(t)?;
        }
        self.gm_scheduler.borrow_mut().init_actions(t)?;
        Ok(())
    }

    pub fn run(&self, t: Duration, dt: Duration, alpha: f64) -> CoreResult<()> {
        self.current_t.set(t.to_seconds());
        self.current_dt.set(dt.to_seconds());
        self.run_bc_init_once()?;
        self.module
            .borrow_mut()
            .update_solution(t, dt, alpha, self)?;
        self.old_dt.set(dt.to_seconds());
        Ok(())
    }

    pub fn finalize(&self) -> CoreResult<()> {
        self.ic_scheduler.borrow_mut().finalize_actions()?;
        self.bc_init_scheduler.borrow_mut().finalize_actions()?;
        for s in self.bc_schedulers.borrow_mut().values_mut() {
            s.finalize_actions()?;
        }
        self.gm_scheduler.borrow_mut().finalize_actions()?;

        if !self.restarting.get() {
            self.module.borrow_mut().finalize()?;
            let mut reg = self.registry.borrow_mut();
            reg.delete_window(&self.surf_window.borrow());
            reg.delete_window(&self.vol_window.borrow());
        }
        Ok(())
    }

    pub fn max_timestep(&self, t: Duration, dt: Duration) -> Duration {
        self.module.borrow_mut().max_timestep(t, dt)
    }

    /// Forwards to the module's `input` hook. No-op unless the module
    /// overrides it.
    pub fn input(&self, t: Duration) -> CoreResult<()> {
        self.module.borrow_mut().input(t)
    }

    /// Forwards to the module's `output_restart_files` hook. No-op unless
    /// the module overrides it.
    pub fn output_restart_files(&self, t: Duration) -> CoreResult<()> {
        self.module.borrow_mut().output_restart_files(t)
    }

    /// Forwards to the module's `output_visualization_files` hook. No-op
    /// unless the module overrides it.
    pub fn output_visualization_files(&self, t: Duration) -> CoreResult<()> {
        self.module.borrow_mut().output_visualization_files(t)
    }

    pub fn store_solutions(&self, converged: bool) -> CoreResult<()> {
        let mut reg = self.registry.borrow_mut();
        for pair in self.pc_pairs.borrow().iter() {
            if converged {
                self.numeric.copy(&mut *reg, pair.live, pair.backup)?;
            } else {
                self.numeric.copy(&mut *reg, pair.backup, pair.live)?;
            }
        }
        Ok(())
    }

    /// `true` if every registered predictor-corrector pair's relative
    /// change has fallen below `tol`.
    pub fn check_convergence(&self, tol: f64) -> CoreResult<bool> {
        let reg = self.registry.borrow();
        for pair in self.pc_pairs.borrow().iter() {
            let ratio = self.numeric.relative_diff_norm(&*reg, pair.live, pair.backup)?;
            if ratio >= tol {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run_bc_init_once(&self) -> CoreResult<()> {
        if self.bc_init_done_this_step.get() {
            return Ok(());
        }
        let t = Duration::from_seconds(self.current_t.get());
        let dt = Duration::from_seconds(self.current_dt.get());
        self.bc_init_scheduler.borrow_mut().run_actions(t, dt)?;
        if self.backup_due.get() {
            for ip in self.interpolations.borrow().iter() {
                ip.borrow_mut().backup()?;
            }
            self.backup_due.set(false);
        }
        self.bc_init_done_this_step.set(true);
        Ok(())
    }

    /// Roll every registered interpolation back to its last snapshot, for
    /// when the predictor-corrector loop fails to converge.
    pub fn restore_interpolations(&self) -> CoreResult<()> {
        for ip in self.interpolations.borrow().iter() {
            ip.borrow_mut().restore()?;
        }
        Ok(())
    }
}

impl ModuleInit for Agent {
    fn init_callback(&self, surf_window: &str, vol_window: &str, _options: Option<&str>) -> CoreResult<()> {
        *self.surf_window.borrow_mut() = surf_window.to_string();
        *self.vol_window.borrow_mut() = vol_window.to_string();
        Ok(())
    }
}

impl AgentCallbacks for Agent {
    fn obtain_bc(&self, alpha: f64, level: Option<i32>) -> CoreResult<()> {
        self.run_bc_init_once()?;
        let t = Duration::from_seconds(self.current_t.get());
        let dt = Duration::from_seconds(self.current_dt.get());
        let level = level.unwrap_or(0);
        let mut map = self.bc_schedulers.borrow_mut();
        let sched = map
            .entry(level)
            .or_insert_with(|| Scheduler::ddg(format!("{}.bc[{level}]", self.name)));
        sched.set_alpha(alpha);
        sched.run_actions(t, dt)
    }

    fn obtain_gm(&self, alpha: f64) -> CoreResult<()> {
        let t = Duration::from_seconds(self.current_t.get());
        let dt = Duration::from_seconds(self.current_dt.get());
        let mut sched = self.gm_scheduler.borrow_mut();
        sched.set_alpha(alpha);
        sched.run_actions(t, dt)
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.loader.unload(self.module.clone());
    }
}

/// The Agent's "main action": the handle registered into the owning
/// Coupling's runtime scheduler. Its port list expresses genuine
/// agent-to-agent coupling dependencies; boundary-condition and grid-motion
/// refresh are handled reentrantly through [`AgentCallbacks`] instead of
/// the DAG, so most Agents pass an empty port list here.
pub struct PhysicsAction {
    name: String,
    ports: Vec<Port>,
    agent: Rc<RefCell<Agent>>,
}

impl PhysicsAction {
    pub fn new(name: impl Into<String>, ports: Vec<Port>, agent: Rc<RefCell<Agent>>) -> Self {
        PhysicsAction {
            name: name.into(),
            ports,
            agent,
        }
    }

    pub fn agent(&self) -> Rc<RefCell<Agent>> {
        self.agent.clone()
    }
}

impl Action for PhysicsAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn init(&mut self, t: Duration) -> CoreResult<()> {
        self.agent.borrow().init_time(t)
    }

    fn run(&mut self, t: Duration, dt: Duration, alpha: f64) -> CoreResult<()> {
        self.agent.borrow().run(t, dt, alpha)
    }

    fn finalize(&mut self) -> CoreResult<()> {
        self.agent.borrow().finalize()
    }
}

pub fn physics_action_handle(action: PhysicsAction) -> ActionHandle {
    Rc::new(RefCell::new(action))
}

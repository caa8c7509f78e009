//! `Action`: the unit of work a `Scheduler` orders and drives. An Action
//! declares a fixed list of named, indexed ports at registration time, then
//! goes through `init -> run* -> finalize`.

use crate::error::CoreResult;
use crate::time::Duration;

/// Whether a port is read (`In`), written (`Out`), or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// One named, indexed port on an Action. `attr` plus `index` together
/// identify a slot, the way an `(attribute name, array index)` pair
/// addresses a dataitem list entry; most actions have a handful of these
/// (hence `index` rather than a richer key).
#[derive(Debug, Clone)]
pub struct Port {
    pub attr: String,
    pub index: usize,
    pub direction: Direction,
}

impl Port {
    pub fn new(attr: impl Into<String>, index: usize, direction: Direction) -> Self {
        Port {
            attr: attr.into(),
            index,
            direction,
        }
    }

    pub fn input(attr: impl Into<String>, index: usize) -> Self {
        Port::new(attr, index, Direction::In)
    }

    pub fn output(attr: impl Into<String>, index: usize) -> Self {
        Port::new(attr, index, Direction::Out)
    }
}

/// Registrar a `Scheduler` exposes to `Action::declare`. Kept as a trait
/// (rather than a concrete `&mut Scheduler` parameter) so `declare`'s
/// default implementation doesn't need to know about `Scheduler` at all --
/// only about "something I can tell my ports to".
pub trait PortRegistrar {
    fn reads(&mut self, action_name: &str, attr: &str, index: usize) -> CoreResult<()>;
    fn writes(&mut self, action_name: &str, attr: &str, index: usize) -> CoreResult<()>;
}

/// The unit of schedulable work. Every concrete action (`PhysicsAction`,
/// the `InterpolateAction` family, `SchedulerAction`) implements this.
pub trait Action {
    /// A name unique within whichever `Scheduler` holds this action, used
    /// for diagnostics and for `declare`'s registrar lookups.
    fn name(&self) -> &str;

    /// The fixed port list this action exposes. Queried once, at
    /// `Scheduler::add_action` time.
    fn ports(&self) -> &[Port];

    /// Tell a scheduler about this action's ports. The default walks
    /// `ports()` and calls `reads`/`writes` accordingly; an action with more
    /// exotic port semantics (none currently need this) may override it.
    fn declare(&self, registrar: &mut dyn PortRegistrar) -> CoreResult<()> {
        for p in self.ports() {
            match p.direction {
                Direction::In => registrar.reads(self.name(), &p.attr, p.index)?,
                Direction::Out => registrar.writes(self.name(), &p.attr, p.index)?,
                Direction::InOut => {
                    registrar.reads(self.name(), &p.attr, p.index)?;
                    registrar.writes(self.name(), &p.attr, p.index)?;
                }
            }
        }
        Ok(())
    }

    /// Called once per owning scheduler's `schedule()`. An action that owns
    /// a nested scheduler (`SchedulerAction`) overrides this to schedule it;
    /// every other action is a no-op here.
    fn schedule(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Called once per owning scheduler's `init_actions(t)`.
    fn init(&mut self, _t: Duration) -> CoreResult<()> {
        Ok(())
    }

    /// Called once per owning scheduler's `run_actions(t, dt)`, with the
    /// scheduler's current predictor-corrector `alpha`.
    fn run(&mut self, _t: Duration, _dt: Duration, _alpha: f64) -> CoreResult<()> {
        Ok(())
    }

    /// Called once per owning scheduler's `finalize_actions()`.
    fn finalize(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// An Action that owns a nested [`crate::scheduler::Scheduler`] and forwards
/// lifecycle calls to it. Its own port list is supplied explicitly at
/// construction -- it is not derived from the inner scheduler's unresolved
/// ports.
pub struct SchedulerAction {
    name: String,
    ports: Vec<Port>,
    inner: crate::scheduler::Scheduler,
}

impl SchedulerAction {
    pub fn new(
        name: impl Into<String>,
        ports: Vec<Port>,
        inner: crate::scheduler::Scheduler,
    ) -> Self {
        SchedulerAction {
            name: name.into(),
            ports,
            inner,
        }
    }

    pub fn inner(&self) -> &crate::scheduler::Scheduler {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut crate::scheduler::Scheduler {
        &mut self.inner
    }
}

impl Action for SchedulerAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn schedule(&mut self) -> CoreResult<()> {
        self.inner.schedule()
    }

    fn init(&mut self, t: Duration) -> CoreResult<()> {
        self.inner.init_actions(t)
    }

    // The nested scheduler does not inherit the parent's alpha; it runs
    // with whatever alpha it was last explicitly given (default -1.0,
    // meaning "not predictor-corrector aware").
    fn run(&mut self, t: Duration, dt: Duration, _alpha: f64) -> CoreResult<()> {
        self.inner.run_actions(t, dt)
    }

    fn finalize(&mut self) -> CoreResult<()> {
        self.inner.finalize_actions()
    }
}

//! `Scheduler`: orders a flat set of registered [`Action`]s into a run
//! sequence, then drives their `init`/`run`/`finalize` lifecycle in that
//! order.
//!
//! Two variants share one struct (closed set, per the Design Notes):
//!
//! - `Ddg` builds a data-dependency graph from the ports each action
//!   declared and topologically sorts it.
//! - `User` ignores ports entirely and synthesizes a trivial linear chain in
//!   registration order, for callers who just want "run these, in this
//!   order" without wiring up port names.

use std::cell::RefCell;
use std::rc::Rc;

use crate::action::{Action, PortRegistrar};
use crate::error::{CoreError, CoreResult};
use crate::time::Duration;

/// Shared handle to an action, as held by a [`Scheduler`]. Actions may be
/// registered into more than one scheduler (the Agent's `PhysicsAction` is
/// both the agent's own main action and an entry in the Coupling's runtime
/// scheduler), hence `Rc<RefCell<dyn Action>>` rather than sole ownership.
pub type ActionHandle = Rc<RefCell<dyn Action>>;

/// Wrap a concrete action for registration into a [`Scheduler`].
pub fn action_handle<A: Action + 'static>(action: A) -> ActionHandle {
    Rc::new(RefCell::new(action))
}

struct ActionItem {
    handle: ActionHandle,
    name: String,
    reads: Vec<(String, usize)>,
    writes: Vec<(String, usize)>,
    read_producer: Vec<Option<usize>>,
    write_consumer: Vec<Option<usize>>,
}

impl ActionItem {
    fn new(handle: ActionHandle, name: String) -> Self {
        ActionItem {
            handle,
            name,
            reads: Vec::new(),
            writes: Vec::new(),
            read_producer: Vec::new(),
            write_consumer: Vec::new(),
        }
    }
}

/// Which ordering discipline a [`Scheduler`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Ddg,
    User,
}

/// Orders and drives a set of [`Action`]s. See the module documentation.
pub struct Scheduler {
    name: String,
    kind: SchedulerKind,
    items: Vec<ActionItem>,
    roots: Vec<usize>,
    sort: Vec<usize>,
    alpha: f64,
    scheduled: bool,
    inited: bool,
}

impl Scheduler {
    pub fn new(name: impl Into<String>, kind: SchedulerKind) -> Self {
        Scheduler {
            name: name.into(),
            kind,
            items: Vec::new(),
            roots: Vec::new(),
            sort: Vec::new(),
            alpha: -1.0,
            scheduled: false,
            inited: false,
        }
    }

    pub fn ddg(name: impl Into<String>) -> Self {
        Scheduler::new(name, SchedulerKind::Ddg)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Scheduler::new(name, SchedulerKind::User)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Names in registration order, for diagnostics.
    pub fn action_names(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.name.as_str()).collect()
    }

    /// Names in the order `run_actions` will drive them, once scheduled.
    pub fn topological_order_names(&self) -> Vec<&str> {
        self.sort.iter().map(|&i| self.items[i].name.as_str()).collect()
    }

    fn find_index(&self, action_name: &str) -> CoreResult<usize> {
        self.items
            .iter()
            .position(|it| it.name == action_name)
            .ok_or_else(|| CoreError::ActionNotRegistered {
                scheduler: self.name.clone(),
                action: action_name.to_string(),
            })
    }

    /// Register an action and immediately call its `declare`, recording the
    /// ports it reports via the `reads`/`writes` callbacks below.
    pub fn add_action(&mut self, action: ActionHandle) -> CoreResult<()> {
        let name = action.borrow().name().to_string();
        if self.items.iter().any(|it| it.name == name) {
            return Err(CoreError::DuplicateActionName {
                scheduler: self.name.clone(),
                action: name,
            });
        }
        self.items.push(ActionItem::new(action.clone(), name));
        let declared = action.borrow();
        declared.declare(self)?;
        Ok(())
    }

    /// Recursively schedule every action (nested `SchedulerAction`s
    /// schedule their own inner scheduler), then order this scheduler's
    /// actions per its `kind`.
    pub fn schedule(&mut self) -> CoreResult<()> {
        if self.scheduled {
            return Err(CoreError::AlreadyScheduled {
                scheduler: self.name.clone(),
            });
        }
        for item in &self.items {
            item.handle.borrow_mut().schedule()?;
        }
        match self.kind {
            SchedulerKind::Ddg => self.build_ddg()?,
            SchedulerKind::User => self.build_user_chain(),
        }
        self.scheduled = true;
        Ok(())
    }

    fn build_user_chain(&mut self) {
        // A trivial linear chain in registration order: actions[0] is the
        // sole root, and each later action is wired as depending on the one
        // before it, ignoring whatever ports were declared.
        self.sort = (0..self.items.len()).collect();
        self.roots = if self.items.is_empty() { vec![] } else { vec![0] };
    }

    fn build_ddg(&mut self) -> CoreResult<()> {
        let n = self.items.len();

        // Pass 1: for every IN port, find its producer(s) among all OUT
        // ports in the scheduler.
        for i in 0..n {
            let in_ports = self.items[i].reads.clone();
            for (slot, (attr, idx)) in in_ports.iter().enumerate() {
                if self.items[i].read_producer[slot].is_some() {
                    continue;
                }
                let mut candidates = Vec::new();
                for j in 0..n {
                    if let Some(out_slot) = self.items[j]
                        .writes
                        .iter()
                        .position(|(a, ix)| a == attr && ix == idx)
                    {
                        candidates.push((j, out_slot));
                    }
                }
                match candidates.as_slice() {
                    [] => {
                        return Err(CoreError::UnresolvedInput {
                            scheduler: self.name.clone(),
                            action: self.items[i].name.clone(),
                            attr: attr.clone(),
                            index: *idx,
                        });
                    }
                    [(j, out_slot)] => {
                        if let Some(existing) = self.items[*j].write_consumer[*out_slot] {
                            return Err(CoreError::DuplicateConsumer {
                                scheduler: self.name.clone(),
                                action: self.items[*j].name.clone(),
                                candidate: self.items[i].name.clone(),
                                existing: self.items[existing].name.clone(),
                            });
                        }
                        self.items[i].read_producer[slot] = Some(*j);
                        self.items[*j].write_consumer[*out_slot] = Some(i);
                    }
                    multiple => {
                        let (first_j, _) = multiple[0];
                        let (second_j, _) = multiple[1];
                        return Err(CoreError::DuplicateProducer {
                            scheduler: self.name.clone(),
                            action: self.items[i].name.clone(),
                            attr: attr.clone(),
                            index: *idx,
                            candidate: self.items[second_j].name.clone(),
                            existing: self.items[first_j].name.clone(),
                        });
                    }
                }
            }
        }

        // Pass 2: any OUT port still unbound must find its consumer.
        for j in 0..n {
            let out_ports = self.items[j].writes.clone();
            for (slot, (attr, idx)) in out_ports.iter().enumerate() {
                if self.items[j].write_consumer[slot].is_some() {
                    continue;
                }
                let mut candidates = Vec::new();
                for i in 0..n {
                    if let Some(in_slot) = self.items[i]
                        .reads
                        .iter()
                        .position(|(a, ix)| a == attr && ix == idx)
                    {
                        candidates.push((i, in_slot));
                    }
                }
                match candidates.as_slice() {
                    [] => {
                        return Err(CoreError::UnresolvedOutput {
                            scheduler: self.name.clone(),
                            action: self.items[j].name.clone(),
                            attr: attr.clone(),
                            index: *idx,
                        });
                    }
                    [(i, in_slot)] => {
                        if let Some(existing) = self.items[*i].read_producer[*in_slot] {
                            return Err(CoreError::DuplicateProducer {
                                scheduler: self.name.clone(),
                                action: self.items[*i].name.clone(),
                                attr: attr.clone(),
                                index: *idx,
                                candidate: self.items[j].name.clone(),
                                existing: self.items[existing].name.clone(),
                            });
                        }
                        self.items[j].write_consumer[slot] = Some(*i);
                        self.items[*i].read_producer[*in_slot] = Some(j);
                    }
                    multiple => {
                        let (first_i, _) = multiple[0];
                        let (second_i, _) = multiple[1];
                        return Err(CoreError::DuplicateConsumer {
                            scheduler: self.name.clone(),
                            action: self.items[j].name.clone(),
                            candidate: self.items[second_i].name.clone(),
                            existing: self.items[first_i].name.clone(),
                        });
                    }
                }
            }
        }

        // Pass 3: every port must now be linked.
        for i in 0..n {
            for (slot, (attr, idx)) in self.items[i].reads.clone().iter().enumerate() {
                if self.items[i].read_producer[slot].is_none() {
                    return Err(CoreError::DanglingPort {
                        scheduler: self.name.clone(),
                        action: self.items[i].name.clone(),
                        attr: attr.clone(),
                        index: *idx,
                    });
                }
            }
            for (slot, (attr, idx)) in self.items[i].writes.clone().iter().enumerate() {
                if self.items[i].write_consumer[slot].is_none() {
                    return Err(CoreError::DanglingPort {
                        scheduler: self.name.clone(),
                        action: self.items[i].name.clone(),
                        attr: attr.clone(),
                        index: *idx,
                    });
                }
            }
        }

        self.topological_sort()
    }

    fn topological_sort(&mut self) -> CoreResult<()> {
        let n = self.items.len();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        loop {
            let mut progressed = false;
            for i in 0..n {
                if placed[i] {
                    continue;
                }
                let ready = self.items[i]
                    .read_producer
                    .iter()
                    .all(|p| p.map(|j| placed[j]).unwrap_or(false));
                if ready {
                    placed[i] = true;
                    order.push(i);
                    progressed = true;
                }
            }
            if order.len() == n {
                break;
            }
            if !progressed {
                return Err(CoreError::CycleDetected {
                    scheduler: self.name.clone(),
                    remaining: n - order.len(),
                });
            }
        }

        self.roots = (0..n).filter(|&i| self.items[i].reads.is_empty()).collect();
        self.sort = order;
        Ok(())
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Mark this scheduler as needing `init_actions` to run again (a
    /// restart discards whatever "already inited" state was cached).
    pub fn restarting(&mut self) {
        self.inited = false;
    }

    pub fn init_actions(&mut self, t: Duration) -> CoreResult<()> {
        if !self.scheduled {
            return Err(CoreError::NotScheduled {
                scheduler: self.name.clone(),
            });
        }
        if self.inited {
            return Ok(());
        }
        for &i in &self.sort {
            self.items[i].handle.borrow_mut().init(t)?;
        }
        self.inited = true;
        Ok(())
    }

    pub fn run_actions(&mut self, t: Duration, dt: Duration) -> CoreResult<()> {
        if !self.scheduled {
            return Err(CoreError::NotScheduled {
                scheduler: self.name.clone(),
            });
        }
        let alpha = self.alpha;
        for &i in &self.sort {
            self.items[i].handle.borrow_mut().run(t, dt, alpha)?;
        }
        Ok(())
    }

    pub fn finalize_actions(&mut self) -> CoreResult<()> {
        if !self.scheduled {
            return Err(CoreError::NotScheduled {
                scheduler: self.name.clone(),
            });
        }
        for &i in self.sort.iter().rev() {
            self.items[i].handle.borrow_mut().finalize()?;
        }
        Ok(())
    }
}

impl PortRegistrar for Scheduler {
    fn reads(&mut self, action_name: &str, attr: &str, index: usize) -> CoreResult<()> {
        let i = self.find_index(action_name)?;
        self.items[i].reads.push((attr.to_string(), index));
        self.items[i].read_producer.push(None);
        Ok(())
    }

    fn writes(&mut self, action_name: &str, attr: &str, index: usize) -> CoreResult<()> {
        let i = self.find_index(action_name)?;
        self.items[i].writes.push((attr.to_string(), index));
        self.items[i].write_consumer.push(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Port;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    struct Recorder {
        name: String,
        ports: Vec<Port>,
        log: StdRc<StdRefCell<Vec<String>>>,
    }

    impl Action for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn ports(&self) -> &[Port] {
            &self.ports
        }
        fn run(&mut self, _t: Duration, _dt: Duration, _alpha: f64) -> CoreResult<()> {
            self.log.borrow_mut().push(self.name.clone());
            Ok(())
        }
    }

    fn mk(name: &str, ports: Vec<Port>, log: &StdRc<StdRefCell<Vec<String>>>) -> ActionHandle {
        action_handle(Recorder {
            name: name.to_string(),
            ports,
            log: log.clone(),
        })
    }

    #[test]
    fn linear_chain_runs_in_dependency_order() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk("b", vec![Port::input("x", 0), Port::output("y", 0)], &log))?;
        s.add_action(mk("a", vec![Port::output("x", 0)], &log))?;
        s.add_action(mk("c", vec![Port::input("y", 0)], &log))?;
        s.schedule()?;
        s.init_actions(Duration::from_seconds(0.0))?;
        s.run_actions(Duration::from_seconds(0.0), Duration::from_seconds(1.0))?;
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn diamond_dag_runs_both_middle_actions_before_the_sink() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk("src", vec![Port::output("x", 0)], &log))?;
        s.add_action(mk(
            "left",
            vec![Port::input("x", 0), Port::output("l", 0)],
            &log,
        ))?;
        s.add_action(mk(
            "right",
            vec![Port::input("x", 0), Port::output("r", 0)],
            &log,
        ))?;
        s.add_action(mk(
            "sink",
            vec![Port::input("l", 0), Port::input("r", 0)],
            &log,
        ))?;
        s.schedule()?;
        s.init_actions(Duration::from_seconds(0.0))?;
        s.run_actions(Duration::from_seconds(0.0), Duration::from_seconds(1.0))?;
        let order = log.borrow().clone();
        assert_eq!(order[0], "src");
        assert_eq!(order[3], "sink");
        assert!(order[1..3].contains(&"left".to_string()));
        assert!(order[1..3].contains(&"right".to_string()));
        Ok(())
    }

    #[test]
    fn cycle_is_detected() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk(
            "a",
            vec![Port::input("y", 0), Port::output("x", 0)],
            &log,
        ))?;
        s.add_action(mk(
            "b",
            vec![Port::input("x", 0), Port::output("y", 0)],
            &log,
        ))?;
        let err = s.schedule().unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected { .. }));
        Ok(())
    }

    #[test]
    fn unresolved_input_is_reported() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk("a", vec![Port::input("missing", 0)], &log))?;
        let err = s.schedule().unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedInput { .. }));
        Ok(())
    }

    #[test]
    fn duplicate_producer_names_the_input_attribute_not_the_output() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk("p1", vec![Port::output("x", 0)], &log))?;
        s.add_action(mk("p2", vec![Port::output("x", 0)], &log))?;
        s.add_action(mk("c", vec![Port::input("x", 0)], &log))?;
        let err = s.schedule().unwrap_err();
        match err {
            CoreError::DuplicateProducer { attr, action, .. } => {
                assert_eq!(attr, "x");
                assert_eq!(action, "c");
            }
            other => panic!("expected DuplicateProducer, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn second_schedule_call_is_rejected() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk("a", vec![], &log))?;
        s.schedule()?;
        assert!(matches!(
            s.schedule().unwrap_err(),
            CoreError::AlreadyScheduled { .. }
        ));
        Ok(())
    }

    #[test]
    fn init_actions_is_idempotent() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::ddg("s");
        s.add_action(mk("a", vec![], &log))?;
        s.schedule()?;
        s.init_actions(Duration::from_seconds(0.0))?;
        s.init_actions(Duration::from_seconds(0.0))?;
        Ok(())
    }

    #[test]
    fn user_scheduler_ignores_ports_and_runs_in_registration_order() -> CoreResult<()> {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let mut s = Scheduler::user("s");
        s.add_action(mk("first", vec![Port::input("anything", 0)], &log))?;
        s.add_action(mk("second", vec![Port::input("else", 1)], &log))?;
        s.schedule()?;
        s.init_actions(Duration::from_seconds(0.0))?;
        s.run_actions(Duration::from_seconds(0.0), Duration::from_seconds(1.0))?;
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        Ok(())
    }
}

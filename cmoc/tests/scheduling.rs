//! Integration tests for the scheduler's seed scenarios: a linear chain, a
//! diamond DAG, cycle detection, and disjoint components all ordering
//! independently within one scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use cmoc::action::{Action, Port};
use cmoc::error::{CoreError, CoreResult};
use cmoc::scheduler::{action_handle, Scheduler};
use cmoc::time::Duration;

struct Recorder {
    name: String,
    ports: Vec<Port>,
    log: Rc<RefCell<Vec<String>>>,
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

fn recorder(name: &str, ports: Vec<Port>, log: &Rc<RefCell<Vec<String>>>) -> cmoc::scheduler::ActionHandle {
    action_handle(Recorder {
        name: name.to_string(),
        ports,
        log: log.clone(),
    })
}

#[test]
fn disjoint_components_each_order_independently() -> CoreResult<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut s = Scheduler::ddg("disjoint");

    // component 1: p1 -> c1
    s.add_action(recorder("p1", vec![Port::output("a", 0)], &log))?;
    s.add_action(recorder("c1", vec![Port::input("a", 0)], &log))?;
    // component 2: p2 -> c2, entirely unrelated attribute names
    s.add_action(recorder("p2", vec![Port::output("b", 0)], &log))?;
    s.add_action(recorder("c2", vec![Port::input("b", 0)], &log))?;

    s.schedule()?;
    s.init_actions(Duration::from_seconds(0.0))?;
    s.run_actions(Duration::from_seconds(0.0), Duration::from_seconds(1.0))?;

    let order = log.borrow().clone();
    let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
    assert!(pos("p1") < pos("c1"));
    assert!(pos("p2") < pos("c2"));
    Ok(())
}

#[test]
fn schedule_is_rejected_the_second_time() -> CoreResult<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut s = Scheduler::ddg("s");
    s.add_action(recorder("only", vec![], &log))?;
    s.schedule()?;
    match s.schedule() {
        Err(CoreError::AlreadyScheduled { .. }) => Ok(()),
        other => panic!("expected AlreadyScheduled, got {other:?}"),
    }
}

#[test]
fn init_actions_before_schedule_is_rejected() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut s = Scheduler::ddg("s");
    s.add_action(recorder("only", vec![], &log)).unwrap();
    let err = s.init_actions(Duration::from_seconds(0.0)).unwrap_err();
    assert!(matches!(err, CoreError::NotScheduled { .. }));
}

#[test]
fn dangling_output_port_is_reported() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut s = Scheduler::ddg("s");
    // An output nobody reads is unresolved, not silently dropped.
    s.add_action(recorder("orphan", vec![Port::output("nobody_reads_this", 0)], &log))
        .unwrap();
    let err = s.schedule().unwrap_err();
    assert!(matches!(err, CoreError::UnresolvedOutput { .. }));
}

#[test]
fn user_scheduler_runs_registration_order_regardless_of_ports() -> CoreResult<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut s = Scheduler::user("u");
    // Ports here would be nonsensical for a DDG (c before p), but User
    // ignores them entirely and just runs in registration order.
    s.add_action(recorder("c", vec![Port::input("z", 0)], &log))?;
    s.add_action(recorder("p", vec![Port::output("z", 0)], &log))?;
    s.schedule()?;
    s.init_actions(Duration::from_seconds(0.0))?;
    s.run_actions(Duration::from_seconds(0.0), Duration::from_seconds(1.0))?;
    assert_eq!(*log.borrow(), vec!["c", "p"]);
    Ok(())
}

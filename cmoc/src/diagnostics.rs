//! Diagnostic output: a textual topological trace and a GDL (Graph
//! Description Language) dump of a [`Scheduler`]'s dependency graph, for a
//! caller-supplied `io::Write`. No logging framework here; diagnostics are
//! plain text the host decides what to do with.

use std::io::{self, Write};

use crate::scheduler::Scheduler;

/// Write the scheduler's run order, one action name per line, in the order
/// `run_actions` will actually drive them.
pub fn write_topological_trace(scheduler: &Scheduler, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "# topological order for scheduler \"{}\"", scheduler.name())?;
    for name in scheduler.topological_order_names() {
        writeln!(w, "{name}")?;
    }
    Ok(())
}

/// Write a GDL graph block: one `node:` per action (in registration order)
/// and one `edge:` per consecutive pair in the topological order. This is a
/// simplified rendering next to a full per-port edge dump (one edge per
/// `(attr, index)` link); it is enough to visualize execution order with a
/// GDL viewer.
pub fn write_gdl(scheduler: &Scheduler, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "graph: {{")?;
    writeln!(w, "title: \"{}\"", scheduler.name())?;
    for name in scheduler.action_names() {
        writeln!(w, "node: {{ title: \"{name}\" }}")?;
    }
    let order = scheduler.topological_order_names();
    for pair in order.windows(2) {
        writeln!(
            w,
            "edge: {{ sourcename: \"{}\" targetname: \"{}\" }}",
            pair[0], pair[1]
        )?;
    }
    writeln!(w, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Port};
    use crate::error::CoreResult;
    use crate::scheduler::action_handle;
    use crate::time::Duration;

    struct NoOp {
        name: String,
        ports: Vec<Port>,
    }
    impl Action for NoOp {
        fn name(&self) -> &str {
            &self.name
        }
        fn ports(&self) -> &[Port] {
            &self.ports
        }
    }

    #[test]
    fn gdl_dump_contains_every_action_node() -> CoreResult<()> {
        let mut s = Scheduler::ddg("diag");
        s.add_action(action_handle(NoOp {
            name: "a".into(),
            ports: vec![Port::output("x", 0)],
        }))?;
        s.add_action(action_handle(NoOp {
            name: "b".into(),
            ports: vec![Port::input("x", 0)],
        }))?;
        s.schedule()?;
        s.init_actions(Duration::from_seconds(0.0))?;

        let mut buf = Vec::new();
        write_gdl(&s, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("node: { title: \"a\" }"));
        assert!(text.contains("node: { title: \"b\" }"));
        assert!(text.contains("sourcename: \"a\" targetname: \"b\""));
        Ok(())
    }
}

//! A small, in-process demonstration of wiring two toy physics modules
//! together through [`cmoc::coupling::Coupling`]. Neither module does real
//! physics: `Thermal` counts up a temperature field, `Structure` reads it
//! and tracks the running maximum it has ever seen. The point is the
//! plumbing (registry, agent lifecycle, restart-info persistence), not the
//! numbers.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use cmoc::agent::Agent;
use cmoc::coupling::{Coupling, CouplingConfig};
use cmoc::module::{AgentCallbacks, ModuleInit, ModuleLoader, PhysicsModule};
use cmoc::numeric::NalgebraNumericLib;
use cmoc::registry::{DataItemSignature, DataRegistry, Location, MockRegistry, ScalarType};
use cmoc::time::Duration;

struct Thermal {
    steps: u32,
}

impl PhysicsModule for Thermal {
    fn initialize(&mut self, init: &dyn ModuleInit) -> cmoc::CoreResult<()> {
        init.init_callback("thermal_surf", "thermal_vol", None)
    }

    fn update_solution(
        &mut self,
        _t: Duration,
        _dt: Duration,
        _alpha: f64,
        _callbacks: &dyn AgentCallbacks,
    ) -> cmoc::CoreResult<()> {
        self.steps += 1;
        Ok(())
    }

    fn finalize(&mut self) -> cmoc::CoreResult<()> {
        Ok(())
    }
}

struct Structure {
    peak: f64,
}

impl PhysicsModule for Structure {
    fn initialize(&mut self, init: &dyn ModuleInit) -> cmoc::CoreResult<()> {
        init.init_callback("structure_surf", "structure_vol", None)
    }

    fn update_solution(
        &mut self,
        _t: Duration,
        _dt: Duration,
        alpha: f64,
        callbacks: &dyn AgentCallbacks,
    ) -> cmoc::CoreResult<()> {
        callbacks.obtain_bc(alpha, None)?;
        Ok(())
    }

    fn finalize(&mut self) -> cmoc::CoreResult<()> {
        Ok(())
    }
}

struct InProcessLoader;

impl ModuleLoader for InProcessLoader {
    fn load(
        &self,
        library: &str,
        _window: &str,
    ) -> cmoc::CoreResult<Rc<RefCell<dyn PhysicsModule>>> {
        Ok(match library {
            "thermal" => Rc::new(RefCell::new(Thermal { steps: 0 })),
            "structure" => Rc::new(RefCell::new(Structure { peak: 0.0 })),
            other => {
                return Err(cmoc::CoreError::ModuleLibraryMissing {
                    library: other.to_string(),
                })
            }
        })
    }
}

fn main() -> Result<()> {
    let mut registry = MockRegistry::new();
    registry
        .new_dataitem(
            "thermal_vol.temperature",
            DataItemSignature {
                location: Location::Node,
                scalar: ScalarType::Double,
                ncomp: 1,
                unit: Some("K".to_string()),
            },
        )
        .map_err(|(window, attr)| anyhow::anyhow!("incompatible redefinition of {window}.{attr}"))?;
    let registry: Rc<RefCell<dyn DataRegistry>> = Rc::new(RefCell::new(registry));
    let numeric: Rc<dyn cmoc::numeric::NumericLib> = Rc::new(NalgebraNumericLib);
    let loader: Rc<dyn ModuleLoader> = Rc::new(InProcessLoader);

    let mut coupling = Coupling::new("demo", 0, CouplingConfig::default());
    let clock = coupling.clock();

    let thermal = Agent::new(
        "thermal",
        "thermal",
        "thermal_vol",
        registry.clone(),
        numeric.clone(),
        loader.clone(),
        clock.clone(),
    )?;
    let structure = Agent::new(
        "structure",
        "structure",
        "structure_vol",
        registry.clone(),
        numeric.clone(),
        loader,
        clock,
    )?;

    coupling.add_agent(thermal, vec![])?;
    coupling.add_agent(structure, vec![])?;

    let dt = Duration::from_seconds(1.0);
    coupling.init(Duration::from_seconds(0.0), dt, false)?;

    let mut t = Duration::from_seconds(0.0);
    for step in 1..=3 {
        // Drive the predictor-corrector loop ourselves: `Coupling::run`
        // advances one sub-iteration at a time, and `check_convergence`
        // tells us when to stop.
        let mut i_pred_corr = 0;
        let mut converged;
        let mut next_t = t;
        loop {
            coupling.init_convergence(i_pred_corr);
            next_t = coupling.run(t, dt, i_pred_corr, 1)?;
            converged = coupling.check_convergence()?;
            if converged || i_pred_corr >= 7 {
                break;
            }
            i_pred_corr += 1;
        }
        for agent in coupling.agents() {
            agent.borrow().store_solutions(converged)?;
            if converged {
                agent.borrow().request_backup();
            } else {
                agent.borrow().restore_interpolations()?;
            }
        }
        t = next_t;

        coupling.write_restart_info(step, t)?;
        println!(
            "step {step}: t = {} ({})",
            t.to_seconds(),
            cmoc::time::time_string(t)
        );
    }

    let (last_step, last_t) = coupling.read_restart_info(t)?;
    println!("restart info: step {last_step} at t = {last_t}");

    coupling.finalize()?;
    Ok(())
}

//! End-to-end tests driving [`Coupling`] and [`Agent`] together: two
//! independent toy modules wired through a `Coupling`, a predictor-corrector
//! loop that fails to converge and rolls back, and restart-info persistence.

use std::cell::RefCell;
use std::rc::Rc;

use cmoc::agent::Agent;
use cmoc::coupling::{Coupling, CouplingConfig};
use cmoc::module::{AgentCallbacks, ModuleInit, ModuleLoader, PhysicsModule};
use cmoc::numeric::NalgebraNumericLib;
use cmoc::registry::{DataItemSignature, DataRegistry, Location, MockRegistry, ScalarType};
use cmoc::time::Duration;
use cmoc::CoreResult;

/// A module that never calls back into its Agent at all -- the degenerate
/// case a `Coupling` with entirely disjoint agents exercises.
struct Standalone {
    window: &'static str,
    ticks: u32,
}

impl PhysicsModule for Standalone {
    fn initialize(&mut self, init: &dyn ModuleInit) -> CoreResult<()> {
        init.init_callback(self.window, self.window, None)
    }

    fn update_solution(
        &mut self,
        _t: Duration,
        _dt: Duration,
        _alpha: f64,
        _callbacks: &dyn AgentCallbacks,
    ) -> CoreResult<()> {
        self.ticks += 1;
        Ok(())
    }

    fn finalize(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// A module whose convergence never settles, to exercise the
/// predictor-corrector restore path.
struct NeverConverges {
    window: &'static str,
}

impl PhysicsModule for NeverConverges {
    fn initialize(&mut self, init: &dyn ModuleInit) -> CoreResult<()> {
        init.init_callback(self.window, self.window, None)
    }

    fn update_solution(
        &mut self,
        _t: Duration,
        _dt: Duration,
        _alpha: f64,
        _callbacks: &dyn AgentCallbacks,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn finalize(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

struct Loader;

impl ModuleLoader for Loader {
    fn load(
        &self,
        library: &str,
        _window: &str,
    ) -> CoreResult<Rc<RefCell<dyn PhysicsModule>>> {
        Ok(match library {
            "standalone_a" => Rc::new(RefCell::new(Standalone {
                window: "a_vol",
                ticks: 0,
            })),
            "standalone_b" => Rc::new(RefCell::new(Standalone {
                window: "b_vol",
                ticks: 0,
            })),
            "never_converges" => Rc::new(RefCell::new(NeverConverges { window: "c_vol" })),
            other => {
                return Err(cmoc::CoreError::ModuleLibraryMissing {
                    library: other.to_string(),
                })
            }
        })
    }
}

fn fresh_registry() -> Rc<RefCell<dyn DataRegistry>> {
    Rc::new(RefCell::new(MockRegistry::new()))
}

#[test]
fn disjoint_agents_both_run_every_macro_step() -> CoreResult<()> {
    let registry = fresh_registry();
    let numeric: Rc<dyn cmoc::numeric::NumericLib> = Rc::new(NalgebraNumericLib);
    let loader: Rc<dyn ModuleLoader> = Rc::new(Loader);

    let mut coupling = Coupling::new("disjoint", 0, CouplingConfig::default());
    let clock = coupling.clock();

    let a = Agent::new(
        "a",
        "standalone_a",
        "a_vol",
        registry.clone(),
        numeric.clone(),
        loader.clone(),
        clock.clone(),
    )?;
    let b = Agent::new(
        "b",
        "standalone_b",
        "b_vol",
        registry.clone(),
        numeric.clone(),
        loader,
        clock,
    )?;

    coupling.add_agent(a.clone(), vec![])?;
    coupling.add_agent(b.clone(), vec![])?;
    coupling.init(Duration::from_seconds(0.0), Duration::from_seconds(1.0), false)?;

    let mut t = Duration::from_seconds(0.0);
    for _step in 1..=3 {
        coupling.init_convergence(0);
        t = coupling.run(t, Duration::from_seconds(1.0), 0, 1)?;
        let converged = coupling.check_convergence()?;
        assert!(converged, "single-iteration budget always reports converged");
        for agent in coupling.agents() {
            agent.borrow().store_solutions(converged)?;
            agent.borrow().request_backup();
        }
    }

    coupling.finalize()?;
    Ok(())
}

#[test]
fn non_convergence_restores_interpolations_and_reports_false() -> CoreResult<()> {
    let registry = fresh_registry();
    let numeric: Rc<dyn cmoc::numeric::NumericLib> = Rc::new(NalgebraNumericLib);
    let loader: Rc<dyn ModuleLoader> = Rc::new(Loader);

    let config = CouplingConfig {
        max_pred_corr_iterations: 3,
        convergence_tolerance: 1e-9,
        ..CouplingConfig::default()
    };
    let mut coupling = Coupling::new("pc", 0, config);
    let clock = coupling.clock();

    let agent = Agent::new(
        "c",
        "never_converges",
        "c_vol",
        registry.clone(),
        numeric,
        loader,
        clock,
    )?;

    {
        let agent_ref = agent.borrow();
        registry
            .borrow_mut()
            .new_dataitem(
                "c_vol.live",
                DataItemSignature {
                    location: Location::Node,
                    scalar: ScalarType::Double,
                    ncomp: 1,
                    unit: None,
                },
            )
            .expect("fresh registration cannot conflict");
        registry
            .borrow_mut()
            .clone_dataitem("c_vol.live_backup", "c_vol.live");
        let live_handle = registry.borrow().resolve_const("c_vol.live");
        let backup_handle = registry.borrow().resolve_const("c_vol.live_backup");
        agent_ref.register_pc_pair(live_handle, backup_handle);
    }

    coupling.add_agent(agent.clone(), vec![])?;
    let t = Duration::from_seconds(0.0);
    let dt = Duration::from_seconds(1.0);
    coupling.init(t, dt, false)?;

    // Drift the live value away from its backup every iteration so
    // relative_diff_norm never drops below tolerance.
    registry.borrow_mut().set_array("c_vol.live", vec![1.0]);
    registry
        .borrow_mut()
        .set_array("c_vol.live_backup", vec![0.0]);

    let t = Duration::from_seconds(1.0);
    let mut converged = false;
    for i in 0..3u32 {
        coupling.init_convergence(i);
        coupling.run(t, dt, i, 1)?;
        converged = coupling.check_convergence()?;
        if converged {
            break;
        }
    }
    assert!(!converged, "live and backup never agree, so convergence must fail");

    for agent in coupling.agents() {
        agent.borrow().store_solutions(converged)?;
        if converged {
            agent.borrow().request_backup();
        } else {
            agent.borrow().restore_interpolations()?;
        }
    }

    Ok(())
}

#[test]
fn restart_info_round_trips_through_a_fresh_start_and_an_append() -> CoreResult<()> {
    let dir = std::env::temp_dir().join(format!(
        "cmoc_restart_test_{:?}",
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("restart_info.txt");
    let _ = std::fs::remove_file(&path);

    let config = CouplingConfig {
        restart_info_path: path.clone(),
        ..CouplingConfig::default()
    };
    let coupling = Coupling::new("restart", 0, config);

    coupling.write_restart_info(0, Duration::from_seconds(0.0))?;
    coupling.write_restart_info(1, Duration::from_seconds(1.0))?;
    coupling.write_restart_info(2, Duration::from_seconds(2.0))?;

    let (step, t) = coupling.read_restart_info(Duration::from_seconds(2.0))?;
    assert_eq!(step, 2);
    assert_eq!(t, 2.0);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 3, "fresh start truncates, later steps append");

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_dir(&dir);
    Ok(())
}

#[test]
fn restart_info_missing_file_is_an_error_unless_t_is_zero() {
    let dir = std::env::temp_dir().join(format!(
        "cmoc_restart_missing_{:?}",
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("does_not_exist.txt");
    let _ = std::fs::remove_file(&path);

    let config = CouplingConfig {
        restart_info_path: path.clone(),
        ..CouplingConfig::default()
    };
    let coupling = Coupling::new("restart", 0, config);

    assert!(coupling.read_restart_info(Duration::from_seconds(0.0)).is_ok());
    assert!(coupling.read_restart_info(Duration::from_seconds(5.0)).is_err());

    let _ = std::fs::remove_dir(&dir);
}

//! # cmoc
//!
//! A coupled multiphysics orchestration core: a data-dependency scheduler
//! and agent/coupling runtime for composing independently-developed physics
//! solvers into a single time-stepping simulation.
//!
//! CMOC does not solve any physics, own any mesh, or read/write any
//! simulation file format. It provides the four things every coupled
//! multiphysics code needs and that are otherwise rewritten in every such
//! code from scratch:
//!
//! - a [`scheduler::Scheduler`] that either topologically sorts a set of
//!   [`action::Action`]s from the ports they declare (`Ddg`), or just runs
//!   them in registration order (`User`);
//! - the [`interpolate`] family of actions, for handing a coupled solver a
//!   boundary condition or grid position at a sub-step time neither of its
//!   two known snapshots was actually computed at;
//! - an [`agent::Agent`] that wraps one physics module behind a small,
//!   reentrant callback ABI ([`module::AgentCallbacks`]/[`module::ModuleInit`]);
//! - a [`coupling::Coupling`] driver that owns a set of Agents, runs a
//!   predictor-corrector loop over them, and persists a restart-info file.
//!
//! Everything the core does *not* own -- the actual field data, the physics,
//! MPI, and file I/O -- crosses a small set of traits a host implements:
//! [`registry::DataRegistry`], [`numeric::NumericLib`], [`module::PhysicsModule`]
//! and [`module::ModuleLoader`].
//!
//! ## A minimal two-action schedule
//!
//! ```
//! use cmoc::action::{Action, Direction, Port};
//! use cmoc::error::CoreResult;
//! use cmoc::scheduler::{action_handle, Scheduler};
//! use cmoc::time::Duration;
//!
//! struct Source;
//! impl Action for Source {
//!     fn name(&self) -> &str { "source" }
//!     fn ports(&self) -> &[Port] {
//!         static PORTS: std::sync::OnceLock<Vec<Port>> = std::sync::OnceLock::new();
//!         PORTS.get_or_init(|| vec![Port::new("x", 0, Direction::Out)])
//!     }
//! }
//!
//! struct Sink;
//! impl Action for Sink {
//!     fn name(&self) -> &str { "sink" }
//!     fn ports(&self) -> &[Port] {
//!         static PORTS: std::sync::OnceLock<Vec<Port>> = std::sync::OnceLock::new();
//!         PORTS.get_or_init(|| vec![Port::new("x", 0, Direction::In)])
//!     }
//! }
//!
//! fn main() -> CoreResult<()> {
//!     let mut scheduler = Scheduler::ddg("demo");
//!     scheduler.add_action(action_handle(Sink))?;
//!     scheduler.add_action(action_handle(Source))?;
//!     scheduler.schedule()?;
//!     scheduler.init_actions(Duration::from_seconds(0.0))?;
//!     scheduler.run_actions(Duration::from_seconds(0.0), Duration::from_seconds(1.0))?;
//!     assert_eq!(scheduler.topological_order_names(), vec!["source", "sink"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Current features
//!
//! - DDG and User schedulers, with full error reporting for unresolved,
//!   duplicated, and dangling ports, and cycle detection.
//! - The five-member `InterpolateAction` family (linear/central
//!   extrapolation and interpolation, plus a constant zeroth-order hold).
//! - Agent lifecycle with deferred dataitem registration, predictor-corrector
//!   store/restore, and reentrant BC/grid-motion refresh callbacks.
//! - A Coupling driver with restart-info persistence and a
//!   predictor-corrector convergence loop.
//!
//! ## Non-goals
//!
//! No mesh topology, no ownership of a concrete file format, no GUI, no
//! physics. See `DESIGN.md` for the full grounding ledger and the open
//! questions this crate resolved one way or another.

pub mod action;
pub mod agent;
pub mod coupling;
pub mod diagnostics;
pub mod error;
pub mod interpolate;
pub mod module;
pub mod numeric;
pub mod registry;
pub mod scheduler;
pub mod time;

pub use anyhow::{Context, Error, Result, anyhow, bail};
pub use error::{CoreError, CoreResult};
pub use time::Duration;

//! The `InterpolateAction` family: actions that produce a time-interpolated
//! or time-extrapolated dataitem from an "old" and a "new" snapshot, for
//! handing a coupled solver a boundary condition or grid position at a
//! sub-step time that neither snapshot was actually computed at.
//!
//! All five concrete variants share one kernel (`extrapolate_linear`) and
//! differ only in which "old" anchor convention they use and whether they
//! run during extrapolation (ahead of the next step) or interpolation
//! (within the current predictor-corrector sub-step).

use std::cell::Cell;
use std::rc::Rc;

use crate::action::{Action, Direction, Port};
use crate::error::{CoreError, CoreResult};
use crate::numeric::NumericLib;
use crate::registry::{is_present, DataRegistry, Handle, ABSENT};
use crate::time::{alpha_in_range, Duration};

/// The anchor convention for the "old" snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    /// `t_old = 0`: the old snapshot sits at the start of the local
    /// `[0, 1]` step frame (the common two-point linear case).
    Old,
    /// `t_old = -0.5`: a central estimate that also weighs the previous
    /// step's length, optionally limited by a supplied gradient bound.
    Central,
}

/// Whether this action runs once per macro-step to predict ahead
/// (`Extrapolate`), or repeatedly within a predictor-corrector sub-step to
/// produce a value at a given `alpha` (`Interpolate`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Extrapolate,
    Interpolate,
}

/// An action in the interpolate/extrapolate family, with the extra
/// lifecycle CMOC's Agent drives around the predictor-corrector loop:
/// snapshotting a new anchor once a step converges, and rolling back to the
/// previous anchor if it doesn't.
pub trait InterpolateAction: Action {
    /// Copy the current live value into the "old" anchor slot. Called once
    /// per converged step (via the Agent's bc-init pass), never mid-PC-loop.
    fn backup(&mut self) -> CoreResult<()>;

    /// Copy the "old" anchor slot back into the live value. Called when the
    /// predictor-corrector loop exhausts its iteration budget without
    /// converging, to leave state consistent with the last converged step.
    fn restore(&mut self) -> CoreResult<()>;
}

/// Shared state and kernel for all five concrete variants.
struct Core {
    name: String,
    ports: Vec<Port>,
    anchor: Anchor,
    mode: Mode,
    has_grad: bool,

    registry: Rc<std::cell::RefCell<dyn DataRegistry>>,
    numeric: Rc<dyn NumericLib>,
    old_dt: Rc<Cell<f64>>,

    out_h: Handle,
    new_h: Handle,
    old_h: Handle,
    grad_h: Handle,
}

impl Core {
    fn new(
        name: impl Into<String>,
        out_attr: &str,
        new_attr: &str,
        old_attr: &str,
        grad_attr: Option<&str>,
        anchor: Anchor,
        mode: Mode,
        registry: Rc<std::cell::RefCell<dyn DataRegistry>>,
        numeric: Rc<dyn NumericLib>,
        old_dt: Rc<Cell<f64>>,
    ) -> Self {
        let mut ports = vec![
            Port::new(out_attr, 0, Direction::Out),
            Port::new(new_attr, 0, Direction::In),
            Port::new(old_attr, 0, Direction::InOut),
        ];
        let has_grad = grad_attr.is_some();
        if let Some(g) = grad_attr {
            ports.push(Port::new(g, 0, Direction::In));
        }
        Core {
            name: name.into(),
            ports,
            anchor,
            mode,
            has_grad,
            registry,
            numeric,
            old_dt,
            out_h: ABSENT,
            new_h: ABSENT,
            old_h: ABSENT,
            grad_h: ABSENT,
        }
    }

    fn resolve(&mut self) -> CoreResult<()> {
        let reg = self.registry.borrow();
        self.out_h = reg.resolve_const(&self.ports[0].attr);
        self.new_h = reg.resolve_const(&self.ports[1].attr);
        self.old_h = reg.resolve_const(&self.ports[2].attr);
        if self.has_grad {
            self.grad_h = reg.resolve_const(&self.ports[3].attr);
        }
        Ok(())
    }

    fn attr(&self) -> &str {
        &self.ports[0].attr
    }

    fn run(&mut self, dt: Duration, alpha: f64) -> CoreResult<()> {
        let t_out = match self.mode {
            Mode::Interpolate => {
                if !alpha_in_range(alpha) {
                    return Err(CoreError::InvalidAlpha {
                        attr: self.attr().to_string(),
                        alpha,
                    });
                }
                alpha
            }
            Mode::Extrapolate => {
                let dt_old = self.old_dt.get();
                let ratio = if dt_old.abs() > f64::EPSILON {
                    dt.to_seconds() / dt_old
                } else {
                    1.0
                };
                1.0 + ratio
            }
        };

        let t_old_anchor = match self.anchor {
            Anchor::Old => 0.0,
            Anchor::Central => -0.5,
        };

        let mut reg = self.registry.borrow_mut();
        extrapolate_linear(
            self.numeric.as_ref(),
            &mut *reg,
            self.attr(),
            dt,
            Duration::from_seconds(self.old_dt.get()),
            t_old_anchor,
            self.old_h,
            t_out,
            self.new_h,
            self.out_h,
            self.grad_h,
        )
    }
}

/// The shared kernel behind every concrete variant.
///
/// - `t_out == t_new_anchor (1.0)` copies the new value through directly.
/// - `t_out == t_old_anchor` copies the old value through directly (and
///   requires the old value to be present at all, else
///   [`CoreError::MissingOldValue`]).
/// - Otherwise, extrapolates/interpolates linearly between old and new,
///   optionally clamped by a gradient bound for the central anchor.
#[allow(clippy::too_many_arguments)]
fn extrapolate_linear(
    numeric: &dyn NumericLib,
    registry: &mut dyn DataRegistry,
    attr: &str,
    dt: Duration,
    dt_old: Duration,
    t_old_anchor: f64,
    h_old: Handle,
    t_out: f64,
    h_new: Handle,
    h_out: Handle,
    h_grad: Handle,
) -> CoreResult<()> {
    const T_NEW_ANCHOR: f64 = 1.0;

    if (t_out - T_NEW_ANCHOR).abs() < f64::EPSILON {
        return numeric.copy(registry, h_new, h_out);
    }

    if !is_present(h_old) {
        return Err(CoreError::MissingOldValue {
            attr: attr.to_string(),
        });
    }

    if (t_out - t_old_anchor).abs() < f64::EPSILON {
        return numeric.copy(registry, h_old, h_out);
    }

    if t_old_anchor == -1.0 {
        return Err(CoreError::ReservedAnchor {
            attr: attr.to_string(),
        });
    }

    // delta = new - old, stashed in h_out
    numeric.sub(registry, h_new, h_old, h_out)?;

    let a = if t_old_anchor == 0.0 {
        t_out - 1.0
    } else if t_old_anchor == -0.5 {
        let dt_sum = dt_old.to_seconds() + dt.to_seconds();
        if is_present(h_grad) {
            if dt_sum.abs() > f64::EPSILON {
                numeric.div_scalar(registry, h_out, dt_sum / 2.0, h_out)?;
            }
            numeric.limit1(registry, h_grad, h_out, h_out)?;
            (t_out - 0.5) * dt.to_seconds()
        } else if dt_sum.abs() > f64::EPSILON {
            2.0 * (t_out - 0.5) * dt.to_seconds() / dt_sum
        } else {
            0.0
        }
    } else {
        return Err(CoreError::UnsupportedAnchor {
            attr: attr.to_string(),
            time_old: t_old_anchor,
        });
    };

    // out <- a * out + new
    numeric.axpy_scalar(registry, a, h_out, h_new, h_out)
}

macro_rules! interpolate_variant {
    ($name:ident, $anchor:expr, $mode:expr, $grad:expr) => {
        #[doc = concat!(
            "`", stringify!($name), "`: anchor ", stringify!($anchor),
            ", mode ", stringify!($mode), "."
        )]
        pub struct $name(Core);

        impl $name {
            #[allow(clippy::too_many_arguments)]
            pub fn new(
                name: impl Into<String>,
                out_attr: &str,
                new_attr: &str,
                old_attr: &str,
                grad_attr: Option<&str>,
                registry: Rc<std::cell::RefCell<dyn DataRegistry>>,
                numeric: Rc<dyn NumericLib>,
                old_dt: Rc<Cell<f64>>,
            ) -> Self {
                $name(Core::new(
                    name,
                    out_attr,
                    new_attr,
                    old_attr,
                    if $grad { grad_attr } else { None },
                    $anchor,
                    $mode,
                    registry,
                    numeric,
                    old_dt,
                ))
            }
        }

        impl Action for $name {
            fn name(&self) -> &str {
                &self.0.name
            }

            fn ports(&self) -> &[Port] {
                &self.0.ports
            }

            fn init(&mut self, _t: Duration) -> CoreResult<()> {
                self.0.resolve()
            }

            fn run(&mut self, _t: Duration, dt: Duration, alpha: f64) -> CoreResult<()> {
                self.0.run(dt, alpha)
            }
        }

        impl InterpolateAction for $name {
            fn backup(&mut self) -> CoreResult<()> {
                if self.0.has_grad && is_present(self.0.grad_h) {
                    let dt_old = self.0.old_dt.get();
                    let mut reg = self.0.registry.borrow_mut();
                    if dt_old > 0.0 {
                        // grad <- (new - old) / dt_old
                        self.0.numeric.sub(&mut *reg, self.0.new_h, self.0.old_h, self.0.grad_h)?;
                        self.0.numeric.div_scalar(&mut *reg, self.0.grad_h, dt_old, self.0.grad_h)?;
                    } else if let Some(arr) = reg.array_mut(self.0.grad_h) {
                        arr.iter_mut().for_each(|v| *v = 0.0);
                    }
                }
                let mut reg = self.0.registry.borrow_mut();
                self.0.numeric.copy(&mut *reg, self.0.new_h, self.0.old_h)
            }

            fn restore(&mut self) -> CoreResult<()> {
                let mut reg = self.0.registry.borrow_mut();
                self.0.numeric.copy(&mut *reg, self.0.old_h, self.0.new_h)
            }
        }
    };
}

interpolate_variant!(ExtrapolateLinear, Anchor::Old, Mode::Extrapolate, false);
interpolate_variant!(ExtrapolateCentral, Anchor::Central, Mode::Extrapolate, true);
interpolate_variant!(InterpolateLinear, Anchor::Old, Mode::Interpolate, false);
interpolate_variant!(InterpolateCentral, Anchor::Central, Mode::Interpolate, true);

/// `Interpolate_Constant`: a zeroth-order hold. Never reads the old anchor
/// at all, and always copies the new value straight through regardless of
/// `alpha` -- the degenerate member of the family, for dataitems a host
/// doesn't want genuinely interpolated (e.g. discrete flags).
pub struct InterpolateConstant {
    name: String,
    ports: Vec<Port>,
    registry: Rc<std::cell::RefCell<dyn DataRegistry>>,
    numeric: Rc<dyn NumericLib>,
    out_h: Handle,
    new_h: Handle,
    old_h: Handle,
}

impl InterpolateConstant {
    pub fn new(
        name: impl Into<String>,
        out_attr: &str,
        new_attr: &str,
        old_attr: &str,
        registry: Rc<std::cell::RefCell<dyn DataRegistry>>,
        numeric: Rc<dyn NumericLib>,
    ) -> Self {
        InterpolateConstant {
            name: name.into(),
            ports: vec![
                Port::new(out_attr, 0, Direction::Out),
                Port::new(new_attr, 0, Direction::In),
                Port::new(old_attr, 0, Direction::InOut),
            ],
            registry,
            numeric,
            out_h: ABSENT,
            new_h: ABSENT,
            old_h: ABSENT,
        }
    }
}

impl Action for InterpolateConstant {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn init(&mut self, _t: Duration) -> CoreResult<()> {
        let reg = self.registry.borrow();
        self.out_h = reg.resolve_const(&self.ports[0].attr);
        self.new_h = reg.resolve_const(&self.ports[1].attr);
        self.old_h = reg.resolve_const(&self.ports[2].attr);
        Ok(())
    }

    fn run(&mut self, _t: Duration, _dt: Duration, _alpha: f64) -> CoreResult<()> {
        let mut reg = self.registry.borrow_mut();
        self.numeric.copy(&mut *reg, self.new_h, self.out_h)
    }
}

impl InterpolateAction for InterpolateConstant {
    fn backup(&mut self) -> CoreResult<()> {
        let mut reg = self.registry.borrow_mut();
        self.numeric.copy(&mut *reg, self.new_h, self.old_h)
    }

    fn restore(&mut self) -> CoreResult<()> {
        let mut reg = self.registry.borrow_mut();
        self.numeric.copy(&mut *reg, self.old_h, self.new_h)
    }
}

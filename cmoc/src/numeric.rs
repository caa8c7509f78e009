//! The "NumericLib" external collaborator: elementwise vector arithmetic
//! over dataitem arrays, addressed by [`Handle`] and dispatched through the
//! [`crate::registry::DataRegistry`].
//!
//! `InterpolateAction` and the Agent's predictor-corrector convergence check
//! are the only two callers. Neither owns array storage; both borrow it
//! through the registry for the duration of one call.

use crate::error::{CoreError, CoreResult};
use crate::registry::{DataRegistry, Handle};

/// Elementwise numeric operations over dataitem arrays. Kept as a trait
/// (rather than free functions over `&[f64]`) so a host whose registry
/// stores data off-heap (GPU, shared memory, a remote rank) can provide its
/// own backend without this crate needing to know about it.
pub trait NumericLib {
    /// `dst <- src`
    fn copy(&self, reg: &mut dyn DataRegistry, src: Handle, dst: Handle) -> CoreResult<()>;

    /// `dst <- a - b`, elementwise.
    fn sub(&self, reg: &mut dyn DataRegistry, a: Handle, b: Handle, dst: Handle) -> CoreResult<()>;

    /// `dst <- a / scalar`, elementwise.
    fn div_scalar(
        &self,
        reg: &mut dyn DataRegistry,
        a: Handle,
        scalar: f64,
        dst: Handle,
    ) -> CoreResult<()>;

    /// `dst <- scalar * x + y`, elementwise (the BLAS axpy shape).
    fn axpy_scalar(
        &self,
        reg: &mut dyn DataRegistry,
        scalar: f64,
        x: Handle,
        y: Handle,
        dst: Handle,
    ) -> CoreResult<()>;

    /// Clamp `val` componentwise to `[-|grad|, |grad|]`. Used by the central
    /// extrapolation kernel to keep an estimated rate of change from
    /// overshooting the supplied gradient bound.
    fn limit1(
        &self,
        reg: &mut dyn DataRegistry,
        grad: Handle,
        val: Handle,
        dst: Handle,
    ) -> CoreResult<()>;

    /// L2 norm of the array behind `handle`.
    fn norm(&self, reg: &dyn DataRegistry, handle: Handle) -> CoreResult<f64>;

    /// `||cur - prev|| / ||cur||`, the relative-change metric the
    /// predictor-corrector convergence check uses. Returns `0.0` if `cur` is
    /// the zero vector (trivially converged).
    fn relative_diff_norm(
        &self,
        reg: &dyn DataRegistry,
        cur: Handle,
        prev: Handle,
    ) -> CoreResult<f64>;
}

fn fetch<'a>(reg: &'a dyn DataRegistry, h: Handle, context: &str) -> CoreResult<&'a [f64]> {
    reg.array(h).ok_or_else(|| CoreError::AbsentHandle {
        context: context.to_string(),
    })
}

fn fetch_mut<'a>(
    reg: &'a mut dyn DataRegistry,
    h: Handle,
    context: &str,
) -> CoreResult<&'a mut [f64]> {
    reg.array_mut(h).ok_or_else(|| CoreError::AbsentHandle {
        context: context.to_string(),
    })
}

/// Backs [`NumericLib`] with `nalgebra`'s dynamically-sized vector types.
/// `nalgebra` already provides exactly the BLAS-style `axpy` and `norm`
/// operations this contract needs; everything else is a thin elementwise
/// wrapper.
#[cfg(feature = "nalgebra")]
pub struct NalgebraNumericLib;

#[cfg(feature = "nalgebra")]
impl NumericLib for NalgebraNumericLib {
    fn copy(&self, reg: &mut dyn DataRegistry, src: Handle, dst: Handle) -> CoreResult<()> {
        let data = fetch(reg, src, "copy:src")?.to_vec();
        let out = fetch_mut(reg, dst, "copy:dst")?;
        copy_into(&data, out);
        Ok(())
    }

    fn sub(&self, reg: &mut dyn DataRegistry, a: Handle, b: Handle, dst: Handle) -> CoreResult<()> {
        let av = nalgebra::DVector::from_row_slice(fetch(reg, a, "sub:a")?);
        let bv = nalgebra::DVector::from_row_slice(fetch(reg, b, "sub:b")?);
        let result = av - bv;
        let out = fetch_mut(reg, dst, "sub:dst")?;
        copy_into(result.as_slice(), out);
        Ok(())
    }

    fn div_scalar(
        &self,
        reg: &mut dyn DataRegistry,
        a: Handle,
        scalar: f64,
        dst: Handle,
    ) -> CoreResult<()> {
        let av = nalgebra::DVector::from_row_slice(fetch(reg, a, "div_scalar:a")?);
        let result = av / scalar;
        let out = fetch_mut(reg, dst, "div_scalar:dst")?;
        copy_into(result.as_slice(), out);
        Ok(())
    }

    fn axpy_scalar(
        &self,
        reg: &mut dyn DataRegistry,
        scalar: f64,
        x: Handle,
        y: Handle,
        dst: Handle,
    ) -> CoreResult<()> {
        let xv = nalgebra::DVector::from_row_slice(fetch(reg, x, "axpy_scalar:x")?);
        let mut yv = nalgebra::DVector::from_row_slice(fetch(reg, y, "axpy_scalar:y")?);
        yv.axpy(scalar, &xv, 1.0);
        let out = fetch_mut(reg, dst, "axpy_scalar:dst")?;
        copy_into(yv.as_slice(), out);
        Ok(())
    }

    fn limit1(
        &self,
        reg: &mut dyn DataRegistry,
        grad: Handle,
        val: Handle,
        dst: Handle,
    ) -> CoreResult<()> {
        let gv = fetch(reg, grad, "limit1:grad")?.to_vec();
        let vv = fetch(reg, val, "limit1:val")?.to_vec();
        let clamped: Vec<f64> = vv
            .iter()
            .zip(gv.iter())
            .map(|(v, g)| v.clamp(-g.abs(), g.abs()))
            .collect();
        let out = fetch_mut(reg, dst, "limit1:dst")?;
        copy_into(&clamped, out);
        Ok(())
    }

    fn norm(&self, reg: &dyn DataRegistry, handle: Handle) -> CoreResult<f64> {
        let v = nalgebra::DVector::from_row_slice(fetch(reg, handle, "norm")?);
        Ok(v.norm())
    }

    fn relative_diff_norm(
        &self,
        reg: &dyn DataRegistry,
        cur: Handle,
        prev: Handle,
    ) -> CoreResult<f64> {
        let cv = nalgebra::DVector::from_row_slice(fetch(reg, cur, "relative_diff_norm:cur")?);
        let pv = nalgebra::DVector::from_row_slice(fetch(reg, prev, "relative_diff_norm:prev")?);
        let cur_norm = cv.norm();
        if cur_norm == 0.0 {
            return Ok(0.0);
        }
        Ok((cv - pv).norm() / cur_norm)
    }
}

fn copy_into(src: &[f64], dst: &mut [f64]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

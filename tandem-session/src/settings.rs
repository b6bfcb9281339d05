//! Session-side settings handling.
//!
//! The engine's settings struct is used directly; this module adds the
//! patch type callers hand to `solve` and `update_settings`, with the
//! validation the engine itself does not perform.

use nalgebra::DVector;

pub use tandem_core::AdmmSettings as SolverSettings;

use crate::error::{SessionError, SessionResult};

/// Partial settings update. Unset fields keep their current values.
///
/// `maxiters` is an accepted alias for `maxiter`; when both are given the
/// alias wins.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub alpha: Option<f64>,
    pub rho: Option<f64>,
    pub abstol: Option<f64>,
    pub reltol: Option<f64>,
    pub tolproj: Option<f64>,
    pub toladapt: Option<f64>,
    pub anderson_regularization: Option<f64>,
    pub maxiter: Option<u32>,
    pub maxiters: Option<u32>,
    pub anderson_lookback: Option<u32>,
    pub verbose: Option<u32>,
    pub suppress: Option<u32>,
    pub adaptiverho: Option<bool>,
    pub accelerate: Option<bool>,
    pub gapstop: Option<bool>,
    pub warmstart: Option<bool>,
    pub resume: Option<bool>,
    pub diagnostic: Option<bool>,
    /// Initial primal point, must have length `n`.
    pub x0: Option<Vec<f64>>,
    /// Initial dual point, must have length `m`.
    pub nu0: Option<Vec<f64>>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.alpha.is_none()
            && self.rho.is_none()
            && self.abstol.is_none()
            && self.reltol.is_none()
            && self.tolproj.is_none()
            && self.toladapt.is_none()
            && self.anderson_regularization.is_none()
            && self.maxiter.is_none()
            && self.maxiters.is_none()
            && self.anderson_lookback.is_none()
            && self.verbose.is_none()
            && self.suppress.is_none()
            && self.adaptiverho.is_none()
            && self.accelerate.is_none()
            && self.gapstop.is_none()
            && self.warmstart.is_none()
            && self.resume.is_none()
            && self.diagnostic.is_none()
            && self.x0.is_none()
            && self.nu0.is_none()
    }

    /// Merges this patch into `settings` for a problem of shape `(m, n)`.
    ///
    /// Fails with nothing applied when a continuous knob is negative or
    /// non-finite, or when a warm-start vector is mis-sized.
    pub fn apply(&self, settings: &mut SolverSettings, m: usize, n: usize) -> SessionResult<()> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("rho", self.rho),
            ("abstol", self.abstol),
            ("reltol", self.reltol),
            ("tolproj", self.tolproj),
            ("toladapt", self.toladapt),
            ("anderson_regularization", self.anderson_regularization),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(SessionError::Validation(format!(
                        "setting {name:?} must be a nonnegative real, got {v}"
                    )));
                }
            }
        }
        if let Some(x0) = &self.x0 {
            if x0.len() != n {
                return Err(SessionError::Validation(format!(
                    "x0 has {} entries, problem has {n} columns",
                    x0.len()
                )));
            }
        }
        if let Some(nu0) = &self.nu0 {
            if nu0.len() != m {
                return Err(SessionError::Validation(format!(
                    "nu0 has {} entries, problem has {m} rows",
                    nu0.len()
                )));
            }
        }

        if let Some(v) = self.alpha {
            settings.alpha = v;
        }
        if let Some(v) = self.rho {
            settings.rho = v;
        }
        if let Some(v) = self.abstol {
            settings.abstol = v;
        }
        if let Some(v) = self.reltol {
            settings.reltol = v;
        }
        if let Some(v) = self.tolproj {
            settings.tolproj = v;
        }
        if let Some(v) = self.toladapt {
            settings.toladapt = v;
        }
        if let Some(v) = self.anderson_regularization {
            settings.anderson_regularization = v;
        }
        if let Some(v) = self.maxiter {
            settings.maxiter = v;
        }
        if let Some(v) = self.maxiters {
            settings.maxiter = v;
        }
        if let Some(v) = self.anderson_lookback {
            settings.anderson_lookback = v;
        }
        if let Some(v) = self.verbose {
            settings.verbose = v;
        }
        if let Some(v) = self.suppress {
            settings.suppress = v;
        }
        if let Some(v) = self.adaptiverho {
            settings.adaptiverho = v;
        }
        if let Some(v) = self.accelerate {
            settings.accelerate = v;
        }
        if let Some(v) = self.gapstop {
            settings.gapstop = v;
        }
        if let Some(v) = self.warmstart {
            settings.warmstart = v;
        }
        if let Some(v) = self.resume {
            settings.resume = v;
        }
        if let Some(v) = self.diagnostic {
            settings.diagnostic = v;
        }
        if let Some(x0) = &self.x0 {
            settings.x0 = Some(DVector::from_column_slice(x0));
        }
        if let Some(nu0) = &self.nu0 {
            settings.nu0 = Some(DVector::from_column_slice(nu0));
        }
        Ok(())
    }
}

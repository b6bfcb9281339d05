//! Graph-form ADMM solver over a dense matrix.
//!
//! Solves `minimize f(y) + g(x) subject to y = A x` with separable `f`, `g`
//! given as [`FunctionTerm`] vectors. The matrix is equilibrated once at
//! construction, the iterate state lives on the handle between solves, and
//! the whole handle can be exported to flat buffers and rebuilt later
//! without repeating the setup work.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use crate::anderson::AndersonAccelerator;
use crate::equil::{regularized_sinkhorn_knopp, Equilibration};
use crate::error::EngineError;
use crate::prox::{eval_terms, FunctionTerm};
use crate::project::Projector;
use crate::settings::AdmmSettings;

/// Number of iterate blocks persisted per handle: `z, z12, zt, zt12,
/// zprev, ztemp`, in that order, each of length `m + n`.
pub const STATE_BLOCKS: usize = 6;

const RHO_MAX: f64 = 1e4;
const RHO_MIN: f64 = 1e-4;
// adaptive penalty schedule
const DELTA_MIN: f64 = 1.05;
const DELTA_MAX: f64 = 2.0;
const GAMMA: f64 = 1.01;
const TAU: f64 = 0.8;

/// Structural properties of a solver handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverFlags {
    /// Cholesky-based projection when set, conjugate gradient otherwise.
    pub direct: bool,
    pub equilibrated: bool,
    pub factorized: bool,
}

impl Default for SolverFlags {
    fn default() -> Self {
        SolverFlags {
            direct: true,
            equilibrated: false,
            factorized: false,
        }
    }
}

/// Scalar results of the most recent solve.
#[derive(Debug, Clone, Default)]
pub struct AdmmInfo {
    /// Engine status code; zero on every `Ok` return.
    pub err: i32,
    pub converged: bool,
    pub iterations: u32,
    pub objective: f64,
    /// Penalty value at exit.
    pub rho: f64,
    pub setup_time: f64,
    pub solve_time: f64,
}

/// Unscaled solution vectors. Which fields are filled depends on the
/// `suppress` setting.
#[derive(Debug, Clone, Default)]
pub struct AdmmOutput {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub mu: Vec<f64>,
    pub nu: Vec<f64>,
}

/// One row of the iteration trace recorded under `diagnostic`.
#[derive(Debug, Clone, Copy)]
pub struct ResidualSample {
    pub iteration: u32,
    pub primal: f64,
    pub dual: f64,
    pub gap: f64,
}

/// Problem data owned by a handle built with [`DenseSolver::init`].
#[derive(Debug, Clone)]
pub struct ProblemData {
    pub a: DMatrix<f64>,
}

impl ProblemData {
    pub fn new(a: DMatrix<f64>) -> Self {
        ProblemData { a }
    }

    pub fn m(&self) -> usize {
        self.a.nrows()
    }

    pub fn n(&self) -> usize {
        self.a.ncols()
    }
}

// Iterate blocks, each [x-part (n) | y-part (m)].
#[derive(Debug, Clone)]
struct Blocks {
    z: DVector<f64>,
    z12: DVector<f64>,
    zt: DVector<f64>,
    zt12: DVector<f64>,
    zprev: DVector<f64>,
    ztemp: DVector<f64>,
}

impl Blocks {
    fn zeros(dim: usize) -> Self {
        Blocks {
            z: DVector::zeros(dim),
            z12: DVector::zeros(dim),
            zt: DVector::zeros(dim),
            zt12: DVector::zeros(dim),
            zprev: DVector::zeros(dim),
            ztemp: DVector::zeros(dim),
        }
    }

    fn write_to(&self, buf: &mut [f64]) {
        let dim = self.z.len();
        for (i, block) in self.ordered().into_iter().enumerate() {
            buf[i * dim..(i + 1) * dim].copy_from_slice(block.as_slice());
        }
    }

    fn read_from(buf: &[f64], dim: usize) -> Self {
        let take = |i: usize| DVector::from_column_slice(&buf[i * dim..(i + 1) * dim]);
        Blocks {
            z: take(0),
            z12: take(1),
            zt: take(2),
            zt12: take(3),
            zprev: take(4),
            ztemp: take(5),
        }
    }

    fn ordered(&self) -> [&DVector<f64>; STATE_BLOCKS] {
        [&self.z, &self.z12, &self.zt, &self.zt12, &self.zprev, &self.ztemp]
    }
}

/// Live solver handle for one dense problem.
#[derive(Debug, Clone)]
pub struct DenseSolver {
    data: Option<ProblemData>,
    equil: Equilibration,
    projector: Projector,
    flags: SolverFlags,
    m: usize,
    n: usize,
    rho: f64,
    blocks: Blocks,
    setup_time: f64,
    trace: Vec<ResidualSample>,
}

impl DenseSolver {
    /// Equilibrates `data.a`, builds the projector selected by
    /// `flags.direct`, and zeroes the iterate state.
    pub fn init(data: ProblemData, flags: SolverFlags) -> Result<DenseSolver, EngineError> {
        let start = Instant::now();
        let (m, n) = (data.m(), data.n());
        if m == 0 || n == 0 {
            return Err(EngineError::InvalidDimensions(format!(
                "matrix must have at least one row and one column, got {m}x{n}"
            )));
        }

        let equil = regularized_sinkhorn_knopp(&data.a)?;
        let projector = if flags.direct {
            Projector::direct(&equil.a_equil)?
        } else {
            Projector::indirect(&equil.a_equil)
        };

        Ok(DenseSolver {
            data: Some(data),
            flags: SolverFlags {
                direct: flags.direct,
                equilibrated: true,
                factorized: projector.is_direct(),
            },
            projector,
            equil,
            m,
            n,
            rho: 1.0,
            blocks: Blocks::zeros(m + n),
            setup_time: start.elapsed().as_secs_f64(),
            trace: Vec::new(),
        })
    }

    /// Rebuilds a handle from buffers previously written by
    /// [`DenseSolver::export_cache`] and [`DenseSolver::save_state`].
    ///
    /// Equilibration is taken as given. The Cholesky factor is reused when
    /// present; a direct handle without one is refactorized here.
    pub fn load_solver(
        a_equil: &[f64],
        d: &[f64],
        e: &[f64],
        ata_chol: Option<&[f64]>,
        state: &[f64],
        rho: f64,
        flags: SolverFlags,
    ) -> Result<DenseSolver, EngineError> {
        let start = Instant::now();
        let (m, n) = (d.len(), e.len());
        if m == 0 || n == 0 {
            return Err(EngineError::InvalidDimensions(
                "scaling vectors must be non-empty".into(),
            ));
        }
        if a_equil.len() != m * n {
            return Err(EngineError::ShapeMismatch(format!(
                "equilibrated matrix has {} entries, expected {}",
                a_equil.len(),
                m * n
            )));
        }
        let dim = m + n;
        if state.len() != STATE_BLOCKS * dim {
            return Err(EngineError::ShapeMismatch(format!(
                "state buffer has {} entries, expected {}",
                state.len(),
                STATE_BLOCKS * dim
            )));
        }
        if !rho.is_finite() || rho <= 0.0 {
            return Err(EngineError::Numerical(format!(
                "penalty must be positive and finite, got {rho}"
            )));
        }

        let equil = Equilibration {
            a_equil: DMatrix::from_row_slice(m, n, a_equil),
            d: DVector::from_column_slice(d),
            e: DVector::from_column_slice(e),
        };

        let k = m.min(n);
        let projector = if flags.direct {
            match ata_chol {
                Some(l) if flags.factorized => {
                    if l.len() != k * k {
                        return Err(EngineError::ShapeMismatch(format!(
                            "factor buffer has {} entries, expected {}",
                            l.len(),
                            k * k
                        )));
                    }
                    Projector::direct_from_factor(DMatrix::from_row_slice(k, k, l))
                }
                _ => Projector::direct(&equil.a_equil)?,
            }
        } else {
            Projector::indirect(&equil.a_equil)
        };

        Ok(DenseSolver {
            data: None,
            flags: SolverFlags {
                direct: flags.direct,
                equilibrated: true,
                factorized: projector.is_direct(),
            },
            projector,
            equil,
            m,
            n,
            rho,
            blocks: Blocks::read_from(state, dim),
            setup_time: start.elapsed().as_secs_f64(),
            trace: Vec::new(),
        })
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn flags(&self) -> SolverFlags {
        self.flags
    }

    /// Length of the flat state buffer, `STATE_BLOCKS * (m + n)`.
    pub fn state_len(&self) -> usize {
        STATE_BLOCKS * (self.m + self.n)
    }

    /// Iteration residuals of the last solve run with `diagnostic` set.
    pub fn residual_trace(&self) -> &[ResidualSample] {
        &self.trace
    }

    /// Runs the ADMM loop. `info` and `output` are overwritten.
    pub fn solve(
        &mut self,
        f: &[FunctionTerm],
        g: &[FunctionTerm],
        settings: &AdmmSettings,
        info: &mut AdmmInfo,
        output: &mut AdmmOutput,
    ) -> Result<(), EngineError> {
        let start = Instant::now();
        let (m, n) = (self.m, self.n);
        if f.len() != m {
            return Err(EngineError::ShapeMismatch(format!(
                "objective on y has {} terms, matrix has {} rows",
                f.len(),
                m
            )));
        }
        if g.len() != n {
            return Err(EngineError::ShapeMismatch(format!(
                "objective on x has {} terms, matrix has {} columns",
                g.len(),
                n
            )));
        }

        let mut rho = if settings.resume { self.rho } else { settings.rho };
        if !rho.is_finite() || rho <= 0.0 {
            return Err(EngineError::Numerical(format!(
                "penalty must be positive and finite, got {rho}"
            )));
        }

        // Pull the objectives into equilibrated coordinates.
        let d = &self.equil.d;
        let e = &self.equil.e;
        let mut fs: Vec<FunctionTerm> = f.to_vec();
        for (i, t) in fs.iter_mut().enumerate() {
            t.a /= d[i];
            t.d /= d[i];
            t.e /= d[i] * d[i];
        }
        let mut gs: Vec<FunctionTerm> = g.to_vec();
        for (j, t) in gs.iter_mut().enumerate() {
            t.a *= e[j];
            t.d *= e[j];
            t.e *= e[j] * e[j];
        }

        if settings.warmstart {
            self.apply_warm_start(settings, rho)?;
        }

        let dim = m + n;
        let sqrtmn_atol = (dim as f64).sqrt() * settings.abstol;
        let alpha = settings.alpha;
        let xi = settings.toladapt;

        let mut accel = settings.accelerate.then(|| {
            AndersonAccelerator::new(
                2 * dim,
                settings.anderson_lookback as usize,
                settings.anderson_regularization,
            )
        });

        // adaptive penalty bookkeeping
        let mut delta = DELTA_MIN;
        let mut last_up: f64 = 0.0;
        let mut last_down: f64 = 0.0;

        self.trace.clear();
        let mut converged = false;
        let mut iterations = 0u32;
        let mut objective = 0.0;

        if settings.verbose >= 2 {
            eprintln!(
                "{:>5} {:>11} {:>11} {:>11} {:>11} {:>11} {:>13}",
                "iter", "pri res", "eps pri", "dua res", "eps dua", "gap", "objective"
            );
        }

        for k in 0..settings.maxiter {
            iterations = k + 1;
            self.blocks.zprev.copy_from(&self.blocks.z);
            let zt_in = accel.as_ref().map(|_| self.blocks.zt.clone());

            // Proximal step on z - zt.
            self.blocks.ztemp.copy_from(&self.blocks.z);
            self.blocks.ztemp -= &self.blocks.zt;
            for j in 0..n {
                self.blocks.z12[j] = gs[j].prox(self.blocks.ztemp[j], rho);
            }
            for i in 0..m {
                self.blocks.z12[n + i] = fs[i].prox(self.blocks.ztemp[n + i], rho);
            }

            objective = eval_terms(&fs, &self.blocks.z12.as_slice()[n..])
                + eval_terms(&gs, &self.blocks.z12.as_slice()[..n]);
            let gap = rho * self.blocks.z12.dot(&self.blocks.zt).abs();
            let eps_pri = sqrtmn_atol + settings.reltol * self.blocks.z12.norm();
            let eps_dua = sqrtmn_atol + settings.reltol * rho * self.blocks.zt.norm();
            let eps_gap = sqrtmn_atol + settings.reltol * objective.abs();

            // Overrelaxed projection input, kept in ztemp for the dual step.
            self.blocks.ztemp.copy_from(&self.blocks.z12);
            self.blocks.ztemp *= alpha;
            self.blocks.ztemp.axpy(1.0 - alpha, &self.blocks.zprev, 1.0);
            self.blocks.ztemp += &self.blocks.zt;

            let cx = self.blocks.ztemp.rows(0, n).into_owned();
            let dy = self.blocks.ztemp.rows(n, m).into_owned();
            let (px, py) = self
                .projector
                .project(&self.equil.a_equil, &cx, &dy, settings.tolproj)?;
            self.blocks.z.rows_mut(0, n).copy_from(&px);
            self.blocks.z.rows_mut(n, m).copy_from(&py);

            // zt = ztemp - z, zt12 = z12 - zprev + zt.
            self.blocks.zt.copy_from(&self.blocks.ztemp);
            self.blocks.zt -= &self.blocks.z;
            self.blocks.zt12.copy_from(&self.blocks.z12);
            self.blocks.zt12 -= &self.blocks.zprev;
            self.blocks.zt12 += &self.blocks.zt;

            let r = (&self.blocks.z12 - &self.blocks.z).norm();
            let s = rho * (&self.blocks.z - &self.blocks.zprev).norm();

            if !r.is_finite() || !s.is_finite() {
                return Err(EngineError::Numerical(format!(
                    "iterate diverged at iteration {k}"
                )));
            }

            if settings.diagnostic {
                self.trace.push(ResidualSample {
                    iteration: k,
                    primal: r,
                    dual: s,
                    gap,
                });
            }
            if settings.verbose >= 3 || (settings.verbose >= 2 && k % 10 == 0) {
                eprintln!(
                    "{:5} {:11.3e} {:11.3e} {:11.3e} {:11.3e} {:11.3e} {:13.6e}",
                    k, r, eps_pri, s, eps_dua, gap, objective
                );
            }

            converged = k > 0
                && r <= eps_pri
                && s <= eps_dua
                && (!settings.gapstop || gap <= eps_gap);
            if converged {
                break;
            }

            if settings.adaptiverho {
                let kf = k as f64;
                if rho < RHO_MAX && s < xi * eps_dua && r > xi * eps_pri && TAU * kf > last_up {
                    rho *= delta;
                    self.blocks.zt /= delta;
                    delta = (delta * GAMMA).min(DELTA_MAX);
                    last_up = kf;
                    if let Some(acc) = accel.as_mut() {
                        acc.reset();
                    }
                } else if rho > RHO_MIN
                    && s > xi * eps_dua
                    && r < xi * eps_pri
                    && TAU * kf > last_down
                {
                    rho /= delta;
                    self.blocks.zt *= delta;
                    delta = (delta * GAMMA).min(DELTA_MAX);
                    last_down = kf;
                    if let Some(acc) = accel.as_mut() {
                        acc.reset();
                    }
                } else {
                    delta = (delta / GAMMA).max(DELTA_MIN);
                }
            }

            if let (Some(acc), Some(zt0)) = (accel.as_mut(), zt_in.as_ref()) {
                let mut x_stack = DVector::zeros(2 * dim);
                x_stack.rows_mut(0, dim).copy_from(&self.blocks.zprev);
                x_stack.rows_mut(dim, dim).copy_from(zt0);
                let mut fx_stack = DVector::zeros(2 * dim);
                fx_stack.rows_mut(0, dim).copy_from(&self.blocks.z);
                fx_stack.rows_mut(dim, dim).copy_from(&self.blocks.zt);
                let mixed = acc.mix(&x_stack, &fx_stack);
                self.blocks.z.copy_from(&mixed.rows(0, dim));
                self.blocks.zt.copy_from(&mixed.rows(dim, dim));
            }
        }

        self.rho = rho;

        info.err = 0;
        info.converged = converged;
        info.iterations = iterations;
        info.objective = objective;
        info.rho = rho;
        info.setup_time = self.setup_time;
        info.solve_time = start.elapsed().as_secs_f64();

        if settings.verbose >= 1 {
            eprintln!(
                "{} after {} iterations, objective {:.6e}, rho {:.3e}",
                if converged { "converged" } else { "hit iteration limit" },
                iterations,
                objective,
                rho
            );
        }

        self.write_output(settings.suppress, rho, output);
        Ok(())
    }

    fn apply_warm_start(&mut self, settings: &AdmmSettings, rho: f64) -> Result<(), EngineError> {
        let (m, n) = (self.m, self.n);
        if let Some(x0) = &settings.x0 {
            if x0.len() != n {
                return Err(EngineError::ShapeMismatch(format!(
                    "warm-start x0 has {} entries, expected {}",
                    x0.len(),
                    n
                )));
            }
            let xs = x0.component_div(&self.equil.e);
            let ys = &self.equil.a_equil * &xs;
            self.blocks.z.rows_mut(0, n).copy_from(&xs);
            self.blocks.z.rows_mut(n, m).copy_from(&ys);
        }
        if let Some(nu0) = &settings.nu0 {
            if nu0.len() != m {
                return Err(EngineError::ShapeMismatch(format!(
                    "warm-start nu0 has {} entries, expected {}",
                    nu0.len(),
                    m
                )));
            }
            let mut yt = DVector::zeros(m);
            for i in 0..m {
                yt[i] = -nu0[i] / (rho * self.equil.d[i]);
            }
            let xt = self.equil.a_equil.transpose() * &yt;
            self.blocks.zt.rows_mut(0, n).copy_from(&xt);
            self.blocks.zt.rows_mut(n, m).copy_from(&yt);
        }
        Ok(())
    }

    fn write_output(&self, suppress: u32, rho: f64, output: &mut AdmmOutput) {
        let (m, n) = (self.m, self.n);
        output.x.clear();
        output.y.clear();
        output.mu.clear();
        output.nu.clear();
        if suppress >= 2 {
            return;
        }

        let x12 = self.blocks.z12.rows(0, n);
        let y12 = self.blocks.z12.rows(n, m);
        output.x = (0..n).map(|j| x12[j] * self.equil.e[j]).collect();
        output.y = (0..m).map(|i| y12[i] / self.equil.d[i]).collect();
        if suppress >= 1 {
            return;
        }

        let xt12 = self.blocks.zt12.rows(0, n);
        let yt12 = self.blocks.zt12.rows(n, m);
        output.mu = (0..n).map(|j| -rho * xt12[j] / self.equil.e[j]).collect();
        output.nu = (0..m).map(|i| -rho * yt12[i] * self.equil.d[i]).collect();
    }

    /// Copies the iterate blocks and current penalty into caller buffers.
    pub fn save_state(&self, state_buf: &mut [f64], rho: &mut f64) -> Result<(), EngineError> {
        if state_buf.len() != self.state_len() {
            return Err(EngineError::ShapeMismatch(format!(
                "state buffer has {} entries, expected {}",
                state_buf.len(),
                self.state_len()
            )));
        }
        self.blocks.write_to(state_buf);
        *rho = self.rho;
        Ok(())
    }

    /// Writes the equilibration (row-major matrix, scaling vectors), the
    /// Cholesky lower factor (zeros when the handle is indirect), and the
    /// state into caller buffers. Returns the handle's structural flags.
    pub fn export_cache(
        &self,
        a_equil: &mut [f64],
        d: &mut [f64],
        e: &mut [f64],
        ata_chol: &mut [f64],
        state_buf: &mut [f64],
        rho: &mut f64,
    ) -> Result<SolverFlags, EngineError> {
        let (m, n) = (self.m, self.n);
        let k = m.min(n);
        if a_equil.len() != m * n || d.len() != m || e.len() != n || ata_chol.len() != k * k {
            return Err(EngineError::ShapeMismatch(
                "cache buffer lengths do not match problem shape".into(),
            ));
        }
        self.save_state(state_buf, rho)?;

        for i in 0..m {
            for j in 0..n {
                a_equil[i * n + j] = self.equil.a_equil[(i, j)];
            }
        }
        d.copy_from_slice(self.equil.d.as_slice());
        e.copy_from_slice(self.equil.e.as_slice());

        match self.projector.factor() {
            Some(l) => {
                for i in 0..k {
                    for j in 0..k {
                        ata_chol[i * k + j] = l[(i, j)];
                    }
                }
            }
            None => ata_chol.fill(0.0),
        }
        Ok(self.flags)
    }

    /// Consumes the handle. Returns the problem data when `destroy_data` is
    /// false and this handle still owns it (handles rebuilt from a cache do
    /// not).
    pub fn finish(self, destroy_data: bool) -> Option<ProblemData> {
        if destroy_data {
            None
        } else {
            self.data
        }
    }
}

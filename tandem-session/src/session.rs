//! Solver session lifecycle and orchestration.
//!
//! A [`SolverSession`] owns at most one live engine handle and walks it
//! through a fixed lifecycle: construct (or load from a persisted record),
//! any number of solves, optional state/cache export, close. Closing is
//! idempotent and also happens on drop, so a handle is released exactly
//! once on every exit path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tandem_core::{AdmmInfo, AdmmOutput, DenseSolver, ResidualSample, STATE_BLOCKS};

use crate::cache::SolverCache;
use crate::dense::{DenseProblem, ProblemVariant};
use crate::error::{SessionError, SessionResult};
use crate::layered::{CacheValue, DoubleLayeredCache, Record};
use crate::objective::ObjectiveVector;
use crate::output::{SolutionOutput, SolverDiagnostics};
use crate::persist;
use crate::runtime::Runtime;
use crate::settings::{SettingsUpdate, SolverSettings};
use crate::state::SolverState;

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Constructed without a handle (`no_init`).
    Uninitialized,
    /// Live handle built from problem data.
    Initialized,
    /// Live handle rebuilt from a persisted record.
    Loaded,
    /// Handle released; terminal.
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Initialized => "initialized",
            SessionStatus::Loaded => "loaded",
            SessionStatus::Closed => "closed",
        })
    }
}

/// Construction options for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Cholesky projection when set, conjugate gradient otherwise.
    pub direct: bool,
    /// Build no handle yet; the caller will `load` one.
    pub no_init: bool,
    /// Build the handle from this record instead of initializing.
    pub cache: Option<DoubleLayeredCache>,
    /// Honor a stored factorization when loading from a record.
    pub allow_cholesky: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            direct: true,
            no_init: false,
            cache: None,
            allow_cholesky: true,
        }
    }
}

/// Session over a dense problem matrix.
pub type DenseSession = SolverSession<DenseProblem>;

/// Orchestrates one engine handle across its whole lifecycle.
pub struct SolverSession<P: ProblemVariant> {
    problem: P,
    m: usize,
    n: usize,
    solver: Option<DenseSolver>,
    status: SessionStatus,
    f: ObjectiveVector,
    g: ObjectiveVector,
    settings: SolverSettings,
    diagnostics: SolverDiagnostics,
    output: SolutionOutput,
    cache_memo: Option<SolverCache>,
    first_run: bool,
    runtime: Arc<Runtime>,
}

impl<P: ProblemVariant> SolverSession<P> {
    /// Builds a session counted against the process-wide runtime.
    pub fn new(problem: P, options: SessionOptions) -> SessionResult<Self> {
        Self::with_runtime(problem, options, Runtime::global())
    }

    /// Builds a session counted against the given runtime.
    pub fn with_runtime(
        problem: P,
        options: SessionOptions,
        runtime: Arc<Runtime>,
    ) -> SessionResult<Self> {
        let (m, n) = problem.dims();
        let mut session = SolverSession {
            f: ObjectiveVector::new(m),
            g: ObjectiveVector::new(n),
            settings: SolverSettings::default(),
            diagnostics: SolverDiagnostics::default(),
            output: SolutionOutput::default(),
            cache_memo: None,
            solver: None,
            status: SessionStatus::Uninitialized,
            first_run: true,
            problem,
            m,
            n,
            runtime,
        };
        if let Some(record) = options.cache.clone() {
            session.load_record(record, options.allow_cholesky)?;
        } else if !options.no_init {
            let data = session.problem.build_data();
            let flags = session.problem.build_flags(&options);
            let solver = DenseSolver::init(data, flags)?;
            session.install_handle(solver, SessionStatus::Initialized);
        }
        Ok(session)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.m, self.n)
    }

    pub fn is_live(&self) -> bool {
        self.solver.is_some()
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Diagnostics of the most recent solve.
    pub fn diagnostics(&self) -> &SolverDiagnostics {
        &self.diagnostics
    }

    /// Solution vectors of the most recent solve.
    pub fn output(&self) -> &SolutionOutput {
        &self.output
    }

    /// True until the first successful solve on this session.
    pub fn first_run(&self) -> bool {
        self.first_run
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Iteration residuals of the last solve run with `diagnostic` set.
    pub fn residual_trace(&self) -> &[ResidualSample] {
        self.solver
            .as_ref()
            .map(|s| s.residual_trace())
            .unwrap_or(&[])
    }

    /// Validates and merges a settings patch.
    pub fn update_settings(&mut self, update: &SettingsUpdate) -> SessionResult<()> {
        update.apply(&mut self.settings, self.m, self.n)
    }

    /// Runs one solve with objectives `f` (rows) and `g` (columns).
    ///
    /// Dimension mismatches fail before anything reaches the engine. When
    /// the merged `reltol` is tighter than `1e-3` and this call's options
    /// leave `accelerate` unset, acceleration is switched on and
    /// `toladapt` relaxed to `1e-2`.
    pub fn solve(
        &mut self,
        f: &ObjectiveVector,
        g: &ObjectiveVector,
        options: &SettingsUpdate,
    ) -> SessionResult<()> {
        let Some(solver) = self.solver.as_mut() else {
            return Err(SessionError::State(
                "no solver initialized, solve() invalid".into(),
            ));
        };
        if f.len() != self.m || g.len() != self.n {
            return Err(SessionError::Validation(format!(
                "objectives sized ({}, {}) incompatible with solver dimensions ({}, {})",
                f.len(),
                g.len(),
                self.m,
                self.n
            )));
        }

        self.f.copy_from(f, 0, 0, None);
        self.g.copy_from(g, 0, 0, None);
        options.apply(&mut self.settings, self.m, self.n)?;
        if self.settings.reltol < 1e-3 && options.accelerate.is_none() {
            self.settings.accelerate = true;
            self.settings.toladapt = 1e-2;
        }

        let f_terms = self.f.terms();
        let g_terms = self.g.terms();
        let mut info = AdmmInfo::default();
        let mut raw = AdmmOutput::default();
        solver.solve(&f_terms, &g_terms, &self.settings, &mut info, &mut raw)?;

        self.diagnostics = SolverDiagnostics::from(&info);
        self.output = SolutionOutput::from(raw);
        self.first_run = false;
        Ok(())
    }

    /// Fresh iterate snapshot, re-queried from the handle on every call.
    pub fn state(&self) -> SessionResult<SolverState> {
        match self.solver.as_ref() {
            Some(solver) => SolverState::export(solver),
            None => Err(SessionError::State(
                "no solver built, state undefined".into(),
            )),
        }
    }

    /// Cache exported once per live handle and memoized. A handle loaded
    /// from a record keeps the supplied cache without re-exporting.
    pub fn cache(&mut self) -> SessionResult<&SolverCache> {
        let Some(solver) = self.solver.as_ref() else {
            return Err(SessionError::State(
                "no solver exists, cannot build cache".into(),
            ));
        };
        if self.cache_memo.is_none() {
            self.cache_memo = Some(Self::export_handle_cache(solver)?);
        }
        self.cache_memo.as_ref().ok_or_else(|| {
            SessionError::State("no solver exists, cannot build cache".into())
        })
    }

    fn export_handle_cache(solver: &DenseSolver) -> SessionResult<SolverCache> {
        let (m, n) = (solver.m(), solver.n());
        let mut cache = P::allocate_cache(m, n);
        let mut state = vec![0.0; solver.state_len()];
        let mut rho = 0.0;
        let flags = solver.export_cache(
            &mut cache.a_equil,
            &mut cache.d,
            &mut cache.e,
            &mut cache.ata_cholesky,
            &mut state,
            &mut rho,
        )?;
        cache.flags = flags;
        Ok(cache)
    }

    /// Rebuilds the handle from a persisted record file.
    ///
    /// A file that cannot be read or parsed loads as an empty record; the
    /// record extension is appended to the path when missing.
    pub fn load(&mut self, path: impl AsRef<Path>, allow_cholesky: bool) -> SessionResult<()> {
        let path = persist::with_record_extension(path.as_ref());
        let record = match persist::read_record(&path) {
            Some(map) => DoubleLayeredCache::from_archive(map),
            None => DoubleLayeredCache::new(),
        };
        self.load_record(record, allow_cholesky)
    }

    /// Rebuilds the handle from an in-memory record, discarding any live
    /// handle first. Closed is terminal: loading into a closed session is
    /// a state error.
    pub fn load_record(
        &mut self,
        record: DoubleLayeredCache,
        allow_cholesky: bool,
    ) -> SessionResult<()> {
        if self.status == SessionStatus::Closed {
            return Err(SessionError::State(
                "session closed, load() invalid".into(),
            ));
        }
        let cache = P::cache_from_record(self.m, self.n, &record, allow_cholesky)?;
        let state = SolverState::from_record(&record, STATE_BLOCKS * (self.m + self.n))?;
        let factor = cache
            .flags
            .factorized
            .then(|| cache.ata_cholesky.as_slice());
        let solver = DenseSolver::load_solver(
            &cache.a_equil,
            &cache.d,
            &cache.e,
            factor,
            &state.vec,
            state.rho,
            cache.flags,
        )?;
        self.install_handle(solver, SessionStatus::Loaded);
        self.cache_memo = Some(cache);
        Ok(())
    }

    /// Persists state plus, when requested, the cache into
    /// `directory/name` (record extension appended). Never overwrites:
    /// an existing target path is refused.
    pub fn save(
        &mut self,
        directory: impl AsRef<Path>,
        name: &str,
        save_equilibration: bool,
        save_factorization: bool,
    ) -> SessionResult<PathBuf> {
        if self.solver.is_none() {
            return Err(SessionError::Validation(
                "no solver initialized, save() invalid".into(),
            ));
        }
        let directory = directory.as_ref();
        let filename = persist::with_record_extension(&directory.join(name));
        if !directory.exists() {
            return Err(SessionError::Io(format!(
                "directory {} does not exist",
                directory.display()
            )));
        }
        if filename.exists() {
            return Err(SessionError::Validation(format!(
                "path {} already exists and would be overwritten",
                filename.display()
            )));
        }

        let state = self.state()?;
        let mut record = Record::new();
        record.insert("state".into(), CacheValue::Array(state.vec));
        record.insert("rho".into(), CacheValue::Scalar(state.rho));
        if save_equilibration {
            for (key, value) in self.cache()?.record_entries() {
                if !save_factorization && key == "ATA_cholesky" {
                    continue;
                }
                record.insert(key, value);
            }
        }
        persist::write_record(&filename, &record)?;
        Ok(filename)
    }

    /// Releases the handle. Safe to call repeatedly; later calls are
    /// no-ops.
    pub fn close(&mut self) {
        self.release_handle();
        self.status = SessionStatus::Closed;
    }

    fn install_handle(&mut self, solver: DenseSolver, status: SessionStatus) {
        self.release_handle();
        self.solver = Some(solver);
        self.runtime.register();
        self.status = status;
    }

    fn release_handle(&mut self) {
        if let Some(solver) = self.solver.take() {
            drop(solver.finish(false));
            self.runtime.unregister();
        }
        self.cache_memo = None;
    }
}

impl<P: ProblemVariant> Drop for SolverSession<P> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn small_problem() -> DenseProblem {
        DenseProblem::new(DMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 2.0]))
    }

    #[test]
    fn status_display_names() {
        assert_eq!(SessionStatus::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SessionStatus::Loaded.to_string(), "loaded");
    }

    #[test]
    fn no_init_session_has_no_handle() {
        let rt = Arc::new(Runtime::new());
        let options = SessionOptions {
            no_init: true,
            ..Default::default()
        };
        let session = DenseSession::with_runtime(small_problem(), options, Arc::clone(&rt)).unwrap();
        assert_eq!(session.status(), SessionStatus::Uninitialized);
        assert!(!session.is_live());
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn solve_without_handle_is_a_state_error() {
        let rt = Arc::new(Runtime::new());
        let options = SessionOptions {
            no_init: true,
            ..Default::default()
        };
        let mut session =
            DenseSession::with_runtime(small_problem(), options, rt).unwrap();
        let f = ObjectiveVector::new(2);
        let g = ObjectiveVector::new(2);
        let err = session.solve(&f, &g, &SettingsUpdate::default());
        assert!(matches!(err, Err(SessionError::State(_))));
    }

    #[test]
    fn close_is_idempotent_and_counted_once() {
        let rt = Arc::new(Runtime::new());
        let mut session = DenseSession::with_runtime(
            small_problem(),
            SessionOptions::default(),
            Arc::clone(&rt),
        )
        .unwrap();
        assert_eq!(session.status(), SessionStatus::Initialized);
        assert_eq!(rt.live_objects(), 1);

        session.close();
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(rt.live_objects(), 0);
        session.close();
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn drop_releases_the_handle() {
        let rt = Arc::new(Runtime::new());
        {
            let _session = DenseSession::with_runtime(
                small_problem(),
                SessionOptions::default(),
                Arc::clone(&rt),
            )
            .unwrap();
            assert_eq!(rt.live_objects(), 1);
        }
        assert_eq!(rt.live_objects(), 0);
    }
}

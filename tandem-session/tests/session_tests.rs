//! End-to-end tests for solver sessions: lifecycle, persistence, and the
//! settings heuristics.
//!
//! Each test states its problem up front and checks results against a
//! closed form or against a second, independently constructed session.

use std::fs;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tandem_session::{
    CacheValue, DenseProblem, DenseSession, DoubleLayeredCache, FieldUpdate, FunctionKind,
    ObjectiveVector, Param, Record, Runtime, SessionError, SessionOptions, SessionStatus,
    SettingsUpdate,
};

/// Deterministic well-conditioned 10x5 test matrix.
fn test_matrix() -> DMatrix<f64> {
    DMatrix::from_fn(10, 5, |i, j| {
        let t = (i * 5 + j) as f64;
        (0.7 * t + 0.3).sin() + if i % 5 == j { 3.0 } else { 0.0 }
    })
}

fn rhs() -> DVector<f64> {
    DVector::from_fn(10, |i, _| 1.0 + (i as f64 * 0.4).cos())
}

fn normal_equations_solution(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    (a.transpose() * a)
        .cholesky()
        .expect("test matrix must be full rank")
        .solve(&(a.transpose() * b))
}

/// `0.5 * sum (y_i - b_i)^2` as a row objective.
fn square_objective(b: &DVector<f64>) -> ObjectiveVector {
    ObjectiveVector::with_fields(
        b.len(),
        &FieldUpdate {
            h: Some(Param::Scalar(FunctionKind::Square.into())),
            b: Some(Param::Array(b.as_slice().to_vec())),
            ..Default::default()
        },
    )
    .expect("square objective")
}

fn tight() -> SettingsUpdate {
    SettingsUpdate {
        abstol: Some(1e-7),
        reltol: Some(1e-6),
        maxiter: Some(10_000),
        accelerate: Some(false),
        ..Default::default()
    }
}

fn least_squares_session() -> DenseSession {
    DenseSession::new(DenseProblem::new(test_matrix()), SessionOptions::default())
        .expect("session construction")
}

#[test]
fn least_squares_session_end_to_end() {
    // min 0.5*||y - b||^2  s.t.  y = A x
    let b = rhs();
    let exact = normal_equations_solution(&test_matrix(), &b);

    let mut session = least_squares_session();
    assert_eq!(session.status(), SessionStatus::Initialized);
    assert!(session.first_run());

    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);
    session.solve(&f, &g, &tight()).expect("solve failed");

    let diag = session.diagnostics();
    assert!(diag.converged, "no convergence in {} iterations", diag.iterations);
    assert_eq!(diag.err, 0);
    assert!(!session.first_run());

    let x = DVector::from_column_slice(&session.output().x);
    let err = (&x - &exact).norm() / exact.norm();
    assert!(err < 1e-3, "relative error {err}");

    // y must agree with A x in the original coordinates
    let y = DVector::from_column_slice(&session.output().y);
    assert!((test_matrix() * &x - &y).norm() < 1e-6 * y.norm().max(1.0));
}

#[test]
fn warm_start_speeds_up_the_second_solve() {
    let b = rhs();
    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);

    let mut session = least_squares_session();
    session.solve(&f, &g, &tight()).expect("first solve");
    let cold = session.diagnostics().iterations;

    // handle state persists, so the repeat starts at the solution
    session.solve(&f, &g, &tight()).expect("second solve");
    let warm = session.diagnostics().iterations;

    assert!(session.diagnostics().converged);
    assert!(
        warm <= cold,
        "warm start took {warm} iterations, cold start {cold}"
    );
}

#[test]
fn tight_reltol_switches_on_acceleration() {
    let b = rhs();
    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);

    let mut session = least_squares_session();
    let options = SettingsUpdate {
        reltol: Some(1e-5),
        maxiter: Some(10_000),
        ..Default::default()
    };
    session.solve(&f, &g, &options).expect("solve failed");
    assert!(session.settings().accelerate);
    assert_eq!(session.settings().toladapt, 1e-2);
    assert_eq!(session.settings().reltol, 1e-5);

    // an explicit accelerate choice in the same call wins over the
    // heuristic, and toladapt keeps its default
    let mut pinned = least_squares_session();
    let options = SettingsUpdate {
        reltol: Some(1e-5),
        maxiter: Some(10_000),
        accelerate: Some(false),
        ..Default::default()
    };
    pinned.solve(&f, &g, &options).expect("solve failed");
    assert!(!pinned.settings().accelerate);
    assert_eq!(pinned.settings().toladapt, 1e-3);
}

#[test]
fn objective_dimension_mismatch_fails_before_the_engine() {
    let mut session = least_squares_session();
    let before = session.diagnostics().clone();

    let short_f = ObjectiveVector::new(9);
    let g = ObjectiveVector::new(5);
    let err = session.solve(&short_f, &g, &tight());
    assert!(matches!(err, Err(SessionError::Validation(_))));

    // nothing reached the engine and the handle is still usable
    assert_eq!(session.diagnostics(), &before);
    assert!(session.is_live());
    let f = square_objective(&rhs());
    session.solve(&f, &g, &tight()).expect("solve after rejection");
    assert!(session.diagnostics().converged);
}

#[test]
fn save_refuses_missing_directory_and_collisions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = least_squares_session();

    let path = session
        .save(dir.path(), "run", true, true)
        .expect("first save");
    assert_eq!(path, dir.path().join("run.json"));
    assert!(path.exists());

    let collision = session.save(dir.path(), "run", true, true);
    assert!(matches!(collision, Err(SessionError::Validation(_))));

    let missing = session.save(dir.path().join("not_there"), "run", true, true);
    assert!(matches!(missing, Err(SessionError::Io(_))));
}

#[test]
fn record_round_trips_through_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let b = rhs();
    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);

    let mut original = least_squares_session();
    original.solve(&f, &g, &tight()).expect("solve failed");
    let state_before = original.state().expect("state export");
    let x_before = original.output().x.clone();
    let path = original
        .save(dir.path(), "trained", true, true)
        .expect("save failed");

    let mut reloaded = DenseSession::new(
        DenseProblem::new(test_matrix()),
        SessionOptions {
            no_init: true,
            ..Default::default()
        },
    )
    .expect("session construction");
    reloaded.load(&path, true).expect("load failed");
    assert_eq!(reloaded.status(), SessionStatus::Loaded);

    // state survives the JSON round trip bit for bit
    let state_after = reloaded.state().expect("state export");
    assert_eq!(state_after.vec, state_before.vec);
    assert_eq!(state_after.rho, state_before.rho);

    // the loaded handle keeps the supplied cache, factorization included
    let cache = reloaded.cache().expect("cache");
    assert!(cache.flags.factorized);
    assert_eq!(cache.dims(), (10, 5));

    reloaded.solve(&f, &g, &tight()).expect("solve after load");
    assert!(reloaded.diagnostics().converged);
    let x_after = DVector::from_column_slice(&reloaded.output().x);
    let x_before = DVector::from_column_slice(&x_before);
    assert!((&x_after - &x_before).norm() < 1e-4 * x_before.norm().max(1.0));
}

#[test]
fn stripped_factorization_is_rebuilt_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let b = rhs();
    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);

    let mut original = least_squares_session();
    original.solve(&f, &g, &tight()).expect("solve failed");
    let x_before = DVector::from_column_slice(&original.output().x);
    let path = original
        .save(dir.path(), "lean", true, false)
        .expect("save failed");

    let mut reloaded = DenseSession::new(
        DenseProblem::new(test_matrix()),
        SessionOptions {
            no_init: true,
            ..Default::default()
        },
    )
    .expect("session construction");
    reloaded.load(&path, true).expect("load failed");

    // the record carried no factor, so the load recomputed one
    let cache = reloaded.cache().expect("cache");
    assert!(!cache.flags.factorized);
    assert!(cache.ata_cholesky.iter().all(|&v| v == 0.0));

    reloaded.solve(&f, &g, &tight()).expect("solve after load");
    assert!(reloaded.diagnostics().converged);
    let x_after = DVector::from_column_slice(&reloaded.output().x);
    assert!((&x_after - &x_before).norm() < 1e-4 * x_before.norm().max(1.0));
}

#[test]
fn unreadable_record_loads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let garbage = dir.path().join("broken.json");
    fs::write(&garbage, "definitely not a record {{{").expect("write garbage");

    let small = DMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 2.0]);
    let mut session = DenseSession::new(
        DenseProblem::new(small),
        SessionOptions {
            no_init: true,
            ..Default::default()
        },
    )
    .expect("session construction");

    session.load(&garbage, true).expect("garbage load");
    assert_eq!(session.status(), SessionStatus::Loaded);
    assert!(session.is_live());
    let cache = session.cache().expect("cache");
    assert!(cache.a_equil.iter().all(|&v| v == 0.0));

    // a path that does not exist falls back the same way
    session
        .load(dir.path().join("never_written"), true)
        .expect("missing-file load");
    assert_eq!(session.status(), SessionStatus::Loaded);
}

#[test]
fn record_from_a_different_problem_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let b = rhs();
    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);

    // state-only record from a 10x5 problem, 90-entry iterate
    let mut original = least_squares_session();
    original.solve(&f, &g, &tight()).expect("solve failed");
    let path = original
        .save(dir.path(), "tall", false, false)
        .expect("save failed");

    // a 2x2 session needs a 24-entry iterate; the mismatch must surface
    // instead of loading a clipped state
    let small = DMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 2.0]);
    let mut session = DenseSession::new(DenseProblem::new(small), SessionOptions::default())
        .expect("session construction");
    let err = session.load(&path, true);
    assert!(matches!(err, Err(SessionError::Validation(_))));

    // the failed load leaves the previous handle installed
    assert_eq!(session.status(), SessionStatus::Initialized);
    assert!(session.is_live());
}

#[test]
fn load_replaces_the_handle_in_the_runtime_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rt = Arc::new(Runtime::new());

    let mut session = DenseSession::with_runtime(
        DenseProblem::new(test_matrix()),
        SessionOptions::default(),
        Arc::clone(&rt),
    )
    .expect("session construction");
    assert_eq!(rt.live_objects(), 1);

    let path = session
        .save(dir.path(), "swap", true, true)
        .expect("save failed");

    // loading swaps the handle without leaking the old one
    session.load(&path, true).expect("load failed");
    assert_eq!(rt.live_objects(), 1);
    assert_eq!(session.status(), SessionStatus::Loaded);

    session.close();
    assert_eq!(rt.live_objects(), 0);
    session.close();
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn closed_session_refuses_to_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rt = Arc::new(Runtime::new());

    let mut session = DenseSession::with_runtime(
        DenseProblem::new(test_matrix()),
        SessionOptions::default(),
        Arc::clone(&rt),
    )
    .expect("session construction");
    let path = session
        .save(dir.path(), "final", true, true)
        .expect("save failed");

    session.close();
    assert_eq!(session.status(), SessionStatus::Closed);
    assert_eq!(rt.live_objects(), 0);

    // closed is terminal: no handle comes back
    let err = session.load(&path, true);
    assert!(matches!(err, Err(SessionError::State(_))));
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(!session.is_live());
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn cache_option_builds_a_loaded_session() {
    let b = rhs();
    let f = square_objective(&b);
    let g = ObjectiveVector::new(5);

    let mut original = least_squares_session();
    original.solve(&f, &g, &tight()).expect("solve failed");

    let mut archive = Record::new();
    let state = original.state().expect("state export");
    archive.insert("state".into(), CacheValue::Array(state.vec));
    archive.insert("rho".into(), CacheValue::Scalar(state.rho));
    for (key, value) in original.cache().expect("cache").record_entries() {
        archive.insert(key, value);
    }

    let mut twin = DenseSession::new(
        DenseProblem::new(test_matrix()),
        SessionOptions {
            cache: Some(DoubleLayeredCache::from_archive(archive)),
            ..Default::default()
        },
    )
    .expect("session from cache");
    assert_eq!(twin.status(), SessionStatus::Loaded);

    twin.solve(&f, &g, &tight()).expect("solve failed");
    assert!(twin.diagnostics().converged);
    let x_twin = DVector::from_column_slice(&twin.output().x);
    let x_orig = DVector::from_column_slice(&original.output().x);
    assert!((&x_twin - &x_orig).norm() < 1e-4 * x_orig.norm().max(1.0));
}

//! Validated description of one separable objective block.
//!
//! An [`ObjectiveVector`] holds seven parallel arrays: the function kind
//! `h` and the coefficients `a, b, c, d, e, s` of each scalar term
//! `c * h(a*x - b) + d*x + (e/2) x^2`. All writes go through [`set`] or
//! [`copy_from`], which keep the arrays in lockstep: a request either
//! validates completely and lands on every selected entry, or changes
//! nothing.
//!
//! [`set`]: ObjectiveVector::set
//! [`copy_from`]: ObjectiveVector::copy_from

use tandem_core::{FunctionKind, FunctionTerm};

use crate::error::{SessionError, SessionResult};

/// Function kind given as the engine's integer code or as a name.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionToken {
    Code(i64),
    Name(String),
}

impl FunctionToken {
    pub fn resolve(&self) -> SessionResult<FunctionKind> {
        match self {
            FunctionToken::Code(code) => FunctionKind::from_code(*code).ok_or_else(|| {
                SessionError::Validation(format!("unknown function code {code}"))
            }),
            FunctionToken::Name(name) => FunctionKind::from_name(name).ok_or_else(|| {
                SessionError::Validation(format!("unknown function name {name:?}"))
            }),
        }
    }
}

impl From<i64> for FunctionToken {
    fn from(code: i64) -> Self {
        FunctionToken::Code(code)
    }
}

impl From<&str> for FunctionToken {
    fn from(name: &str) -> Self {
        FunctionToken::Name(name.to_string())
    }
}

impl From<FunctionKind> for FunctionToken {
    fn from(kind: FunctionKind) -> Self {
        FunctionToken::Code(kind.code() as i64)
    }
}

/// One value broadcast across the selected entries, or one value per entry.
#[derive(Debug, Clone)]
pub enum Param<T> {
    Scalar(T),
    Array(Vec<T>),
}

impl<T: Clone> Param<T> {
    /// Expands to exactly `len` values, or fails on a length mismatch.
    fn expand(&self, len: usize, field: &str) -> SessionResult<Vec<T>> {
        match self {
            Param::Scalar(v) => Ok(vec![v.clone(); len]),
            Param::Array(vals) if vals.len() == len => Ok(vals.clone()),
            Param::Array(vals) => Err(SessionError::Validation(format!(
                "field {field:?} has {} values for an index range of length {len}",
                vals.len()
            ))),
        }
    }
}

/// Entry selection for [`ObjectiveVector::set`]. Negative range bounds
/// wrap from the end.
#[derive(Debug, Clone)]
pub enum IndexSpan {
    All,
    Range { start: isize, end: isize },
    Indices(Vec<usize>),
}

impl IndexSpan {
    fn resolve(&self, n: usize) -> SessionResult<Vec<usize>> {
        let indices = match self {
            IndexSpan::All => (0..n).collect::<Vec<_>>(),
            IndexSpan::Range { start, end } => {
                let wrap = |i: isize| if i < 0 { i + n as isize } else { i };
                let (start, end) = (wrap(*start), wrap(*end));
                if start < 0 || end > n as isize || start >= end {
                    return Err(SessionError::Validation(format!(
                        "index range {start}..{end} invalid for {n} entries"
                    )));
                }
                (start as usize..end as usize).collect()
            }
            IndexSpan::Indices(idx) => {
                if let Some(&bad) = idx.iter().find(|&&i| i >= n) {
                    return Err(SessionError::Validation(format!(
                        "index {bad} out of bounds for {n} entries"
                    )));
                }
                idx.clone()
            }
        };
        if indices.is_empty() {
            return Err(SessionError::Validation(
                "requested index range is empty".into(),
            ));
        }
        Ok(indices)
    }
}

/// Per-field values for one [`ObjectiveVector::set`] call. Unset fields
/// are left alone.
#[derive(Debug, Clone, Default)]
pub struct FieldUpdate {
    pub h: Option<Param<FunctionToken>>,
    pub a: Option<Param<f64>>,
    pub b: Option<Param<f64>>,
    pub c: Option<Param<f64>>,
    pub d: Option<Param<f64>>,
    pub e: Option<Param<f64>>,
    pub s: Option<Param<f64>>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.h.is_none()
            && self.a.is_none()
            && self.b.is_none()
            && self.c.is_none()
            && self.d.is_none()
            && self.e.is_none()
            && self.s.is_none()
    }
}

/// Separable objective over `n` components.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveVector {
    h: Vec<FunctionKind>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
    e: Vec<f64>,
    s: Vec<f64>,
}

impl ObjectiveVector {
    /// `n` default terms: `h = Zero`, `a = c = s = 1`, `b = d = e = 0`.
    pub fn new(n: usize) -> Self {
        ObjectiveVector {
            h: vec![FunctionKind::Zero; n],
            a: vec![1.0; n],
            b: vec![0.0; n],
            c: vec![1.0; n],
            d: vec![0.0; n],
            e: vec![0.0; n],
            s: vec![1.0; n],
        }
    }

    /// `new(n)` followed by a full-range `set` of the supplied fields.
    pub fn with_fields(n: usize, update: &FieldUpdate) -> SessionResult<Self> {
        let mut obj = ObjectiveVector::new(n);
        obj.set(&IndexSpan::All, update)?;
        Ok(obj)
    }

    /// `new(n)` followed by a full `copy_from` of `source`.
    pub fn from_source(n: usize, source: &ObjectiveVector) -> Self {
        let mut obj = ObjectiveVector::new(n);
        obj.copy_from(source, 0, 0, None);
        obj
    }

    pub fn len(&self) -> usize {
        self.h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    pub fn h(&self) -> &[FunctionKind] {
        &self.h
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn c(&self) -> &[f64] {
        &self.c
    }

    pub fn d(&self) -> &[f64] {
        &self.d
    }

    pub fn e(&self) -> &[f64] {
        &self.e
    }

    pub fn s(&self) -> &[f64] {
        &self.s
    }

    /// The engine representation, one term per component.
    pub fn terms(&self) -> Vec<FunctionTerm> {
        (0..self.len())
            .map(|i| FunctionTerm {
                kind: self.h[i],
                a: self.a[i],
                b: self.b[i],
                c: self.c[i],
                d: self.d[i],
                e: self.e[i],
                s: self.s[i],
            })
            .collect()
    }

    /// Sum of the per-component terms at `x`. Zero when this vector has no
    /// components.
    pub fn evaluate(&self, x: &[f64]) -> SessionResult<f64> {
        if self.is_empty() {
            return Ok(0.0);
        }
        if x.len() != self.len() {
            return Err(SessionError::Validation(format!(
                "argument has {} entries, objective has {}",
                x.len(),
                self.len()
            )));
        }
        Ok(self
            .terms()
            .iter()
            .zip(x)
            .map(|(t, &xi)| t.eval(xi))
            .sum())
    }

    /// Copies entries from `source`, field by field. Start positions are
    /// clamped into their valid ranges and the count shrinks to what fits,
    /// so entries outside the copied span are never touched.
    pub fn copy_from(
        &mut self,
        source: &ObjectiveVector,
        target_start: usize,
        source_start: usize,
        count: Option<usize>,
    ) {
        if self.is_empty() {
            return;
        }
        let ss = source_start.min(source.len());
        let ts = target_start.min(self.len());
        let available = source.len() - ss;
        let wanted = count.map_or(available, |c| c.min(available));
        let take = wanted.min(self.len() - ts);

        self.h[ts..ts + take].copy_from_slice(&source.h[ss..ss + take]);
        self.a[ts..ts + take].copy_from_slice(&source.a[ss..ss + take]);
        self.b[ts..ts + take].copy_from_slice(&source.b[ss..ss + take]);
        self.c[ts..ts + take].copy_from_slice(&source.c[ss..ss + take]);
        self.d[ts..ts + take].copy_from_slice(&source.d[ss..ss + take]);
        self.e[ts..ts + take].copy_from_slice(&source.e[ss..ss + take]);
        self.s[ts..ts + take].copy_from_slice(&source.s[ss..ss + take]);
    }

    /// Writes the supplied fields over the selected entries.
    ///
    /// The whole request validates before anything is written: bad tokens,
    /// out-of-bounds indices, and wrong-length value arrays all fail with
    /// the vector unchanged. A call on a zero-size vector does nothing.
    pub fn set(&mut self, span: &IndexSpan, update: &FieldUpdate) -> SessionResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let indices = span.resolve(self.len())?;
        let len = indices.len();

        let kinds = match &update.h {
            Some(param) => {
                let tokens = param.expand(len, "h")?;
                let mut kinds = Vec::with_capacity(len);
                for token in &tokens {
                    kinds.push(token.resolve()?);
                }
                Some(kinds)
            }
            None => None,
        };
        let a = update.a.as_ref().map(|p| p.expand(len, "a")).transpose()?;
        let b = update.b.as_ref().map(|p| p.expand(len, "b")).transpose()?;
        let c = update.c.as_ref().map(|p| p.expand(len, "c")).transpose()?;
        let d = update.d.as_ref().map(|p| p.expand(len, "d")).transpose()?;
        let e = update.e.as_ref().map(|p| p.expand(len, "e")).transpose()?;
        let s = update.s.as_ref().map(|p| p.expand(len, "s")).transpose()?;

        for (slot, &i) in indices.iter().enumerate() {
            if let Some(kinds) = &kinds {
                self.h[i] = kinds[slot];
            }
            if let Some(vals) = &a {
                self.a[i] = vals[slot];
            }
            if let Some(vals) = &b {
                self.b[i] = vals[slot];
            }
            if let Some(vals) = &c {
                self.c[i] = vals[slot];
            }
            if let Some(vals) = &d {
                self.d[i] = vals[slot];
            }
            if let Some(vals) = &e {
                self.e[i] = vals[slot];
            }
            if let Some(vals) = &s {
                self.s[i] = vals[slot];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_evaluates_to_zero() {
        let obj = ObjectiveVector::new(0);
        assert_eq!(obj.evaluate(&[]).unwrap(), 0.0);
        // even against a nonempty argument
        assert_eq!(obj.evaluate(&[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn defaults_match_documentation() {
        let obj = ObjectiveVector::new(3);
        assert!(obj.h().iter().all(|&k| k == FunctionKind::Zero));
        assert_eq!(obj.a(), &[1.0; 3]);
        assert_eq!(obj.b(), &[0.0; 3]);
        assert_eq!(obj.c(), &[1.0; 3]);
        assert_eq!(obj.s(), &[1.0; 3]);
    }

    #[test]
    fn set_accepts_codes_and_names() {
        let mut obj = ObjectiveVector::new(4);
        obj.set(
            &IndexSpan::All,
            &FieldUpdate {
                h: Some(Param::Scalar("square".into())),
                b: Some(Param::Array(vec![1.0, 2.0, 3.0, 4.0])),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(obj.h().iter().all(|&k| k == FunctionKind::Square));
        assert_eq!(obj.b(), &[1.0, 2.0, 3.0, 4.0]);

        let code = FunctionKind::Abs.code() as i64;
        obj.set(
            &IndexSpan::Range { start: 1, end: 3 },
            &FieldUpdate {
                h: Some(Param::Scalar(FunctionToken::Code(code))),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            obj.h(),
            &[
                FunctionKind::Square,
                FunctionKind::Abs,
                FunctionKind::Abs,
                FunctionKind::Square
            ]
        );
    }

    #[test]
    fn negative_range_bounds_wrap() {
        let mut obj = ObjectiveVector::new(5);
        obj.set(
            &IndexSpan::Range { start: -2, end: 5 },
            &FieldUpdate {
                d: Some(Param::Scalar(7.0)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(obj.d(), &[0.0, 0.0, 0.0, 7.0, 7.0]);
    }

    #[test]
    fn wrong_length_array_mutates_nothing() {
        let mut obj = ObjectiveVector::new(4);
        let before = obj.clone();
        let err = obj.set(
            &IndexSpan::All,
            &FieldUpdate {
                b: Some(Param::Array(vec![1.0, 2.0])),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(SessionError::Validation(_))));
        assert_eq!(obj, before);
    }

    #[test]
    fn any_invalid_field_blocks_the_whole_call() {
        let mut obj = ObjectiveVector::new(3);
        let before = obj.clone();
        // h is fine, but the c array is too short: nothing may change
        let err = obj.set(
            &IndexSpan::All,
            &FieldUpdate {
                h: Some(Param::Scalar("abs".into())),
                c: Some(Param::Array(vec![1.0])),
                ..Default::default()
            },
        );
        assert!(err.is_err());
        assert_eq!(obj, before);

        let err = obj.set(
            &IndexSpan::All,
            &FieldUpdate {
                h: Some(Param::Scalar("not_a_function".into())),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(SessionError::Validation(_))));
        assert_eq!(obj, before);
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut obj = ObjectiveVector::new(3);
        let err = obj.set(
            &IndexSpan::Range { start: 1, end: 1 },
            &FieldUpdate {
                d: Some(Param::Scalar(1.0)),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(SessionError::Validation(_))));
    }

    #[test]
    fn copy_from_leaves_outside_entries_alone() {
        let mut target = ObjectiveVector::new(5);
        let source = ObjectiveVector::with_fields(
            3,
            &FieldUpdate {
                h: Some(Param::Scalar("abs".into())),
                b: Some(Param::Array(vec![10.0, 20.0, 30.0])),
                ..Default::default()
            },
        )
        .unwrap();

        target.copy_from(&source, 1, 1, Some(2));
        assert_eq!(target.b(), &[0.0, 20.0, 30.0, 0.0, 0.0]);
        assert_eq!(target.h()[0], FunctionKind::Zero);
        assert_eq!(target.h()[1], FunctionKind::Abs);
        assert_eq!(target.h()[2], FunctionKind::Abs);
        assert_eq!(target.h()[3], FunctionKind::Zero);
    }

    #[test]
    fn from_source_copies_what_fits() {
        let source = ObjectiveVector::with_fields(
            2,
            &FieldUpdate {
                h: Some(Param::Scalar("abs".into())),
                d: Some(Param::Scalar(3.0)),
                ..Default::default()
            },
        )
        .unwrap();

        let obj = ObjectiveVector::from_source(4, &source);
        assert_eq!(obj.len(), 4);
        assert_eq!(obj.d(), &[3.0, 3.0, 0.0, 0.0]);
        assert_eq!(obj.h()[1], FunctionKind::Abs);
        assert_eq!(obj.h()[2], FunctionKind::Zero);
    }

    #[test]
    fn copy_from_clamps_out_of_range_starts() {
        let mut target = ObjectiveVector::new(2);
        let source = ObjectiveVector::with_fields(
            4,
            &FieldUpdate {
                b: Some(Param::Scalar(5.0)),
                ..Default::default()
            },
        )
        .unwrap();

        // source_start beyond source: nothing to copy
        let before = target.clone();
        target.copy_from(&source, 0, 10, None);
        assert_eq!(target, before);

        // count larger than the target clips to what fits
        target.copy_from(&source, 1, 0, Some(4));
        assert_eq!(target.b(), &[0.0, 5.0]);
    }

    #[test]
    fn evaluate_matches_term_formula() {
        // c*h(a*x - b) + d*x + (e/2)x^2 with h = square, h(u) = u^2/2
        let obj = ObjectiveVector::with_fields(
            2,
            &FieldUpdate {
                h: Some(Param::Scalar("square".into())),
                a: Some(Param::Scalar(2.0)),
                b: Some(Param::Scalar(1.0)),
                c: Some(Param::Scalar(3.0)),
                d: Some(Param::Scalar(0.5)),
                e: Some(Param::Scalar(4.0)),
                ..Default::default()
            },
        )
        .unwrap();
        let x = [1.0, -1.0];
        let expect: f64 = x
            .iter()
            .map(|&xi| {
                let u: f64 = 2.0 * xi - 1.0;
                3.0 * 0.5 * u * u + 0.5 * xi + 2.0 * xi * xi
            })
            .sum();
        let got = obj.evaluate(&x).unwrap();
        assert!((got - expect).abs() < 1e-12, "{got} vs {expect}");
    }
}

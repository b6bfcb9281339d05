//! Separable function terms and their proximal operators.
//!
//! An objective block is a sum of scalar terms, one per component:
//!
//! ```text
//!     term(x) = c * h(a*x - b) + d*x + (e/2) * x^2
//! ```
//!
//! where `h` is one of the enumerated kinds below and `s` weights the
//! negative branch of the asymmetric square. The proximal operator of a full
//! term reduces to the prox of the bare kind `h` through the substitution
//! `u = a*x - b` after completing the square on the smooth part, which is
//! how the solver only ever needs the kind-level proxes implemented here.

use std::fmt;

/// Scalar function kinds, with their stable integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionKind {
    /// h(x) = 0
    #[default]
    Zero = 0,
    /// h(x) = |x|
    Abs = 1,
    /// h(x) = exp(x)
    Exp = 2,
    /// h(x) = huber(x): x^2/2 for |x| <= 1, |x| - 1/2 beyond
    Huber = 3,
    /// h(x) = x
    Identity = 4,
    /// h(x) = I(0 <= x <= 1)
    IndBox01 = 5,
    /// h(x) = I(x = 0)
    IndEq0 = 6,
    /// h(x) = I(x >= 0)
    IndGe0 = 7,
    /// h(x) = I(x <= 0)
    IndLe0 = 8,
    /// h(x) = log(1 + exp(x))
    Logistic = 9,
    /// h(x) = max(-x, 0)
    MaxNeg0 = 10,
    /// h(x) = max(x, 0)
    MaxPos0 = 11,
    /// h(x) = x log(x)
    NegEntr = 12,
    /// h(x) = -log(x)
    NegLog = 13,
    /// h(x) = 1/x
    Recipr = 14,
    /// h(x) = x^2/2
    Square = 15,
    /// h(x) = x^2/2 for x >= 0, s*x^2/2 for x < 0
    AsymmSquare = 16,
}

impl FunctionKind {
    /// All kinds, in code order.
    pub const ALL: [FunctionKind; 17] = [
        FunctionKind::Zero,
        FunctionKind::Abs,
        FunctionKind::Exp,
        FunctionKind::Huber,
        FunctionKind::Identity,
        FunctionKind::IndBox01,
        FunctionKind::IndEq0,
        FunctionKind::IndGe0,
        FunctionKind::IndLe0,
        FunctionKind::Logistic,
        FunctionKind::MaxNeg0,
        FunctionKind::MaxPos0,
        FunctionKind::NegEntr,
        FunctionKind::NegLog,
        FunctionKind::Recipr,
        FunctionKind::Square,
        FunctionKind::AsymmSquare,
    ];

    /// Parses the stable integer code.
    pub fn from_code(code: i64) -> Option<FunctionKind> {
        if (0..=16).contains(&code) {
            Some(Self::ALL[code as usize])
        } else {
            None
        }
    }

    /// Parses a kind name, case-insensitively.
    pub fn from_name(name: &str) -> Option<FunctionKind> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Stable integer code of this kind.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Canonical name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            FunctionKind::Zero => "Zero",
            FunctionKind::Abs => "Abs",
            FunctionKind::Exp => "Exp",
            FunctionKind::Huber => "Huber",
            FunctionKind::Identity => "Identity",
            FunctionKind::IndBox01 => "IndBox01",
            FunctionKind::IndEq0 => "IndEq0",
            FunctionKind::IndGe0 => "IndGe0",
            FunctionKind::IndLe0 => "IndLe0",
            FunctionKind::Logistic => "Logistic",
            FunctionKind::MaxNeg0 => "MaxNeg0",
            FunctionKind::MaxPos0 => "MaxPos0",
            FunctionKind::NegEntr => "NegEntr",
            FunctionKind::NegLog => "NegLog",
            FunctionKind::Recipr => "Recipr",
            FunctionKind::Square => "Square",
            FunctionKind::AsymmSquare => "AsymmSquare",
        }
    }

    /// Evaluates the bare kind at `x`. Indicators evaluate to zero on their
    /// domain, following the reference catalogue; `NegLog` and `Recipr` are
    /// infinite off their domain.
    pub fn eval(self, x: f64, s: f64) -> f64 {
        match self {
            FunctionKind::Zero
            | FunctionKind::IndBox01
            | FunctionKind::IndEq0
            | FunctionKind::IndGe0
            | FunctionKind::IndLe0 => 0.0,
            FunctionKind::Abs => x.abs(),
            FunctionKind::Exp => x.exp(),
            FunctionKind::Huber => {
                if x.abs() <= 1.0 {
                    0.5 * x * x
                } else {
                    x.abs() - 0.5
                }
            }
            FunctionKind::Identity => x,
            FunctionKind::Logistic => {
                // log(1 + e^x), stable for large |x|
                if x > 30.0 {
                    x
                } else {
                    x.exp().ln_1p()
                }
            }
            FunctionKind::MaxNeg0 => (-x).max(0.0),
            FunctionKind::MaxPos0 => x.max(0.0),
            FunctionKind::NegEntr => {
                if x > 0.0 {
                    x * x.ln()
                } else {
                    0.0
                }
            }
            FunctionKind::NegLog => {
                if x > 0.0 {
                    -x.ln()
                } else {
                    f64::INFINITY
                }
            }
            FunctionKind::Recipr => {
                if x > 0.0 {
                    1.0 / x
                } else {
                    f64::INFINITY
                }
            }
            FunctionKind::Square => 0.5 * x * x,
            FunctionKind::AsymmSquare => {
                if x >= 0.0 {
                    0.5 * x * x
                } else {
                    0.5 * s * x * x
                }
            }
        }
    }

    /// Proximal operator of the bare kind:
    /// `argmin_x h(x) + (rho/2) (x - v)^2` with `rho > 0`.
    pub fn prox(self, v: f64, rho: f64, s: f64) -> f64 {
        let k = 1.0 / rho;
        match self {
            FunctionKind::Zero => v,
            FunctionKind::Abs => {
                if v > k {
                    v - k
                } else if v < -k {
                    v + k
                } else {
                    0.0
                }
            }
            FunctionKind::Exp => prox_exp(v, rho),
            FunctionKind::Huber => {
                if v.abs() <= 1.0 + k {
                    rho * v / (1.0 + rho)
                } else {
                    v - k * v.signum()
                }
            }
            FunctionKind::Identity => v - k,
            FunctionKind::IndBox01 => v.clamp(0.0, 1.0),
            FunctionKind::IndEq0 => 0.0,
            FunctionKind::IndGe0 => v.max(0.0),
            FunctionKind::IndLe0 => v.min(0.0),
            FunctionKind::Logistic => prox_logistic(v, rho),
            FunctionKind::MaxNeg0 => {
                if v + k < 0.0 {
                    v + k
                } else if v < 0.0 {
                    0.0
                } else {
                    v
                }
            }
            FunctionKind::MaxPos0 => {
                if v > k {
                    v - k
                } else if v > 0.0 {
                    0.0
                } else {
                    v
                }
            }
            FunctionKind::NegEntr => prox_negentr(v, rho),
            FunctionKind::NegLog => 0.5 * (v + (v * v + 4.0 * k).sqrt()),
            FunctionKind::Recipr => prox_recipr(v, rho),
            FunctionKind::Square => rho * v / (1.0 + rho),
            FunctionKind::AsymmSquare => {
                if v >= 0.0 {
                    rho * v / (1.0 + rho)
                } else {
                    rho * v / (s + rho)
                }
            }
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const NEWTON_ITERS: usize = 50;
const NEWTON_TOL: f64 = 1e-12;

fn exp_clamped(x: f64) -> f64 {
    x.min(700.0).exp()
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1.0 + ex)
    }
}

/// Solves `x + exp(x)/rho = v` by Newton iteration.
fn prox_exp(v: f64, rho: f64) -> f64 {
    let mut x = v.min(0.0);
    for _ in 0..NEWTON_ITERS {
        let ex = exp_clamped(x) / rho;
        let g = x + ex - v;
        let step = g / (1.0 + ex);
        x -= step;
        if step.abs() <= NEWTON_TOL * x.abs().max(1.0) {
            break;
        }
    }
    x
}

/// Solves `rho (x - v) + sigmoid(x) = 0` by Newton iteration.
fn prox_logistic(v: f64, rho: f64) -> f64 {
    let mut x = v;
    for _ in 0..NEWTON_ITERS {
        let sig = sigmoid(x);
        let g = rho * (x - v) + sig;
        let step = g / (rho + sig * (1.0 - sig));
        x -= step;
        if step.abs() <= NEWTON_TOL * x.abs().max(1.0) {
            break;
        }
    }
    x
}

/// Solves `ln(x) + 1 + rho (x - v) = 0` over `x > 0` by guarded Newton.
fn prox_negentr(v: f64, rho: f64) -> f64 {
    let mut x = v.max(1e-6);
    for _ in 0..NEWTON_ITERS {
        let g = x.ln() + 1.0 + rho * (x - v);
        let step = g / (1.0 / x + rho);
        let next = x - step;
        x = if next > 0.0 { next } else { 0.5 * x };
        if step.abs() <= NEWTON_TOL * x.max(1.0) {
            break;
        }
    }
    x
}

/// Solves `rho (x - v) - 1/x^2 = 0` over `x > 0` by guarded Newton.
fn prox_recipr(v: f64, rho: f64) -> f64 {
    let mut x = v.max((1.0 / rho).cbrt());
    for _ in 0..NEWTON_ITERS {
        let g = rho * (x - v) - 1.0 / (x * x);
        let step = g / (rho + 2.0 / (x * x * x));
        let next = x - step;
        x = if next > 0.0 { next } else { 0.5 * x };
        if step.abs() <= NEWTON_TOL * x.max(1.0) {
            break;
        }
    }
    x
}

/// One scalar term of a separable objective block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionTerm {
    pub kind: FunctionKind,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub s: f64,
}

impl Default for FunctionTerm {
    fn default() -> Self {
        FunctionTerm {
            kind: FunctionKind::Zero,
            a: 1.0,
            b: 0.0,
            c: 1.0,
            d: 0.0,
            e: 0.0,
            s: 1.0,
        }
    }
}

impl FunctionTerm {
    /// A term of the given kind with default coefficients.
    pub fn new(kind: FunctionKind) -> Self {
        FunctionTerm {
            kind,
            ..Default::default()
        }
    }

    /// Evaluates `c * h(a*x - b) + d*x + (e/2) x^2`.
    pub fn eval(&self, x: f64) -> f64 {
        self.c * self.kind.eval(self.a * x - self.b, self.s) + self.d * x + 0.5 * self.e * x * x
    }

    /// Proximal operator of the full term:
    /// `argmin_x c*h(a*x - b) + d*x + (e/2) x^2 + (rho/2)(x - v)^2`.
    pub fn prox(&self, v: f64, rho: f64) -> f64 {
        // With a == 0 or c <= 0 the h part carries no curvature; only the
        // quadratic remainder is minimized.
        if self.a == 0.0 || self.c <= 0.0 {
            return (rho * v - self.d) / (self.e + rho);
        }
        let v2 = (rho * v - self.d) / (self.e + rho);
        let rho2 = (self.e + rho) / (self.c * self.a * self.a);
        let u = self.kind.prox(self.a * v2 - self.b, rho2, self.s);
        (u + self.b) / self.a
    }
}

/// Sum of term evaluations over a component vector.
pub fn eval_terms(terms: &[FunctionTerm], x: &[f64]) -> f64 {
    terms.iter().zip(x).map(|(t, &xi)| t.eval(xi)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_names_round_trip() {
        for kind in FunctionKind::ALL {
            assert_eq!(FunctionKind::from_code(kind.code() as i64), Some(kind));
            assert_eq!(FunctionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(FunctionKind::from_name("square"), Some(FunctionKind::Square));
        assert_eq!(FunctionKind::from_name("ABS"), Some(FunctionKind::Abs));
        assert_eq!(FunctionKind::from_name("NotAFunction"), None);
        assert_eq!(FunctionKind::from_code(17), None);
        assert_eq!(FunctionKind::from_code(-1), None);
    }

    #[test]
    fn abs_prox_is_soft_threshold() {
        let k = FunctionKind::Abs;
        assert_eq!(k.prox(3.0, 2.0, 1.0), 2.5);
        assert_eq!(k.prox(-3.0, 2.0, 1.0), -2.5);
        assert_eq!(k.prox(0.3, 2.0, 1.0), 0.0);
    }

    #[test]
    fn square_prox_shrinks() {
        let k = FunctionKind::Square;
        // argmin x^2/2 + (rho/2)(x-v)^2 = rho v / (1 + rho)
        let rho = 4.0;
        let v = 2.0;
        assert!((k.prox(v, rho, 1.0) - rho * v / (1.0 + rho)).abs() < 1e-14);
    }

    #[test]
    fn indicator_proxes_clamp() {
        assert_eq!(FunctionKind::IndGe0.prox(-2.0, 1.0, 1.0), 0.0);
        assert_eq!(FunctionKind::IndLe0.prox(2.0, 1.0, 1.0), 0.0);
        assert_eq!(FunctionKind::IndBox01.prox(1.5, 1.0, 1.0), 1.0);
        assert_eq!(FunctionKind::IndBox01.prox(-0.5, 1.0, 1.0), 0.0);
        assert_eq!(FunctionKind::IndEq0.prox(7.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn neglog_prox_satisfies_optimality() {
        for &v in &[-3.0, -0.5, 0.0, 0.7, 4.0] {
            for &rho in &[0.1, 1.0, 10.0] {
                let x = FunctionKind::NegLog.prox(v, rho, 1.0);
                assert!(x > 0.0);
                let grad = -1.0 / x + rho * (x - v);
                assert!(grad.abs() < 1e-9, "v={v} rho={rho} grad={grad}");
            }
        }
    }

    #[test]
    fn newton_proxes_satisfy_optimality() {
        for &v in &[-2.0, -0.1, 0.0, 0.4, 3.0] {
            for &rho in &[0.5, 1.0, 8.0] {
                let x = FunctionKind::Exp.prox(v, rho, 1.0);
                assert!((x + x.exp() / rho - v).abs() < 1e-8);

                let x = FunctionKind::Logistic.prox(v, rho, 1.0);
                assert!((rho * (x - v) + sigmoid(x)).abs() < 1e-8);

                let x = FunctionKind::NegEntr.prox(v, rho, 1.0);
                assert!(x > 0.0);
                assert!((x.ln() + 1.0 + rho * (x - v)).abs() < 1e-7);

                let x = FunctionKind::Recipr.prox(v, rho, 1.0);
                assert!(x > 0.0);
                assert!((rho * (x - v) - 1.0 / (x * x)).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn term_prox_is_a_local_minimum() {
        let cases = [
            FunctionTerm {
                kind: FunctionKind::Square,
                a: 2.0,
                b: 0.5,
                c: 1.5,
                d: 0.2,
                e: 0.3,
                s: 1.0,
            },
            FunctionTerm {
                kind: FunctionKind::Abs,
                a: 1.0,
                b: -1.0,
                c: 2.0,
                d: 0.0,
                e: 0.1,
                s: 1.0,
            },
            FunctionTerm {
                kind: FunctionKind::Huber,
                a: 0.7,
                b: 0.0,
                c: 1.0,
                d: -0.4,
                e: 0.0,
                s: 1.0,
            },
            FunctionTerm {
                kind: FunctionKind::AsymmSquare,
                a: 1.0,
                b: 0.0,
                c: 1.0,
                d: 0.0,
                e: 0.0,
                s: 4.0,
            },
        ];
        let objective =
            |t: &FunctionTerm, x: f64, v: f64, rho: f64| t.eval(x) + 0.5 * rho * (x - v) * (x - v);
        for term in &cases {
            for &v in &[-1.5, 0.0, 2.0] {
                for &rho in &[0.5, 2.0] {
                    let x = term.prox(v, rho);
                    let fx = objective(term, x, v, rho);
                    for &delta in &[1e-4, -1e-4] {
                        assert!(
                            fx <= objective(term, x + delta, v, rho) + 1e-10,
                            "kind={:?} v={v} rho={rho}",
                            term.kind
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn degenerate_scale_falls_back_to_quadratic() {
        let term = FunctionTerm {
            kind: FunctionKind::Abs,
            a: 0.0,
            d: 1.0,
            e: 3.0,
            ..Default::default()
        };
        let rho = 2.0;
        let v = 1.0;
        // argmin d x + (e/2) x^2 + (rho/2)(x - v)^2
        assert!((term.prox(v, rho) - (rho * v - 1.0) / (3.0 + rho)).abs() < 1e-14);
    }

    #[test]
    fn eval_matches_formula() {
        let term = FunctionTerm {
            kind: FunctionKind::Square,
            a: 2.0,
            b: 1.0,
            c: 3.0,
            d: 0.5,
            e: 0.2,
            s: 1.0,
        };
        let x = 1.7;
        let u = 2.0 * x - 1.0;
        let expected = 3.0 * 0.5 * u * u + 0.5 * x + 0.1 * x * x;
        assert!((term.eval(x) - expected).abs() < 1e-12);
    }

    #[test]
    fn eval_terms_sums_componentwise() {
        let terms = vec![FunctionTerm::new(FunctionKind::Abs); 3];
        assert!((eval_terms(&terms, &[1.0, -2.0, 3.0]) - 6.0).abs() < 1e-14);
        assert_eq!(eval_terms(&[], &[]), 0.0);
    }
}

//! Limited-memory BFGS minimizer.
//!
//! ## Algorithm
//!
//! ```text
//! d_k   = -H_k ∇f(x_k)            two-loop recursion over the last m (s, y) pairs
//! x_k+1 = x_k + α d_k             α from backtracking until Armijo holds:
//!                                 f(x + α d) <= f(x) + c₁ α ∇f·d
//! s_k   = x_k+1 - x_k
//! y_k   = ∇f(x_k+1) - ∇f(x_k)     pair kept only when s·y > 0 (curvature)
//! ```
//!
//! Every accepted step satisfies Armijo with a descent direction, so the
//! objective never increases between reported iterations.
//!
//! ## Termination
//!
//! | Reason            | Condition                                        |
//! |-------------------|--------------------------------------------------|
//! | Converged         | ‖∇f‖ / max(1, ‖x‖) < epsilon                     |
//! | MaxIterations     | iteration cap reached                            |
//! | LineSearchFailed  | no step length satisfied Armijo                  |

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::TrainingError;

/// Value-and-gradient callback.
pub trait Objective {
    /// Evaluate `f(x)`, writing `∇f(x)` into `gradient`.
    fn evaluate(&mut self, x: &[f64], gradient: &mut [f64]) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbfgsConfig {
    /// Number of (s, y) correction pairs kept
    pub memory: usize,
    pub max_iterations: usize,
    /// Relative gradient-norm convergence threshold
    pub epsilon: f64,
    /// Backtracking halvings allowed per iteration
    pub max_line_search: usize,
    /// Armijo sufficient-decrease constant
    pub armijo: f64,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            memory: 6,
            max_iterations: 100,
            epsilon: 1e-5,
            max_line_search: 40,
            armijo: 1e-4,
        }
    }
}

/// State after one accepted step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationReport {
    pub iteration: usize,
    pub value: f64,
    pub gradient_norm: f64,
    pub x_norm: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    MaxIterations,
    LineSearchFailed,
}

#[derive(Debug, Clone)]
pub struct LbfgsResult {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: Vec<IterationReport>,
    pub termination: Termination,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Search direction `-H g` from the stored corrections.
fn two_loop(gradient: &[f64], history: &VecDeque<Correction>) -> Vec<f64> {
    let mut q = gradient.to_vec();
    let mut alphas = Vec::with_capacity(history.len());

    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        for (qi, yi) in q.iter_mut().zip(&c.y) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
    }

    let gamma = history
        .back()
        .map(|c| dot(&c.s, &c.y) / dot(&c.y, &c.y))
        .unwrap_or(1.0);
    for qi in q.iter_mut() {
        *qi *= gamma;
    }

    for (c, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        for (qi, si) in q.iter_mut().zip(&c.s) {
            *qi += si * (alpha - beta);
        }
    }

    q.iter_mut().for_each(|v| *v = -*v);
    q
}

/// Minimize `objective` from `x0`, calling `on_iteration` after every
/// accepted step.
///
/// Fails only when the starting point itself evaluates to a non-finite value.
pub fn minimize<O, F>(
    objective: &mut O,
    x0: Vec<f64>,
    config: &LbfgsConfig,
    mut on_iteration: F,
) -> Result<LbfgsResult, TrainingError>
where
    O: Objective,
    F: FnMut(&IterationReport),
{
    let n = x0.len();
    let mut x = x0;
    let mut g = vec![0.0; n];
    let mut f = objective.evaluate(&x, &mut g);
    if !f.is_finite() || g.iter().any(|v| !v.is_finite()) {
        return Err(TrainingError::Diverged {
            iteration: 0,
            reason: format!("objective is {} at the starting point", f),
        });
    }

    let mut history: VecDeque<Correction> = VecDeque::with_capacity(config.memory);
    let mut iterations = Vec::new();
    let mut x_new = vec![0.0; n];
    let mut g_new = vec![0.0; n];

    let termination = loop {
        let g_norm = norm(&g);
        if g_norm / norm(&x).max(1.0) < config.epsilon {
            break Termination::Converged;
        }
        if iterations.len() >= config.max_iterations {
            break Termination::MaxIterations;
        }

        let mut d = two_loop(&g, &history);
        let mut slope = dot(&g, &d);
        if slope >= 0.0 {
            // Stale curvature; restart from steepest descent
            history.clear();
            d = g.iter().map(|v| -v).collect();
            slope = -g_norm * g_norm;
        }

        let mut step = if history.is_empty() {
            1.0 / g_norm.max(1.0)
        } else {
            1.0
        };
        let mut accepted = None;
        for _ in 0..config.max_line_search {
            for i in 0..n {
                x_new[i] = x[i] + step * d[i];
            }
            let f_new = objective.evaluate(&x_new, &mut g_new);
            if f_new.is_finite() && f_new <= f + config.armijo * step * slope {
                accepted = Some(f_new);
                break;
            }
            step *= 0.5;
        }
        let Some(f_new) = accepted else {
            break Termination::LineSearchFailed;
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if history.len() == config.memory.max(1) {
                history.pop_front();
            }
            history.push_back(Correction { s, y, rho: 1.0 / sy });
        }

        std::mem::swap(&mut x, &mut x_new);
        std::mem::swap(&mut g, &mut g_new);
        f = f_new;

        let report = IterationReport {
            iteration: iterations.len() + 1,
            value: f,
            gradient_norm: norm(&g),
            x_norm: norm(&x),
            step,
        };
        on_iteration(&report);
        iterations.push(report);
    };

    Ok(LbfgsResult {
        x,
        value: f,
        iterations,
        termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = Σ (i+1) (x_i - 1)^2
    struct Quadratic;

    impl Objective for Quadratic {
        fn evaluate(&mut self, x: &[f64], gradient: &mut [f64]) -> f64 {
            let mut f = 0.0;
            for (i, (xi, gi)) in x.iter().zip(gradient.iter_mut()).enumerate() {
                let c = (i + 1) as f64;
                f += c * (xi - 1.0).powi(2);
                *gi = 2.0 * c * (xi - 1.0);
            }
            f
        }
    }

    /// Classic banana function.
    struct Rosenbrock;

    impl Objective for Rosenbrock {
        fn evaluate(&mut self, x: &[f64], gradient: &mut [f64]) -> f64 {
            let (a, b) = (x[0], x[1]);
            gradient[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
            gradient[1] = 200.0 * (b - a * a);
            (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
        }
    }

    #[test]
    fn test_quadratic_converges() {
        let result = minimize(&mut Quadratic, vec![0.0; 5], &LbfgsConfig::default(), |_| {}).unwrap();
        assert_eq!(result.termination, Termination::Converged);
        for xi in &result.x {
            assert!((xi - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_rosenbrock_monotone() {
        let config = LbfgsConfig {
            max_iterations: 500,
            ..LbfgsConfig::default()
        };
        let mut seen = Vec::new();
        let result = minimize(&mut Rosenbrock, vec![-1.2, 1.0], &config, |r| seen.push(r.value)).unwrap();
        assert!(result.value < 1e-6);
        for pair in seen.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_non_finite_start_is_error() {
        struct Broken;
        impl Objective for Broken {
            fn evaluate(&mut self, _: &[f64], _: &mut [f64]) -> f64 {
                f64::NAN
            }
        }
        let err = minimize(&mut Broken, vec![0.0], &LbfgsConfig::default(), |_| {}).unwrap_err();
        assert!(matches!(err, TrainingError::Diverged { iteration: 0, .. }));
    }
}

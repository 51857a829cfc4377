//! Limited-memory BFGS with box constraints.
//!
//! Search directions come from the usual two-loop recursion over the last
//! `history` correction pairs. Variables sitting on a bound whose gradient
//! points out of the box are frozen for the step, and every trial point is
//! projected back into the box before it is evaluated.

use std::collections::VecDeque;

use tracing::{debug, info, instrument};

use crate::NetworkError;

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-20;

#[derive(Debug, Clone)]
pub struct LbfgsbOptions {
    /// Lower and upper bound shared by every variable.
    pub bounds: Option<(f64, f64)>,
    /// Number of correction pairs kept (`m`).
    pub history: usize,
    /// Stop when the relative function decrease falls below `factr * f64::EPSILON`.
    pub factr: f64,
    /// Stop when the largest projected gradient component falls below this.
    pub pgtol: f64,
    pub max_fun: usize,
    pub max_iter: usize,
    /// Log per-iteration progress.
    pub disp: bool,
}

impl Default for LbfgsbOptions {
    fn default() -> Self {
        Self {
            bounds: None,
            history: 10,
            factr: 1e7,
            pgtol: 1e-5,
            max_fun: 15000,
            max_iter: 15000,
            disp: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ProjectedGradient,
    RelativeReduction,
    MaxFunctionEvaluations,
    MaxIterations,
    LineSearch,
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub f: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Minimizes `objective`, which writes the gradient at `x` into its second
/// argument and returns the function value.
#[instrument(skip(objective, x0), fields(n = x0.len()), level = "trace")]
pub fn minimize<F>(
    mut objective: F,
    x0: Vec<f64>,
    options: &LbfgsbOptions,
) -> Result<Minimum, NetworkError>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0;
    project(&mut x, options.bounds);

    let mut g = vec![0.0; n];
    let mut f = evaluate(&mut objective, &x, &mut g)?;
    let mut evaluations = 1;
    let mut history: VecDeque<Correction> = VecDeque::with_capacity(options.history);

    let mut iterations = 0;
    let termination = loop {
        let pg_norm = projected_gradient_norm(&x, &g, options.bounds);
        if options.disp {
            debug!(iteration = iterations, f, pg_norm, "l-bfgs-b iteration");
        }
        if pg_norm <= options.pgtol {
            break Termination::ProjectedGradient;
        }
        if iterations >= options.max_iter {
            break Termination::MaxIterations;
        }
        if evaluations >= options.max_fun {
            break Termination::MaxFunctionEvaluations;
        }

        let frozen = frozen_variables(&x, &g, options.bounds);
        let mut d = two_loop(&g, &history);
        mask(&mut d, &frozen);
        if dot(&d, &g) >= 0.0 {
            history.clear();
            d = g.iter().map(|v| -v).collect();
            mask(&mut d, &frozen);
        }

        let mut step = if history.is_empty() {
            (1.0 / norm(&d)).min(1.0)
        } else {
            1.0
        };

        let mut x_new = vec![0.0; n];
        let mut g_new = vec![0.0; n];
        let f_new = loop {
            for i in 0..n {
                x_new[i] = x[i] + step * d[i];
            }
            project(&mut x_new, options.bounds);

            let trial = evaluate(&mut objective, &x_new, &mut g_new)?;
            evaluations += 1;

            let decrease: f64 = (0..n).map(|i| g[i] * (x_new[i] - x[i])).sum();
            if trial <= f + ARMIJO * decrease {
                break Some(trial);
            }
            step *= 0.5;
            if step < MIN_STEP || evaluations >= options.max_fun {
                break None;
            }
        };

        let Some(f_new) = f_new else {
            break if evaluations >= options.max_fun {
                Termination::MaxFunctionEvaluations
            } else {
                Termination::LineSearch
            };
        };
        iterations += 1;

        let s: Vec<f64> = (0..n).map(|i| x_new[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| g_new[i] - g[i]).collect();
        let sy = dot(&s, &y);
        if sy > f64::EPSILON * dot(&y, &y) {
            if history.len() == options.history {
                history.pop_front();
            }
            if options.history > 0 {
                history.push_back(Correction { s, y, rho: 1.0 / sy });
            }
        }

        let reduction = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
        std::mem::swap(&mut x, &mut x_new);
        std::mem::swap(&mut g, &mut g_new);
        f = f_new;

        if reduction <= options.factr * f64::EPSILON {
            break Termination::RelativeReduction;
        }
    };

    if options.disp {
        info!(f, iterations, evaluations, ?termination, "l-bfgs-b finished");
    }

    Ok(Minimum {
        x,
        f,
        iterations,
        evaluations,
        termination,
    })
}

fn evaluate<F>(objective: &mut F, x: &[f64], g: &mut [f64]) -> Result<f64, NetworkError>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let f = objective(x, g);
    if !f.is_finite() {
        return Err(NetworkError::Optimizer(format!("objective evaluated to {f}")));
    }
    if g.iter().any(|v| !v.is_finite()) {
        return Err(NetworkError::Optimizer("non-finite gradient".to_string()));
    }
    Ok(f)
}

fn two_loop(g: &[f64], history: &VecDeque<Correction>) -> Vec<f64> {
    let mut q: Vec<f64> = g.iter().map(|v| -v).collect();
    let mut alphas = Vec::with_capacity(history.len());

    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        for (qi, yi) in q.iter_mut().zip(&c.y) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
    }

    if let Some(last) = history.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        q.iter_mut().for_each(|qi| *qi *= gamma);
    }

    for (c, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        for (qi, si) in q.iter_mut().zip(&c.s) {
            *qi += (alpha - beta) * si;
        }
    }

    q
}

fn project(x: &mut [f64], bounds: Option<(f64, f64)>) {
    if let Some((lo, hi)) = bounds {
        x.iter_mut().for_each(|v| *v = v.clamp(lo, hi));
    }
}

fn frozen_variables(x: &[f64], g: &[f64], bounds: Option<(f64, f64)>) -> Vec<bool> {
    match bounds {
        None => vec![false; x.len()],
        Some((lo, hi)) => x
            .iter()
            .zip(g)
            .map(|(&xi, &gi)| (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0))
            .collect(),
    }
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: Option<(f64, f64)>) -> f64 {
    let mut x_step = x.to_vec();
    for (xi, gi) in x_step.iter_mut().zip(g) {
        *xi -= gi;
    }
    project(&mut x_step, bounds);

    x.iter()
        .zip(&x_step)
        .fold(0.0, |acc: f64, (a, b)| acc.max((a - b).abs()))
}

fn mask(d: &mut [f64], frozen: &[bool]) {
    for (di, &fixed) in d.iter_mut().zip(frozen) {
        if fixed {
            *di = 0.0;
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

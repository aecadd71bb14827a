// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Metropolis random walk over the search domain.
//!
//! The walk runs in three phases counted in accepted samples: learning
//! (annealed acceptance, fixed step), equilibration (step adapted to the
//! spread of the accepted samples) and saving (every `skip`-th sample after
//! `start_save` is kept). Proposals leaving the domain are clipped to it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tracing::{debug, warn};

use crate::config::MetropolisParams;
use crate::error::{LocateError, Result};
use crate::geometry::{SearchGrid, Vec3};
use crate::misfit::{CellInfo, Evaluation};
use crate::search::{Objective, ScatterSample, SearchOutcome, SearchStats};
use crate::stats::{weighted_moments, RunningVariance};

struct Walk<'a, O: Objective> {
    grid: &'a SearchGrid,
    params: &'a MetropolisParams,
    objective: &'a O,
    scratch: O::Scratch,
    rng: ChaCha8Rng,
    current: Vec3,
    current_eval: Evaluation,
    best: (Vec3, Evaluation),
    step: f64,
    step_scale: f64,
    spread: RunningVariance,
    samples: Vec<ScatterSample>,
    stats: SearchStats,
}

impl<'a, O: Objective> Walk<'a, O> {
    fn temperature(&self) -> f64 {
        let learn = self.params.learn;
        if self.stats.accepted >= learn || learn == 0 {
            return 1.0;
        }
        let t0 = self.params.initial_temperature;
        t0 + (1.0 - t0) * self.stats.accepted as f64 / learn as f64
    }

    fn propose(&mut self) -> Vec3 {
        let dir = loop {
            let d = Vec3::new(
                self.rng.sample(StandardNormal),
                self.rng.sample(StandardNormal),
                self.rng.sample(StandardNormal),
            );
            let n = d.norm();
            if n > 0.0 {
                break d * (1.0 / n);
            }
        };
        let (p, clipped) = self.grid.clip(self.current + dir * (self.step * self.step_scale));
        if clipped {
            self.stats.clipped += 1;
        }
        p
    }

    fn accept(&mut self, p: Vec3, eval: Evaluation) -> Result<()> {
        let params = self.params;
        self.current = p;
        self.current_eval = eval;
        self.stats.accepted += 1;
        let n = self.stats.accepted;
        self.spread.push(p);
        if eval.ln_prob > self.best.1.ln_prob {
            self.best = (p, eval);
        }

        if n > params.learn && n <= params.learn + params.equil {
            if let Some(v) = self.spread.variance() {
                let scale = (v.x * v.y * v.z).max(0.0).powf(1.0 / 6.0);
                self.step = (params.step_fact * scale).max(params.step_min);
            }
        }
        if n > params.start_save && (n - params.start_save) % params.skip.max(1) == 0 {
            self.samples.push(ScatterSample {
                position: p,
                ln_prob: eval.ln_prob,
            });
        }
        if n == params.learn.max(1) {
            let floor = params.prob_min.ln();
            debug!(best_ln_prob = self.best.1.ln_prob, step = self.step, "learning phase complete");
            if self.best.1.ln_prob < floor {
                return Err(LocateError::LikelihoodBelowFloor {
                    best: self.best.1.ln_prob.exp(),
                    floor: params.prob_min,
                });
            }
        }
        Ok(())
    }
}

fn initial_step(grid: &SearchGrid, params: &MetropolisParams) -> f64 {
    if params.step_init > 0.0 {
        return params.step_init;
    }
    let e = grid.extent();
    (e.x + e.y + e.z) / 12.0
}

/// Run the walk from the domain center with a seeded generator.
///
/// # Errors
/// - `NoValidSamples` if the start point cannot be scored
/// - `LikelihoodBelowFloor` if the best sample after learning is below
///   `prob_min`
/// - `MetropolisRetriesExceeded` if the retry ceiling is hit with no
///   recovery left
pub fn run<O: Objective>(
    grid: &SearchGrid,
    params: &MetropolisParams,
    objective: &O,
    seed: u64,
) -> Result<SearchOutcome> {
    let start = grid.center();
    let mut scratch = objective.scratch();
    let start_eval = objective
        .evaluate(start, &CellInfo::POINT, &mut scratch)
        .ok_or(LocateError::NoValidSamples { evaluated: 1 })?;

    let mut walk = Walk {
        grid,
        params,
        objective,
        scratch,
        rng: ChaCha8Rng::seed_from_u64(seed),
        current: start,
        current_eval: start_eval,
        best: (start, start_eval),
        step: initial_step(grid, params),
        step_scale: 1.0,
        spread: RunningVariance::default(),
        samples: Vec::new(),
        stats: SearchStats {
            evaluated: 1,
            ..Default::default()
        },
    };

    let mut tries = 0usize;
    let mut last_valid: Option<(Vec3, Evaluation)> = None;
    while walk.stats.accepted < params.num_samples {
        let p = walk.propose();
        walk.stats.evaluated += 1;
        match walk.objective.evaluate(p, &CellInfo::POINT, &mut walk.scratch) {
            None => walk.stats.rejected += 1,
            Some(eval) => {
                let delta = (eval.ln_prob - walk.current_eval.ln_prob) / walk.temperature();
                if delta >= 0.0 || walk.rng.gen::<f64>().ln() < delta {
                    walk.accept(p, eval)?;
                    tries = 0;
                    last_valid = None;
                    continue;
                }
                last_valid = Some((p, eval));
            }
        }

        tries += 1;
        if tries < params.max_retries {
            continue;
        }
        if walk.stats.accepted < params.learn && walk.step * 0.5 >= params.step_min {
            walk.step *= 0.5;
            debug!(step = walk.step, "retry ceiling during learning, halving step");
            tries = 0;
        } else if walk.stats.accepted >= params.learn
            && walk.stats.forced_accepts < params.max_forced_accepts
            && last_valid.is_some()
        {
            if let Some((p, eval)) = last_valid.take() {
                warn!(
                    accepted = walk.stats.accepted,
                    "retry ceiling reached, forcing acceptance"
                );
                walk.stats.forced_accepts += 1;
                walk.step_scale *= 0.5;
                walk.accept(p, eval)?;
                tries = 0;
            }
        } else {
            return Err(LocateError::MetropolisRetriesExceeded {
                tries,
                accepted: walk.stats.accepted,
            });
        }
    }

    debug!(
        accepted = walk.stats.accepted,
        evaluated = walk.stats.evaluated,
        clipped = walk.stats.clipped,
        saved = walk.samples.len(),
        "metropolis walk complete"
    );

    let moments = weighted_moments(walk.samples.iter().map(|s| (s.position, 1.0)));
    let (best, best_eval) = walk.best;
    Ok(SearchOutcome {
        best,
        best_eval,
        samples: walk.samples,
        stats: walk.stats,
        moments,
        boundary_tolerance: grid.spacing * 0.5,
        pdf_grid: None,
        octree: None,
    })
}

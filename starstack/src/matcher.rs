//! Translation estimation between two source catalogs.
//!
//! Every reference/target tracker pair closer than `dmax` proposes a
//! translation `target - reference`. Proposals vote into a 2D histogram with
//! `bin_size` cells. The winning cell gives a coarse translation, which is
//! refined by averaging every proposal within `residual_factor * fwhm` of it.
//! Refinement makes the result insensitive to a cluster straddling a bin edge.

use std::collections::BTreeMap;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Catalog;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error(
        "no consensus translation: {reference_trackers} reference and {target_trackers} \
         target trackers produced no pair within {dmax} px"
    )]
    NoConsensus {
        reference_trackers: usize,
        target_trackers: usize,
        dmax: f64,
    },

    #[error("invalid match parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Largest pair distance considered, in pixels
    pub dmax: f64,
    /// Vote histogram cell width, in pixels
    pub bin_size: f64,
    /// Source FWHM, scales the refinement tolerance
    pub fwhm: f64,
    /// Refinement accepts pairs within `residual_factor * fwhm` of the coarse translation
    pub residual_factor: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            dmax: 50.0,
            bin_size: 0.5,
            fwhm: 3.0,
            residual_factor: 0.5,
        }
    }
}

impl MatchParams {
    pub fn validate(&self) -> Result<(), MatchError> {
        let checks = [
            ("dmax", self.dmax),
            ("bin_size", self.bin_size),
            ("fwhm", self.fwhm),
            ("residual_factor", self.residual_factor),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(MatchError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    pub fn tolerance(&self) -> f64 {
        self.residual_factor * self.fwhm
    }
}

/// Estimated translation of a target frame relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
    /// Votes in the winning histogram cell
    pub votes: usize,
    /// Pairs averaged into the refined translation
    pub pairs: usize,
    /// Mean distance of the refined pairs from the returned translation.
    /// `None` when a single pair defines the offset.
    pub mean_residual: Option<f64>,
}

/// One proposed translation from a reference/target tracker pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub reference: usize,
    pub target: usize,
    pub translation: Vector2<f64>,
}

/// A histogram cell and the candidates that voted for it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VoteBin {
    pub index: (i64, i64),
    pub members: Vec<usize>,
    pub mean_translation: Vector2<f64>,
    pub mean_residual: f64,
}

impl VoteBin {
    pub fn votes(&self) -> usize {
        self.members.len()
    }
}

fn mean_translation<'a>(translations: impl Iterator<Item = &'a Vector2<f64>>) -> Vector2<f64> {
    let (sum, n) = translations.fold((Vector2::<f64>::zeros(), 0usize), |(sum, n), t| (sum + t, n + 1));
    if n == 0 {
        sum
    } else {
        sum / n as f64
    }
}

fn mean_residual<'a>(translations: impl Iterator<Item = &'a Vector2<f64>>, center: &Vector2<f64>) -> f64 {
    let (sum, n) = translations.fold((0.0, 0usize), |(sum, n), t| (sum + (t - center).norm(), n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub(crate) fn collect_candidates(
    reference: &[Vector2<f64>],
    target: &[Vector2<f64>],
    dmax: f64,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (ri, r) in reference.iter().enumerate() {
        for (ti, t) in target.iter().enumerate() {
            let translation = t - r;
            if translation.norm() <= dmax {
                candidates.push(Candidate {
                    reference: ri,
                    target: ti,
                    translation,
                });
            }
        }
    }
    candidates
}

/// Bin candidates into `bin_size` cells, ordered by cell index.
pub(crate) fn tally_votes(candidates: &[Candidate], bin_size: f64) -> Vec<VoteBin> {
    let mut cells: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let index = (
            (candidate.translation.x / bin_size).floor() as i64,
            (candidate.translation.y / bin_size).floor() as i64,
        );
        cells.entry(index).or_default().push(i);
    }

    cells
        .into_iter()
        .map(|(index, members)| {
            let translations = || members.iter().map(|&i| &candidates[i].translation);
            let mean = mean_translation(translations());
            let residual = mean_residual(translations(), &mean);
            VoteBin {
                index,
                members,
                mean_translation: mean,
                mean_residual: residual,
            }
        })
        .collect()
}

/// Most votes wins, then the tighter cell, then the smaller cell index.
pub(crate) fn select_winner(bins: &[VoteBin]) -> Option<&VoteBin> {
    let mut winner: Option<&VoteBin> = None;
    for bin in bins {
        let better = match winner {
            None => true,
            Some(best) => {
                bin.votes() > best.votes()
                    || (bin.votes() == best.votes() && bin.mean_residual < best.mean_residual)
                    || (bin.votes() == best.votes()
                        && bin.mean_residual == best.mean_residual
                        && bin.index < best.index)
            }
        };
        if better {
            winner = Some(bin);
        }
    }
    winner
}

/// Translation of `target` relative to `reference`, from their tracker subsets.
pub fn match_catalogs(reference: &Catalog, target: &Catalog, params: &MatchParams) -> Result<Offset, MatchError> {
    params.validate()?;

    let reference_points: Vec<Vector2<f64>> = reference.trackers().iter().map(|s| s.position()).collect();
    let target_points: Vec<Vector2<f64>> = target.trackers().iter().map(|s| s.position()).collect();

    let no_consensus = || MatchError::NoConsensus {
        reference_trackers: reference_points.len(),
        target_trackers: target_points.len(),
        dmax: params.dmax,
    };

    let candidates = collect_candidates(&reference_points, &target_points, params.dmax);
    let bins = tally_votes(&candidates, params.bin_size);
    let winner = select_winner(&bins).ok_or_else(no_consensus)?;

    let coarse = winner.mean_translation;
    let tolerance = params.tolerance();
    let mut refined: Vec<&Vector2<f64>> = candidates
        .iter()
        .map(|c| &c.translation)
        .filter(|t| (*t - coarse).norm() < tolerance)
        .collect();
    if refined.is_empty() {
        refined = winner.members.iter().map(|&i| &candidates[i].translation).collect();
    }

    let translation = mean_translation(refined.iter().copied());
    let mean_residual = (refined.len() > 1).then(|| mean_residual(refined.iter().copied(), &translation));

    log::trace!(
        "{} -> {}: {} candidates in {} cells, winner {:?} with {} votes, {} pairs refined",
        reference.frame_id(),
        target.frame_id(),
        candidates.len(),
        bins.len(),
        winner.index,
        winner.votes(),
        refined.len(),
    );

    Ok(Offset {
        dx: translation.x,
        dy: translation.y,
        votes: winner.votes(),
        pairs: refined.len(),
        mean_residual,
    })
}

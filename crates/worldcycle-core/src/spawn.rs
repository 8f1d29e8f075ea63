//! Safe-spawn search
//!
//! Scans outward from a starting column in square rings and scores every
//! column that passes the hazard filter:
//! - the top block must be solid ground (no liquid, leaves, ice, falling or
//!   damaging blocks, no void)
//! - the two blocks above it must be air
//!
//! Passing columns start at 100 and lose points for nearby liquids, rough
//! terrain and standing heights outside the preferred band. The search is
//! deterministic: the same terrain and start always give the same result.

use glam::{IVec2, IVec3};

use crate::config::SpawnSearchConfig;
use crate::host::{Block, BlockQuery};
use crate::spiral::RingPerimeter;

/// Half-width of the neighbourhood inspected around a candidate (5x5)
const NEIGHBOURHOOD: i32 = 2;

const WATER_PENALTY: i32 = 5;
const LAVA_PENALTY: i32 = 15;
const ROUGH_TERRAIN_PENALTY: i32 = 20;
const HEIGHT_PENALTY: i32 = 15;
const MAX_HEIGHT_RANGE: i32 = 3;

/// A standing position and how safe it looks (0..=100)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnCandidate {
    /// Block the player's feet occupy (one above the ground block)
    pub position: IVec3,
    pub score: u8,
}

/// Find the best spawn position near `start`
///
/// Always returns a position. If no column within `max_radius` passes the
/// hazard filter, the result stands on top of the start column with score 0.
pub fn find_safe_spawn(
    world: &dyn BlockQuery,
    start: IVec3,
    config: &SpawnSearchConfig,
) -> SpawnCandidate {
    let step = config.step.max(1);
    let center = IVec2::new(start.x, start.z);

    let mut best = evaluate_column(world, center, config);
    if let Some(candidate) = best.filter(|c| c.score >= config.good_score) {
        log::debug!(
            "[SPAWN] Start column {:?} is good (score {})",
            candidate.position,
            candidate.score
        );
        return candidate;
    }

    let mut ring = 1;
    while ring * step <= config.max_radius {
        for offset in RingPerimeter::new(IVec2::ZERO, ring) {
            let Some(candidate) = evaluate_column(world, center + offset * step, config) else {
                continue;
            };
            if candidate.score >= config.good_score {
                log::debug!(
                    "[SPAWN] Good spawn at {:?} (score {}, radius {})",
                    candidate.position,
                    candidate.score,
                    ring * step
                );
                return candidate;
            }
            if best.is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        let past_min_radius = ring * step > config.min_radius;
        let acceptable = best.filter(|c| past_min_radius && c.score >= config.acceptable_score);
        if let Some(candidate) = acceptable {
            log::debug!(
                "[SPAWN] Acceptable spawn at {:?} (score {}) after radius {}",
                candidate.position,
                candidate.score,
                ring * step
            );
            return candidate;
        }
        ring += 1;
    }

    match best {
        Some(candidate) => {
            log::info!(
                "[SPAWN] No good spawn within {} blocks, using best seen at {:?} (score {})",
                config.max_radius,
                candidate.position,
                candidate.score
            );
            candidate
        }
        None => {
            let y = world
                .highest_block_y(start.x, start.z)
                .map_or(start.y, |top| top + 1);
            let position = IVec3::new(start.x, y, start.z);
            log::warn!(
                "[SPAWN] No safe column within {} blocks of {:?}, falling back to {:?}",
                config.max_radius,
                start,
                position
            );
            SpawnCandidate { position, score: 0 }
        }
    }
}

/// Score one column, or `None` if it fails the hazard filter
pub fn evaluate_column(
    world: &dyn BlockQuery,
    column: IVec2,
    config: &SpawnSearchConfig,
) -> Option<SpawnCandidate> {
    let (x, z) = (column.x, column.y);
    let ground_y = world.highest_block_y(x, z)?;

    let ground = world.block_at(x, ground_y, z);
    if ground == Block::Air
        || ground.is_hazard()
        || world.block_at(x, ground_y + 1, z) != Block::Air
        || world.block_at(x, ground_y + 2, z) != Block::Air
    {
        return None;
    }

    let mut score = 100;
    let mut min_height = ground_y;
    let mut max_height = ground_y;

    for dz in -NEIGHBOURHOOD..=NEIGHBOURHOOD {
        for dx in -NEIGHBOURHOOD..=NEIGHBOURHOOD {
            let Some(height) = world.highest_block_y(x + dx, z + dz) else {
                continue;
            };
            let top = world.block_at(x + dx, height, z + dz);
            if top.is_liquid() {
                score -= if top == Block::Lava {
                    LAVA_PENALTY
                } else {
                    WATER_PENALTY
                };
            }
            min_height = min_height.min(height);
            max_height = max_height.max(height);
        }
    }

    if max_height - min_height > MAX_HEIGHT_RANGE {
        score -= ROUGH_TERRAIN_PENALTY;
    }

    let standing_y = ground_y + 1;
    if standing_y < config.min_preferred_y || standing_y > config.max_preferred_y {
        score -= HEIGHT_PENALTY;
    }

    Some(SpawnCandidate {
        position: IVec3::new(x, standing_y, z),
        score: score.clamp(0, 100) as u8,
    })
}

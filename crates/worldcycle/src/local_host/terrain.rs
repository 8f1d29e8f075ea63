//! Seeded height-map terrain for locally hosted worlds
//!
//! Columns only: each (x, z) has one ground height and one surface block.
//! Enough variety (oceans, beaches, peaks, canopy, lava pools) to give the
//! spawn locator something to reject.

use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use worldcycle_core::{Block, BlockQuery, Dimension};

pub const SEA_LEVEL: i32 = 62;

/// Lowest block of the world; below it is void
pub const WORLD_FLOOR: i32 = 0;

/// Surface blocks at or above this height are snow and ice
const SNOW_LINE: i32 = SEA_LEVEL + 26;

/// Ground height swing around the mean
const HEIGHT_AMPLITUDE: f32 = 28.0;
const MEAN_HEIGHT: f32 = SEA_LEVEL as f32 + 4.0;

pub struct NoiseTerrain {
    height_noise: FastNoiseLite,
    // Canopy and lava pool placement
    surface_noise: FastNoiseLite,
}

impl NoiseTerrain {
    pub fn new(seed: u64) -> Self {
        let mut height_noise = FastNoiseLite::with_seed(seed as i32);
        height_noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        height_noise.set_frequency(Some(0.004));
        height_noise.set_fractal_type(Some(FractalType::FBm));
        height_noise.set_fractal_octaves(Some(4));

        let mut surface_noise = FastNoiseLite::with_seed((seed as i32).wrapping_add(1));
        surface_noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        surface_noise.set_frequency(Some(0.05));

        Self {
            height_noise,
            surface_noise,
        }
    }

    /// Terrain for one dimension of a world; sub-dimensions get their own layout
    pub fn for_dimension(seed: u64, dimension: Dimension) -> Self {
        let offset = match dimension {
            Dimension::Overworld => 0,
            Dimension::Nether => 0x4e45,
            Dimension::End => 0x454e,
        };
        Self::new(seed.wrapping_add(offset))
    }

    /// Y of the topmost ground block (not counting water)
    pub fn ground_height(&self, x: i32, z: i32) -> i32 {
        let n = self.height_noise.get_noise_2d(x as f32, z as f32);
        (MEAN_HEIGHT + n * HEIGHT_AMPLITUDE).round() as i32
    }

    fn surface_block(&self, x: i32, z: i32, ground: i32) -> Block {
        if ground <= SEA_LEVEL + 1 {
            // Sand on the sea floor and beaches
            return Block::Falling;
        }
        if ground >= SNOW_LINE {
            return Block::Ice;
        }

        let n = self.surface_noise.get_noise_2d(x as f32, z as f32);
        if n > 0.55 {
            Block::Leaves
        } else if n < -0.85 {
            Block::Lava
        } else {
            Block::Solid
        }
    }
}

impl BlockQuery for NoiseTerrain {
    fn highest_block_y(&self, x: i32, z: i32) -> Option<i32> {
        Some(self.ground_height(x, z).max(SEA_LEVEL))
    }

    fn block_at(&self, x: i32, y: i32, z: i32) -> Block {
        if y < WORLD_FLOOR {
            return Block::Void;
        }

        let ground = self.ground_height(x, z);
        if y > ground {
            if y <= SEA_LEVEL {
                Block::Water
            } else {
                Block::Air
            }
        } else if y == ground {
            self.surface_block(x, z, ground)
        } else {
            Block::Solid
        }
    }
}

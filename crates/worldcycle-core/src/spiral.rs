//! Centre-out square spiral over grid positions
//!
//! Yields positions in expanding square rings around a centre:
//! - Ring 0: the centre (1 position)
//! - Ring 1: 8 positions around it
//! - Ring r: 8r positions on the perimeter of a (2r+1)x(2r+1) square
//!
//! Used for chunk preloading (nearest chunks first) and, scaled by a step,
//! for the spawn search's ring-by-ring scan.

use glam::IVec2;

/// Iterator over the perimeter of a single ring
///
/// Walk order: right edge upward from the bottom-right corner's neighbour,
/// then top edge leftward, left edge downward, bottom edge rightward.
#[derive(Debug, Clone)]
pub struct RingPerimeter {
    center: IVec2,
    ring: i32,
    index: i32,
}

impl RingPerimeter {
    pub fn new(center: IVec2, ring: i32) -> Self {
        Self {
            center,
            ring: ring.max(0),
            index: 0,
        }
    }

    /// Number of positions on this ring
    pub fn len_for(ring: i32) -> usize {
        if ring <= 0 { 1 } else { (ring * 8) as usize }
    }
}

impl Iterator for RingPerimeter {
    type Item = IVec2;

    fn next(&mut self) -> Option<IVec2> {
        let r = self.ring;

        if r == 0 {
            if self.index > 0 {
                return None;
            }
            self.index = 1;
            return Some(self.center);
        }

        let side_len = 2 * r;
        if self.index >= 4 * side_len {
            return None;
        }

        let side = self.index / side_len;
        let t = self.index % side_len;
        self.index += 1;

        let offset = match side {
            0 => IVec2::new(r, -r + 1 + t), // right edge
            1 => IVec2::new(r - 1 - t, r),  // top edge
            2 => IVec2::new(-r, r - 1 - t), // left edge
            _ => IVec2::new(-r + 1 + t, -r), // bottom edge
        };

        Some(self.center + offset)
    }
}

/// Iterator over every ring from 0 to `max_ring`, innermost first
#[derive(Debug, Clone)]
pub struct SquareSpiral {
    center: IVec2,
    max_ring: i32,
    ring: i32,
    current: RingPerimeter,
}

impl SquareSpiral {
    /// Spiral centred at `center` covering a (2*max_ring+1)^2 square
    pub fn new(center: IVec2, max_ring: i32) -> Self {
        Self {
            center,
            max_ring: max_ring.max(0),
            ring: 0,
            current: RingPerimeter::new(center, 0),
        }
    }

    /// Total number of positions this spiral yields
    pub fn total_points(&self) -> usize {
        let side_length = (self.max_ring * 2 + 1) as usize;
        side_length * side_length
    }
}

impl Iterator for SquareSpiral {
    type Item = IVec2;

    fn next(&mut self) -> Option<IVec2> {
        loop {
            if let Some(pos) = self.current.next() {
                return Some(pos);
            }
            if self.ring >= self.max_ring {
                return None;
            }
            self.ring += 1;
            self.current = RingPerimeter::new(self.center, self.ring);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_spiral_center_only() {
        let points: Vec<IVec2> = SquareSpiral::new(IVec2::ZERO, 0).collect();
        assert_eq!(points, vec![IVec2::ZERO]);
    }

    #[test]
    fn test_spiral_radius_1() {
        let points: Vec<IVec2> = SquareSpiral::new(IVec2::ZERO, 1).collect();

        // Should have 9 positions (3x3 grid), centre first
        assert_eq!(points.len(), 9);
        assert_eq!(points[0], IVec2::ZERO);

        let unique: HashSet<IVec2> = points.iter().copied().collect();
        assert_eq!(unique.len(), 9);
        for p in points {
            assert!(p.x.abs() <= 1 && p.y.abs() <= 1, "{:?} outside radius 1", p);
        }
    }

    #[test]
    fn test_spiral_covers_11x11_grid() {
        let spiral = SquareSpiral::new(IVec2::new(-3, 7), 5);
        assert_eq!(spiral.total_points(), 121);

        let points: Vec<IVec2> = spiral.collect();
        let unique: HashSet<IVec2> = points.iter().copied().collect();
        assert_eq!(points.len(), 121);
        assert_eq!(unique.len(), 121, "Spiral produced duplicates");

        for dx in -5..=5 {
            for dy in -5..=5 {
                assert!(unique.contains(&IVec2::new(-3 + dx, 7 + dy)));
            }
        }
    }

    #[test]
    fn test_ring_perimeter_only() {
        let ring: Vec<IVec2> = RingPerimeter::new(IVec2::ZERO, 3).collect();
        assert_eq!(ring.len(), RingPerimeter::len_for(3));

        // Every point lies exactly on the ring, none inside
        for p in &ring {
            assert_eq!(p.x.abs().max(p.y.abs()), 3, "{:?} not on ring 3", p);
        }

        let unique: HashSet<IVec2> = ring.iter().copied().collect();
        assert_eq!(unique.len(), 24);
    }

    #[test]
    fn test_rings_are_monotonic() {
        let mut last_ring = 0;
        for p in SquareSpiral::new(IVec2::ZERO, 4) {
            let ring = p.x.abs().max(p.y.abs());
            assert!(ring >= last_ring, "ring went backwards at {:?}", p);
            last_ring = ring;
        }
        assert_eq!(last_ring, 4);
    }
}

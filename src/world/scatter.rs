use bevy::prelude::*;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::world::generator::SampleGrid;

/// 可散布的装饰物类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScatterKind {
    Tree,
    Rock,
}

impl ScatterKind {
    /// 每类独立的尺寸抖动区间
    pub fn jitter_range(&self) -> (f32, f32) {
        match self {
            ScatterKind::Tree => (0.75, 1.25),
            ScatterKind::Rock => (0.6, 1.2),
        }
    }
}

/// 由水位和振幅推导的放置高度带
///
/// 树要求落在草地带内，石头只检查沙地上限、不设下限。
#[derive(Debug, Clone, Copy)]
pub struct HeightBands {
    pub grass_min: f32,
    pub grass_max: f32,
    pub sand_max: f32,
}

impl HeightBands {
    pub fn from_settings(water_level: f32, amplitude: f32) -> Self {
        let floor = water_level * amplitude;
        let span = amplitude * (1.0 - water_level);
        Self {
            grass_min: floor + span * 0.05,
            grass_max: floor + span * 0.15,
            sand_max: floor + span * 0.03,
        }
    }

    pub fn allows(&self, kind: ScatterKind, height: f32) -> bool {
        match kind {
            ScatterKind::Tree => height > self.grass_min && height < self.grass_max,
            ScatterKind::Rock => height < self.sand_max,
        }
    }
}

/// 一次接受的放置：世界坐标加缩放抖动
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropPlacement {
    pub kind: ScatterKind,
    pub position: Vec3,
    pub scale: f32,
}

/// 同一把世界种子对 (瓦片偏移, 类别) 派生稳定的放置种子
pub fn placement_seed(world_seed: u32, offset: IVec2, kind: ScatterKind) -> u64 {
    let packed = ((offset.x as u32 as u64) << 32) | offset.y as u32 as u64;
    let salt: u64 = match kind {
        ScatterKind::Tree => 0x9E37_79B9,
        ScatterKind::Rock => 0x517C_C1B7,
    };
    (world_seed as u64 ^ packed)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(salt)
}

pub fn placement_rng(world_seed: u32, offset: IVec2, kind: ScatterKind) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(placement_seed(world_seed, offset, kind))
}

/// 在瓦片内做 `count` 次放置尝试
///
/// 每次尝试在局部 (0..width, 0..depth) 均匀取点，到最近的高度样本查高，
/// 高度带不符的尝试直接丢弃，接受的再抽一次缩放。结果数量可以少于
/// `count`。旧对象的清理由瓦片持有者在调用前完成。
pub fn scatter(
    kind: ScatterKind,
    count: u32,
    tile_translation: Vec3,
    grid: &SampleGrid,
    heights: &Array2<f32>,
    bands: HeightBands,
    rng: &mut impl Rng,
) -> Vec<PropPlacement> {
    // 退化瓦片没有可放置的面，也不消耗随机流
    if grid.width == 0 || grid.depth == 0 {
        return Vec::new();
    }
    let (jitter_lo, jitter_hi) = kind.jitter_range();
    let half_w = grid.width as f32 / 2.0;
    let half_d = grid.depth as f32 / 2.0;
    let mut placements = Vec::new();
    for _ in 0..count {
        let local_x = rng.gen_range(0.0..grid.width as f32);
        let local_z = rng.gen_range(0.0..grid.depth as f32);
        // 四舍五入到最近样本，边沿的越界索引收回合法范围
        let ix = (local_x.round() as usize).min(grid.width as usize);
        let iz = (local_z.round() as usize).min(grid.depth as usize);
        let height = heights[[iz, ix]];
        if !bands.allows(kind, height) {
            continue;
        }
        placements.push(PropPlacement {
            kind,
            position: tile_translation + Vec3::new(local_x - half_w, height, local_z - half_d),
            scale: rng.gen_range(jitter_lo..jitter_hi),
        });
    }
    placements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> HeightBands {
        HeightBands::from_settings(0.03, 100.0)
    }

    fn flat_heights(grid: &SampleGrid, height: f32) -> Array2<f32> {
        Array2::from_elem((grid.vertex_rows(), grid.vertex_cols()), height)
    }

    #[test]
    fn test_bands_derive_from_water_level_and_amplitude() {
        let b = bands();
        assert!((b.grass_min - 7.85).abs() < 1e-4);
        assert!((b.grass_max - 17.55).abs() < 1e-4);
        assert!((b.sand_max - 5.91).abs() < 1e-4);
    }

    #[test]
    fn test_trees_need_both_bounds_rocks_only_upper() {
        let b = bands();
        assert!(b.allows(ScatterKind::Tree, 10.0));
        assert!(!b.allows(ScatterKind::Tree, 5.0));
        assert!(!b.allows(ScatterKind::Tree, 20.0));
        assert!(b.allows(ScatterKind::Rock, 2.0));
        assert!(b.allows(ScatterKind::Rock, -100.0));
        assert!(!b.allows(ScatterKind::Rock, 6.0));
    }

    #[test]
    fn test_scatter_accepts_only_in_band_heights() {
        let grid = SampleGrid::new(8, 8, IVec2::ZERO);
        // 方格交替落在树带内外
        let heights = Array2::from_shape_fn((9, 9), |(iz, ix)| {
            if (ix + iz) % 2 == 0 {
                10.0
            } else {
                50.0
            }
        });
        let mut rng = placement_rng(7, IVec2::ZERO, ScatterKind::Tree);
        let placed = scatter(
            ScatterKind::Tree,
            200,
            Vec3::ZERO,
            &grid,
            &heights,
            bands(),
            &mut rng,
        );
        assert!(!placed.is_empty());
        assert!(placed.len() < 200);
        for p in &placed {
            assert_eq!(p.position.y, 10.0);
            assert_eq!(p.kind, ScatterKind::Tree);
        }
    }

    #[test]
    fn test_scatter_full_acceptance_on_uniform_band() {
        let grid = SampleGrid::new(5, 5, IVec2::ZERO);
        let heights = flat_heights(&grid, 10.0);
        let mut rng = placement_rng(1, IVec2::new(3, -2), ScatterKind::Tree);
        let placed = scatter(
            ScatterKind::Tree,
            50,
            Vec3::new(600.0, 0.0, -400.0),
            &grid,
            &heights,
            bands(),
            &mut rng,
        );
        assert_eq!(placed.len(), 50);
        for p in &placed {
            assert!(p.scale >= 0.75 && p.scale <= 1.25);
            assert!(p.position.x >= 600.0 - 2.5 && p.position.x <= 600.0 + 2.5);
            assert!(p.position.z >= -400.0 - 2.5 && p.position.z <= -400.0 + 2.5);
        }
    }

    #[test]
    fn test_rock_scale_jitter_range() {
        let grid = SampleGrid::new(5, 5, IVec2::ZERO);
        let heights = flat_heights(&grid, 2.0);
        let mut rng = placement_rng(42, IVec2::ZERO, ScatterKind::Rock);
        let placed = scatter(
            ScatterKind::Rock,
            50,
            Vec3::ZERO,
            &grid,
            &heights,
            bands(),
            &mut rng,
        );
        assert_eq!(placed.len(), 50);
        for p in &placed {
            assert!(p.scale >= 0.6 && p.scale <= 1.2);
        }
    }

    #[test]
    fn test_zero_count_scatters_nothing() {
        let grid = SampleGrid::new(5, 5, IVec2::ZERO);
        let heights = flat_heights(&grid, 10.0);
        let mut rng = placement_rng(1, IVec2::ZERO, ScatterKind::Tree);
        let placed = scatter(
            ScatterKind::Tree,
            0,
            Vec3::ZERO,
            &grid,
            &heights,
            bands(),
            &mut rng,
        );
        assert!(placed.is_empty());
    }

    #[test]
    fn test_degenerate_grid_skips_all_attempts() {
        let grid = SampleGrid::new(0, 5, IVec2::ZERO);
        let heights = flat_heights(&grid, 10.0);
        let mut rng = placement_rng(1, IVec2::ZERO, ScatterKind::Rock);
        let placed = scatter(
            ScatterKind::Rock,
            50,
            Vec3::ZERO,
            &grid,
            &heights,
            bands(),
            &mut rng,
        );
        assert!(placed.is_empty());
    }

    #[test]
    fn test_scatter_is_deterministic_per_seed() {
        let grid = SampleGrid::new(8, 8, IVec2::new(-1, 4));
        let heights = flat_heights(&grid, 10.0);
        let run = || {
            let mut rng = placement_rng(12345, grid.offset, ScatterKind::Tree);
            scatter(
                ScatterKind::Tree,
                30,
                Vec3::ZERO,
                &grid,
                &heights,
                bands(),
                &mut rng,
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_placement_seeds_are_distinct() {
        let a = placement_seed(1, IVec2::new(0, 0), ScatterKind::Tree);
        let b = placement_seed(1, IVec2::new(0, 0), ScatterKind::Rock);
        let c = placement_seed(1, IVec2::new(0, 1), ScatterKind::Tree);
        let d = placement_seed(1, IVec2::new(1, 0), ScatterKind::Tree);
        let e = placement_seed(2, IVec2::new(0, 0), ScatterKind::Tree);
        let seeds = [a, b, c, d, e];
        for (i, x) in seeds.iter().enumerate() {
            for y in seeds.iter().skip(i + 1) {
                assert_ne!(x, y);
            }
        }
    }
}

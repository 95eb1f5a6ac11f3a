use bevy::prelude::*;
use ndarray::Array2;
use rayon::prelude::*;

use crate::world::generator::{SampleGrid, TerrainNoise};

/// 顶点颜色渐变带，按 [0,1] 位置取样
#[derive(Debug, Clone)]
pub struct ColorRamp {
    stops: Vec<(f32, Color)>,
}

impl ColorRamp {
    pub fn new(mut stops: Vec<(f32, Color)>) -> Self {
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { stops }
    }

    /// 默认地形配色：沙滩、草地、山体、雪线
    pub fn terrain_default() -> Self {
        Self::new(vec![
            (0.0, Color::rgb(0.81, 0.75, 0.55)),
            (0.08, Color::rgb(0.58, 0.68, 0.35)),
            (0.35, Color::rgb(0.24, 0.45, 0.20)),
            (0.65, Color::rgb(0.42, 0.38, 0.34)),
            (0.85, Color::rgb(0.93, 0.93, 0.95)),
            (1.0, Color::WHITE),
        ])
    }

    pub fn sample(&self, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let Some(first) = self.stops.first() else {
            return Color::WHITE;
        };
        if t <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (pos_a, color_a) = pair[0];
            let (pos_b, color_b) = pair[1];
            if t <= pos_b {
                let span = pos_b - pos_a;
                if span <= f32::EPSILON {
                    return color_a;
                }
                return lerp_color(color_a, color_b, (t - pos_a) / span);
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}

fn lerp_color(a: Color, b: Color, t: f32) -> Color {
    let a = a.as_rgba_f32();
    let b = b.as_rgba_f32();
    Color::rgba(
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    )
}

/// 构建完成的网格缓冲，整体交给渲染层上传，从不做局部修补
#[derive(Debug, Clone, Default)]
pub struct TerrainMeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildPhase {
    Heights { next_row: usize },
    Triangles,
    Colors,
    Normals,
    Done,
}

/// 逐步推进的网格构建状态机
///
/// 每次 `step` 完成一个有界工作单元：一行高度采样、整个三角形索引
/// 生成、整个颜色推导、或法线计算。排空后的结果与立即模式逐位一致。
pub struct MeshBuild {
    grid: SampleGrid,
    base: Vec2,
    noise: TerrainNoise,
    water_level: f32,
    ramp: ColorRamp,
    heights: Array2<f32>,
    data: TerrainMeshData,
    phase: BuildPhase,
}

impl MeshBuild {
    pub fn new(
        grid: SampleGrid,
        base: Vec2,
        noise: TerrainNoise,
        water_level: f32,
        ramp: ColorRamp,
    ) -> Self {
        let heights = Array2::zeros((grid.vertex_rows(), grid.vertex_cols()));
        let mut data = TerrainMeshData::default();
        data.positions.reserve(grid.vertex_count());
        Self {
            grid,
            base,
            noise,
            water_level,
            ramp,
            heights,
            data,
            phase: BuildPhase::Heights { next_row: 0 },
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == BuildPhase::Done
    }

    /// 推进一个工作单元；网格数据齐备后返回 true
    pub fn step(&mut self) -> bool {
        match self.phase {
            BuildPhase::Heights { next_row } => {
                self.noise
                    .fill_row(&self.grid, self.base, next_row, self.heights.row_mut(next_row));
                let min_x = self.grid.min_x();
                let z = (self.grid.min_z() + next_row as i32) as f32;
                for (ix, h) in self.heights.row(next_row).iter().enumerate() {
                    self.data.positions.push(Vec3::new((min_x + ix as i32) as f32, *h, z));
                }
                self.phase = if next_row + 1 < self.grid.vertex_rows() {
                    BuildPhase::Heights { next_row: next_row + 1 }
                } else {
                    BuildPhase::Triangles
                };
            }
            BuildPhase::Triangles => {
                self.data.indices = triangle_indices(&self.grid);
                self.phase = BuildPhase::Colors;
            }
            BuildPhase::Colors => {
                let amplitude = self.noise.params().amplitude;
                self.data.colors = self
                    .data
                    .positions
                    .iter()
                    .map(|p| vertex_color(p.y, amplitude, self.water_level, &self.ramp))
                    .collect();
                self.phase = BuildPhase::Normals;
            }
            BuildPhase::Normals => {
                self.data.normals = face_averaged_normals(&self.data.positions, &self.data.indices);
                self.phase = BuildPhase::Done;
            }
            BuildPhase::Done => {}
        }
        self.is_done()
    }

    /// 取出结果；未完成的构建返回 None（被取消的构建直接丢弃即可）
    pub fn into_result(self) -> Option<(TerrainMeshData, Array2<f32>)> {
        if self.phase == BuildPhase::Done {
            Some((self.data, self.heights))
        } else {
            None
        }
    }
}

/// 立即模式：同步完成整张网格
///
/// 高度按行并行采样，颜色按顶点并行推导；每个点的计算相互独立，
/// 结果与逐步模式逐位相同。
pub fn build_terrain_mesh(
    grid: SampleGrid,
    base: Vec2,
    noise: &TerrainNoise,
    water_level: f32,
    ramp: &ColorRamp,
) -> (TerrainMeshData, Array2<f32>) {
    let heights = noise.sample_heights(&grid, base);

    let min_x = grid.min_x();
    let min_z = grid.min_z();
    let mut positions = Vec::with_capacity(grid.vertex_count());
    for (iz, row) in heights.outer_iter().enumerate() {
        let z = (min_z + iz as i32) as f32;
        for (ix, h) in row.iter().enumerate() {
            positions.push(Vec3::new((min_x + ix as i32) as f32, *h, z));
        }
    }

    let indices = triangle_indices(&grid);

    let amplitude = noise.params().amplitude;
    let colors: Vec<[f32; 4]> = positions
        .par_iter()
        .map(|p| vertex_color(p.y, amplitude, water_level, ramp))
        .collect();

    let normals = face_averaged_normals(&positions, &indices);

    (
        TerrainMeshData {
            positions,
            normals,
            colors,
            indices,
        },
        heights,
    )
}

/// 每个四边形拆成两个三角形，固定缠绕方向保证朝上的一面是正面
fn triangle_indices(grid: &SampleGrid) -> Vec<u32> {
    let width = grid.width;
    let depth = grid.depth;
    let mut indices = Vec::with_capacity(width as usize * depth as usize * 6);
    let mut vert = 0u32;
    for _z in 0..depth {
        for _x in 0..width {
            indices.extend_from_slice(&[
                vert,
                vert + width + 1,
                vert + 1,
                vert + 1,
                vert + width + 1,
                vert + width + 2,
            ]);
            vert += 1;
        }
        vert += 1;
    }
    indices
}

/// 高度归一化到 [0,1] 后在色带上取样；水面以下压到带底
fn vertex_color(height: f32, amplitude: f32, water_level: f32, ramp: &ColorRamp) -> [f32; 4] {
    let point = ((height / amplitude - water_level) / (1.2 - water_level)).clamp(0.0, 1.0);
    ramp.sample(point).as_rgba_f32()
}

/// 面法线累加到各自顶点后归一，与各面均摊的平滑着色一致
fn face_averaged_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let a = tri[0] as usize;
        let b = tri[1] as usize;
        let c = tri[2] as usize;
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    for n in &mut normals {
        // 没有关联面的顶点（退化网格）给一个稳定的朝上法线
        *n = if n.length_squared() > 0.0 { n.normalize() } else { Vec3::Y };
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::generator::NoiseParams;

    fn test_noise(seed: u32) -> TerrainNoise {
        TerrainNoise::new(
            seed,
            NoiseParams {
                scale: 0.01,
                octaves: 3,
                lacunarity: 2.0,
                persistence: 0.5,
                amplitude: 10.0,
                gradient_exp: 2.0,
            },
        )
    }

    fn drain(mut build: MeshBuild) -> (TerrainMeshData, Array2<f32>, usize) {
        let mut steps = 0;
        while !build.step() {
            steps += 1;
        }
        let (data, heights) = build.into_result().unwrap();
        (data, heights, steps + 1)
    }

    #[test]
    fn test_immediate_matches_stepped() {
        let grid = SampleGrid::new(7, 5, IVec2::new(2, -3));
        let base = Vec2::new(1002.0, 1000.8);
        let ramp = ColorRamp::terrain_default();

        let (immediate, imm_heights) =
            build_terrain_mesh(grid, base, &test_noise(12345), 0.3, &ramp);
        let (stepped, step_heights, _) =
            drain(MeshBuild::new(grid, base, test_noise(12345), 0.3, ramp.clone()));

        assert_eq!(immediate.positions, stepped.positions);
        assert_eq!(immediate.indices, stepped.indices);
        assert_eq!(immediate.colors, stepped.colors);
        assert_eq!(immediate.normals, stepped.normals);
        assert_eq!(imm_heights, step_heights);
    }

    #[test]
    fn test_step_count_matches_suspension_points() {
        // One step per height row, then triangles, colors, normals.
        let grid = SampleGrid::new(4, 4, IVec2::ZERO);
        let build = MeshBuild::new(
            grid,
            Vec2::ZERO,
            test_noise(1),
            0.3,
            ColorRamp::terrain_default(),
        );
        let (_, _, steps) = drain(build);
        assert_eq!(steps, 5 + 3);
    }

    #[test]
    fn test_four_by_four_grid_counts() {
        let grid = SampleGrid::new(4, 4, IVec2::ZERO);
        let noise = TerrainNoise::new(
            7,
            NoiseParams {
                scale: 0.01,
                octaves: 1,
                lacunarity: 2.0,
                persistence: 0.5,
                amplitude: 10.0,
                gradient_exp: 1.0,
            },
        );
        let (data, _) =
            build_terrain_mesh(grid, Vec2::ZERO, &noise, 0.3, &ColorRamp::terrain_default());
        assert_eq!(data.positions.len(), 25);
        assert_eq!(data.indices.len(), 32 * 3);
        assert_eq!(data.colors.len(), 25);
        assert_eq!(data.normals.len(), 25);
        // First quad uses the lower-left vertex, the one above it, and the one to its right.
        assert_eq!(&data.indices[..6], &[0, 5, 1, 1, 5, 6]);
    }

    #[test]
    fn test_indices_stay_in_range_for_rectangular_grid() {
        let grid = SampleGrid::new(6, 3, IVec2::new(-1, 4));
        let (data, _) = build_terrain_mesh(
            grid,
            Vec2::ZERO,
            &test_noise(99),
            0.5,
            &ColorRamp::terrain_default(),
        );
        assert_eq!(data.indices.len(), 6 * 3 * 6);
        let vertex_count = data.positions.len() as u32;
        assert!(data.indices.iter().all(|&i| i < vertex_count));
    }

    #[test]
    fn test_degenerate_grid_builds_empty_mesh() {
        for grid in [
            SampleGrid::new(0, 4, IVec2::ZERO),
            SampleGrid::new(4, 0, IVec2::ZERO),
            SampleGrid::new(0, 0, IVec2::ZERO),
        ] {
            let (data, _) = build_terrain_mesh(
                grid,
                Vec2::ZERO,
                &test_noise(3),
                0.3,
                &ColorRamp::terrain_default(),
            );
            assert!(data.indices.is_empty());
            assert_eq!(data.colors.len(), data.positions.len());
            assert_eq!(data.normals.len(), data.positions.len());
        }
    }

    #[test]
    fn test_flat_quad_normals_point_up() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
        ];
        let indices = triangle_indices(&SampleGrid::new(1, 1, IVec2::ZERO));
        let normals = face_averaged_normals(&positions, &indices);
        for n in normals {
            assert!((n - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_vertex_color_clamps_out_of_band_heights() {
        let ramp = ColorRamp::new(vec![
            (0.0, Color::rgb(0.0, 0.0, 0.0)),
            (1.0, Color::rgb(1.0, 1.0, 1.0)),
        ]);
        // Below the water band clamps to the ramp bottom, far above clamps to the top.
        assert_eq!(vertex_color(-50.0, 10.0, 0.6, &ramp), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(vertex_color(500.0, 10.0, 0.6, &ramp), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_ramp_sorts_stops_and_interpolates() {
        let ramp = ColorRamp::new(vec![
            (1.0, Color::rgb(1.0, 0.0, 0.0)),
            (0.0, Color::rgb(0.0, 0.0, 0.0)),
        ]);
        let mid = ramp.sample(0.5).as_rgba_f32();
        assert!((mid[0] - 0.5).abs() < 1e-6);
        assert_eq!(ramp.sample(-1.0).as_rgba_f32()[0], 0.0);
        assert_eq!(ramp.sample(2.0).as_rgba_f32()[0], 1.0);
    }
}

use bevy::prelude::*;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayViewMut1, Axis};
use noise::{NoiseFn, Perlin};

/// 分形噪声参数，每次生成前由设置界面提供
#[derive(Debug, Clone, Copy)]
pub struct NoiseParams {
    pub scale: f32,
    pub octaves: u32,
    pub lacunarity: f32,
    pub persistence: f32,
    pub amplitude: f32,
    pub gradient_exp: f32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            scale: 0.005,
            octaves: 8,
            lacunarity: 2.0,
            persistence: 0.4,
            amplitude: 100.0,
            gradient_exp: 8.0,
        }
    }
}

/// 采样网格：按整数偏移定位的 (width+1)×(depth+1) 顶点栅格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGrid {
    pub width: u32,
    pub depth: u32,
    pub offset: IVec2,
}

impl SampleGrid {
    pub fn new(width: u32, depth: u32, offset: IVec2) -> Self {
        Self { width, depth, offset }
    }

    pub fn vertex_cols(&self) -> usize {
        self.width as usize + 1
    }

    pub fn vertex_rows(&self) -> usize {
        self.depth as usize + 1
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_cols() * self.vertex_rows()
    }

    /// 顶点本地坐标从 -(width/2) 起（整数折半，与三角形索引约定一致）
    pub fn min_x(&self) -> i32 {
        -(self.width as i32) / 2
    }

    pub fn min_z(&self) -> i32 {
        -(self.depth as i32) / 2
    }

    /// 噪声采样用的世界 x 坐标；相邻偏移的网格在公共边上取到完全相同的坐标
    pub fn world_x(&self, ix: usize, base: Vec2) -> f32 {
        (self.min_x() + ix as i32) as f32 + (self.offset.x as f32 + base.x) * self.width as f32
    }

    pub fn world_z(&self, iz: usize, base: Vec2) -> f32 {
        (self.min_z() + iz as i32) as f32 + (self.offset.y as f32 + base.y) * self.depth as f32
    }
}

/// 地形高度评估器：多层 Perlin 叠加后按梯度指数重塑
pub struct TerrainNoise {
    perlin: Perlin,
    params: NoiseParams,
}

impl TerrainNoise {
    pub fn new(seed: u32, params: NoiseParams) -> Self {
        Self {
            perlin: Perlin::new(seed),
            params,
        }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// 计算单点高度，相同输入永远得到相同输出
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let mut raw = 0.0_f32;
        let mut frequency = self.params.scale;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            let layer = self.perlin.get([(x * frequency) as f64, (z * frequency) as f64]) as f32;
            // Perlin 输出约在 [-1,1]，映射到 [0,1] 再加权
            raw += (layer + 1.0) * 0.5 * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        reshape(raw, self.params.amplitude, self.params.gradient_exp)
    }

    /// 填充高度场的一整行（z 固定），供逐行推进的构建器调用
    pub fn fill_row(&self, grid: &SampleGrid, base: Vec2, iz: usize, mut row: ArrayViewMut1<f32>) {
        let z = grid.world_z(iz, base);
        for (ix, h) in row.iter_mut().enumerate() {
            *h = self.height(grid.world_x(ix, base), z);
        }
    }

    /// 一次性采样整个高度场；行之间相互独立，按行并行，结果与逐行串行完全一致
    pub fn sample_heights(&self, grid: &SampleGrid, base: Vec2) -> Array2<f32> {
        let mut field = Array2::zeros((grid.vertex_rows(), grid.vertex_cols()));
        field
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(iz, row)| self.fill_row(grid, base, iz, row));
        field
    }
}

/// 梯度重塑：比值先压到非负，避免负底数的幂运算出 NaN
fn reshape(raw: f32, amplitude: f32, gradient_exp: f32) -> f32 {
    let ratio = (raw / (amplitude * 1.3)).max(0.0);
    ratio.powf(gradient_exp) * amplitude
}

use bevy::prelude::*;

/// 瓦片生命周期：空闲、生成中、就绪；游戏内只回收复用，不中途销毁
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Idle,
    Generating,
    Ready,
}

/// 一块可回收的地形瓦片
///
/// 网格句柄挂在同一实体的渲染组件上，散布出来的装饰物实体由
/// `props` 统一持有，重新生成时整批销毁。
#[derive(Component)]
pub struct TerrainTile {
    pub slot: usize,
    pub offset: IVec2,
    pub state: TileState,
    pub props: Vec<Entity>,
}

impl TerrainTile {
    pub fn new(slot: usize, offset: IVec2) -> Self {
        Self {
            slot,
            offset,
            state: TileState::Idle,
            props: Vec::new(),
        }
    }
}

/// 单轴回收判定
///
/// 观察者离瓦片中心超过半个网格跨度时，把瓦片往观察者一侧搬一个
/// 整跨度，同时把整型偏移挪过同轴的瓦片数。每次调用至多搬一步，
/// 连续的观察者更新会把远离的瓦片逐步拉回范围内。
pub fn recycle_axis(
    observer: f32,
    center: &mut f32,
    offset: &mut i32,
    tile_size: f32,
    tile_count: i32,
) -> bool {
    let extent = tile_size * tile_count as f32;
    let half = extent / 2.0;
    if observer - *center > half {
        *center += extent;
        *offset += tile_count;
        true
    } else if *center - observer > half {
        *center -= extent;
        *offset -= tile_count;
        true
    } else {
        false
    }
}

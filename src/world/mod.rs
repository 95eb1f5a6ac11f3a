use bevy::prelude::*;

pub mod builder;
pub mod generator;
pub mod grid;
pub mod scatter;
pub mod tile;

/// 地形世界插件，聚合瓦片调度
pub struct WorldPlugin;

impl Plugin for WorldPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(grid::TileGridPlugin);
    }
}

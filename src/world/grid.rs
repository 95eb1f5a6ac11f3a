use bevy::prelude::*;
use ndarray::Array2;
use std::collections::VecDeque;

use crate::controller::Observer;
use crate::game_state::AppState;
use crate::ui::TerrainSettings;
use crate::world::builder::{build_terrain_mesh, ColorRamp, MeshBuild, TerrainMeshData};
use crate::world::generator::{SampleGrid, TerrainNoise};
use crate::world::scatter::{placement_rng, scatter, HeightBands, PropPlacement, ScatterKind};
use crate::world::tile::{recycle_axis, TerrainTile, TileState};

/// 瓦片网格调度配置
#[derive(Resource)]
pub struct TileGridConfig {
    pub startup_builds_per_frame: usize, // 启动队列每帧整块构建的瓦片数
    pub steps_per_frame: usize,          // 增量生成每帧推进的工作单元总数
}

impl Default for TileGridConfig {
    fn default() -> Self {
        Self {
            startup_builds_per_frame: 2, // 每帧整块构建2个，摊平开局的铺设开销
            steps_per_frame: 64,         // 回收触发的重建分摊到多帧
        }
    }
}

/// 启动时等待整块构建的瓦片队列
#[derive(Resource, Default)]
pub struct TileBuildQueue {
    pub pending: VecDeque<Entity>,
}

/// 设置界面里的预览瓦片
#[derive(Component)]
pub struct PreviewTile;

/// 生成完毕、等待交给渲染层的成品
#[derive(Component)]
pub struct TileBuildOutput {
    pub data: TerrainMeshData,
    pub placements: Vec<PropPlacement>,
}

enum GenPhase {
    Mesh(MeshBuild),
    ScatterTrees {
        data: TerrainMeshData,
        heights: Array2<f32>,
    },
    ScatterRocks {
        data: TerrainMeshData,
        heights: Array2<f32>,
        trees: Vec<PropPlacement>,
    },
    Finished {
        data: TerrainMeshData,
        placements: Vec<PropPlacement>,
    },
    Taken,
}

/// 一次分步瓦片生成，参数在启动时快照、中途不再读取设置
///
/// 往实体上重新插入本组件就是取消：旧的半成品随组件一起丢弃，
/// 不会被渲染层看到。散布阶段一定排在网格完成之后。
#[derive(Component)]
pub struct TileGeneration {
    grid: SampleGrid,
    offset: IVec2,
    translation: Vec3,
    seed: u32,
    tree_count: u32,
    rock_count: u32,
    bands: HeightBands,
    phase: GenPhase,
}

impl TileGeneration {
    /// 推进一个工作单元；返回 true 表示网格和两轮散布都已完成
    fn advance(&mut self) -> bool {
        if let GenPhase::Mesh(build) = &mut self.phase {
            if !build.step() {
                return false;
            }
            // 网格算完，往下换相
        }
        match std::mem::replace(&mut self.phase, GenPhase::Taken) {
            GenPhase::Mesh(build) => {
                if let Some((data, heights)) = build.into_result() {
                    self.phase = GenPhase::ScatterTrees { data, heights };
                }
                false
            }
            GenPhase::ScatterTrees { data, heights } => {
                let mut rng = placement_rng(self.seed, self.offset, ScatterKind::Tree);
                let trees = scatter(
                    ScatterKind::Tree,
                    self.tree_count,
                    self.translation,
                    &self.grid,
                    &heights,
                    self.bands,
                    &mut rng,
                );
                self.phase = GenPhase::ScatterRocks { data, heights, trees };
                false
            }
            GenPhase::ScatterRocks { data, heights, mut trees } => {
                let mut rng = placement_rng(self.seed, self.offset, ScatterKind::Rock);
                let rocks = scatter(
                    ScatterKind::Rock,
                    self.rock_count,
                    self.translation,
                    &self.grid,
                    &heights,
                    self.bands,
                    &mut rng,
                );
                trees.extend(rocks);
                self.phase = GenPhase::Finished { data, placements: trees };
                true
            }
            done @ GenPhase::Finished { .. } => {
                self.phase = done;
                true
            }
            GenPhase::Taken => false,
        }
    }

    fn take_output(&mut self) -> Option<TileBuildOutput> {
        match std::mem::replace(&mut self.phase, GenPhase::Taken) {
            GenPhase::Finished { data, placements } => Some(TileBuildOutput { data, placements }),
            other => {
                self.phase = other;
                None
            }
        }
    }
}

/// 按当前设置快照出一次新的分步生成
fn start_generation(settings: &TerrainSettings, offset: IVec2, translation: Vec3) -> TileGeneration {
    let params = settings.noise_params();
    let grid = SampleGrid::new(settings.tile_width, settings.tile_depth, offset);
    let noise = TerrainNoise::new(settings.seed, params);
    TileGeneration {
        grid,
        offset,
        translation,
        seed: settings.seed,
        tree_count: settings.tree_count,
        rock_count: settings.rock_count,
        bands: HeightBands::from_settings(settings.water_level, params.amplitude),
        phase: GenPhase::Mesh(MeshBuild::new(
            grid,
            settings.base_offset(),
            noise,
            settings.water_level,
            ColorRamp::terrain_default(),
        )),
    }
}

/// 铺设整张瓦片网格，排进启动构建队列
pub fn spawn_tile_grid_system(
    mut commands: Commands,
    settings: Res<TerrainSettings>,
    mut queue: ResMut<TileBuildQueue>,
) {
    queue.pending.clear();
    let mut slot = 0;
    for i in 0..settings.x_tiles {
        for j in 0..settings.z_tiles {
            let offset = IVec2::new(i - settings.x_tiles / 2, j - settings.z_tiles / 2);
            let translation = Vec3::new(
                offset.x as f32 * settings.tile_width as f32,
                0.0,
                offset.y as f32 * settings.tile_depth as f32,
            );
            let entity = commands
                .spawn((
                    TerrainTile::new(slot, offset),
                    SpatialBundle {
                        transform: Transform::from_translation(translation),
                        ..default()
                    },
                ))
                .id();
            queue.pending.push_back(entity);
            slot += 1;
        }
    }
    info!(
        "Spawned terrain grid: {}x{} tiles of {}x{}",
        settings.x_tiles, settings.z_tiles, settings.tile_width, settings.tile_depth
    );
}

/// 启动队列按预算出队，整块构建后直接挂上成品
pub fn startup_build_system(
    mut commands: Commands,
    mut queue: ResMut<TileBuildQueue>,
    config: Res<TileGridConfig>,
    settings: Res<TerrainSettings>,
    mut tiles: Query<(&mut TerrainTile, &Transform)>,
) {
    let mut built = 0;
    while built < config.startup_builds_per_frame {
        let Some(entity) = queue.pending.pop_front() else {
            break;
        };
        let Ok((mut tile, transform)) = tiles.get_mut(entity) else {
            continue;
        };
        tile.state = TileState::Generating;
        let params = settings.noise_params();
        let grid = SampleGrid::new(settings.tile_width, settings.tile_depth, tile.offset);
        let noise = TerrainNoise::new(settings.seed, params);
        let (data, heights) = build_terrain_mesh(
            grid,
            settings.base_offset(),
            &noise,
            settings.water_level,
            &ColorRamp::terrain_default(),
        );
        let bands = HeightBands::from_settings(settings.water_level, params.amplitude);
        let translation = transform.translation;
        let mut placements = {
            let mut rng = placement_rng(settings.seed, tile.offset, ScatterKind::Tree);
            scatter(
                ScatterKind::Tree,
                settings.tree_count,
                translation,
                &grid,
                &heights,
                bands,
                &mut rng,
            )
        };
        let mut rng = placement_rng(settings.seed, tile.offset, ScatterKind::Rock);
        placements.extend(scatter(
            ScatterKind::Rock,
            settings.rock_count,
            translation,
            &grid,
            &heights,
            bands,
            &mut rng,
        ));
        commands.entity(entity).insert(TileBuildOutput { data, placements });
        built += 1;
    }
}

/// 观察者越界检测，命中的瓦片搬到对面并重新开始分步生成
pub fn recycle_tiles_system(
    mut commands: Commands,
    observer_query: Query<&Transform, (With<Observer>, Without<TerrainTile>)>,
    mut tiles: Query<(Entity, &mut TerrainTile, &mut Transform), Without<Observer>>,
    settings: Res<TerrainSettings>,
    queue: Res<TileBuildQueue>,
) {
    let observer = match observer_query.get_single() {
        Ok(transform) => transform,
        Err(_) => return,
    };
    // 启动铺设还没排空时不回收，避免跟整块构建互相踩
    if !queue.pending.is_empty() {
        return;
    }
    for (entity, mut tile, mut transform) in tiles.iter_mut() {
        let mut center_x = transform.translation.x;
        let mut center_z = transform.translation.z;
        let mut offset = tile.offset;
        let moved_x = recycle_axis(
            observer.translation.x,
            &mut center_x,
            &mut offset.x,
            settings.tile_width as f32,
            settings.x_tiles,
        );
        let moved_z = recycle_axis(
            observer.translation.z,
            &mut center_z,
            &mut offset.y,
            settings.tile_depth as f32,
            settings.z_tiles,
        );
        if moved_x || moved_z {
            transform.translation.x = center_x;
            transform.translation.z = center_z;
            tile.offset = offset;
            tile.state = TileState::Generating;
            debug!("Recycled tile {} to offset {:?}", tile.slot, offset);
            commands
                .entity(entity)
                .insert(start_generation(&settings, offset, transform.translation));
        }
    }
}

/// 所有在途生成共享每帧的步数预算
pub fn generation_step_system(
    mut commands: Commands,
    config: Res<TileGridConfig>,
    mut generating: Query<(Entity, &mut TileGeneration)>,
) {
    let mut budget = config.steps_per_frame;
    for (entity, mut generation) in generating.iter_mut() {
        while budget > 0 {
            budget -= 1;
            if generation.advance() {
                if let Some(output) = generation.take_output() {
                    commands.entity(entity).insert(output);
                }
                commands.entity(entity).remove::<TileGeneration>();
                break;
            }
        }
        if budget == 0 {
            break;
        }
    }
}

/// 设置界面进场时放一块原点预览瓦片
pub fn spawn_preview_system(mut commands: Commands, settings: Res<TerrainSettings>) {
    let mut tile = TerrainTile::new(0, IVec2::ZERO);
    tile.state = TileState::Generating;
    commands.spawn((
        tile,
        PreviewTile,
        SpatialBundle::default(),
        start_generation(&settings, IVec2::ZERO, Vec3::ZERO),
    ));
}

/// 设置一变就重开预览生成，顶掉还没跑完的那一次
pub fn refresh_preview_system(
    mut commands: Commands,
    settings: Res<TerrainSettings>,
    preview: Query<(Entity, &Transform), With<PreviewTile>>,
) {
    if !settings.is_changed() {
        return;
    }
    for (entity, transform) in preview.iter() {
        commands
            .entity(entity)
            .insert(start_generation(&settings, IVec2::ZERO, transform.translation));
    }
}

/// 退出设置界面时清掉预览瓦片和它的装饰物
pub fn despawn_preview_system(
    mut commands: Commands,
    preview: Query<(Entity, &TerrainTile), With<PreviewTile>>,
) {
    for (entity, tile) in preview.iter() {
        for prop in tile.props.iter() {
            if let Some(prop_commands) = commands.get_entity(*prop) {
                prop_commands.despawn_recursive();
            }
        }
        commands.entity(entity).despawn_recursive();
    }
}

/// 退出游戏状态时整张网格连同装饰物一起清掉
pub fn despawn_grid_system(
    mut commands: Commands,
    tiles: Query<(Entity, &TerrainTile)>,
    mut queue: ResMut<TileBuildQueue>,
) {
    queue.pending.clear();
    let mut count = 0;
    for (entity, tile) in tiles.iter() {
        for prop in tile.props.iter() {
            if let Some(prop_commands) = commands.get_entity(*prop) {
                prop_commands.despawn_recursive();
            }
        }
        commands.entity(entity).despawn_recursive();
        count += 1;
    }
    info!("Despawned {} terrain tiles", count);
}

/// 瓦片网格插件
pub struct TileGridPlugin;

impl Plugin for TileGridPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(TileGridConfig::default())
            .insert_resource(TileBuildQueue::default())
            .add_systems(OnEnter(AppState::InGame), spawn_tile_grid_system)
            .add_systems(OnExit(AppState::InGame), despawn_grid_system)
            .add_systems(OnEnter(AppState::Settings), spawn_preview_system)
            .add_systems(OnExit(AppState::Settings), despawn_preview_system)
            .add_systems(
                Update,
                (
                    startup_build_system.run_if(in_state(AppState::InGame)),
                    recycle_tiles_system.run_if(in_state(AppState::InGame)),
                    refresh_preview_system.run_if(in_state(AppState::Settings)),
                    generation_step_system,
                )
                    .chain(),
            );
    }
}

use bevy::diagnostic::{FrameTimeDiagnosticsPlugin, LogDiagnosticsPlugin};
use bevy::pbr::{FogFalloff, FogSettings};
use bevy::prelude::*;

mod controller;
mod game_state;
mod rendering;
mod ui;
mod world;

use crate::controller::Observer;
use crate::game_state::{AppState, GameStatePlugin};
use crate::ui::TerrainSettings;
use crate::world::generator::TerrainNoise;

/// 设置界面里俯瞰预览瓦片的相机
#[derive(Component)]
struct PreviewCamera;

// 从原点沿 +x 找一块露出水面的地皮当出生点
fn find_spawn_point(settings: &TerrainSettings) -> Vec3 {
    let noise = TerrainNoise::new(settings.seed, settings.noise_params());
    let base = settings.base_offset();
    let water_height = settings.amplitude * settings.water_level;
    let width = settings.tile_width as f32;
    let depth = settings.tile_depth as f32;

    for step in 0..=settings.tile_width / 2 {
        let x = step as f32;
        let height = noise.height(x + base.x * width, base.y * depth);
        if height > water_height {
            return Vec3::new(x, height + 40.0, 0.0);
        }
    }

    // 整条采样线都泡在水里，就直接悬在水面上方
    Vec3::new(0.0, water_height + 40.0, 0.0)
}

fn starting_fog() -> FogSettings {
    FogSettings {
        color: Color::rgb(0.53, 0.81, 0.92),
        falloff: FogFalloff::Linear {
            start: 400.0,
            end: 1000.0,
        },
        ..default()
    }
}

fn spawn_preview_camera(mut commands: Commands, settings: Res<TerrainSettings>) {
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_xyz(0.0, settings.amplitude * 1.6, settings.tile_depth as f32 * 0.9)
                .looking_at(Vec3::ZERO, Vec3::Y),
            ..default()
        },
        starting_fog(),
        PreviewCamera,
    ));
}

fn despawn_preview_camera(mut commands: Commands, cameras: Query<Entity, With<PreviewCamera>>) {
    for entity in cameras.iter() {
        commands.entity(entity).despawn_recursive();
    }
}

fn spawn_observer_camera(mut commands: Commands, settings: Res<TerrainSettings>) {
    let spawn = find_spawn_point(&settings);
    info!("Observer spawning at {:?}", spawn);

    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_translation(spawn),
            ..default()
        },
        starting_fog(),
        Observer::default(),
    ));
}

fn despawn_observer_camera(mut commands: Commands, observers: Query<Entity, With<Observer>>) {
    for entity in observers.iter() {
        commands.entity(entity).despawn_recursive();
    }
}

fn main() {
    App::new()
        .insert_resource(ClearColor(Color::rgb(0.53, 0.81, 0.92)))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Terrain Tiles".into(),
                resolution: (1280.0, 720.0).into(),
                resizable: true,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(LogDiagnosticsPlugin::default())
        .add_plugins(FrameTimeDiagnosticsPlugin::default())
        // 状态管理与预设存取
        .add_plugins(GameStatePlugin)
        // 设置界面与游戏内界面
        .add_plugins(ui::UiPlugin)
        // 地形生成与瓦片调度
        .add_plugins(world::WorldPlugin)
        .add_plugins(rendering::RenderingPlugin)
        .add_plugins(controller::ControllerPlugin)
        // 相机跟着状态走
        .add_systems(OnEnter(AppState::Settings), spawn_preview_camera)
        .add_systems(OnExit(AppState::Settings), despawn_preview_camera)
        .add_systems(OnEnter(AppState::InGame), spawn_observer_camera)
        .add_systems(OnExit(AppState::InGame), despawn_observer_camera)
        .run();
}

use bevy::pbr::{FogFalloff, FogSettings};
use bevy::prelude::*;

pub mod props;
pub mod terrain_mesh;

use props::{setup_prop_assets, PropAssets};
use terrain_mesh::mesh_from_data;

use crate::controller::Observer;
use crate::ui::TerrainSettings;
use crate::world::grid::TileBuildOutput;
use crate::world::tile::{TerrainTile, TileState};

pub struct RenderingPlugin;

impl Plugin for RenderingPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Startup,
            (setup_lighting, setup_terrain_material, setup_prop_assets, setup_water_plane),
        )
        .add_systems(Update, (apply_finished_tiles, update_water_plane, update_day_night));
    }
}

/// 方向光标记，昼夜系统按时间转动它
#[derive(Component)]
pub struct Sun;

/// 跟着观察者走的大水面
#[derive(Component)]
pub struct WaterPlane;

/// 地形共用材质，顶点色在它上面做乘法
#[derive(Resource)]
pub struct TerrainMaterial {
    pub handle: Handle<StandardMaterial>,
}

fn setup_lighting(mut commands: Commands) {
    // 添加环境光
    commands.insert_resource(AmbientLight {
        color: Color::rgb(0.4, 0.4, 0.45),
        brightness: 0.3,
    });

    // 添加方向光（太阳光）
    commands.spawn((
        DirectionalLightBundle {
            directional_light: DirectionalLight {
                color: Color::rgb(1.0, 0.95, 0.8),
                illuminance: 10000.0,
                shadows_enabled: true,
                ..default()
            },
            transform: Transform::from_rotation(sun_rotation(90.0)),
            ..default()
        },
        Sun,
    ));
}

fn setup_terrain_material(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let handle = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        perceptual_roughness: 1.0,
        ..default()
    });
    commands.insert_resource(TerrainMaterial { handle });
}

fn setup_water_plane(
    mut commands: Commands,
    settings: Res<TerrainSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let material = materials.add(StandardMaterial {
        base_color: Color::rgba(0.1, 0.3, 0.55, 0.6),
        perceptual_roughness: 0.15,
        alpha_mode: AlphaMode::Blend,
        ..default()
    });
    commands.spawn((
        PbrBundle {
            mesh: meshes.add(shape::Plane::from_size(10_000.0).into()),
            material,
            transform: Transform::from_xyz(0.0, water_plane_height(&settings), 0.0),
            ..default()
        },
        WaterPlane,
    ));
}

// 水面高度跟振幅和水位挂钩
fn water_plane_height(settings: &TerrainSettings) -> f32 {
    -10.0 + settings.amplitude * settings.water_level / 10.0
}

/// 水面横向跟随观察者，高度随设置变化
fn update_water_plane(
    settings: Res<TerrainSettings>,
    observers: Query<&Transform, (With<Observer>, Without<WaterPlane>)>,
    mut water: Query<&mut Transform, With<WaterPlane>>,
) {
    let Ok(mut transform) = water.get_single_mut() else {
        return;
    };
    let focus = match observers.get_single() {
        Ok(observer) => observer.translation,
        // 设置界面里水面留在预览瓦片下方
        Err(_) => Vec3::ZERO,
    };
    transform.translation = Vec3::new(focus.x, water_plane_height(&settings), focus.z);
}

// 正午过后太阳翻到另一侧继续落下
fn sun_rotation(time_of_day: f32) -> Quat {
    let (elevation, azimuth) = if time_of_day > 90.0 {
        (180.0 - time_of_day, 150.0_f32)
    } else {
        (time_of_day, -30.0_f32)
    };
    Quat::from_euler(EulerRot::YXZ, azimuth.to_radians(), -elevation.to_radians(), 0.0)
}

// 离正午越远，天色越蓝越暗
fn sky_color(time_of_day: f32) -> Color {
    let offset = (90.0 - time_of_day).abs() / 3.0;
    let hue = 180.0 + offset;
    let value = (100.0 - offset) / 100.0;
    let saturation = 0.4;
    // HSV转成Bevy认的HSL
    let lightness = value * (1.0 - saturation / 2.0);
    let hsl_saturation = if lightness <= 0.0 || lightness >= 1.0 {
        0.0
    } else {
        (value - lightness) / lightness.min(1.0 - lightness)
    };
    Color::hsl(hue, hsl_saturation, lightness)
}

// 雾在网格边缘前收拢，遮住远处瓦片回收的瞬移
fn fog_range(settings: &TerrainSettings) -> (f32, f32) {
    let extent_x = settings.x_tiles as f32 * settings.tile_width as f32;
    let extent_z = settings.z_tiles as f32 * settings.tile_depth as f32;
    let end = extent_x.min(extent_z) * 0.5;
    (end * 0.4, end)
}

/// 按一天里的时间更新太阳、天空色和雾色
fn update_day_night(
    settings: Res<TerrainSettings>,
    mut clear_color: ResMut<ClearColor>,
    mut sun: Query<&mut Transform, With<Sun>>,
    mut fogs: Query<&mut FogSettings>,
) {
    let sky = sky_color(settings.time_of_day);
    clear_color.0 = sky;

    let rotation = sun_rotation(settings.time_of_day);
    for mut transform in sun.iter_mut() {
        transform.rotation = rotation;
    }

    let (start, end) = fog_range(&settings);
    for mut fog in fogs.iter_mut() {
        fog.color = sky;
        fog.falloff = FogFalloff::Linear { start, end };
    }
}

/// 把完工的瓦片上载成网格并摆上装饰物
fn apply_finished_tiles(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    material: Res<TerrainMaterial>,
    prop_assets: Res<PropAssets>,
    mut tiles: Query<(Entity, &mut TerrainTile, &mut TileBuildOutput)>,
) {
    for (entity, mut tile, mut output) in tiles.iter_mut() {
        // 老的装饰物先清场
        for prop in tile.props.drain(..) {
            if let Some(prop_commands) = commands.get_entity(prop) {
                prop_commands.despawn_recursive();
            }
        }

        let mesh_handle = meshes.add(mesh_from_data(std::mem::take(&mut output.data)));
        commands
            .entity(entity)
            .insert((mesh_handle, material.handle.clone()))
            .remove::<TileBuildOutput>();

        for placement in output.placements.drain(..) {
            let prop = commands
                .spawn(PbrBundle {
                    mesh: prop_assets.mesh_for(placement.kind),
                    material: prop_assets.material.clone(),
                    transform: Transform::from_translation(placement.position)
                        .with_scale(Vec3::splat(placement.scale)),
                    ..default()
                })
                .id();
            tile.props.push(prop);
        }
        tile.state = TileState::Ready;
        debug!("Tile {:?} uploaded with {} props", tile.offset, tile.props.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sun_points_down_at_noon() {
        let forward = sun_rotation(90.0) * Vec3::NEG_Z;
        assert!(forward.abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }

    #[test]
    fn test_sun_sits_on_horizon_at_day_edges() {
        for t in [0.0, 180.0] {
            let forward = sun_rotation(t) * Vec3::NEG_Z;
            assert!(forward.y.abs() < 1e-6);
        }
    }

    #[test]
    fn test_sun_elevation_mirrors_around_noon() {
        let morning = sun_rotation(60.0) * Vec3::NEG_Z;
        let evening = sun_rotation(120.0) * Vec3::NEG_Z;
        assert!((morning.y - evening.y).abs() < 1e-6);
        // 方位角翻面，水平方向不同
        assert!((morning.x - evening.x).abs() > 0.1);
    }

    #[test]
    fn test_sky_is_brightest_at_noon() {
        let noon = sky_color(90.0).as_rgba_f32();
        assert!((noon[0] - 0.6).abs() < 1e-4);
        assert!((noon[1] - 1.0).abs() < 1e-4);
        assert!((noon[2] - 1.0).abs() < 1e-4);

        let dawn = sky_color(0.0).as_rgba_f32();
        assert!(dawn[1] < noon[1]);
        assert!(dawn[2] < noon[2]);
    }

    #[test]
    fn test_dawn_and_dusk_share_one_sky() {
        assert_eq!(sky_color(0.0), sky_color(180.0));
    }

    #[test]
    fn test_water_height_tracks_settings() {
        let settings = TerrainSettings::default();
        assert!((water_plane_height(&settings) - (-9.7)).abs() < 1e-6);
    }

    #[test]
    fn test_fog_closes_before_grid_edge() {
        let settings = TerrainSettings::default();
        let (start, end) = fog_range(&settings);
        assert_eq!(end, 1000.0);
        assert_eq!(start, 400.0);
        let half_extent_z = settings.z_tiles as f32 * settings.tile_depth as f32 * 0.5;
        assert!(end <= half_extent_z);
    }
}

use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use std::f32::consts::TAU;

use crate::world::scatter::ScatterKind;

const TRUNK_COLOR: [f32; 4] = [0.36, 0.25, 0.13, 1.0];
const CANOPY_COLOR: [f32; 4] = [0.13, 0.40, 0.17, 1.0];
const ROCK_COLOR: [f32; 4] = [0.45, 0.44, 0.42, 1.0];

/// 树和石头共用的网格与材质句柄
#[derive(Resource)]
pub struct PropAssets {
    pub tree_mesh: Handle<Mesh>,
    pub rock_mesh: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
}

impl PropAssets {
    pub fn mesh_for(&self, kind: ScatterKind) -> Handle<Mesh> {
        match kind {
            ScatterKind::Tree => self.tree_mesh.clone(),
            ScatterKind::Rock => self.rock_mesh.clone(),
        }
    }
}

pub fn setup_prop_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // 颜色都烘进顶点色，所有装饰物共用一个材质
    let material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        perceptual_roughness: 0.9,
        ..default()
    });
    commands.insert_resource(PropAssets {
        tree_mesh: meshes.add(tree_mesh()),
        rock_mesh: meshes.add(rock_mesh()),
        material,
    });
    info!("Prop meshes and shared material ready");
}

/// 低多边形树：六棱台树干加一个锥形树冠
pub fn tree_mesh() -> Mesh {
    let mut builder = PropMeshBuilder::new();
    builder.add_cone(0.5, 0.4, 0.0, 4.0, 6, TRUNK_COLOR);
    builder.add_cone(3.0, 0.0, 3.5, 8.0, 6, CANOPY_COLOR);
    // 树冠底面朝下封口，避免仰视时看穿
    builder.add_disc(3.0, 3.5, 6, CANOPY_COLOR);
    builder.build()
}

/// 压扁的五棱双台石头
pub fn rock_mesh() -> Mesh {
    let mut builder = PropMeshBuilder::new();
    builder.add_cone(1.8, 1.4, 0.0, 0.7, 5, ROCK_COLOR);
    builder.add_cone(1.4, 0.0, 0.7, 0.6, 5, ROCK_COLOR);
    builder.build()
}

#[derive(Default)]
pub struct PropMeshBuilder {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
}

impl PropMeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绕Y轴的平顶锥面，顶半径为0时退化成尖锥
    pub fn add_cone(
        &mut self,
        bottom_radius: f32,
        top_radius: f32,
        base_y: f32,
        height: f32,
        segments: u32,
        color: [f32; 4],
    ) {
        let top_y = base_y + height;
        for i in 0..segments {
            let theta_a = i as f32 / segments as f32 * TAU;
            let theta_b = (i + 1) as f32 / segments as f32 * TAU;
            let theta_m = (theta_a + theta_b) * 0.5;
            // 平直着色：整个侧面共用一条法线
            let normal =
                Vec3::new(height * theta_m.cos(), bottom_radius - top_radius, height * theta_m.sin())
                    .normalize();

            let base_index = self.positions.len() as u32;
            let bottom_a = Vec3::new(bottom_radius * theta_a.cos(), base_y, bottom_radius * theta_a.sin());
            let bottom_b = Vec3::new(bottom_radius * theta_b.cos(), base_y, bottom_radius * theta_b.sin());

            if top_radius > 0.0 {
                let top_b = Vec3::new(top_radius * theta_b.cos(), top_y, top_radius * theta_b.sin());
                let top_a = Vec3::new(top_radius * theta_a.cos(), top_y, top_radius * theta_a.sin());
                for position in [bottom_a, bottom_b, top_b, top_a] {
                    self.positions.push(position);
                    self.normals.push(normal);
                    self.colors.push(color);
                }
                for index in [0, 2, 1, 0, 3, 2] {
                    self.indices.push(base_index + index);
                }
            } else {
                let apex = Vec3::new(0.0, top_y, 0.0);
                for position in [bottom_a, bottom_b, apex] {
                    self.positions.push(position);
                    self.normals.push(normal);
                    self.colors.push(color);
                }
                for index in [0, 2, 1] {
                    self.indices.push(base_index + index);
                }
            }
        }
    }

    /// 朝下的圆盘封口
    pub fn add_disc(&mut self, radius: f32, y: f32, segments: u32, color: [f32; 4]) {
        let base_index = self.positions.len() as u32;
        self.positions.push(Vec3::new(0.0, y, 0.0));
        self.normals.push(Vec3::NEG_Y);
        self.colors.push(color);
        for i in 0..=segments {
            let theta = i as f32 / segments as f32 * TAU;
            self.positions.push(Vec3::new(radius * theta.cos(), y, radius * theta.sin()));
            self.normals.push(Vec3::NEG_Y);
            self.colors.push(color);
        }
        for i in 0..segments {
            self.indices.push(base_index);
            self.indices.push(base_index + 1 + i);
            self.indices.push(base_index + 2 + i);
        }
    }

    pub fn build(self) -> Mesh {
        // 兼容Bevy 0.12 API
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList);

        let positions: Vec<[f32; 3]> = self.positions.iter().map(|v| [v.x, v.y, v.z]).collect();
        let normals: Vec<[f32; 3]> = self.normals.iter().map(|v| [v.x, v.y, v.z]).collect();

        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, self.colors);
        mesh.set_indices(Some(Indices::U32(self.indices)));

        mesh
    }
}

use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};

use crate::world::builder::TerrainMeshData;

/// 把构建好的网格数据转成Bevy网格，顶点色走COLOR属性
pub fn mesh_from_data(data: TerrainMeshData) -> Mesh {
    // 兼容Bevy 0.12 API
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList);

    // 转换顶点位置为数组格式
    let positions: Vec<[f32; 3]> = data.positions.iter().map(|v| [v.x, v.y, v.z]).collect();
    let normals: Vec<[f32; 3]> = data.normals.iter().map(|v| [v.x, v.y, v.z]).collect();

    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, data.colors);
    mesh.set_indices(Some(Indices::U32(data.indices)));

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::VertexAttributeValues;
    use crate::world::builder::{build_terrain_mesh, ColorRamp};
    use crate::world::generator::{NoiseParams, SampleGrid, TerrainNoise};

    #[test]
    fn test_mesh_carries_all_vertex_buffers() {
        let params = NoiseParams {
            scale: 0.01,
            octaves: 3,
            lacunarity: 2.0,
            persistence: 0.5,
            amplitude: 10.0,
            gradient_exp: 2.0,
        };
        let noise = TerrainNoise::new(7, params);
        let grid = SampleGrid::new(4, 4, IVec2::ZERO);
        let (data, _) = build_terrain_mesh(grid, Vec2::ZERO, &noise, 0.03, &ColorRamp::terrain_default());

        let vertex_count = data.positions.len();
        let index_count = data.indices.len();
        let mesh = mesh_from_data(data);

        assert_eq!(mesh.count_vertices(), vertex_count);
        match mesh.attribute(Mesh::ATTRIBUTE_COLOR) {
            Some(VertexAttributeValues::Float32x4(colors)) => assert_eq!(colors.len(), vertex_count),
            other => panic!("unexpected color attribute: {:?}", other),
        }
        match mesh.indices() {
            Some(Indices::U32(indices)) => assert_eq!(indices.len(), index_count),
            other => panic!("unexpected index buffer: {:?}", other),
        }
    }

    #[test]
    fn test_empty_data_builds_empty_mesh() {
        let mesh = mesh_from_data(TerrainMeshData::default());
        assert_eq!(mesh.count_vertices(), 0);
    }
}

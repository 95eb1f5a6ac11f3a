use bevy::diagnostic::DiagnosticsStore;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin};
use serde::{Deserialize, Serialize};

use crate::game_state::{AppState, PresetSaveQueue};
use crate::world::generator::NoiseParams;
use crate::world::tile::{TerrainTile, TileState};

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin)
            .insert_resource(TerrainSettings::default())
            .insert_resource(ExitConfirm::default())
            .add_systems(
                Update,
                (
                    settings_panel_system.run_if(in_state(AppState::Settings)),
                    preview_scrub_system.run_if(in_state(AppState::Settings)),
                    overlay_panel_system.run_if(in_state(AppState::InGame)),
                    exit_confirm_system.run_if(in_state(AppState::InGame)),
                ),
            );
    }
}

/// All terrain generation knobs in one place. The generation systems
/// snapshot from here at the start of each pass and never read back,
/// so a slider change only takes effect through a regeneration.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct TerrainSettings {
    pub seed: u32,
    pub tile_width: u32,
    pub tile_depth: u32,
    pub x_tiles: i32,
    pub z_tiles: i32,
    pub amplitude: f32,
    pub octaves: u32,
    pub water_level: f32,
    pub noise_scale: f32,
    pub gradient_exp: f32,
    pub lacunarity: f32,
    pub persistence: f32,
    pub tree_count: u32,
    pub rock_count: u32,
    pub base_offset_x: f32,
    pub base_offset_z: f32,
    pub time_of_day: f32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            seed: 12345,
            tile_width: 200,
            tile_depth: 200,
            x_tiles: 12,
            z_tiles: 10,
            amplitude: 100.0,
            octaves: 8,
            water_level: 0.03,
            noise_scale: 0.005,
            gradient_exp: 8.0,
            lacunarity: 2.0,
            persistence: 0.4,
            tree_count: 100,
            rock_count: 25,
            base_offset_x: 1002.0,
            base_offset_z: 1000.8,
            time_of_day: 90.0,
        }
    }
}

impl TerrainSettings {
    pub fn noise_params(&self) -> NoiseParams {
        NoiseParams {
            scale: self.noise_scale,
            octaves: self.octaves,
            lacunarity: self.lacunarity,
            persistence: self.persistence,
            amplitude: self.amplitude,
            gradient_exp: self.gradient_exp,
        }
    }

    pub fn base_offset(&self) -> Vec2 {
        Vec2::new(self.base_offset_x, self.base_offset_z)
    }
}

/// Escape brings up a leave-the-world confirmation before dropping
/// back to the settings screen.
#[derive(Resource, Default)]
pub struct ExitConfirm {
    pub open: bool,
}

fn settings_panel_system(
    mut contexts: EguiContexts,
    mut settings: ResMut<TerrainSettings>,
    mut save_queue: ResMut<PresetSaveQueue>,
    mut next_state: ResMut<NextState<AppState>>,
) {
    let ctx = contexts.ctx_mut();
    // Only mark the resource changed when a widget actually moved,
    // otherwise the preview would restart on every frame.
    let s = settings.bypass_change_detection();
    let mut changed = false;

    egui::Window::new("Terrain Settings")
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            // Height
            ui.horizontal(|ui| {
                ui.label("Height");
                changed |= ui
                    .add(egui::Slider::new(&mut s.amplitude, 1.0..=120.0).step_by(1.0))
                    .changed();
            });

            // Octaves
            ui.horizontal(|ui| {
                ui.label("Octaves");
                changed |= ui.add(egui::Slider::new(&mut s.octaves, 1..=8)).changed();
            });

            // Water level
            ui.horizontal(|ui| {
                ui.label("Water level");
                changed |= ui
                    .add(egui::Slider::new(&mut s.water_level, 0.0..=1.0).step_by(0.01))
                    .changed();
            });

            // Noise scale
            ui.horizontal(|ui| {
                ui.label("Noise scale");
                changed |= ui
                    .add(egui::Slider::new(&mut s.noise_scale, 0.0025..=0.0175).step_by(0.0005))
                    .changed();
            });

            // Gradient
            ui.horizontal(|ui| {
                ui.label("Gradient");
                changed |= ui
                    .add(egui::Slider::new(&mut s.gradient_exp, 0.2..=8.0).step_by(0.1))
                    .changed();
            });

            // Lacunarity
            ui.horizontal(|ui| {
                ui.label("Lacunarity");
                changed |= ui
                    .add(egui::Slider::new(&mut s.lacunarity, 1.0..=3.0).step_by(0.1))
                    .changed();
            });

            // Persistence
            ui.horizontal(|ui| {
                ui.label("Persistence");
                changed |= ui
                    .add(egui::Slider::new(&mut s.persistence, 0.1..=0.6).step_by(0.05))
                    .changed();
            });

            // Trees
            ui.horizontal(|ui| {
                ui.label("Trees");
                changed |= ui.add(egui::Slider::new(&mut s.tree_count, 0..=500)).changed();
            });

            // Rocks
            ui.horizontal(|ui| {
                ui.label("Rocks");
                changed |= ui.add(egui::Slider::new(&mut s.rock_count, 0..=200)).changed();
            });

            // Seed
            ui.horizontal(|ui| {
                ui.label("Seed");
                let mut seed_text = s.seed.to_string();
                if ui.text_edit_singleline(&mut seed_text).changed() {
                    if let Ok(value) = seed_text.parse::<u32>() {
                        s.seed = value;
                        changed = true;
                    }
                }
            });

            ui.colored_label(egui::Color32::GRAY, "WASD pans the previewed area");
            ui.separator();

            ui.horizontal(|ui| {
                if ui.button("Generate world").clicked() {
                    next_state.set(AppState::InGame);
                }
                if ui.button("Reset").clicked() {
                    // Seed and clock survive a reset, everything else
                    // goes back to the stock terrain.
                    *s = TerrainSettings {
                        seed: s.seed,
                        time_of_day: s.time_of_day,
                        ..TerrainSettings::default()
                    };
                    changed = true;
                }
                if ui.button("Save preset").clicked() {
                    save_queue.pending.push(s.clone());
                }
            });
        });

    if changed {
        settings.set_changed();
    }
}

/// WASD pans the base noise offset while previewing, one tile width
/// per second on each axis.
fn preview_scrub_system(
    keyboard: Res<Input<KeyCode>>,
    time: Res<Time>,
    mut settings: ResMut<TerrainSettings>,
) {
    let mut delta = Vec2::ZERO;
    if keyboard.pressed(KeyCode::W) {
        delta.y -= 1.0;
    }
    if keyboard.pressed(KeyCode::S) {
        delta.y += 1.0;
    }
    if keyboard.pressed(KeyCode::A) {
        delta.x -= 1.0;
    }
    if keyboard.pressed(KeyCode::D) {
        delta.x += 1.0;
    }
    if delta == Vec2::ZERO {
        return;
    }
    let step = time.delta_seconds();
    let s = settings.bypass_change_detection();
    s.base_offset_x += delta.x * step;
    s.base_offset_z += delta.y * step;
    settings.set_changed();
}

fn overlay_panel_system(
    mut contexts: EguiContexts,
    mut settings: ResMut<TerrainSettings>,
    diagnostics: Res<DiagnosticsStore>,
    tiles: Query<&TerrainTile>,
) {
    let mut ready = 0;
    let mut generating = 0;
    for tile in tiles.iter() {
        match tile.state {
            TileState::Ready => ready += 1,
            TileState::Generating => generating += 1,
            TileState::Idle => {}
        }
    }

    let ctx = contexts.ctx_mut();
    egui::Window::new("World").show(ctx, |ui| {
        if let Some(fps) = diagnostics
            .get(bevy::diagnostic::FrameTimeDiagnosticsPlugin::FPS)
            .and_then(|d| d.smoothed())
        {
            ui.label(format!("FPS: {:.1}", fps));
        }
        ui.label(format!("Tiles ready: {} / generating: {}", ready, generating));
        ui.separator();

        // Time of day
        ui.horizontal(|ui| {
            ui.label("Time of day");
            ui.add(egui::Slider::new(&mut settings.time_of_day, 0.0..=180.0).step_by(1.0));
        });
        ui.separator();
        ui.colored_label(egui::Color32::GRAY, "Esc: leave world, Alt: release cursor");
    });
}

fn exit_confirm_system(
    keyboard: Res<Input<KeyCode>>,
    mut confirm: ResMut<ExitConfirm>,
    mut contexts: EguiContexts,
    mut windows: Query<&mut Window>,
    mut next_state: ResMut<NextState<AppState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        confirm.open = !confirm.open;
        if confirm.open {
            if let Ok(mut window) = windows.get_single_mut() {
                window.cursor.grab_mode = bevy::window::CursorGrabMode::None;
                window.cursor.visible = true;
            }
        }
    }
    if !confirm.open {
        return;
    }

    let ctx = contexts.ctx_mut();
    egui::Window::new("Leave world?")
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            ui.label("Return to the settings screen?");
            ui.horizontal(|ui| {
                if ui.button("Back to settings").clicked() {
                    confirm.open = false;
                    next_state.set(AppState::Settings);
                }
                if ui.button("Stay").clicked() {
                    confirm.open = false;
                }
            });
        });
}

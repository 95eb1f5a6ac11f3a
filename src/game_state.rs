use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task};
use futures_lite::future;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::ui::TerrainSettings;

/// 应用状态：设置预览界面和生成出来的世界
#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppState {
    #[default]
    Settings,
    InGame,
}

/// 预设文件的读写错误
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("preset io error: {0}")]
    Io(#[from] io::Error),
    #[error("preset parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 落盘的地形预设，带保存时间戳
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainPreset {
    pub saved_at: String,
    pub settings: TerrainSettings,
}

impl TerrainPreset {
    pub fn stamped(settings: TerrainSettings) -> Self {
        Self {
            saved_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            settings,
        }
    }
}

pub const PRESET_PATH: &str = "terrain_preset.json";

pub fn load_preset(path: &Path) -> Result<TerrainPreset, PresetError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_preset(path: &Path, preset: &TerrainPreset) -> Result<(), PresetError> {
    let json = serde_json::to_string_pretty(preset)?;
    fs::write(path, json)?;
    Ok(())
}

/// 等待保存的设置快照
#[derive(Resource, Default)]
pub struct PresetSaveQueue {
    pub pending: Vec<TerrainSettings>,
}

/// 异步保存任务
#[derive(Component)]
pub struct PresetSaveTask {
    pub task: Task<Result<(), PresetError>>,
}

/// 保存任务轮询定时器，限制检查频率以减少IO
#[derive(Resource)]
pub struct SaveTaskTimer {
    pub timer: Timer,
}

impl Default for SaveTaskTimer {
    fn default() -> Self {
        Self {
            timer: Timer::from_seconds(1.0, TimerMode::Repeating), // 每秒检查一次
        }
    }
}

/// 启动时尝试读入上次保存的预设
fn load_preset_system(mut settings: ResMut<TerrainSettings>) {
    match load_preset(Path::new(PRESET_PATH)) {
        Ok(preset) => {
            info!("Loaded terrain preset saved at {}", preset.saved_at);
            *settings = preset.settings;
        }
        Err(PresetError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No terrain preset on disk, using defaults");
        }
        Err(e) => {
            warn!("Ignoring unreadable terrain preset: {}", e);
        }
    }
}

/// 把排队的设置快照派发成异步写盘任务
fn dispatch_preset_saves_system(mut commands: Commands, mut queue: ResMut<PresetSaveQueue>) {
    // 同一帧攒下的多次点击只写最后一份
    let Some(settings) = queue.pending.drain(..).last() else {
        return;
    };
    let preset = TerrainPreset::stamped(settings);
    let task_pool = AsyncComputeTaskPool::get();
    let task = task_pool.spawn(async move { write_preset(Path::new(PRESET_PATH), &preset) });
    commands.spawn(PresetSaveTask { task });
    info!("Queued terrain preset save");
}

/// 轮询异步保存任务
fn handle_save_tasks_system(
    time: Res<Time>,
    mut commands: Commands,
    mut save_tasks: Query<(Entity, &mut PresetSaveTask)>,
    mut save_timer: ResMut<SaveTaskTimer>,
) {
    save_timer.timer.tick(time.delta());
    if !save_timer.timer.just_finished() {
        return;
    }

    for (entity, mut save_task) in &mut save_tasks {
        if let Some(result) = future::block_on(future::poll_once(&mut save_task.task)) {
            match result {
                Ok(()) => {
                    debug!("Terrain preset saved");
                }
                Err(e) => {
                    error!("Failed to save terrain preset: {}", e);
                }
            }
            commands.entity(entity).despawn();
        }
    }
}

/// 回到设置界面时释放鼠标
fn release_cursor_system(mut windows: Query<&mut Window>) {
    if let Ok(mut window) = windows.get_single_mut() {
        window.cursor.grab_mode = bevy::window::CursorGrabMode::None;
        window.cursor.visible = true;
    }
}

/// 应用状态插件：状态机与预设读写
pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.add_state::<AppState>()
            .init_resource::<PresetSaveQueue>()
            .init_resource::<SaveTaskTimer>()
            .add_systems(Startup, load_preset_system)
            .add_systems(OnEnter(AppState::Settings), release_cursor_system)
            .add_systems(
                Update,
                (dispatch_preset_saves_system, handle_save_tasks_system),
            );
    }
}

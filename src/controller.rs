use bevy::input::mouse::{MouseButton, MouseMotion};
use bevy::input::Input;
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, PrimaryWindow};

use crate::game_state::AppState;
use crate::ui::ExitConfirm;

pub struct ControllerPlugin;

impl Plugin for ControllerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, (
            handle_mouse_look,
            handle_movement,
            handle_cursor_grab,
        ).run_if(in_state(AppState::InGame)));
    }
}

/// 自由飞行的观察者，瓦片回收以它的位置为参照
#[derive(Component)]
pub struct Observer {
    pub speed: f32,
    pub sensitivity: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for Observer {
    fn default() -> Self {
        Self {
            speed: 100.0,
            sensitivity: 0.002,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

// 偏航角直接给出压平的水平方向，移动不受俯仰影响
fn yaw_basis(yaw: f32) -> (Vec3, Vec3) {
    let forward = Vec3::new(-yaw.sin(), 0.0, -yaw.cos());
    let right = Vec3::new(yaw.cos(), 0.0, -yaw.sin());
    (forward, right)
}

fn handle_mouse_look(
    mut mouse_motion: EventReader<MouseMotion>,
    mut observer_query: Query<(&mut Observer, &mut Transform)>,
    mut primary_window: Query<&mut Window, With<PrimaryWindow>>,
    keyboard: Res<Input<KeyCode>>,
) {
    let mut window = primary_window.single_mut();
    if window.cursor.grab_mode != CursorGrabMode::Locked {
        return;
    }

    // 按住ALT键时不处理鼠标视角
    if keyboard.pressed(KeyCode::AltLeft) || keyboard.pressed(KeyCode::AltRight) {
        return;
    }

    for (mut observer, mut transform) in observer_query.iter_mut() {
        for motion in mouse_motion.read() {
            // 更新yaw和pitch
            observer.yaw -= motion.delta.x * observer.sensitivity;
            observer.pitch -= motion.delta.y * observer.sensitivity;

            // 限制pitch范围
            observer.pitch = observer.pitch.clamp(-1.54, 1.54); // ~88度

            transform.rotation = Quat::from_euler(EulerRot::YXZ, observer.yaw, observer.pitch, 0.0);
        }
    }

    // 有鼠标事件时把系统光标拉回窗口中心，实现"锁定在中心"的效果
    let center = Vec2::new(window.width() / 2.0, window.height() / 2.0);
    window.set_cursor_position(Some(center));
}

fn handle_movement(
    mut query: Query<(&Observer, &mut Transform)>,
    keyboard: Res<Input<KeyCode>>,
    time: Res<Time>,
    confirm: Res<ExitConfirm>,
) {
    if confirm.open {
        return;
    }

    for (observer, mut transform) in query.iter_mut() {
        let (forward, right) = yaw_basis(observer.yaw);
        let mut input_direction = Vec3::ZERO;

        // 处理输入
        if keyboard.pressed(KeyCode::W) { input_direction += forward; }
        if keyboard.pressed(KeyCode::S) { input_direction -= forward; }
        if keyboard.pressed(KeyCode::A) { input_direction -= right; }
        if keyboard.pressed(KeyCode::D) { input_direction += right; }

        // 垂直移动靠空格和Shift
        if keyboard.pressed(KeyCode::Space) { input_direction.y += 1.0; }
        if keyboard.pressed(KeyCode::ShiftLeft) { input_direction.y -= 1.0; }

        if input_direction.length_squared() > 0.0 {
            let velocity = input_direction.normalize() * observer.speed;
            transform.translation += velocity * time.delta_seconds();
        }
    }
}

fn handle_cursor_grab(
    mouse_buttons: Res<Input<MouseButton>>,
    keyboard: Res<Input<KeyCode>>,
    confirm: Res<ExitConfirm>,
    mut primary_window: Query<&mut Window, With<PrimaryWindow>>,
) {
    // 退出确认窗开着时光标交给界面
    if confirm.open {
        return;
    }

    let mut window = primary_window.single_mut();

    // 鼠标左键点击窗口后自动锁定并隐藏光标，但按住ALT时不锁定
    if mouse_buttons.just_pressed(MouseButton::Left)
        && !keyboard.pressed(KeyCode::AltLeft)
        && !keyboard.pressed(KeyCode::AltRight)
    {
        lock_cursor(&mut window);
    }

    // 按住 Alt 键时，临时解锁鼠标（释放即可继续锁定）
    if keyboard.pressed(KeyCode::AltLeft) || keyboard.pressed(KeyCode::AltRight) {
        if window.cursor.grab_mode == CursorGrabMode::Locked {
            window.cursor.grab_mode = CursorGrabMode::None;
            window.cursor.visible = true;
        }
    } else if window.cursor.visible && window.cursor.grab_mode == CursorGrabMode::None {
        // 松开 Alt 后自动回到锁定，同时再次居中
        lock_cursor(&mut window);
    }
}

fn lock_cursor(window: &mut Window) {
    window.cursor.grab_mode = CursorGrabMode::Locked;
    window.cursor.visible = false;
    // 居中系统鼠标位置，避免锁定前存在偏移
    let center = Vec2::new(window.width() / 2.0, window.height() / 2.0);
    window.set_cursor_position(Some(center));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_yaw_basis_spans_horizontal_plane() {
        let (forward, right) = yaw_basis(0.0);
        assert!(forward.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert!(right.abs_diff_eq(Vec3::X, 1e-6));

        let (forward, right) = yaw_basis(FRAC_PI_2);
        assert!(forward.abs_diff_eq(Vec3::NEG_X, 1e-6));
        assert!(right.abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn test_yaw_basis_stays_flat_and_unit_length() {
        for i in 0..16 {
            let yaw = i as f32 * 0.41;
            let (forward, right) = yaw_basis(yaw);
            assert_eq!(forward.y, 0.0);
            assert_eq!(right.y, 0.0);
            assert!((forward.length() - 1.0).abs() < 1e-6);
            assert!((right.length() - 1.0).abs() < 1e-6);
            assert!(forward.dot(right).abs() < 1e-6);
        }
    }
}

use glam::Vec2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::engine::FrameIntent;
use crate::movement::MovementIntent;

pub const DEFAULT_INPUT_PATH: &str = "config/input.json";

/// Held keys, edge-triggered actions, and accumulated mouse motion for one frame.
pub struct Input {
    bindings: InputBindings,
    mouse_delta: Vec2,
    forward_held: bool,
    backward_held: bool,
    left_held: bool,
    right_held: bool,
    sprint_held: bool,
    activate_pressed: bool,
    release_cursor_pressed: bool,
    left_clicked: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_bindings(InputBindings::load_or_default(path))
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self {
            bindings,
            mouse_delta: Vec2::ZERO,
            forward_held: false,
            backward_held: false,
            left_held: false,
            right_held: false,
            sprint_held: false,
            activate_pressed: false,
            release_cursor_pressed: false,
            left_clicked: false,
        }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => self.apply_key_binding(&key, pressed),
            InputEvent::MouseMove { dx, dy } => self.mouse_delta += Vec2::new(dx, dy),
            InputEvent::MouseButton { button: MouseButton::Left, pressed: true } => self.left_clicked = true,
            InputEvent::MouseButton { .. } | InputEvent::Other => {}
        }
    }

    /// Movement from the held keys.
    pub fn movement(&self) -> MovementIntent {
        let axis = |positive: bool, negative: bool| (positive as i8 - negative as i8) as f32;
        MovementIntent {
            forward: axis(self.forward_held, self.backward_held),
            strafe: axis(self.right_held, self.left_held),
            sprint: self.sprint_held,
        }
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Builds this frame's intent and clears the per-frame accumulators. Mouse motion
    /// and clicks only count while the cursor is captured.
    pub fn take_frame_intent(&mut self, cursor_captured: bool) -> FrameIntent {
        let clicked = std::mem::take(&mut self.left_clicked);
        let look = std::mem::take(&mut self.mouse_delta);
        let activate = std::mem::take(&mut self.activate_pressed) || (cursor_captured && clicked);
        FrameIntent {
            movement: self.movement(),
            look_delta: if cursor_captured { look } else { Vec2::ZERO },
            activate,
        }
    }

    pub fn take_left_click(&mut self) -> bool {
        std::mem::take(&mut self.left_clicked)
    }

    pub fn take_release_cursor(&mut self) -> bool {
        std::mem::take(&mut self.release_cursor_pressed)
    }

    /// Drops held state, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        let bindings = std::mem::take(&mut self.bindings);
        *self = Self::with_bindings(bindings);
    }

    fn apply_key_binding(&mut self, key: &Key, pressed: bool) {
        if let Some(binding_key) = InputKeyBinding::from_event_key(key) {
            let actions: Vec<_> = self.bindings.actions_for_key(&binding_key).collect();
            for action in actions {
                self.update_action_state(action, pressed);
            }
        }
    }

    fn update_action_state(&mut self, action: InputAction, pressed: bool) {
        match action {
            InputAction::MoveForward => self.forward_held = pressed,
            InputAction::MoveBackward => self.backward_held = pressed,
            InputAction::StrafeLeft => self.left_held = pressed,
            InputAction::StrafeRight => self.right_held = pressed,
            InputAction::Sprint => self.sprint_held = pressed,
            InputAction::Activate => {
                if pressed {
                    self.activate_pressed = true;
                }
            }
            InputAction::ReleaseCursor => {
                if pressed {
                    self.release_cursor_pressed = true;
                }
            }
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    log::warn!("[input] Failed to parse {}: {err}. Falling back to default bindings.", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!("[input] Failed to read {}: {err}. Falling back to default bindings.", path.display());
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in config.into_overrides(origin) {
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(MoveForward, vec![InputKeyBinding::character("w"), InputKeyBinding::named(NamedKeyCode::ArrowUp)]);
        map.insert(MoveBackward, vec![InputKeyBinding::character("s"), InputKeyBinding::named(NamedKeyCode::ArrowDown)]);
        map.insert(StrafeLeft, vec![InputKeyBinding::character("a"), InputKeyBinding::named(NamedKeyCode::ArrowLeft)]);
        map.insert(StrafeRight, vec![InputKeyBinding::character("d"), InputKeyBinding::named(NamedKeyCode::ArrowRight)]);
        map.insert(Sprint, vec![InputKeyBinding::named(NamedKeyCode::Shift)]);
        map.insert(Activate, vec![InputKeyBinding::character("e"), InputKeyBinding::named(NamedKeyCode::Enter)]);
        map.insert(ReleaseCursor, vec![InputKeyBinding::named(NamedKeyCode::Escape)]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn named(named: NamedKeyCode) -> Self {
        Self::Named(named)
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) if !ch.is_empty() => Some(Self::Character(ch.to_lowercase())),
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if let Some(named) = NamedKeyCode::parse(&normalized) {
            return Some(Self::Named(named));
        }
        (normalized.chars().count() == 1).then_some(Self::Character(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Space,
    Shift,
    Control,
    Enter,
    Escape,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Space => Some(Self::Space),
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::Control => Some(Self::Control),
            NamedKey::Enter => Some(Self::Enter),
            NamedKey::Escape => Some(Self::Escape),
            NamedKey::Tab => Some(Self::Tab),
            NamedKey::ArrowUp => Some(Self::ArrowUp),
            NamedKey::ArrowDown => Some(Self::ArrowDown),
            NamedKey::ArrowLeft => Some(Self::ArrowLeft),
            NamedKey::ArrowRight => Some(Self::ArrowRight),
            _ => None,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "space" => Some(Self::Space),
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "ctrl" | "control" | "left_ctrl" | "right_ctrl" => Some(Self::Control),
            "enter" | "return" => Some(Self::Enter),
            "escape" | "esc" => Some(Self::Escape),
            "tab" => Some(Self::Tab),
            "up" | "arrow_up" => Some(Self::ArrowUp),
            "down" | "arrow_down" => Some(Self::ArrowDown),
            "left" | "arrow_left" => Some(Self::ArrowLeft),
            "right" | "arrow_right" => Some(Self::ArrowRight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InputAction {
    MoveForward,
    MoveBackward,
    StrafeLeft,
    StrafeRight,
    Sprint,
    Activate,
    ReleaseCursor,
}

impl InputAction {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "move_forward" => Some(Self::MoveForward),
            "move_backward" => Some(Self::MoveBackward),
            "strafe_left" => Some(Self::StrafeLeft),
            "strafe_right" => Some(Self::StrafeRight),
            "sprint" => Some(Self::Sprint),
            "activate" => Some(Self::Activate),
            "release_cursor" => Some(Self::ReleaseCursor),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let Some(action) = InputAction::parse(&action_name.trim().to_lowercase()) else {
                log::warn!("[input] {origin}: unknown action '{action_name}', ignoring.");
                continue;
            };
            let mut parsed = Vec::new();
            for key in keys {
                match InputKeyBinding::from_config_value(&key) {
                    Some(binding) => parsed.push(binding),
                    None => log::warn!("[input] {origin}: unknown key '{key}' for action '{action_name}', ignoring."),
                }
            }
            if parsed.is_empty() {
                log::warn!("[input] {origin}: action '{action_name}' has no valid keys, keeping defaults.");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

pub enum InputEvent {
    Key { key: Key, pressed: bool },
    MouseMove { dx: f32, dy: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    Other,
}

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                InputEvent::Key { key: event.logical_key.clone(), pressed: event.state == ElementState::Pressed }
            }
            _ => InputEvent::Other,
        }
    }

    pub fn from_device_event(ev: &DeviceEvent) -> Self {
        match ev {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => InputEvent::MouseMove { dx: *dx as f32, dy: *dy as f32 },
            _ => InputEvent::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ch: &str, pressed: bool) -> InputEvent {
        InputEvent::Key { key: Key::Character(ch.into()), pressed }
    }

    #[test]
    fn held_keys_build_movement() {
        let mut input = Input::new();
        input.push(key("W", true));
        input.push(key("d", true));
        input.push(InputEvent::Key { key: Key::Named(NamedKey::Shift), pressed: true });
        let intent = input.movement();
        assert_eq!(intent.forward, 1.0);
        assert_eq!(intent.strafe, 1.0);
        assert!(intent.sprint);
        input.push(key("w", false));
        input.push(key("s", true));
        assert_eq!(input.movement().forward, -1.0);
    }

    #[test]
    fn activation_is_edge_triggered() {
        let mut input = Input::new();
        input.push(key("e", true));
        assert!(input.take_frame_intent(true).activate);
        assert!(!input.take_frame_intent(true).activate, "held key activates once");
    }

    #[test]
    fn look_and_click_need_captured_cursor() {
        let mut input = Input::new();
        input.push(InputEvent::MouseMove { dx: 3.0, dy: -2.0 });
        input.push(InputEvent::MouseMove { dx: 1.0, dy: 0.0 });
        input.push(InputEvent::MouseButton { button: MouseButton::Left, pressed: true });
        let intent = input.take_frame_intent(false);
        assert_eq!(intent.look_delta, Vec2::ZERO);
        assert!(!intent.activate);

        input.push(InputEvent::MouseMove { dx: 4.0, dy: 1.0 });
        input.push(InputEvent::MouseButton { button: MouseButton::Left, pressed: true });
        let intent = input.take_frame_intent(true);
        assert_eq!(intent.look_delta, Vec2::new(4.0, 1.0));
        assert!(intent.activate);
    }

    #[test]
    fn config_overrides_replace_defaults() {
        let file: InputConfigFile = serde_json::from_str(
            r#"{ "bindings": { "move_forward": ["i"], "activate": ["space"], "bogus": ["x"], "sprint": ["??"] } }"#,
        )
        .expect("parse");
        let mut input = Input::with_bindings(InputBindings::from_config(file, "test"));
        input.push(key("w", true));
        assert_eq!(input.movement().forward, 0.0, "default replaced");
        input.push(key("i", true));
        assert_eq!(input.movement().forward, 1.0);
        input.push(InputEvent::Key { key: Key::Named(NamedKey::Space), pressed: true });
        assert!(input.take_frame_intent(false).activate);
        input.push(InputEvent::Key { key: Key::Named(NamedKey::Shift), pressed: true });
        assert!(input.movement().sprint, "invalid override keeps the default");
    }
}

//! Debug panel with the scene tunables.
//!
//! Each [`Controller`] holds one numeric value with a range and a step.
//! Writes are rounded to the step and clamped to the range. The panel is
//! keyboard driven:
//!
//! - `Tab` / `↓` selects the next controller, `Shift+Tab` / `↑` the previous
//! - `→` / `←` change the selected value by 10 steps (100 with `Shift`, 1 with `Alt`)
//! - `H` shows or hides the panel
//!
//! It is drawn as a column of bars in the top right corner of the window, the
//! selected controller's name and value go into the window title.

use winit::keyboard::{Key, ModifiersState, NamedKey};

use crate::{config::TunableDefaults, pipelines::panel::PanelVertex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tunable {
    EnvMapIntensity,
    BackgroundBlurriness,
    BackgroundIntensity,
}

impl Tunable {
    pub fn name(&self) -> &'static str {
        match self {
            Tunable::EnvMapIntensity => "envMapIntensity",
            Tunable::BackgroundBlurriness => "backgroundBlurriness",
            Tunable::BackgroundIntensity => "backgroundIntensity",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Controller {
    pub tunable: Tunable,
    value: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Controller {
    pub fn new(tunable: Tunable, value: f32, min: f32, max: f32, step: f32) -> Self {
        let mut controller = Self {
            tunable,
            value: min,
            min,
            max,
            step,
        };
        controller.set(value);
        controller
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Stores `value` rounded to the step and clamped to the range. Returns
    /// whether the stored value changed.
    pub fn set(&mut self, value: f32) -> bool {
        let value = if value.is_nan() { self.value } else { value };
        let quantised = if self.step > 0.0 {
            (value / self.step).round() * self.step
        } else {
            value
        };
        let clamped = quantised.clamp(self.min, self.max);
        let changed = clamped != self.value;
        self.value = clamped;
        changed
    }

    pub fn nudge(&mut self, steps: f32) -> bool {
        self.set(self.value + steps * self.step)
    }

    /// Position of the value inside the range, 0 to 1.
    pub fn fraction(&self) -> f32 {
        if self.max > self.min {
            ((self.value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

const PANEL_WIDTH: f32 = 220.0;
const ROW_HEIGHT: f32 = 18.0;
const ROW_GAP: f32 = 6.0;
const MARGIN: f32 = 12.0;
const PADDING: f32 = 6.0;

const BACKDROP: [f32; 4] = [0.1, 0.1, 0.1, 0.8];
const TRACK: [f32; 4] = [0.25, 0.25, 0.25, 1.0];
const FILL: [f32; 4] = [0.18, 0.6, 0.95, 1.0];
const SELECTED: [f32; 4] = [0.95, 0.95, 0.95, 0.25];

#[derive(Debug)]
pub struct DebugPanel {
    pub controllers: Vec<Controller>,
    selected: usize,
    visible: bool,
    modifiers: ModifiersState,
}

impl DebugPanel {
    pub fn new(defaults: &TunableDefaults) -> Self {
        Self {
            controllers: vec![
                Controller::new(Tunable::EnvMapIntensity, defaults.env_map_intensity, 0.0, 10.0, 0.001),
                Controller::new(
                    Tunable::BackgroundBlurriness,
                    defaults.background_blurriness,
                    0.0,
                    1.0,
                    0.001,
                ),
                Controller::new(
                    Tunable::BackgroundIntensity,
                    defaults.background_intensity,
                    0.0,
                    10.0,
                    0.001,
                ),
            ],
            selected: 0,
            visible: true,
            modifiers: ModifiersState::empty(),
        }
    }

    pub fn value(&self, tunable: Tunable) -> Option<f32> {
        self.controllers
            .iter()
            .find(|c| c.tunable == tunable)
            .map(Controller::value)
    }

    pub fn selected(&self) -> &Controller {
        &self.controllers[self.selected]
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_modifiers(&mut self, modifiers: ModifiersState) {
        self.modifiers = modifiers;
    }

    /// Writes `value` into the controller of `tunable`. Returns the stored
    /// value when it changed.
    pub fn set(&mut self, tunable: Tunable, value: f32) -> Option<f32> {
        let controller = self.controllers.iter_mut().find(|c| c.tunable == tunable)?;
        controller.set(value).then(|| controller.value())
    }

    fn select(&mut self, offset: isize) {
        let len = self.controllers.len() as isize;
        self.selected = (self.selected as isize + offset).rem_euclid(len) as usize;
    }

    fn step_multiplier(&self) -> f32 {
        if self.modifiers.shift_key() {
            100.0
        } else if self.modifiers.alt_key() {
            1.0
        } else {
            10.0
        }
    }

    /// Handles a pressed key. Returns the tunable and its new value when the
    /// key changed a value.
    pub fn handle_key(&mut self, key: &Key) -> Option<(Tunable, f32)> {
        if let Key::Character(c) = key {
            if c.eq_ignore_ascii_case("h") {
                self.visible = !self.visible;
            }
            return None;
        }
        if !self.visible {
            return None;
        }
        let steps = match key {
            Key::Named(NamedKey::Tab) if self.modifiers.shift_key() => {
                self.select(-1);
                return None;
            }
            Key::Named(NamedKey::Tab | NamedKey::ArrowDown) => {
                self.select(1);
                return None;
            }
            Key::Named(NamedKey::ArrowUp) => {
                self.select(-1);
                return None;
            }
            Key::Named(NamedKey::ArrowRight) => self.step_multiplier(),
            Key::Named(NamedKey::ArrowLeft) => -self.step_multiplier(),
            _ => return None,
        };
        let controller = &mut self.controllers[self.selected];
        controller
            .nudge(steps)
            .then(|| (controller.tunable, controller.value()))
    }

    /// Window title showing the selected controller.
    pub fn title(&self, base: &str) -> String {
        if !self.visible {
            return base.to_string();
        }
        let controller = self.selected();
        format!("{} | {} = {:.3}", base, controller.tunable.name(), controller.value())
    }

    /// Overlay quads for a window of `width` x `height` logical pixels.
    pub fn vertices(&self, width: f32, height: f32) -> Vec<PanelVertex> {
        if !self.visible || width <= 0.0 || height <= 0.0 {
            return Vec::new();
        }
        let mut vertices = Vec::with_capacity(6 * (2 + 2 * self.controllers.len()));
        let rows = self.controllers.len() as f32;
        let left = width - MARGIN - PANEL_WIDTH;
        let right = width - MARGIN;
        let bottom = MARGIN + 2.0 * PADDING + rows * ROW_HEIGHT + (rows - 1.0).max(0.0) * ROW_GAP;
        push_quad(&mut vertices, [left, MARGIN, right, bottom], BACKDROP, width, height);

        for (row, controller) in self.controllers.iter().enumerate() {
            let top = MARGIN + PADDING + row as f32 * (ROW_HEIGHT + ROW_GAP);
            let track = [left + PADDING, top, right - PADDING, top + ROW_HEIGHT];
            if row == self.selected {
                let highlight = [left + 2.0, top - 2.0, right - 2.0, top + ROW_HEIGHT + 2.0];
                push_quad(&mut vertices, highlight, SELECTED, width, height);
            }
            push_quad(&mut vertices, track, TRACK, width, height);
            let fill_right = track[0] + (track[2] - track[0]) * controller.fraction();
            if fill_right > track[0] {
                push_quad(&mut vertices, [track[0], track[1], fill_right, track[3]], FILL, width, height);
            }
        }
        vertices
    }
}

/// Appends two triangles for `rect` = [left, top, right, bottom] in logical
/// pixels measured from the top left corner.
fn push_quad(vertices: &mut Vec<PanelVertex>, rect: [f32; 4], color: [f32; 4], width: f32, height: f32) {
    let x = |px: f32| px / width * 2.0 - 1.0;
    let y = |py: f32| 1.0 - py / height * 2.0;
    let [l, t, r, b] = [x(rect[0]), y(rect[1]), x(rect[2]), y(rect[3])];
    for position in [[l, t], [l, b], [r, b], [l, t], [r, b], [r, t]] {
        vertices.push(PanelVertex { position, color });
    }
}

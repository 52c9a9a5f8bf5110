// ==============================================================================
// input.rs — KEY EVENTS -> CONTROL INTENTS
// ------------------------------------------------------------------------------
// InputController owns the set of currently pressed keys. Events come from an
// injected KeyEventSource (channel, queue, ...), never from global listeners.
//
// handle() returns true only when the pressed set actually changed; the
// simulation re-runs the VehicleController on exactly those events.
// A key-up that never arrives leaves the key stuck until FocusLost.
// ==============================================================================

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

/// Logical control intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Forward,
    Backward,
    SteerLeft,
    SteerRight,
    Brake,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Down(String),
    Up(String),
    /// Window lost focus: every key-up may have been missed.
    FocusLost,
}

impl KeyEvent {
    pub fn down(key: &str) -> Self {
        KeyEvent::Down(normalize_key(key))
    }

    pub fn up(key: &str) -> Self {
        KeyEvent::Up(normalize_key(key))
    }

    /// Line protocol: `+key` (down), `-key` (up), `blur` (focus lost).
    /// Returns None for empty or unrecognised lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("blur") {
            return Some(KeyEvent::FocusLost);
        }
        let mut chars = line.chars();
        let sign = chars.next()?;
        let key = chars.as_str();
        if key.is_empty() {
            return None;
        }
        match sign {
            '+' => Some(KeyEvent::down(key)),
            '-' => Some(KeyEvent::up(key)),
            _ => None,
        }
    }
}

/// Lowercase identifier; a literal space becomes `space`.
pub fn normalize_key(key: &str) -> String {
    if key == " " {
        return "space".to_string();
    }
    key.trim().to_lowercase()
}

// ---- bindings ----

/// Physical keys bound to each intent. Identifiers are compared after
/// [`normalize_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub forward: Vec<String>,
    pub backward: Vec<String>,
    pub steer_left: Vec<String>,
    pub steer_right: Vec<String>,
    pub brake: Vec<String>,
    pub reset: Vec<String>,
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| normalize_key(k)).collect()
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: keys(&["w", "ArrowUp"]),
            backward: keys(&["s", "ArrowDown"]),
            steer_left: keys(&["a", "ArrowLeft"]),
            steer_right: keys(&["d", "ArrowRight"]),
            brake: keys(&["space"]),
            reset: keys(&["r"]),
        }
    }
}

impl KeyBindings {
    pub fn keys_for(&self, intent: Intent) -> &[String] {
        match intent {
            Intent::Forward => &self.forward,
            Intent::Backward => &self.backward,
            Intent::SteerLeft => &self.steer_left,
            Intent::SteerRight => &self.steer_right,
            Intent::Brake => &self.brake,
            Intent::Reset => &self.reset,
        }
    }
}

/// Snapshot of active intents, read by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VehicleInputState {
    pub forward: bool,
    pub backward: bool,
    pub steer_left: bool,
    pub steer_right: bool,
    pub brake: bool,
    pub reset: bool,
}

// ---- event sources ----

/// Anything that can hand over pending key events without blocking.
pub trait KeyEventSource {
    fn poll_event(&mut self) -> Option<KeyEvent>;
}

impl KeyEventSource for UnboundedReceiver<KeyEvent> {
    fn poll_event(&mut self) -> Option<KeyEvent> {
        self.try_recv().ok()
    }
}

impl KeyEventSource for VecDeque<KeyEvent> {
    fn poll_event(&mut self) -> Option<KeyEvent> {
        self.pop_front()
    }
}

// ---- controller ----

#[derive(Debug, Default)]
pub struct InputController {
    pressed: BTreeSet<String>,
    bindings: KeyBindings,
}

impl InputController {
    pub fn new(bindings: KeyBindings) -> Self {
        let bindings = KeyBindings {
            forward: normalized(&bindings.forward),
            backward: normalized(&bindings.backward),
            steer_left: normalized(&bindings.steer_left),
            steer_right: normalized(&bindings.steer_right),
            brake: normalized(&bindings.brake),
            reset: normalized(&bindings.reset),
        };
        Self { pressed: BTreeSet::new(), bindings }
    }

    /// Applies one event. Returns true if the pressed set changed.
    pub fn handle(&mut self, event: &KeyEvent) -> bool {
        let changed = match event {
            KeyEvent::Down(key) => self.pressed.insert(normalize_key(key)),
            KeyEvent::Up(key) => self.pressed.remove(&normalize_key(key)),
            KeyEvent::FocusLost => {
                let any = !self.pressed.is_empty();
                if any {
                    debug!(released = self.pressed.len(), "focus lost, releasing keys");
                }
                self.pressed.clear();
                any
            }
        };
        trace!(?event, changed, "key event");
        changed
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.pressed.contains(&normalize_key(key))
    }

    pub fn is_active(&self, intent: Intent) -> bool {
        self.bindings
            .keys_for(intent)
            .iter()
            .any(|k| self.pressed.contains(k))
    }

    pub fn state(&self) -> VehicleInputState {
        VehicleInputState {
            forward: self.is_active(Intent::Forward),
            backward: self.is_active(Intent::Backward),
            steer_left: self.is_active(Intent::SteerLeft),
            steer_right: self.is_active(Intent::SteerRight),
            brake: self.is_active(Intent::Brake),
            reset: self.is_active(Intent::Reset),
        }
    }
}

fn normalized(list: &[String]) -> Vec<String> {
    list.iter().map(|k| normalize_key(k)).collect()
}

use std::collections::HashSet;

use super::types::{
    InputEvent,
    Key,
    KeyState,
    Modifiers,
    MouseButton,
    MouseButtonState,
    PointerButtonEvent,
    PointerMoveEvent,
};

/// Current input state for a single window.
///
/// Holds "is down" information and current pointer position.
#[derive(Debug, Default)]
pub struct InputState {
    /// Current modifier state.
    pub modifiers: Modifiers,

    /// Whether the window is focused.
    pub focused: bool,

    /// Pointer position in logical pixels.
    pub pointer_pos: Option<(f32, f32)>,

    /// Set of currently held keys.
    pub keys_down: HashSet<Key>,

    /// Set of currently held mouse buttons.
    pub buttons_down: HashSet<MouseButton>,
}

impl InputState {
    /// Applies a platform-agnostic input event to the current state.
    pub fn apply_event(&mut self, ev: &InputEvent) {
        match ev {
            InputEvent::ModifiersChanged(m) => {
                self.modifiers = *m;
            }

            InputEvent::Focused(f) => {
                self.focused = *f;
                if !*f {
                    // Avoids stuck keys/buttons when focus changes mid-press.
                    self.keys_down.clear();
                    self.buttons_down.clear();
                }
            }

            InputEvent::PointerMoved(PointerMoveEvent { x, y }) => {
                self.pointer_pos = Some((*x, *y));
            }

            InputEvent::PointerLeft => {
                self.pointer_pos = None;
            }

            InputEvent::Key { key, state, modifiers, .. } => {
                self.modifiers = *modifiers;
                match state {
                    KeyState::Pressed => {
                        self.keys_down.insert(*key);
                    }
                    KeyState::Released => {
                        self.keys_down.remove(key);
                    }
                }
            }

            InputEvent::PointerButton(PointerButtonEvent { button, state, x, y, modifiers }) => {
                self.pointer_pos = Some((*x, *y));
                self.modifiers = *modifiers;
                match state {
                    MouseButtonState::Pressed => {
                        self.buttons_down.insert(*button);
                    }
                    MouseButtonState::Released => {
                        self.buttons_down.remove(button);
                    }
                }
            }

            InputEvent::MouseWheel { modifiers, .. } => {
                self.modifiers = *modifiers;
            }
        }
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn button_down(&self, btn: MouseButton) -> bool {
        self.buttons_down.contains(&btn)
    }

    /// DOM-style mask of the held buttons.
    pub fn buttons_mask(&self) -> u8 {
        self.buttons_down.iter().fold(0, |m, b| m | b.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(button: MouseButton, state: MouseButtonState) -> InputEvent {
        InputEvent::PointerButton(PointerButtonEvent {
            button,
            state,
            x: 3.0,
            y: 4.0,
            modifiers: Modifiers::default(),
        })
    }

    #[test]
    fn buttons_mask_tracks_presses_and_releases() {
        let mut s = InputState::default();
        s.apply_event(&button(MouseButton::Left, MouseButtonState::Pressed));
        s.apply_event(&button(MouseButton::Middle, MouseButtonState::Pressed));
        assert_eq!(s.buttons_mask(), 5);
        s.apply_event(&button(MouseButton::Left, MouseButtonState::Released));
        assert_eq!(s.buttons_mask(), 4);
        assert_eq!(s.pointer_pos, Some((3.0, 4.0)));
    }

    #[test]
    fn focus_loss_clears_held_state() {
        let mut s = InputState::default();
        s.apply_event(&button(MouseButton::Right, MouseButtonState::Pressed));
        s.apply_event(&InputEvent::Key {
            key: Key::A,
            state: KeyState::Pressed,
            modifiers: Modifiers::default(),
            repeat: false,
        });
        s.apply_event(&InputEvent::Focused(false));
        assert_eq!(s.buttons_mask(), 0);
        assert!(!s.key_down(Key::A));
    }
}

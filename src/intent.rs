//! Movement intent components.
//!
//! Intents represent desired movement from player input or AI. The
//! controller systems read these and apply the appropriate physics; input
//! detection itself (keyboard, gamepad, network) stays in user code.

use bevy::prelude::*;

/// Which lateral side a rail switch targets.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RailSide {
    Left,
    Right,
}

/// Unified movement intent for a character.
///
/// Combines the world-space movement direction with the jump, boost, and
/// rail-switch actions. Set the fields every frame from your input source;
/// the controller handles edge detection and buffering.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use rail_character_controller::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// intent.set_move(Vec3::NEG_Z);
/// intent.set_jump_pressed(true);
/// assert!(intent.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct MovementIntent {
    /// Desired world-space movement direction. Clamped to unit length;
    /// shorter vectors are treated as analog partial input.
    pub move_input: Vec3,
    /// Pending jump request, if any.
    ///
    /// Created automatically when `jump_pressed` rises. Consumed by
    /// whichever action claims it first (homing start, rail jump-off,
    /// air dash, ground jump).
    pub jump_request: Option<JumpRequest>,
    /// Whether the jump action is currently held.
    pub jump_pressed: bool,
    /// Previous tick's jump_pressed state (for edge detection).
    pub(crate) jump_pressed_prev: bool,
    /// Whether the run boost action is currently held.
    pub boost_pressed: bool,
    /// Previous tick's boost_pressed state (for edge detection).
    pub(crate) boost_pressed_prev: bool,
    /// One-shot rail switch request. Cleared after the switch system
    /// reads it.
    pub switch_rail: Option<RailSide>,
}

impl Default for MovementIntent {
    fn default() -> Self {
        Self {
            move_input: Vec3::ZERO,
            jump_request: None,
            jump_pressed: false,
            jump_pressed_prev: false,
            boost_pressed: false,
            boost_pressed_prev: false,
            switch_rail: None,
        }
    }
}

impl MovementIntent {
    /// Create a new empty movement intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the world-space movement direction. Clamped to unit length.
    pub fn set_move(&mut self, direction: Vec3) {
        self.move_input = direction.clamp_length_max(1.0);
    }

    /// Clear the movement direction.
    pub fn clear_move(&mut self) {
        self.move_input = Vec3::ZERO;
    }

    /// Check if there is active movement input.
    pub fn is_moving(&self) -> bool {
        self.move_input.length_squared() > 1e-6
    }

    /// Input magnitude in [0, 1]. Below full deflection the solver
    /// treats this as an analog speed modifier.
    pub fn input_magnitude(&self) -> f32 {
        self.move_input.length().min(1.0)
    }

    /// Set the held jump state. Call every frame; the rising edge
    /// creates a buffered [`JumpRequest`].
    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    /// Check if jump is currently held.
    pub fn is_jump_pressed(&self) -> bool {
        self.jump_pressed
    }

    /// Set the held boost state.
    pub fn set_boost_pressed(&mut self, pressed: bool) {
        self.boost_pressed = pressed;
    }

    /// Request a switch to the rail on the given side.
    pub fn request_rail_switch(&mut self, side: RailSide) {
        self.switch_rail = Some(side);
    }

    /// Create a buffered jump request, replacing any pending one.
    pub(crate) fn request_jump(&mut self, buffer_time: f32) {
        self.jump_request = Some(JumpRequest::new(buffer_time));
    }

    /// Take and consume the pending jump request, if any.
    pub fn take_jump_request(&mut self) -> Option<JumpRequest> {
        self.jump_request.take()
    }

    /// Check if there is a pending jump request.
    pub fn has_jump_request(&self) -> bool {
        self.jump_request.is_some()
    }

    /// Clear the pending jump request without consuming it.
    pub fn clear_jump_request(&mut self) {
        self.jump_request = None;
    }
}

/// Jump request stored in [`MovementIntent`].
///
/// Carries a buffer timer; the request expires when the timer finishes
/// before any system consumed it.
#[derive(Reflect, Debug, Clone, Default)]
pub struct JumpRequest {
    /// Buffer timer. When finished, the request expires.
    #[reflect(ignore)]
    pub buffer_timer: Timer,
}

impl JumpRequest {
    /// Create a new jump request with the given buffer duration.
    pub fn new(buffer_time: f32) -> Self {
        Self {
            buffer_timer: Timer::from_seconds(buffer_time, TimerMode::Once),
        }
    }

    /// Tick the buffer timer.
    pub fn tick(&mut self, delta: std::time::Duration) {
        self.buffer_timer.tick(delta);
    }

    /// Check if the request is still valid.
    pub fn is_valid(&self) -> bool {
        !self.buffer_timer.finished()
    }
}

/// Turns jump rising edges into buffered requests.
///
/// Runs at the start of the tick so every consumer this tick sees a
/// fresh request.
pub fn buffer_jump_requests(
    mut query: Query<(&mut MovementIntent, &crate::config::ControllerConfig)>,
) {
    for (mut intent, config) in query.iter_mut() {
        if intent.jump_pressed && !intent.jump_pressed_prev {
            intent.request_jump(config.jump_buffer_time);
        }
    }
}

/// Ticks jump buffers, drops expired requests, and latches the previous
/// pressed states for next tick's edge detection.
///
/// Runs at the end of the tick, after every consumer had its chance.
pub fn expire_jump_requests(time: Res<Time<Fixed>>, mut query: Query<&mut MovementIntent>) {
    let delta = time.delta();
    for mut intent in query.iter_mut() {
        if let Some(ref mut request) = intent.jump_request {
            request.tick(delta);
            if !request.is_valid() {
                intent.jump_request = None;
            }
        }
        intent.jump_pressed_prev = intent.jump_pressed;
        intent.boost_pressed_prev = intent.boost_pressed;
        intent.switch_rail = None;
    }
}

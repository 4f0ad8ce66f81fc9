//! Open/close lifecycle of the slip drawer.
//!
//! Programmatic requests and drag gestures are discrete events. Animation is
//! layered on top by the renderer, which reports back through
//! [`Drawer::transition_finished`]. The drawer never touches the slip itself.

use log::{debug, trace};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DrawerConfig {
    /// Downward travel at which releasing the drag dismisses the drawer.
    pub dismiss_distance: f64,
    /// Downward release velocity at which the drawer is dismissed regardless
    /// of distance.
    pub dismiss_velocity: f64,
}
impl Default for DrawerConfig {
    fn default() -> Self {
        Self {
            dismiss_distance: 100.0,
            dismiss_velocity: 500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerState {
    Closed,
    Opening,
    Open,
    Dragging,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragFeedback {
    /// Current downward displacement.
    Tracking(f64),
    /// Upward motion hit the top; the renderer plays a short nudge.
    Resisted,
    /// Not dragging.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Drawer {
    state: DrawerState,
    displacement: f64,
    config: DrawerConfig,
}
impl Default for Drawer {
    fn default() -> Self {
        Self::new(DrawerConfig::default())
    }
}
impl Drawer {
    pub fn new(config: DrawerConfig) -> Self {
        Self {
            state: DrawerState::Closed,
            displacement: 0.0,
            config,
        }
    }
    pub fn state(&self) -> DrawerState {
        self.state
    }
    pub fn displacement(&self) -> f64 {
        self.displacement
    }
    pub fn is_visible(&self) -> bool {
        self.state != DrawerState::Closed
    }
    pub fn open(&mut self) -> DrawerState {
        if self.state == DrawerState::Closed {
            self.transition(DrawerState::Opening);
        }
        self.state
    }
    pub fn close(&mut self) -> DrawerState {
        match self.state {
            DrawerState::Opening | DrawerState::Open | DrawerState::Dragging => {
                self.transition(DrawerState::Closing)
            }
            DrawerState::Closed | DrawerState::Closing => {}
        }
        self.state
    }
    /// Called by the renderer when the opening or closing animation is done.
    pub fn transition_finished(&mut self) -> DrawerState {
        match self.state {
            DrawerState::Opening => self.transition(DrawerState::Open),
            DrawerState::Closing => {
                self.displacement = 0.0;
                self.transition(DrawerState::Closed)
            }
            _ => {}
        }
        self.state
    }
    pub fn drag_begin(&mut self) -> DrawerState {
        if self.state == DrawerState::Open {
            self.displacement = 0.0;
            self.transition(DrawerState::Dragging);
        }
        self.state
    }
    /// Applies a vertical delta, positive meaning down. Displacement is
    /// clamped at zero. NaN and infinite deltas are ignored.
    pub fn drag_move(&mut self, dy: f64) -> DragFeedback {
        if self.state != DrawerState::Dragging || !dy.is_finite() {
            return DragFeedback::Ignored;
        }
        let next = self.displacement + dy;
        if next < 0.0 {
            self.displacement = 0.0;
            trace!("Rejected upward drag of {}", dy);
            return DragFeedback::Resisted;
        }
        self.displacement = next;
        DragFeedback::Tracking(next)
    }
    /// Either threshold alone commits the dismissal, otherwise the drawer
    /// snaps back open. A non-finite velocity counts as zero.
    pub fn drag_end(&mut self, velocity: f64) -> DrawerState {
        if self.state != DrawerState::Dragging {
            return self.state;
        }
        let velocity = if velocity.is_finite() { velocity } else { 0.0 };
        if self.displacement >= self.config.dismiss_distance
            || velocity >= self.config.dismiss_velocity
        {
            debug!(
                "Dismissing drawer at displacement {} and velocity {}",
                self.displacement, velocity
            );
            self.transition(DrawerState::Closing);
        } else {
            self.displacement = 0.0;
            self.transition(DrawerState::Open);
        }
        self.state
    }
    fn transition(&mut self, next: DrawerState) {
        trace!("Drawer {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

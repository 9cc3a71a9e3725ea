//! Software auto-exposure loop for backends without one in hardware.
//!
//! The controller measures the mean intensity of each delivered frame and
//! scales the exposure time towards the target level. It converges once the
//! measured level has stayed within tolerance for a few consecutive frames.

use crate::info::ValueRange;

/// Progress of an exposure loop towards its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Output is stable at the target.
    Converged,
    /// Still adjusting.
    Settling,
    /// Pinned at an exposure limit while still off target; will not converge.
    Saturated,
}

/// Mean intensity error accepted as on target.
pub const DEFAULT_TOLERANCE: f32 = 0.03;

/// Consecutive on-target frames required before reporting convergence.
pub const DEFAULT_STABLE_FRAMES: u32 = 2;

// Damping on the multiplicative correction; 1.0 would jump straight to the
// linear estimate and overshoot on noisy scenes.
const DAMPING: f32 = 0.8;
const MAX_STEP: f32 = 4.0;
const SATURATION_FRAMES: u32 = 3;

/// Proportional auto-exposure controller.
#[derive(Debug, Clone)]
pub struct AutoExposure {
    target: f32,
    tolerance: f32,
    limits: ValueRange<u32>,
    stable: u32,
    required_stable: u32,
    pinned: u32,
}

impl AutoExposure {
    /// Create a controller aiming for `target` mean intensity within `limits`.
    pub fn new(target: f32, limits: ValueRange<u32>) -> Self {
        Self {
            target: target.clamp(0.0, 1.0),
            tolerance: DEFAULT_TOLERANCE,
            limits,
            stable: 0,
            required_stable: DEFAULT_STABLE_FRAMES,
            pinned: 0,
        }
    }

    /// Current target level.
    pub const fn target(&self) -> f32 {
        self.target
    }

    /// Change the target; convergence starts over.
    pub fn set_target(&mut self, target: f32) {
        self.target = target.clamp(0.0, 1.0);
        self.reset();
    }

    /// Change the exposure limits, e.g. after a frame rate change.
    pub fn set_limits(&mut self, limits: ValueRange<u32>) {
        self.limits = limits;
        self.reset();
    }

    /// Forget convergence progress.
    pub fn reset(&mut self) {
        self.stable = 0;
        self.pinned = 0;
    }

    /// Feed one frame's mean intensity measured at `exposure_us`; returns the
    /// exposure to use for the next frame.
    pub fn update(&mut self, exposure_us: u32, measured: f32) -> u32 {
        let error = self.target - measured;
        if error.abs() <= self.tolerance {
            self.stable = self.stable.saturating_add(1);
            self.pinned = 0;
            return self.limits.clamp(exposure_us);
        }
        self.stable = 0;

        let ratio = if measured <= f32::EPSILON {
            MAX_STEP
        } else {
            (self.target / measured)
                .powf(DAMPING)
                .clamp(1.0 / MAX_STEP, MAX_STEP)
        };
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let proposed = (exposure_us as f32 * ratio).round().min(u32::MAX as f32) as u32;
        let next = self.limits.clamp(proposed);

        let at_limit = (next == self.limits.max && error > 0.0)
            || (next == self.limits.min && error < 0.0);
        if at_limit && next == exposure_us {
            self.pinned = self.pinned.saturating_add(1);
        } else {
            self.pinned = 0;
        }
        next
    }

    /// Where the loop stands.
    pub const fn convergence(&self) -> Convergence {
        if self.stable >= self.required_stable {
            Convergence::Converged
        } else if self.pinned >= SATURATION_FRAMES {
            Convergence::Saturated
        } else {
            Convergence::Settling
        }
    }
}

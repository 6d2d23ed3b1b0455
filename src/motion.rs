//! Velocity shaping applied to physics-driven entities before the sweep.

/// Reduce the magnitude of `vx` by `amount`, stopping at zero.
///
/// Scales the velocity by the remaining-speed ratio, so the sign is kept.
pub fn apply_friction(vx: f32, amount: f32) -> f32 {
    let speed = vx.abs();
    if speed > 0.0 {
        let remaining = (speed - amount).max(0.0);
        vx * (remaining / speed)
    } else {
        vx
    }
}

/// Accelerate `vx` toward `move_speed` by at most `rate * move_speed`.
///
/// When the remaining difference points away from `move_speed`'s sign (the
/// entity already moves faster than its target) no acceleration is applied;
/// slowing down is left to friction.
pub fn accelerate(vx: f32, move_speed: f32, rate: f32) -> f32 {
    let mut difference = move_speed - vx;
    if move_speed.copysign(difference) != move_speed {
        difference = 0.0;
    }
    let mut step = rate * move_speed;
    if step.abs() > difference.abs() {
        step = difference;
    }
    vx + step
}

//! Two-link SCARA inverse kinematics
//!
//! Converts a target position in the arm's plane into the two joint angles
//! that reach it. Targets outside the arm's physical envelope yield
//! [`Solution::Unreachable`], which callers must treat as a normal outcome.

/// Shoulder link length in mm
pub const L1: f64 = 228.0;

/// Elbow link length in mm
pub const L2: f64 = 136.5;

/// Joint angles in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles {
    /// Shoulder angle
    pub theta1: f64,
    /// Elbow angle
    pub theta2: f64,
}

/// Outcome of an inverse kinematics call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Solution {
    /// Target is inside the envelope; angles reach it
    Reachable(JointAngles),
    /// Target is outside the arm's physical envelope
    Unreachable,
}

/// Solve inverse kinematics for a target position (mm)
///
/// Returns the elbow-up solution. Never panics for finite input; targets
/// outside `[(L1-L2)², (L1+L2)²]` squared distance return
/// [`Solution::Unreachable`].
pub fn solve(x: f64, y: f64) -> Solution {
    let cos_theta2 = (x * x + y * y - L1 * L1 - L2 * L2) / (2.0 * L1 * L2);

    // Out of range (or NaN from non-finite input) means the target is
    // outside the annulus the arm can reach.
    if !(-1.0..=1.0).contains(&cos_theta2) {
        return Solution::Unreachable;
    }

    let theta2 = cos_theta2.acos();
    let k1 = L1 + L2 * theta2.cos();
    let k2 = L2 * theta2.sin();
    let theta1 = y.atan2(x) - k2.atan2(k1);

    Solution::Reachable(JointAngles {
        theta1: theta1.to_degrees(),
        theta2: theta2.to_degrees(),
    })
}

/// Forward kinematics: joint angles (degrees) to end-effector position (mm)
pub fn forward(angles: JointAngles) -> (f64, f64) {
    let t1 = angles.theta1.to_radians();
    let t2 = angles.theta2.to_radians();
    let x = L1 * t1.cos() + L2 * (t1 + t2).cos();
    let y = L1 * t1.sin() + L2 * (t1 + t2).sin();
    (x, y)
}

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};
use winit::dpi::PhysicalSize;

use crate::picking::Ray;

const DEFAULT_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// First-person viewpoint. Yaw 0 looks down -Z; positive yaw turns left.
#[derive(Debug, Clone)]
pub struct FirstPersonView {
    pub eye: Vec3,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl FirstPersonView {
    pub fn new(eye: Vec3, yaw_radians: f32) -> Self {
        Self { eye, yaw_radians, pitch_radians: 0.0, fov_y_radians: 70.0_f32.to_radians(), near: 0.05, far: 100.0 }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw_radians, self.pitch_radians, 0.0)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    /// Applies a mouse delta in pixels scaled by `sensitivity` radians per pixel.
    pub fn look(&mut self, delta: Vec2, sensitivity: f32) {
        self.yaw_radians -= delta.x * sensitivity;
        self.pitch_radians = (self.pitch_radians - delta.y * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.eye, self.forward(), DEFAULT_UP)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        let aspect = if viewport.height > 0 { viewport.width as f32 / viewport.height as f32 } else { 1.0 };
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Ray from the eye along the view direction, used for targeting.
    pub fn center_ray(&self) -> Option<Ray> {
        Ray::new(self.eye, self.forward())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_projection_is_finite() {
        let view = FirstPersonView::new(Vec3::new(0.0, 1.6, 0.0), 0.3);
        let vp = view.view_projection(PhysicalSize::new(1280, 720));
        assert!(vp.to_cols_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn positive_yaw_turns_left() {
        let view = FirstPersonView::new(Vec3::ZERO, std::f32::consts::FRAC_PI_2);
        assert!((view.forward() - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut view = FirstPersonView::new(Vec3::ZERO, 0.0);
        view.look(Vec2::new(0.0, -10_000.0), 0.01);
        assert!(view.pitch_radians <= PITCH_LIMIT);
        assert!(view.forward().y > 0.99);
    }
}

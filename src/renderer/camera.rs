//! Perspective camera

use glam::{Mat4, Vec3};

/// First-person perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Unit view direction
    pub direction: Vec3,
    /// World up vector
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Width / height, refreshed on resize
    pub aspect: f32,
    /// Heading in radians
    yaw: f32,
    /// Elevation in radians, clamped short of straight up or down
    pitch: f32,
}

impl Camera {
    /// 60° camera with a 0.1..200 depth range
    #[must_use]
    pub fn new(position: Vec3, yaw_degrees: f32, pitch_degrees: f32) -> Self {
        let mut camera = Self {
            position,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 60.0_f32.to_radians(),
            near: 0.1,
            far: 200.0,
            aspect: 16.0 / 9.0,
            yaw: yaw_degrees.to_radians(),
            pitch: pitch_degrees.to_radians(),
        };
        camera.update_direction();
        camera
    }

    /// Camera at `position` looking at `target`
    #[must_use]
    pub fn look_at(position: Vec3, target: Vec3) -> Self {
        let direction = (target - position).normalize_or(Vec3::NEG_Z);
        Self::new(
            position,
            direction.z.atan2(direction.x).to_degrees(),
            direction.y.clamp(-1.0, 1.0).asin().to_degrees(),
        )
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Follow the framebuffer aspect ratio
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Turn by yaw/pitch deltas (radians per unit)
    pub fn rotate(&mut self, delta_x: f32, delta_y: f32, sensitivity: f32) {
        self.yaw += delta_x * sensitivity;
        self.pitch -= delta_y * sensitivity;
        self.update_direction();
    }

    fn update_direction(&mut self) {
        let max_pitch = 89.0_f32.to_radians();
        self.pitch = self.pitch.clamp(-max_pitch, max_pitch);
        self.direction = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();
    }

    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.direction.cross(self.up).normalize()
    }

    pub fn move_forward(&mut self, amount: f32) {
        self.position += self.direction * amount;
    }

    pub fn move_right(&mut self, amount: f32) {
        self.position += self.right() * amount;
    }

    pub fn move_up(&mut self, amount: f32) {
        self.position += Vec3::Y * amount;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(5.0, 2.0, -5.0), 135.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_points_at_target() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        assert!(camera.direction.abs_diff_eq(Vec3::NEG_Z, 1e-5));

        let clip = camera.view_projection_matrix().project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, -10_000.0, 1.0);
        assert!(camera.direction.y < 1.0);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn test_aspect_ignores_zero_height() {
        let mut camera = Camera::default();
        camera.set_aspect(800, 0);
        assert_eq!(camera.aspect, 800.0);
    }
}

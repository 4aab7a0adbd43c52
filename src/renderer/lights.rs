//! Directional, point and spot lights
//!
//! Lights are plain data. Each one knows how to compute the transforms its
//! shadow pass needs and how to write itself into the main program's
//! uniform block; the shadow textures themselves live in
//! [`ShadowTargets`](super::shadow::ShadowTargets).

use glam::{Mat4, Vec3};

use super::shader::ShaderProgram;
use super::shadow::ShadowConfig;
use super::units::{MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS};
use crate::error::RenderResult;

/// Direction cosine above which the directional shadow camera switches its up vector
const VERTICAL_THRESHOLD: f32 = 0.99;

/// Color and intensities shared by every light type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightBase {
    pub color: Vec3,
    pub ambient_intensity: f32,
    pub diffuse_intensity: f32,
}

impl LightBase {
    #[must_use]
    pub const fn new(color: Vec3, ambient_intensity: f32, diffuse_intensity: f32) -> Self {
        Self {
            color,
            ambient_intensity,
            diffuse_intensity,
        }
    }

    fn apply(&self, program: &mut ShaderProgram, prefix: &str) -> RenderResult<()> {
        program.set_uniform(&format!("{prefix}.color"), self.color)?;
        program.set_uniform(&format!("{prefix}.ambientIntensity"), self.ambient_intensity)?;
        program.set_uniform(&format!("{prefix}.diffuseIntensity"), self.diffuse_intensity)
    }
}

impl Default for LightBase {
    fn default() -> Self {
        Self::new(Vec3::ONE, 0.1, 1.0)
    }
}

/// Sun-like light with parallel rays
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub base: LightBase,
    /// Direction the light travels; uploaded as given
    pub direction: Vec3,
    pub shadow: ShadowConfig,
    /// Point the orthographic shadow frustum is centered on
    pub shadow_center: Vec3,
}

impl DirectionalLight {
    #[must_use]
    pub fn new(base: LightBase, direction: Vec3) -> Self {
        Self {
            base,
            direction,
            shadow: ShadowConfig::directional(),
            shadow_center: Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    /// Light-space view-projection for the shadow pass
    #[must_use]
    pub fn calculate_light_transform(&self) -> Mat4 {
        let dir = self.direction.normalize_or(Vec3::NEG_Y);
        let eye = self.shadow_center - dir * self.shadow.far * 0.5;
        let up = if dir.y.abs() > VERTICAL_THRESHOLD { Vec3::Z } else { Vec3::Y };

        let half = self.shadow.frustum_size;
        let projection = Mat4::orthographic_rh(-half, half, -half, half, self.shadow.near, self.shadow.far);
        projection * Mat4::look_at_rh(eye, self.shadow_center, up)
    }

    /// Write `u_directionalLight` and its transform
    pub fn apply(&self, program: &mut ShaderProgram) -> RenderResult<()> {
        self.base.apply(program, "u_directionalLight.base")?;
        program.set_uniform("u_directionalLight.direction", self.direction)?;
        program.set_uniform("u_directionalLight.shadowBias", self.shadow.bias)?;
        program.set_uniform("u_directionalLightTransform", self.calculate_light_transform())
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(LightBase::new(Vec3::ONE, 0.2, 0.7), Vec3::new(-45.0, -35.0, -45.0))
    }
}

/// Cube face look directions and up vectors in +X, -X, +Y, -Y, +Z, -Z order
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Light radiating from a point, attenuated with distance
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub base: LightBase,
    position: Vec3,
    pub constant: f32,
    pub linear: f32,
    pub exponent: f32,
    pub shadow: ShadowConfig,
}

impl PointLight {
    #[must_use]
    pub fn new(base: LightBase, position: Vec3) -> Self {
        Self {
            base,
            position,
            constant: 0.3,
            linear: 0.1,
            exponent: 0.0,
            shadow: ShadowConfig::omni(),
        }
    }

    #[must_use]
    pub fn with_attenuation(mut self, constant: f32, linear: f32, exponent: f32) -> Self {
        self.constant = constant;
        self.linear = linear;
        self.exponent = exponent;
        self
    }

    #[must_use]
    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[must_use]
    pub const fn far_plane(&self) -> f32 {
        self.shadow.far
    }

    /// One view-projection per cube face, in +X, -X, +Y, -Y, +Z, -Z order.
    ///
    /// The projection flips Y so each rendered face lands in the row order
    /// cube sampling expects.
    #[must_use]
    pub fn calculate_light_transforms(&self) -> [Mat4; 6] {
        let projection = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, self.shadow.near, self.shadow.far);
        CUBE_FACES.map(|(dir, up)| projection * Mat4::look_at_rh(self.position, self.position + dir, up))
    }

    fn apply_fields(&self, program: &mut ShaderProgram, prefix: &str) -> RenderResult<()> {
        self.base.apply(program, &format!("{prefix}.base"))?;
        program.set_uniform(&format!("{prefix}.position"), self.position)?;
        program.set_uniform(&format!("{prefix}.constant"), self.constant)?;
        program.set_uniform(&format!("{prefix}.linear"), self.linear)?;
        program.set_uniform(&format!("{prefix}.exponent"), self.exponent)
    }

    /// Write `u_pointLights[index]`
    pub fn apply(&self, program: &mut ShaderProgram, index: usize) -> RenderResult<()> {
        self.apply_fields(program, &format!("u_pointLights[{index}]"))
    }
}

/// Point light restricted to a cone
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub point: PointLight,
    direction: Vec3,
    edge_degrees: f32,
    proc_edge: f32,
}

impl SpotLight {
    /// `edge_degrees` is the half-angle of the cone
    #[must_use]
    pub fn new(point: PointLight, direction: Vec3, edge_degrees: f32) -> Self {
        Self {
            point,
            direction: direction.normalize_or(Vec3::NEG_Y),
            edge_degrees,
            proc_edge: edge_degrees.to_radians().cos(),
        }
    }

    #[must_use]
    pub const fn direction(&self) -> Vec3 {
        self.direction
    }

    #[must_use]
    pub const fn edge_degrees(&self) -> f32 {
        self.edge_degrees
    }

    /// Cosine of the cone half-angle, as the shader compares it
    #[must_use]
    pub const fn proc_edge(&self) -> f32 {
        self.proc_edge
    }

    /// Attach the light to a moving viewer, e.g. as a flashlight
    pub fn set_flash(&mut self, position: Vec3, direction: Vec3) {
        self.point.set_position(position);
        self.direction = direction.normalize_or(self.direction);
    }

    #[must_use]
    pub fn calculate_light_transforms(&self) -> [Mat4; 6] {
        self.point.calculate_light_transforms()
    }

    /// Write `u_spotLights[index]`
    pub fn apply(&self, program: &mut ShaderProgram, index: usize) -> RenderResult<()> {
        let prefix = format!("u_spotLights[{index}]");
        self.point.apply_fields(program, &format!("{prefix}.base"))?;
        program.set_uniform(&format!("{prefix}.direction"), self.direction)?;
        program.set_uniform(&format!("{prefix}.edge"), self.proc_edge)
    }
}

/// Every light in the scene.
///
/// Lights past `MAX_POINT_LIGHTS` / `MAX_SPOT_LIGHTS` are kept but never
/// rendered.
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    pub directional: DirectionalLight,
    point_lights: Vec<PointLight>,
    spot_lights: Vec<SpotLight>,
}

impl LightSet {
    #[must_use]
    pub fn new(directional: DirectionalLight) -> Self {
        Self {
            directional,
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
        }
    }

    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
        if self.point_lights.len() > MAX_POINT_LIGHTS {
            log::debug!(
                "{} point lights exceed the limit of {}; extras are ignored",
                self.point_lights.len(),
                MAX_POINT_LIGHTS
            );
        }
    }

    pub fn add_spot_light(&mut self, light: SpotLight) {
        self.spot_lights.push(light);
        if self.spot_lights.len() > MAX_SPOT_LIGHTS {
            log::debug!(
                "{} spot lights exceed the limit of {}; extras are ignored",
                self.spot_lights.len(),
                MAX_SPOT_LIGHTS
            );
        }
    }

    pub fn point_lights_mut(&mut self) -> &mut [PointLight] {
        &mut self.point_lights
    }

    pub fn spot_lights_mut(&mut self) -> &mut [SpotLight] {
        &mut self.spot_lights
    }

    pub fn clear_omni(&mut self) {
        self.point_lights.clear();
        self.spot_lights.clear();
    }

    /// Point lights that render, truncated to the maximum
    #[must_use]
    pub fn active_point_lights(&self) -> &[PointLight] {
        &self.point_lights[..self.point_lights.len().min(MAX_POINT_LIGHTS)]
    }

    /// Spot lights that render, truncated to the maximum
    #[must_use]
    pub fn active_spot_lights(&self) -> &[SpotLight] {
        &self.spot_lights[..self.spot_lights.len().min(MAX_SPOT_LIGHTS)]
    }

    /// Omni shadow slot of spot light `index`
    #[must_use]
    pub fn spot_slot(&self, index: usize) -> usize {
        self.active_point_lights().len() + index
    }

    /// Every shadow-casting omni light paired with its slot: point lights
    /// first, then spot lights.
    pub fn omni_lights(&self) -> impl Iterator<Item = (usize, &PointLight)> {
        self.active_point_lights()
            .iter()
            .chain(self.active_spot_lights().iter().map(|s| &s.point))
            .enumerate()
    }

    /// Number of omni slots in use
    #[must_use]
    pub fn omni_count(&self) -> usize {
        self.active_point_lights().len() + self.active_spot_lights().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn point(x: f32) -> PointLight {
        PointLight::new(LightBase::default(), Vec3::new(x, 1.0, 0.0))
    }

    #[test]
    fn test_directional_transform_is_pure() {
        let light = DirectionalLight::default();
        let a = light.calculate_light_transform();
        let b = light.calculate_light_transform();
        assert_eq!(a.to_cols_array(), b.to_cols_array());

        // the frustum center maps to the middle of the depth range
        let center = a * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(center.x.abs() < 1e-4 && center.y.abs() < 1e-4);
        assert!((center.z - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_vertical_directional_light_is_finite() {
        let light = DirectionalLight::new(LightBase::default(), Vec3::NEG_Y);
        assert!(light.calculate_light_transform().is_finite());
    }

    #[test]
    fn test_point_transforms_follow_set_position() {
        let mut light = point(0.0);
        let before = light.calculate_light_transforms();
        let offset = Vec3::new(3.0, -2.0, 5.0);
        light.set_position(light.position() + offset);
        let after = light.calculate_light_transforms();

        let probe = Vec3::new(0.3, 0.7, -2.0);
        for face in 0..6 {
            let a = before[face].project_point3(Vec3::new(0.0, 1.0, 0.0) + probe);
            let b = after[face].project_point3(light.position() + probe);
            assert!(a.abs_diff_eq(b, 1e-4), "face {face}: {a} vs {b}");
        }
    }

    #[test]
    fn test_cube_faces_look_along_their_axis() {
        let light = point(0.0);
        let transforms = light.calculate_light_transforms();
        for (face, (dir, _)) in CUBE_FACES.iter().enumerate() {
            let ndc = transforms[face].project_point3(light.position() + *dir * 10.0);
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "face {face}");
            assert!((0.0..=1.0).contains(&ndc.z));
        }
    }

    #[test]
    fn test_spot_flash_and_edge() {
        let mut spot = SpotLight::new(point(0.0), Vec3::new(0.0, 0.0, -2.0), 60.0);
        assert!((spot.proc_edge() - 0.5).abs() < 1e-6);
        assert_eq!(spot.direction(), Vec3::NEG_Z);

        spot.set_flash(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(spot.point.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(spot.direction(), Vec3::Y);
    }

    #[test]
    fn test_light_set_truncates_and_assigns_slots() {
        let mut lights = LightSet::default();
        for i in 0..5 {
            lights.add_point_light(point(i as f32));
        }
        lights.add_spot_light(SpotLight::new(point(9.0), Vec3::NEG_Y, 20.0));

        assert_eq!(lights.active_point_lights().len(), MAX_POINT_LIGHTS);
        assert_eq!(lights.spot_slot(0), MAX_POINT_LIGHTS);
        let slots: Vec<usize> = lights.omni_lights().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        assert_eq!(lights.omni_count(), 4);
    }
}

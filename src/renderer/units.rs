//! Fixed texture-unit layout and the engine-owned unit table
//!
//! Unit numbers are part of the contract between passes: a texture bound to
//! a unit stays there across program switches until something else is bound.
//!
//! | Unit | Contents |
//! |------|----------|
//! | 0 | post-process source, skybox cube map |
//! | 1 | diffuse map; post-process aux input; terrain height map |
//! | 2 | normal map |
//! | 3 | directional shadow map |
//! | 4.. | omni shadow cube maps, one per slot |

use super::backend::{TextureHandle, TextureKind};
use crate::error::{RenderError, RenderResult};

/// Maximum point lights that cast shadows and receive uniforms
pub const MAX_POINT_LIGHTS: usize = 3;
/// Maximum spot lights that cast shadows and receive uniforms
pub const MAX_SPOT_LIGHTS: usize = 3;
/// Omni shadow slots shared by point and spot lights
pub const OMNI_SHADOW_SLOTS: usize = MAX_POINT_LIGHTS + MAX_SPOT_LIGHTS;

pub const SCREEN_TEXTURE_UNIT: u32 = 0;
pub const DIFFUSE_TEXTURE_UNIT: u32 = 1;
pub const NORMAL_TEXTURE_UNIT: u32 = 2;
pub const DIRECTIONAL_SHADOW_TEXTURE_UNIT: u32 = 3;
pub const OMNI_SHADOW_TEXTURE_UNIT: u32 = 4;

/// Post effects read their secondary input here
pub const POST_AUX_TEXTURE_UNIT: u32 = DIFFUSE_TEXTURE_UNIT;
/// Terrain reads its height map here
pub const HEIGHTMAP_TEXTURE_UNIT: u32 = DIFFUSE_TEXTURE_UNIT;

/// Total number of units in the table
pub const TEXTURE_UNIT_COUNT: usize = OMNI_SHADOW_TEXTURE_UNIT as usize + OMNI_SHADOW_SLOTS;

/// Unit for omni shadow slot `slot`.
///
/// Point light `i` uses slot `i`; spot light `j` uses slot `point_count + j`.
#[must_use]
pub const fn omni_shadow_unit(slot: usize) -> u32 {
    OMNI_SHADOW_TEXTURE_UNIT + slot as u32
}

/// A texture as seen by the unit table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    pub handle: TextureHandle,
    pub kind: TextureKind,
}

/// Unit → texture bindings, owned by the render engine.
#[derive(Debug, Default)]
pub struct TextureUnits {
    slots: [Option<BoundTexture>; TEXTURE_UNIT_COUNT],
}

impl TextureUnits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a texture to a unit, replacing what was there
    pub fn bind(&mut self, unit: u32, texture: BoundTexture) -> RenderResult<()> {
        let slot = self
            .slots
            .get_mut(unit as usize)
            .ok_or(RenderError::TextureUnitOutOfRange(unit))?;
        *slot = Some(texture);
        Ok(())
    }

    /// Texture currently bound to a unit
    #[must_use]
    pub fn get(&self, unit: u32) -> Option<BoundTexture> {
        self.slots.get(unit as usize).copied().flatten()
    }

    /// Clear all units
    pub fn clear(&mut self) {
        self.slots = [None; TEXTURE_UNIT_COUNT];
    }

    /// Number of units holding a texture
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pool::ResourcePool;

    #[test]
    fn test_unit_layout_is_disjoint() {
        let fixed = [
            SCREEN_TEXTURE_UNIT,
            DIFFUSE_TEXTURE_UNIT,
            NORMAL_TEXTURE_UNIT,
            DIRECTIONAL_SHADOW_TEXTURE_UNIT,
        ];
        for slot in 0..OMNI_SHADOW_SLOTS {
            assert!(!fixed.contains(&omni_shadow_unit(slot)));
        }
        assert_eq!(omni_shadow_unit(OMNI_SHADOW_SLOTS - 1) as usize, TEXTURE_UNIT_COUNT - 1);
    }

    #[test]
    fn test_bind_clear_and_range() {
        let mut pool = ResourcePool::new();
        let handle = TextureHandle(pool.insert(()));
        let other = TextureHandle(pool.insert(()));
        let tex = BoundTexture {
            handle,
            kind: TextureKind::DepthCube,
        };

        let mut units = TextureUnits::new();
        units.bind(omni_shadow_unit(0), tex).unwrap();
        units.bind(omni_shadow_unit(1), tex).unwrap();
        units
            .bind(
                SCREEN_TEXTURE_UNIT,
                BoundTexture {
                    handle: other,
                    kind: TextureKind::Color2d,
                },
            )
            .unwrap();
        assert_eq!(units.bound_count(), 3);

        assert_eq!(units.get(SCREEN_TEXTURE_UNIT).map(|b| b.handle), Some(other));

        units.clear();
        assert_eq!(units.bound_count(), 0);
        assert_eq!(units.get(omni_shadow_unit(0)), None);

        let err = units.bind(TEXTURE_UNIT_COUNT as u32, tex).unwrap_err();
        assert!(matches!(err, RenderError::TextureUnitOutOfRange(_)));
    }
}

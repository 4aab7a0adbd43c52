//! Demo scene
//!
//! Shared by the windowed binary and the headless dry run: a pyramid, a
//! floor, a sphere and a handful of cubes lit by the sun, two point lights
//! and two spot lights.

use glam::{Mat4, Vec3};

use crate::config::EngineConfig;
use crate::error::RenderResult;
use crate::renderer::backend::{RenderBackend, TextureFormat};
use crate::renderer::{
    Camera, DirectionalLight, FrameInput, FrameReport, LightBase, LightSet, Material, Mesh, MeshData, PointLight,
    RecordingBackend, RenderEngine, RenderOptions, Scene, SceneObject, SpotLight, Texture,
};

const CUBE_POSITIONS: [Vec3; 6] = [
    Vec3::new(0.0, 0.5, 1.0),
    Vec3::new(0.0, 0.5, 3.0),
    Vec3::new(1.0, 0.5, -4.0),
    Vec3::new(-7.0, 0.5, -5.0),
    Vec3::new(-5.0, 0.5, -8.0),
    Vec3::new(-3.0, 0.5, -3.0),
];

/// Height the first point light bobs around
const BOB_HEIGHT: f32 = 1.0;

/// Meshes and textures the demo scene references
#[derive(Debug)]
pub struct DemoAssets {
    meshes: Vec<Mesh>,
    textures: Vec<Texture>,
}

impl DemoAssets {
    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        for mesh in self.meshes {
            mesh.destroy(backend)?;
        }
        for texture in self.textures {
            texture.destroy(backend)?;
        }
        Ok(())
    }
}

/// `cells` x `cells` checkerboard of two colors, RGBA8
fn checker(size: u32, cells: u32, a: [u8; 3], b: [u8; 3]) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
            texels.extend_from_slice(&color);
            texels.push(255);
        }
    }
    texels
}

/// Upload the demo meshes and lay out the scene
pub fn build_scene<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<(Scene, DemoAssets)> {
    let pyramid = MeshData::pyramid().upload(backend, "pyramid")?;
    let cube = MeshData::cube().upload(backend, "cube")?;
    let sphere = MeshData::sphere(1.0, 32, 16).upload(backend, "sphere")?;
    let floor = MeshData::plane(30.0, 10.0).upload(backend, "floor")?;

    let brick = Texture::from_rgba(
        backend,
        &checker(64, 8, [150, 70, 50], [110, 50, 40]),
        64,
        64,
        "brick",
        TextureFormat::Rgba8UnormSrgb,
    )?;
    let dirt = Texture::from_rgba(
        backend,
        &checker(64, 4, [120, 95, 60], [100, 80, 50]),
        64,
        64,
        "dirt",
        TextureFormat::Rgba8UnormSrgb,
    )?;

    let shiny = Material::shiny();
    let mut scene = Scene::new();
    scene.add(SceneObject::new(
        "pyramid",
        pyramid,
        Mat4::from_translation(Vec3::new(0.0, 4.0, -2.5)),
        shiny.with_diffuse(brick.bound()),
    ));
    scene.add(SceneObject::new(
        "floor",
        floor,
        Mat4::IDENTITY,
        Material::dull().with_diffuse(dirt.bound()),
    ));
    scene.add(SceneObject::new(
        "sphere",
        sphere,
        Mat4::from_translation(Vec3::new(6.0, 1.0, 0.0)),
        shiny,
    ));
    for (i, position) in CUBE_POSITIONS.iter().enumerate() {
        scene.add(SceneObject::new(
            format!("cube{i}"),
            cube,
            Mat4::from_translation(*position),
            shiny,
        ));
    }
    log::info!("Demo scene has {} objects", scene.len());

    Ok((
        scene,
        DemoAssets {
            meshes: vec![pyramid, cube, sphere, floor],
            textures: vec![brick, dirt],
        },
    ))
}

/// Sun plus two colored point lights and two spot lights
pub fn build_lights(options: &RenderOptions) -> LightSet {
    let sun = DirectionalLight::default().with_shadow(options.directional_shadow());
    let mut lights = LightSet::new(sun);

    let omni = options.omni_shadow();
    lights.add_point_light(
        PointLight::new(LightBase::new(Vec3::new(0.0, 0.0, 1.0), 0.0, 2.0), Vec3::new(-5.0, BOB_HEIGHT, -5.0))
            .with_attenuation(0.3, 0.1, 0.0)
            .with_shadow(omni),
    );
    lights.add_point_light(
        PointLight::new(LightBase::new(Vec3::new(0.0, 1.0, 0.0), 0.0, 1.5), Vec3::new(-9.0, 2.0, -2.0))
            .with_attenuation(0.3, 0.1, 0.1)
            .with_shadow(omni),
    );

    let flashlight = PointLight::new(LightBase::new(Vec3::ONE, 0.0, 5.0), Vec3::new(-8.0, 1.0, -4.0))
        .with_attenuation(0.5, 0.0, 0.0)
        .with_shadow(omni);
    lights.add_spot_light(SpotLight::new(flashlight, Vec3::new(1.0, -0.2, 0.0), 10.0));

    let red = PointLight::new(LightBase::new(Vec3::new(1.0, 0.0, 0.0), 0.0, 5.0), Vec3::new(0.0, 1.0, 0.0))
        .with_attenuation(0.4, 0.1, 0.1)
        .with_shadow(omni);
    lights.add_spot_light(SpotLight::new(red, Vec3::NEG_Y, 15.0));

    lights
}

/// Bob the first point light up and down
pub fn animate(lights: &mut LightSet, elapsed_seconds: f32) {
    if let Some(light) = lights.point_lights_mut().first_mut() {
        let mut position = light.position();
        position.y = BOB_HEIGHT + elapsed_seconds.sin();
        light.set_position(position);
    }
}

/// What one headless frame did
#[derive(Debug, Clone)]
pub struct FrameTrace {
    pub frame: u32,
    pub passes: Vec<&'static str>,
    pub report: FrameReport,
}

/// Render `frames` frames of the demo against the recording backend
pub fn dry_run(config: &EngineConfig, frames: u32) -> RenderResult<Vec<FrameTrace>> {
    let backend = RecordingBackend::new(config.width, config.height);
    let mut engine = RenderEngine::new(backend, &config.render)?;
    let (scene, assets) = build_scene(engine.backend_mut())?;
    let mut lights = build_lights(&config.render);
    let mut camera = Camera::default();
    camera.set_aspect(config.width, config.height);

    let mut traces = Vec::with_capacity(frames as usize);
    for frame in 0..frames {
        animate(&mut lights, frame as f32 / 60.0);
        engine.backend_mut().clear_commands();
        let report = engine.render_frame(&FrameInput {
            scene: &scene,
            camera: &camera,
            lights: &lights,
            settings: &config.settings,
            framebuffer_size: (config.width, config.height),
        })?;
        traces.push(FrameTrace {
            frame,
            passes: engine.backend().pass_labels(),
            report,
        });
    }

    let mut backend = engine.shutdown()?;
    assets.destroy(&mut backend)?;
    let stats = backend.stats();
    log::debug!(
        "Dry run finished with {} textures, {} framebuffers and {} meshes still live",
        stats.live_textures,
        stats.live_framebuffers,
        stats.live_meshes
    );
    Ok(traces)
}

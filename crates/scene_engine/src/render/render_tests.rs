//! Renderer orchestration tests over the recording backend

use super::backend::{Capabilities, HeadlessBackend, RecordedCommand};
use super::{FramePhase, Renderer};
use crate::config::RendererConfig;
use crate::foundation::math::Vec3;
use crate::geometry::BufferGeometry;
use crate::material::Material;
use crate::scene::{Camera, Layers, Light, NodeKey, Scene};

fn cube_scene() -> (Scene, NodeKey, NodeKey) {
    let mut scene = Scene::new();
    let geometry = scene.resources_mut().add_geometry(BufferGeometry::cube(0.5));
    let material = scene.resources_mut().add_material(Material::standard());
    let mesh = scene.add_mesh("cube", geometry, vec![material]);
    scene.add_child(scene.root(), mesh);

    let camera = Camera::perspective(60.0_f32.to_radians(), 1.0, 0.1, 100.0);
    let cam = scene.add_camera("camera", camera);
    scene.add_child(scene.root(), cam);
    scene.set_position(cam, Vec3::new(0.0, 0.0, 5.0));

    (scene, mesh, cam)
}

fn headless(scene: &mut Scene, cam: NodeKey) -> Renderer {
    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(scene, cam).unwrap();
    renderer
}

#[test]
fn test_unit_cube_yields_exactly_one_opaque_entry() {
    let (mut scene, mesh, cam) = cube_scene();
    let renderer = headless(&mut scene, cam);

    let list = renderer.render_list();
    assert_eq!(list.opaque().len(), 1);
    assert_eq!(list.opaque()[0].node, mesh);
    assert!(list.transparent().is_empty());
    assert!(list.transmissive().is_empty());
    assert_eq!(renderer.stats().draw_calls, 1);
    assert_eq!(renderer.phase(), FramePhase::Idle);
}

#[test]
fn test_off_frustum_mesh_is_culled() {
    let (mut scene, mesh, cam) = cube_scene();
    scene.set_position(mesh, Vec3::new(0.0, 0.0, 50.0)); // behind the camera
    let renderer = headless(&mut scene, cam);

    assert!(renderer.render_list().is_empty());
    assert_eq!(renderer.stats().culled, 1);
    assert_eq!(renderer.stats().draw_calls, 0);
}

#[test]
fn test_layer_mask_excludes_mesh_from_camera() {
    let (mut scene, mesh, cam) = cube_scene();
    scene.node_mut(mesh).unwrap().layers = Layers::layer(3);
    let renderer = headless(&mut scene, cam);

    assert!(renderer.render_list().is_empty());
}

#[test]
fn test_invisible_subtree_is_pruned() {
    let (mut scene, mesh, cam) = cube_scene();
    scene.node_mut(mesh).unwrap().visible = false;
    let renderer = headless(&mut scene, cam);

    assert!(renderer.render_list().is_empty());
}

#[test]
fn test_identical_materials_share_one_program() {
    let (mut scene, _, cam) = cube_scene();
    let geometry = scene.resources_mut().add_geometry(BufferGeometry::cube(0.5));
    let material = scene.resources_mut().add_material(Material::standard());
    let second = scene.add_mesh("second", geometry, vec![material]);
    scene.add_child(scene.root(), second);
    scene.set_position(second, Vec3::new(1.0, 0.0, 0.0));

    let renderer = headless(&mut scene, cam);

    assert_eq!(renderer.stats().draw_calls, 2);
    // Two materials, identical feature fingerprints, one compile
    assert_eq!(renderer.stats().programs_compiled, 1);
}

#[test]
fn test_transparent_material_routes_to_transparent_bucket() {
    let (mut scene, mesh, cam) = cube_scene();
    let material = scene
        .resources_mut()
        .add_material(Material::standard().with_transparency(0.5));
    scene
        .node_mut(mesh)
        .unwrap()
        .kind
        .renderable_mut()
        .unwrap()
        .materials = vec![material];

    let renderer = headless(&mut scene, cam);
    assert_eq!(renderer.render_list().transparent().len(), 1);
    assert!(renderer.render_list().opaque().is_empty());
}

#[test]
fn test_transmissive_renders_first_and_resolves() {
    let (mut scene, _, cam) = cube_scene();
    let geometry = scene.resources_mut().add_geometry(BufferGeometry::cube(0.5));
    let material = scene
        .resources_mut()
        .add_material(Material::standard().with_transmission(1.0));
    let glass = scene.add_mesh("glass", geometry, vec![material]);
    scene.add_child(scene.root(), glass);

    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    assert_eq!(renderer.render_list().transmissive().len(), 1);

    // The transmissive draw is recorded before the opaque draw
    let backend = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap();
    let draws: Vec<usize> = backend
        .commands()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| matches!(c, RecordedCommand::Draw(_)).then_some(i))
        .collect();
    let resolve = backend
        .commands()
        .iter()
        .position(|c| matches!(c, RecordedCommand::Resolve(_, _)))
        .unwrap();
    assert_eq!(draws.len(), 2);
    assert!(draws[0] < resolve && resolve < draws[1]);
}

#[test]
fn test_blit_resolve_when_multisample_to_texture_unsupported() {
    let (mut scene, mesh, cam) = cube_scene();
    let material = scene
        .resources_mut()
        .add_material(Material::standard().with_transmission(1.0));
    scene
        .node_mut(mesh)
        .unwrap()
        .kind
        .renderable_mut()
        .unwrap()
        .materials = vec![material];

    let backend = HeadlessBackend::with_capabilities(Capabilities {
        multisample_to_texture: false,
        ..Capabilities::default()
    });
    let mut renderer = Renderer::new(Box::new(backend), RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    let backend = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap();
    assert!(backend
        .commands()
        .iter()
        .any(|c| matches!(c, RecordedCommand::Resolve(_, true))));
}

#[test]
fn test_uniform_memoization_across_frames() {
    let (mut scene, _, cam) = cube_scene();
    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    let first_uniform_writes = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap()
        .commands()
        .iter()
        .filter(|c| matches!(c, RecordedCommand::SetUniform(_, _)))
        .count();
    assert!(first_uniform_writes > 0);

    // Nothing changed: the second frame re-binds no uniform at all
    renderer.render(&mut scene, cam).unwrap();
    let total_uniform_writes = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap()
        .commands()
        .iter()
        .filter(|c| matches!(c, RecordedCommand::SetUniform(_, _)))
        .count();
    assert_eq!(total_uniform_writes, first_uniform_writes);
}

#[test]
fn test_compile_failure_degrades_to_skipped_draw() {
    let (mut scene, _, cam) = cube_scene();
    let mut backend = HeadlessBackend::new();
    backend.fail_templates.push("standard");
    let mut renderer = Renderer::new(Box::new(backend), RendererConfig::default());

    // The frame still completes
    renderer.render(&mut scene, cam).unwrap();
    assert_eq!(renderer.stats().draw_calls, 0);
    assert_eq!(renderer.phase(), FramePhase::Idle);
}

#[test]
fn test_dispose_event_frees_gpu_buffers() {
    let (mut scene, mesh, cam) = cube_scene();
    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    let live_before = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap()
        .live_buffers();
    assert!(live_before > 0);

    let geometry = scene
        .node(mesh)
        .unwrap()
        .kind
        .renderable()
        .unwrap()
        .geometry;
    scene.remove_subtree(mesh);
    scene.resources_mut().dispose_geometry(geometry);

    // The next frame drains the dispose queue before drawing
    renderer.render(&mut scene, cam).unwrap();
    let live_after = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap()
        .live_buffers();
    assert_eq!(live_after, 0);
}

#[test]
fn test_compile_prewarms_the_program_cache() {
    let (mut scene, _, cam) = cube_scene();
    let mut renderer = Renderer::headless(RendererConfig::default());

    renderer.compile(&mut scene, cam).unwrap();
    renderer.render(&mut scene, cam).unwrap();

    // render() reused the pre-warmed program instead of compiling again
    assert_eq!(renderer.stats().programs_compiled, 1);
}

#[test]
fn test_render_against_missing_camera_is_an_error() {
    let (mut scene, mesh, _) = cube_scene();
    let mut renderer = Renderer::headless(RendererConfig::default());

    assert!(renderer.render(&mut scene, mesh).is_err());

    let dead = scene.add_group("temp");
    scene.remove_subtree(dead);
    assert!(renderer.render(&mut scene, dead).is_err());
}

#[test]
fn test_draw_range_limits_draw_count() {
    let (mut scene, mesh, cam) = cube_scene();
    let geometry = scene
        .node(mesh)
        .unwrap()
        .kind
        .renderable()
        .unwrap()
        .geometry;
    scene
        .resources_mut()
        .geometry_mut(geometry)
        .unwrap()
        .set_draw_range(0, 6);

    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    let backend = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap();
    let call = backend
        .commands()
        .iter()
        .find_map(|c| match c {
            RecordedCommand::Draw(call) => Some(call.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(call.count, 6);
    assert!(call.index_u16);
}

#[test]
fn test_lights_collected_and_fingerprinted() {
    let (mut scene, _, cam) = cube_scene();
    let sun = scene.add_light("sun", Light::directional().with_intensity(2.0));
    scene.add_child(scene.root(), sun);

    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    assert_eq!(renderer.lights().directional.len(), 1);
    assert_eq!(renderer.lights().directional[0].color, [2.0, 2.0, 2.0]);
    let with_light = renderer.stats().programs_compiled;

    // Dropping the light changes the light-count dimension of the
    // fingerprint, so the material resolves to a newly compiled program
    scene.remove_subtree(sun);
    renderer.render(&mut scene, cam).unwrap();
    assert_eq!(renderer.stats().programs_compiled, with_light + 1);
}

#[test]
fn test_instanced_draw_carries_instance_count() {
    let (mut scene, mesh, cam) = cube_scene();
    scene
        .node_mut(mesh)
        .unwrap()
        .kind
        .renderable_mut()
        .unwrap()
        .instances = 16;

    let renderer = headless(&mut scene, cam);

    let backend = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap();
    let call = backend
        .commands()
        .iter()
        .find_map(|c| match c {
            RecordedCommand::Draw(call) => Some(call.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(call.instances, 16);
    assert_eq!(renderer.stats().triangles, 12 * 16);
}

#[test]
fn test_dispose_force_frees_undisposed_records() {
    let (mut scene, _, cam) = cube_scene();
    let mut renderer = Renderer::headless(RendererConfig::default());
    renderer.render(&mut scene, cam).unwrap();

    renderer.dispose();

    let backend = renderer
        .backend()
        .as_any()
        .downcast_ref::<HeadlessBackend>()
        .unwrap();
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.live_programs(), 0);
}

#[test]
fn test_geometry_groups_split_into_per_material_draws() {
    let (mut scene, mesh, cam) = cube_scene();
    let geometry = scene
        .node(mesh)
        .unwrap()
        .kind
        .renderable()
        .unwrap()
        .geometry;
    {
        let g = scene.resources_mut().geometry_mut(geometry).unwrap();
        g.add_group(0, 18, 0);
        g.add_group(18, 18, 1);
    }
    let second = scene.resources_mut().add_material(Material::basic());
    scene
        .node_mut(mesh)
        .unwrap()
        .kind
        .renderable_mut()
        .unwrap()
        .materials
        .push(second);

    let renderer = headless(&mut scene, cam);
    assert_eq!(renderer.stats().draw_calls, 2);
    // Two templates in play: standard and basic
    assert_eq!(renderer.stats().programs_compiled, 2);
}

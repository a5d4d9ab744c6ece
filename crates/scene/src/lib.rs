//! Sphere scenes and the path tracer that shades them.

mod camera;
mod material;
mod parser;
mod procedural;
mod sphere;
mod world;

use glam::Vec3;
use rand::rngs::SmallRng;
use renderer::{Sample, SampleEvaluator};

pub use camera::{Camera, CameraSettings};
pub use material::Material;
pub use parser::{SceneParseError, load, parse_line, parse_scene};
pub use procedural::random_scene;
pub use sphere::{Hit, Object, Sphere};
pub use world::{MAX_BOUNCES, Scene};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + t * self.direction
    }
}

/// A scene seen through a camera, shaded by path tracing.
#[derive(Debug, Clone)]
pub struct Tracer {
    scene: Scene,
    camera: Camera,
}

impl Tracer {
    pub fn new(scene: Scene, camera: Camera) -> Self {
        Self { scene, camera }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }
}

impl SampleEvaluator for Tracer {
    fn evaluate(&self, u: f32, v: f32, rng: &mut SmallRng) -> Sample {
        let ray = self.camera.ray(u, v, rng);
        let color = self.scene.color(ray, rng);
        Sample::new(color.x, color.y, color.z)
    }
}

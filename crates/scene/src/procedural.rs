use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{Material, Object, Scene, Sphere};

/// The classic field of small random spheres around three large ones:
/// a 22 x 22 grid of candidates on a huge ground sphere.
pub fn random_scene(seed: u64) -> Scene {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut scene = Scene::new();
    scene.add(Object::new(
        Sphere::new(Vec3::new(0.0, -1000.0, 0.0), 1000.0),
        Material::diffuse(Vec3::splat(0.5)),
    ));

    let clearing = Vec3::new(4.0, 0.2, 0.0);
    for a in -11..11 {
        for b in -11..11 {
            let choice: f32 = rng.random();
            let center = Vec3::new(
                a as f32 + 0.9 * rng.random::<f32>(),
                0.2,
                b as f32 + 0.9 * rng.random::<f32>(),
            );
            if (center - clearing).length() <= 0.9 {
                continue;
            }
            let material = if choice < 0.8 {
                Material::diffuse(Vec3::new(
                    rng.random::<f32>() * rng.random::<f32>(),
                    rng.random::<f32>() * rng.random::<f32>(),
                    rng.random::<f32>() * rng.random::<f32>(),
                ))
            } else if choice < 0.95 {
                Material::metallic(
                    Vec3::new(
                        0.5 * (1.0 + rng.random::<f32>()),
                        0.5 * (1.0 + rng.random::<f32>()),
                        0.5 * (1.0 + rng.random::<f32>()),
                    ),
                    0.5 * rng.random::<f32>(),
                )
            } else {
                Material::crystalline(1.5)
            };
            scene.add(Object::new(Sphere::new(center, 0.2), material));
        }
    }

    scene.add(Object::new(
        Sphere::new(Vec3::new(0.0, 1.0, 0.0), 1.0),
        Material::crystalline(1.5),
    ));
    scene.add(Object::new(
        Sphere::new(Vec3::new(-4.0, 1.0, 0.0), 1.0),
        Material::diffuse(Vec3::new(0.4, 0.2, 0.1)),
    ));
    scene.add(Object::new(
        Sphere::new(Vec3::new(4.0, 1.0, 0.0), 1.0),
        Material::metallic(Vec3::new(0.7, 0.6, 0.5), 0.0),
    ));
    scene
}

use glam::Vec3;
use rand::Rng;
use rand::rngs::SmallRng;

use crate::Ray;

/// Thin-lens camera placement. Defaults frame the classic sphere field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    pub look_from: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub vertical_fov: f32,
    pub aperture: f32,
    pub focus_distance: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            look_from: Vec3::new(13.0, 2.0, 3.0),
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            vertical_fov: 20.0,
            aperture: 0.1,
            focus_distance: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    origin: Vec3,
    lower_left: Vec3,
    horizontal: Vec3,
    vertical: Vec3,
    u: Vec3,
    v: Vec3,
    lens_radius: f32,
}

impl Camera {
    pub fn new(settings: CameraSettings, aspect: f32) -> Self {
        let half_height = (settings.vertical_fov.to_radians() / 2.0).tan();
        let half_width = aspect * half_height;
        let focus = settings.focus_distance;

        let w = (settings.look_from - settings.look_at).normalize();
        let u = settings.up.cross(w).normalize();
        let v = w.cross(u);

        let origin = settings.look_from;
        Self {
            origin,
            lower_left: origin - half_width * focus * u - half_height * focus * v - focus * w,
            horizontal: 2.0 * half_width * focus * u,
            vertical: 2.0 * half_height * focus * v,
            u,
            v,
            lens_radius: settings.aperture / 2.0,
        }
    }

    /// Camera for a `width` x `height` image.
    pub fn for_image(settings: CameraSettings, width: u32, height: u32) -> Self {
        Self::new(settings, width as f32 / height.max(1) as f32)
    }

    /// Ray through image-plane point `(s, t)`, `t` growing upwards.
    pub fn ray(&self, s: f32, t: f32, rng: &mut SmallRng) -> Ray {
        let lens = self.lens_radius * random_in_unit_disk(rng);
        let offset = self.u * lens.x + self.v * lens.y;
        Ray::new(
            self.origin + offset,
            self.lower_left + s * self.horizontal + t * self.vertical - self.origin - offset,
        )
    }
}

fn random_in_unit_disk(rng: &mut SmallRng) -> Vec3 {
    loop {
        let point = Vec3::new(
            2.0 * rng.random::<f32>() - 1.0,
            2.0 * rng.random::<f32>() - 1.0,
            0.0,
        );
        if point.length_squared() < 1.0 {
            return point;
        }
    }
}

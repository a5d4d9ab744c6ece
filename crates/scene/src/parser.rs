//! Line-oriented scene files.
//!
//! Every non-blank line holds one object:
//!
//! ```text
//! Object Sphere ( 0, -1000, 0, 1000 ) Diffuse ( 0.5, 0.5, 0.5 )
//! Object Sphere ( 4, 1, 0, 1 ) Metallic ( 0.7, 0.6, 0.5, 0.0 )
//! Object Sphere ( 0, 1, 0, 1 ) Crystalline ( 1.5 )
//! ```
//!
//! A bad line is reported and skipped; it never fails the whole file.

use std::fs;
use std::path::Path;

use glam::Vec3;
use log::{debug, warn};
use thiserror::Error;

use crate::{Material, Object, Scene, Sphere};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneParseError {
    #[error("line does not start with `Object`")]
    NotAnObject,
    #[error("unknown shape `{0}`")]
    UnknownShape(String),
    #[error("unknown material `{0}`")]
    UnknownMaterial(String),
    #[error("expected `{expected}`, found `{found}`")]
    Expected { expected: &'static str, found: String },
    #[error("`{0}` is not a number")]
    InvalidNumber(String),
    #[error("{what} takes {expected} values, found {found}")]
    ArgumentCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("unexpected trailing `{0}`")]
    Trailing(String),
}

/// Parses every line of `text`, skipping the ones that fail.
pub fn parse_scene(text: &str) -> Scene {
    let mut scene = Scene::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(object) => scene.add(object),
            Err(err) => warn!("skipping scene line {}: {} ({})", number + 1, line.trim(), err),
        }
    }
    scene
}

/// Reads a scene file. An unreadable file gives an empty scene.
pub fn load(path: impl AsRef<Path>) -> Scene {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => {
            let scene = parse_scene(&text);
            debug!("loaded {} objects from {}", scene.len(), path.display());
            scene
        }
        Err(err) => {
            warn!("cannot read scene {}: {}; rendering the sky only", path.display(), err);
            Scene::new()
        }
    }
}

pub fn parse_line(line: &str) -> Result<Object, SceneParseError> {
    let spaced = line
        .replace('(', " ( ")
        .replace(')', " ) ")
        .replace(',', " ");
    let mut tokens = spaced.split_whitespace();

    if tokens.next() != Some("Object") {
        return Err(SceneParseError::NotAnObject);
    }
    let shape = next_token(&mut tokens, "Sphere")?;
    if shape != "Sphere" {
        return Err(SceneParseError::UnknownShape(shape.to_owned()));
    }
    let [x, y, z, radius]: [f32; 4] = group(&mut tokens, "Sphere")?;
    let sphere = Sphere::new(Vec3::new(x, y, z), radius);

    let kind = next_token(&mut tokens, "material")?;
    let material = match kind {
        "Diffuse" => {
            let [r, g, b]: [f32; 3] = group(&mut tokens, "Diffuse")?;
            Material::diffuse(Vec3::new(r, g, b))
        }
        "Metallic" => {
            let [r, g, b, fuzz]: [f32; 4] = group(&mut tokens, "Metallic")?;
            Material::metallic(Vec3::new(r, g, b), fuzz)
        }
        "Crystalline" => {
            let [refractive_index]: [f32; 1] = group(&mut tokens, "Crystalline")?;
            Material::crystalline(refractive_index)
        }
        other => return Err(SceneParseError::UnknownMaterial(other.to_owned())),
    };

    if let Some(extra) = tokens.next() {
        return Err(SceneParseError::Trailing(extra.to_owned()));
    }
    Ok(Object::new(sphere, material))
}

fn next_token<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    expected: &'static str,
) -> Result<&'a str, SceneParseError> {
    tokens.next().ok_or(SceneParseError::Expected {
        expected,
        found: "end of line".to_owned(),
    })
}

/// Reads `( v0 v1 ... )` holding exactly `N` numbers.
fn group<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
    what: &'static str,
) -> Result<[f32; N], SceneParseError> {
    let open = next_token(tokens, "(")?;
    if open != "(" {
        return Err(SceneParseError::Expected {
            expected: "(",
            found: open.to_owned(),
        });
    }
    let mut values = Vec::with_capacity(N);
    loop {
        match next_token(tokens, ")")? {
            ")" => break,
            token => values.push(
                token
                    .parse::<f32>()
                    .map_err(|_| SceneParseError::InvalidNumber(token.to_owned()))?,
            ),
        }
    }
    let found = values.len();
    values.try_into().map_err(|_| SceneParseError::ArgumentCount {
        what,
        expected: N,
        found,
    })
}

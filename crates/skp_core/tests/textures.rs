//! Textured materials through save and load.

use std::fs;
use std::path::PathBuf;

use skp_core::material::{MaterialId, Texture};
use skp_core::{
    load_document, save_document, Color, Document, Face, Material, MemoryKernel, ModelVersion,
    ReadOptions, WriteOptions,
};
use skp_math::DVec3;

/// Fresh directory holding a `width` × `height` PNG of one color.
fn texture_dir(tag: &str, width: u32, height: u32, color: [u8; 4]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("skp_core_{}_{}", tag, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    image::RgbaImage::from_pixel(width, height, image::Rgba(color))
        .save(dir.join("brick.png"))
        .unwrap();
    dir
}

fn brick_wall() -> Document {
    let mut document = Document::new("wall");
    let brick = Material::new("Brick", Color::rgb(150, 60, 40)).with_texture(Texture {
        name: "brick.png".into(),
        width: 0,
        height: 0,
        s_scale: 0.5,
        t_scale: 2.0,
        average_color: Color::BLACK,
        use_alpha: false,
    });
    let brick = document.materials.insert(brick);
    document.entities.faces.push(
        Face::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(4.0, 0.0, 0.0),
            DVec3::new(4.0, 0.0, 2.0),
            DVec3::new(0.0, 0.0, 2.0),
        ])
        .with_materials(brick, MaterialId::NONE),
    );
    document
}

#[test]
fn test_texture_survives_save_and_load() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = texture_dir("round_trip", 4, 2, [200, 100, 50, 255]);
    let kernel = MemoryKernel::new();

    let options = WriteOptions::default().with_texture_dir(&dir);
    save_document(&kernel, &brick_wall(), "wall.skp", ModelVersion::default(), &options).unwrap();
    let read = load_document(&kernel, "wall.skp", &ReadOptions::default()).unwrap();
    fs::remove_dir_all(&dir).ok();

    let face = &read.entities.faces[0];
    let material = read.materials.resolve(face.front_material);
    assert_eq!(material.name, "Brick");
    assert_eq!(material.color, Color::rgb(150, 60, 40));
    assert!(material.uses_texture);

    let texture = material.texture.as_ref().unwrap();
    assert_eq!(texture.name, "brick.png");
    assert_eq!((texture.width, texture.height), (4, 2));
    assert!((texture.s_scale - 0.5).abs() < 1e-12);
    assert!((texture.t_scale - 2.0).abs() < 1e-12);
    assert_eq!(texture.average_color, Color::new(200, 100, 50, 255));
    assert!(texture.use_alpha);
    assert_eq!(kernel.live_count(), 0);
}

#[test]
fn test_textures_can_be_skipped_on_write() {
    let dir = texture_dir("skipped", 2, 2, [10, 20, 30, 255]);
    let kernel = MemoryKernel::new();

    let options = WriteOptions::default()
        .with_texture_dir(&dir)
        .with_textures(false);
    save_document(&kernel, &brick_wall(), "plain.skp", ModelVersion::default(), &options).unwrap();
    let read = load_document(&kernel, "plain.skp", &ReadOptions::default()).unwrap();
    fs::remove_dir_all(&dir).ok();

    let material = read.materials.resolve(read.entities.faces[0].front_material);
    assert_eq!(material.name, "Brick");
    assert!(material.texture.is_none());
    assert!(!material.uses_texture);
}

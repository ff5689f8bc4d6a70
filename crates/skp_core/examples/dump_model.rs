//! Example: Load a .skp file and print its scene graph.
//!
//! Run with: SKETCHUP_SDK_DIR=/path/to/sdk cargo run --features native --example dump_model -- model.skp [--json]

use std::env;

use anyhow::{bail, Context};
use skp_core::kernel::NativeKernel;
use skp_core::{load_document, Entities, ReadOptions, Session};

fn print_entities(entities: &Entities, depth: usize) {
    let pad = "  ".repeat(depth);
    println!(
        "{}{} faces, {} edges, {} curves",
        pad,
        entities.faces.len(),
        entities.edges.len(),
        entities.curves.len()
    );
    for group in &entities.groups {
        println!("{}group '{}' [{}]", pad, group.name, group.guid);
        print_entities(&group.entities, depth + 1);
    }
    for instance in &entities.instances {
        let p = instance.transform.translation();
        println!(
            "{}instance '{}' of {} at ({:.3}, {:.3}, {:.3})",
            pad, instance.name, instance.definition, p.x, p.y, p.z
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("Usage: dump_model <path-to-skp> [--json]");
    }
    let path = &args[1];
    let as_json = args.iter().any(|a| a == "--json");

    let kernel = NativeKernel::new();
    let session = Session::begin(&kernel).context("starting the SketchUp API")?;

    let options = ReadOptions::default().with_meshes(true);
    let document = load_document(session.kernel(), path, &options)
        .with_context(|| format!("loading {}", path))?;

    if as_json {
        println!("{}", document.to_json()?);
        return Ok(());
    }

    println!("\n=== Model: {} ===", document.name);
    println!("Definitions: {}", document.definitions.len());
    println!("Instances: {}", document.instance_count());
    println!("Materials: {}", document.materials.len());

    println!("\n--- Materials ---");
    for (id, material) in document.materials.iter() {
        let c = material.color;
        println!(
            "  [{:?}] {} rgba({}, {}, {}, {}) opacity {:.2}{}",
            id,
            material.name,
            c.r,
            c.g,
            c.b,
            c.a,
            material.opacity,
            if material.texture.is_some() { " textured" } else { "" }
        );
    }

    println!("\n--- Layers ---");
    for layer in &document.layers {
        println!("  {}{}", layer.name, if layer.visible { "" } else { " (hidden)" });
    }

    println!("\n--- Definitions ---");
    for definition in document.definitions.values() {
        println!(
            "  {} [{}] used {} times",
            definition.name,
            definition.guid,
            definition.instances.len()
        );
        print_entities(&definition.entities, 2);
    }

    println!("\n--- Root ---");
    print_entities(&document.entities, 1);

    let bounds = document.world_bounds();
    println!("\n--- World Bounds (m) ---");
    println!("  Min: ({:.3}, {:.3}, {:.3})", bounds.min.x, bounds.min.y, bounds.min.z);
    println!("  Max: ({:.3}, {:.3}, {:.3})", bounds.max.x, bounds.max.y, bounds.max.z);

    Ok(())
}

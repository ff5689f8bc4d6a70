//! Build script for skp_core.
//!
//! Links the SketchUp C API when the `native` feature is enabled. The SDK
//! location comes from `SKETCHUP_SDK_DIR`.

use std::env;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SKETCHUP_SDK_DIR");

    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    let Some(sdk_dir) = env::var_os("SKETCHUP_SDK_DIR").map(PathBuf::from) else {
        println!("cargo:warning=SKETCHUP_SDK_DIR is not set, relying on the default linker search path");
        println!("cargo:rustc-link-lib=dylib=SketchUpAPI");
        return;
    };

    let lib_dirs = sdk_lib_dirs(&sdk_dir);
    if lib_dirs.is_empty() {
        println!(
            "cargo:warning=No library directory found under {}",
            sdk_dir.display()
        );
    }
    for dir in &lib_dirs {
        println!("cargo:rustc-link-search=native={}", dir.display());
    }

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        // The macOS SDK ships a framework rather than a plain library
        println!("cargo:rustc-link-search=framework={}", sdk_dir.display());
        println!("cargo:rustc-link-lib=framework=SketchUpAPI");
    } else {
        println!("cargo:rustc-link-lib=dylib=SketchUpAPI");
    }
}

/// Candidate library folders inside an unpacked SDK.
fn sdk_lib_dirs(sdk_dir: &Path) -> Vec<PathBuf> {
    let candidates = [
        sdk_dir.join("binaries").join("sketchup").join("x64"),
        sdk_dir.join("lib"),
        sdk_dir.to_path_buf(),
    ];

    candidates.into_iter().filter(|dir| dir.is_dir()).collect()
}

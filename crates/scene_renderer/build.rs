// build.rs
// Compiles the scene shaders to SPIR-V with glslc from the Vulkan SDK

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };
    if !Path::new(&glslc).exists() {
        panic!("glslc not found at {}", glslc);
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create {:?}: {}", target_dir, e);
        return;
    }

    let Ok(entries) = std::fs::read_dir(&shader_dir) else {
        eprintln!("info: No shader directory at {:?}", shader_dir);
        return;
    };

    let mut compiled = 0;
    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let is_shader = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SHADER_EXTENSIONS.contains(&e));
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_shader {
            continue;
        }

        // scene.vert -> scene.vert.spv, so stages sharing a stem do not collide
        let out_file = target_dir.join(format!("{}.spv", file_name));
        if is_up_to_date(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc)
            .arg("--target-env=vulkan1.2")
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();
        match status {
            Ok(s) if s.success() => compiled += 1,
            Ok(s) => panic!("glslc failed for {:?} with exit code {}", path, s.code().unwrap_or(-1)),
            Err(e) => panic!("Failed to run glslc for {:?}: {}", path, e),
        }
    }

    eprintln!("info: Compiled {} shader(s)", compiled);
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    matches!((modified(source), modified(output)), (Some(src), Some(dst)) if dst >= src)
}

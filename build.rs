// Build script to compile the triangle's GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

const SHADERS: [(&str, &str); 2] = [
    ("shaders/shader.vert", "shaders/shader.vert.spv"),
    ("shaders/shader.frag", "shaders/shader.frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/shader.vert");
    println!("cargo:rerun-if-changed=shaders/shader.frag");

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(Path::new(input))
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("cargo:warning=Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            // Not fatal: the renderer reports the missing binary at startup.
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=Compile manually: glslc {} -o {}", input, output);
        }
    }
}

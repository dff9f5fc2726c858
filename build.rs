use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");

    let lib_path = Path::new(&crate_dir).join("src/lib.rs");
    if !lib_path.exists() {
        panic!("src/lib.rs missing; create the file before building");
    }

    // C header for the vendor image
    let config = cbindgen::Config::from_root_or_default(&crate_dir);
    let bindings = match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => bindings,
        Err(e) => {
            println!("cargo:warning=cbindgen generation failed: {}", e);
            return;
        }
    };

    let header_path = Path::new(&crate_dir).join("include/mso_mgmt_hal.h");
    if let Some(parent) = header_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            println!("cargo:warning=Failed to create include/ directory: {}", e);
        }
    }

    if !bindings.write_to_file(&header_path) {
        println!("cargo:warning=Failed to write mso_mgmt_hal.h: check permissions or src/ffi.rs content");
    }

    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
}

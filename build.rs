// MIT License
// Copyright 2023--present optirpc developers

use std::env;
use std::path::PathBuf;

/// Generate C header via cbindgen (only when `gen-header` feature is active).
/// Run `cargo build --features gen-header` to regenerate.
#[cfg(feature = "gen-header")]
fn generate_c_header(crate_dir: &str) {
    let output_dir = PathBuf::from(crate_dir).join("include");
    std::fs::create_dir_all(&output_dir).unwrap();

    let config = cbindgen::Config::from_file("cbindgen.toml")
        .expect("Unable to find cbindgen.toml");

    cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
        .expect("Unable to generate C bindings")
        .write_to_file(output_dir.join("optirpc.h"));
}

/// Compile the Cap'n Proto schema. `capnpc` is only a build dependency
/// under the `rpc` feature.
#[cfg(feature = "rpc")]
fn compile_schema(crate_dir: &str) {
    let schema_dir = PathBuf::from(crate_dir).join("schema");
    let schema = schema_dir.join("optics.capnp");
    println!("cargo:rerun-if-changed={}", schema.display());

    // Generated code refers to its own items as `crate::rpc::optics_capnp`.
    capnpc::CompilerCommand::new()
        .src_prefix(&schema_dir)
        .file(&schema)
        .default_parent_module(vec!["rpc".into()])
        .run()
        .expect("Failed to compile Cap'n Proto schema");
}

fn main() {
    #[allow(unused_variables)]
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    #[cfg(feature = "gen-header")]
    generate_c_header(&crate_dir);

    #[cfg(feature = "rpc")]
    compile_schema(&crate_dir);
}

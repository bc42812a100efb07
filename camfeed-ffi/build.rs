use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR")) else {
        println!("cargo:warning=cargo did not set the build directories, skipping header");
        return;
    };
    let header = PathBuf::from(out_dir).join("camfeed.h");

    let result = cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("CAMFEED_H")
        .with_parse_deps(true)
        .with_parse_include(&["camfeed-frame"])
        .generate();

    match result {
        Ok(bindings) => {
            bindings.write_to_file(&header);
        }
        Err(e) => println!("cargo:warning=Header generation failed: {e}"),
    }
}

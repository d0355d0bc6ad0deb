use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let version_path = Path::new(&out_dir).join("state_format.rs");

    // Read the state format version from Cargo.toml metadata
    let cargo_manifest = env::var("CARGO_MANIFEST_DIR").unwrap();
    let cargo_toml_path = Path::new(&cargo_manifest).join("Cargo.toml");
    let cargo_toml_content = fs::read_to_string(&cargo_toml_path)
        .expect("Failed to read Cargo.toml");

    let cargo_toml: toml::Value = cargo_toml_content.parse()
        .expect("Failed to parse Cargo.toml");

    let state_format_version = cargo_toml
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("mock-completion"))
        .and_then(|g| g.get("state_format_version"))
        .and_then(|v| v.as_integer())
        .expect("Failed to find package.metadata.mock-completion.state_format_version in Cargo.toml");

    let version_content = format!(
        "// Generated from package.metadata.mock-completion.state_format_version = {}\n\
         /// Version stamped into exported queue documents and reported by `GET /`\n\
         pub const STATE_FORMAT_VERSION: i64 = {};\n",
        state_format_version, state_format_version
    );

    fs::write(&version_path, version_content)
        .expect("Failed to write state_format.rs");

    println!("cargo:rerun-if-changed=Cargo.toml");
}

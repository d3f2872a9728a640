use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set"));

    println!("cargo:rerun-if-env-changed=TOOLPACK_BUNDLE_DIR");
    let bundle_root = match env::var_os("TOOLPACK_BUNDLE_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => manifest_dir
            .parent()
            .expect("toolpack-core has workspace root parent")
            .join("bundle"),
    };

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let platform_dir = platform_dir_name(&target_os, &target_arch);

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set"));
    let out_file = out_dir.join("bundled_files.rs");

    let files = match platform_dir {
        Some(name) => {
            let root = bundle_root.join(name);
            // Directory-level trigger also catches creation of the platform dir.
            println!("cargo:rerun-if-changed={}", bundle_root.display());
            println!("cargo:rerun-if-changed={}", root.display());
            discover_files(&root)
                .unwrap_or_else(|err| panic!("Failed scanning {}: {err}", root.display()))
        }
        None => {
            println!(
                "cargo:warning=toolpack: no bundle layout for {target_os}-{target_arch}, embedding nothing"
            );
            Vec::new()
        }
    };

    let generated = generate_bundled_files_rs(platform_dir.unwrap_or(""), &files);
    fs::write(&out_file, generated).expect("write generated bundled_files.rs");
}

#[derive(Debug, Clone)]
struct BundledSource {
    // forward-slash path relative to the platform root
    rel: String,
    abs: PathBuf,
    executable: bool,
}

fn platform_dir_name(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") => Some("linux-x64"),
        ("linux", "aarch64") => Some("linux-arm64"),
        ("macos", "x86_64") => Some("macos-x64"),
        ("macos", "aarch64") => Some("macos-arm64"),
        ("windows", "x86_64") => Some("windows-x64"),
        _ => None,
    }
}

fn discover_files(root: &Path) -> io::Result<Vec<BundledSource>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        println!("cargo:rerun-if-changed={}", dir.display());

        let mut entries = dir.read_dir()?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if is_hidden_name(&entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if !file_type.is_file() {
                // Symlinks and special files are not bundled.
                continue;
            }

            println!("cargo:rerun-if-changed={}", path.display());

            let rel = to_forward_slash_path(path.strip_prefix(root).unwrap_or(&path));
            let abs = path.canonicalize()?;
            let executable = is_executable(&entry.metadata()?);
            files.push(BundledSource {
                rel,
                abs,
                executable,
            });
        }
    }

    // Deterministic output.
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

fn generate_bundled_files_rs(platform: &str, files: &[BundledSource]) -> String {
    let mut out = String::new();

    out.push_str("// @generated by toolpack-core/build.rs\n");
    out.push_str("// This file is auto-generated. Do not edit by hand.\n\n");

    out.push_str(&format!(
        "pub const BUNDLE_PLATFORM: &str = {};\n\n",
        to_rust_string_literal(platform)
    ));

    out.push_str("pub static BUNDLED_FILES: &[BundledFile] = &[\n");
    for file in files {
        out.push_str("    BundledFile {\n");
        out.push_str(&format!(
            "        path: {},\n",
            to_rust_string_literal(&file.rel)
        ));
        out.push_str(&format!("        executable: {},\n", file.executable));
        out.push_str(&format!(
            "        data: include_bytes!({}),\n",
            to_rust_string_literal(&file.abs.to_string_lossy())
        ));
        out.push_str("    },\n");
    }
    out.push_str("];\n");

    out
}

fn is_hidden_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn to_forward_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_rust_string_literal(value: &str) -> String {
    // Debug formatting yields a valid Rust string literal with proper escaping.
    format!("{value:?}")
}

// Fails the build when a lint-suppression attribute ("#[" + "allow") shows up
// in any workspace crate. Runs from the core crate, which every other member
// depends on, and scans each sibling directory that has a Cargo.toml.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CHECKED: [&str; 3] = ["src", "tests", "benches"];
const SKIPPED_DIRS: [&str; 3] = ["target", ".git", "migrations"];

fn main() {
    println!("cargo:rerun-if-env-changed=SEATLOCK_CHECK_NO_ALLOW");
    if env::var("SEATLOCK_CHECK_NO_ALLOW").is_ok_and(|v| v == "0") {
        return;
    }

    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR").map(PathBuf::from) else {
        return;
    };

    let mut hits = Vec::new();
    for crate_dir in workspace_crates(&manifest_dir) {
        for relative in CHECKED {
            let root = crate_dir.join(relative);
            if root.exists() {
                println!("cargo:rerun-if-changed={}", root.display());
                collect(&root, &mut hits);
            }
        }
    }

    if hits.is_empty() {
        return;
    }

    eprintln!("lint suppression attributes found in the seatlock workspace:");
    for (file, line, text) in &hits {
        eprintln!("  {}:{}: {}", file.display(), line, text.trim());
    }
    panic!("remove the suppression and fix the lint instead");
}

fn workspace_crates(manifest_dir: &Path) -> Vec<PathBuf> {
    let Some(workspace_root) = manifest_dir.parent() else {
        return vec![manifest_dir.to_path_buf()];
    };
    if !workspace_root.join("Cargo.toml").exists() {
        return vec![manifest_dir.to_path_buf()];
    }
    let Ok(entries) = fs::read_dir(workspace_root) else {
        return vec![manifest_dir.to_path_buf()];
    };
    let mut crates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join("Cargo.toml").exists())
        .collect();
    crates.sort();
    crates
}

fn collect(path: &Path, hits: &mut Vec<(PathBuf, usize, String)>) {
    if path.is_dir() {
        if SKIPPED_DIRS.iter().any(|d| path.ends_with(d)) {
            return;
        }
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            collect(&entry.path(), hits);
        }
        return;
    }

    if path.extension().map_or(true, |ext| ext != "rs") {
        return;
    }

    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let needle = concat!("#", "[allow");
    let inner = concat!("#!", "[allow");
    for (idx, line) in content.lines().enumerate() {
        if line.contains(needle) || line.contains(inner) {
            hits.push((path.to_path_buf(), idx + 1, line.to_string()));
        }
    }
}

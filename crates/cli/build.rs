//! Build script for the pantrypal CLI
//!
//! Exports the build metadata shown by `--version` and `pantrypal info`

use std::env;
use std::process::Command;

fn main() {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Cargo exposes each enabled feature as CARGO_FEATURE_<NAME>
    let mut features: Vec<String> = env::vars()
        .filter_map(|(key, _)| key.strip_prefix("CARGO_FEATURE_").map(str::to_lowercase))
        .collect();
    features.sort();

    let exports = [
        (
            "BUILT_GIT_COMMIT_HASH",
            env::var("GIT_COMMIT_HASH").unwrap_or_else(|_| "unknown".to_string()),
        ),
        ("BUILT_TIME_UTC", chrono::Utc::now().to_rfc3339()),
        ("BUILT_TARGET", env::var("TARGET").unwrap_or_default()),
        ("BUILT_PROFILE", env::var("PROFILE").unwrap_or_default()),
        ("BUILT_RUSTC_VERSION", rustc_version),
        ("BUILT_FEATURES", features.join(", ")),
    ];
    for (key, value) in exports {
        println!("cargo:rustc-env={key}={value}");
    }
    println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
}

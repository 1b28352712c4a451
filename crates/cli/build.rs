// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server stubs are only used by the in-process gateway in tests.
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["../../proto/m8/gateway/v1/gateway.proto"], &["../../proto"])?;

    // Derive version from git tags so local builds show the real version
    // instead of the placeholder in Cargo.toml.
    if let Ok(output) = std::process::Command::new("git")
        .args(["describe", "--tags", "--always"])
        .output()
    {
        let desc = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !desc.is_empty() {
            let version = desc.strip_prefix('v').unwrap_or(&desc);
            println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
        }
    }

    let commit = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_owned());
    println!("cargo:rustc-env=M8CTL_COMMIT={commit}");

    println!("cargo:rerun-if-changed=../../proto/m8/gateway/v1/gateway.proto");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/tags");

    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `m8ctl` binary.

use m8ctl_specs::{free_port, Sandbox};

#[test]
fn version_prints_client_details() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(&["version"])?;

    assert!(run.success(), "{run:?}");
    assert!(run.stdout.contains(m8ctl::VERSION));
    assert!(run.stdout.contains("commit"));
    Ok(())
}

#[test]
fn config_init_and_view() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.init("https://m8.example.com")?;

    let run = sandbox.run(&["config", "view"])?;
    assert!(run.success(), "{run:?}");

    let (location, body) = run.stdout.split_once(":\n").unwrap_or_default();
    assert_eq!(location, sandbox.config_path().display().to_string());
    let json: serde_json::Value = serde_json::from_str(body)?;
    assert_eq!(json["server"], "https://m8.example.com");

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(sandbox.config_path())?)?;
    assert_eq!(on_disk, json);
    Ok(())
}

#[test]
fn config_init_twice_needs_force() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.init("https://one.example.com")?;

    let again = sandbox.run(&["config", "init", "--server-url", "https://two.example.com"])?;
    assert_eq!(again.code, Some(1));
    assert!(again.stderr.contains("--force"), "{}", again.stderr);

    let forced =
        sandbox.run(&["config", "init", "--server-url", "https://two.example.com", "--force"])?;
    assert!(forced.success(), "{forced:?}");
    assert!(std::fs::read_to_string(sandbox.config_path())?.contains("two.example.com"));
    Ok(())
}

#[test]
fn auth_status_without_login() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.init("https://m8.example.com")?;

    let run = sandbox.run(&["auth", "status"])?;
    assert!(run.success(), "{run:?}");
    assert_eq!(run.stdout, "Authenticated: false\n");
    Ok(())
}

#[test]
fn cluster_credentials_without_config_fails_cleanly() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(&["get", "cluster-credentials", "c-1", "default"])?;

    assert_eq!(run.code, Some(1));
    assert!(run.stdout.is_empty(), "stdout polluted: {:?}", run.stdout);
    assert!(run.stderr.contains("error: configuration error"), "{}", run.stderr);
    assert!(run.stderr.contains("hint: run `m8ctl config init"), "{}", run.stderr);
    Ok(())
}

#[test]
fn cluster_credentials_with_unreachable_gateway_is_a_network_error() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.init(&format!("http://127.0.0.1:{}", free_port()?))?;

    let run = sandbox.run(&["get", "cluster-credentials", "c-1", "admin"])?;

    assert_eq!(run.code, Some(1));
    assert!(run.stdout.is_empty(), "stdout polluted: {:?}", run.stdout);
    assert!(run.stderr.contains("network error"), "{}", run.stderr);
    Ok(())
}

#[test]
fn missing_arguments_are_usage_errors() -> anyhow::Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(&["get", "cluster-credentials", "c-1"])?;
    assert_eq!(run.code, Some(2));
    Ok(())
}

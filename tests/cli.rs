use std::fs;
use std::process::Command;

fn ohscript() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ohscript"))
}

#[test]
fn test_run_prints_entry_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lib = dir.path().join("lib.oh");
    let main = dir.path().join("main.oh");
    fs::write(&lib, "func twice(x){x*2}; export twice;").expect("write lib");
    fs::write(&main, "import twice from lib; twice(21) + args.size()").expect("write main");

    let output = ohscript()
        .arg("run")
        .arg(&lib)
        .arg(&main)
        .args(["--", "extra"])
        .output()
        .expect("spawn");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "43");
}

#[test]
fn test_run_reports_panic_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let main = dir.path().join("main.oh");
    fs::write(&main, "1/0").expect("write");
    let output = ohscript().arg("run").arg(&main).output().expect("spawn");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E004"), "stderr: {stderr}");
    assert!(stderr.contains("108"), "stderr: {stderr}");
}

#[test]
fn test_check_prints_warnings_and_config_applies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let main = dir.path().join("main.oh");
    let config = dir.path().join("engine.toml");
    fs::write(&main, "let a = 1; a + unknown_name").expect("write");
    fs::write(&config, "strict_identifiers = false").expect("write config");

    let output = ohscript()
        .arg("check")
        .arg(&main)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("spawn");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("warning"), "stdout: {stdout}");
    assert!(stdout.contains("ok: 1 module(s)"), "stdout: {stdout}");

    fs::write(&config, "strict_identifiers = true").expect("rewrite config");
    let output = ohscript()
        .arg("check")
        .arg(&main)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("spawn");
    assert!(!output.status.success());
}

#[test]
fn test_ast_dump() {
    let dir = tempfile::tempdir().expect("tempdir");
    let main = dir.path().join("main.oh");
    fs::write(&main, "let a = 1;").expect("write");
    let output = ohscript().arg("ast").arg(&main).output().expect("spawn");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Declare Let"));
}

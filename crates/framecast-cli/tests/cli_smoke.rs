use std::process::Command;

#[test]
fn help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_framecast"))
        .arg("help")
        .output()
        .expect("run framecast help");

    assert!(
        output.status.success(),
        "framecast help failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("probe"), "missing probe in help output");
    assert!(stdout.contains("convert"), "missing convert in help output");
}

#[test]
fn convert_help_lists_config_and_frames() {
    let output = Command::new(env!("CARGO_BIN_EXE_framecast"))
        .args(["convert", "--help"])
        .output()
        .expect("run framecast convert --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--config"), "missing --config flag");
    assert!(stdout.contains("--frames"), "missing --frames flag");
    assert!(stdout.contains("--width"), "missing --width flag");
}

#[test]
fn no_arguments_prints_usage_and_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_framecast"))
        .output()
        .expect("run framecast");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "expected usage text, got: {stderr}");
}

#[test]
fn convert_rejects_missing_config_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_framecast"))
        .args(["convert", "--config", "/nonexistent/converter.toml"])
        .output()
        .expect("run framecast convert");

    assert!(!output.status.success());
}

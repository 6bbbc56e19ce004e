use assert_cmd::cargo;
use rstest::rstest;
use scopeguard::defer;
use std::io::Write;
use std::time::Duration;
use std::{
    fs::{self, File},
    path::PathBuf,
};

pub fn create_file(name: &str, content: &str) -> (PathBuf, PathBuf) {
    let temp_dir = std::env::temp_dir();
    let temp_file_path = temp_dir.join(name);
    let mut file = File::create(&temp_file_path).expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");

    (temp_dir, temp_file_path)
}

fn scriptunit() -> assert_cmd::Command {
    let mut cmd = cargo::cargo_bin_cmd!("scriptunit");
    cmd.env(
        "SCRIPTUNIT_CONFIG_DIR",
        std::env::temp_dir().join("scriptunit-run-no-config"),
    )
    .env("NO_COLOR", "1")
    .env_remove("RUST_LOG")
    .env_remove("SCRIPTUNIT_DEBUG")
    .env_remove("SCRIPTUNIT_LOG_LEVEL")
    .timeout(Duration::from_secs(30));
    cmd
}

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).to_string()
}

fn stderr_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).to_string()
}

#[test]
fn test_run_prints_states_and_output() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_hello.lua", "local name = 'hi'\nprint(name)\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit().arg(&script).write_stdin("").assert().success().code(0);
    let stdout = stdout_of(&assert);

    assert!(stdout.contains("hi\n"));
    assert!(stdout.contains("[state] scriptunit_run_hello: ready"));
    assert!(stdout.contains("[state] scriptunit_run_hello: running"));
    assert!(stdout.contains("[state] scriptunit_run_hello: done"));
    assert!(!stdout.contains("[line]"));

    Ok(())
}

#[test]
fn test_execute_prints_value() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_value.lua", "local a = 6\nreturn a * 7\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .arg("--execute")
        .arg(&script)
        .write_stdin("")
        .assert()
        .success()
        .code(0);

    assert!(stdout_of(&assert).ends_with("42\n"));

    Ok(())
}

#[rstest]
#[case::debug(vec!["--trace"], true)]
#[case::no_debug(vec!["--trace", "--no-debug"], false)]
fn test_trace(#[case] args: Vec<&str>, #[case] traced: bool) -> Result<(), Box<dyn std::error::Error>> {
    let name = format!("scriptunit_run_trace_{}.lua", traced);
    let (_, script) = create_file(&name, "local a = 1\nlocal b = 2\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit().args(args).arg(&script).write_stdin("").assert().success();
    let stdout = stdout_of(&assert);

    assert_eq!(stdout.contains("[line] 1"), traced);
    assert_eq!(stdout.contains("[line] 2"), traced);

    Ok(())
}

#[rstest]
#[case::continue_command("continue_command", "c\n")]
#[case::end_of_input("end_of_input", "")]
fn test_breakpoint(#[case] label: &str, #[case] stdin: &str) -> Result<(), Box<dyn std::error::Error>> {
    let name = format!("scriptunit_run_break_{}.lua", label);
    let (_, script) = create_file(&name, "local a = 1\na = a + 1\nprint(a)\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .args(["-b", "2"])
        .arg(&script)
        .write_stdin(stdin)
        .assert()
        .success()
        .code(0);
    let stdout = stdout_of(&assert);

    assert!(stdout.contains(": breaking"));
    assert!(stdout.contains("=>"));
    assert!(stdout.contains("a = a + 1"));
    assert!(stdout.contains("2\n"));
    assert!(stdout.contains(": done"));

    Ok(())
}

#[test]
fn test_console_commands_while_paused() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file(
        "scriptunit_run_console.lua",
        "local a = 1\nlocal b = 2\nlocal c = 3\n",
    );
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .args(["-b", "1"])
        .arg(&script)
        .write_stdin("bp 3\nbp\nh\nstep\n")
        .assert()
        .success();
    let stdout = stdout_of(&assert);

    assert!(stdout.contains("Breakpoint set at line 3"));
    assert!(stdout.contains("Breakpoints: 1, 3"));
    assert!(stdout.contains("c[ontinue]"));
    assert!(stdout.contains("local c = 3"));
    assert_eq!(stdout.matches(": breaking").count(), 2);
    assert!(stderr_of(&assert).contains("Unknown command: step"));

    Ok(())
}

#[rstest]
#[case::probe("probe", vec![], "local n = 0\nwhile true do\n  n = n + 1\nend\n")]
#[case::sleep("sleep", vec!["--no-debug"], "while true do\n  sleep(0.01)\nend\n")]
fn test_abort_from_stdin(
    #[case] label: &str,
    #[case] args: Vec<&str>,
    #[case] source: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = format!("scriptunit_run_abort_{}.lua", label);
    let (_, script) = create_file(&name, source);
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .args(args)
        .arg(&script)
        .write_stdin("abort\n")
        .assert()
        .failure()
        .code(130);

    assert!(stdout_of(&assert).contains(": aborted"));

    Ok(())
}

#[test]
fn test_runtime_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_error.lua", "local a = 1\nerror('boom')\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit().arg(&script).write_stdin("").assert().failure().code(1);

    assert!(stdout_of(&assert).contains(": error (line 2: boom)"));
    assert!(stderr_of(&assert).contains("boom"));

    Ok(())
}

#[test]
fn test_syntax_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_syntax.lua", "local = 1\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit().arg(&script).write_stdin("").assert().failure().code(1);

    assert!(stderr_of(&assert).contains("failed to compile"));
    assert!(!stdout_of(&assert).contains(": running"));

    Ok(())
}

#[test]
fn test_missing_script() -> Result<(), Box<dyn std::error::Error>> {
    let assert = scriptunit()
        .arg("/nonexistent/scriptunit/missing.lua")
        .write_stdin("")
        .assert()
        .failure()
        .code(1);

    assert!(stderr_of(&assert).contains("failed to read"));

    Ok(())
}

#[test]
fn test_bindings_from_command_line() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_bindings.lua", "print(label, count * 2, on)\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .args(["-s", "count=3", "-s", "label=led", "--set", "on=true"])
        .arg(&script)
        .write_stdin("")
        .assert()
        .success();

    assert!(stdout_of(&assert).contains("led\t6\ttrue\n"));

    Ok(())
}

#[test]
fn test_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_config.lua", "local a = 1\nprint(greeting)\n");
    let (_, config) = create_file(
        "scriptunit_run_config.toml",
        "breakpoints = [2]\n\n[globals]\ngreeting = \"hey\"\n",
    );
    defer! {
        fs::remove_file(&script).ok();
        fs::remove_file(&config).ok();
    }

    let assert = scriptunit()
        .arg("--config")
        .arg(&config)
        .arg(&script)
        .write_stdin("")
        .assert()
        .success();
    let stdout = stdout_of(&assert);

    assert!(stdout.contains("hey\n"));
    assert!(stdout.contains(": breaking"));

    Ok(())
}

#[test]
fn test_config_directory_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("scriptunit-run-config-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    defer! {
        fs::remove_dir_all(&dir).ok();
    }
    fs::write(dir.join("config.toml"), "debug = false\n")?;
    let script = dir.join("quiet.lua");
    fs::write(&script, "local a = 1\nlocal b = 2\n")?;

    let assert = scriptunit()
        .env("SCRIPTUNIT_CONFIG_DIR", &dir)
        .arg("--trace")
        .arg(&script)
        .write_stdin("")
        .assert()
        .success();

    assert!(!stdout_of(&assert).contains("[line]"));

    Ok(())
}

#[test]
fn test_invalid_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_bad_config.lua", "return 1\n");
    let (_, config) = create_file("scriptunit_run_bad_config.toml", "colour = 1\n");
    defer! {
        fs::remove_file(&script).ok();
        fs::remove_file(&config).ok();
    }

    let assert = scriptunit()
        .arg("--config")
        .arg(&config)
        .arg(&script)
        .write_stdin("")
        .assert()
        .failure()
        .code(1);

    assert!(stderr_of(&assert).contains("invalid configuration"));

    Ok(())
}

#[test]
fn test_search_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("scriptunit-run-lib-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    defer! {
        fs::remove_dir_all(&dir).ok();
    }
    fs::write(dir.join("scriptunit_run_mod.lua"), "return { value = 42 }\n")?;
    let (_, script) = create_file(
        "scriptunit_run_require.lua",
        "local m = require('scriptunit_run_mod')\nprint(m.value)\n",
    );
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .arg("-L")
        .arg(&dir)
        .arg(&script)
        .write_stdin("")
        .assert()
        .success();

    assert!(stdout_of(&assert).contains("42\n"));

    Ok(())
}

#[test]
fn test_sandbox() -> Result<(), Box<dyn std::error::Error>> {
    let (_, script) = create_file("scriptunit_run_sandbox.lua", "print(os == nil, io == nil)\n");
    defer! {
        fs::remove_file(&script).ok();
    }

    let assert = scriptunit()
        .arg("--sandbox")
        .arg(&script)
        .write_stdin("")
        .assert()
        .success();

    assert!(stdout_of(&assert).contains("true\ttrue\n"));

    Ok(())
}

use anyhow::Result;
use sciath::{App, Args};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const SUITE: &str = "\
tests:
  - name: runs
    command: sh -c 'exit 0'
    type: exit_code
    groups:
      - fast

  - name: hello
    command: echo hello
    expected: hello.expected
    groups:
      - fast
      - text

  - name: residuals
    command: printf 'residual 1.0000001\\nrandom noise\\n'
    type: float_lines
    expected: residuals.expected
    rules:
      - key: residual
        rtol: 1e-5

  - name: staged
    commands:
      - sh -c 'echo 6 > value.txt'
      - cat value.txt
    expected: staged.expected
    groups:
      - slow
";

/// A directory holding the suite file and its expected files.
fn suite_dir() -> Result<TempDir> {
    let dir = tempdir()?;
    fs::write(dir.path().join("suite.yml"), SUITE)?;
    fs::write(dir.path().join("hello.expected"), "hello\n")?;
    fs::write(dir.path().join("residuals.expected"), "residual 1.0\n")?;
    fs::write(dir.path().join("staged.expected"), "6\n")?;
    Ok(dir)
}

fn basic_args(suite: &Path, output: &Path) -> Args {
    Args {
        input_file: Some(stringify(&suite.join("suite.yml"))),
        output: stringify(output),
        // doesn't exist, so the default local launcher is used:
        conf_file: stringify(&output.join("SciATH_launcher.conf")),
        yes: true,
        no_colors: true,
        verbose: 1,
        ..Default::default()
    }
}

fn stringify(path: &Path) -> String {
    path.to_str().unwrap().to_owned()
}

fn run(args: Args) -> Result<bool> {
    simple_logging::log_to_stderr(log::LevelFilter::Debug);
    let settings = args.try_into()?;
    App::new(settings).run()
}

fn output_file(output: &Path, test: &str, file: &str) -> PathBuf {
    output.join(format!("{}_output", test)).join(file)
}

#[test]
fn test_suite_passes() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    assert!(run(basic_args(suite.path(), output.path()))?);

    let exitcodes = output_file(output.path(), "staged", "sciath.job-staged.exitcode");
    assert_eq!(fs::read_to_string(exitcodes)?, "0\n0\n");
    let stdout = output_file(output.path(), "hello", "sciath.job-hello.stdout");
    assert_eq!(fs::read_to_string(stdout)?, "hello\n");
    assert!(
        output_file(output.path(), "staged", "sandbox/value.txt").exists(),
        "commands run in the sandbox"
    );
    Ok(())
}

#[test]
fn test_failing_test() -> Result<()> {
    let suite = suite_dir()?;
    fs::write(suite.path().join("hello.expected"), "goodbye\n")?;
    let output = tempdir()?;
    assert!(!run(basic_args(suite.path(), output.path()))?);
    Ok(())
}

#[test]
fn test_execute_then_verify() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;

    let mut args = basic_args(suite.path(), output.path());
    args.execute = true;
    assert!(run(args)?);
    assert!(output_file(output.path(), "runs", "sciath.job-runs.exitcode").exists());

    let mut args = basic_args(suite.path(), output.path());
    args.verify = true;
    assert!(run(args)?);
    Ok(())
}

#[test]
fn test_verify_without_execute() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    let mut args = basic_args(suite.path(), output.path());
    args.verify = true;
    assert!(!run(args)?, "nothing has run, so tests are incomplete");
    Ok(())
}

#[test]
fn test_update_expected() -> Result<()> {
    let suite = suite_dir()?;
    let expected = suite.path().join("hello.expected");
    fs::write(&expected, "stale\n")?;
    let output = tempdir()?;

    let mut args = basic_args(suite.path(), output.path());
    args.test_subset = Some(String::from("hello"));
    args.update_expected = true;
    args.execute = true;
    assert!(run(args)?);
    assert_eq!(fs::read_to_string(&expected)?, "hello\n");

    let mut args = basic_args(suite.path(), output.path());
    args.test_subset = Some(String::from("hello"));
    assert!(run(args)?);
    Ok(())
}

#[test]
fn test_select_by_group() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    let mut args = basic_args(suite.path(), output.path());
    args.groups = Some(String::from("fast"));
    args.exclude_groups = Some(String::from("text"));
    assert!(run(args)?);

    assert!(output.path().join("runs_output").exists());
    assert!(!output.path().join("hello_output").exists());
    assert!(!output.path().join("staged_output").exists());
    Ok(())
}

#[test]
fn test_purge() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    assert!(run(basic_args(suite.path(), output.path()))?);

    let mut args = basic_args(suite.path(), output.path());
    args.purge_output = true;
    assert!(run(args)?);
    assert!(!output_file(output.path(), "staged", "sandbox").exists());
    assert!(!output_file(output.path(), "hello", "sciath.job-hello.stdout").exists());
    Ok(())
}

#[test]
fn test_foreign_sandbox_is_not_deleted() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    let sandbox = output_file(output.path(), "runs", "sandbox");
    fs::create_dir_all(&sandbox)?;
    fs::write(sandbox.join("precious.dat"), "data")?;

    assert!(run(basic_args(suite.path(), output.path())).is_err());
    assert!(sandbox.join("precious.dat").exists());
    Ok(())
}

#[test]
fn test_configure_default_then_run() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    let conf = output.path().join("SciATH_launcher.conf");

    let mut args = basic_args(suite.path(), output.path());
    args.configure_default = true;
    assert!(run(args)?);
    assert!(conf.exists());
    assert!(!output.path().join("runs_output").exists(), "configuring runs nothing");

    assert!(run(basic_args(suite.path(), output.path()))?);
    Ok(())
}

#[test]
fn test_mpi_test_is_skipped_without_mpi() -> Result<()> {
    let suite = tempdir()?;
    fs::write(
        suite.path().join("suite.yml"),
        "tests:\n  - name: par\n    command: ./par\n    ranks: 4\n    type: exit_code\n",
    )?;
    let output = tempdir()?;
    assert!(!run(basic_args(suite.path(), output.path()))?);
    Ok(())
}

#[test]
fn test_list() -> Result<()> {
    let suite = suite_dir()?;
    let output = tempdir()?;
    let mut args = basic_args(suite.path(), output.path());
    args.list = true;
    assert!(run(args)?);
    assert!(!output.path().join("runs_output").exists());
    Ok(())
}

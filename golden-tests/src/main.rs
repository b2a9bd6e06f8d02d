use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

static EXPECTED_STDOUT_FILE: &str = "expected-stdout";
static EXPECTED_METRICS_FILE: &str = "expected-metrics";

/// Where each test case writes the output directory of its run
static OUTPUT_ROOT: &str = "target/golden";

struct TestCase {
    dir: PathBuf,
    name: String,
    args: String,
    expected_stdout: Option<String>,
    expected_metrics: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let mut test_cases = Vec::new();
    let test_dirs =
        std::fs::read_dir("golden-tests/tests").context("golden tests root directory not found")?;
    for entry in test_dirs {
        let entry = entry?;
        let path = entry.path();

        if !path.is_dir() {
            println!(
                "skipping path `{}` because it's not a directory",
                path.display()
            );
            continue;
        }

        let args_path = path.join("args");
        let args = std::fs::read_to_string(&args_path)
            .with_context(|| format!("no `args` file found at `{}`", args_path.display()))?;

        test_cases.push(TestCase {
            expected_stdout: read_expected(&path, EXPECTED_STDOUT_FILE)?,
            expected_metrics: read_expected(&path, EXPECTED_METRICS_FILE)?,
            name: path.display().to_string(),
            dir: path,
            args,
        })
    }

    let mut errored = false;
    for test_case in test_cases {
        let name = test_case.name.clone();
        if let Err(e) = run_iot_scenario(test_case) {
            println!("Error running golden test `{name}`");
            match e {
                TestError::Internal(e) => println!("{e:?}"),
                TestError::Compare(e) => {
                    if let Some(diff) = e.rerun_diff {
                        println!("A second run with the same arguments differs:\n{diff}\n");
                    }

                    if let Some(diff) = e.metrics_diff {
                        println!("Expected metrics differ from actual metrics:\n{diff}\n");
                    }

                    if let Some(diff) = e.stdout_diff {
                        println!("Expected stdout differs from actual stdout:\n{diff}");
                    }
                }
            }
            errored = true;
        } else {
            println!("{name}: ✅");
        }
    }

    if errored {
        bail!("one or more golden tests failed");
    }

    Ok(())
}

fn read_expected(dir: &Path, file_name: &str) -> anyhow::Result<Option<String>> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    Ok(Some(contents))
}

enum TestError {
    Internal(anyhow::Error),
    Compare(CompareError),
}

struct CompareError {
    stdout_diff: Option<String>,
    metrics_diff: Option<String>,
    /// Differences between two runs with the same arguments
    rerun_diff: Option<String>,
}

struct RunOutput {
    stdout: String,
    /// `metrics.csv` without its wall-clock column
    metrics: String,
}

fn run_iot_scenario(test_case: TestCase) -> Result<(), TestError> {
    let test_name = test_case
        .dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    // The same arguments must give the same results, even before any expectation is stored
    let first = run_once(&test_case.args, &Path::new(OUTPUT_ROOT).join(&test_name))?;
    let second = run_once(
        &test_case.args,
        &Path::new(OUTPUT_ROOT).join(format!("{test_name}-rerun")),
    )?;
    let rerun_diff = if first.stdout != second.stdout {
        Some(diff::diff_to_string(&first.stdout, &second.stdout))
    } else if first.metrics != second.metrics {
        Some(diff::diff_to_string(&first.metrics, &second.metrics))
    } else {
        None
    };

    let stdout_diff = compare_or_persist(
        &test_case.dir,
        EXPECTED_STDOUT_FILE,
        test_case.expected_stdout,
        &first.stdout,
    )?;
    let metrics_diff = compare_or_persist(
        &test_case.dir,
        EXPECTED_METRICS_FILE,
        test_case.expected_metrics,
        &first.metrics,
    )?;

    if stdout_diff.is_some() || metrics_diff.is_some() || rerun_diff.is_some() {
        Err(TestError::Compare(CompareError {
            stdout_diff,
            metrics_diff,
            rerun_diff,
        }))
    } else {
        Ok(())
    }
}

fn run_once(args: &str, output_dir: &Path) -> Result<RunOutput, TestError> {
    let command = Command::new("cargo")
        .arg("run")
        .arg("--release")
        .arg("--bin")
        .arg("iot-scenario")
        .arg("--")
        .args(args.split_whitespace())
        .arg(format!("--outputDir={}", output_dir.display()))
        .output()
        .context("iot-scenario process crashed")
        .map_err(TestError::Internal)?;

    if !command.status.success() {
        return Err(TestError::Internal(anyhow::anyhow!(
            "iot-scenario exited with {}:\n{}",
            command.status,
            String::from_utf8_lossy(&command.stderr)
        )));
    }

    let metrics_path = output_dir.join("metrics").join("metrics.csv");
    let metrics = std::fs::read_to_string(&metrics_path)
        .with_context(|| format!("failed to read {}", metrics_path.display()))
        .map_err(TestError::Internal)?;

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&command.stdout).into_owned(),
        metrics: without_timestamps(&metrics),
    })
}

/// Returns a diff if `actual` differs from `expected`, or stores `actual` as the new expectation
/// when there is none yet
fn compare_or_persist(
    dir: &Path,
    file_name: &str,
    expected: Option<String>,
    actual: &str,
) -> Result<Option<String>, TestError> {
    match expected {
        Some(expected) if expected != actual => Ok(Some(diff::diff_to_string(&expected, actual))),
        Some(_) => Ok(None),
        None => {
            std::fs::write(dir.join(file_name), actual.as_bytes())
                .with_context(|| format!("failed to persist {file_name}"))
                .map_err(TestError::Internal)?;
            Ok(None)
        }
    }
}

/// Drops the leading wall-clock column of every line, which changes from run to run
fn without_timestamps(csv: &str) -> String {
    let mut output = String::new();
    for line in csv.lines() {
        let rest = line.split_once(',').map_or(line, |(_, rest)| rest);
        output.push_str(rest);
        output.push('\n');
    }

    output
}

mod diff {
    use console::{Style, style};
    use similar::{ChangeTag, TextDiff};
    use std::fmt::{self, Write};

    struct Line(Option<usize>);

    impl fmt::Display for Line {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self.0 {
                None => write!(f, "    "),
                Some(idx) => write!(f, "{:<4}", idx + 1),
            }
        }
    }

    pub fn diff_to_string(old: &str, new: &str) -> String {
        let mut output = String::new();
        let diff = TextDiff::from_lines(old, new);

        for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
            if idx > 0 {
                _ = writeln!(output, "{:-^1$}", "-", 80);
            }
            for op in group {
                for change in diff.iter_inline_changes(op) {
                    let (sign, s) = match change.tag() {
                        ChangeTag::Delete => ("-", Style::new().red()),
                        ChangeTag::Insert => ("+", Style::new().green()),
                        ChangeTag::Equal => (" ", Style::new().dim()),
                    };
                    _ = write!(
                        output,
                        "{}{} |{}",
                        style(Line(change.old_index())).dim(),
                        style(Line(change.new_index())).dim(),
                        s.apply_to(sign).bold(),
                    );
                    for (emphasized, value) in change.iter_strings_lossy() {
                        if emphasized {
                            _ = write!(output, "{}", s.apply_to(value).underlined().on_black());
                        } else {
                            _ = write!(output, "{}", s.apply_to(value));
                        }
                    }
                    if change.missing_newline() {
                        _ = writeln!(output);
                    }
                }
            }
        }

        output
    }
}

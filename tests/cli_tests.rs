//! # CLI Tests / 命令行测试
//!
//! Runs the compiled binary against throwaway project roots.

mod common;

use assert_cmd::Command;
use common::{bench_dir, setup_project, write_file};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn harness() -> Command {
    let mut cmd = Command::cargo_bin("kernel-matrix-runner").unwrap();
    cmd.env("KMR_LOG", "error");
    cmd
}

/// Settings pointing at `root`, with TritonBench files run by `sh`.
fn write_settings(root: &Path) -> PathBuf {
    let path = root.join("Harness.toml");
    write_file(
        &path,
        &format!(
            "project_root = \"{root}\"\noutput_dir = \"{root}/out\"\ntimeout_secs = 30\n\n\
             [repositories.tritonbench]\ncommand = \"sh\"\n",
            root = root.display()
        ),
    );
    write_file(&root.join("tritonbench_profiler_wrapper.py"), "exec sh \"$1\"\n");
    path
}

fn result_tables(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            let name = path.file_name().unwrap().to_string_lossy();
            name.starts_with("results_") && name.ends_with(".csv")
        })
        .collect();
    files
        .into_iter()
        .partition(|path| !path.to_string_lossy().ends_with("_wide.csv"))
}

#[test]
fn test_list_shows_the_registry() {
    harness()
        .args(["--lang", "en", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ablation_no_cache"))
        .stdout(predicate::str::contains("kernel_time_tritonbench"))
        .stdout(predicate::str::contains("baseline, compute_sanitizer, triton_sanitizer"));
}

#[test]
fn test_list_in_chinese() {
    harness()
        .args(["--lang", "zh-CN", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("配置组"));
}

#[test]
fn test_unknown_config_group_is_a_config_error() {
    let root = setup_project();
    let settings = write_settings(root.path());
    harness()
        .current_dir(root.path())
        .args(["run", "--config-groups", "baseline,turbo"])
        .arg("--settings")
        .arg(&settings)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("turbo"));
    assert!(!root.path().join("out").exists());
}

#[test]
fn test_missing_explicit_whitelist_is_a_config_error() {
    let root = setup_project();
    let settings = write_settings(root.path());
    harness()
        .current_dir(root.path())
        .args(["run", "--repos", "tritonbench", "--config-groups", "ablation_studies"])
        .args(["--whitelist", "nope.txt", "--whitelist-repo", "tritonbench"])
        .arg("--settings")
        .arg(&settings)
        .assert()
        .code(2);
}

#[test]
fn test_run_help_lists_options() {
    harness()
        .args(["--lang", "en", "run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config-groups"))
        .stdout(predicate::str::contains("--timeout"));
}

#[cfg(unix)]
#[test]
fn test_run_writes_tables_and_exits_zero_despite_cell_failures() {
    let root = setup_project();
    let settings = write_settings(root.path());
    let bench = bench_dir(root.path());
    write_file(
        &bench.join("data/TritonBench_G_v1/a_kernel.py"),
        "echo \"[triton-profiler] kernel=a cpu_launch_ms=0.01 gpu_time_ms=1.5\"\n",
    );
    write_file(&bench.join("data/TritonBench_G_v1/b_kernel.py"), "exit 3\n");
    write_file(&bench.join("EVAL/c_kernel.py"), "echo ok\n");

    harness()
        .current_dir(root.path())
        .args([
            "--lang",
            "en",
            "run",
            "--repos",
            "tritonbench",
            "--config-groups",
            "kernel_time_tritonbench",
        ])
        .arg("--settings")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("tritonbench"));

    let out = root.path().join("out");
    let (long, wide) = result_tables(&out);
    assert_eq!(long.len(), 1);
    assert_eq!(wide.len(), 1);

    let table = fs::read_to_string(&long[0]).unwrap();
    assert!(table.contains("1,tritonbench,a_kernel,kernel_time_tritonbench_baseline,succeeded,0,"));
    assert!(table.contains(",1.5,"));
    assert!(table.contains("2,tritonbench,b_kernel,kernel_time_tritonbench_baseline,failed,3,"));
    // EVAL sorts before data, so c_kernel is test 0. Three tests across three configurations.
    assert_eq!(table.lines().count(), 1 + 9);

    let wide_table = fs::read_to_string(&wide[0]).unwrap();
    assert!(wide_table.starts_with(
        "Test_Number,Test_Name,kernel_time_tritonbench_baseline,\
         kernel_time_tritonbench_compute_sanitizer,kernel_time_tritonbench_triton_sanitizer"
    ));

    let log = out.join("kernel_time_tritonbench/baseline/2_tritonbench_a_kernel.log");
    let log = fs::read_to_string(log).unwrap();
    assert!(log.contains("Status: PASSED"));
}

#[test]
fn test_clean_removes_matching_output_dirs() {
    let root = setup_project();
    fs::create_dir_all(root.path().join("test_outputs/baseline")).unwrap();
    fs::create_dir_all(root.path().join("test_outputs_ablation")).unwrap();
    fs::create_dir_all(root.path().join("keep_me")).unwrap();

    harness()
        .current_dir(root.path())
        .args(["--lang", "en", "clean", "--yes"])
        .assert()
        .success();

    assert!(!root.path().join("test_outputs").exists());
    assert!(!root.path().join("test_outputs_ablation").exists());
    assert!(root.path().join("keep_me").exists());
}

#[test]
fn test_init_non_interactive_writes_default_settings() {
    let root = setup_project();
    harness()
        .current_dir(root.path())
        .args(["--lang", "en", "init", "--non-interactive"])
        .assert()
        .success();

    let content = fs::read_to_string(root.path().join("Harness.toml")).unwrap();
    assert!(content.contains("timeout_secs = 300"));
    assert!(content.contains("output_dir = \"test_outputs\""));
}

#[test]
fn test_analyze_writes_a_report_next_to_the_input() {
    let root = setup_project();
    let input = root.path().join("results.csv");
    let mut csv = String::from(
        "ordinal,repository,test_id,config_label,status,exit_code,duration_secs,metric,max_rss_kb\n",
    );
    for (label, metric) in [
        ("ablation_no_cache", "10.0"),
        ("ablation_symbol_only", "8.0"),
        ("ablation_symbol_loop", ""),
        ("ablation_symbol_loop_grid", "4.0"),
        ("ablation_all_cache", "2.0"),
    ] {
        csv.push_str(&format!("0,tritonbench,a_kernel,{label},succeeded,0,1.0,{metric},\n"));
    }
    write_file(&input, &csv);

    harness()
        .current_dir(root.path())
        .args(["--lang", "en", "analyze", "--input"])
        .arg(&input)
        .assert()
        .success();

    let report = fs::read_to_string(root.path().join("results.analysis.json")).unwrap();
    assert!(report.contains("\"not_comparable\""));
    assert!(report.contains("ablation_all_cache"));
}

#[cfg(unix)]
mod termination {
    use super::*;
    use std::process::{Command as StdCommand, Stdio};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    fn wait_for<T>(limit: Duration, mut probe: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Some(value) = probe() {
                return Some(value);
            }
            sleep(Duration::from_millis(50));
        }
        None
    }

    fn read_pid(path: &Path) -> Option<i32> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    fn is_gone(pid: i32) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return true;
        }
        // A reparented child that has exited but not yet been reaped.
        fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| stat.rsplit(')').next().is_some_and(|rest| rest.trim_start().starts_with('Z')))
            .unwrap_or(true)
    }

    fn interrupted_run(signal: libc::c_int) {
        let root = setup_project();
        let settings = write_settings(root.path());
        let bench = bench_dir(root.path());
        let shell_pid = root.path().join("shell.pid");
        let background_pid = root.path().join("background.pid");
        // Only a_kernel remains, so it is the first and only test.
        fs::remove_file(bench.join("EVAL/c_kernel.py")).unwrap();
        fs::remove_file(bench.join("data/TritonBench_G_v1/b_kernel.py")).unwrap();
        write_file(
            &bench.join("data/TritonBench_G_v1/a_kernel.py"),
            &format!(
                "echo $$ > {shell}\nsleep 987 &\necho $! > {background}\nsleep 987\n",
                shell = shell_pid.display(),
                background = background_pid.display()
            ),
        );

        let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("kernel-matrix-runner"))
            .current_dir(root.path())
            .env("KMR_LOG", "error")
            .args(["--lang", "en", "run", "--repos", "tritonbench"])
            .args(["--config-groups", "kernel_time_tritonbench", "--settings"])
            .arg(&settings)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let pids = wait_for(Duration::from_secs(30), || {
            Some((read_pid(&shell_pid)?, read_pid(&background_pid)?))
        });
        let Some((shell, background)) = pids else {
            let _ = child.kill();
            panic!("the test script never started");
        };

        unsafe { libc::kill(child.id() as i32, signal) };
        let status = wait_for(Duration::from_secs(30), || child.try_wait().unwrap());
        let Some(status) = status else {
            let _ = child.kill();
            panic!("the harness did not stop after the signal");
        };

        // The harness handled the signal instead of dying from it.
        assert!(status.code().is_some(), "harness killed by signal: {status:?}");
        assert!(wait_for(Duration::from_secs(10), || is_gone(shell).then_some(())).is_some());
        assert!(wait_for(Duration::from_secs(10), || is_gone(background).then_some(())).is_some());

        let (long, wide) = result_tables(&root.path().join("out"));
        assert_eq!(long.len(), 1);
        assert_eq!(wide.len(), 1);
        assert!(fs::read_to_string(&long[0]).unwrap().starts_with("ordinal,repository"));

        let log = root
            .path()
            .join("out/kernel_time_tritonbench/baseline/1_tritonbench_a_kernel.log");
        assert!(fs::read_to_string(log).unwrap().contains("Status: INTERRUPTED"));
    }

    #[test]
    fn test_sigterm_kills_the_test_tree_and_flushes_tables() {
        interrupted_run(libc::SIGTERM);
    }

    #[test]
    fn test_sighup_kills_the_test_tree_and_flushes_tables() {
        interrupted_run(libc::SIGHUP);
    }
}

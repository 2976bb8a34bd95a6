//! # Execution Engine Integration Tests / 执行引擎集成测试
//!
//! The engine driven end to end: planner output in, ordered result table out.
//! Most tests use a scripted launcher; the `real_process` tests spawn `sh`.

mod common;

use common::{bench_dir, gems_dir, pytest_source, setup_project, write_file, FakeLauncher, Script};
use kernel_matrix_runner::core::aggregator::Aggregator;
use kernel_matrix_runner::core::analysis::{analyze, Comparable, Comparison};
use kernel_matrix_runner::core::discovery::Discovery;
use kernel_matrix_runner::core::environment::BaseEnvironment;
use kernel_matrix_runner::core::execution::{Engine, SuiteCommand};
use kernel_matrix_runner::core::matrix::{build_matrix, ConfigMatrix};
use kernel_matrix_runner::core::models::{OutcomeStatus, Repository};
use kernel_matrix_runner::core::planner::{plan_execution, ExecutionPlan};
use kernel_matrix_runner::core::whitelist::Whitelist;
use kernel_matrix_runner::error::EngineFatalError;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn bench_plan(root: &Path, matrix: &ConfigMatrix, whitelist: &[&str]) -> ExecutionPlan {
    let whitelist = (!whitelist.is_empty()).then(|| Whitelist::new(whitelist.iter().copied()));
    let discovery = Discovery::new(Repository::Tritonbench, bench_dir(root), whitelist);
    plan_execution(matrix, &[discovery], &root.join("out"))
}

fn engine<L>(launcher: L, root: &Path, timeout: Duration) -> Engine<L>
where
    L: kernel_matrix_runner::core::execution::CellLauncher,
{
    Engine::new(
        launcher,
        BaseEnvironment::from_vars([("PATH", "/usr/bin:/bin"), ("HOME", "/root")]).with_project_root(root),
        root.to_path_buf(),
        timeout,
    )
    .with_suite(
        Repository::Tritonbench,
        SuiteCommand {
            command: vec!["python".to_string()],
            test_dir: bench_dir(root),
        },
    )
    .with_suite(
        Repository::FlagGems,
        SuiteCommand {
            command: vec!["pytest".to_string(), "-s".to_string()],
            test_dir: gems_dir(root),
        },
    )
}

fn env_is(request: &kernel_matrix_runner::infra::command::LaunchRequest, key: &str, value: &str) -> bool {
    request.env.get(key).map(String::as_str) == Some(value)
}

#[tokio::test]
async fn test_ablation_group_produces_five_outcomes_and_four_deltas() {
    let root = setup_project();
    let matrix = build_matrix(&["ablation_studies"]).unwrap();
    let plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
    assert_eq!(plan.cells.len(), 5);

    // The symbol+loop level prints no timing line.
    let launcher = FakeLauncher::new(|request| {
        let enabled = ["SYMBOL", "LOOP", "GRID", "KERNEL"]
            .iter()
            .filter(|cache| env_is(request, &format!("SANITIZER_ENABLE_{cache}_CACHE"), "1"))
            .count();
        if enabled == 2 {
            return Script::pass("no timing today\n");
        }
        let ms = 10.0 - 2.0 * enabled as f64;
        Script::pass(&format!("Triton-Viz: execution time for a_kernel: {ms} ms\n"))
    });
    let aggregator = Aggregator::new(matrix.labels());
    let stats = engine(launcher, root.path(), Duration::from_secs(60))
        .run(plan.cells, &aggregator, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.completed, 5);

    let table = aggregator.finalize();
    assert_eq!(table.len(), 5);
    assert!(table.rows.iter().all(|row| row.succeeded()));
    let metrics: Vec<_> = table.rows.iter().map(|row| row.metric).collect();
    assert_eq!(metrics, [Some(10.0), Some(8.0), None, Some(4.0), Some(2.0)]);

    let report = analyze(&table, &Comparison::ablation()).unwrap();
    let deltas: Vec<_> = report.tests[0].candidates.iter().map(|c| c.delta).collect();
    assert_eq!(
        deltas,
        [
            Comparable::Value(-2.0),
            Comparable::NotComparable,
            Comparable::Value(-6.0),
            Comparable::Value(-8.0)
        ]
    );
}

#[tokio::test]
async fn test_interrupt_keeps_only_completed_cells() {
    let root = setup_project();
    let matrix = build_matrix(&["ablation_studies"]).unwrap();
    let plan = bench_plan(root.path(), &matrix, &["a_kernel", "b_kernel"]);
    assert_eq!(plan.cells.len(), 10);
    let fourth_log = plan.cells[3].log_path.clone();
    let fifth_log = plan.cells[4].log_path.clone();

    let stop = CancellationToken::new();
    let launches = Arc::new(AtomicUsize::new(0));
    let launcher = {
        let stop = stop.clone();
        let launches = launches.clone();
        FakeLauncher::new(move |_| {
            if launches.fetch_add(1, Ordering::SeqCst) == 3 {
                stop.cancel();
                return Script::pass("partial output").after(Duration::from_secs(3600));
            }
            Script::pass("")
        })
    };

    let aggregator = Aggregator::new(matrix.labels());
    let stats = engine(launcher, root.path(), Duration::from_secs(7200))
        .run(plan.cells, &aggregator, &stop)
        .await
        .unwrap();

    assert!(stats.interrupted);
    assert_eq!(stats.completed, 3);
    assert_eq!(launches.load(Ordering::SeqCst), 4);

    let table = aggregator.finalize();
    let keys: Vec<_> = table
        .rows
        .iter()
        .map(|row| (row.test_id.as_str(), row.config_label.as_str()))
        .collect();
    assert_eq!(
        keys,
        [
            ("a_kernel", "ablation_no_cache"),
            ("a_kernel", "ablation_symbol_only"),
            ("b_kernel", "ablation_no_cache"),
        ]
    );

    let interrupted_log = fs::read_to_string(fourth_log).unwrap();
    assert!(interrupted_log.contains("Status: INTERRUPTED"));
    assert!(!fifth_log.exists());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_boundary_is_classified_consistently() {
    let root = setup_project();
    let matrix = build_matrix(&["ablation_studies"]).unwrap();
    let timeout = Duration::from_secs(10);

    let run_with_delay = |delay: Duration| {
        let plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
        let launcher = FakeLauncher::new(move |_| Script::pass("").after(delay));
        let runner = engine(launcher, root.path(), timeout);
        let labels = matrix.labels();
        async move {
            let aggregator = Aggregator::new(labels);
            let mut cells = plan.cells;
            cells.truncate(1);
            runner
                .run(cells, &aggregator, &CancellationToken::new())
                .await
                .unwrap();
            aggregator.finalize().rows[0].status
        }
    };

    let mut at_boundary = Vec::new();
    for _ in 0..5 {
        at_boundary.push(run_with_delay(timeout).await);
    }
    assert!(at_boundary.windows(2).all(|pair| pair[0] == pair[1]));

    assert_eq!(
        run_with_delay(timeout - Duration::from_millis(1)).await,
        OutcomeStatus::Succeeded
    );
    assert_eq!(
        run_with_delay(timeout + Duration::from_millis(1)).await,
        OutcomeStatus::TimedOut
    );
}

#[tokio::test]
async fn test_cell_failures_are_recorded_not_raised() {
    let root = setup_project();
    let matrix = build_matrix(&["compute_sanitizer"]).unwrap();
    let discovery = Discovery::new(Repository::FlagGems, gems_dir(root.path()), None);
    let plan = plan_execution(&matrix, &[discovery], &root.path().join("out"));
    assert_eq!(plan.cells.len(), 12);

    let launcher = FakeLauncher::new(|request| {
        let target = request.args.last().cloned().unwrap_or_default();
        if target.ends_with("test_accuracy_add_scalar") {
            Script::exit(1)
        } else if target.starts_with("test_mul") && env_is(request, "TRITON_ALWAYS_COMPILE", "1") {
            Script::spawn_failure()
        } else {
            Script::pass("1 passed")
        }
    });

    let aggregator = Aggregator::new(matrix.labels());
    let stats = engine(launcher, root.path(), Duration::from_secs(60))
        .run(plan.cells, &aggregator, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.completed, 12);
    assert_eq!(stats.attempted, 12);
    assert_eq!(stats.spawned, 10);

    let table = aggregator.finalize();
    let count = |status| table.rows.iter().filter(|r| r.status == status).count();
    assert_eq!(count(OutcomeStatus::Failed), 4);
    assert_eq!(count(OutcomeStatus::Crashed), 2);
    assert_eq!(count(OutcomeStatus::Succeeded), 6);

    let failed = table
        .rows
        .iter()
        .find(|r| r.status == OutcomeStatus::Failed)
        .unwrap();
    assert_eq!(failed.exit_code, Some(1));
    assert_eq!(failed.ordinal, 1);
}

#[tokio::test]
async fn test_no_process_spawned_is_fatal_but_rows_remain() {
    let root = setup_project();
    let matrix = build_matrix(&["ablation_studies"]).unwrap();
    let plan = bench_plan(root.path(), &matrix, &["a_kernel"]);

    let aggregator = Aggregator::new(matrix.labels());
    let result = engine(FakeLauncher::new(|_| Script::spawn_failure()), root.path(), Duration::from_secs(5))
        .run(plan.cells, &aggregator, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(EngineFatalError::NoProcessSpawned { attempted: 5 })
    ));
    let table = aggregator.finalize();
    assert_eq!(table.len(), 5);
    assert!(table.rows.iter().all(|r| r.status == OutcomeStatus::Crashed));
}

#[tokio::test]
async fn test_each_cell_gets_a_private_environment() {
    let root = setup_project();
    let matrix = build_matrix(&["baseline"]).unwrap();
    let plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
    let launcher = FakeLauncher::passing();

    let aggregator = Aggregator::new(matrix.labels());
    engine(launcher.clone(), root.path(), Duration::from_secs(5))
        .run(plan.cells, &aggregator, &CancellationToken::new())
        .await
        .unwrap();

    let launched = launcher.launched();
    assert_eq!(launched.len(), 4);
    for (launch, config) in launched.iter().zip(matrix.columns()) {
        for (key, value) in config.bindings() {
            assert_eq!(launch.env.get(*key).map(String::as_str), Some(*value));
        }
        assert_eq!(launch.env.get("HOME").map(String::as_str), Some("/root"));
        assert_eq!(
            launch.env.get("PYTHONPATH").map(String::as_str),
            Some(root.path().to_string_lossy().as_ref())
        );
        assert_eq!(launch.cwd, bench_dir(root.path()));
        assert_eq!(
            launch.argv,
            ["/usr/bin/time", "-v", "python", "data/TritonBench_G_v1/a_kernel.py"]
        );
    }
}

#[tokio::test]
async fn test_log_file_has_header_and_footer() {
    let root = setup_project();
    let matrix = build_matrix(&["baseline"]).unwrap();
    let plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
    let log_path = plan.cells[0].log_path.clone();

    let launcher = FakeLauncher::new(|_| {
        Script::pass("kernel ok\n\tMaximum resident set size (kbytes): 4096\n")
    });
    let aggregator = Aggregator::new(matrix.labels());
    engine(launcher, root.path(), Duration::from_secs(5))
        .run(plan.cells, &aggregator, &CancellationToken::new())
        .await
        .unwrap();

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.starts_with("Test Number: 1\nTest: tritonbench/a_kernel\nEnvironment: baseline_compile_no_cache\n"));
    assert!(log.contains("Command: /usr/bin/time -v python data/TritonBench_G_v1/a_kernel.py\n"));
    assert!(log.contains(&"=".repeat(80)));
    assert!(log.contains("kernel ok"));
    assert!(log.contains("Status: PASSED"));
    assert_eq!(aggregator.finalize().rows[0].max_rss_kb, Some(4096));
}

#[tokio::test]
async fn test_vanished_test_file_is_skipped() {
    let root = setup_project();
    let matrix = build_matrix(&["baseline"]).unwrap();
    let plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
    fs::remove_file(bench_dir(root.path()).join("data/TritonBench_G_v1/a_kernel.py")).unwrap();

    let launcher = FakeLauncher::passing();
    let aggregator = Aggregator::new(matrix.labels());
    let stats = engine(launcher.clone(), root.path(), Duration::from_secs(5))
        .run(plan.cells, &aggregator, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.attempted, 0);
    assert!(launcher.launched().is_empty());
    let table = aggregator.finalize();
    assert_eq!(table.len(), 4);
    assert!(table.rows.iter().all(|r| r.status == OutcomeStatus::Skipped));
}

#[tokio::test]
async fn test_whitelist_excluded_tests_never_become_cells() {
    let root = setup_project();
    let functions: Vec<String> = (0..10).map(|i| format!("test_case_{i}")).collect();
    let names: Vec<&str> = functions.iter().map(String::as_str).collect();
    let dir = root.path().join("many");
    write_file(&dir.join("test_many.py"), &pytest_source(&names));

    let matrix = build_matrix(&["baseline"]).unwrap();
    let whitelist = Whitelist::new(["test_many::test_case_3", "test_many::test_case_8"]);
    let discovery = Discovery::new(Repository::FlagGems, dir, Some(whitelist));
    let plan = plan_execution(&matrix, &[discovery], &root.path().join("out"));

    assert_eq!(plan.cells.len(), 2 * matrix.len());
    assert_eq!(plan.excluded(), 8);
    for config in matrix.columns() {
        let per_config = plan
            .cells
            .iter()
            .filter(|cell| cell.config.label() == config.label())
            .count();
        assert_eq!(per_config, 2);
    }
}

#[cfg(unix)]
mod real_process {
    use super::*;
    use kernel_matrix_runner::infra::command::SubprocessLauncher;

    fn sh_engine(root: &Path, timeout: Duration) -> Engine<SubprocessLauncher> {
        // The profiler wrapper just runs the test file it is given.
        write_file(&root.join("tritonbench_profiler_wrapper.py"), "exec sh \"$1\"\n");
        Engine::new(
            SubprocessLauncher,
            BaseEnvironment::capture().with_project_root(root),
            root.to_path_buf(),
            timeout,
        )
        .with_suite(
            Repository::Tritonbench,
            SuiteCommand {
                command: vec!["sh".to_string()],
                test_dir: bench_dir(root),
            },
        )
    }

    fn is_gone(pid: i32) -> bool {
        // SAFETY: signal 0 only checks for existence.
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if !alive {
            return true;
        }
        // A zombie awaiting its reaper is gone for our purposes.
        fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| stat.rsplit_once(')').map(|(_, rest)| rest.trim_start().starts_with('Z')).unwrap_or(false))
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_real_process_output_and_metric() {
        let root = setup_project();
        write_file(
            &bench_dir(root.path()).join("data/TritonBench_G_v1/a_kernel.py"),
            "echo \"[triton-profiler] kernel=a cpu_launch_ms=0.01 gpu_time_ms=0.5\"\n\
             echo \"[triton-profiler] kernel=b cpu_launch_ms=0.01 gpu_time_ms=0.25\" >&2\n\
             [ \"$ENABLE_TRITON_PROFILER\" = 1 ] || exit 4\n",
        );
        let matrix = build_matrix(&["kernel_time_tritonbench"]).unwrap();
        let mut plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
        plan.cells.truncate(1);

        let aggregator = Aggregator::new(matrix.labels());
        sh_engine(root.path(), Duration::from_secs(30))
            .run(plan.cells, &aggregator, &CancellationToken::new())
            .await
            .unwrap();

        let row = aggregator.finalize().rows[0].clone();
        assert_eq!(row.status, OutcomeStatus::Succeeded);
        assert_eq!(row.metric, Some(0.75));
    }

    #[tokio::test]
    async fn test_real_timeout_kills_the_process_tree() {
        let root = setup_project();
        let pid_file = root.path().join("child.pid");
        write_file(
            &bench_dir(root.path()).join("data/TritonBench_G_v1/a_kernel.py"),
            &format!(
                "sleep 30 &\necho $! > '{}'\nsleep 30\n",
                pid_file.display()
            ),
        );
        let matrix = build_matrix(&["kernel_time_tritonbench"]).unwrap();
        let mut plan = bench_plan(root.path(), &matrix, &["a_kernel"]);
        plan.cells.truncate(1);

        let aggregator = Aggregator::new(matrix.labels());
        sh_engine(root.path(), Duration::from_secs(1))
            .run(plan.cells, &aggregator, &CancellationToken::new())
            .await
            .unwrap();

        let row = aggregator.finalize().rows[0].clone();
        assert_eq!(row.status, OutcomeStatus::TimedOut);
        assert!(row.duration_secs < 10.0);

        let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let mut gone = false;
        for _ in 0..50 {
            if is_gone(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone, "background child {pid} survived the timeout");
    }
}

// Integration tests for the `irsmith` binary.
//
// Exit codes, feature toggles, artifact files and the `--check` round trip.
// Each test writes into its own directory under the system temp dir.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn irsmith_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_irsmith"))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("irsmith-cli-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn run(args: &[&str]) -> Output {
    Command::new(irsmith_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run irsmith")
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    let mut all = vec!["--output-dir", dir.to_str().unwrap()];
    all.extend_from_slice(args);
    run(&all)
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── Exit codes ──────────────────────────────────────────────────────────────

#[test]
fn help_exits_zero() {
    let out = run(&["--help"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("--cfg-size"));
    assert!(text.contains("--func-maxcalls"));
}

#[test]
fn unknown_flag_exits_one() {
    let out = run(&["--frobnicate"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn non_numeric_argument_exits_one() {
    let out = run(&["--nfuncs", "many"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn zero_functions_exits_one() {
    let dir = scratch_dir("zero-funcs");
    let out = run_in(&dir, &["--seed", "1", "--nfuncs", "0"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("irsmith: error: --nfuncs must be at least 1"));
    assert!(!dir.join("main.ir").exists());
}

#[test]
fn zero_block_size_exits_one() {
    let dir = scratch_dir("zero-cfb");
    let out = run_in(&dir, &["--seed", "1", "--cfb-size", "0"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn oversized_cfg_is_clamped_with_warning() {
    let dir = scratch_dir("clamp");
    let out = run_in(
        &dir,
        &["--seed", "3", "--cfg-size", "5000", "--cfb-size", "1", "-fno-memory", "-fno-func-calls"],
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("clamping"));
}

// ── Output files ────────────────────────────────────────────────────────────

#[test]
fn writes_ir_named_after_strid() {
    let dir = scratch_dir("strid");
    let out = run_in(&dir, &["--seed", "9", "--strid", "prog9"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = std::fs::read_to_string(dir.join("prog9.ir")).unwrap();
    assert!(text.starts_with("irsmith-ir 1\nseed 9\n"));
    assert!(text.contains("func _main (Is) -> (Is) {"));
}

#[test]
fn emit_writes_every_artifact() {
    let dir = scratch_dir("emit");
    let out = run_in(
        &dir,
        &[
            "--seed", "4", "--nfuncs", "2",
            "--emit", "cfg-dot,ir-dot",
            "--emit", "build-info",
            "--emit", "stats",
        ],
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    for name in ["main.ir", "main.cfg.dot", "main.ir.dot", "main.build-info.json", "main.stats.json"] {
        assert!(dir.join(name).exists(), "{name} missing");
    }
    let info = std::fs::read_to_string(dir.join("main.build-info.json")).unwrap();
    assert!(info.contains("\"ir_sha256\""));
    let stats = std::fs::read_to_string(dir.join("main.stats.json")).unwrap();
    assert!(stats.contains("\"functions\""));
}

#[test]
fn stats_flag_prints_table() {
    let dir = scratch_dir("stats");
    let out = run_in(&dir, &["--seed", "2", "-fstats"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.starts_with("seed 2\n"));
    assert!(text.contains("_main"));

    let out = run_in(&dir, &["--seed", "2", "-fstats", "-fno-stats"]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn unwritable_output_dir_exits_one() {
    let dir = scratch_dir("unwritable");
    let blocker = dir.join("file");
    std::fs::write(&blocker, "not a directory").unwrap();
    let out = run(&["--seed", "1", "--output-dir", blocker.join("sub").to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).starts_with("irsmith: error:"));
}

// ── Feature toggles ─────────────────────────────────────────────────────────

#[test]
fn no_memory_means_no_memory_operations() {
    let dir = scratch_dir("no-memory");
    let out = run_in(&dir, &["--seed", "12", "--cfg-size", "8", "-fno-memory"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = std::fs::read_to_string(dir.join("main.ir")).unwrap();
    for op in [" = Load ", " = Store ", " = Alloc["] {
        assert!(!text.contains(op), "{op} present with memory disabled");
    }
}

#[test]
fn zero_max_calls_means_no_calls() {
    let dir = scratch_dir("no-calls");
    let out = run_in(&dir, &["--seed", "31", "--nfuncs", "4", "--func-maxcalls", "0"]);
    assert!(out.status.success());
    let text = std::fs::read_to_string(dir.join("main.ir")).unwrap();
    assert!(!text.contains(" = Call["));
}

// ── Concrete scenario ───────────────────────────────────────────────────────

#[test]
fn seed_42_two_functions_without_cycles() {
    let dir = scratch_dir("seed42");
    let out = run_in(
        &dir,
        &[
            "--seed", "42", "--nfuncs", "2", "--cfg-size", "5", "--cfb-size", "8",
            "--func-maxcalls", "1", "-fno-func-cycles",
        ],
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = std::fs::read_to_string(dir.join("main.ir")).unwrap();

    let funcs: Vec<&str> = text.lines().filter(|l| l.starts_with("func ")).collect();
    assert_eq!(funcs.len(), 2);
    assert!(funcs[1].starts_with("func r_func_1 "));

    let bodies: Vec<&str> = text.split("\nfunc ").skip(1).collect();
    let entry_calls = bodies[0].matches(" = Call[r_func_1]").count();
    assert!(entry_calls <= 1);
    assert_eq!(bodies[1].matches(" = Call[").count(), 0);
    assert!(!text.contains(" = Dummy "));

    let check = run(&["--check", dir.join("main.ir").to_str().unwrap()]);
    assert!(check.status.success(), "stderr: {}", stderr(&check));
}

// ── Read back ───────────────────────────────────────────────────────────────

#[test]
fn check_round_trip() {
    let dir = scratch_dir("check");
    let out = run_in(&dir, &["--seed", "77", "--nfuncs", "3", "--cfg-size", "10"]);
    assert!(out.status.success());
    let path = dir.join("main.ir");
    let check = run(&["--check", path.to_str().unwrap()]);
    assert!(check.status.success(), "stderr: {}", stderr(&check));
    let stdout = String::from_utf8_lossy(&check.stdout);
    assert!(stdout.contains("ok (3 functions, seed 77)"));
}

#[test]
fn check_rejects_corrupted_file() {
    let dir = scratch_dir("corrupt");
    let out = run_in(&dir, &["--seed", "5"]);
    assert!(out.status.success());
    let path = dir.join("main.ir");
    let text = std::fs::read_to_string(&path).unwrap();
    // Drop the result operand of the first return.
    let corrupted = text.replacen("= Return X", "= Return X @%0 (%4) //", 1);
    std::fs::write(&path, corrupted).unwrap();
    let check = run(&["--check", path.to_str().unwrap()]);
    assert_eq!(check.status.code(), Some(1));
}

#[test]
fn check_missing_file_exits_one() {
    let out = run(&["--check", "/nonexistent/irsmith/missing.ir"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("missing.ir"));
}

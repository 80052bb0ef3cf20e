use mextrain_cli::run;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

const ENV_VARS: &[&str] = &[
    "MEXTRAIN_CONFIG",
    "MEXTRAIN_SEED",
    "MEXTRAIN_PLAYERS",
    "MEXTRAIN_GAMES",
    "MEXTRAIN_AI_LEVEL",
    "MEXTRAIN_SIM_BREAK_AFTER",
];

fn clear_env() {
    for var in ENV_VARS {
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) };
}

fn run_capture(args: &[&str]) -> (i32, String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = run(args.iter().copied(), &mut out, &mut err);
    (
        code,
        String::from_utf8(out).expect("utf8 stdout"),
        String::from_utf8(err).expect("utf8 stderr"),
    )
}

#[test]
#[serial]
fn cfg_reports_defaults() {
    clear_env();
    let (code, out, _) = run_capture(&["mextrain", "cfg"]);
    assert_eq!(code, 0);

    let v: serde_json::Value = serde_json::from_str(&out).expect("cfg prints json");
    assert_eq!(v["players"]["value"], 4);
    assert_eq!(v["players"]["source"], "default");
    assert_eq!(v["games"]["value"], 13);
    assert_eq!(v["ai_level"]["value"], 2);
    assert!(v["seed"]["value"].is_null());
}

#[test]
#[serial]
fn env_overrides_file_and_file_overrides_defaults() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("mextrain.toml");
    fs::write(&path, "seed = 11\nplayers = 3\ngames = 5\n").unwrap();
    set_env("MEXTRAIN_CONFIG", path.to_str().unwrap());
    set_env("MEXTRAIN_GAMES", "2");

    let (code, out, _) = run_capture(&["mextrain", "cfg"]);
    clear_env();
    assert_eq!(code, 0);

    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["seed"]["value"], 11);
    assert_eq!(v["seed"]["source"], "file");
    assert_eq!(v["players"]["value"], 3);
    assert_eq!(v["players"]["source"], "file");
    assert_eq!(v["games"]["value"], 2);
    assert_eq!(v["games"]["source"], "env");
    assert_eq!(v["ai_level"]["source"], "default");
}

#[test]
#[serial]
fn invalid_env_values_fail_with_code_2() {
    clear_env();
    set_env("MEXTRAIN_AI_LEVEL", "9");
    let (code, _, err) = run_capture(&["mextrain", "cfg"]);
    clear_env();
    assert_eq!(code, 2);
    assert!(err.contains("ai_level must be between 1 and 5"));

    set_env("MEXTRAIN_SEED", "not-a-number");
    let (code, _, err) = run_capture(&["mextrain", "deal"]);
    clear_env();
    assert_eq!(code, 2);
    assert!(err.contains("Invalid seed"));
}

#[test]
#[serial]
fn deal_uses_configured_players_and_seed() {
    clear_env();
    set_env("MEXTRAIN_SEED", "21");
    set_env("MEXTRAIN_PLAYERS", "5");
    let (code, out, _) = run_capture(&["mextrain", "deal"]);
    let (_, again, _) = run_capture(&["mextrain", "deal", "--seed", "21", "--players", "5"]);
    clear_env();

    assert_eq!(code, 0);
    assert!(out.starts_with("Seed: 21\n"));
    assert!(out.contains("p5 (12): "));
    assert_eq!(out, again);
}

#[test]
#[serial]
fn sim_records_pass_verification() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("runs").join("sim.jsonl");
    let path = path.to_str().unwrap();

    let (code, out, err) = run_capture(&[
        "mextrain", "sim", "--matches", "3", "--players", "3", "--levels", "1,3,5", "--games",
        "2", "--seed", "4", "--output", path,
    ]);
    assert_eq!(code, 0, "stderr: {err}");
    assert!(out.starts_with("Simulated 3 matches: 3 players, 2 games each, seed 4\n"));
    assert!(out.contains("p1 sleepy_caboose (level 1): wins "));
    assert!(out.contains("p3 locomotive_legend (level 5): wins "));

    let contents = fs::read_to_string(path).unwrap();
    assert_eq!(contents.lines().count(), 3);
    let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(first["rounds"].as_array().unwrap().len(), 2);
    assert_eq!(first["meta"]["levels"], serde_json::json!([1, 3, 5]));

    let (code, out, _) = run_capture(&["mextrain", "verify", "--input", path]);
    assert_eq!(code, 0);
    assert_eq!(out, "Verify: OK (3 matches)\n");
}

#[test]
#[serial]
fn compressed_records_round_trip() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("sim.jsonl.zst");
    let path = path.to_str().unwrap();

    for _ in 0..2 {
        let (code, _, err) = run_capture(&[
            "mextrain", "sim", "--matches", "1", "--players", "2", "--games", "1", "--output",
            path,
        ]);
        assert_eq!(code, 0, "stderr: {err}");
    }

    let bytes = fs::read(path).unwrap();
    assert_eq!(&bytes[..4], &[0x28, 0xB5, 0x2F, 0xFD], "zstd frame magic");
    let (code, out, _) = run_capture(&["mextrain", "verify", "--input", path]);
    assert_eq!(code, 0);
    assert_eq!(out, "Verify: OK (2 matches)\n");
}

#[test]
#[serial]
fn tampered_records_fail_verification() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("sim.jsonl");
    let path = path.to_str().unwrap();
    let (code, _, _) = run_capture(&[
        "mextrain", "sim", "--matches", "2", "--players", "2", "--games", "1", "--seed", "8",
        "--output", path,
    ]);
    assert_eq!(code, 0);

    let contents = fs::read_to_string(path).unwrap();
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let mut second: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    let score = second["cumulative_scores"]["p1"].as_u64().unwrap();
    second["cumulative_scores"]["p1"] = serde_json::json!(score + 100);
    lines[1] = second.to_string();
    lines.push("{not json".to_string());
    fs::write(path, lines.join("\n")).unwrap();

    let (code, out, err) = run_capture(&["mextrain", "verify", "--input", path]);
    assert_eq!(code, 2);
    assert!(out.starts_with("Verify: FAIL"));
    assert!(err.contains("Line 2: Cumulative score for p1"));
    assert!(err.contains("Line 3: Invalid match record"));
}

#[test]
#[serial]
fn interrupted_sim_exits_130_with_partial_output() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.jsonl");
    let path = path.to_str().unwrap();
    set_env("MEXTRAIN_SIM_BREAK_AFTER", "2");

    let (code, out, err) = run_capture(&[
        "mextrain", "sim", "--matches", "5", "--players", "2", "--games", "1", "--seed", "3",
        "--output", path,
    ]);
    clear_env();

    assert_eq!(code, 130);
    assert!(out.starts_with("Simulated 2 matches"));
    assert!(err.contains("Interrupted: stopped after 2 of 5 matches"));
    assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 2);
}

#[test]
#[serial]
fn verify_reports_missing_and_empty_files() {
    clear_env();
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.jsonl");
    let (code, _, err) = run_capture(&["mextrain", "verify", "--input", missing.to_str().unwrap()]);
    assert_eq!(code, 2);
    assert!(err.contains("Failed to read"));

    let empty = dir.path().join("empty.jsonl");
    fs::write(&empty, "\n\n").unwrap();
    let (code, _, err) = run_capture(&["mextrain", "verify", "--input", empty.to_str().unwrap()]);
    assert_eq!(code, 2);
    assert!(err.contains("No match records"));
}

#[test]
#[serial]
fn eval_reports_both_levels() {
    clear_env();
    let (code, out, _) = run_capture(&[
        "mextrain", "eval", "--level-a", "1", "--level-b", "5", "--matches", "2", "--games", "1",
        "--seed", "13",
    ]);
    assert_eq!(code, 0);
    assert!(out.starts_with("Eval: sleepy_caboose (A) vs locomotive_legend (B), 2 matches of 1 games, seed 13\n"));
    assert!(out.contains("\nA sleepy_caboose: wins "));
    assert!(out.contains("\nB locomotive_legend: wins "));
}

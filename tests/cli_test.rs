use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet", "kilo", "lima",
    "mike", "november", "oscar", "papa",
];

fn glacier_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_glacier"))
}

fn run(args: &[&str]) -> Output {
    run_in(Path::new("."), args)
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(glacier_exe())
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run glacier")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn text(words: usize, seed: u64) -> String {
    let mut state = seed;
    let mut out = String::new();
    for i in 0..words {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        out.push_str(WORDS[(state >> 33) as usize % WORDS.len()]);
        out.push(if i % 10 == 9 { '\n' } else { ' ' });
    }
    out
}

/// Small chunks so a few kilobytes of text give a useful signature.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("glacier.json");
    fs::write(
        &path,
        r#"{ "hasher": { "chunker": { "min_chunk": 64, "max_chunk": 4096, "window_size": 16, "trigger_bits": 8 } } }"#,
    )
    .unwrap();
    path
}

fn p(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn build_then_scan_reports_full_match() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("corpus");
    fs::create_dir_all(corpus.join("nested")).unwrap();
    for i in 0..8 {
        fs::write(corpus.join(format!("doc{i}.txt")), text(1500, i)).unwrap();
    }
    for i in 8..10 {
        fs::write(corpus.join(format!("nested/doc{i}.txt")), text(1500, i)).unwrap();
    }
    let config = write_config(temp.path());

    let output = run(&["--config", p(&config), "build", p(&corpus)]);
    assert!(output.status.success(), "build failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Files hashed: 10"));
    let db = temp.path().join("corpus.db");
    assert!(db.exists(), "default database name should be <folder>.db");

    let output = run(&[
        "--config",
        p(&config),
        "scan",
        p(&corpus.join("doc3.txt")),
        "--db",
        p(&db),
    ]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("doc3.txt: 100.00%"), "unexpected scan output:\n{out}");

    let output = run(&["--config", p(&config), "scan", p(&corpus), "--db", p(&db)]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Total files: 10"));
    assert!(out.contains("Match rate: 100.00%"), "unexpected scan output:\n{out}");
}

#[test]
fn compare_identical_files() {
    let temp = tempfile::tempdir().unwrap();
    let a = temp.path().join("a.txt");
    let b = temp.path().join("b.txt");
    fs::write(&a, text(800, 3)).unwrap();
    fs::write(&b, text(800, 3).to_uppercase()).unwrap();

    let output = run(&["compare", p(&a), p(&b)]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Similarity: 100.00%"));
}

#[test]
fn consolidate_auto_merges_family() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("samples");
    fs::create_dir_all(&corpus).unwrap();
    let base = text(2000, 11);
    fs::write(corpus.join("family.v1.txt"), &base).unwrap();
    fs::write(corpus.join("family.v2.txt"), format!("{base}oscar papa lima mike\n")).unwrap();
    fs::write(corpus.join("family.v3.txt"), format!("{base}{}", text(120, 12))).unwrap();
    fs::write(corpus.join("stranger.txt"), text(2000, 13)).unwrap();
    let config = write_config(temp.path());
    let db = temp.path().join("samples.db");

    let output = run(&["--config", p(&config), "build", p(&corpus), "--db", p(&db)]);
    assert!(output.status.success());

    let output = run(&[
        "--config",
        p(&config),
        "consolidate",
        "--db",
        p(&db),
        "--threshold",
        "0.7",
        "--auto",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("Masters created: 1"), "unexpected output:\n{out}");
    assert!(out.contains("Signatures merged: 3"));
    assert!(out.contains("Records in database: 2"));

    let output = run(&[
        "--config",
        p(&config),
        "scan",
        p(&corpus.join("family.v2.txt")),
        "--db",
        p(&db),
    ]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("[master]"));
}

#[test]
fn consolidate_skips_records_known_to_existing_masters() {
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path());
    let base = text(2000, 21);

    let known = temp.path().join("known");
    fs::create_dir_all(&known).unwrap();
    fs::write(known.join("family.v1.txt"), &base).unwrap();
    fs::write(known.join("family.v2.txt"), format!("{base}oscar papa lima mike\n")).unwrap();
    let known_db = temp.path().join("known.db");
    assert!(run(&["--config", p(&config), "build", p(&known), "--db", p(&known_db)]).status.success());
    let output = run(&["--config", p(&config), "consolidate", "--db", p(&known_db), "--threshold", "0.7", "--auto"]);
    assert!(stdout(&output).contains("Masters created: 1"));

    let fresh = temp.path().join("fresh");
    fs::create_dir_all(&fresh).unwrap();
    fs::write(fresh.join("family.v3.txt"), format!("{base}{}", text(120, 22))).unwrap();
    fs::write(fresh.join("family.v4.txt"), format!("{base}kilo lima\n")).unwrap();
    fs::write(fresh.join("stranger.txt"), text(2000, 23)).unwrap();
    let fresh_db = temp.path().join("fresh.db");
    assert!(run(&["--config", p(&config), "build", p(&fresh), "--db", p(&fresh_db)]).status.success());

    let output = run(&[
        "--config",
        p(&config),
        "consolidate",
        "--db",
        p(&fresh_db),
        "--threshold",
        "0.7",
        "--auto",
        "--exist",
        p(&known_db),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("Signatures ignored (matched existing master): 2"), "unexpected output:\n{out}");
    assert!(out.contains("Masters created: 0"));
    assert!(out.contains("Records in database: 3"));
}

#[test]
fn build_of_current_dir_is_named_after_it() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("reports");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("one.txt"), text(300, 1)).unwrap();

    let output = run_in(&corpus, &["build", "."]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(temp.path().join("reports.db").exists());
    assert!(!corpus.join("..db").exists());
    assert!(!temp.path().join("..db").exists());
}

#[test]
fn missing_input_exits_non_zero() {
    let output = run(&["hash", "/definitely/not/a/file.bin"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("/definitely/not/a/file.bin"));
}

#[test]
fn invalid_threshold_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let db = temp.path().join("empty.db");
    let output = run(&["consolidate", "--db", p(&db), "--threshold", "1.5", "--auto"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("threshold"));
}

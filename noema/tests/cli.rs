// Copyright 2024 The Noema Authors

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! End-to-end tests: the built binary against temporary theory files.

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

const ZOO: &str = "IS_A Dog mammal\n\
                   IS_A mammal animal\n\
                   IS_A Fido Dog\n\
                   HAS Dog fur\n";

fn theory_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp theory");
    file.write_all(content.as_bytes()).expect("write theory");
    file
}

fn noema(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_noema"))
        .args(args)
        .output()
        .expect("run noema")
}

#[test]
fn prove_valid_goal_exits_zero() {
    let file = theory_file(ZOO);
    let out = noema(&["prove", file.path().to_str().unwrap(), "IS_A Dog animal"]);
    assert!(out.status.success(), "{:?}", out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("valid"), "{}", stdout);
    assert!(stdout.contains("transitivity"), "{}", stdout);
}

#[test]
fn prove_underivable_goal_exits_two() {
    let file = theory_file(ZOO);
    let out = noema(&["prove", file.path().to_str().unwrap(), "IS_A Dog reptile"]);
    assert_eq!(out.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("no_proof_found"), "{}", stdout);
}

#[test]
fn prove_json_is_machine_readable() {
    let file = theory_file(ZOO);
    let out = noema(&[
        "prove",
        file.path().to_str().unwrap(),
        "IS_A Dog animal",
        "--json",
    ]);
    assert!(out.status.success(), "{:?}", out);
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(value["valid"], true);
    assert_eq!(value["method"], "transitivity");
    assert_eq!(value["proofObject"]["validatorOk"], true);
    assert_eq!(value["stepCount"], 3);
}

#[test]
fn query_lists_bindings() {
    let file = theory_file(ZOO);
    let out = noema(&[
        "query",
        file.path().to_str().unwrap(),
        "? IS_A Dog",
        "--json",
    ]);
    assert!(out.status.success(), "{:?}", out);
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(value["success"], true);
    assert_eq!(value["allResults"][0]["bindings"]["?x"]["answer"], "Fido");
    // both answer surfaces are populated identically
    assert_eq!(value["matches"], value["allResults"]);
}

#[test]
fn query_without_answers_exits_two() {
    let file = theory_file(ZOO);
    let out = noema(&["query", file.path().to_str().unwrap(), "? IS_A reptile"]);
    assert_eq!(out.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("no answers"), "{}", stdout);
}

#[test]
fn check_reports_counts() {
    let file = theory_file(ZOO);
    let out = noema(&["check", file.path().to_str().unwrap()]);
    assert!(out.status.success(), "{:?}", out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("4 facts"), "{}", stdout);
}

#[test]
fn check_renders_parse_errors() {
    let broken = theory_file("IS_A Dog animal\nIS_A Dog\n");
    let out = noema(&["check", broken.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("at least two arguments"), "{}", stderr);
}

#[test]
fn missing_file_is_an_error() {
    let out = noema(&["check", "/no/such/theory.nm"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Error reading"), "{}", stderr);
}

#[test]
fn closed_world_flag_flips_negation() {
    let file = theory_file(ZOO);
    let path = file.path().to_str().unwrap();
    let open = noema(&["prove", path, "Not(IS_A Dog reptile)"]);
    assert_eq!(open.status.code(), Some(2));

    let closed = noema(&["prove", path, "Not(IS_A Dog reptile)", "--closed-world"]);
    assert!(closed.status.success(), "{:?}", closed);
}

#[test]
fn strategy_flag_selects_strategy() {
    let file = theory_file(ZOO);
    let path = file.path().to_str().unwrap();
    let out = noema(&[
        "prove",
        path,
        "IS_A Dog animal",
        "--strategy",
        "metric-affine",
        "--holographic",
    ]);
    assert!(out.status.success(), "{:?}", out);

    let out = noema(&["prove", path, "IS_A Dog animal", "--strategy", "no-such"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown hdc strategy"), "{}", stderr);
}

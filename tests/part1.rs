use assert_cmd::Command;
use predicates::prelude::predicate::str;

#[test]
fn part1_output_right_answer() {
    let mut cmd = Command::cargo_bin("part1").unwrap();
    cmd.arg("inputs/example1.txt");

    cmd.assert()
        .success()
        .stdout(str::contains("4,6,3,5,6,3,5,2,1,0"));
}

#[test]
fn part1_runs_second_example() {
    let mut cmd = Command::cargo_bin("part1").unwrap();
    cmd.arg("inputs/example2.txt");

    cmd.assert().success().stdout(str::contains("outputs 5,7,3,0."));
}

#[test]
fn part1_fails_on_missing_file() {
    let mut cmd = Command::cargo_bin("part1").unwrap();
    cmd.arg("inputs/missing.txt");

    cmd.assert().failure().stderr(str::contains("inputs/missing.txt"));
}

use assert_cmd::Command;
use predicates::prelude::predicate::str;

#[test]
fn part2_output_right_answer() {
    let mut cmd = Command::cargo_bin("part2").unwrap();
    cmd.arg("inputs/example2.txt")
        .arg("--digits")
        .arg("6")
        .arg("--generations")
        .arg("50");

    cmd.assert().success().stdout(str::contains("117440"));
}

#[test]
fn part2_rejects_empty_population() {
    let mut cmd = Command::cargo_bin("part2").unwrap();
    cmd.arg("inputs/example2.txt").arg("--population").arg("0");

    cmd.assert().failure().stderr(str::contains("population"));
}

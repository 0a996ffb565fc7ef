mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_malformed_rows_are_skipped() {
    let csv = common::postings_csv(&[
        ["initial_setup", "1", "0.00", ""],
        // Unknown kind
        ["lottery_win", "1", "5.00", "Jackpot"],
        // Deposit without an amount
        ["admin_deposit", "1", "", "Missing"],
        // Valid deposit
        ["admin_deposit", "1", "3.00", "Bonus"],
    ])
    .unwrap();

    Command::new(cargo_bin!("gdc-ledger"))
        .arg("post")
        .arg(csv.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("posting rejected"))
        .stdout(predicate::str::contains("1,1,3.00,GDC,false"));
}

#[test]
fn test_invalid_data_types() {
    let csv = common::postings_csv(&[
        ["initial_setup", "1", "", ""],
        // Text in amount field
        ["admin_deposit", "1", "not_a_number", "x"],
        // Non-integer user id
        ["admin_deposit", "abc", "1.00", "x"],
        // Sub-cent precision
        ["admin_deposit", "1", "1.005", "x"],
        // Valid deposit
        ["admin_deposit", "1", "5.00", "x"],
    ])
    .unwrap();

    Command::new(cargo_bin!("gdc-ledger"))
        .arg("post")
        .arg(csv.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("posting rejected"))
        .stdout(predicate::str::contains("1,1,105.00,GDC,false"));
}

#[test]
fn test_rejected_postings_leave_balances_untouched() {
    let csv = common::postings_csv(&[
        ["initial_setup", "1", "50.00", ""],
        // Overdraft through a funds-checked debit
        ["ticket_payment", "1", "-50.01", "Too much"],
        // Debit kind with a credit amount
        ["admin_withdrawal", "1", "10.00", "Wrong sign"],
        // Second account for the same user
        ["initial_setup", "1", "10.00", ""],
    ])
    .unwrap();

    Command::new(cargo_bin!("gdc-ledger"))
        .arg("post")
        .arg(csv.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("insufficient funds"))
        .stderr(predicate::str::contains("already has a bank account"))
        .stdout(predicate::str::contains("1,1,50.00,GDC,false"));
}

#[test]
fn test_missing_input_file_fails() {
    Command::new(cargo_bin!("gdc-ledger"))
        .arg("post")
        .arg("does/not/exist.csv")
        .assert()
        .failure();
}

#[test]
fn test_invalid_config_fails() {
    let config = common::config_file(r#"{ "starting_balance": "-5.00" }"#).unwrap();
    Command::new(cargo_bin!("gdc-ledger"))
        .arg("--config")
        .arg(config.path())
        .arg("reconcile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_config_changes_starting_balance() {
    let config = common::config_file(r#"{ "starting_balance": "250.00" }"#).unwrap();
    let csv = common::postings_csv(&[["initial_setup", "9", "", ""]]).unwrap();

    Command::new(cargo_bin!("gdc-ledger"))
        .arg("--config")
        .arg(config.path())
        .arg("post")
        .arg(csv.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1,9,250.00,GDC,false"));
}

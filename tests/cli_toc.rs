use std::fs;

use predicates::prelude::*;

const SAMPLE_BOOK: &str = r##"<html>
  <head><title>A Sample Book</title></head>
  <body>
    <p><a href="#link2HCH0001">I. The Beginning</a></p>
    <h2><a id="link2HCH0001"></a>CHAPTER I</h2>
    <p>Call me a sample.</p>
    <h2 id="epilogue">Epilogue</h2>
  </body>
</html>
"##;

#[test]
fn toc_prints_indented_outline() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = dir.path().join("book.html");
    fs::write(&input, SAMPLE_BOOK).expect("write sample book");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookgate");
    cmd.args(["toc", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("I. The Beginning [#link2HCH0001]"))
        .stdout(predicate::str::contains("Epilogue [#epilogue]"));
}

#[test]
fn toc_json_emits_parseable_nodes() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = dir.path().join("book.html");
    fs::write(&input, SAMPLE_BOOK).expect("write sample book");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookgate");
    let output = cmd
        .args(["toc", "--json", "--input"])
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let nodes: serde_json::Value =
        serde_json::from_slice(&output).expect("parse toc json output");
    assert_eq!(nodes[0]["id"], "link2HCH0001");
    assert_eq!(nodes[0]["title"], "I. The Beginning");
    assert_eq!(nodes[0]["level"], 2);
}

#[test]
fn toc_without_chapters_degrades_gracefully() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = dir.path().join("plain.html");
    fs::write(&input, "<html><body><p>No structure here.</p></body></html>")
        .expect("write sample file");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookgate");
    cmd.args(["toc", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout("no chapters found\n");
}

#[test]
fn missing_input_file_fails_with_context() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookgate");
    cmd.args(["toc", "--input", "does-not-exist.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read html"));
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let input = dir.path().join("book.html");
    fs::write(&input, SAMPLE_BOOK).expect("write sample book");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookgate");
    cmd.env("RUST_LOG", "debug")
        .args(["toc", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}

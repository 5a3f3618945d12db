use assert_cmd::Command;
use predicates::prelude::*;
use quire::test_utils::ProjectFixture;

fn quire(project: &ProjectFixture) -> Command {
    let mut cmd = Command::cargo_bin("quire").unwrap();
    cmd.current_dir(project.root()).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_sources_lists_files_in_reading_order() {
    let project = ProjectFixture::new().unwrap();
    project.write("part2/b.md", "# B").unwrap();
    project.write("a.org", "* A").unwrap();
    project.write("notes.txt", "ignored").unwrap();

    let output = quire(&project).arg("sources").assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(output).unwrap();

    let a = stdout.find("a.org").unwrap();
    let b = stdout.find("part2/b.md").unwrap();
    assert!(a < b);
    assert!(stdout.contains("[orgmode]"));
    assert!(stdout.contains("[markdown]"));
    assert!(!stdout.contains("notes.txt"));
}

#[test]
fn test_sources_with_empty_project() {
    let project = ProjectFixture::new().unwrap();
    quire(&project).arg("sources").assert().success().stdout(predicate::str::contains("No sources found"));
}

#[test]
fn test_project_dir_flag() {
    let project = ProjectFixture::new().unwrap();
    project.write("book/intro.md", "# Intro").unwrap();

    quire(&project)
        .args(["--project-dir", "book", "sources"])
        .assert()
        .success()
        .stdout(predicate::str::contains("intro.md"))
        .stdout(predicate::str::contains("book/intro.md").not());
}

#[test]
fn test_templates_prefers_user_templates() {
    let project = ProjectFixture::new().unwrap();
    project.write("templates/site/index.html.tera", "<p>{{ book_title }}</p>").unwrap();

    quire(&project)
        .arg("templates")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"site/index\.html\s+user").unwrap())
        .stdout(predicate::str::is_match(r"site/style\.css\s+system").unwrap())
        .stdout(predicate::str::contains("_fascicle").not());
}

#[test]
fn test_templates_with_partials() {
    let project = ProjectFixture::new().unwrap();
    quire(&project)
        .args(["templates", "--partials"])
        .assert()
        .success()
        .stdout(predicate::str::contains("site/_fascicle.html"));
}

#[test]
fn test_clean_removes_build_dir() {
    let project = ProjectFixture::new().unwrap();
    project.write("build/exports/a.html", "<p/>").unwrap();

    quire(&project).arg("clean").assert().success().stdout(predicate::str::contains("Removed build"));
    assert!(!project.exists("build"));

    quire(&project).arg("clean").assert().success().stdout(predicate::str::contains("Nothing to clean"));
}

#[test]
fn test_build_unknown_target_fails() {
    let project = ProjectFixture::new().unwrap();

    quire(&project)
        .args(["build", "nosuch.txt"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nosuch.txt"))
        .stderr(predicate::str::contains("suggestion"));
}

#[test]
fn test_invalid_config_is_reported() {
    let project = ProjectFixture::new().unwrap();
    project.write("quire.toml", "title = [unclosed").unwrap();

    quire(&project).arg("sources").assert().failure().stderr(predicate::str::contains("quire.toml"));
}

#[test]
fn test_zero_jobs_in_config_is_rejected() {
    let project = ProjectFixture::new().unwrap();
    project.write("quire.toml", "jobs = 0\n").unwrap();

    quire(&project)
        .arg("sources")
        .assert()
        .failure()
        .stderr(predicate::str::contains("jobs must be at least 1"));
}

#[test]
fn test_sources_json() {
    let project = ProjectFixture::new().unwrap();
    project.write("ch1.md", "# One").unwrap();

    let output = quire(&project).args(["sources", "--json"]).assert().success().get_output().stdout.clone();
    let entries: serde_json::Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(
        entries,
        serde_json::json!([{
            "path": "ch1.md",
            "format": "markdown",
            "export": "build/exports/ch1.html",
            "signature": "build/signatures/ch1.xhtml",
        }])
    );
}

use std::fs;
use std::path::Path;

use semimerge_core::printer::write_scenario;
use semimerge_core::statistics::STATISTICS_FILE;
use semimerge_core::{Manifest, ManifestError, ScenarioRunner, Settings, Statistics};
use semimerge_engine::{CancelToken, ConflictLocation, MergeStrategy};

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const FOO_BASE: &str = "class Foo {\n    int f() { return 1; }\n\n    int g() { return 1; }\n}\n";
const FOO_LEFT: &str = "class Foo {\n    int f() { return 2; }\n\n    int g() { return 1; }\n}\n";
const FOO_RIGHT: &str = "class Foo {\n    int f() { return 1; }\n\n    int g() { return 3; }\n}\n";

fn scenario_dir(root: &Path) -> std::path::PathBuf {
    let dir = root.join("scenario");
    write(&dir.join("rev_base/src/Foo.java"), FOO_BASE);
    write(&dir.join("rev_left/src/Foo.java"), FOO_LEFT);
    write(&dir.join("rev_right/src/Foo.java"), FOO_RIGHT);

    write(&dir.join("rev_base/src/Bar.java"), "class Bar {\n    int x = 1;\n}\n");
    write(&dir.join("rev_left/src/Bar.java"), "class Bar {\n    int x = 2;\n}\n");
    write(&dir.join("rev_right/src/Bar.java"), "class Bar {\n    int x = 3;\n}\n");

    write(&dir.join("rev_left/notes.txt"), "only left\n");

    write(&dir.join("rev_base/Old.java"), "class Old {}\n");
    write(&dir.join("rev_right/Old.java"), "class Old {}\n");

    write(&dir.join("rev.revisions"), "rev_left\nrev_base\nrev_right\n");
    dir
}

#[tokio::test]
async fn test_manifest_scenario_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = scenario_dir(tmp.path());

    let manifest = Manifest::load(&dir.join("rev.revisions")).unwrap();
    let runner = ScenarioRunner::new(&Settings::default(), CancelToken::new());
    let scenario = runner.run_manifest(&manifest).await.unwrap();

    let relative: Vec<_> = scenario
        .triples
        .iter()
        .map(|t| t.relative.to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(relative, vec!["Old.java", "notes.txt", "src/Bar.java", "src/Foo.java"]);

    // deleted on one side, untouched on the other
    let old = scenario.triples[0].result.as_ref().unwrap();
    assert_eq!(old.output, None);

    // present in one revision only: two intentional absences
    let notes = &scenario.triples[1];
    assert_eq!(notes.paths.present_count(), 1);
    assert_eq!(notes.result.as_ref().unwrap().output.as_deref(), Some("only left\n"));

    let bar = scenario.triples[2].result.as_ref().unwrap();
    assert_eq!(bar.strategy, MergeStrategy::Structural);
    assert_eq!(bar.conflicts.len(), 1);
    assert_eq!(
        bar.conflicts[0].location,
        ConflictLocation::Node {
            path: "Bar.x".into()
        }
    );

    let foo = scenario.triples[3].result.as_ref().unwrap();
    assert_eq!(foo.strategy, MergeStrategy::Structural);
    assert!(foo.conflicts.is_empty());
    assert_eq!(
        foo.output.as_deref(),
        Some("class Foo {\n    int f() { return 2; }\n\n    int g() { return 3; }\n}\n")
    );

    let out_dir = scenario.output_dir().unwrap();
    assert_eq!(out_dir, dir.join("rev_merged"));
    let written = write_scenario(&scenario, &out_dir).unwrap();
    assert_eq!(written, 3);
    assert!(!out_dir.join("Old.java").exists());
    assert_eq!(
        fs::read_to_string(out_dir.join("src/Foo.java")).unwrap(),
        "class Foo {\n    int f() { return 2; }\n\n    int g() { return 3; }\n}\n"
    );
    assert!(fs::read_to_string(out_dir.join("src/Bar.java"))
        .unwrap()
        .contains("<<<<<<< LEFT"));

    let stats = Statistics::from_scenario(&scenario);
    assert_eq!(stats.files, 4);
    assert_eq!(stats.structural, 2);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(stats.conflicts, 1);
    let stats_path = tmp.path().join("data").join(STATISTICS_FILE);
    stats.append_to(&stats_path).unwrap();
    assert_eq!(Statistics::read_all(&stats_path).unwrap().len(), 1);
}

#[tokio::test]
async fn test_identical_directories_merge_to_themselves() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    for side in ["l", "b", "r"] {
        write(&dir.join(side).join("Foo.java"), FOO_BASE);
    }

    let runner = ScenarioRunner::new(&Settings::default(), CancelToken::new());
    let scenario = runner
        .run_dirs(semimerge_engine::Revisions::new(dir.join("l"), dir.join("b"), dir.join("r")))
        .await
        .unwrap();
    let result = scenario.triples[0].result.as_ref().unwrap();
    assert_eq!(result.output.as_deref(), Some(FOO_BASE));
    assert_eq!(scenario.conflicts(), 0);
}

#[test]
fn test_malformed_manifest_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.revisions");
    fs::write(&path, "rev_left\nrev_base\n").unwrap();
    assert!(matches!(
        Manifest::load(&path),
        Err(ManifestError::LineCount(2))
    ));
}

use quire::core::{QuireError, Target};
use quire::graph::Outcome;
use quire::pipeline::{XIncludeProcessor, XIncludeResolver};
use quire::test_utils::{ProjectFixture, init_test_logging};

const CH1: &str = "# Chapter One\n\nIntro text\n\n```ruby\nputs \"hi\"\n```\n";
const CH2: &str = "# Chapter Two\n\nNo code here\n";
const CH3: &str = "# Chapter Three\n\nSame code again\n\n```ruby\n    puts \"hi\"\n```\n";

fn book() -> ProjectFixture {
    init_test_logging(None);
    let project = ProjectFixture::new().unwrap();
    project.write("ch1.md", CH1).unwrap();
    project.write("ch2.md", CH2).unwrap();
    project.write("ch3.md", CH3).unwrap();
    project
}

fn listing_files(project: &ProjectFixture) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(project.path("build/listings"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_fascicles_from_three_chapters() {
    let project = book();
    let build = project.stub_pipeline().unwrap();

    build.pipeline.build(&[Target::phony("fascicles")]).await.unwrap();

    assert_eq!(build.exporter.calls(), 3);
    // ch1 and ch3 share one listing once indentation is normalized
    let listings = listing_files(&project);
    assert_eq!(listings.len(), 1);
    assert!(listings[0].ends_with(".rb"));
    assert_eq!(build.highlighter.calls(), 1);

    // both placeholders point at the one shared listing and highlight
    let digest = listings[0].trim_end_matches(".rb");
    let skeleton = project.read("build/skeleton.xhtml").unwrap();
    assert_eq!(skeleton.matches(&format!("data-digest=\"{digest}\"")).count(), 2);
    assert_eq!(skeleton.matches(&format!("href=\"highlights/{digest}.html\"")).count(), 2);
    assert!(project.exists(format!("build/highlights/{digest}.html")));

    let master = project.read("build/master/master.xhtml").unwrap();
    assert_eq!(master.matches("class=\"highlight\"").count(), 2);
    assert!(!master.contains("[Missing code listing"));
    assert!(!master.contains("xi:include"));

    assert_eq!(
        project.read("build/fascicle-manifest.txt").unwrap(),
        "build/fascicles/001-ch1.xhtml\nbuild/fascicles/002-ch2.xhtml\nbuild/fascicles/003-ch3.xhtml\n"
    );
    let second = project.read("build/fascicles/002-ch2.xhtml").unwrap();
    assert!(second.contains("<title>Chapter Two</title>"));
    assert!(second.contains("No code here"));
    assert!(!second.contains("Chapter One"));
}

#[tokio::test]
async fn test_codex_renumbers_signatures() {
    let project = book();
    let build = project.stub_pipeline().unwrap();

    build.pipeline.build(&[Target::phony("codex")]).await.unwrap();

    let codex = project.read("build/codex.xhtml").unwrap();
    for n in 1..=3 {
        assert!(codex.contains(&format!("id=\"signature-{n}\"")), "signature {n} not numbered");
    }
    assert!(codex.contains("data-toplevel-type=\"chapter\""));
    assert!(codex.contains("data-signature-title=\"Chapter Three\""));
    assert_eq!(build.highlighter.calls(), 0);
}

#[tokio::test]
async fn test_second_build_is_a_no_op() {
    let project = book();
    let build = project.stub_pipeline().unwrap();
    build.pipeline.build(&[Target::phony("fascicles")]).await.unwrap();
    let skeleton = project.read("build/skeleton.xhtml").unwrap();
    let manifest = project.read("build/fascicle-manifest.txt").unwrap();

    let report = build.pipeline.build(&[Target::phony("fascicles")]).await.unwrap();

    assert_eq!(build.exporter.calls(), 3);
    assert_eq!(build.highlighter.calls(), 1);
    let config = build.pipeline.config();
    assert_eq!(report.outcome(&Target::file(config.skeleton_path())), Some(Outcome::UpToDate));
    assert_eq!(report.outcome(&Target::file(config.fascicle_manifest())), Some(Outcome::UpToDate));
    assert!(report.built().all(Target::is_phony));
    assert_eq!(project.read("build/skeleton.xhtml").unwrap(), skeleton);
    assert_eq!(project.read("build/fascicle-manifest.txt").unwrap(), manifest);
}

#[tokio::test]
async fn test_editing_one_source_rebuilds_only_its_export() {
    let project = book();
    let build = project.stub_pipeline().unwrap();
    build.pipeline.build(&[Target::phony("fascicles")]).await.unwrap();

    project.backdate(60).unwrap();
    project.write("ch2.md", "# Chapter Two\n\nRevised text\n").unwrap();
    let report = build.pipeline.build(&[Target::phony("fascicles")]).await.unwrap();

    assert_eq!(build.exporter.calls(), 4);
    assert_eq!(build.highlighter.calls(), 1);
    let registry = build.pipeline.registry();
    let ch1 = &registry.files()[0];
    let ch2 = &registry.files()[1];
    assert_eq!(report.outcome(&Target::file(registry.export_path(ch1))), Some(Outcome::UpToDate));
    assert_eq!(report.outcome(&Target::file(registry.export_path(ch2))), Some(Outcome::Built));
    assert!(project.read("build/fascicles/002-ch2.xhtml").unwrap().contains("Revised text"));
}

#[tokio::test]
async fn test_overlapping_requests_export_each_source_once() {
    let project = book();
    let build = project.stub_pipeline().unwrap();

    build
        .pipeline
        .build(&[
            Target::phony("export"),
            Target::phony("signatures"),
            Target::phony("master"),
            Target::phony("fascicles"),
        ])
        .await
        .unwrap();

    assert_eq!(build.exporter.calls(), 3);
    assert_eq!(build.highlighter.calls(), 1);
}

#[tokio::test]
async fn test_missing_source_target() {
    let project = book();
    let build = project.stub_pipeline().unwrap();

    let err = build.pipeline.build(&[Target::file(project.path("appendix.md"))]).await.unwrap_err();

    match err.downcast_ref::<QuireError>() {
        Some(QuireError::MissingSource { target }) => assert!(target.ends_with("appendix.md")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_export_failure_stops_downstream() {
    let project = book();
    project.write("ch2.md", "# Chapter Two\n\n!fail\n").unwrap();
    let build = project.stub_pipeline().unwrap();

    let err = build.pipeline.build(&[Target::phony("fascicles")]).await.unwrap_err();

    assert!(format!("{err:#}").contains("stub exporter asked to fail"));
    assert!(!project.exists("build/spine.xhtml"));
    assert!(!project.exists("build/fascicle-manifest.txt"));
}

#[tokio::test]
async fn test_ambiguous_listing_language_names_the_source() {
    let project = book();
    project.write("ch3.md", "# Chapter Three\n\n```ruby python\nputs 1\n```\n").unwrap();
    let build = project.stub_pipeline().unwrap();

    let err = build.pipeline.build(&[Target::phony("skeleton")]).await.unwrap_err();

    match err.downcast_ref::<QuireError>() {
        Some(QuireError::AmbiguousLanguage { source_path, .. }) => assert_eq!(source_path, "ch3.md"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_spine_falls_back_for_missing_signature() {
    let project = book();
    let build = project.stub_pipeline().unwrap();
    build.pipeline.build(&[Target::phony("spine")]).await.unwrap();

    std::fs::remove_file(project.path("build/signatures/ch2.xhtml")).unwrap();
    let out = project.path("build/flattened.xhtml");
    XIncludeResolver.flatten(&project.path("build/spine.xhtml"), &out).unwrap();

    let flattened = std::fs::read_to_string(out).unwrap();
    assert!(flattened.contains("[Missing section: build/signatures/ch2.xhtml]"));
    assert!(flattened.contains("Chapter One"));
    assert!(flattened.contains("Chapter Three"));
}

#[tokio::test]
async fn test_spine_metadata_from_config() {
    let project = book();
    project
        .write(
            "quire.toml",
            "title = \"Confident Code\"\nauthors = [\"Avdi Grimm\"]\nlanguage = \"en-US\"\nstylesheets = [\"styles/book.css\"]\n",
        )
        .unwrap();
    let build = project.stub_pipeline().unwrap();
    build.pipeline.build(&[Target::phony("spine")]).await.unwrap();

    let spine = project.read("build/spine.xhtml").unwrap();
    assert!(spine.contains("<title>Confident Code</title>"));
    assert!(spine.contains(r#"<meta name="DC.creator" content="Avdi Grimm"/>"#));
    assert!(spine.contains(r#"<meta name="DC.language" content="en-US"/>"#));
    assert!(spine.contains(r#"href="../styles/book.css""#));
    let ch1 = spine.find("signatures/ch1.xhtml").unwrap();
    let ch3 = spine.find("signatures/ch3.xhtml").unwrap();
    assert!(ch1 < ch3);
}

#[cfg(unix)]
#[tokio::test]
async fn test_deliverables_run_on_master() {
    let project = book();
    project
        .write(
            "quire.toml",
            "[[deliverables]]\nname = \"copy\"\noutput = \"book.xhtml\"\ncommand = [\"cp\", \"{input}\", \"{output}\"]\n",
        )
        .unwrap();
    let build = project.stub_pipeline().unwrap();
    assert_eq!(build.pipeline.default_target(), Target::phony("deliverables"));

    build.pipeline.build(&[build.pipeline.default_target()]).await.unwrap();

    assert_eq!(project.read("build/book.xhtml").unwrap(), project.read("build/master/master.xhtml").unwrap());
}

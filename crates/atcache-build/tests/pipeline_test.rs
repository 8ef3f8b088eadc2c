use std::path::Path;

use atcache_build::executor::{DockerError, DockerExecutor};
use atcache_build::pipeline::{BuildError, ImageBuilder, Stage};
use atcache_core::ImageConfig;
use mockall::{Sequence, mock};
use tempfile::TempDir;

mock! {
    Executor {}

    impl DockerExecutor for Executor {
        async fn exec(&self, args: &[String]) -> Result<String, DockerError>;
        async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError>;
    }
}

fn init_python_project(dir: &Path, requirements: &str) {
    std::fs::create_dir_all(dir.join("airtable")).unwrap();
    std::fs::write(dir.join("requirements.txt"), requirements).unwrap();
    std::fs::write(dir.join("setup.py"), "from setuptools import setup\n").unwrap();
    std::fs::write(dir.join("airtable/__init__.py"), "").unwrap();
}

fn has(args: &[String], word: &str) -> bool {
    args.iter().any(|a| a == word)
}

fn is_target(args: &[String], target: &str) -> bool {
    has(args, "build")
        && args
            .windows(2)
            .any(|w| w[0] == "--target" && w[1] == target)
}

fn failed(stderr: &str) -> DockerError {
    DockerError::CommandFailed {
        args: vec![],
        stderr: stderr.to_owned(),
    }
}

const IMAGE_ID: &str = "sha256:5f1e0c";

fn base_image_present(mock: &mut MockExecutor) {
    mock.expect_exec()
        .withf(|args| has(args, "inspect"))
        .returning(|_| Ok("sha256:abc\n".to_owned()));
}

/// Succeeds like `docker build`, writing the image ID when `--iidfile` is given.
fn build_ok(args: &[String]) -> Result<(), DockerError> {
    if let Some(w) = args.windows(2).find(|w| w[0] == "--iidfile") {
        std::fs::write(&w[1], format!("{IMAGE_ID}\n")).unwrap();
    }
    Ok(())
}

fn is_tag(args: &[String]) -> bool {
    args.first().is_some_and(|a| a == "tag")
}

fn tags_image(mock: &mut MockExecutor) {
    mock.expect_exec()
        .withf(|args| is_tag(args) && has(args, IMAGE_ID) && has(args, "atcache:latest"))
        .times(1)
        .returning(|_| Ok(String::new()));
}

fn never_tags(mock: &mut MockExecutor) {
    mock.expect_exec().withf(|args| is_tag(args)).never();
}

// ── Happy path ──

#[tokio::test]
async fn build_runs_every_stage_in_order() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests==2.31.0\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| is_target(args, "dependencies"))
        .times(1)
        .returning(|_| Ok(()));
    mock.expect_exec_streaming()
        .withf(|args| is_target(args, "package"))
        .times(1)
        .returning(|args| {
            assert!(!has(args, "--tag"));
            build_ok(args)
        });
    tags_image(&mut mock);

    let builder = ImageBuilder::with_executor(mock);
    let report = builder
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap();

    assert_eq!(report.image_tag, "atcache:latest");
    assert_eq!(report.image_id, IMAGE_ID);
    assert_eq!(report.requirements, 1);
    assert!(!report.ejected);
    assert_eq!(
        report.stages,
        vec![
            Stage::Config,
            Stage::BaseImage,
            Stage::Inputs,
            Stage::Context,
            Stage::Dependencies,
            Stage::Package,
            Stage::Tag,
        ]
    );

    let dockerfile = std::fs::read_to_string(report.context_dir.join("Dockerfile")).unwrap();
    assert!(dockerfile.contains("ENV PYTHONUNBUFFERED=1"));
    assert!(report.context_dir.join("airtable/__init__.py").exists());
}

#[tokio::test]
async fn build_pulls_missing_base_image() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests==2.31.0\n");

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|args| has(args, "inspect"))
        .returning(|_| Err(failed("No such image")));
    mock.expect_exec_streaming()
        .withf(|args| has(args, "pull") && has(args, "python:3.11-slim"))
        .times(1)
        .returning(|_| Ok(()));
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .times(2)
        .returning(build_ok);
    tags_image(&mut mock);

    let builder = ImageBuilder::with_executor(mock);
    let report = builder
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap();
    assert!(report.stages.contains(&Stage::Package));
}

#[tokio::test]
async fn build_verifies_image_before_tagging() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests==2.31.0\n");

    let mut seq = Sequence::new();
    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .times(2)
        .in_sequence(&mut seq)
        .returning(build_ok);
    mock.expect_exec_streaming()
        .withf(|args| {
            has(args, "run")
                && has(args, "--rm")
                && has(args, IMAGE_ID)
                && has(args, "python -c 'import airtable'")
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    mock.expect_exec()
        .withf(|args| is_tag(args))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));

    let config = ImageConfig {
        verify: Some("python -c 'import airtable'".to_owned()),
        ..ImageConfig::default()
    };
    let report = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &config)
        .await
        .unwrap();

    assert_eq!(
        &report.stages[report.stages.len() - 2..],
        &[Stage::Verify, Stage::Tag]
    );
}

#[tokio::test]
async fn build_uses_ejected_dockerfile() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests==2.31.0\n");
    std::fs::write(
        tmp.path().join("Dockerfile"),
        "FROM python:3.11 AS base\n# hand-edited\nFROM base AS dependencies\nFROM dependencies AS package\n",
    )
    .unwrap();

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .times(2)
        .returning(build_ok);
    tags_image(&mut mock);

    let report = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap();

    assert!(report.ejected);
    let staged = std::fs::read_to_string(report.context_dir.join("Dockerfile")).unwrap();
    assert!(staged.contains("# hand-edited"));
}

// ── Failures ──

#[tokio::test]
async fn unresolvable_dependency_stops_before_package_install() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "this-package-does-not-exist-anywhere==0.0.1\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| is_target(args, "dependencies"))
        .times(1)
        .returning(|_| Err(failed("exit code: 1")));
    mock.expect_exec_streaming()
        .withf(|args| is_target(args, "package"))
        .never();
    never_tags(&mut mock);

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::DependencyInstall { .. }));
    assert_eq!(err.stage(), Stage::Dependencies);
}

#[tokio::test]
async fn package_failure_is_reported_as_package_stage() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests==2.31.0\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| is_target(args, "dependencies"))
        .returning(|_| Ok(()));
    mock.expect_exec_streaming()
        .withf(|args| is_target(args, "package"))
        .returning(|_| Err(failed("error in setup command")));
    never_tags(&mut mock);

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::PackageInstall { .. }));
    assert_eq!(err.stage(), Stage::Package);
}

#[tokio::test]
async fn missing_base_image_aborts_before_any_build() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests==2.31.0\n");

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|args| has(args, "inspect"))
        .returning(|_| Err(failed("No such image")));
    mock.expect_exec_streaming()
        .withf(|args| has(args, "pull"))
        .returning(|_| Err(failed("manifest unknown")));
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .never();

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::BaseImageNotFound { ref image, .. } if image == "python:3.11-slim"
    ));
    assert!(!tmp.path().join(".atcache-context").exists());
}

#[tokio::test]
async fn missing_manifest_is_reported_before_context() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("setup.py"), "").unwrap();

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming().never();

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::MissingManifest { .. }));
    assert_eq!(err.stage(), Stage::Inputs);
    assert!(!tmp.path().join(".atcache-context").exists());
}

#[tokio::test]
async fn malformed_manifest_fails_without_docker_build() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests===\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming().never();

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Manifest { .. }));
}

#[tokio::test]
async fn missing_package_script_is_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("requirements.txt"), "requests\n").unwrap();

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming().never();

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::MissingPackageScript { .. }));
}

#[tokio::test]
async fn invalid_config_fails_before_docker() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests\n");

    let mut mock = MockExecutor::new();
    mock.expect_exec().never();
    mock.expect_exec_streaming().never();

    let config = ImageConfig {
        workdir: "relative/dir".to_owned(),
        ..ImageConfig::default()
    };
    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &config)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Config);
}

#[tokio::test]
async fn verify_failure_leaves_image_untagged() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .returning(|args| {
            assert!(!has(args, "--tag"));
            build_ok(args)
        });
    mock.expect_exec_streaming()
        .withf(|args| has(args, "run"))
        .returning(|_| Err(failed("ModuleNotFoundError: No module named 'airtable'")));
    never_tags(&mut mock);

    let config = ImageConfig {
        verify: Some("python -c 'import airtable'".to_owned()),
        ..ImageConfig::default()
    };
    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Verify { ref image, .. } if image == IMAGE_ID));
    assert_eq!(err.stage(), Stage::Verify);
}

#[tokio::test]
async fn ejected_dockerfile_without_package_stage_is_rejected() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests\n");
    std::fs::write(
        tmp.path().join("Dockerfile"),
        "FROM python:3.11 AS dependencies\nRUN pip install -r requirements.txt\n",
    )
    .unwrap();

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming().never();

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Ejected { .. }));
    assert_eq!(err.stage(), Stage::Context);
}

#[tokio::test]
async fn tag_failure_is_reported_as_tag_stage() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .returning(build_ok);
    mock.expect_exec()
        .withf(|args| is_tag(args))
        .returning(|_| Err(failed("invalid reference format")));

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Tag { ref tag, .. } if tag == "atcache:latest"));
    assert_eq!(err.stage(), Stage::Tag);
}

#[tokio::test]
async fn missing_image_id_fails_the_package_stage() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path(), "requests\n");

    let mut mock = MockExecutor::new();
    base_image_present(&mut mock);
    mock.expect_exec_streaming()
        .withf(|args| has(args, "build"))
        .returning(|_| Ok(()));
    never_tags(&mut mock);

    let err = ImageBuilder::with_executor(mock)
        .build(tmp.path(), &ImageConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::ImageId { .. }));
    assert_eq!(err.stage(), Stage::Package);
}

use std::collections::BTreeMap;
use std::path::Path;

use atcache_build::context::{
    CONTEXT_DIR, EntryKind, create_context, project_entries, project_files, remove_context,
};
use atcache_build::dockerfile::DockerfileGenerator;
use atcache_build::eject::{eject, is_ejected, load_ejected_dockerfile};
use atcache_build::recipe::{BuildStep, ImageRecipe, UNBUFFERED_ENV};
use atcache_core::ImageConfig;
use tempfile::TempDir;

/// Minimal Python project: manifest, install script, one module.
fn init_python_project(dir: &Path) {
    std::fs::create_dir_all(dir.join("airtable")).unwrap();
    std::fs::write(dir.join("requirements.txt"), "requests==2.31.0\n").unwrap();
    std::fs::write(
        dir.join("setup.py"),
        "from setuptools import setup\nsetup(name='airtable')\n",
    )
    .unwrap();
    std::fs::write(dir.join("airtable/__init__.py"), "").unwrap();
    std::fs::write(dir.join("airtable/client.py"), "import requests\n").unwrap();
}

// ── Recipe Tests ──

#[test]
fn recipe_steps_are_in_build_order() {
    let recipe = ImageRecipe::from_config(&ImageConfig::default());
    let steps = recipe.steps();

    assert_eq!(
        steps,
        &[
            BuildStep::BaseImage {
                image: "python:3.11-slim".to_owned()
            },
            BuildStep::Env {
                key: UNBUFFERED_ENV.to_owned(),
                value: "1".to_owned()
            },
            BuildStep::Workdir {
                path: "/app".to_owned()
            },
            BuildStep::CopyTree {
                dest: "/app".to_owned()
            },
            BuildStep::InstallDependencies {
                python: "python".to_owned(),
                manifest: "requirements.txt".to_owned()
            },
            BuildStep::InstallPackage {
                python: "python".to_owned(),
                script: "setup.py".to_owned()
            },
        ]
    );
}

#[test]
fn recipe_without_unbuffered_output_has_no_env_step() {
    let config = ImageConfig {
        unbuffered_output: false,
        ..ImageConfig::default()
    };
    let recipe = ImageRecipe::from_config(&config);

    assert!(!recipe.is_unbuffered());
    assert!(
        !recipe
            .steps()
            .iter()
            .any(|s| matches!(s, BuildStep::Env { .. }))
    );
}

#[test]
fn recipe_exposes_base_image_and_workdir() {
    let config = ImageConfig {
        base_image: "python:3.12-alpine".to_owned(),
        workdir: "/srv/app".to_owned(),
        ..ImageConfig::default()
    };
    let recipe = ImageRecipe::from_config(&config);

    assert_eq!(recipe.base_image(), "python:3.12-alpine");
    assert_eq!(recipe.workdir(), Some("/srv/app"));
    assert!(recipe.is_unbuffered());
}

// ── Dockerfile Generation Tests ──

#[test]
fn dockerfile_default_render() {
    let output = DockerfileGenerator::new(&ImageConfig::default()).render();

    let expected = "\
# === Stage 1: Base ===
FROM python:3.11-slim AS base
ENV PYTHONUNBUFFERED=1
WORKDIR /app
COPY . /app

# === Stage 2: Dependencies ===
FROM base AS dependencies
RUN python -m pip install --no-cache-dir -r requirements.txt

# === Stage 3: Package ===
FROM dependencies AS package
RUN python setup.py install
";
    assert_eq!(output, expected);
}

#[test]
fn dockerfile_dependencies_come_before_package() {
    let output = DockerfileGenerator::new(&ImageConfig::default()).render();

    let workdir = output.find("WORKDIR /app").unwrap();
    let copy = output.find("COPY . /app").unwrap();
    let deps = output.find("pip install").unwrap();
    let package = output.find("setup.py install").unwrap();
    assert!(workdir < copy);
    assert!(copy < deps);
    assert!(deps < package);
}

#[test]
fn dockerfile_render_is_deterministic() {
    let mut env = BTreeMap::new();
    env.insert("ZONE".to_owned(), "b".to_owned());
    env.insert("APP_MODE".to_owned(), "prod".to_owned());
    let config = ImageConfig {
        env,
        ..ImageConfig::default()
    };

    let first = DockerfileGenerator::new(&config).render();
    let second = DockerfileGenerator::new(&config.clone()).render();
    assert_eq!(first, second);

    // extra env follows the unbuffered flag, in key order
    let unbuffered = first.find("ENV PYTHONUNBUFFERED=1").unwrap();
    let app_mode = first.find("ENV APP_MODE=prod").unwrap();
    let zone = first.find("ENV ZONE=b").unwrap();
    assert!(unbuffered < app_mode);
    assert!(app_mode < zone);
}

#[test]
fn dockerfile_quotes_env_values_with_spaces() {
    let mut env = BTreeMap::new();
    env.insert("GREETING".to_owned(), "hello world".to_owned());
    let config = ImageConfig {
        env,
        ..ImageConfig::default()
    };

    let output = DockerfileGenerator::new(&config).render();
    assert!(output.contains("ENV GREETING=\"hello world\""));
}

#[test]
fn dockerfile_uses_custom_paths_and_interpreter() {
    let config = ImageConfig {
        workdir: "/opt/airtable".to_owned(),
        manifest: "deps/requirements.txt".to_owned(),
        package_script: "build/setup.py".to_owned(),
        python: "python3".to_owned(),
        unbuffered_output: false,
        ..ImageConfig::default()
    };

    let output = DockerfileGenerator::new(&config).render();
    assert!(output.contains("WORKDIR /opt/airtable\n"));
    assert!(output.contains("COPY . /opt/airtable\n"));
    assert!(output.contains("RUN python3 -m pip install --no-cache-dir -r deps/requirements.txt\n"));
    assert!(output.contains("RUN python3 build/setup.py install\n"));
    assert!(!output.contains("PYTHONUNBUFFERED"));
}

// ── Context Tests ──

#[test]
fn context_copies_project_tree_and_dockerfile() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();

    assert_eq!(context, tmp.path().join(CONTEXT_DIR));
    assert!(context.join("requirements.txt").exists());
    assert!(context.join("setup.py").exists());
    assert!(context.join("airtable/client.py").exists());
    assert_eq!(
        std::fs::read_to_string(context.join("Dockerfile")).unwrap(),
        "FROM scratch\n"
    );
}

#[test]
fn context_honours_dockerignore() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join("venv/lib")).unwrap();
    std::fs::write(tmp.path().join("venv/lib/site.py"), "").unwrap();
    std::fs::write(tmp.path().join("notes.log"), "debug").unwrap();
    std::fs::write(tmp.path().join(".dockerignore"), "venv/\n*.log\n").unwrap();

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();

    assert!(!context.join("venv").exists());
    assert!(!context.join("notes.log").exists());
    assert!(context.join("airtable/client.py").exists());
}

#[test]
fn dockerignore_patterns_are_anchored_at_the_root() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    std::fs::create_dir_all(tmp.path().join("airtable/data")).unwrap();
    std::fs::write(tmp.path().join("data/big.csv"), "a,b\n").unwrap();
    std::fs::write(tmp.path().join("airtable/data/schema.json"), "{}").unwrap();
    std::fs::write(tmp.path().join(".dockerignore"), "data\n").unwrap();

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();

    assert!(!context.join("data").exists());
    assert!(context.join("airtable/data/schema.json").exists());
}

#[test]
fn nested_dockerignore_files_are_not_read() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::write(tmp.path().join("airtable/.dockerignore"), "*.py\n").unwrap();

    let files = project_files(tmp.path()).unwrap();

    assert!(files.contains(&Path::new("airtable/client.py").to_path_buf()));
    assert!(files.contains(&Path::new("airtable/.dockerignore").to_path_buf()));
}

#[test]
fn dockerignore_exceptions_reinclude_files() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    std::fs::write(tmp.path().join("data/big.csv"), "a,b\n").unwrap();
    std::fs::write(tmp.path().join("data/keep.csv"), "c,d\n").unwrap();
    std::fs::write(tmp.path().join(".dockerignore"), "data\n!data/keep.csv\n").unwrap();

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();

    assert!(context.join("data/keep.csv").exists());
    assert!(!context.join("data/big.csv").exists());
}

#[test]
fn context_keeps_empty_directories() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join("airtable/cache")).unwrap();

    let entries = project_entries(tmp.path()).unwrap();
    assert!(entries.iter().any(|e| {
        e.path == Path::new("airtable/cache") && e.kind == EntryKind::Dir
    }));

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();
    assert!(context.join("airtable/cache").is_dir());
}

#[cfg(unix)]
#[test]
fn context_recreates_symlinks() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::write(tmp.path().join("config.json"), "{}").unwrap();
    std::os::unix::fs::symlink("config.json", tmp.path().join("link.json")).unwrap();

    let files = project_files(tmp.path()).unwrap();
    assert!(files.contains(&Path::new("link.json").to_path_buf()));

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();
    let staged = context.join("link.json");
    assert!(staged.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(
        std::fs::read_link(&staged).unwrap(),
        Path::new("config.json")
    );
}

#[test]
fn context_excludes_git_and_previous_context() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
    std::fs::write(tmp.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();

    create_context(tmp.path(), "FROM scratch\n").unwrap();
    // second run must not nest the first context inside itself
    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();

    assert!(!context.join(".git").exists());
    assert!(!context.join(CONTEXT_DIR).exists());
}

#[test]
fn context_keeps_hidden_files() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());
    std::fs::write(tmp.path().join(".env.example"), "AIRTABLE_API_KEY=").unwrap();

    let context = create_context(tmp.path(), "FROM scratch\n").unwrap();
    assert!(context.join(".env.example").exists());
}

#[test]
fn project_files_are_relative_and_sorted() {
    let tmp = TempDir::new().unwrap();
    init_python_project(tmp.path());

    let files = project_files(tmp.path()).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();

    assert_eq!(
        names,
        vec![
            "airtable/__init__.py",
            "airtable/client.py",
            "requirements.txt",
            "setup.py",
        ]
    );
}

#[test]
fn remove_context_is_a_noop_without_context() {
    let tmp = TempDir::new().unwrap();
    remove_context(tmp.path()).unwrap();

    init_python_project(tmp.path());
    create_context(tmp.path(), "FROM scratch\n").unwrap();
    remove_context(tmp.path()).unwrap();
    assert!(!tmp.path().join(CONTEXT_DIR).exists());
}

// ── Eject Tests ──

#[test]
fn eject_writes_dockerfile() {
    let tmp = TempDir::new().unwrap();
    let dockerfile = DockerfileGenerator::new(&ImageConfig::default()).render();

    assert!(!is_ejected(tmp.path()));
    eject(tmp.path(), &dockerfile).unwrap();
    assert!(is_ejected(tmp.path()));

    let loaded = load_ejected_dockerfile(tmp.path()).unwrap();
    assert_eq!(loaded, dockerfile);
}

#[test]
fn eject_refuses_to_overwrite() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("Dockerfile"), "FROM custom\n").unwrap();

    let err = eject(tmp.path(), "FROM generated\n").unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(
        load_ejected_dockerfile(tmp.path()).unwrap(),
        "FROM custom\n"
    );
}

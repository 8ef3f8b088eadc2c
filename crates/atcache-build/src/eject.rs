use std::path::Path;

use crate::recipe::{STAGE_DEPENDENCIES, STAGE_PACKAGE};

/// File the recipe is ejected to, at the project root.
pub const EJECTED_DOCKERFILE: &str = "Dockerfile";

/// Stages `atcache build` targets; an ejected Dockerfile must declare both.
pub const REQUIRED_STAGES: &[&str] = &[STAGE_DEPENDENCIES, STAGE_PACKAGE];

/// Writes the rendered recipe into the project directory.
///
/// After ejecting, `atcache build` uses `./Dockerfile` instead of
/// generating one.
pub fn eject(project_dir: &Path, dockerfile_content: &str) -> Result<(), EjectError> {
    let dockerfile_path = project_dir.join(EJECTED_DOCKERFILE);
    if dockerfile_path.exists() {
        return Err(EjectError::AlreadyEjected(dockerfile_path));
    }

    std::fs::write(&dockerfile_path, dockerfile_content).map_err(|e| EjectError::Write {
        path: dockerfile_path,
        source: e,
    })
}

pub fn is_ejected(project_dir: &Path) -> bool {
    project_dir.join(EJECTED_DOCKERFILE).exists()
}

/// Reads the ejected Dockerfile as-is.
pub fn load_ejected_dockerfile(project_dir: &Path) -> Result<String, EjectError> {
    let path = project_dir.join(EJECTED_DOCKERFILE);
    std::fs::read_to_string(&path).map_err(|e| EjectError::Read { path, source: e })
}

/// Stage names declared by `FROM <image> AS <name>` lines, lowercased.
pub fn stage_names(dockerfile: &str) -> Vec<String> {
    dockerfile
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            if !tokens.next()?.eq_ignore_ascii_case("FROM") {
                return None;
            }
            let mut tokens = tokens.skip_while(|t| !t.eq_ignore_ascii_case("AS"));
            tokens.next()?;
            tokens.next().map(str::to_ascii_lowercase)
        })
        .collect()
}

/// Fails on the first required stage the Dockerfile does not declare.
pub fn check_stages(dockerfile: &str) -> Result<(), EjectError> {
    let declared = stage_names(dockerfile);
    match REQUIRED_STAGES
        .iter()
        .copied()
        .find(|stage| !declared.iter().any(|name| name == stage))
    {
        Some(stage) => Err(EjectError::MissingStage { stage }),
        None => Ok(()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EjectError {
    #[error("Dockerfile already exists at {0}; edit it directly or delete it to re-eject")]
    AlreadyEjected(std::path::PathBuf),
    #[error("failed to write {path}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read ejected Dockerfile at {path}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("ejected Dockerfile has no `{stage}` stage (expected `FROM ... AS {stage}`)")]
    MissingStage { stage: &'static str },
}

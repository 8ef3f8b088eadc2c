use atcache_core::ImageConfig;

use crate::recipe::{BuildStep, ImageRecipe, STAGE_BASE, STAGE_DEPENDENCIES, STAGE_PACKAGE};

/// Renders the image recipe as a three-stage Dockerfile.
///
/// The stages are named so the pipeline can build `dependencies` and
/// `package` as separate targets and tell the two failures apart.
pub struct DockerfileGenerator {
    recipe: ImageRecipe,
}

impl DockerfileGenerator {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            recipe: ImageRecipe::from_config(config),
        }
    }

    pub fn from_recipe(recipe: ImageRecipe) -> Self {
        Self { recipe }
    }

    pub fn recipe(&self) -> &ImageRecipe {
        &self.recipe
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut current_stage: Option<&str> = None;

        for step in self.recipe.steps() {
            let stage = step.stage();
            if current_stage != Some(stage) {
                if current_stage.is_some() {
                    out.push('\n');
                }
                out.push_str(&stage_header(stage));
                if stage != STAGE_BASE {
                    let parent = current_stage.unwrap_or(STAGE_BASE);
                    out.push_str(&format!("FROM {parent} AS {stage}\n"));
                }
                current_stage = Some(stage);
            }

            let line = match step {
                BuildStep::BaseImage { image } => format!("FROM {image} AS {STAGE_BASE}"),
                BuildStep::Env { key, value } => format!("ENV {key}={}", quote_env(value)),
                BuildStep::Workdir { path } => format!("WORKDIR {path}"),
                BuildStep::CopyTree { dest } => format!("COPY . {dest}"),
                BuildStep::InstallDependencies { python, manifest } => {
                    format!("RUN {python} -m pip install --no-cache-dir -r {manifest}")
                }
                BuildStep::InstallPackage { python, script } => {
                    format!("RUN {python} {script} install")
                }
            };
            out.push_str(&line);
            out.push('\n');
        }

        out
    }
}

fn stage_header(stage: &str) -> String {
    let title = match stage {
        STAGE_BASE => "Stage 1: Base",
        STAGE_DEPENDENCIES => "Stage 2: Dependencies",
        STAGE_PACKAGE => "Stage 3: Package",
        _ => stage,
    };
    format!("# === {title} ===\n")
}

/// Quotes an ENV value when Docker would otherwise split or mangle it.
fn quote_env(value: &str) -> String {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$'));
    if plain {
        return value.to_owned();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

use atcache_core::ImageConfig;

/// Environment variable that makes the Python runtime flush every write.
pub const UNBUFFERED_ENV: &str = "PYTHONUNBUFFERED";

pub const STAGE_BASE: &str = "base";
pub const STAGE_DEPENDENCIES: &str = "dependencies";
pub const STAGE_PACKAGE: &str = "package";

/// One instruction of the image recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    BaseImage { image: String },
    Env { key: String, value: String },
    Workdir { path: String },
    CopyTree { dest: String },
    InstallDependencies { python: String, manifest: String },
    InstallPackage { python: String, script: String },
}

impl BuildStep {
    /// The Dockerfile stage this step belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::BaseImage { .. }
            | Self::Env { .. }
            | Self::Workdir { .. }
            | Self::CopyTree { .. } => STAGE_BASE,
            Self::InstallDependencies { .. } => STAGE_DEPENDENCIES,
            Self::InstallPackage { .. } => STAGE_PACKAGE,
        }
    }
}

/// Ordered build steps derived from `[image]` configuration.
///
/// Steps always come out as base image, environment, working directory,
/// copied tree, dependencies, package. There is no way to reorder them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecipe {
    steps: Vec<BuildStep>,
}

impl ImageRecipe {
    pub fn from_config(config: &ImageConfig) -> Self {
        let mut steps = vec![BuildStep::BaseImage {
            image: config.base_image.clone(),
        }];

        if config.unbuffered_output {
            steps.push(BuildStep::Env {
                key: UNBUFFERED_ENV.to_owned(),
                value: "1".to_owned(),
            });
        }
        steps.extend(config.env.iter().map(|(key, value)| BuildStep::Env {
            key: key.clone(),
            value: value.clone(),
        }));

        steps.push(BuildStep::Workdir {
            path: config.workdir.clone(),
        });
        steps.push(BuildStep::CopyTree {
            dest: config.workdir.clone(),
        });
        steps.push(BuildStep::InstallDependencies {
            python: config.python.clone(),
            manifest: config.manifest.clone(),
        });
        steps.push(BuildStep::InstallPackage {
            python: config.python.clone(),
            script: config.package_script.clone(),
        });

        Self { steps }
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn base_image(&self) -> &str {
        match self.steps.first() {
            Some(BuildStep::BaseImage { image }) => image,
            _ => "",
        }
    }

    pub fn workdir(&self) -> Option<&str> {
        self.steps.iter().find_map(|step| match step {
            BuildStep::Workdir { path } => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn is_unbuffered(&self) -> bool {
        self.steps.iter().any(|step| {
            matches!(step, BuildStep::Env { key, value } if key == UNBUFFERED_ENV && value == "1")
        })
    }
}

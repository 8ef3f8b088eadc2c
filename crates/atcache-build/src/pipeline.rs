use std::fmt;
use std::path::{Path, PathBuf};

use atcache_core::ImageConfig;

use crate::context::{self, ContextError};
use crate::dockerfile::DockerfileGenerator;
use crate::eject::{self, EjectError};
use crate::executor::{DockerError, DockerExecutor, RealExecutor};
use crate::manifest::{DependencyManifest, ManifestError};
use crate::recipe::{STAGE_DEPENDENCIES, STAGE_PACKAGE};

/// File in the staged context that receives the package image ID.
pub const IMAGE_ID_FILE: &str = "image-id";

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Config,
    BaseImage,
    Inputs,
    Context,
    Dependencies,
    Package,
    Verify,
    Tag,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::BaseImage => "base image",
            Self::Inputs => "inputs",
            Self::Context => "context",
            Self::Dependencies => "dependencies",
            Self::Package => "package",
            Self::Verify => "verify",
            Self::Tag => "tag",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub image_tag: String,
    /// ID of the package image the tag points at.
    pub image_id: String,
    pub context_dir: PathBuf,
    pub requirements: usize,
    pub ejected: bool,
    /// Completed stages in order.
    pub stages: Vec<Stage>,
}

/// Builds the image, one stage at a time.
///
/// ```text
/// atcache build
///   1. Config        ── [image] validation
///   2. Base image    ── docker image inspect, else docker pull
///   3. Inputs        ── manifest parses, package script exists
///   4. Context       ── project tree → .atcache-context/
///   5. Dependencies  ── docker build --target dependencies
///   6. Package       ── docker build --target package --iidfile <context>/image-id
///   7. Verify        ── docker run --rm <image id> sh -c <verify>   (optional)
///   8. Tag           ── docker tag <image id> <tag>
/// ```
///
/// Any failure stops the pipeline. Nothing is tagged before stage 8.
pub struct ImageBuilder<E: DockerExecutor = RealExecutor> {
    executor: E,
}

impl ImageBuilder<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for ImageBuilder<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DockerExecutor> ImageBuilder<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    pub async fn build(
        &self,
        project_dir: &Path,
        config: &ImageConfig,
    ) -> Result<BuildReport, BuildError> {
        let mut stages = Vec::new();

        // 1. Config
        config
            .validate()
            .map_err(|e| BuildError::Config { source: e })?;
        stages.push(Stage::Config);

        // 2. Base image
        self.resolve_base_image(&config.base_image).await?;
        stages.push(Stage::BaseImage);

        // 3. Inputs
        let requirements = check_inputs(project_dir, config)?;
        stages.push(Stage::Inputs);

        // 4. Context
        let ejected = eject::is_ejected(project_dir);
        let dockerfile = if ejected {
            tracing::info!("using ejected Dockerfile");
            let content = eject::load_ejected_dockerfile(project_dir)
                .map_err(|e| BuildError::Ejected { source: e })?;
            eject::check_stages(&content).map_err(|e| BuildError::Ejected { source: e })?;
            content
        } else {
            DockerfileGenerator::new(config).render()
        };
        let context_dir = context::create_context(project_dir, &dockerfile)
            .map_err(|e| BuildError::Context { source: e })?;
        let context_str = utf8(&context_dir)?;
        tracing::info!(context = %context_dir.display(), "build context staged");
        stages.push(Stage::Context);

        // 5. Dependencies
        tracing::info!(manifest = %config.manifest, "installing dependencies");
        self.executor
            .build_target(&context_str, STAGE_DEPENDENCIES, None)
            .await
            .map_err(|e| BuildError::DependencyInstall { source: e })?;
        stages.push(Stage::Dependencies);

        // 6. Package
        tracing::info!(script = %config.package_script, "installing package");
        let iidfile = context_dir.join(IMAGE_ID_FILE);
        let iidfile_str = utf8(&iidfile)?;
        self.executor
            .build_target(&context_str, STAGE_PACKAGE, Some(iidfile_str.as_str()))
            .await
            .map_err(|e| BuildError::PackageInstall { source: e })?;
        let image_id = read_image_id(&iidfile)?;
        stages.push(Stage::Package);

        // 7. Verify
        if let Some(command) = config.verify.as_deref() {
            tracing::info!(image = %image_id, "verifying image");
            self.executor
                .run_shell(&image_id, command)
                .await
                .map_err(|e| BuildError::Verify {
                    image: image_id.clone(),
                    source: e,
                })?;
            stages.push(Stage::Verify);
        }

        // 8. Tag
        self.executor
            .tag(&image_id, &config.tag)
            .await
            .map_err(|e| BuildError::Tag {
                tag: config.tag.clone(),
                source: e,
            })?;
        stages.push(Stage::Tag);

        tracing::info!(image = %config.tag, id = %image_id, "image built");
        Ok(BuildReport {
            image_tag: config.tag.clone(),
            image_id,
            context_dir,
            requirements,
            ejected,
            stages,
        })
    }

    async fn resolve_base_image(&self, image: &str) -> Result<(), BuildError> {
        if self.executor.image_exists(image).await {
            tracing::debug!(image, "base image present locally");
            return Ok(());
        }

        tracing::info!(image, "pulling base image");
        self.executor
            .pull(image)
            .await
            .map_err(|e| BuildError::BaseImageNotFound {
                image: image.to_owned(),
                source: e,
            })
    }
}

/// Checks the manifest and package script without touching docker.
///
/// Returns the number of requirements the manifest declares.
pub fn check_inputs(project_dir: &Path, config: &ImageConfig) -> Result<usize, BuildError> {
    let manifest_path = project_dir.join(&config.manifest);
    if !manifest_path.is_file() {
        return Err(BuildError::MissingManifest {
            path: manifest_path,
        });
    }
    let manifest =
        DependencyManifest::load(&manifest_path).map_err(|e| BuildError::Manifest { source: e })?;
    let requirements = manifest.requirements().count();

    let script_path = project_dir.join(&config.package_script);
    if !script_path.is_file() {
        return Err(BuildError::MissingPackageScript { path: script_path });
    }
    tracing::info!(requirements, "inputs checked");
    Ok(requirements)
}

// ── Helpers ──

fn utf8(path: &Path) -> Result<String, BuildError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| BuildError::InvalidPath(path.to_path_buf()))
}

fn read_image_id(path: &Path) -> Result<String, BuildError> {
    let id = std::fs::read_to_string(path)
        .map_err(|e| BuildError::ImageId {
            path: path.to_path_buf(),
            source: e,
        })?
        .trim()
        .to_owned();
    if id.is_empty() {
        return Err(BuildError::EmptyImageId {
            path: path.to_path_buf(),
        });
    }
    Ok(id)
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid image configuration")]
    Config { source: atcache_core::Error },

    #[error("base image {image} not found locally or in its registry")]
    BaseImageNotFound { image: String, source: DockerError },

    #[error("dependency manifest not found at {path}")]
    MissingManifest { path: PathBuf },

    #[error("invalid dependency manifest")]
    Manifest { source: ManifestError },

    #[error("package script not found at {path}")]
    MissingPackageScript { path: PathBuf },

    #[error("failed to load ejected Dockerfile")]
    Ejected { source: EjectError },

    #[error("failed to stage the build context")]
    Context { source: ContextError },

    #[error("build context path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("dependency installation failed")]
    DependencyInstall { source: DockerError },

    #[error("package installation failed")]
    PackageInstall { source: DockerError },

    #[error("failed to read the package image ID from {path}")]
    ImageId {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("docker wrote no image ID to {path}")]
    EmptyImageId { path: PathBuf },

    #[error("verification of image {image} failed; it was not tagged")]
    Verify { image: String, source: DockerError },

    #[error("failed to tag the image as {tag}")]
    Tag { tag: String, source: DockerError },
}

impl BuildError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config { .. } => Stage::Config,
            Self::BaseImageNotFound { .. } => Stage::BaseImage,
            Self::MissingManifest { .. }
            | Self::Manifest { .. }
            | Self::MissingPackageScript { .. } => Stage::Inputs,
            Self::Ejected { .. } | Self::Context { .. } | Self::InvalidPath(_) => Stage::Context,
            Self::DependencyInstall { .. } => Stage::Dependencies,
            Self::PackageInstall { .. } | Self::ImageId { .. } | Self::EmptyImageId { .. } => {
                Stage::Package
            }
            Self::Verify { .. } => Stage::Verify,
            Self::Tag { .. } => Stage::Tag,
        }
    }
}

//! Image recipe, Dockerfile generation, and build pipeline for atcache.
//!
//! # Recipe
//!
//! ```text
//! # === Stage 1: Base ===
//! FROM <base_image> AS base
//! ENV PYTHONUNBUFFERED=1            (unbuffered_output = true)
//! ENV <key>=<value>                 ([image.env], key order)
//! WORKDIR <workdir>
//! COPY . <workdir>
//!
//! # === Stage 2: Dependencies ===
//! FROM base AS dependencies
//! RUN <python> -m pip install --no-cache-dir -r <manifest>
//!
//! # === Stage 3: Package ===
//! FROM dependencies AS package
//! RUN <python> <package_script> install
//! ```
//!
//! # Context strategy
//!
//! The build context mirrors the project tree:
//! - directories, regular files and symlinks under the project root
//! - root `.dockerignore` patterns are excluded, anchored at the root as Docker does
//! - `.atcache-context/` and `.git/` at the root are always excluded

pub mod context;
pub mod dockerfile;
pub mod eject;
pub mod executor;
pub mod manifest;
pub mod pipeline;
pub mod recipe;

pub use dockerfile::DockerfileGenerator;
pub use executor::{DockerError, DockerExecutor, RealExecutor};
pub use manifest::{DependencyManifest, ManifestEntry, ManifestError, Requirement};
pub use pipeline::{BuildError, BuildReport, IMAGE_ID_FILE, ImageBuilder, Stage, check_inputs};
pub use recipe::{BuildStep, ImageRecipe};

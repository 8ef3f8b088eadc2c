use std::process::Stdio;

/// Abstraction over the docker CLI for testability.
///
/// Implementors provide the two ways of running `docker`; the image
/// operations the pipeline needs are built on top of them. Production code
/// uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait DockerExecutor: Send + Sync {
    /// Execute a docker command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, DockerError>;

    /// Execute a docker command, streaming output to the terminal.
    async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError>;

    /// Whether `image` is in the local image store.
    async fn image_exists(&self, image: &str) -> bool {
        self.exec(&args(["image", "inspect", image, "--format", "{{.Id}}"]))
            .await
            // arch-lint: allow(no-silent-result-drop) reason="inspect fails exactly when the image is absent locally"
            .is_ok()
    }

    async fn pull(&self, image: &str) -> Result<(), DockerError> {
        self.exec_streaming(&args(["pull", image])).await
    }

    /// Builds one Dockerfile stage. Nothing is tagged; with `iidfile` the
    /// resulting image ID is written there.
    async fn build_target(
        &self,
        context: &str,
        target: &str,
        iidfile: Option<&str>,
    ) -> Result<(), DockerError> {
        let mut build = args(["build", context, "--target", target]);
        if let Some(path) = iidfile {
            build.extend(args(["--iidfile", path]));
        }
        self.exec_streaming(&build).await
    }

    /// `docker run --rm <image> sh -c <command>`
    async fn run_shell(&self, image: &str, command: &str) -> Result<(), DockerError> {
        self.exec_streaming(&args(["run", "--rm", image, "sh", "-c", command]))
            .await
    }

    /// Points `tag` at an existing image.
    async fn tag(&self, image: &str, tag: &str) -> Result<(), DockerError> {
        self.exec(&args(["tag", image, tag])).await?;
        Ok(())
    }
}

/// Real docker CLI executor.
pub struct RealExecutor;

impl DockerExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, DockerError> {
        tracing::debug!(?args, "docker");
        let output = tokio::process::Command::new("docker")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DockerError::NotFound { source: e })?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| DockerError::InvalidUtf8 { source: e })
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
            })
        }
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError> {
        tracing::debug!(?args, "docker (streaming)");
        let status = tokio::process::Command::new("docker")
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| DockerError::NotFound { source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: format!("exit code: {status}"),
            })
        }
    }
}

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker CLI not found; install: https://docs.docker.com/get-docker/")]
    NotFound { source: std::io::Error },

    #[error("docker {} failed\n{stderr}", .args.first().map(String::as_str).unwrap_or(""))]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("docker output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },
}

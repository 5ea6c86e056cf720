//! Docker adapter for the [`ContainerEngine`] trait.
//!
//! Speaks to the local daemon socket (named pipe on Windows, Unix
//! socket elsewhere) via [`bollard`]. Each trait method wraps one
//! engine API call; failures are surfaced as [`EngineError`] and
//! interpreted by the lifecycle manager.

use std::collections::HashMap;

use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{DeviceRequest, HostConfig};
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};

use voxrun_core::invocation::{InvocationSpec, CONTAINER_WORKDIR, GPU_DRIVER};

use crate::api::{
    AttachStream, ContainerEngine, ContainerId, EngineError, ExitStatus, PullProgress, PullStream,
};
use crate::demux::{encode_frame, StdChannel};

impl From<DockerError> for EngineError {
    fn from(err: DockerError) -> Self {
        EngineError::Api(err.to_string())
    }
}

/// [`ContainerEngine`] implementation backed by the local Docker
/// daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect with platform defaults: `//./pipe/docker_engine` on
    /// Windows, `/var/run/docker.sock` elsewhere, honoring
    /// `DOCKER_HOST` when set.
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    fn host_config(spec: &InvocationSpec) -> HostConfig {
        let binds = spec.bindings.workdir.as_ref().map(|host| {
            vec![format!("{}:{}", host.display(), CONTAINER_WORKDIR)]
        });

        let device_requests = spec.bindings.all_gpus.then(|| {
            vec![DeviceRequest {
                driver: Some(GPU_DRIVER.to_string()),
                // -1 asks the engine for all devices of the driver.
                count: Some(-1),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }]
        });

        HostConfig {
            auto_remove: Some(spec.auto_remove),
            binds,
            device_requests,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(!images.is_empty())
    }

    fn pull_image(&self, reference: &str) -> PullStream {
        let stream = self.docker.create_image(
            Some(CreateImageOptions::<String> {
                from_image: reference.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        stream
            .map_err(EngineError::from)
            .and_then(|info| async move {
                if let Some(error) = info.error {
                    return Err(EngineError::Stream(error));
                }
                let percent = info.progress_detail.and_then(|detail| {
                    let current = detail.current?;
                    let total = detail.total.filter(|t| *t > 0)?;
                    Some(((current * 100 / total).clamp(0, 100)) as u8)
                });
                Ok(PullProgress {
                    status: info.status.unwrap_or_default(),
                    percent,
                })
            })
            .boxed()
    }

    async fn create_container(&self, spec: &InvocationSpec) -> Result<ContainerId, EngineError> {
        let config = Config {
            image: Some(spec.image.clone()),
            entrypoint: spec.entrypoint.clone(),
            cmd: (!spec.args.is_empty()).then(|| spec.args.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(Self::host_config(spec)),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        tracing::debug!(id = %response.id, image = %spec.image, "container created");
        Ok(response.id)
    }

    async fn attach(&self, id: &str) -> Result<AttachStream, EngineError> {
        let results = self
            .docker
            .attach_container(
                id,
                Some(AttachContainerOptions::<String> {
                    stream: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    ..Default::default()
                }),
            )
            .await?;

        // The boundary contract is the engine's raw multiplexed byte
        // stream; bollard parses the framing eagerly, so frames are
        // re-framed here and decoded again downstream.
        let stream = results
            .output
            .map_err(EngineError::from)
            .try_filter_map(|frame| async move {
                Ok(match frame {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        Some(encode_frame(StdChannel::Stdout, &message))
                    }
                    LogOutput::StdErr { message } => {
                        Some(encode_frame(StdChannel::Stderr, &message))
                    }
                    LogOutput::StdIn { .. } => None,
                })
            })
            .boxed();
        Ok(stream)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<ExitStatus, EngineError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(ExitStatus {
                code: response.status_code,
            }),
            // With auto-remove the container can vanish between exit
            // and the wait response landing; the engine then reports
            // it missing. Treat that as a normal exit.
            Some(Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }))
            | None => Ok(ExitStatus { code: 0 }),
            Some(Err(err)) => Err(err.into()),
        }
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

//! Bollard-backed implementation of the Docker API facade.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use bollard::container::{
    Config, InspectContainerOptions, KillContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::network::InspectNetworkOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, trace, warn};

use crate::descriptor::ContainerDescriptor;
use crate::error::{Error, Result};
use crate::handle::{ContainerHandle, ResolvedPort};

use super::{DockerApi, ExecStatus};

/// Engine HTTP timeout, seconds.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Docker Engine client over the transport selected from the environment.
#[derive(Clone)]
pub struct EngineClient {
    docker: Docker,
}

impl EngineClient {
    /// Connect using `DOCKER_HOST` when set (`tcp://`/`http://` or
    /// `unix://`), the default Unix socket otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] when the transport cannot be set
    /// up.
    pub fn connect_from_env() -> Result<Self> {
        let docker = match std::env::var("DOCKER_HOST") {
            Ok(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(&host, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Ok(host) if host.starts_with("unix://") => Docker::connect_with_socket(
                host.trim_start_matches("unix://"),
                CLIENT_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            _ => Docker::connect_with_socket_defaults(),
        }
        .map_err(|e| Error::ConnectionFailed(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Wrap an existing bollard client.
    #[must_use]
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Map a bollard error to the facade taxonomy: Engine HTTP errors carry
/// their status, everything else is a transport failure.
fn engine_error(e: bollard::errors::Error) -> Error {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => Error::Http {
            status: status_code,
            message,
        },
        other => Error::ConnectionFailed(other.to_string()),
    }
}

/// Translate a descriptor into the Engine's container-creation request.
///
/// `ExposedPorts` is keyed `"<port>/tcp"`; each exposed port gets a
/// `PortBindings` entry on `0.0.0.0` with either an empty host port (daemon
/// assigns) or the fixed one. Bind mounts become `Binds` strings, named
/// volumes become `Mounts` entries; on a conflicting target the Engine
/// applies `Mounts` last, so named volumes win.
pub(crate) fn to_engine_config(descriptor: &ContainerDescriptor) -> Config<String> {
    let env: Vec<String> = descriptor
        .env
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for mapping in &descriptor.exposed_ports {
        let key = format!("{}/tcp", mapping.container_port);
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(
                    mapping
                        .host_port
                        .map(|p| p.to_string())
                        .unwrap_or_default(),
                ),
            }]),
        );
    }

    let binds: Vec<String> = descriptor
        .bind_mounts
        .iter()
        .map(|m| format!("{}:{}:{}", m.host_src, m.container_dest, m.mode.as_str()))
        .collect();

    let mounts: Vec<Mount> = descriptor
        .bind_volumes
        .iter()
        .map(|v| Mount {
            target: Some(v.container_dest.clone()),
            source: Some(v.volume_name.clone()),
            typ: Some(MountTypeEnum::VOLUME),
            read_only: Some(v.read_only),
            ..Default::default()
        })
        .collect();

    let host_config = HostConfig {
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        binds: (!binds.is_empty()).then_some(binds),
        mounts: (!mounts.is_empty()).then_some(mounts),
        auto_remove: Some(descriptor.auto_remove),
        privileged: Some(descriptor.privileged),
        ..Default::default()
    };

    Config {
        image: Some(descriptor.image.clone()),
        cmd: descriptor.cmd.clone(),
        env: Some(env),
        labels: Some(descriptor.labels.clone().into_iter().collect()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Split inspect `Config.Env` entries on the first `=`.
pub(crate) fn parse_env(entries: &[String]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Derive resolved ports from inspect `NetworkSettings.Ports`.
///
/// Non-TCP specs and unbound ports are skipped.
pub(crate) fn parse_ports(
    ports: &HashMap<String, Option<Vec<PortBinding>>>,
) -> Vec<ResolvedPort> {
    let mut resolved: Vec<ResolvedPort> = ports
        .iter()
        .filter_map(|(spec, bindings)| {
            let container_port: u16 = spec.strip_suffix("/tcp")?.parse().ok()?;
            let host_port: u16 = bindings
                .as_ref()?
                .iter()
                .find_map(|b| b.host_port.as_deref())?
                .parse()
                .ok()?;
            Some(ResolvedPort {
                container_port,
                host_port,
            })
        })
        .collect();
    resolved.sort_by_key(|p| p.container_port);
    resolved
}

/// Derive a handle from an inspect response.
pub(crate) fn handle_from_inspect(inspect: ContainerInspectResponse) -> ContainerHandle {
    let config = inspect.config.unwrap_or_default();
    let ports = inspect
        .network_settings
        .and_then(|net| net.ports)
        .map(|ports| parse_ports(&ports))
        .unwrap_or_default();

    ContainerHandle {
        id: inspect.id.unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        ports,
        env: parse_env(&config.env.unwrap_or_default()),
        labels: config.labels.map(|l| l.into_iter().collect()).unwrap_or_default(),
    }
}

/// Wrap a single file into the tar stream the archive endpoint consumes.
pub(crate) fn file_archive(path: &str, contents: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, path.trim_start_matches('/'), contents)?;
    builder.into_inner()
}

impl DockerApi for EngineClient {
    fn pull_image<'a>(
        &'a self,
        image: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            debug!(image = %image, "pulling image");

            let options = CreateImageOptions {
                from_image: image,
                ..Default::default()
            };
            let mut stream = self.docker.create_image(Some(options), None, None);

            while let Some(progress) = stream.next().await {
                match progress {
                    Ok(info) => {
                        if let Some(message) = info.error {
                            return Err(Error::Engine(message));
                        }
                        if let Some(status) = info.status {
                            trace!(image = %image, status = %status, "pull progress");
                        }
                    }
                    Err(e) => {
                        return Err(Error::PullImageFailed {
                            image: image.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            debug!(image = %image, "image pulled");
            Ok(())
        })
    }

    fn create_container<'a>(
        &'a self,
        descriptor: &'a ContainerDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            debug!(image = %descriptor.image, "creating container");

            let config = to_engine_config(descriptor);
            let response = self
                .docker
                .create_container::<String, String>(None, config)
                .await
                .map_err(|e| match e {
                    bollard::errors::Error::DockerResponseServerError {
                        status_code,
                        message,
                    } => Error::Http {
                        status: status_code,
                        message,
                    },
                    other => Error::CreateContainerFailed(other.to_string()),
                })?;

            for warning in &response.warnings {
                warn!(id = %response.id, warning = %warning, "engine warning on create");
            }

            debug!(id = %response.id, image = %descriptor.image, "container created");
            Ok(response.id)
        })
    }

    fn start_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| match e {
                    bollard::errors::Error::DockerResponseServerError {
                        status_code,
                        message,
                    } => Error::Http {
                        status: status_code,
                        message,
                    },
                    other => Error::StartContainerFailed {
                        id: id.to_string(),
                        reason: other.to_string(),
                    },
                })?;

            debug!(id = %id, "container started");
            Ok(())
        })
    }

    fn kill_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.docker
                .kill_container(id, None::<KillContainerOptions<String>>)
                .await
                .map_err(engine_error)?;

            debug!(id = %id, "container killed");
            Ok(())
        })
    }

    fn remove_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.docker
                .remove_container(id, None::<RemoveContainerOptions>)
                .await
                .map_err(engine_error)?;

            debug!(id = %id, "container removed");
            Ok(())
        })
    }

    fn get_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerHandle>> + Send + 'a>> {
        Box::pin(async move {
            let inspect = self
                .docker
                .inspect_container(id, None::<InspectContainerOptions>)
                .await
                .map_err(engine_error)?;

            Ok(handle_from_inspect(inspect))
        })
    }

    fn create_exec<'a>(
        &'a self,
        id: &'a str,
        cmd: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let options = CreateExecOptions {
                cmd: Some(cmd.to_vec()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            };

            let exec = self
                .docker
                .create_exec(id, options)
                .await
                .map_err(engine_error)?;

            Ok(exec.id)
        })
    }

    fn start_exec<'a>(
        &'a self,
        exec_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            // Detached: completion is observed by polling inspect_exec.
            let options = StartExecOptions {
                detach: true,
                ..Default::default()
            };

            self.docker
                .start_exec(exec_id, Some(options))
                .await
                .map_err(engine_error)?;

            Ok(())
        })
    }

    fn inspect_exec<'a>(
        &'a self,
        exec_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecStatus>> + Send + 'a>> {
        Box::pin(async move {
            let inspect = self
                .docker
                .inspect_exec(exec_id)
                .await
                .map_err(engine_error)?;

            Ok(ExecStatus {
                running: inspect.running.unwrap_or(false),
                exit_code: inspect.exit_code,
            })
        })
    }

    fn stdout_logs<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let options = LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: "all".to_string(),
                follow: false,
                ..Default::default()
            };

            let mut stream = self.docker.logs(id, Some(options));
            let mut output = Vec::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(line) => output.extend_from_slice(&line.into_bytes()),
                    Err(e) => return Err(engine_error(e)),
                }
            }

            Ok(output)
        })
    }

    fn bridge_gateway(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let network = self
                .docker
                .inspect_network("bridge", None::<InspectNetworkOptions<String>>)
                .await
                .map_err(engine_error)?;

            network
                .ipam
                .and_then(|ipam| ipam.config)
                .and_then(|configs| configs.into_iter().find_map(|c| c.gateway))
                .ok_or(Error::NoGateway)
        })
    }

    fn put_file<'a>(
        &'a self,
        id: &'a str,
        path: &'a str,
        contents: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let archive = file_archive(path, contents)
                .map_err(|e| Error::Engine(format!("failed to build archive for {path}: {e}")))?;

            let options = UploadToContainerOptions {
                path: "/",
                ..Default::default()
            };

            self.docker
                .upload_to_container(id, Some(options), archive.into())
                .await
                .map_err(engine_error)?;

            debug!(id = %id, path = %path, "file uploaded");
            Ok(())
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.docker
                .ping()
                .await
                .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BindMode;

    #[test]
    fn test_engine_config_exposed_ports_and_bindings() {
        let descriptor = ContainerDescriptor::new("redis:7.2")
            .with_exposed_port(6379)
            .with_fixed_port(5432, 5433);
        let config = to_engine_config(&descriptor);

        let exposed = config.exposed_ports.expect("exposed ports");
        assert!(exposed.contains_key("6379/tcp"));
        assert!(exposed.contains_key("5432/tcp"));

        let bindings = config
            .host_config
            .expect("host config")
            .port_bindings
            .expect("port bindings");

        let ephemeral = bindings["6379/tcp"].as_ref().expect("binding");
        assert_eq!(ephemeral[0].host_ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(ephemeral[0].host_port.as_deref(), Some(""));

        let fixed = bindings["5432/tcp"].as_ref().expect("binding");
        assert_eq!(fixed[0].host_port.as_deref(), Some("5433"));
    }

    #[test]
    fn test_engine_config_binds_and_mounts() {
        let descriptor = ContainerDescriptor::new("postgres:15.4")
            .with_bind_mount("/var/run/docker.sock", "/var/run/docker.sock", BindMode::Rw)
            .with_bind_mount("/etc/conf", "/conf", BindMode::Ro)
            .with_volume("pgdata", "/var/lib/postgresql/data", true);
        let config = to_engine_config(&descriptor);
        let host_config = config.host_config.expect("host config");

        assert_eq!(
            host_config.binds.expect("binds"),
            vec![
                "/var/run/docker.sock:/var/run/docker.sock:rw".to_string(),
                "/etc/conf:/conf:ro".to_string(),
            ]
        );

        let mounts = host_config.mounts.expect("mounts");
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::VOLUME));
        assert_eq!(mounts[0].source.as_deref(), Some("pgdata"));
        assert_eq!(mounts[0].read_only, Some(true));
    }

    #[test]
    fn test_engine_config_env_stable_under_insertion_order() {
        let a = ContainerDescriptor::new("mysql:8")
            .with_env("MYSQL_USER", "test")
            .with_env("MYSQL_DATABASE", "test");
        let b = ContainerDescriptor::new("mysql:8")
            .with_env("MYSQL_DATABASE", "test")
            .with_env("MYSQL_USER", "test");

        assert_eq!(to_engine_config(&a).env, to_engine_config(&b).env);
    }

    #[test]
    fn test_engine_config_omits_empty_sections() {
        let config = to_engine_config(&ContainerDescriptor::new("alpine:3.19"));
        assert!(config.exposed_ports.is_none());
        let host_config = config.host_config.expect("host config");
        assert!(host_config.port_bindings.is_none());
        assert!(host_config.binds.is_none());
        assert!(host_config.mounts.is_none());
    }

    #[test]
    fn test_parse_env_splits_on_first_equals() {
        let env = parse_env(&[
            "PATH=/usr/bin:/bin".to_string(),
            "OPTS=a=b=c".to_string(),
            "garbage".to_string(),
        ]);
        assert_eq!(env["PATH"], "/usr/bin:/bin");
        assert_eq!(env["OPTS"], "a=b=c");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_parse_ports_strips_tcp_and_skips_unbound() {
        let mut ports: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        ports.insert(
            "6379/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("49153".to_string()),
            }]),
        );
        ports.insert("9999/udp".to_string(), None);
        ports.insert("8080/tcp".to_string(), None);

        let resolved = parse_ports(&ports);
        assert_eq!(
            resolved,
            vec![ResolvedPort {
                container_port: 6379,
                host_port: 49153
            }]
        );
    }

    #[test]
    fn test_file_archive_round_trips() {
        let archive = file_archive("/opt/start.sh", b"#!/bin/sh\n").expect("archive");

        let mut reader = tar::Archive::new(archive.as_slice());
        let mut entries = reader.entries().expect("entries");
        let entry = entries.next().expect("one entry").expect("entry");
        assert_eq!(
            entry.path().expect("path").to_string_lossy(),
            "opt/start.sh"
        );
        assert_eq!(entry.header().size().expect("size"), 10);
    }
}

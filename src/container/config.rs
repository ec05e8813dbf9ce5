//! Container data model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Container status as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container is created but has never run
    Created,
    /// Container is running
    Running,
    /// Container processes are frozen
    Paused,
    /// Container is restarting
    Restarting,
    /// Container has stopped
    #[serde(rename = "exited")]
    Stopped,
    /// Container is being removed
    Removing,
    /// Container is in an error state
    Dead,
}

impl ContainerStatus {
    /// Whether the container has live processes
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Restarting)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Restarting => write!(f, "restarting"),
            ContainerStatus::Stopped => write!(f, "exited"),
            ContainerStatus::Removing => write!(f, "removing"),
            ContainerStatus::Dead => write!(f, "dead"),
        }
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ContainerStatus::Created),
            "running" => Ok(ContainerStatus::Running),
            "paused" => Ok(ContainerStatus::Paused),
            "restarting" => Ok(ContainerStatus::Restarting),
            "exited" | "stopped" => Ok(ContainerStatus::Stopped),
            "removing" => Ok(ContainerStatus::Removing),
            "dead" => Ok(ContainerStatus::Dead),
            other => Err(format!("unknown container state: {}", other)),
        }
    }
}

/// Network protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Sctp => write!(f, "sctp"),
        }
    }
}

/// One container port published on one host address/port pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortBinding {
    /// Publish a TCP port on the same port number of `host_ip`
    pub fn tcp(host_ip: &str, port: u16) -> Self {
        Self {
            host_ip: host_ip.to_string(),
            host_port: port,
            container_port: port,
            protocol: Protocol::Tcp,
        }
    }

    /// Engine key for the container side, e.g. `9000/tcp`
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

/// What to create: an image reference and its published ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image tag or identifier
    pub image: String,
    port_bindings: Vec<PortBinding>,
}

impl ContainerSpec {
    /// Create a spec for `image` with no published ports
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            port_bindings: Vec::new(),
        }
    }

    /// Publish a port, replacing any binding for the same container port
    pub fn bind(mut self, binding: PortBinding) -> Self {
        self.port_bindings
            .retain(|existing| existing.container_key() != binding.container_key());
        self.port_bindings.push(binding);
        self
    }

    pub fn port_bindings(&self) -> &[PortBinding] {
        &self.port_bindings
    }
}

/// Snapshot of one container as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// Engine-assigned identifier
    pub id: String,
    /// Identifier of the image the container was created from
    pub image_id: String,
    /// Published ports
    pub ports: Vec<PortBinding>,
    /// Current status
    pub status: ContainerStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_engine_names() {
        for name in ["created", "running", "paused", "restarting", "exited", "removing", "dead"] {
            let status: ContainerStatus = name.parse().unwrap();
            assert_eq!(status.to_string(), name);
        }
        assert!("bogus".parse::<ContainerStatus>().is_err());
    }

    #[test]
    fn test_tcp_binding_key() {
        let binding = PortBinding::tcp("127.0.0.1", 9000);
        assert_eq!(binding.container_key(), "9000/tcp");
        assert_eq!(binding.host_port, 9000);
    }

    #[test]
    fn test_spec_keeps_one_binding_per_container_port() {
        let spec = ContainerSpec::new("img")
            .bind(PortBinding::tcp("127.0.0.1", 9000))
            .bind(PortBinding::tcp("0.0.0.0", 9000))
            .bind(PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: 9000,
                container_port: 9000,
                protocol: Protocol::Udp,
            });

        assert_eq!(spec.port_bindings().len(), 2);
        let tcp = spec
            .port_bindings()
            .iter()
            .find(|b| b.protocol == Protocol::Tcp)
            .unwrap();
        assert_eq!(tcp.host_ip, "0.0.0.0");
    }
}

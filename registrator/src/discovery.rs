use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::service::HealthCheckKind;

/// Which discovery backend the controller registers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscoveryType {
    /// No discovery integration.
    #[default]
    None,
    /// Consul agent, liveness through TTL renewals (and optional gRPC probes).
    Consul,
    /// Kubernetes-native discovery, liveness through kubelet gRPC probes.
    Kubernetes,
}

impl DiscoveryType {
    /// Health checks a descriptor declares when the caller did not pick any.
    pub fn default_health_checks(&self) -> BTreeSet<HealthCheckKind> {
        match self {
            DiscoveryType::None => BTreeSet::new(),
            DiscoveryType::Consul => {
                BTreeSet::from([HealthCheckKind::Ttl, HealthCheckKind::ActiveProbe])
            }
            DiscoveryType::Kubernetes => BTreeSet::from([HealthCheckKind::ActiveProbe]),
        }
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiscoveryType::None => "none",
            DiscoveryType::Consul => "consul",
            DiscoveryType::Kubernetes => "kubernetes",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported service discovery type: {0}")]
pub struct DiscoveryTypeParseError(String);

impl FromStr for DiscoveryType {
    type Err = DiscoveryTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "" | "none" => Ok(DiscoveryType::None),
            "consul" => Ok(DiscoveryType::Consul),
            "k8s" | "kubernetes" => Ok(DiscoveryType::Kubernetes),
            other => Err(DiscoveryTypeParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selector_values() {
        assert_eq!("".parse::<DiscoveryType>(), Ok(DiscoveryType::None));
        assert_eq!("None".parse::<DiscoveryType>(), Ok(DiscoveryType::None));
        assert_eq!("CONSUL".parse::<DiscoveryType>(), Ok(DiscoveryType::Consul));
        assert_eq!("k8s".parse::<DiscoveryType>(), Ok(DiscoveryType::Kubernetes));
        assert_eq!(
            " kubernetes ".parse::<DiscoveryType>(),
            Ok(DiscoveryType::Kubernetes)
        );
        assert_eq!(
            "etcd".parse::<DiscoveryType>(),
            Err(DiscoveryTypeParseError("etcd".to_string()))
        );
    }

    #[test]
    fn default_health_checks_follow_backend() {
        assert!(DiscoveryType::None.default_health_checks().is_empty());
        assert!(DiscoveryType::Consul
            .default_health_checks()
            .contains(&HealthCheckKind::Ttl));
        assert_eq!(
            DiscoveryType::Kubernetes.default_health_checks(),
            BTreeSet::from([HealthCheckKind::ActiveProbe])
        );
    }
}

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use crate::error::RegistratorError;

/// How a discovery backend decides whether an instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthCheckKind {
    /// The registrant renews a heartbeat before a deadline, or is declared unhealthy.
    Ttl,
    /// The backend calls the instance's gRPC health service itself.
    ActiveProbe,
}

impl fmt::Display for HealthCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthCheckKind::Ttl => "ttl",
            HealthCheckKind::ActiveProbe => "active-probe",
        };
        f.write_str(label)
    }
}

impl FromStr for HealthCheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "ttl" => Ok(HealthCheckKind::Ttl),
            "active-probe" | "activeprobe" | "grpc" => Ok(HealthCheckKind::ActiveProbe),
            _ => Err(format!("unknown health check kind: {s}")),
        }
    }
}

/// Record advertised to a discovery backend: how to reach this instance and
/// how to health-check it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub id: String,
    pub address: String,
    pub port: u16,
    pub tags: BTreeSet<String>,
    pub health_checks: BTreeSet<HealthCheckKind>,
}

impl ServiceDescriptor {
    pub fn declares(&self, kind: HealthCheckKind) -> bool {
        self.health_checks.contains(&kind)
    }

    /// Name and ID are what every backend keys registrations on.
    pub fn validate(&self) -> Result<(), RegistratorError> {
        if self.name.trim().is_empty() {
            return Err(RegistratorError::InvalidDescriptor(
                "service name is empty".to_string(),
            ));
        }
        if self.id.trim().is_empty() {
            return Err(RegistratorError::InvalidDescriptor(format!(
                "instance id of service {} is empty",
                self.name
            )));
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), and the endpoint must be reachable too.
    pub fn validate_endpoint(&self) -> Result<(), RegistratorError> {
        self.validate()?;
        if self.address.trim().is_empty() {
            return Err(RegistratorError::InvalidDescriptor(format!(
                "address of {} is empty",
                self.id
            )));
        }
        if self.port == 0 {
            return Err(RegistratorError::InvalidDescriptor(format!(
                "port of {} is 0",
                self.id
            )));
        }
        Ok(())
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn endpoint(&self) -> String {
        if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "ndd-reconciler".to_string(),
            id: "r1".to_string(),
            address: "10.0.0.5".to_string(),
            port: 9999,
            ..Default::default()
        }
    }

    #[test]
    fn empty_name_or_id_is_rejected() {
        assert!(descriptor().validate().is_ok());

        let no_name = ServiceDescriptor {
            name: " ".to_string(),
            ..descriptor()
        };
        assert!(matches!(
            no_name.validate(),
            Err(RegistratorError::InvalidDescriptor(_))
        ));

        let no_id = ServiceDescriptor {
            id: String::new(),
            ..descriptor()
        };
        assert!(matches!(
            no_id.validate(),
            Err(RegistratorError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn endpoint_needs_address_and_port() {
        assert!(descriptor().validate_endpoint().is_ok());

        let no_address = ServiceDescriptor {
            address: String::new(),
            ..descriptor()
        };
        assert!(no_address.validate().is_ok());
        assert!(no_address.validate_endpoint().is_err());

        let no_port = ServiceDescriptor {
            port: 0,
            ..descriptor()
        };
        assert!(no_port.validate_endpoint().is_err());
    }

    #[test]
    fn endpoint_brackets_ipv6() {
        assert_eq!(descriptor().endpoint(), "10.0.0.5:9999");
        let v6 = ServiceDescriptor {
            address: "fd00::5".to_string(),
            ..descriptor()
        };
        assert_eq!(v6.endpoint(), "[fd00::5]:9999");
    }

    #[test]
    fn health_check_kind_round_trips_through_display() {
        for kind in [HealthCheckKind::Ttl, HealthCheckKind::ActiveProbe] {
            assert_eq!(kind.to_string().parse::<HealthCheckKind>(), Ok(kind));
        }
        assert_eq!("GRPC".parse::<HealthCheckKind>(), Ok(HealthCheckKind::ActiveProbe));
        assert!("http".parse::<HealthCheckKind>().is_err());
    }
}

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use health::{HealthMonitor, ServingStatus};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus as WireStatus;
use tonic_health::pb::health_server::Health;
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
use tracing::debug;

type HealthWatchStream = Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send>>;

/// `grpc.health.v1.Health` answered from a [`HealthMonitor`].
///
/// Only the overall status (`""`) and the controller's own service name are
/// known. Watch streams end when `shutdown` is cancelled so they never hold
/// up a graceful server shutdown.
pub struct HealthService {
    monitor: HealthMonitor,
    service_name: String,
    shutdown: CancellationToken,
}

impl HealthService {
    pub fn new(monitor: HealthMonitor, service_name: String, shutdown: CancellationToken) -> Self {
        Self {
            monitor,
            service_name,
            shutdown,
        }
    }

    fn knows(&self, service: &str) -> bool {
        service.is_empty() || service == self.service_name
    }
}

fn response(status: WireStatus) -> HealthCheckResponse {
    HealthCheckResponse {
        status: status as i32,
    }
}

fn to_wire(status: ServingStatus) -> WireStatus {
    match status {
        ServingStatus::Serving => WireStatus::Serving,
        ServingStatus::NotServing => WireStatus::NotServing,
        ServingStatus::Unknown => WireStatus::Unknown,
    }
}

#[tonic::async_trait]
impl Health for HealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        if !self.knows(&service) {
            return Err(Status::not_found(format!("unknown service: {service}")));
        }
        Ok(Response::new(response(to_wire(self.monitor.check()))))
    }

    type WatchStream = HealthWatchStream;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;
        let cancel = self.shutdown.child_token();
        debug!(service = %service, "health watch opened");

        if !self.knows(&service) {
            // Unknown services stay open on SERVICE_UNKNOWN until shutdown
            let first = stream::once(async {
                Ok::<_, Status>(response(WireStatus::ServiceUnknown))
            });
            let hold = stream::once(async move { cancel.cancelled().await })
                .filter_map(|()| async { None });
            return Ok(Response::new(Box::pin(first.chain(hold))));
        }

        let updates = self
            .monitor
            .watch(cancel)
            .map(|status| Ok(response(to_wire(status))));
        Ok(Response::new(Box::pin(updates)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use health::HealthRegistry;

    fn service() -> (HealthService, CancellationToken) {
        let shutdown = CancellationToken::new();
        let monitor = HealthMonitor::new(HealthRegistry::new("controller"));
        let service = HealthService::new(monitor, "ndd-reconciler".to_string(), shutdown.clone());
        (service, shutdown)
    }

    fn request(service: &str) -> Request<HealthCheckRequest> {
        Request::new(HealthCheckRequest {
            service: service.to_string(),
        })
    }

    #[tokio::test]
    async fn check_answers_known_names() {
        let (service, _shutdown) = service();
        for name in ["", "ndd-reconciler"] {
            let status = service
                .check(request(name))
                .await
                .expect("check")
                .into_inner()
                .status;
            assert_eq!(status, WireStatus::Serving as i32);
        }

        let err = service
            .check(request("other"))
            .await
            .expect_err("unknown service");
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn watch_ends_on_shutdown() {
        let (service, shutdown) = service();
        let mut updates = service
            .watch(request(""))
            .await
            .expect("watch")
            .into_inner();

        let first = updates.next().await.expect("first update").expect("ok");
        assert_eq!(first.status, WireStatus::Serving as i32);

        shutdown.cancel();
        assert!(updates.next().await.is_none());
    }

    #[tokio::test]
    async fn watch_unknown_service_reports_service_unknown() {
        let (service, shutdown) = service();
        let mut updates = service
            .watch(request("other"))
            .await
            .expect("watch")
            .into_inner();

        let first = updates.next().await.expect("first update").expect("ok");
        assert_eq!(first.status, WireStatus::ServiceUnknown as i32);

        shutdown.cancel();
        assert!(updates.next().await.is_none());
    }
}

mod common;

use std::sync::Arc;
use std::time::Duration;

use health::ComponentStatus;
use tokio_util::sync::CancellationToken;
use tonic::Code;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use common::{pod_identity, test_options, SpyRegistrator};
use reconciler_controller::{Options, ReconcilerController};

async fn running_controller(options: Options) -> (ReconcilerController, String) {
    let controller = ReconcilerController::with_registrator(
        &CancellationToken::new(),
        options,
        Arc::new(SpyRegistrator::default()),
    )
    .expect("controller");
    controller.start(&pod_identity()).await.expect("start");
    let addr = controller.local_addr().await.expect("bound");
    (controller, format!("http://{addr}"))
}

fn request(service: &str) -> HealthCheckRequest {
    HealthCheckRequest {
        service: service.to_string(),
    }
}

#[tokio::test]
async fn check_reports_serving_for_known_services() {
    let (controller, endpoint) = running_controller(test_options()).await;
    let mut client = HealthClient::new(
        tonic::transport::Endpoint::new(endpoint)
            .expect("endpoint")
            .connect()
            .await
            .expect("connect"),
    );

    for service in ["", "ndd-reconciler"] {
        let status = client
            .check(request(service))
            .await
            .expect("check")
            .into_inner()
            .status;
        assert_eq!(status, ServingStatus::Serving as i32);
    }

    let err = client
        .check(request("someone-else"))
        .await
        .expect_err("unknown service");
    assert_eq!(err.code(), Code::NotFound);

    controller.stop().await.expect("stop");
}

#[tokio::test]
async fn watch_follows_component_health() {
    let options = Options {
        health_poll_interval: Duration::from_millis(20),
        ..test_options()
    };
    let (controller, endpoint) = running_controller(options).await;
    let handle = controller
        .health()
        .registry()
        .register("reconcile-loop", Duration::from_secs(30))
        .await;
    handle.report_healthy().await;
    // Status updates go through the registry's pump asynchronously
    while !controller.health().registry().get_status().healthy {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut client = HealthClient::new(
        tonic::transport::Endpoint::new(endpoint)
            .expect("endpoint")
            .connect()
            .await
            .expect("connect"),
    );
    let mut updates = client
        .watch(request(""))
        .await
        .expect("watch")
        .into_inner();

    let first = updates.message().await.expect("stream").expect("update");
    assert_eq!(first.status, ServingStatus::Serving as i32);

    handle.report_status(ComponentStatus::Unhealthy).await;
    let next = updates.message().await.expect("stream").expect("update");
    assert_eq!(next.status, ServingStatus::NotServing as i32);

    controller.stop().await.expect("stop");
    let end = tokio::time::timeout(Duration::from_secs(5), updates.message())
        .await
        .expect("stream ends on shutdown");
    assert!(!matches!(end, Ok(Some(_))));
}

//! Kubernetes-native discovery. The controller's own pod is labelled and
//! annotated so selectors and tooling can find it; liveness is left to the
//! kubelet probing the gRPC health service.

mod client;
mod registrator;

pub use client::{HttpPodApi, PodApi};
pub use registrator::{KubernetesRegistrator, ANNOTATION_PREFIX, SERVICE_LABEL};

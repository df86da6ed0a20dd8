//! Cluster-pod snapshot source
//!
//! Lists pods through the Kubernetes API and turns every running,
//! registrar-labelled pod into registrations, one per routing name the pod
//! advertises.

use crate::poller::SnapshotSource;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::{api::ListParams, Api, Client};
use registrar_core::{BackendAddress, CoreError, Registration, Result, Snapshot};
use tracing::{debug, warn};

/// Label carrying the logical service a pod belongs to.
pub const SERVICE_LABEL: &str = "registrar.io/service";
/// Label carrying the instance identity; falls back to the pod name.
pub const INSTANCE_LABEL: &str = "registrar.io/instance";
/// Annotation holding a JSON string array of routing names.
pub const ROUTING_NAMES_ANNOTATION: &str = "registrar.io/routing-names";
/// Injected proxy container that never carries the backend port.
pub const SIDECAR_CONTAINER: &str = "istio-proxy";

pub struct ClusterSource {
    client: Client,
    namespace: Option<String>,
}

impl ClusterSource {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }
}

#[async_trait]
impl SnapshotSource for ClusterSource {
    fn name(&self) -> &'static str {
        "cluster"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let pods: Api<Pod> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = pods.list(&ListParams::default()).await?;
        debug!("Listed {} pods", list.items.len());

        let mut snapshot = Snapshot::new();
        for pod in list.items.iter().filter(|p| is_running(p)) {
            // A defective pod is excluded; the rest of the fetch goes on.
            match registrations_from_pod(pod) {
                Ok(regs) => snapshot.extend(regs),
                Err(e) => warn!("Skipping pod: {}", e),
            }
        }
        Ok(snapshot)
    }
}

/// Only pods in the Running phase are registered.
pub fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

/// Turn one pod into its registrations, one per advertised routing name.
pub fn registrations_from_pod(pod: &Pod) -> Result<Vec<Registration>> {
    let pod_name = pod
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "<unnamed>".to_string());

    let labels = pod.metadata.labels.clone().unwrap_or_default();
    let service = labels
        .get(SERVICE_LABEL)
        .cloned()
        .ok_or_else(|| CoreError::MissingPodField(pod_name.clone(), "service label"))?;
    let instance = labels
        .get(INSTANCE_LABEL)
        .cloned()
        .unwrap_or_else(|| pod_name.clone());

    let annotations = pod.metadata.annotations.clone().unwrap_or_default();
    let raw_names = annotations
        .get(ROUTING_NAMES_ANNOTATION)
        .ok_or_else(|| CoreError::MissingPodField(pod_name.clone(), "routing-names annotation"))?;
    let routing_names: Vec<String> = serde_json::from_str(raw_names)
        .map_err(|e| CoreError::InvalidRoutingNames(pod_name.clone(), e))?;

    let ip = pod
        .status
        .as_ref()
        .and_then(|s| s.pod_ip.clone())
        .ok_or_else(|| CoreError::MissingPodField(pod_name.clone(), "pod IP"))?;

    let spec = pod
        .spec
        .as_ref()
        .ok_or_else(|| CoreError::MissingPodField(pod_name.clone(), "spec"))?;
    let node = spec.node_name.clone().unwrap_or_default();
    let port = backend_port(spec)
        .ok_or_else(|| CoreError::MissingPodField(pod_name.clone(), "container port"))?;

    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let address = BackendAddress {
        host: pod_name,
        namespace,
        node,
        ip,
        port,
    };

    Ok(routing_names
        .into_iter()
        .map(|registration_name| Registration {
            service: service.clone(),
            instance: instance.clone(),
            address: address.clone(),
            registration_name,
        })
        .collect())
}

/// First declared port of the first non-sidecar container.
fn backend_port(spec: &PodSpec) -> Option<u16> {
    spec.containers
        .iter()
        .filter(|c| c.name != SIDECAR_CONTAINER)
        .find_map(|c| {
            c.ports
                .as_ref()
                .and_then(|ports| ports.first())
                .map(|p| p.container_port as u16)
        })
}

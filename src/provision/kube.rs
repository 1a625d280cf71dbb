//! Kubernetes implementation of the cluster orchestration seam
//!
//! One Deployment (replicas = 1) plus one NodePort Service per session, both
//! named after the unit and labeled `app=arena-server,session_id=<id>` so
//! instances can be listed back by selector.

use crate::provision::cluster::{ClusterApi, ClusterError, UnitInstance, UnitSpec};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use serde_json::json;

const APP_LABEL: &str = "arena-server";

fn selector_for(session_id: &str) -> String {
    format!("app={APP_LABEL},session_id={session_id}")
}

fn map_kube_error(name: &str, error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(ae) if ae.code == 409 => ClusterError::AlreadyExists {
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound {
            name: name.to_string(),
        },
        other => ClusterError::Api {
            message: other.to_string(),
        },
    }
}

fn build_error(message: impl std::fmt::Display) -> ClusterError {
    ClusterError::Api {
        message: format!("Failed to build resource body: {message}"),
    }
}

/// Cluster API over a Kubernetes client.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    namespace: String,
    image: String,
}

impl KubeClusterApi {
    /// Connect using in-cluster configuration, falling back to the local
    /// kubeconfig.
    pub async fn connect(namespace: String, image: String) -> Result<Self, ClusterError> {
        let client = Client::try_default().await.map_err(|e| ClusterError::Api {
            message: format!("Failed to initialize Kubernetes client: {e}"),
        })?;
        Ok(Self {
            client,
            namespace,
            image,
        })
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn create_unit(&self, spec: &UnitSpec) -> Result<(), ClusterError> {
        let labels = json!({ "app": APP_LABEL, "session_id": spec.session_id });
        let players_json =
            serde_json::to_string(&spec.players).map_err(build_error)?;

        let deployment: Deployment = serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": spec.name,
                "namespace": self.namespace,
                "labels": labels.clone(),
            },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": labels.clone() },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "containers": [{
                            "name": APP_LABEL,
                            "image": self.image,
                            "imagePullPolicy": "IfNotPresent",
                            "ports": [{ "containerPort": spec.port }],
                            "env": [
                                { "name": "SESSION_ID", "value": spec.session_id },
                                { "name": "PLAYERS", "value": players_json },
                                { "name": "PORT", "value": spec.port.to_string() },
                            ],
                        }],
                        "restartPolicy": "Always",
                    },
                },
            },
        }))
        .map_err(build_error)?;

        self.deployments()
            .create(&PostParams::default(), &deployment)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(&spec.name, e))
    }

    async fn delete_unit(&self, name: &str) -> Result<(), ClusterError> {
        self.deployments()
            .delete(name, &DeleteParams::foreground())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(name, e))
    }

    async fn create_endpoint(&self, spec: &UnitSpec) -> Result<(), ClusterError> {
        let labels = json!({ "app": APP_LABEL, "session_id": spec.session_id });

        let service: Service = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": spec.name,
                "namespace": self.namespace,
                "labels": labels.clone(),
            },
            "spec": {
                "type": "NodePort",
                "selector": labels,
                "ports": [{
                    "port": spec.port,
                    "targetPort": spec.port,
                    "protocol": "TCP",
                }],
            },
        }))
        .map_err(build_error)?;

        self.services()
            .create(&PostParams::default(), &service)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(&spec.name, e))
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), ClusterError> {
        self.services()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(name, e))
    }

    async fn endpoint_port(&self, name: &str) -> Result<u16, ClusterError> {
        let service = self
            .services()
            .get(name)
            .await
            .map_err(|e| map_kube_error(name, e))?;

        let node_port = service
            .spec
            .and_then(|s| s.ports)
            .and_then(|ports| ports.into_iter().next())
            .and_then(|p| p.node_port)
            .unwrap_or(0);
        Ok(u16::try_from(node_port).unwrap_or(0))
    }

    async fn unit_instances(&self, session_id: &str) -> Result<Vec<UnitInstance>, ClusterError> {
        let params = ListParams::default().labels(&selector_for(session_id));
        let pods = self
            .pods()
            .list(&params)
            .await
            .map_err(|e| map_kube_error(session_id, e))?;

        Ok(pods
            .items
            .into_iter()
            .map(|pod| {
                let status = pod.status.unwrap_or_default();
                let running = status.phase.as_deref() == Some("Running");
                let ready = status
                    .container_statuses
                    .unwrap_or_default()
                    .iter()
                    .any(|cs| cs.ready);
                UnitInstance { running, ready }
            })
            .collect())
    }

    async fn list_unit_names(&self) -> Result<Vec<String>, ClusterError> {
        let params = ListParams::default().labels(&format!("app={APP_LABEL}"));
        let deployments = self
            .deployments()
            .list(&params)
            .await
            .map_err(|e| map_kube_error(APP_LABEL, e))?;

        Ok(deployments
            .items
            .into_iter()
            .filter_map(|d| d.metadata.name)
            .collect())
    }

    async fn node_address(&self) -> Result<Option<String>, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error("nodes", e))?;

        for node in list.items {
            let addresses = node
                .status
                .and_then(|s| s.addresses)
                .unwrap_or_default();
            for address in addresses {
                if address.type_ == "ExternalIP" || address.type_ == "InternalIP" {
                    return Ok(Some(address.address));
                }
            }
        }
        Ok(None)
    }
}

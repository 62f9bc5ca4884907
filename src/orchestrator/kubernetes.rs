//! Kubernetes-backed service registry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::{debug, instrument, warn};

use crate::error::OrchestratorError;

use super::{ServiceData, ServiceRegistry};

/// Registry talking to a Kubernetes API server.
#[derive(Clone)]
pub struct KubeRegistry {
    client: Client,
}

impl KubeRegistry {
    /// Connect using `kubeconfig`, or kube's inference (KUBECONFIG, ~/.kube/config, in-cluster).
    pub async fn connect(kubeconfig: Option<&str>) -> Result<Self, OrchestratorError> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };

        Ok(Self::from_client(client))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// ClusterIP service selecting pods labelled `app=<name>` on one port.
pub fn build_service(data: &ServiceData) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(data.name.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([("app".to_string(), data.name.clone())])),
            ports: Some(vec![ServicePort {
                port: data.port,
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Project a service object onto name, ClusterIP and first port.
pub fn service_data(service: &Service) -> Result<ServiceData, OrchestratorError> {
    let name = service.metadata.name.clone().unwrap_or_default();
    let spec = service.spec.as_ref();

    let port = spec
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|port| port.port)
        .ok_or_else(|| OrchestratorError::MissingPort(name.clone()))?;

    Ok(ServiceData {
        ip: spec
            .and_then(|spec| spec.cluster_ip.clone())
            .unwrap_or_default(),
        name,
        port,
    })
}

fn map_kube_error(error: kube::Error, namespace: &str, name: &str) -> OrchestratorError {
    match &error {
        kube::Error::Api(response) if response.code == 404 => OrchestratorError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => OrchestratorError::AlreadyExists {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        _ => OrchestratorError::Kube(error),
    }
}

#[async_trait]
impl ServiceRegistry for KubeRegistry {
    #[instrument(skip(self, service), fields(service = %service.name))]
    async fn create(
        &self,
        namespace: &str,
        service: &ServiceData,
    ) -> Result<ServiceData, OrchestratorError> {
        let created = self
            .api(namespace)
            .create(&PostParams::default(), &build_service(service))
            .await
            .map_err(|e| map_kube_error(e, namespace, &service.name))?;

        debug!("Service created");
        service_data(&created)
    }

    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, name: &str) -> Result<ServiceData, OrchestratorError> {
        let service = self
            .api(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, namespace, name))?;

        service_data(&service)
    }

    #[instrument(skip(self))]
    async fn list(&self, namespace: &str) -> Result<Vec<ServiceData>, OrchestratorError> {
        let services = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(OrchestratorError::Kube)?;

        Ok(services
            .items
            .iter()
            .filter_map(|service| match service_data(service) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!("Skipping service: {}", e);
                    None
                }
            })
            .collect())
    }
}

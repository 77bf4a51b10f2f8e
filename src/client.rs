//! Kubernetes API seam
//!
//! Everything the controller and the orchestrators do against the cluster
//! goes through [`ClusterApi`], so the lifecycle logic can be exercised with
//! mocks and an in-memory store.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, CustomResourceExt, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::{SlurmCluster, SlurmClusterStatus};
use crate::names::FIELD_MANAGER;
use crate::Error;

/// Kinds of object in a cluster's derived resource set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// core/v1 Namespace
    Namespace,
    /// core/v1 ConfigMap
    ConfigMap,
    /// apps/v1 DaemonSet
    DaemonSet,
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
    /// core/v1 Service
    Service,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Namespace => "Namespace",
            Self::ConfigMap => "ConfigMap",
            Self::DaemonSet => "DaemonSet",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::Service => "Service",
        };
        f.write_str(s)
    }
}

/// Identity of one derived object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    /// Object kind
    pub kind: ResourceKind,
    /// Object name
    pub name: String,
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl ResourceRef {
    /// A namespaced object
    pub fn namespaced(kind: ResourceKind, name: impl Into<String>, namespace: &str) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: Some(namespace.to_string()),
        }
    }

    /// A Namespace object
    pub fn namespace(name: &str) -> Self {
        Self {
            kind: ResourceKind::Namespace,
            name: name.to_string(),
            namespace: None,
        }
    }

    fn namespace_or_err(&self) -> Result<&str, Error> {
        self.namespace
            .as_deref()
            .ok_or_else(|| Error::internal(format!("{} {} has no namespace", self.kind, self.name)))
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A fully built object ready to be created
#[derive(Clone, Debug, PartialEq)]
pub enum DerivedObject {
    /// Namespace
    Namespace(Namespace),
    /// ConfigMap
    ConfigMap(ConfigMap),
    /// DaemonSet
    DaemonSet(DaemonSet),
    /// Deployment
    Deployment(Deployment),
    /// StatefulSet
    StatefulSet(StatefulSet),
    /// Service
    Service(Service),
}

impl DerivedObject {
    /// Identity of the object
    pub fn resource_ref(&self) -> ResourceRef {
        let (kind, meta) = match self {
            Self::Namespace(o) => (ResourceKind::Namespace, o.meta()),
            Self::ConfigMap(o) => (ResourceKind::ConfigMap, o.meta()),
            Self::DaemonSet(o) => (ResourceKind::DaemonSet, o.meta()),
            Self::Deployment(o) => (ResourceKind::Deployment, o.meta()),
            Self::StatefulSet(o) => (ResourceKind::StatefulSet, o.meta()),
            Self::Service(o) => (ResourceKind::Service, o.meta()),
        };
        ResourceRef {
            kind,
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone(),
        }
    }

    /// Labels carried by the object
    pub fn labels(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Namespace(o) => o.labels(),
            Self::ConfigMap(o) => o.labels(),
            Self::DaemonSet(o) => o.labels(),
            Self::Deployment(o) => o.labels(),
            Self::StatefulSet(o) => o.labels(),
            Self::Service(o) => o.labels(),
        }
    }
}

/// Trait abstracting Kubernetes operations used by the operator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List SlurmCluster records across all namespaces
    async fn list_clusters(&self) -> Result<Vec<SlurmCluster>, Error>;

    /// Write the status subresource of a record
    async fn patch_status(
        &self,
        cluster: &SlurmCluster,
        status: &SlurmClusterStatus,
    ) -> Result<(), Error>;

    /// Replace the finalizer list of a record
    async fn set_finalizers(
        &self,
        cluster: &SlurmCluster,
        finalizers: Vec<String>,
    ) -> Result<(), Error>;

    /// List every node in the cluster
    async fn list_nodes(&self) -> Result<Vec<Node>, Error>;

    /// Fetch one node
    async fn get_node(&self, name: &str) -> Result<Node, Error>;

    /// Replace a node, guarded by its resourceVersion
    async fn replace_node(&self, node: &Node) -> Result<Node, Error>;

    /// Whether the object exists
    async fn exists(&self, target: &ResourceRef) -> Result<bool, Error>;

    /// Create the object
    async fn create(&self, object: &DerivedObject) -> Result<(), Error>;

    /// Create or overwrite the object with server-side apply
    async fn apply(&self, object: &DerivedObject) -> Result<(), Error>;

    /// Names of the objects of `kind` in `namespace` matching a label selector
    async fn list_names(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error>;

    /// Delete the object; deleting an absent object succeeds
    async fn delete(&self, target: &ResourceRef) -> Result<(), Error>;
}

/// Create an object, treating AlreadyExists as success
///
/// Returns `true` when the object was created by this call.
pub async fn create_if_absent(api: &dyn ClusterApi, object: &DerivedObject) -> Result<bool, Error> {
    match api.create(object).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_already_exists() => {
            debug!(resource = %object.resource_ref(), "already exists");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Merge patch body for the status subresource
///
/// `message` is always sent, as null once cleared, so a merge patch removes
/// the previous reason from the live object.
pub fn status_patch(status: &SlurmClusterStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "state": status.state,
            "message": status.message,
        }
    })
}

/// Real implementation backed by a kube Client
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Create a new KubeClusterApi wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn exists_in<K>(api: Api<K>, name: &str) -> Result<bool, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await?.is_some())
}

async fn create_in<K>(api: Api<K>, object: &K) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    api.create(&PostParams::default(), object).await?;
    Ok(())
}

async fn apply_in<K>(api: Api<K>, object: &K) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    api.patch(
        &object.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(object),
    )
    .await?;
    Ok(())
}

async fn names_in<K>(api: Api<K>, selector: &str) -> Result<Vec<String>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let list = api.list(&ListParams::default().labels(selector)).await?;
    Ok(list.items.iter().map(|o| o.name_any()).collect())
}

async fn delete_in<K>(api: Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_clusters(&self) -> Result<Vec<SlurmCluster>, Error> {
        let api: Api<SlurmCluster> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_status(
        &self,
        cluster: &SlurmCluster,
        status: &SlurmClusterStatus,
    ) -> Result<(), Error> {
        let api: Api<SlurmCluster> =
            Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());

        api.patch_status(
            &cluster.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch(status)),
        )
        .await?;

        Ok(())
    }

    async fn set_finalizers(
        &self,
        cluster: &SlurmCluster,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<SlurmCluster> =
            Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });

        api.patch(
            &cluster.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn replace_node(&self, node: &Node) -> Result<Node, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api
            .replace(&node.name_any(), &PostParams::default(), node)
            .await?)
    }

    async fn exists(&self, target: &ResourceRef) -> Result<bool, Error> {
        let name = target.name.as_str();
        match target.kind {
            ResourceKind::Namespace => {
                exists_in::<Namespace>(Api::all(self.client.clone()), name).await
            }
            ResourceKind::ConfigMap => {
                exists_in::<ConfigMap>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::DaemonSet => {
                exists_in::<DaemonSet>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::Deployment => {
                exists_in::<Deployment>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::StatefulSet => {
                exists_in::<StatefulSet>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::Service => {
                exists_in::<Service>(self.namespaced(target.namespace_or_err()?), name).await
            }
        }
    }

    async fn create(&self, object: &DerivedObject) -> Result<(), Error> {
        let target = object.resource_ref();
        match object {
            DerivedObject::Namespace(o) => create_in(Api::all(self.client.clone()), o).await,
            DerivedObject::ConfigMap(o) => {
                create_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::DaemonSet(o) => {
                create_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::Deployment(o) => {
                create_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::StatefulSet(o) => {
                create_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::Service(o) => {
                create_in(self.namespaced(target.namespace_or_err()?), o).await
            }
        }
    }

    async fn apply(&self, object: &DerivedObject) -> Result<(), Error> {
        let target = object.resource_ref();
        match object {
            DerivedObject::Namespace(o) => apply_in(Api::all(self.client.clone()), o).await,
            DerivedObject::ConfigMap(o) => {
                apply_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::DaemonSet(o) => {
                apply_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::Deployment(o) => {
                apply_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::StatefulSet(o) => {
                apply_in(self.namespaced(target.namespace_or_err()?), o).await
            }
            DerivedObject::Service(o) => {
                apply_in(self.namespaced(target.namespace_or_err()?), o).await
            }
        }
    }

    async fn list_names(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error> {
        match kind {
            ResourceKind::Namespace => {
                names_in::<Namespace>(Api::all(self.client.clone()), selector).await
            }
            ResourceKind::ConfigMap => {
                names_in::<ConfigMap>(self.namespaced(namespace), selector).await
            }
            ResourceKind::DaemonSet => {
                names_in::<DaemonSet>(self.namespaced(namespace), selector).await
            }
            ResourceKind::Deployment => {
                names_in::<Deployment>(self.namespaced(namespace), selector).await
            }
            ResourceKind::StatefulSet => {
                names_in::<StatefulSet>(self.namespaced(namespace), selector).await
            }
            ResourceKind::Service => {
                names_in::<Service>(self.namespaced(namespace), selector).await
            }
        }
    }

    async fn delete(&self, target: &ResourceRef) -> Result<(), Error> {
        let name = target.name.as_str();
        match target.kind {
            ResourceKind::Namespace => {
                delete_in::<Namespace>(Api::all(self.client.clone()), name).await
            }
            ResourceKind::ConfigMap => {
                delete_in::<ConfigMap>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::DaemonSet => {
                delete_in::<DaemonSet>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::Deployment => {
                delete_in::<Deployment>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::StatefulSet => {
                delete_in::<StatefulSet>(self.namespaced(target.namespace_or_err()?), name).await
            }
            ResourceKind::Service => {
                delete_in::<Service>(self.namespaced(target.namespace_or_err()?), name).await
            }
        }
    }
}

/// Install or update the SlurmCluster CRD with server-side apply
pub async fn ensure_crd_installed(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = SlurmCluster::crd();
    let name = crd.name_any();

    crds.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await?;

    info!(crd = %name, "CRD installed");
    Ok(())
}

//! Shared context for the controller
//!
//! Wraps the Kubernetes client with the object operations the reconcilers
//! need: server-side apply, ownership-checked delete, and best-effort
//! warning events.

use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::PostgresCluster;
use crate::resources::common::FIELD_MANAGER;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    recorder: Recorder,
}

impl Context {
    pub fn new(client: Client) -> Self {
        let recorder = Recorder::new(client.clone(), FIELD_MANAGER.into());
        Self { client, recorder }
    }

    /// Create or update a resource using server-side apply
    pub async fn apply<T>(&self, namespace: &str, resource: &T) -> Result<()>
    where
        T: Resource<Scope = NamespaceResourceScope>
            + serde::Serialize
            + DeserializeOwned
            + Clone
            + std::fmt::Debug,
        <T as Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        let name = resource.name_any();

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(resource),
        )
        .await?;
        debug!(name = %name, "applied resource");

        Ok(())
    }

    /// Delete a resource, but only when the cluster controls it.
    /// Tolerates the resource already being gone.
    pub async fn delete_controlled<T>(
        &self,
        cluster: &PostgresCluster,
        resource: &T,
    ) -> Result<()>
    where
        T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + std::fmt::Debug,
        <T as Resource>::DynamicType: Default,
    {
        let uid = cluster.uid();
        let controlled = resource
            .owner_references()
            .iter()
            .any(|reference| reference.controller == Some(true) && Some(&reference.uid) == uid.as_ref());
        if !controlled {
            debug!(name = %resource.name_any(), "refusing to delete resource not controlled by cluster");
            return Ok(());
        }

        let namespace = resource
            .namespace()
            .ok_or(Error::MissingObjectKey("namespace"))?;
        let api: Api<T> = Api::namespaced(self.client.clone(), &namespace);
        let name = resource.name_any();

        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(name = %name, "deleted resource");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a warning event on the cluster. Event delivery is
    /// best-effort; failures are logged and never fail the reconcile.
    pub async fn warn(&self, cluster: &PostgresCluster, reason: &str, message: &str) {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconciling".to_string(),
            secondary: None,
        };

        if let Err(e) = self
            .recorder
            .publish(&event, &cluster.object_ref(&()))
            .await
        {
            debug!(error = %e, reason = %reason, "failed to publish warning event");
        }
    }
}

//! Observation of live cluster members
//!
//! Each reconcile pass takes a read-only snapshot of the pods belonging to
//! a cluster and classifies every instance by three facts: whether it is
//! terminating, whether it is writable, and whether its database container
//! is running. Each fact is tri-state: "unknown" is distinct from false,
//! and an instance is never acted on based on an unknown fact.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::resources::common::{LABEL_INSTANCE, LABEL_PATRONI_ROLE};

/// Name of the container running PostgreSQL and its supporting tools
pub const CONTAINER_DATABASE: &str = "database";

/// An observed fact about an instance.
///
/// Represented as a sum type rather than `Option<bool>` so call sites must
/// spell out how unknowns are handled; collapsing unknown into false would
/// let the reconciler act on stale or missing observation data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fact {
    Unknown,
    False,
    True,
}

impl Fact {
    pub fn is_true(self) -> bool {
        self == Fact::True
    }

    pub fn is_false(self) -> bool {
        self == Fact::False
    }
}

impl From<bool> for Fact {
    fn from(value: bool) -> Self {
        if value { Fact::True } else { Fact::False }
    }
}

/// One live cluster member and its pods.
///
/// Under normal operation an instance has zero or one pod; more than one
/// can appear transiently while a replacement is scheduled.
#[derive(Clone, Debug, Default)]
pub struct Instance {
    pub name: String,
    pub pods: Vec<Pod>,
}

impl Instance {
    /// Whether this instance is being shut down
    pub fn terminating(&self) -> Fact {
        match self.pods.first() {
            None => Fact::Unknown,
            Some(pod) => pod.metadata.deletion_timestamp.is_some().into(),
        }
    }

    /// Whether this instance can accept writes, according to the role the
    /// leader-election layer has published on the pod
    pub fn writable(&self) -> Fact {
        match self
            .pods
            .first()
            .and_then(|pod| pod.labels().get(LABEL_PATRONI_ROLE))
            .map(String::as_str)
        {
            Some("master") => Fact::True,
            Some("replica") => Fact::False,
            _ => Fact::Unknown,
        }
    }

    /// Whether the named container of this instance is running
    pub fn running(&self, container: &str) -> Fact {
        let Some(pod) = self.pods.first() else {
            return Fact::Unknown;
        };
        let status = pod
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_ref())
            .and_then(|statuses| statuses.iter().find(|s| s.name == container));

        match status {
            None => Fact::Unknown,
            Some(status) => status
                .state
                .as_ref()
                .is_some_and(|state| state.running.is_some())
                .into(),
        }
    }
}

/// The instances currently belonging to one cluster
#[derive(Clone, Debug, Default)]
pub struct ObservedInstances {
    pub for_cluster: Vec<Instance>,
}

impl ObservedInstances {
    /// Group pods into instances by the instance label.
    ///
    /// Instances are sorted by name so that downstream first-match
    /// selection is deterministic regardless of list order.
    pub fn new(pods: Vec<Pod>) -> Self {
        let mut by_instance: BTreeMap<String, Vec<Pod>> = BTreeMap::new();
        for pod in pods {
            let Some(instance) = pod.labels().get(LABEL_INSTANCE).cloned() else {
                continue;
            };
            by_instance.entry(instance).or_default().push(pod);
        }

        Self {
            for_cluster: by_instance
                .into_iter()
                .map(|(name, pods)| Instance { name, pods })
                .collect(),
        }
    }

    /// The instance that can execute SQL that writes system catalogs, if
    /// any: known not terminating, known writable, database container
    /// known running, with at least one pod.
    ///
    /// Returns `None` when no instance qualifies; SQL reconciliation then
    /// defers to a later pass rather than failing.
    pub fn executable(&self) -> Option<&Instance> {
        self.for_cluster.iter().find(|instance| {
            instance.terminating().is_false()
                && instance.writable().is_true()
                && instance.running(CONTAINER_DATABASE).is_true()
                && !instance.pods.is_empty()
        })
    }

    /// Find an instance by name
    pub fn by_name(&self, name: &str) -> Option<&Instance> {
        self.for_cluster
            .iter()
            .find(|instance| instance.name == name)
    }
}

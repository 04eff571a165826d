//! Typed reads/writes to the managed StatefulSet, its pods, and events
//! (§4.1). This is the only module that talks to the API server; every
//! write here is an optimistic, best-effort operation whose failures
//! bubble up as [`crate::Error`] for the caller's retry policy to handle.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::core::{ObjectList, Selector};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource};
use tracing::debug;

use crate::error::Result;

const FIELD_MANAGER: &str = "rollout-operator";

#[derive(Clone)]
pub struct ClusterGateway {
    client: Client,
    namespace: String,
    name: String,
}

impl ClusterGateway {
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn sts_api(&self) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pod_api(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub async fn read_statefulset(&self) -> Result<StatefulSet> {
        Ok(self.sts_api().get(&self.name).await?)
    }

    pub async fn list_pods(&self, selector: &Selector) -> Result<ObjectList<Pod>> {
        let lp = ListParams::default().labels_from(selector);
        Ok(self.pod_api().list(&lp).await?)
    }

    /// Idempotent: a 404 is treated as success (§4.1, §7).
    pub async fn delete_pod(&self, pod_name: &str, grace_period_seconds: u32) -> Result<()> {
        let dp = DeleteParams {
            grace_period_seconds: Some(grace_period_seconds),
            ..Default::default()
        };
        match self.pod_api().delete(pod_name, &dp).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(pod = pod_name, "delete raced with apiserver, already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// JSON-merge patch; omitted keys retain their prior values.
    pub async fn patch_annotations(&self, patch: serde_json::Value) -> Result<StatefulSet> {
        let pp = PatchParams::default();
        Ok(self.sts_api().patch(&self.name, &pp, &Patch::Merge(&patch)).await?)
    }

    pub async fn record_event(&self, sts: &StatefulSet, reason: &str, note: String, type_: EventType) -> Result<()> {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: None,
        };
        let recorder = Recorder::new(self.client.clone(), reporter);
        recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note: Some(note),
                    action: reason.into(),
                    secondary: None,
                },
                &sts.object_ref(&()),
            )
            .await?;
        Ok(())
    }
}

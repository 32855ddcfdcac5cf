//! Operations on one app (GVC) in one org, combining the `cpln` and REST clients.

use serde_json::Value;

use crate::client::{ApiClient, Resource};
use crate::cpln::{CplnCli, ImageRecord};
use crate::error::CliError;
use crate::images;
use crate::routing;

pub struct Platform<'a> {
    pub api: &'a ApiClient,
    pub cli: &'a CplnCli,
    pub org: String,
    pub gvc: String,
}

impl<'a> Platform<'a> {
    pub fn new(api: &'a ApiClient, cli: &'a CplnCli, org: impl Into<String>, gvc: impl Into<String>) -> Self {
        Self {
            api,
            cli,
            org: org.into(),
            gvc: gvc.into(),
        }
    }

    // gvc

    pub async fn fetch_gvcs(&self) -> Result<Vec<Resource>, CliError> {
        self.api.gvc_list(&self.org).await
    }

    pub async fn fetch_gvc(&self) -> Result<Option<Value>, CliError> {
        self.api.gvc_get(&self.org, &self.gvc).await
    }

    pub async fn fetch_gvc_required(&self) -> Result<Value, CliError> {
        self.fetch_gvc().await?.ok_or_else(|| {
            CliError::NotFound(format!(
                "Can't find app '{}', please create it with 'cpl setup-app -a {}'.",
                self.gvc, self.gvc
            ))
        })
    }

    pub async fn gvc_delete(&self, gvc: &str) -> Result<(), CliError> {
        self.api.gvc_delete(&self.org, gvc).await
    }

    // image

    pub async fn images(&self, app: &str) -> Result<Vec<ImageRecord>, CliError> {
        self.cli.image_query(app, &self.org).await
    }

    pub async fn latest_image(&self) -> Result<String, CliError> {
        let images = self.images(&self.gvc).await?;
        Ok(images::latest_image_name(&self.gvc, &images))
    }

    pub async fn next_image(&self) -> Result<String, CliError> {
        let images = self.images(&self.gvc).await?;
        Ok(images::next_image_name(&self.gvc, &images))
    }

    pub async fn image_delete(&self, image: &str) -> Result<(), CliError> {
        self.api.image_delete(&self.org, image).await
    }

    // workload

    pub async fn fetch_workload(&self, workload: &str) -> Result<Option<Value>, CliError> {
        self.api.workload_get(&self.org, &self.gvc, workload).await
    }

    pub async fn fetch_workload_required(&self, workload: &str) -> Result<Value, CliError> {
        self.fetch_workload(workload).await?.ok_or_else(|| {
            CliError::NotFound(format!(
                "Can't find workload '{workload}', please create it with 'cpl apply-template {workload} -a {}'.",
                self.gvc
            ))
        })
    }

    pub async fn query_workloads(
        &self,
        gvc: &str,
        workload: &str,
        partial_match: bool,
    ) -> Result<Vec<Resource>, CliError> {
        self.api
            .query_workloads(&self.org, gvc, workload, partial_match)
            .await
    }

    /// Suspend or resume a workload.
    pub async fn set_workload_suspend(&self, workload: &str, suspend: bool) -> Result<(), CliError> {
        let mut data = self.fetch_workload_required(workload).await?;
        set_path(&mut data, &["spec", "defaultOptions", "suspend"], Value::Bool(suspend));

        self.api
            .workload_update(&self.org, &self.gvc, workload, &data)
            .await
    }

    /// Whether every deployment of a workload has `ready == expected`.
    pub async fn workload_deployments_ready(&self, workload: &str, expected: bool) -> Result<bool, CliError> {
        let deployments = self
            .api
            .workload_deployments(&self.org, &self.gvc, workload)
            .await?;
        Ok(deployments
            .iter()
            .all(|deployment| deployment.status.ready == expected))
    }

    pub async fn delete_workload(&self, gvc: &str, workload: &str) -> Result<(), CliError> {
        self.api.workload_delete(&self.org, gvc, workload).await
    }

    // domain

    /// The domain whose `/` route serves one of `workloads`.
    pub async fn find_domain_for(&self, workloads: &[String]) -> Result<Option<Value>, CliError> {
        let domains = self.api.domain_list(&self.org).await?;
        Ok(routing::domain_for(&domains, workloads).cloned())
    }

    pub async fn set_domain_workload(&self, domain: &mut Value, workload: &str) -> Result<(), CliError> {
        if !routing::set_route_workload(domain, &self.org, &self.gvc, workload) {
            return Err(CliError::NotFound(format!(
                "Domain '{}' has no route for prefix '/'.",
                routing::domain_name(domain)
            )));
        }

        let name = routing::domain_name(domain).to_string();
        self.api.domain_update(&self.org, &name, domain).await
    }
}

/// Set a nested object field, creating intermediate objects as needed.
fn set_path(data: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = data;
    for key in parents {
        if !current.get(*key).is_some_and(Value::is_object) {
            current[*key] = Value::Object(Default::default());
        }
        current = &mut current[*key];
    }
    current[*last] = value;
}

//! Composition of the four declarations into one graph
//!
//! Order of declaration is network, compute, studio, endpoint. Each later
//! group is also ordered after the group it consumes, on top of the value
//! edges its properties already carry: compute and studio follow the network,
//! the endpoint follows compute.

use serde_json::Value;
use tracing::{debug, info};

use ember_common::context::{ContextProvider, EKS_ADMIN_KEY, STUDIO_ADMIN_KEY};
use ember_common::parameters::ParameterStore;
use ember_common::{
    LogicalId, ResourceGraph, Result, TemplateOutput, COMPUTE_GROUP, ENDPOINT_GROUP,
    NETWORK_GROUP, STUDIO_GROUP, TEMPLATE_DESCRIPTION,
};
use ember_compute::ComputeRef;
use ember_endpoint::{EndpointRef, EndpointTarget};
use ember_network::NetworkRef;
use ember_studio::StudioRef;

use crate::config::AssemblyConfig;

/// Assembled graph plus the reference surface of each declaration
#[derive(Debug)]
pub struct Assembly {
    /// The full resource graph
    pub graph: ResourceGraph,
    /// Network declaration
    pub network: NetworkRef,
    /// Compute declaration
    pub compute: ComputeRef,
    /// Workspace declaration
    pub studio: StudioRef,
    /// Endpoint declaration
    pub endpoint: EndpointRef,
}

/// Builds an [`Assembly`] from configuration and injected lookups
pub struct RootAssembly<'a> {
    config: &'a AssemblyConfig,
    context: &'a dyn ContextProvider,
    parameters: &'a dyn ParameterStore,
}

impl<'a> RootAssembly<'a> {
    /// Assembly over `config`, reading context values and parameters from the given sources
    pub fn new(
        config: &'a AssemblyConfig,
        context: &'a dyn ContextProvider,
        parameters: &'a dyn ParameterStore,
    ) -> Self {
        Self {
            config,
            context,
            parameters,
        }
    }

    /// Declare everything and validate the resulting graph
    pub fn build(&self) -> Result<Assembly> {
        let admins = self.context.string_list(EKS_ADMIN_KEY)?;
        let studio_admin = self.context.string(STUDIO_ADMIN_KEY)?;
        info!(
            admins = admins.len(),
            studio_admin = ?studio_admin,
            naming = ?self.config.naming,
            "building assembly"
        );

        let description = self
            .config
            .description
            .clone()
            .unwrap_or_else(|| TEMPLATE_DESCRIPTION.to_string());
        let mut graph = ResourceGraph::new().with_description(description);

        let network = ember_network::declare(&mut graph.scope(NETWORK_GROUP), &self.config.network)?;

        let compute = ember_compute::declare(
            &mut graph.scope(COMPUTE_GROUP),
            &network,
            &self.config.compute,
            &admins,
            self.config.naming.generator(),
        )?;
        graph.depend_group(COMPUTE_GROUP, NETWORK_GROUP)?;

        let studio = ember_studio::declare(
            &mut graph.scope(STUDIO_GROUP),
            &network,
            &self.config.studio,
            studio_admin.as_deref(),
        )?;
        graph.depend_group(STUDIO_GROUP, NETWORK_GROUP)?;

        let target = EndpointTarget {
            virtual_cluster_id: compute.virtual_cluster_id(),
            execution_role_arn: compute.execution_role_arn(),
        };
        let endpoint = ember_endpoint::declare(
            &mut graph.scope(ENDPOINT_GROUP),
            self.parameters,
            &self.config.endpoint,
            &target,
        )?;
        graph.depend_group(ENDPOINT_GROUP, COMPUTE_GROUP)?;

        let outputs = [
            ("VpcId", network.vpc_id(), "VPC of the deployment"),
            ("ClusterName", compute.cluster_name(), "Kubernetes cluster name"),
            ("VirtualClusterId", compute.virtual_cluster_id(), "Analytics virtual cluster id"),
            ("ExecutionRoleArn", compute.execution_role_arn(), "Job execution role ARN"),
            ("StudioUrl", studio.url(), "Notebook studio URL"),
            ("ManagedEndpointId", endpoint.endpoint_id(), "Managed endpoint id"),
        ];
        for (name, value, description) in outputs {
            add_output(&mut graph, name, value, description)?;
        }

        graph.validate()?;
        debug!(resources = graph.len(), "assembly complete");

        Ok(Assembly {
            graph,
            network,
            compute,
            studio,
            endpoint,
        })
    }
}

fn add_output(graph: &mut ResourceGraph, name: &str, value: Value, description: &str) -> Result<()> {
    graph.add_output(TemplateOutput {
        name: LogicalId::new(name)?,
        value,
        description: Some(description.to_string()),
    })
}

//! Analytics virtual cluster bound to a namespace of the compute cluster

use serde_json::json;
use tracing::debug;

use ember_common::{Error, LogicalId, Resource, Result, Scope};

use crate::cluster::ClusterRef;

/// Resource type of the analytics virtual cluster
pub const VIRTUAL_CLUSTER_TYPE: &str = "AWS::EMRContainers::VirtualCluster";

/// Container provider kind; the only kind the service offers
pub const CONTAINER_PROVIDER: &str = "EKS";

/// Declare the virtual cluster named `name` on `namespace`.
///
/// `prerequisites` are the manifests that must exist in the cluster before the
/// service can register: the namespace, the role binding and the identity
/// mappings. Each becomes an explicit edge.
pub fn declare_virtual_cluster(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    name: &str,
    namespace: &str,
    prerequisites: &[&LogicalId],
) -> Result<LogicalId> {
    if name.is_empty() {
        return Err(Error::validation_for_field(
            scope.group(),
            "virtualClusterName",
            "virtual cluster name must not be empty",
        ));
    }
    let id = scope.add(
        Resource::new(VIRTUAL_CLUSTER_TYPE, scope.id("VirtualCluster")?).with_properties(json!({
            "Name": name,
            "ContainerProvider": {
                "Id": cluster.name(),
                "Type": CONTAINER_PROVIDER,
                "Info": { "EksInfo": { "Namespace": namespace } }
            }
        })),
    )?;
    for prerequisite in prerequisites {
        scope.depend(&id, prerequisite)?;
    }
    debug!(virtual_cluster = %id, namespace, "declared virtual cluster");
    Ok(id)
}

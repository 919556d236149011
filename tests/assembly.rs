//! End-to-end checks of the assembled graph

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::json;

use ember::{Assembly, AssemblyConfig, RootAssembly};
use ember_common::context::{StaticContext, EKS_ADMIN_KEY};
use ember_common::parameters::{StaticParameterStore, DOMAIN_PATH, ZONE_ID_PATH};
use ember_common::template::{OutputFormat, Template};
use ember_common::LogicalId;
use ember_compute::manifest::{documents, is_kind, MANIFEST_TYPE};
use ember_compute::MASTERS_GROUP;
use ember_endpoint::is_physical_resource_id;
use ember_network::{NetworkSpec, SubnetGroupSpec, SubnetType};
use ember_studio::{blocks_public_access, is_versioned};

fn parameters() -> StaticParameterStore {
    StaticParameterStore::new()
        .with(DOMAIN_PATH, "example.com")
        .with(ZONE_ID_PATH, "Z123")
}

fn assemble(config: &AssemblyConfig, admins: &[&str]) -> Assembly {
    let context = StaticContext::new().with(EKS_ADMIN_KEY, json!(admins));
    RootAssembly::new(config, &context, &parameters())
        .build()
        .expect("assembly builds")
}

fn manifests_of_kind(assembly: &Assembly, kind: &str) -> Vec<LogicalId> {
    assembly
        .graph
        .resources_of_type(MANIFEST_TYPE)
        .filter(|r| documents(r).iter().any(|d| is_kind(d, kind)))
        .map(|r| r.id.clone())
        .collect()
}

#[test]
fn single_admin_spark_deployment() {
    let assembly = assemble(&AssemblyConfig::default(), &["alice"]);
    let compute = &assembly.compute;

    let admins: Vec<_> = compute
        .identity_mappings
        .iter()
        .filter(|m| m.groups.iter().any(|g| g == MASTERS_GROUP))
        .collect();
    assert_eq!(admins.len(), 1);
    assert!(admins[0].arn.ends_with(":user/alice"));

    let namespaces = manifests_of_kind(&assembly, "Namespace");
    assert_eq!(namespaces, vec![compute.rbac.namespace.clone()]);
    let namespace = assembly.graph.get(&namespaces[0]).expect("namespace");
    assert_eq!(documents(namespace)[0]["metadata"]["name"], json!("spark"));

    assert_eq!(manifests_of_kind(&assembly, "Role"), vec![compute.rbac.role.clone()]);
    assert_eq!(
        manifests_of_kind(&assembly, "RoleBinding"),
        vec![compute.rbac.binding.clone()]
    );
    assert!(assembly
        .graph
        .explicit_dependencies(&compute.rbac.binding)
        .contains(&compute.rbac.role));
    assert!(assembly
        .graph
        .explicit_dependencies(&compute.rbac.role)
        .contains(&compute.rbac.namespace));

    let virtual_clusters: Vec<_> = assembly
        .graph
        .resources_of_type("AWS::EMRContainers::VirtualCluster")
        .collect();
    assert_eq!(virtual_clusters.len(), 1);
    let dependencies = assembly.graph.explicit_dependencies(&virtual_clusters[0].id);
    assert!(dependencies.contains(&compute.rbac.namespace));
    assert!(dependencies.contains(&compute.rbac.binding));
}

#[test]
fn minimal_network_has_one_subnet_per_group() {
    let config = AssemblyConfig {
        network: NetworkSpec {
            max_azs: 1,
            nat_gateways: 1,
            subnets: vec![
                SubnetGroupSpec {
                    name: "public".to_string(),
                    subnet_type: SubnetType::Public,
                    cidr_mask: 24,
                },
                SubnetGroupSpec {
                    name: "private".to_string(),
                    subnet_type: SubnetType::PrivateWithGateway,
                    cidr_mask: 24,
                },
            ],
            ..NetworkSpec::default()
        },
        ..AssemblyConfig::default()
    };
    let assembly = assemble(&config, &["alice"]);

    assert_eq!(assembly.graph.resources_of_type("AWS::EC2::VPC").count(), 1);
    assert_eq!(assembly.network.cidr.to_string(), "10.0.0.0/16");
    let subnets: Vec<_> = assembly
        .network
        .subnet_groups
        .iter()
        .flat_map(|g| g.subnets.iter())
        .collect();
    assert_eq!(subnets.len(), 2);
    let ranges: BTreeSet<String> = subnets.iter().map(|s| s.cidr.to_string()).collect();
    assert_eq!(ranges.len(), 2);
    assert!(ranges.iter().all(|r| r.starts_with("10.0.") && r.ends_with("/24")));
    assert_eq!(assembly.graph.resources_of_type("AWS::EC2::NatGateway").count(), 1);
}

#[test]
fn admins_differing_only_in_separators_assemble() {
    for admins in [["bob.smith", "bob-smith"], ["a_b", "aB"], ["ops+1", "ops=1"]] {
        let assembly = assemble(&AssemblyConfig::default(), &admins);
        let names: BTreeSet<&str> = assembly
            .compute
            .identity_mappings
            .iter()
            .filter(|m| m.groups.iter().any(|g| g == MASTERS_GROUP))
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names.len(), 2, "{admins:?}");
    }
}

#[test]
fn workspace_bucket_is_private_and_versioned() {
    let assembly = assemble(&AssemblyConfig::default(), &["alice"]);
    let bucket = assembly.graph.get(&assembly.studio.bucket).expect("bucket");
    assert!(blocks_public_access(bucket));
    assert!(is_versioned(bucket));
}

#[test]
fn endpoint_follows_certificate_and_deletes_by_created_id() {
    let assembly = assemble(&AssemblyConfig::default(), &["alice"]);
    let endpoint = &assembly.endpoint;

    let order = assembly.graph.apply_order().expect("acyclic");
    let position = |id: &LogicalId| order.iter().position(|o| o == id).expect("ordered");
    assert!(position(&endpoint.certificate) < position(&endpoint.endpoint));

    let delete_id = endpoint.delete.parameter("id").expect("delete id");
    assert!(is_physical_resource_id(delete_id));
    assert_eq!(
        endpoint.delete.parameter("virtualClusterId"),
        endpoint.create.parameter("virtualClusterId")
    );
}

#[test]
fn template_renders_in_both_formats() {
    let assembly = assemble(&AssemblyConfig::default(), &["alice", "bob"]);
    let template = Template::from_graph(&assembly.graph).expect("template");

    let json_text = template.render(OutputFormat::Json).expect("json");
    let document: serde_json::Value = serde_json::from_str(&json_text).expect("parses");
    let virtual_cluster = &document["Resources"][assembly.compute.virtual_cluster.as_str()];
    assert_eq!(virtual_cluster["Type"], json!("AWS::EMRContainers::VirtualCluster"));
    let depends_on = virtual_cluster["DependsOn"].as_array().expect("depends on");
    assert!(depends_on.contains(&json!(assembly.compute.rbac.binding.as_str())));
    assert_eq!(document["Outputs"]["VpcId"]["Value"], json!({ "Ref": "NetworkMainVpc" }));

    let yaml_text = template.render(OutputFormat::Yaml).expect("yaml");
    assert!(yaml_text.contains("AWS::EMR::Studio"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn distinct_admins_get_distinct_mappings(
        admins in proptest::collection::btree_set("[A-Za-z0-9+=,.@_-]{1,16}", 1..6)
    ) {
        let admins: Vec<&str> = admins.iter().map(String::as_str).collect();
        let assembly = assemble(&AssemblyConfig::default(), &admins);
        let names: BTreeSet<&str> = assembly
            .compute
            .identity_mappings
            .iter()
            .filter(|m| m.groups.iter().any(|g| g == MASTERS_GROUP))
            .map(|m| m.name.as_str())
            .collect();
        prop_assert_eq!(names.len(), admins.len());
    }
}

//! VPC, subnets, gateways and route tables

use serde_json::json;
use tracing::{debug, warn};

use ember_common::id::pascal_case;
use ember_common::{token, Error, LogicalId, Resource, Result, Scope};

use crate::cidr::allocate;
use crate::{NetworkRef, NetworkSpec, SubnetGroupRecord, SubnetRecord, SubnetType};

/// Destination of every default route
const ANY_IPV4: &str = "0.0.0.0/0";

fn name_tag(scope: &Scope<'_>, local: &str) -> serde_json::Value {
    json!({ "Key": "Name", "Value": format!("{}/{}", scope.group(), local) })
}

/// Declare the VPC, its subnets and routing; returns the network reference
pub fn declare_vpc(scope: &mut Scope<'_>, spec: &NetworkSpec) -> Result<NetworkRef> {
    if spec.max_azs == 0 {
        return Err(Error::validation_for_field(
            scope.group(),
            "maxAzs",
            "at least one availability zone is required",
        ));
    }
    if spec.subnets.is_empty() {
        return Err(Error::validation_for_field(
            scope.group(),
            "subnets",
            "at least one subnet group is required",
        ));
    }

    let requests: Vec<(u8, usize)> = spec
        .subnets
        .iter()
        .map(|g| (g.cidr_mask, spec.max_azs))
        .collect();
    let ranges = allocate(spec.vpc_cidr, &requests)?;

    let vpc = scope.id("MainVpc")?;
    scope.add(
        Resource::new("AWS::EC2::VPC", vpc.clone()).with_properties(json!({
            "CidrBlock": spec.vpc_cidr.trunc().to_string(),
            "EnableDnsHostnames": true,
            "EnableDnsSupport": true,
            "InstanceTenancy": "default",
            "Tags": [name_tag(scope, "MainVpc")]
        })),
    )?;

    let mut subnet_groups = Vec::with_capacity(spec.subnets.len());
    for (group, cidrs) in spec.subnets.iter().zip(ranges) {
        let base = pascal_case(&group.name);
        if base.is_empty() {
            return Err(Error::validation_for_field(
                scope.group(),
                "subnets",
                format!("subnet group name {:?} has no alphanumeric characters", group.name),
            ));
        }
        let mut subnets = Vec::with_capacity(cidrs.len());
        for (az_index, cidr) in cidrs.into_iter().enumerate() {
            let local = format!("{base}Az{}", az_index + 1);
            let subnet = scope.id(&local)?;
            let mut tags = vec![
                name_tag(scope, &local),
                json!({ "Key": "ember:subnet-name", "Value": group.name }),
                json!({ "Key": "ember:subnet-type", "Value": group.subnet_type.tag() }),
            ];
            // load balancer subnet discovery
            tags.push(match group.subnet_type {
                SubnetType::Public => json!({ "Key": "kubernetes.io/role/elb", "Value": "1" }),
                SubnetType::PrivateWithGateway => {
                    json!({ "Key": "kubernetes.io/role/internal-elb", "Value": "1" })
                }
            });
            scope.add(
                Resource::new("AWS::EC2::Subnet", subnet.clone()).with_properties(json!({
                    "VpcId": token::reference(&vpc),
                    "CidrBlock": cidr.to_string(),
                    "AvailabilityZone": token::select(az_index, token::availability_zones()),
                    "MapPublicIpOnLaunch": group.subnet_type == SubnetType::Public,
                    "Tags": tags
                })),
            )?;

            let route_table = scope.id(&format!("{local}RouteTable"))?;
            scope.add(
                Resource::new("AWS::EC2::RouteTable", route_table.clone()).with_properties(
                    json!({
                        "VpcId": token::reference(&vpc),
                        "Tags": [name_tag(scope, &local)]
                    }),
                ),
            )?;
            scope.add(
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    scope.id(&format!("{local}RouteTableAssociation"))?,
                )
                .with_properties(json!({
                    "RouteTableId": token::reference(&route_table),
                    "SubnetId": token::reference(&subnet)
                })),
            )?;
            debug!(subnet = %subnet, %cidr, az = az_index, "declared subnet");
            subnets.push(SubnetRecord {
                id: subnet,
                route_table,
                cidr,
                az_index,
            });
        }
        subnet_groups.push(SubnetGroupRecord {
            name: group.name.clone(),
            subnet_type: group.subnet_type,
            cidr_mask: group.cidr_mask,
            subnets,
        });
    }

    let network = NetworkRef {
        vpc,
        cidr: spec.vpc_cidr.trunc(),
        subnet_groups,
    };
    declare_routing(scope, &network, spec.nat_gateways)?;
    Ok(network)
}

/// Internet gateway, NAT gateways and default routes
fn declare_routing(scope: &mut Scope<'_>, network: &NetworkRef, nat_gateways: usize) -> Result<()> {
    let public: Vec<&SubnetRecord> = network.subnets_of(SubnetType::Public).collect();
    let private: Vec<&SubnetRecord> = network.subnets_of(SubnetType::PrivateWithGateway).collect();

    if public.is_empty() {
        if nat_gateways > 0 {
            return Err(Error::validation_for_field(
                scope.group(),
                "natGateways",
                "NAT gateways need a public subnet group",
            ));
        }
    } else {
        let igw = scope.id("InternetGateway")?;
        scope.add(
            Resource::new("AWS::EC2::InternetGateway", igw.clone())
                .with_property("Tags", json!([name_tag(scope, "InternetGateway")])),
        )?;
        let attachment = scope.id("VpcGatewayAttachment")?;
        scope.add(
            Resource::new("AWS::EC2::VPCGatewayAttachment", attachment.clone()).with_properties(
                json!({
                    "VpcId": network.vpc_id(),
                    "InternetGatewayId": token::reference(&igw)
                }),
            ),
        )?;
        for subnet in &public {
            let route = default_route(scope, subnet, "GatewayId", &igw)?;
            // the route is only usable once the gateway is attached
            scope.depend(&route, &attachment)?;
        }
    }

    if private.is_empty() {
        return Ok(());
    }
    if nat_gateways == 0 {
        return Err(Error::validation_for_field(
            scope.group(),
            "natGateways",
            "private-with-gateway subnets need at least one NAT gateway",
        ));
    }

    let count = if nat_gateways > public.len() {
        warn!(
            requested = nat_gateways,
            placed = public.len(),
            "more NAT gateways than public subnets, placing one per public subnet"
        );
        public.len()
    } else {
        nat_gateways
    };

    let mut nats: Vec<LogicalId> = Vec::with_capacity(count);
    for subnet in public.iter().take(count) {
        let local = subnet
            .id
            .as_str()
            .strip_prefix(scope.group())
            .unwrap_or(subnet.id.as_str())
            .to_string();
        let eip = scope.id(&format!("{local}Eip"))?;
        scope.add(
            Resource::new("AWS::EC2::EIP", eip.clone())
                .with_property("Domain", json!("vpc"))
                .with_property("Tags", json!([name_tag(scope, &local)])),
        )?;
        let nat = scope.id(&format!("{local}NatGateway"))?;
        scope.add(
            Resource::new("AWS::EC2::NatGateway", nat.clone()).with_properties(json!({
                "SubnetId": token::reference(&subnet.id),
                "AllocationId": token::attribute(&eip, "AllocationId"),
                "Tags": [name_tag(scope, &local)]
            })),
        )?;
        nats.push(nat);
    }

    for subnet in &private {
        let nat = &nats[subnet.az_index % nats.len()];
        default_route(scope, subnet, "NatGatewayId", nat)?;
    }
    Ok(())
}

fn default_route(
    scope: &mut Scope<'_>,
    subnet: &SubnetRecord,
    target_key: &str,
    target: &LogicalId,
) -> Result<LogicalId> {
    let id = LogicalId::new(format!("{}DefaultRoute", subnet.id))?;
    scope.add(
        Resource::new("AWS::EC2::Route", id)
            .with_property("RouteTableId", token::reference(&subnet.route_table))
            .with_property("DestinationCidrBlock", json!(ANY_IPV4))
            .with_property(target_key, token::reference(target)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SubnetGroupSpec;
    use ember_common::ResourceGraph;

    fn declare(spec: &NetworkSpec) -> (ResourceGraph, Result<NetworkRef>) {
        let mut graph = ResourceGraph::new();
        let result = {
            let mut scope = graph.scope("Network");
            declare_vpc(&mut scope, spec)
        };
        (graph, result)
    }

    fn two_group_spec() -> NetworkSpec {
        NetworkSpec {
            service_endpoints: Vec::new(),
            ..NetworkSpec::default()
        }
    }

    #[test]
    fn test_subnets_per_group_and_az() {
        let (graph, network) = declare(&two_group_spec());
        let network = network.expect("network declares");

        assert_eq!(network.subnet_groups.len(), 2);
        for group in &network.subnet_groups {
            assert_eq!(group.subnets.len(), 2);
        }
        assert_eq!(graph.resources_of_type("AWS::EC2::Subnet").count(), 4);
        assert_eq!(
            network.subnet_groups[0].subnets[0].id.as_str(),
            "NetworkPrivateSubnet1Az1"
        );
        assert_eq!(
            network.subnet_groups[1].subnets[1].cidr.to_string(),
            "10.0.3.0/24"
        );
    }

    #[test]
    fn test_private_routes_go_through_nat_public_through_igw() {
        let (graph, network) = declare(&two_group_spec());
        let network = network.expect("network declares");

        assert_eq!(graph.resources_of_type("AWS::EC2::NatGateway").count(), 1);
        assert_eq!(graph.resources_of_type("AWS::EC2::InternetGateway").count(), 1);

        let private = &network.subnet_groups[0].subnets[1];
        let route = graph
            .get_str(&format!("{}DefaultRoute", private.id))
            .expect("private route");
        assert_eq!(
            route.properties["NatGatewayId"],
            json!({ "Ref": "NetworkPublicSubnet1Az1NatGateway" })
        );

        let public = &network.subnet_groups[1].subnets[0];
        let route_id = LogicalId::new(format!("{}DefaultRoute", public.id)).expect("id");
        let route = graph.get(&route_id).expect("public route");
        assert_eq!(
            route.properties["GatewayId"],
            json!({ "Ref": "NetworkInternetGateway" })
        );
        assert!(graph
            .explicit_dependencies(&route_id)
            .iter()
            .any(|d| d.as_str() == "NetworkVpcGatewayAttachment"));
    }

    #[test]
    fn test_nat_gateways_are_capped_by_public_subnets() {
        let spec = NetworkSpec {
            nat_gateways: 5,
            ..two_group_spec()
        };
        let (graph, network) = declare(&spec);
        network.expect("network declares");
        assert_eq!(graph.resources_of_type("AWS::EC2::NatGateway").count(), 2);
        assert_eq!(graph.resources_of_type("AWS::EC2::EIP").count(), 2);
    }

    #[test]
    fn test_private_subnets_without_nat_are_rejected() {
        let spec = NetworkSpec {
            nat_gateways: 0,
            ..two_group_spec()
        };
        let (_, network) = declare(&spec);
        assert!(network.is_err());
    }

    #[test]
    fn test_public_only_network_needs_no_nat() {
        let spec = NetworkSpec {
            nat_gateways: 0,
            subnets: vec![SubnetGroupSpec {
                name: "edge".into(),
                subnet_type: SubnetType::Public,
                cidr_mask: 24,
            }],
            ..two_group_spec()
        };
        let (graph, network) = declare(&spec);
        network.expect("network declares");
        assert_eq!(graph.resources_of_type("AWS::EC2::NatGateway").count(), 0);
        graph.validate().expect("graph is consistent");
    }

    #[test]
    fn test_oversized_subnets_are_rejected() {
        let spec = NetworkSpec {
            vpc_cidr: "10.0.0.0/23".parse().expect("cidr"),
            ..two_group_spec()
        };
        let (_, network) = declare(&spec);
        assert!(network.is_err());
    }

    #[test]
    fn test_subnets_spread_over_azs() {
        let (graph, network) = declare(&two_group_spec());
        let network = network.expect("network declares");
        let second = graph
            .get(&network.subnet_groups[0].subnets[1].id)
            .expect("subnet");
        assert_eq!(
            second.properties["AvailabilityZone"],
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
        graph.validate().expect("graph is consistent");
    }
}

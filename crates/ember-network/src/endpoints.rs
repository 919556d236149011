//! Private service endpoints

use serde_json::json;
use tracing::debug;

use ember_common::id::pascal_case;
use ember_common::{token, Error, LogicalId, Resource, Result, Scope};

use crate::{EndpointKind, NetworkRef, ServiceEndpointSpec, SubnetType};

/// HTTPS, the only port interface endpoints serve on
const HTTPS_PORT: u16 = 443;

/// Declare one endpoint per entry; each is ordered after the VPC explicitly
pub fn declare_service_endpoints(
    scope: &mut Scope<'_>,
    network: &NetworkRef,
    endpoints: &[ServiceEndpointSpec],
) -> Result<Vec<LogicalId>> {
    let mut declared = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let base = pascal_case(&endpoint.service);
        if base.is_empty() {
            return Err(Error::validation_for_field(
                scope.group(),
                "serviceEndpoints",
                format!("service name {:?} is empty", endpoint.service),
            ));
        }
        let id = scope.id(&format!("{base}Endpoint"))?;
        let service_name = token::sub(format!(
            "com.amazonaws.${{{}}}.{}",
            token::REGION,
            endpoint.service
        ));

        let mut resource = Resource::new("AWS::EC2::VPCEndpoint", id.clone())
            .with_property("VpcId", network.vpc_id())
            .with_property("ServiceName", service_name);

        resource = match endpoint.kind {
            EndpointKind::Interface => {
                let subnet_ids = network.private_subnet_ids();
                if subnet_ids.is_empty() {
                    return Err(Error::validation_for_field(
                        scope.group(),
                        "serviceEndpoints",
                        format!(
                            "interface endpoint {} needs private subnets",
                            endpoint.service
                        ),
                    ));
                }
                let security_group = scope.id(&format!("{base}EndpointSecurityGroup"))?;
                scope.add(
                    Resource::new("AWS::EC2::SecurityGroup", security_group.clone())
                        .with_properties(json!({
                            "GroupDescription": format!("{}/{base}Endpoint", scope.group()),
                            "VpcId": network.vpc_id(),
                            "SecurityGroupIngress": [{
                                "CidrIp": network.cidr.to_string(),
                                "Description": format!("from {}:{HTTPS_PORT}", network.cidr),
                                "FromPort": HTTPS_PORT,
                                "IpProtocol": "tcp",
                                "ToPort": HTTPS_PORT
                            }]
                        })),
                )?;
                resource
                    .with_property("VpcEndpointType", json!("Interface"))
                    .with_property("SubnetIds", json!(subnet_ids))
                    .with_property("PrivateDnsEnabled", json!(endpoint.private_dns))
                    .with_property(
                        "SecurityGroupIds",
                        json!([token::attribute(&security_group, "GroupId")]),
                    )
            }
            EndpointKind::Gateway => {
                let route_tables: Vec<_> = network
                    .subnets_of(SubnetType::PrivateWithGateway)
                    .chain(network.subnets_of(SubnetType::Public))
                    .map(|s| token::reference(&s.route_table))
                    .collect();
                resource
                    .with_property("VpcEndpointType", json!("Gateway"))
                    .with_property("RouteTableIds", json!(route_tables))
            }
        };

        scope.add(resource)?;
        scope.depend(&id, &network.vpc)?;
        debug!(endpoint = %id, service = %endpoint.service, "declared service endpoint");
        declared.push(id);
    }
    Ok(declared)
}

//! Wildcard certificate validated through DNS

use serde_json::{json, Value};

use ember_common::{token, LogicalId, Resource, Result, Scope};

/// `*.<domain>`, folded to a literal when the domain is known
pub fn wildcard(domain: &Value) -> Value {
    match domain {
        Value::String(name) => json!(format!("*.{name}")),
        other => token::join("", vec![json!("*."), other.clone()]),
    }
}

/// Declare a certificate for `*.<domain>` validated against the hosted zone `zone_id`
pub fn declare_certificate(scope: &mut Scope<'_>, domain: &Value, zone_id: &Value) -> Result<LogicalId> {
    let id = scope.id("Certificate")?;
    let name = wildcard(domain);
    scope.add(
        Resource::new("AWS::CertificateManager::Certificate", id).with_properties(json!({
            "DomainName": name,
            "ValidationMethod": "DNS",
            "DomainValidationOptions": [{
                "DomainName": name,
                "HostedZoneId": zone_id
            }]
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::ResourceGraph;

    #[test]
    fn test_literal_domain_is_folded() {
        assert_eq!(wildcard(&json!("example.com")), json!("*.example.com"));
    }

    #[test]
    fn test_deploy_time_domain_is_joined() {
        let domain = json!({ "Ref": "MainDomain" });
        assert_eq!(
            wildcard(&domain),
            json!({ "Fn::Join": ["", ["*.", { "Ref": "MainDomain" }]] })
        );
    }

    #[test]
    fn test_certificate_validates_against_zone() {
        let mut graph = ResourceGraph::new();
        let id = declare_certificate(
            &mut graph.scope("Endpoint"),
            &json!("example.com"),
            &json!("Z123"),
        )
        .expect("certificate");
        let certificate = graph.get(&id).expect("certificate");
        assert_eq!(certificate.properties["ValidationMethod"], json!("DNS"));
        assert_eq!(
            certificate.properties["DomainValidationOptions"],
            json!([{ "DomainName": "*.example.com", "HostedZoneId": "Z123" }])
        );
    }
}

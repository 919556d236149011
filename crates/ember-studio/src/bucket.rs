//! Workspace storage bucket

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use ember_common::{token, LogicalId, Resource, Result, Scope};

/// Server-side encryption of the bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketEncryption {
    /// KMS with the AWS managed key
    #[default]
    KmsManaged,
    /// S3 managed keys (AES-256)
    S3Managed,
}

impl BucketEncryption {
    fn algorithm(self) -> &'static str {
        match self {
            Self::KmsManaged => "aws:kms",
            Self::S3Managed => "AES256",
        }
    }
}

/// Declare the bucket; public access is always blocked and versioning always on
pub fn declare_bucket(
    scope: &mut Scope<'_>,
    name_prefix: &str,
    encryption: BucketEncryption,
) -> Result<LogicalId> {
    let id = scope.id("Bucket")?;
    scope.add(
        Resource::new("AWS::S3::Bucket", id).with_properties(json!({
            "BucketName": token::sub(format!("{name_prefix}-${{{}}}", token::ACCOUNT_ID)),
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": encryption.algorithm() }
                }]
            },
            "PublicAccessBlockConfiguration": public_access_block(),
            "VersioningConfiguration": { "Status": "Enabled" }
        })),
    )
}

fn public_access_block() -> Value {
    json!({
        "BlockPublicAcls": true,
        "BlockPublicPolicy": true,
        "IgnorePublicAcls": true,
        "RestrictPublicBuckets": true
    })
}

/// Whether a bucket resource blocks every form of public access
pub fn blocks_public_access(bucket: &Resource) -> bool {
    bucket.property("PublicAccessBlockConfiguration") == Some(&public_access_block())
}

/// Whether a bucket resource keeps object versions
pub fn is_versioned(bucket: &Resource) -> bool {
    bucket
        .property("VersioningConfiguration")
        .and_then(|v| v.get("Status"))
        .and_then(Value::as_str)
        == Some("Enabled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::ResourceGraph;
    use rstest::rstest;

    #[rstest]
    #[case::kms(BucketEncryption::KmsManaged, "aws:kms")]
    #[case::s3(BucketEncryption::S3Managed, "AES256")]
    fn test_bucket_is_private_versioned_and_encrypted(
        #[case] encryption: BucketEncryption,
        #[case] algorithm: &str,
    ) {
        let mut graph = ResourceGraph::new();
        let id = declare_bucket(&mut graph.scope("Studio"), "aws-emr-workspace-bk", encryption)
            .expect("bucket");
        let bucket = graph.get(&id).expect("bucket");
        assert!(blocks_public_access(bucket));
        assert!(is_versioned(bucket));
        assert_eq!(
            bucket.properties["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]
                ["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
            json!(algorithm)
        );
        assert_eq!(
            bucket.properties["BucketName"],
            json!({ "Fn::Sub": "aws-emr-workspace-bk-${AWS::AccountId}" })
        );
    }
}

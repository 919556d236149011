//! Subnet address allocation inside the VPC block

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use ember_common::{Error, Result};

/// Smallest subnet the provider accepts
pub const MIN_SUBNET_PREFIX: u8 = 28;

/// Largest VPC block the provider accepts
pub const MIN_VPC_PREFIX: u8 = 16;

/// Carve `counts[i]` subnets of prefix `masks[i]` out of `block`, in order.
///
/// Each subnet starts at the next address aligned to its own size, so mixed
/// masks never overlap. Running past the end of the block is an error.
pub fn allocate(block: Ipv4Net, requests: &[(u8, usize)]) -> Result<Vec<Vec<Ipv4Net>>> {
    if block.prefix_len() < MIN_VPC_PREFIX || block.prefix_len() > MIN_SUBNET_PREFIX {
        return Err(Error::validation_for_field(
            "Network",
            "vpcCidr",
            format!(
                "VPC block {block} must have a prefix between /{MIN_VPC_PREFIX} and /{MIN_SUBNET_PREFIX}"
            ),
        ));
    }

    let block = block.trunc();
    let end = u64::from(u32::from(block.broadcast()));
    let mut cursor = u64::from(u32::from(block.network()));
    let mut allocated = Vec::with_capacity(requests.len());

    for &(mask, count) in requests {
        if mask < block.prefix_len() || mask > MIN_SUBNET_PREFIX {
            return Err(Error::validation_for_field(
                "Network",
                "cidrMask",
                format!(
                    "subnet mask /{mask} must be between /{} and /{MIN_SUBNET_PREFIX}",
                    block.prefix_len()
                ),
            ));
        }
        let size = 1u64 << (32 - u32::from(mask));
        let mut group = Vec::with_capacity(count);
        for _ in 0..count {
            let start = cursor.div_ceil(size) * size;
            let last = start + size - 1;
            if last > end {
                return Err(Error::validation_for_field(
                    "Network",
                    "subnets",
                    format!("subnets do not fit in {block}: no room for another /{mask}"),
                ));
            }
            // start <= end <= u32::MAX, checked above
            let address = Ipv4Addr::from(start as u32);
            let subnet = Ipv4Net::new(address, mask)
                .map_err(|e| Error::validation_for_field("Network", "cidrMask", e.to_string()))?;
            group.push(subnet);
            cursor = last + 1;
        }
        allocated.push(group);
    }
    Ok(allocated)
}

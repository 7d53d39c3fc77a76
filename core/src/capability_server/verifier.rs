// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Invocation verification: signature check over the invocation envelope,
//! then a capability-chain walk proving the issuer was authorized to
//! exercise `ability` over `resource`, down from the resource's owner.

use ed25519_dalek::Verifier;

use crate::domain::capability::{Ability, Delegation, Did, Invocation, InvocationArguments, Resource};
use crate::domain::errors::CoreError;

/// Bytes an invocation's signature is computed over: a stable
/// DAG-CBOR-free canonical encoding (JSON is sufficient here since this
/// crate doesn't need cross-implementation canonical-CBOR compatibility,
/// only internal consistency between signer and verifier).
fn signing_payload(issuer: &Did, ability: Ability, resource: &Resource, arguments: &InvocationArguments) -> Vec<u8> {
    #[derive(serde::Serialize)]
    struct Payload<'a> {
        issuer: &'a Did,
        ability: Ability,
        resource: &'a Resource,
        arguments: &'a InvocationArguments,
    }
    serde_json::to_vec(&Payload {
        issuer,
        ability,
        resource,
        arguments,
    })
    .expect("invocation payload is always serializable")
}

fn delegation_signing_payload(d: &Delegation) -> Vec<u8> {
    #[derive(serde::Serialize)]
    struct Payload<'a> {
        issuer: &'a Did,
        audience: &'a Did,
        ability: Ability,
        resource: &'a Resource,
        expires_at: i64,
    }
    serde_json::to_vec(&Payload {
        issuer: &d.issuer,
        audience: &d.audience,
        ability: d.ability,
        resource: &d.resource,
        expires_at: d.expires_at,
    })
    .expect("delegation payload is always serializable")
}

/// Verifies the invocation's own signature and walks `proofs` to confirm a
/// chain of delegations connects the resource's owner down to `issuer` for
/// `ability`. Returns `Ok(())` if authorized, `Err(CoreError::Unauthorized)`
/// otherwise. Resource-identity mismatches (e.g. `blob/retrieve` against a
/// foreign node) are the caller's responsibility to check separately and
/// map to `InvalidResource`, not `Unauthorized`.
pub fn verify_invocation(invocation: &Invocation, now_unix: i64) -> Result<(), CoreError> {
    let payload = signing_payload(&invocation.issuer, invocation.ability, &invocation.resource, &invocation.arguments);
    invocation
        .issuer
        .0
        .verify(&payload, &invocation.signature)
        .map_err(|_| CoreError::Unauthorized)?;

    let owner = match &invocation.resource {
        Resource::Space { space } => space,
        Resource::Piece { space, .. } => space,
        Resource::Node { node } => node,
    };

    if invocation.issuer == *owner && invocation.proofs.is_empty() {
        return Ok(());
    }

    verify_chain(owner, &invocation.issuer, invocation.ability, &invocation.resource, &invocation.proofs, now_unix)
}

fn verify_chain(
    owner: &Did,
    issuer: &Did,
    ability: Ability,
    resource: &Resource,
    proofs: &[Delegation],
    now_unix: i64,
) -> Result<(), CoreError> {
    if proofs.is_empty() {
        return Err(CoreError::Unauthorized);
    }

    let mut current_holder = *owner;
    for delegation in proofs {
        if delegation.issuer != current_holder {
            return Err(CoreError::Unauthorized);
        }
        if delegation.ability != ability || delegation.resource != *resource {
            return Err(CoreError::Unauthorized);
        }
        if delegation.expires_at <= now_unix {
            return Err(CoreError::Unauthorized);
        }
        let payload = delegation_signing_payload(delegation);
        delegation
            .issuer
            .0
            .verify(&payload, &delegation.signature)
            .map_err(|_| CoreError::Unauthorized)?;
        current_holder = delegation.audience;
    }

    if current_holder != *issuer {
        return Err(CoreError::Unauthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::ByteRange;
    use ed25519_dalek::{Signer, SigningKey};

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn direct_invocation_by_resource_owner_verifies() {
        let owner_sk = key(1);
        let owner = Did(owner_sk.verifying_key());
        let resource = Resource::Space { space: owner };
        let arguments = InvocationArguments::Retrieve {
            range: Some(ByteRange::new(0, 1)),
        };
        let payload = signing_payload(&owner, Ability::Retrieve, &resource, &arguments);
        let signature = owner_sk.sign(&payload);

        let invocation = Invocation {
            issuer: owner,
            ability: Ability::Retrieve,
            resource,
            proofs: vec![],
            arguments,
            signature,
        };

        assert!(verify_invocation(&invocation, 1_700_000_000).is_ok());
    }

    #[test]
    fn invocation_without_proofs_from_non_owner_is_unauthorized() {
        let owner_sk = key(1);
        let owner = Did(owner_sk.verifying_key());
        let other_sk = key(2);
        let other = Did(other_sk.verifying_key());

        let resource = Resource::Space { space: owner };
        let arguments = InvocationArguments::Retrieve { range: None };
        let payload = signing_payload(&other, Ability::Retrieve, &resource, &arguments);
        let signature = other_sk.sign(&payload);

        let invocation = Invocation {
            issuer: other,
            ability: Ability::Retrieve,
            resource,
            proofs: vec![],
            arguments,
            signature,
        };

        let err = verify_invocation(&invocation, 1_700_000_000).unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized));
    }

    #[test]
    fn delegated_invocation_verifies_through_chain() {
        let owner_sk = key(1);
        let owner = Did(owner_sk.verifying_key());
        let agent_sk = key(2);
        let agent = Did(agent_sk.verifying_key());

        let resource = Resource::Space { space: owner };
        let delegation = Delegation {
            issuer: owner,
            audience: agent,
            ability: Ability::Retrieve,
            resource: resource.clone(),
            expires_at: 2_000_000_000,
            signature: owner_sk.sign(&delegation_signing_payload(&Delegation {
                issuer: owner,
                audience: agent,
                ability: Ability::Retrieve,
                resource: resource.clone(),
                expires_at: 2_000_000_000,
                signature: owner_sk.sign(b""),
            })),
        };

        let arguments = InvocationArguments::Retrieve { range: None };
        let payload = signing_payload(&agent, Ability::Retrieve, &resource, &arguments);
        let signature = agent_sk.sign(&payload);

        let invocation = Invocation {
            issuer: agent,
            ability: Ability::Retrieve,
            resource,
            proofs: vec![delegation],
            arguments,
            signature,
        };

        assert!(verify_invocation(&invocation, 1_700_000_000).is_ok());
    }

    #[test]
    fn expired_delegation_is_rejected() {
        let owner_sk = key(1);
        let owner = Did(owner_sk.verifying_key());
        let agent_sk = key(2);
        let agent = Did(agent_sk.verifying_key());
        let resource = Resource::Space { space: owner };

        let base = Delegation {
            issuer: owner,
            audience: agent,
            ability: Ability::Retrieve,
            resource: resource.clone(),
            expires_at: 100,
            signature: owner_sk.sign(b""),
        };
        let signature = owner_sk.sign(&delegation_signing_payload(&base));
        let delegation = Delegation { signature, ..base };

        let arguments = InvocationArguments::Retrieve { range: None };
        let payload = signing_payload(&agent, Ability::Retrieve, &resource, &arguments);
        let signature = agent_sk.sign(&payload);

        let invocation = Invocation {
            issuer: agent,
            ability: Ability::Retrieve,
            resource,
            proofs: vec![delegation],
            arguments,
            signature,
        };

        let err = verify_invocation(&invocation, 1_700_000_000).unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized));
    }
}

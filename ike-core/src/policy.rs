//! Connection policy, scoped to the one predicate the lease engine needs:
//! "may this peer reuse a lease?" (§4.D). This stands in for the
//! connection/SPD-route structures named as an external collaborator in
//! §1 — only the slice of "policy" this core actually consults is
//! modeled here.

use ike_id::Identity;

/// The authentication method negotiated for a connection. PSK and NULL
/// auth are excluded from the reuse predicate regardless of peer-id kind,
/// since they carry no distinctive identity worth keying a lease on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Psk,
    Null,
    PubKey,
}

/// Reusable iff the auth method isn't PSK/NULL, the peer-id kind is
/// distinctive (not `Null`/`None`/a raw IP literal), and the daemon-wide
/// `unique_ids` flag is set.
pub fn is_reusable(auth: AuthMethod, peer_id: &Identity<'_>, unique_ids: bool) -> bool {
    if matches!(auth, AuthMethod::Psk | AuthMethod::Null) {
        return false;
    }
    if matches!(
        peer_id,
        Identity::Null | Identity::None | Identity::Ipv4Addr(_) | Identity::Ipv6Addr(_)
    ) {
        return false;
    }
    unique_ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn psk_is_never_reusable() {
        let id = Identity::Fqdn("host.example.com".into());
        assert!(!is_reusable(AuthMethod::Psk, &id, true));
    }

    #[test]
    fn ip_literal_identity_is_never_reusable() {
        let id = Identity::Ipv4Addr(Ipv4Addr::new(192, 0, 2, 1));
        assert!(!is_reusable(AuthMethod::PubKey, &id, true));
    }

    #[test]
    fn distinctive_identity_is_reusable_only_when_unique_ids_set() {
        let id = Identity::Fqdn("host.example.com".into());
        assert!(is_reusable(AuthMethod::PubKey, &id, true));
        assert!(!is_reusable(AuthMethod::PubKey, &id, false));
    }
}

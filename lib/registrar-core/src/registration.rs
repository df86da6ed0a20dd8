//! Registration value type
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Where a registered backend actually lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendAddress {
    pub host: String,
    pub namespace: String,
    pub node: String,
    pub ip: String,
    pub port: u16,
}

/// One routable (service, instance, backend) tuple advertised under a single
/// routing-discovery name. An instance that belongs to several routing names
/// fans out into one Registration per name.
///
/// Registrations are plain values: two with the same fields are the same
/// registration, there is no identity beyond that.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Registration {
    pub service: String,
    pub instance: String,
    pub address: BackendAddress,
    pub registration_name: String,
}

impl Registration {
    /// Deterministic 64-bit content hash over all fields, in declaration
    /// order. Not a security hash; only used to detect changed snapshots,
    /// so a collision at worst suppresses one redundant registry write.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(service: &str, ip: &str, port: u16, name: &str) -> Registration {
        Registration {
            service: service.to_string(),
            instance: format!("{}-0", service),
            address: BackendAddress {
                host: format!("{}-0", service),
                namespace: "default".to_string(),
                node: "node-a".to_string(),
                ip: ip.to_string(),
                port,
            },
            registration_name: name.to_string(),
        }
    }

    #[test]
    fn test_hash_is_idempotent() {
        let reg = registration("a", "10.0.0.1", 8080, "a.main");
        assert_eq!(reg.content_hash(), reg.content_hash());
    }

    #[test]
    fn test_equal_values_hash_equal() {
        let a = registration("a", "10.0.0.1", 8080, "a.main");
        let b = registration("a", "10.0.0.1", 8080, "a.main");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_any_field_change_changes_hash() {
        let base = registration("a", "10.0.0.1", 8080, "a.main");

        let mut other = base.clone();
        other.service = "b".to_string();
        assert_ne!(base.content_hash(), other.content_hash());

        let mut other = base.clone();
        other.address.port = 8081;
        assert_ne!(base.content_hash(), other.content_hash());

        let mut other = base.clone();
        other.registration_name = "a.canary".to_string();
        assert_ne!(base.content_hash(), other.content_hash());
    }

    #[test]
    fn test_fields_do_not_alias_across_boundaries() {
        // "ab" + "c" must not hash like "a" + "bc"
        let mut a = registration("ab", "10.0.0.1", 8080, "a.main");
        a.instance = "c".to_string();
        let mut b = registration("a", "10.0.0.1", 8080, "a.main");
        b.instance = "bc".to_string();
        assert_ne!(a.content_hash(), b.content_hash());
    }
}

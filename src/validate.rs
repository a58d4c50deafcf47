//! Validation, change safety and defaulting of the OVN-Kubernetes settings.
//!
//! All checks return every problem found instead of stopping at the first,
//! so a single status update can report them together.

use std::net::Ipv6Addr;

use crate::crd::spec::MtuMigrationValues;
use crate::crd::{HybridOverlayConfig, NetworkSpec, OvnKubernetesConfig, PolicyAuditConfig};

const GENEVE_OVERHEAD: u32 = 100;
/// Transport mode, AES-GCM.
const IPSEC_OVERHEAD: u32 = 46;

const MIN_MTU: u32 = 576;
const MAX_MTU: u32 = 65536;

pub const DEFAULT_GENEVE_PORT: u32 = 6081;
const DEFAULT_AUDIT_RATE_LIMIT: u32 = 20;
const DEFAULT_AUDIT_MAX_FILE_SIZE: u32 = 50;
const DEFAULT_AUDIT_DESTINATION: &str = "null";
const DEFAULT_AUDIT_SYSLOG_FACILITY: &str = "local0";

fn is_ipv6_cidr(cidr: &str) -> bool {
    cidr.split('/')
        .next()
        .is_some_and(|ip| ip.parse::<Ipv6Addr>().is_ok())
}

/// Which families a list of CIDRs covers, as `(ipv4, ipv6)`.
fn families<'a>(cidrs: impl IntoIterator<Item = &'a str>) -> (bool, bool) {
    cidrs.into_iter().fold((false, false), |(v4, v6), cidr| {
        if is_ipv6_cidr(cidr) {
            (v4, true)
        } else {
            (true, v6)
        }
    })
}

/// Check that the spec is basically sane.
pub fn validate(spec: &NetworkSpec) -> Vec<String> {
    let mut errs = Vec::new();

    let (cn_v4, cn_v6) = families(spec.cluster_network.iter().map(|c| c.cidr.as_str()));
    if !cn_v4 && !cn_v6 {
        errs.push("ClusterNetwork cannot be empty".to_string());
    }

    let (sn_v4, sn_v6) = families(spec.service_network.iter().map(String::as_str));
    if !sn_v4 && !sn_v6 {
        errs.push("ServiceNetwork cannot be empty".to_string());
    }

    if cn_v4 != sn_v4 || cn_v6 != sn_v6 {
        errs.push("ClusterNetwork and ServiceNetwork must have matching IP families".to_string());
    }
    let pools = spec.service_network.len();
    if pools > 2 || (pools == 2 && !(sn_v4 && sn_v6)) {
        errs.push(
            "ServiceNetwork must have either a single CIDR or a dual-stack pair of CIDRs"
                .to_string(),
        );
    }

    if let Some(ovn) = spec.ovn() {
        if let Some(mtu) = ovn.mtu
            && !(MIN_MTU..=MAX_MTU).contains(&mtu)
        {
            errs.push(format!("invalid MTU {mtu}"));
        }
        if let Some(port) = ovn.geneve_port
            && !(1..=65535).contains(&port)
        {
            errs.push(format!("invalid GenevePort {port}"));
        }
    }

    errs
}

/// Bytes of tunnel overhead the pod MTU must leave room for.
pub fn encap_overhead(spec: &NetworkSpec) -> u32 {
    match spec.ovn() {
        Some(ovn) if ovn.ipsec_config.is_some() => GENEVE_OVERHEAD + IPSEC_OVERHEAD,
        _ => GENEVE_OVERHEAD,
    }
}

fn same_hybrid_overlay(a: &HybridOverlayConfig, b: &HybridOverlayConfig) -> bool {
    a.hybrid_overlay_vxlan_port == b.hybrid_overlay_vxlan_port
        && a.hybrid_cluster_network.len() == b.hybrid_cluster_network.len()
        && a.hybrid_cluster_network
            .iter()
            .zip(&b.hybrid_cluster_network)
            .all(|(x, y)| x.cidr == y.cidr && x.host_prefix == y.host_prefix)
}

fn network_mtu_migration(spec: &NetworkSpec) -> Option<&MtuMigrationValues> {
    spec.migration.as_ref()?.mtu.as_ref()?.network.as_ref()
}

fn fmt_opt(v: Option<u32>) -> String {
    v.map_or_else(|| "<unset>".to_string(), |v| v.to_string())
}

/// Reject changes to fields that cannot change on a running cluster.
pub fn is_change_safe(prev: &NetworkSpec, next: &NetworkSpec) -> Vec<String> {
    let empty = OvnKubernetesConfig::default();
    let pn = prev.ovn().unwrap_or(&empty);
    let nn = next.ovn().unwrap_or(&empty);
    let mut errs = Vec::new();

    if let Some(mtu_migration) = next.migration.as_ref().and_then(|m| m.mtu.as_ref()) {
        let net = mtu_migration.network.as_ref();
        let mach = mtu_migration.machine.as_ref();
        match (
            net.and_then(|n| n.from),
            net.and_then(|n| n.to),
            mach.and_then(|m| m.to),
        ) {
            (Some(from), Some(to), Some(machine_to)) => {
                // From is only checked against the applied MTU when it changes.
                let from_changed =
                    network_mtu_migration(prev).is_none_or(|p| p.from != Some(from));
                if from_changed && Some(from) != pn.mtu {
                    errs.push(format!(
                        "invalid Migration.MTU.Network.From({from}) not equal to the currently applied MTU({})",
                        fmt_opt(pn.mtu)
                    ));
                }
                let needed = to + encap_overhead(next);
                if needed > machine_to {
                    errs.push(format!(
                        "invalid Migration.MTU.Machine.To({machine_to}), has to be at least {needed}"
                    ));
                }
            }
            _ => errs.push(
                "invalid Migration.MTU, at least one of the required fields is missing"
                    .to_string(),
            ),
        }
    } else if pn.mtu != nn.mtu {
        errs.push("cannot change ovn-kubernetes MTU without migration".to_string());
    }

    if pn.geneve_port != nn.geneve_port {
        errs.push("cannot change ovn-kubernetes genevePort".to_string());
    }

    match (&pn.hybrid_overlay_config, &nn.hybrid_overlay_config) {
        (None, Some(_)) => {
            errs.push("cannot start a hybrid overlay network after install time".to_string());
        }
        (Some(p), Some(n)) if !same_hybrid_overlay(p, n) => {
            errs.push("cannot edit a running hybrid overlay network".to_string());
        }
        (Some(_), None) => errs.push("cannot edit a running hybrid overlay network".to_string()),
        _ => {}
    }

    match (&pn.ipsec_config, &nn.ipsec_config) {
        (None, Some(_)) => errs.push("cannot enable IPsec after install time".to_string()),
        (Some(_), None) => errs.push("cannot edit IPsec configuration at runtime".to_string()),
        _ => {}
    }

    errs
}

/// Fill unset fields. The MTU is taken from `previous` when it was applied
/// before, otherwise derived from the host MTU.
pub fn fill_defaults(conf: &mut NetworkSpec, previous: Option<&NetworkSpec>, host_mtu: u32) {
    let overhead = encap_overhead(conf);
    let sc = conf
        .default_network
        .ovn_kubernetes_config
        .get_or_insert_with(OvnKubernetesConfig::default);

    if sc.mtu.is_none() {
        let previous_mtu = previous.and_then(NetworkSpec::ovn).and_then(|o| o.mtu);
        sc.mtu = Some(previous_mtu.unwrap_or_else(|| host_mtu.saturating_sub(overhead)));
    }
    if sc.geneve_port.is_none() {
        sc.geneve_port = Some(DEFAULT_GENEVE_PORT);
    }

    let audit = sc
        .policy_audit_config
        .get_or_insert_with(PolicyAuditConfig::default);
    if audit.rate_limit.is_none() {
        audit.rate_limit = Some(DEFAULT_AUDIT_RATE_LIMIT);
    }
    if audit.max_file_size.is_none() {
        audit.max_file_size = Some(DEFAULT_AUDIT_MAX_FILE_SIZE);
    }
    if audit.destination.is_empty() {
        audit.destination = DEFAULT_AUDIT_DESTINATION.to_string();
    }
    if audit.syslog_facility.is_empty() {
        audit.syslog_facility = DEFAULT_AUDIT_SYSLOG_FACILITY.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(json: serde_json::Value) -> NetworkSpec {
        serde_json::from_value(json).unwrap()
    }

    fn v4() -> NetworkSpec {
        spec(serde_json::json!({
            "clusterNetwork": [{ "cidr": "10.128.0.0/14", "hostPrefix": 23 }],
            "serviceNetwork": ["172.30.0.0/16"],
            "defaultNetwork": { "type": "OVNKubernetes", "ovnKubernetesConfig": { "mtu": 1400, "genevePort": 6081 } }
        }))
    }

    #[test]
    fn test_validate_accepts_single_and_dual_stack() {
        assert!(validate(&v4()).is_empty());

        let dual = spec(serde_json::json!({
            "clusterNetwork": [
                { "cidr": "10.128.0.0/14", "hostPrefix": 23 },
                { "cidr": "fd01::/48", "hostPrefix": 64 }
            ],
            "serviceNetwork": ["172.30.0.0/16", "fd02::/112"]
        }));
        assert!(validate(&dual).is_empty());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let bad = spec(serde_json::json!({
            "clusterNetwork": [{ "cidr": "fd01::/48", "hostPrefix": 64 }],
            "serviceNetwork": ["172.30.0.0/16", "172.31.0.0/16"],
            "defaultNetwork": { "ovnKubernetesConfig": { "mtu": 100, "genevePort": 0 } }
        }));
        assert_eq!(
            validate(&bad),
            vec![
                "ClusterNetwork and ServiceNetwork must have matching IP families",
                "ServiceNetwork must have either a single CIDR or a dual-stack pair of CIDRs",
                "invalid MTU 100",
                "invalid GenevePort 0",
            ]
        );
    }

    #[test]
    fn test_validate_empty_networks() {
        let errs = validate(&NetworkSpec::default());
        assert!(errs.contains(&"ClusterNetwork cannot be empty".to_string()));
        assert!(errs.contains(&"ServiceNetwork cannot be empty".to_string()));
    }

    #[test]
    fn test_encap_overhead() {
        assert_eq!(encap_overhead(&v4()), 100);
        let mut with_ipsec = v4();
        with_ipsec
            .default_network
            .ovn_kubernetes_config
            .as_mut()
            .unwrap()
            .ipsec_config = Some(crate::crd::spec::IpsecConfig {});
        assert_eq!(encap_overhead(&with_ipsec), 146);
    }

    #[test]
    fn test_change_safe_identical() {
        assert!(is_change_safe(&v4(), &v4()).is_empty());
    }

    #[test]
    fn test_change_mtu_requires_migration() {
        let mut next = v4();
        next.default_network.ovn_kubernetes_config.as_mut().unwrap().mtu = Some(1300);
        assert_eq!(
            is_change_safe(&v4(), &next),
            vec!["cannot change ovn-kubernetes MTU without migration"]
        );
    }

    #[test]
    fn test_mtu_migration_checks() {
        let mut next = v4();
        next.migration = Some(
            serde_json::from_value(serde_json::json!({
                "mtu": { "network": { "from": 1400, "to": 8900 }, "machine": { "to": 9000 } }
            }))
            .unwrap(),
        );
        assert!(is_change_safe(&v4(), &next).is_empty());

        next.migration = Some(
            serde_json::from_value(serde_json::json!({
                "mtu": { "network": { "from": 1500, "to": 8950 }, "machine": { "to": 9000 } }
            }))
            .unwrap(),
        );
        assert_eq!(
            is_change_safe(&v4(), &next),
            vec![
                "invalid Migration.MTU.Network.From(1500) not equal to the currently applied MTU(1400)",
                "invalid Migration.MTU.Machine.To(9000), has to be at least 9050",
            ]
        );

        next.migration = Some(
            serde_json::from_value(serde_json::json!({ "mtu": { "network": { "from": 1400 } } }))
                .unwrap(),
        );
        assert_eq!(
            is_change_safe(&v4(), &next),
            vec!["invalid Migration.MTU, at least one of the required fields is missing"]
        );
    }

    #[test]
    fn test_mtu_migration_unchanged_from_is_not_rechecked() {
        let migration: crate::crd::spec::NetworkMigration = serde_json::from_value(serde_json::json!({
            "mtu": { "network": { "from": 1400, "to": 8900 }, "machine": { "to": 9000 } }
        }))
        .unwrap();
        let mut prev = v4();
        prev.migration = Some(migration.clone());
        prev.default_network.ovn_kubernetes_config.as_mut().unwrap().mtu = Some(8900);
        let mut next = prev.clone();
        next.migration = Some(migration);
        assert!(is_change_safe(&prev, &next).is_empty());
    }

    #[test]
    fn test_immutable_fields() {
        let prev = v4();
        let next = spec(serde_json::json!({
            "clusterNetwork": [{ "cidr": "10.128.0.0/14", "hostPrefix": 23 }],
            "serviceNetwork": ["172.30.0.0/16"],
            "defaultNetwork": { "ovnKubernetesConfig": {
                "mtu": 1400,
                "genevePort": 6082,
                "ipsecConfig": {},
                "hybridOverlayConfig": { "hybridClusterNetwork": [{ "cidr": "10.132.0.0/14", "hostPrefix": 23 }] }
            } }
        }));
        assert_eq!(
            is_change_safe(&prev, &next),
            vec![
                "cannot change ovn-kubernetes genevePort",
                "cannot start a hybrid overlay network after install time",
                "cannot enable IPsec after install time",
            ]
        );

        let mut edited = next.clone();
        edited
            .default_network
            .ovn_kubernetes_config
            .as_mut()
            .unwrap()
            .hybrid_overlay_config
            .as_mut()
            .unwrap()
            .hybrid_overlay_vxlan_port = Some(9898);
        edited.default_network.ovn_kubernetes_config.as_mut().unwrap().ipsec_config = None;
        assert_eq!(
            is_change_safe(&next, &edited),
            vec![
                "cannot edit a running hybrid overlay network",
                "cannot edit IPsec configuration at runtime",
            ]
        );
    }

    #[test]
    fn test_fill_defaults_from_host() {
        let mut conf = spec(serde_json::json!({ "defaultNetwork": { "type": "OVNKubernetes" } }));
        fill_defaults(&mut conf, None, 1500);
        let ovn = conf.ovn().unwrap();
        assert_eq!(ovn.mtu, Some(1400));
        assert_eq!(ovn.geneve_port, Some(6081));
        let audit = ovn.policy_audit_config.as_ref().unwrap();
        assert_eq!(audit.rate_limit, Some(20));
        assert_eq!(audit.max_file_size, Some(50));
        assert_eq!(audit.destination, "null");
        assert_eq!(audit.syslog_facility, "local0");
    }

    #[test]
    fn test_fill_defaults_prefers_previous_mtu() {
        let mut conf = NetworkSpec::default();
        fill_defaults(&mut conf, Some(&v4()), 9000);
        assert_eq!(conf.ovn().unwrap().mtu, Some(1400));
    }

    #[test]
    fn test_fill_defaults_ipsec_overhead_and_explicit_values() {
        let mut conf = spec(serde_json::json!({
            "defaultNetwork": { "ovnKubernetesConfig": {
                "ipsecConfig": {},
                "genevePort": 7000,
                "policyAuditConfig": { "rateLimit": 5, "destination": "udp:10.0.0.1:514" }
            } }
        }));
        fill_defaults(&mut conf, None, 1500);
        let ovn = conf.ovn().unwrap();
        assert_eq!(ovn.mtu, Some(1354));
        assert_eq!(ovn.geneve_port, Some(7000));
        let audit = ovn.policy_audit_config.as_ref().unwrap();
        assert_eq!(audit.rate_limit, Some(5));
        assert_eq!(audit.destination, "udp:10.0.0.1:514");
        assert_eq!(audit.syslog_facility, "local0");
    }
}

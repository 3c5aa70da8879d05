//! Canonicalization and comparison of resource state.
//!
//! A resource file is rewritten only when its canonicalized desired form
//! differs from its canonicalized current form. Comparisons here are
//! insensitive to irrelevant ordering but sensitive to every semantic field.

use crate::spec::HostEntry;

/// Order-insensitive list comparison. Blank entries are discarded before
/// comparing; duplicates remain significant.
pub fn unordered_eq(current: &[String], desired: &[String]) -> bool {
    let mut current = canonical(current);
    let mut desired = canonical(desired);
    current.sort();
    desired.sort();
    current == desired
}

fn canonical(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Structural comparison of hosts-file entries: insensitive to the order of
/// the entry list and to the order of each entry's hostname list.
pub fn host_entries_equal(current: &[HostEntry], desired: &[HostEntry]) -> bool {
    canonical_entries(current) == canonical_entries(desired)
}

fn canonical_entries(entries: &[HostEntry]) -> Vec<HostEntry> {
    let mut entries: Vec<HostEntry> = entries
        .iter()
        .map(|e| {
            let mut hostnames = e.hostnames.clone();
            hostnames.sort();
            HostEntry {
                ip: e.ip.clone(),
                hostnames,
            }
        })
        .collect();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ip: &str, hostnames: &[&str]) -> HostEntry {
        HostEntry {
            ip: ip.to_string(),
            hostnames: hostnames.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn nameserver_order_is_irrelevant() {
        let desired = vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()];
        let current = vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()];
        assert!(unordered_eq(&current, &desired));
    }

    #[test]
    fn added_nameserver_is_detected() {
        let desired = vec![
            "1.1.1.1".to_string(),
            "8.8.8.8".to_string(),
            "9.9.9.9".to_string(),
        ];
        let current = vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()];
        assert!(!unordered_eq(&current, &desired));
    }

    #[test]
    fn blank_entries_are_ignored() {
        let current = vec!["1.1.1.1".to_string(), "".to_string(), "  ".to_string()];
        let desired = vec!["1.1.1.1".to_string()];
        assert!(unordered_eq(&current, &desired));
    }

    #[test]
    fn duplicates_stay_significant() {
        let current = vec!["1.1.1.1".to_string(), "1.1.1.1".to_string()];
        let desired = vec!["1.1.1.1".to_string()];
        assert!(!unordered_eq(&current, &desired));
    }

    #[test]
    fn hostname_order_within_entry_is_irrelevant() {
        let current = vec![entry("10.0.0.1", &["a", "b"])];
        let desired = vec![entry("10.0.0.1", &["b", "a"])];
        assert!(host_entries_equal(&current, &desired));
    }

    #[test]
    fn removed_hostname_is_detected() {
        let current = vec![entry("10.0.0.1", &["a", "b"])];
        let desired = vec![entry("10.0.0.1", &["a"])];
        assert!(!host_entries_equal(&current, &desired));
    }

    #[test]
    fn entry_order_is_irrelevant() {
        let current = vec![entry("10.0.0.1", &["a"]), entry("10.0.0.2", &["b"])];
        let desired = vec![entry("10.0.0.2", &["b"]), entry("10.0.0.1", &["a"])];
        assert!(host_entries_equal(&current, &desired));
    }

    #[test]
    fn changed_ip_is_detected() {
        let current = vec![entry("10.0.0.1", &["a"])];
        let desired = vec![entry("10.0.0.3", &["a"])];
        assert!(!host_entries_equal(&current, &desired));
    }
}

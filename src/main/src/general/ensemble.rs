use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::general::metrics::Report;

lazy_static! {
    static ref PORT_SUFFIX: Regex = Regex::new(r":[0-9]{1,4}$").unwrap();
}

/// Bare hosts of an ensemble string like `a:2181, b:2181,c/chroot`.
///
/// Order is kept and duplicates are not removed.
pub fn parse_hosts(ensemble_text: &str) -> Vec<String> {
    let text = ensemble_text.trim();
    let text = match text.find('/') {
        Some(at) => &text[..at],
        None => text,
    };

    text.split(',')
        .map(str::trim)
        .filter(|host_port| !host_port.is_empty())
        .map(|host_port| PORT_SUFFIX.replace(host_port, "").into_owned())
        .collect()
}

/// One polled node. `index` is its column in every table row.
#[derive(Debug)]
pub struct NodeTarget {
    pub host: String,
    pub index: usize,
    last_report: Mutex<Option<Arc<Report>>>,
}

impl NodeTarget {
    pub fn new(host: String, index: usize) -> Self {
        Self {
            host,
            index,
            last_report: Mutex::new(None),
        }
    }

    pub fn last_report(&self) -> Option<Arc<Report>> {
        self.last_report.lock().clone()
    }

    pub(crate) fn set_last_report(&self, report: Option<Arc<Report>>) {
        *self.last_report.lock() = report;
    }
}

/// Targets parsed from one ensemble text. A new ensemble yields a new set
/// with a higher generation; rounds compare generations before committing.
#[derive(Debug)]
pub struct NodeSet {
    generation: u64,
    ensemble_text: String,
    targets: Vec<NodeTarget>,
}

impl NodeSet {
    pub fn parse(ensemble_text: &str, generation: u64) -> Self {
        let targets = parse_hosts(ensemble_text)
            .into_iter()
            .enumerate()
            .map(|(index, host)| NodeTarget::new(host, index))
            .collect();
        Self {
            generation,
            ensemble_text: ensemble_text.to_owned(),
            targets,
        }
    }

    pub fn empty() -> Self {
        Self::parse("", 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ensemble_text(&self) -> &str {
        &self.ensemble_text
    }

    pub fn targets(&self) -> &[NodeTarget] {
        &self.targets
    }

    pub fn target(&self, index: usize) -> Option<&NodeTarget> {
        self.targets.get(index)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.host.clone()).collect()
    }

    pub fn info(&self) -> NodeSetInfo {
        NodeSetInfo {
            generation: self.generation,
            hosts: self.hosts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSetInfo {
    pub generation: u64,
    pub hosts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts_ports_and_blanks() {
        assert_eq!(parse_hosts("a:1234,  b ,,c:9"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_hosts_strips_path() {
        assert_eq!(
            parse_hosts("  zk1:2181,zk2:2181/chroot/x,zk3"),
            vec!["zk1", "zk2"]
        );
        assert!(parse_hosts("/only/path").is_empty());
        assert!(parse_hosts("   ").is_empty());
    }

    #[test]
    fn test_parse_hosts_long_port_and_duplicates() {
        // five digits is not a port suffix we strip
        assert_eq!(
            parse_hosts("a:21810,a:2181,a"),
            vec!["a:21810", "a", "a"]
        );
    }

    #[test]
    fn test_node_set_indices() {
        let set = NodeSet::parse("a:1234,  b ,,c:9", 7);
        assert_eq!(set.generation(), 7);
        let got: Vec<_> = set
            .targets()
            .iter()
            .map(|t| (t.host.as_str(), t.index))
            .collect();
        assert_eq!(got, vec![("a", 0), ("b", 1), ("c", 2)]);
        assert!(set.targets().iter().all(|t| t.last_report().is_none()));
    }
}

use serde_json::Value;
use std::collections::HashSet;

use super::types::{Qualifiers, RoundReports, Stat};

/// Values of one constructed key across a round, aligned with node order.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedKey {
    pub key: String,
    pub qualifiers: Qualifiers,
    pub present_count: usize,
    pub values: Vec<Option<Value>>,
}

/// Reads `key` out of every report and hands the result to `sink` once.
pub fn collect_keyed<F>(key: String, qualifiers: Qualifiers, reports: &RoundReports, sink: &mut F)
where
    F: FnMut(CollectedKey),
{
    let mut present_count = 0;
    let values = reports
        .iter()
        .map(|report| {
            let value = report.as_ref().and_then(|r| r.value(&key)).cloned();
            if value.is_some() {
                present_count += 1;
            }
            value
        })
        .collect();

    sink(CollectedKey {
        key,
        qualifiers,
        present_count,
        values,
    });
}

pub fn summary_key(stat: Stat, name: &str) -> String {
    format!("{}_{}", stat, name)
}

pub fn set_member_key(entry: &str, stat: Stat, name: &str) -> String {
    format!("{}_{}_{}", entry, stat, name)
}

/// Counter and Gauge: the metric name is the key.
pub fn collect_scalar<F>(name: &str, reports: &RoundReports, sink: &mut F)
where
    F: FnMut(CollectedKey),
{
    collect_keyed(name.to_owned(), Qualifiers::scalar(), reports, sink);
}

/// `{stat}_{name}` for every stat in `stats`.
pub fn collect_summary<F>(name: &str, stats: &[Stat], reports: &RoundReports, sink: &mut F)
where
    F: FnMut(CollectedKey),
{
    for &stat in stats {
        collect_keyed(summary_key(stat, name), Qualifiers::stat(stat), reports, sink);
    }
}

/// `{entry}_{stat}_{name}` for every entry/stat pair.
pub fn collect_summary_set<F>(
    name: &str,
    entries: &[String],
    stats: &[Stat],
    reports: &RoundReports,
    sink: &mut F,
) where
    F: FnMut(CollectedKey),
{
    for entry in entries {
        for &stat in stats {
            collect_keyed(
                set_member_key(entry, stat, name),
                Qualifiers::entry_stat(entry, stat),
                reports,
                sink,
            );
        }
    }
}

/// Entry names of the summary set `name` found among `keys`.
///
/// A key qualifies when it looks like `{entry}_{stat}_{name}` with both
/// `entry` and `stat` non-empty; the entry is the text before the first
/// underscore. First appearance wins, duplicates are dropped.
pub fn discover_entries<'a, I>(name: &str, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut entries = Vec::new();
    let mut known = HashSet::new();

    for key in keys {
        let Some(entry) = set_entry_of(name, key) else {
            continue;
        };
        if known.insert(entry) {
            entries.push(entry.to_owned());
        }
    }
    entries
}

fn set_entry_of<'k>(name: &str, key: &'k str) -> Option<&'k str> {
    let head = key.strip_suffix(name)?;
    // `head` must end with the separator and carry something before it
    let prefix = head.strip_suffix('_')?;
    if prefix.is_empty() {
        return None;
    }
    let us_at = prefix.find('_')?;
    // non-empty entry before, non-empty stat after the first underscore
    if us_at == 0 || us_at + 1 >= prefix.len() {
        return None;
    }
    Some(&prefix[..us_at])
}

//! Flow export settings from the `ovs-flows-config` config map.

use std::collections::BTreeMap;

use tracing::warn;

use crate::names::FLOWS_CONFIG;

/// Flow collector settings taken from the config map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowsConfig {
    /// `host:port`, or `:port` meaning "the node's own address".
    pub target: String,
    pub cache_active_timeout: Option<u32>,
    pub cache_max_flows: Option<u32>,
    pub sampling: Option<u32>,
}

impl FlowsConfig {
    /// Parse the config map data. Returns `None` when no target is set.
    /// Malformed optional fields are logged and dropped.
    pub fn from_data(data: &BTreeMap<String, String>) -> Option<Self> {
        let target = if let Some(shared) = data.get("sharedTarget") {
            shared.clone()
        } else if let Some(port) = data.get("nodePort") {
            format!(":{port}")
        } else {
            warn!(
                "Wrong {} data section: either sharedTarget or nodePort is needed, ignoring",
                FLOWS_CONFIG
            );
            return None;
        };
        if target.is_empty() {
            warn!("Empty flow export target in {}, ignoring", FLOWS_CONFIG);
            return None;
        }

        let cache_active_timeout = data.get("cacheActiveTimeout").and_then(|raw| {
            match parse_duration_secs(raw) {
                Some(secs) => {
                    let whole = secs.trunc();
                    if secs.fract() != 0.0 {
                        warn!(
                            "cacheActiveTimeout {} will be truncated to {} seconds",
                            raw, whole
                        );
                    }
                    // durations beyond u32 seconds are clamped
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let secs = whole.clamp(0.0, f64::from(u32::MAX)) as u32;
                    Some(secs)
                }
                None => {
                    warn!("Wrong cacheActiveTimeout value {:?} in {}, ignoring", raw, FLOWS_CONFIG);
                    None
                }
            }
        });

        Some(Self {
            target,
            cache_active_timeout,
            cache_max_flows: parse_u32(data, "cacheMaxFlows"),
            sampling: parse_u32(data, "sampling"),
        })
    }

    /// Merge the config map target with collectors declared on the spec.
    pub fn merge_collectors(&self, existing: Option<&str>) -> String {
        match existing {
            Some(colls) if !colls.is_empty() => format!("{colls},{}", self.target),
            _ => self.target.clone(),
        }
    }
}

fn parse_u32(data: &BTreeMap<String, String>, key: &str) -> Option<u32> {
    let raw = data.get(key)?;
    match raw.parse::<u32>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Wrong {} value {:?} in {}, ignoring: {}", key, raw, FLOWS_CONFIG, e);
            None
        }
    }
}

/// Parse a duration such as `60s`, `1m30s` or `1.5h` into seconds.
///
/// Accepted units: `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`. Negative values are
/// rejected because they have no meaning as a cache timeout.
pub fn parse_duration_secs(input: &str) -> Option<f64> {
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest == "0" {
        return Some(0.0);
    }
    if rest.is_empty() || rest.starts_with('-') {
        return None;
    }

    let mut total = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return None;
        }
        let value: f64 = number.parse().ok()?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total += value * scale;
        rest = tail;
    }
    Some(total)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use toml::Value;

/// Deep-merge two TOML values.
/// `base` is the lower-priority layer, `overlay` wins on conflicts.
pub(super) fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = if let Some(base_val) = base_map.remove(&key) {
                    deep_merge(base_val, overlay_val)
                } else {
                    overlay_val
                };
                base_map.insert(key, merged);
            }
            Value::Table(base_map)
        }
        (_base, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_overlay_wins() {
        let merged = deep_merge(parse("max_turns = 10\nmodel = \"a\""), parse("max_turns = 20"));
        assert_eq!(merged["max_turns"].as_integer(), Some(20));
        assert_eq!(merged["model"].as_str(), Some("a"));
    }

    #[test]
    fn test_nested_tables_merge() {
        let merged = deep_merge(
            parse("[mode_models]\nctf = \"x\"\nvuln = \"y\""),
            parse("[mode_models]\nvuln = \"z\""),
        );
        assert_eq!(merged["mode_models"]["ctf"].as_str(), Some("x"));
        assert_eq!(merged["mode_models"]["vuln"].as_str(), Some("z"));
    }
}

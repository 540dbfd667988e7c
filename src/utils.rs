/*
 * Multistore (C) 2024 - 2026 Multistore Contributors.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

//! Small path and config utilities shared across the crate (spec §4.7).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ConfigError;

/// Joins two scheme-qualified path segments, collapsing duplicate slashes
/// at the boundary while preserving the URI scheme of `a` (if any).
///
/// `join_paths("msc://profile/a/", "/b/c")` -> `"msc://profile/a/b/c"`.
pub fn join_paths(a: &str, b: &str) -> String {
    if b.is_empty() {
        return a.trim_end_matches('/').to_string();
    }
    if a.is_empty() {
        return b.trim_start_matches('/').to_string();
    }

    let (scheme, rest) = match a.find("://") {
        Some(idx) => (&a[..idx + 3], &a[idx + 3..]),
        None => ("", a),
    };
    let left = rest.trim_end_matches('/');
    let right = b.trim_start_matches('/');
    if left.is_empty() {
        format!("{scheme}{right}")
    } else {
        format!("{scheme}{left}/{right}")
    }
}

/// Recursively substitutes `${VAR}` and `$VAR` references in every string
/// leaf of a JSON config document, reading from the process environment.
/// Returns [`ConfigError::UnresolvedEnvVar`] if a reference can't be
/// resolved (spec §4.7 `expand_env_vars`).
pub fn expand_env_vars(value: &Value) -> Result<Value, ConfigError> {
    match value {
        Value::String(s) => Ok(Value::String(expand_env_vars_in_str(s)?)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(expand_env_vars(item)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), expand_env_vars(v)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn expand_env_vars_in_str(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                let end = chars[i + 2..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|p| i + 2 + p);
                if let Some(end) = end {
                    let name: String = chars[i + 2..end].iter().collect();
                    out.push_str(&resolve_env(&name)?);
                    i = end + 1;
                    continue;
                }
            } else if chars[i + 1].is_alphabetic() || chars[i + 1] == '_' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(&resolve_env(&name)?);
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    Ok(out)
}

fn resolve_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::UnresolvedEnvVar(name.to_string()))
}

/// A single overwrite attempt detected by [`merge_dictionaries_no_overwrite`]:
/// the dotted key path, and the two conflicting values.
pub type MergeConflict = (String, Value, Value);

/// Deep-merges `b` into `a` without ever overwriting a scalar already
/// present in `a`; every attempted overwrite is collected as a conflict
/// record instead of silently applied (spec §4.7).
pub fn merge_dictionaries_no_overwrite(a: &Value, b: &Value) -> (Value, Vec<MergeConflict>) {
    let mut conflicts = Vec::new();
    let merged = merge_inner(a, b, "", &mut conflicts);
    (merged, conflicts)
}

fn merge_inner(a: &Value, b: &Value, path: &str, conflicts: &mut Vec<MergeConflict>) -> Value {
    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => {
            let mut out: BTreeMap<String, Value> =
                a_map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            for (k, b_val) in b_map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                match a_map.get(k) {
                    Some(a_val) => {
                        let merged = merge_inner(a_val, b_val, &child_path, conflicts);
                        out.insert(k.clone(), merged);
                    }
                    None => {
                        out.insert(k.clone(), b_val.clone());
                    }
                }
            }
            Value::Object(out.into_iter().collect())
        }
        (a_val, b_val) if a_val == b_val => a_val.clone(),
        (a_val, b_val) => {
            conflicts.push((path.to_string(), a_val.clone(), b_val.clone()));
            a_val.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_paths_collapses_slashes() {
        assert_eq!(join_paths("msc://p/a/", "/b/c"), "msc://p/a/b/c");
        assert_eq!(join_paths("a", ""), "a");
        assert_eq!(join_paths("", "b"), "b");
    }

    #[test]
    fn expand_env_vars_substitutes_both_forms() {
        std::env::set_var("MSC_TEST_VAR", "hello");
        let value = json!({"a": "${MSC_TEST_VAR}-$MSC_TEST_VAR"});
        let expanded = expand_env_vars(&value).unwrap();
        assert_eq!(expanded, json!({"a": "hello-hello"}));
    }

    #[test]
    fn expand_env_vars_errors_on_unresolved() {
        let value = json!("${MSC_TEST_VAR_DOES_NOT_EXIST_XYZ}");
        assert!(matches!(
            expand_env_vars(&value),
            Err(ConfigError::UnresolvedEnvVar(_))
        ));
    }

    #[test]
    fn merge_no_overwrite_collects_conflicts() {
        let a = json!({"x": 1, "nested": {"y": 2}});
        let b = json!({"x": 9, "nested": {"y": 3, "z": 4}});
        let (merged, conflicts) = merge_dictionaries_no_overwrite(&a, &b);
        assert_eq!(merged, json!({"x": 1, "nested": {"y": 2, "z": 4}}));
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.iter().any(|(k, _, _)| k == "x"));
        assert!(conflicts.iter().any(|(k, _, _)| k == "nested.y"));
    }
}

// src/unit/env.rs

//! Placeholder expansion for environment variable values.
//!
//! Recognised tokens:
//! - `{date}`: today's local date as `YYYYMMDD`
//! - `{app}`: an application name derived from the unit's working directory
//!
//! Resolution only touches values, never keys, and is a pure function of its
//! inputs (plus the clock for [`resolve`]), so units can resolve their
//! environments concurrently.

use std::path::Path;

use chrono::{Local, NaiveDate};

use super::EnvVars;

pub const DATE_TOKEN: &str = "{date}";
pub const APP_NAME_TOKEN: &str = "{app}";

/// Upper bound on the length of a derived application name.
pub const MAX_APP_NAME_LEN: usize = 32;

const FALLBACK_APP_NAME: &str = "app";

/// Expand placeholders in `value` using the current local date.
pub fn resolve(value: &str, working_dir: &Path) -> String {
    resolve_on(value, working_dir, Local::now().date_naive())
}

/// Expand placeholders in `value` for a fixed `today`.
pub fn resolve_on(value: &str, working_dir: &Path, today: NaiveDate) -> String {
    if !value.contains('{') {
        return value.to_string();
    }

    let mut out = value.to_string();
    if out.contains(DATE_TOKEN) {
        out = out.replace(DATE_TOKEN, &today.format("%Y%m%d").to_string());
    }
    if out.contains(APP_NAME_TOKEN) {
        out = out.replace(APP_NAME_TOKEN, &app_name(working_dir));
    }
    out
}

/// Resolve every value of `env`. Keys and their order are kept.
pub fn resolve_env(env: &EnvVars, working_dir: &Path) -> EnvVars {
    resolve_env_on(env, working_dir, Local::now().date_naive())
}

pub fn resolve_env_on(env: &EnvVars, working_dir: &Path, today: NaiveDate) -> EnvVars {
    env.iter()
        .map(|(key, value)| (key, resolve_on(value, working_dir, today)))
        .collect()
}

/// Derive an env-safe application name from a working directory.
///
/// `/src/Company.Api.Web` becomes `company`: the last path segment is cut at
/// its first `.`, lowercased, anything outside `[a-z0-9_-]` becomes `-`, and
/// the result is capped at [`MAX_APP_NAME_LEN`] characters.
pub fn app_name(working_dir: &Path) -> String {
    let segment = working_dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let head = segment.split('.').next().unwrap_or_default();

    let normalized: String = head
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed: String = normalized
        .trim_matches('-')
        .chars()
        .take(MAX_APP_NAME_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches('-');

    if trimmed.is_empty() {
        FALLBACK_APP_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn expands_date_and_app_tokens() {
        let dir = Path::new("/work/src/Contoso.Orders.Api");
        let out = resolve_on("logs/{app}-{date}.txt", dir, day());
        assert_eq!(out, "logs/contoso-20240307.txt");
    }

    #[test]
    fn repeated_tokens_are_all_replaced() {
        let out = resolve_on("{date}/{date}", Path::new("/x"), day());
        assert_eq!(out, "20240307/20240307");
    }

    #[test]
    fn unknown_braces_are_left_alone() {
        let out = resolve_on("{user}-{date}", Path::new("/x"), day());
        assert_eq!(out, "{user}-20240307");
    }

    #[test]
    fn whole_environment_keeps_keys_and_order() {
        let env: EnvVars = [("LOG", "{app}.log"), ("{app}", "x"), ("STAMP", "{date}")]
            .into_iter()
            .collect();
        let resolved = resolve_env_on(&env, Path::new("/srv/Shop.Api"), day());

        let pairs: Vec<_> = resolved.iter().collect();
        assert_eq!(
            pairs,
            vec![("LOG", "shop.log"), ("{app}", "x"), ("STAMP", "20240307")]
        );
    }

    #[test]
    fn app_name_normalizes_and_bounds_length() {
        assert_eq!(app_name(Path::new("/a/My Service.Host")), "my-service");
        assert_eq!(app_name(Path::new("/")), "app");
        assert_eq!(app_name(Path::new("/a/.hidden")), "app");

        let long = format!("/a/{}", "x".repeat(80));
        assert_eq!(app_name(Path::new(&long)).len(), MAX_APP_NAME_LEN);
    }

    proptest! {
        #[test]
        fn strings_without_placeholders_are_untouched(value in "[^{}]*") {
            let dir = Path::new("/srv/App.Web");
            let once = resolve_on(&value, dir, day());
            prop_assert_eq!(&once, &value);
            prop_assert_eq!(resolve_on(&once, dir, day()), once);
        }

        #[test]
        fn resolution_is_idempotent(value in "[a-z/ ]{0,24}(\\{date\\}|\\{app\\})?[a-z]{0,4}") {
            let dir = Path::new("/srv/App.Web");
            let once = resolve_on(&value, dir, day());
            prop_assert_eq!(resolve_on(&once, dir, day()), once);
        }

        #[test]
        fn keys_resolve_independently_of_each_other(
            entries in proptest::collection::btree_map(
                "[A-Z_]{1,8}",
                "[a-z]{0,4}(\\{date\\}|\\{app\\})?[a-z./]{0,6}",
                2..6,
            ),
        ) {
            let dir = Path::new("/srv/Billing.Worker");
            let forward: EnvVars = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let backward: EnvVars = entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();

            let a = resolve_env_on(&forward, dir, day());
            let b = resolve_env_on(&backward, dir, day());
            prop_assert_eq!(a.len(), entries.len());

            for (key, value) in &entries {
                let alone = resolve_on(value, dir, day());
                prop_assert_eq!(a.get(key), Some(alone.as_str()));
                prop_assert_eq!(b.get(key), Some(alone.as_str()));
            }

            let forward_keys: Vec<_> = a.iter().map(|(k, _)| k).collect();
            let input_keys: Vec<_> = entries.keys().map(String::as_str).collect();
            prop_assert_eq!(forward_keys, input_keys);
        }
    }
}

//! `OVERRIDE_<KEY>` environment overrides for [`ProxyConfig`].
//!
//! Every overridable field is listed once in [`OVERRIDE_FIELDS`] together with
//! a typed accessor, so adding a config field without an override entry is a
//! visible omission rather than a silent one.

use rustc_hash::FxHashMap;

use super::ProxyConfig;

const ENV_PREFIX: &str = "OVERRIDE_";

enum FieldSlot {
    Str(fn(&mut ProxyConfig) -> &mut String),
    U64(fn(&mut ProxyConfig) -> &mut u64),
    Usize(fn(&mut ProxyConfig) -> &mut usize),
    Map(fn(&mut ProxyConfig) -> &mut FxHashMap<String, String>),
}

struct OverrideField {
    key: &'static str,
    slot: FieldSlot,
}

const OVERRIDE_FIELDS: &[OverrideField] = &[
    OverrideField {
        key: "bind",
        slot: FieldSlot::Str(|c| &mut c.bind),
    },
    OverrideField {
        key: "proxy_url",
        slot: FieldSlot::Str(|c| &mut c.proxy_url),
    },
    OverrideField {
        key: "timeout",
        slot: FieldSlot::U64(|c| &mut c.timeout),
    },
    OverrideField {
        key: "codex_api_base",
        slot: FieldSlot::Str(|c| &mut c.codex_api_base),
    },
    OverrideField {
        key: "codex_api_key",
        slot: FieldSlot::Str(|c| &mut c.codex_api_key),
    },
    OverrideField {
        key: "codex_api_organization",
        slot: FieldSlot::Str(|c| &mut c.codex_api_organization),
    },
    OverrideField {
        key: "codex_api_project",
        slot: FieldSlot::Str(|c| &mut c.codex_api_project),
    },
    OverrideField {
        key: "codex_api_path",
        slot: FieldSlot::Str(|c| &mut c.codex_api_path),
    },
    OverrideField {
        key: "code_instruct_model",
        slot: FieldSlot::Str(|c| &mut c.code_instruct_model),
    },
    OverrideField {
        key: "chat_api_base",
        slot: FieldSlot::Str(|c| &mut c.chat_api_base),
    },
    OverrideField {
        key: "chat_api_key",
        slot: FieldSlot::Str(|c| &mut c.chat_api_key),
    },
    OverrideField {
        key: "chat_api_organization",
        slot: FieldSlot::Str(|c| &mut c.chat_api_organization),
    },
    OverrideField {
        key: "chat_api_project",
        slot: FieldSlot::Str(|c| &mut c.chat_api_project),
    },
    OverrideField {
        key: "chat_max_tokens",
        slot: FieldSlot::U64(|c| &mut c.chat_max_tokens),
    },
    OverrideField {
        key: "chat_model_default",
        slot: FieldSlot::Str(|c| &mut c.chat_model_default),
    },
    OverrideField {
        key: "chat_model_map",
        slot: FieldSlot::Map(|c| &mut c.chat_model_map),
    },
    OverrideField {
        key: "chat_locale",
        slot: FieldSlot::Str(|c| &mut c.chat_locale),
    },
    OverrideField {
        key: "auth_token",
        slot: FieldSlot::Str(|c| &mut c.auth_token),
    },
    OverrideField {
        key: "log_level",
        slot: FieldSlot::Str(|c| &mut c.log_level),
    },
    OverrideField {
        key: "http_pool_max_idle_per_host",
        slot: FieldSlot::Usize(|c| &mut c.http_pool_max_idle_per_host),
    },
    OverrideField {
        key: "http_pool_idle_timeout_secs",
        slot: FieldSlot::U64(|c| &mut c.http_pool_idle_timeout_secs),
    },
];

/// Environment variable name for a config key, e.g. `OVERRIDE_CHAT_LOCALE`.
#[must_use]
pub fn override_env_name(key: &str) -> String {
    let mut name = String::with_capacity(ENV_PREFIX.len() + key.len());
    name.push_str(ENV_PREFIX);
    name.push_str(&key.to_ascii_uppercase());
    name
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut ProxyConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to resolve environment variable names.
///
/// Values that do not parse as the field's type are ignored and the existing
/// value is kept.
pub fn apply_overrides_with<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for field in OVERRIDE_FIELDS {
        let Some(raw) = lookup(&override_env_name(field.key)) else {
            continue;
        };
        match &field.slot {
            FieldSlot::Str(slot) => *slot(config) = raw,
            FieldSlot::U64(slot) => {
                if let Ok(value) = raw.trim().parse::<u64>() {
                    *slot(config) = value;
                }
            }
            FieldSlot::Usize(slot) => {
                if let Ok(value) = raw.trim().parse::<usize>() {
                    *slot(config) = value;
                }
            }
            FieldSlot::Map(slot) => {
                if let Ok(value) = serde_json::from_str::<FxHashMap<String, String>>(&raw) {
                    *slot(config) = value;
                }
            }
        }
    }
}

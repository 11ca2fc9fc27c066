//! Security configuration and its resolution.
//!
//! A [`SecurityConfig`] is always fully populated. It is produced by
//! resolving a [`SecurityConfigInput`], which is either the name of a
//! [`Preset`] or a partial override:
//!
//! ```toml
//! preset = "good"                  # base preset, `better` when omitted
//!
//! [vault_restrictions]
//! min_password_length = 20
//!
//! [credential_restrictions]
//! max_password_age = "unlimited"
//!
//! [credential_restrictions.password_complexity]
//! forbid_url = false
//! ```
//!
//! Each restriction block is resolved on its own. A block may be a preset
//! name, or a partial block that is merged field by field onto its own
//! `preset` (or the config's base preset). The nested `password_complexity`
//! table is merged separately, so overriding one complexity switch keeps the
//! others.
//!
//! Numeric thresholds are signed and are not validated here. Rules check
//! their own thresholds when they are enabled and report a configuration
//! error for out-of-range values.
//!
//! A resolved block carries its preset tag only while its values equal that
//! preset, so resolving an already-resolved config returns it unchanged.

use std::path::Path;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PolicyError, Result};

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Named security level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    None,
    Basic,
    Good,
    #[default]
    Better,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Self::None, Self::Basic, Self::Good, Self::Better];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Good => "good",
            Self::Better => "better",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "basic" => Some(Self::Basic),
            "good" => Some(Self::Good),
            "better" => Some(Self::Better),
            _ => None,
        }
    }

    /// The preset's vault restrictions, tagged with the preset.
    pub fn vault_restriction(self) -> VaultRestriction {
        let (min_len, max_age, keyfile, decrypt, vault_code, same_loc, cats, name, path, reuse) =
            match self {
                Self::None => (0, AgeLimit::Unlimited, false, 100, true, true, 1, false, false, false),
                Self::Basic => (10, AgeLimit::Hours(17520.0), false, 400, true, false, 2, false, false, true),
                Self::Good => (15, AgeLimit::Hours(8760.0), true, 700, false, false, 3, true, false, true),
                Self::Better => (30, AgeLimit::Hours(2190.0), true, 2000, false, false, 3, true, true, true),
            };
        VaultRestriction {
            preset: Some(self),
            min_password_length: min_len,
            max_password_age: max_age,
            require_keyfile: keyfile,
            min_decryption_time: decrypt,
            allow_vault_with_code: vault_code,
            allow_keyfile_with_code: true,
            allow_vault_and_keyfile_same_location: same_loc,
            password_complexity: VaultPasswordComplexity {
                min_character_categories: cats,
                forbid_vault_name: name,
                forbid_vault_path: path,
                forbid_reuse: reuse,
            },
        }
    }

    /// The preset's credential restrictions, tagged with the preset.
    pub fn credential_restriction(self) -> CredentialRestriction {
        let (min_len, require_exp, allow_expired, max_age, cats, username, url, reuse) = match self
        {
            Self::None => (0, false, true, AgeLimit::Unlimited, 1, false, false, false),
            Self::Basic => (10, false, false, AgeLimit::Hours(17520.0), 2, true, false, true),
            Self::Good => (15, false, false, AgeLimit::Hours(8760.0), 3, true, true, true),
            Self::Better => (30, true, false, AgeLimit::Hours(2190.0), 3, true, true, true),
        };
        CredentialRestriction {
            preset: Some(self),
            min_password_length: min_len,
            require_expiration: require_exp,
            allow_expired,
            max_password_age: max_age,
            password_complexity: CredentialPasswordComplexity {
                min_character_categories: cats,
                forbid_username: username,
                forbid_url: url,
                forbid_reuse: reuse,
            },
        }
    }

    /// The preset's prompt settings.
    pub fn prompt(self) -> PromptConfig {
        match self {
            Self::None => PromptConfig {
                method: PromptMethod::Cli,
                allow_password_save: true,
                password_save_default: true,
            },
            Self::Basic => PromptConfig {
                method: PromptMethod::Popup,
                allow_password_save: true,
                password_save_default: false,
            },
            Self::Good | Self::Better => PromptConfig {
                method: PromptMethod::Popup,
                allow_password_save: false,
                password_save_default: false,
            },
        }
    }

    /// The complete configuration for this preset.
    pub fn config(self) -> SecurityConfig {
        SecurityConfig {
            preset: Some(self),
            vault_restrictions: self.vault_restriction(),
            credential_restrictions: self.credential_restriction(),
            prompt: self.prompt(),
        }
    }
}

impl FromStr for Preset {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| PolicyError::UnknownPreset {
            name: s.to_string(),
        })
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Age limit
// ---------------------------------------------------------------------------

/// Maximum password age.
///
/// Serialized as a number of hours or the string `"unlimited"`. On input
/// `"infinite"`, `"inf"` and an infinite float (TOML `inf`) are accepted as
/// well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgeLimit {
    Hours(f64),
    Unlimited,
}

impl AgeLimit {
    pub fn hours(&self) -> Option<f64> {
        match self {
            Self::Hours(h) => Some(*h),
            Self::Unlimited => None,
        }
    }

    /// Whether `age_hours` is beyond the limit.
    pub fn is_exceeded_by(&self, age_hours: f64) -> bool {
        match self {
            Self::Hours(max) => age_hours > *max,
            Self::Unlimited => false,
        }
    }
}

impl std::fmt::Display for AgeLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hours(h) => write!(f, "{h}h"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Serialize for AgeLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Hours(h) => serializer.serialize_f64(*h),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for AgeLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AgeLimitVisitor;

        impl Visitor<'_> for AgeLimitVisitor {
            type Value = AgeLimit;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a number of hours or \"unlimited\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<AgeLimit, E> {
                if v.is_infinite() && v > 0.0 {
                    Ok(AgeLimit::Unlimited)
                } else if v.is_nan() {
                    Err(E::custom("password age can not be NaN"))
                } else {
                    Ok(AgeLimit::Hours(v))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<AgeLimit, E> {
                Ok(AgeLimit::Hours(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<AgeLimit, E> {
                Ok(AgeLimit::Hours(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<AgeLimit, E> {
                match v.trim().to_ascii_lowercase().as_str() {
                    "unlimited" | "infinite" | "infinity" | "inf" => Ok(AgeLimit::Unlimited),
                    other => other
                        .parse::<f64>()
                        .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
                        .and_then(|h| self.visit_f64(h)),
                }
            }
        }

        deserializer.deserialize_any(AgeLimitVisitor)
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// How the vault master password is requested from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMethod {
    Cli,
    Popup,
    #[serde(alias = "environment-variable", alias = "environmentVariable")]
    Env,
}

impl PromptMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Popup => "popup",
            Self::Env => "env",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cli" => Some(Self::Cli),
            "popup" => Some(Self::Popup),
            "env" | "environment-variable" | "environmentVariable" => Some(Self::Env),
            _ => None,
        }
    }
}

impl FromStr for PromptMethod {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| PolicyError::UnknownPromptMethod {
            name: s.to_string(),
        })
    }
}

impl std::fmt::Display for PromptMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub method: PromptMethod,
    /// Offer to remember the password in the OS credential manager.
    pub allow_password_save: bool,
    /// Default answer for that offer.
    pub password_save_default: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptOverride {
    pub method: Option<PromptMethod>,
    pub allow_password_save: Option<bool>,
    pub password_save_default: Option<bool>,
}

impl PromptOverride {
    fn merge_onto(&self, base: PromptConfig) -> PromptConfig {
        PromptConfig {
            method: self.method.unwrap_or(base.method),
            allow_password_save: self.allow_password_save.unwrap_or(base.allow_password_save),
            password_save_default: self
                .password_save_default
                .unwrap_or(base.password_save_default),
        }
    }
}

// ---------------------------------------------------------------------------
// Vault restrictions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPasswordComplexity {
    /// Required number of character categories, 1 to 4.
    pub min_character_categories: i64,
    pub forbid_vault_name: bool,
    pub forbid_vault_path: bool,
    pub forbid_reuse: bool,
}

/// Restrictions on the vault itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultRestriction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    pub min_password_length: i64,
    pub max_password_age: AgeLimit,
    /// Require a keyfile as second authentication factor.
    pub require_keyfile: bool,
    /// Minimum key derivation time, in milliseconds.
    pub min_decryption_time: i64,
    pub allow_vault_with_code: bool,
    pub allow_keyfile_with_code: bool,
    pub allow_vault_and_keyfile_same_location: bool,
    pub password_complexity: VaultPasswordComplexity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultComplexityOverride {
    pub min_character_categories: Option<i64>,
    pub forbid_vault_name: Option<bool>,
    pub forbid_vault_path: Option<bool>,
    pub forbid_reuse: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultRestrictionOverride {
    pub preset: Option<Preset>,
    pub min_password_length: Option<i64>,
    pub max_password_age: Option<AgeLimit>,
    pub require_keyfile: Option<bool>,
    pub min_decryption_time: Option<i64>,
    pub allow_vault_with_code: Option<bool>,
    pub allow_keyfile_with_code: Option<bool>,
    pub allow_vault_and_keyfile_same_location: Option<bool>,
    pub password_complexity: Option<VaultComplexityOverride>,
}

/// A vault restriction block as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VaultRestrictionInput {
    Preset(Preset),
    Override(VaultRestrictionOverride),
}

impl VaultRestrictionInput {
    /// Resolve against `base` when the block names no preset of its own.
    pub fn resolve(&self, base: Preset) -> VaultRestriction {
        match self {
            Self::Preset(p) => p.vault_restriction(),
            Self::Override(o) => {
                let base = o.preset.unwrap_or(base);
                let b = base.vault_restriction();
                let c = o.password_complexity.unwrap_or_default();
                let bc = b.password_complexity;
                let mut merged = VaultRestriction {
                    preset: None,
                    min_password_length: o.min_password_length.unwrap_or(b.min_password_length),
                    max_password_age: o.max_password_age.unwrap_or(b.max_password_age),
                    require_keyfile: o.require_keyfile.unwrap_or(b.require_keyfile),
                    min_decryption_time: o.min_decryption_time.unwrap_or(b.min_decryption_time),
                    allow_vault_with_code: o
                        .allow_vault_with_code
                        .unwrap_or(b.allow_vault_with_code),
                    allow_keyfile_with_code: o
                        .allow_keyfile_with_code
                        .unwrap_or(b.allow_keyfile_with_code),
                    allow_vault_and_keyfile_same_location: o
                        .allow_vault_and_keyfile_same_location
                        .unwrap_or(b.allow_vault_and_keyfile_same_location),
                    password_complexity: VaultPasswordComplexity {
                        min_character_categories: c
                            .min_character_categories
                            .unwrap_or(bc.min_character_categories),
                        forbid_vault_name: c.forbid_vault_name.unwrap_or(bc.forbid_vault_name),
                        forbid_vault_path: c.forbid_vault_path.unwrap_or(bc.forbid_vault_path),
                        forbid_reuse: c.forbid_reuse.unwrap_or(bc.forbid_reuse),
                    },
                };
                merged.preset = (merged == VaultRestriction { preset: None, ..b }).then_some(base);
                merged
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Credential restrictions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPasswordComplexity {
    /// Required number of character categories, 1 to 4.
    pub min_character_categories: i64,
    pub forbid_username: bool,
    pub forbid_url: bool,
    pub forbid_reuse: bool,
}

/// Restrictions on individual credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRestriction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    pub min_password_length: i64,
    pub require_expiration: bool,
    pub allow_expired: bool,
    pub max_password_age: AgeLimit,
    pub password_complexity: CredentialPasswordComplexity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialComplexityOverride {
    pub min_character_categories: Option<i64>,
    pub forbid_username: Option<bool>,
    pub forbid_url: Option<bool>,
    pub forbid_reuse: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialRestrictionOverride {
    pub preset: Option<Preset>,
    pub min_password_length: Option<i64>,
    pub require_expiration: Option<bool>,
    pub allow_expired: Option<bool>,
    pub max_password_age: Option<AgeLimit>,
    pub password_complexity: Option<CredentialComplexityOverride>,
}

/// A credential restriction block as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialRestrictionInput {
    Preset(Preset),
    Override(CredentialRestrictionOverride),
}

impl CredentialRestrictionInput {
    /// Resolve against `base` when the block names no preset of its own.
    pub fn resolve(&self, base: Preset) -> CredentialRestriction {
        match self {
            Self::Preset(p) => p.credential_restriction(),
            Self::Override(o) => {
                let base = o.preset.unwrap_or(base);
                let b = base.credential_restriction();
                let c = o.password_complexity.unwrap_or_default();
                let bc = b.password_complexity;
                let mut merged = CredentialRestriction {
                    preset: None,
                    min_password_length: o.min_password_length.unwrap_or(b.min_password_length),
                    require_expiration: o.require_expiration.unwrap_or(b.require_expiration),
                    allow_expired: o.allow_expired.unwrap_or(b.allow_expired),
                    max_password_age: o.max_password_age.unwrap_or(b.max_password_age),
                    password_complexity: CredentialPasswordComplexity {
                        min_character_categories: c
                            .min_character_categories
                            .unwrap_or(bc.min_character_categories),
                        forbid_username: c.forbid_username.unwrap_or(bc.forbid_username),
                        forbid_url: c.forbid_url.unwrap_or(bc.forbid_url),
                        forbid_reuse: c.forbid_reuse.unwrap_or(bc.forbid_reuse),
                    },
                };
                merged.preset =
                    (merged == CredentialRestriction { preset: None, ..b }).then_some(base);
                merged
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Security config
// ---------------------------------------------------------------------------

/// Fully resolved security configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Set while the whole config equals this preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    pub vault_restrictions: VaultRestriction,
    pub credential_restrictions: CredentialRestriction,
    pub prompt: PromptConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Preset::default().config()
    }
}

impl SecurityConfig {
    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The override that reproduces this configuration when resolved.
    pub fn as_input(&self) -> SecurityConfigInput {
        if let Some(p) = self.preset {
            return SecurityConfigInput::Preset(p);
        }
        let v = &self.vault_restrictions;
        let c = &self.credential_restrictions;
        SecurityConfigInput::Override(SecurityConfigOverride {
            preset: None,
            vault_restrictions: Some(VaultRestrictionInput::Override(VaultRestrictionOverride {
                preset: v.preset,
                min_password_length: Some(v.min_password_length),
                max_password_age: Some(v.max_password_age),
                require_keyfile: Some(v.require_keyfile),
                min_decryption_time: Some(v.min_decryption_time),
                allow_vault_with_code: Some(v.allow_vault_with_code),
                allow_keyfile_with_code: Some(v.allow_keyfile_with_code),
                allow_vault_and_keyfile_same_location: Some(
                    v.allow_vault_and_keyfile_same_location,
                ),
                password_complexity: Some(VaultComplexityOverride {
                    min_character_categories: Some(v.password_complexity.min_character_categories),
                    forbid_vault_name: Some(v.password_complexity.forbid_vault_name),
                    forbid_vault_path: Some(v.password_complexity.forbid_vault_path),
                    forbid_reuse: Some(v.password_complexity.forbid_reuse),
                }),
            })),
            credential_restrictions: Some(CredentialRestrictionInput::Override(
                CredentialRestrictionOverride {
                    preset: c.preset,
                    min_password_length: Some(c.min_password_length),
                    require_expiration: Some(c.require_expiration),
                    allow_expired: Some(c.allow_expired),
                    max_password_age: Some(c.max_password_age),
                    password_complexity: Some(CredentialComplexityOverride {
                        min_character_categories: Some(
                            c.password_complexity.min_character_categories,
                        ),
                        forbid_username: Some(c.password_complexity.forbid_username),
                        forbid_url: Some(c.password_complexity.forbid_url),
                        forbid_reuse: Some(c.password_complexity.forbid_reuse),
                    }),
                },
            )),
            prompt: Some(PromptOverride {
                method: Some(self.prompt.method),
                allow_password_save: Some(self.prompt.allow_password_save),
                password_save_default: Some(self.prompt.password_save_default),
            }),
        })
    }
}

/// Partial configuration merged onto a base preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfigOverride {
    /// Base preset for blocks and fields left out; `better` when omitted.
    pub preset: Option<Preset>,
    pub vault_restrictions: Option<VaultRestrictionInput>,
    pub credential_restrictions: Option<CredentialRestrictionInput>,
    pub prompt: Option<PromptOverride>,
}

/// Security configuration as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecurityConfigInput {
    Preset(Preset),
    Override(SecurityConfigOverride),
}

impl Default for SecurityConfigInput {
    fn default() -> Self {
        Self::Preset(Preset::default())
    }
}

impl From<Preset> for SecurityConfigInput {
    fn from(p: Preset) -> Self {
        Self::Preset(p)
    }
}

impl SecurityConfigInput {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Parse a JSON document (a preset name string or an object).
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a file: `.json` files are JSON, everything else TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let input = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            _ => Self::from_toml_str(&text)?,
        };
        tracing::debug!(path = %path.display(), "security config loaded");
        Ok(input)
    }

    /// Produce the fully populated configuration.
    pub fn resolve(&self) -> SecurityConfig {
        match self {
            Self::Preset(p) => p.config(),
            Self::Override(o) => {
                let base = o.preset.unwrap_or_default();
                let vault_restrictions = o
                    .vault_restrictions
                    .as_ref()
                    .map_or_else(|| base.vault_restriction(), |v| v.resolve(base));
                let credential_restrictions = o
                    .credential_restrictions
                    .as_ref()
                    .map_or_else(|| base.credential_restriction(), |c| c.resolve(base));
                let prompt = o
                    .prompt
                    .map_or_else(|| base.prompt(), |p| p.merge_onto(base.prompt()));

                let preset = (vault_restrictions.preset == Some(base)
                    && credential_restrictions.preset == Some(base)
                    && prompt == base.prompt())
                .then_some(base);

                SecurityConfig {
                    preset,
                    vault_restrictions,
                    credential_restrictions,
                    prompt,
                }
            }
        }
    }
}

/// Resolve any configuration input.
pub fn resolve_config(input: impl Into<SecurityConfigInput>) -> SecurityConfig {
    input.into().resolve()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

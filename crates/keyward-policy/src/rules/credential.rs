//! Credential rules, in registration order.

use std::sync::LazyLock;

use async_trait::async_trait;
use keyward_kernel::{Activation, Rule, RuleFailure, Rulebook, Verdict};
use regex::Regex;
use url::{Host, Url};

use super::{
    CredentialContext, categories_in, check_max_age, check_min_categories, check_min_length,
    disabled_by, register, too_short,
};
use crate::fuzzy::{Strictness, detect_partial_match};

/// Host fragments of this many characters or fewer are not checked.
const MAX_IGNORED_FRAGMENT_LEN: usize = 3;

/// An ASCII word character on both sides of a dot.
static DOMAIN_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u:\w)\.(?-u:\w)").expect("domain pattern is a valid regex")
});

pub(super) fn catalog() -> Rulebook<CredentialContext> {
    let mut book = Rulebook::new("credential");
    register(&mut book, Expired);
    register(&mut book, PasswordAge);
    register(&mut book, MinCharacterCategories);
    register(&mut book, ForbidUrl);
    register(&mut book, ForbidUsername);
    register(&mut book, ForbidReuse);
    register(&mut book, PasswordLength);
    register(&mut book, RequireExpiration);
    book
}

// ---------------------------------------------------------------------------
// Expiration
// ---------------------------------------------------------------------------

pub struct Expired;

#[async_trait]
impl Rule<CredentialContext> for Expired {
    fn name(&self) -> &'static str {
        "credential/expired"
    }

    fn description(&self) -> &'static str {
        "Refuse credentials whose expiration date has passed.\n\n\
         An expiration date is a promise to rotate the password. Once it has passed, \
         the password should be changed before it is used again."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        if ctx.config.credential_restrictions.allow_expired {
            return disabled_by("allow_expired");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        if ctx.credential.expired {
            return Err(RuleFailure::violation("Credential expired"));
        }
        Ok(())
    }
}

pub struct RequireExpiration;

#[async_trait]
impl Rule<CredentialContext> for RequireExpiration {
    fn name(&self) -> &'static str {
        "credential/require-expiration"
    }

    fn description(&self) -> &'static str {
        "Require every credential to have an expiration date.\n\n\
         Without one, nothing reminds anybody to rotate the password."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        if !ctx.config.credential_restrictions.require_expiration {
            return disabled_by("require_expiration");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        if !ctx.credential.has_expiration {
            return Err(RuleFailure::violation("Credential has no expiration date"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Password strength
// ---------------------------------------------------------------------------

pub struct PasswordAge;

#[async_trait]
impl Rule<CredentialContext> for PasswordAge {
    fn name(&self) -> &'static str {
        "credential/password/age"
    }

    fn description(&self) -> &'static str {
        "Ensure that a credential password is not used for too long.\n\n\
         The longer a password lives, the more places it ends up in and the more people \
         may know it. Saving an entry without changing its password does not reset the clock."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        check_max_age(ctx.config.credential_restrictions.max_password_age)
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        let max = ctx.config.credential_restrictions.max_password_age;
        if max.is_exceeded_by(ctx.credential.password_age) {
            return Err(RuleFailure::violation(
                "Credential password is too old, change it",
            ));
        }
        Ok(())
    }
}

pub struct MinCharacterCategories;

#[async_trait]
impl Rule<CredentialContext> for MinCharacterCategories {
    fn name(&self) -> &'static str {
        "credential/password/complexity/min-character-categories"
    }

    fn description(&self) -> &'static str {
        "Ensure that the credential password mixes character categories.\n\n\
         The categories are lowercase letters, uppercase letters, digits and symbols. \
         Drawing from more of them makes a password of the same length much harder to guess."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        check_min_categories(
            ctx.config
                .credential_restrictions
                .password_complexity
                .min_character_categories,
        )
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        let min = ctx
            .config
            .credential_restrictions
            .password_complexity
            .min_character_categories;
        if min == 1 {
            return Ok(());
        }

        let count = categories_in(&ctx.credential.data.password);
        if count < min {
            return Err(RuleFailure::violation(format!(
                "Credential password not complex enough. \
                 Should contain at least {min} characters categories but only contains {count}."
            )));
        }
        Ok(())
    }
}

pub struct PasswordLength;

#[async_trait]
impl Rule<CredentialContext> for PasswordLength {
    fn name(&self) -> &'static str {
        "credential/password/length"
    }

    fn description(&self) -> &'static str {
        "Enforce a minimum credential password length.\n\n\
         Every extra character multiplies the work needed to brute force the password."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        check_min_length(ctx.config.credential_restrictions.min_password_length)
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        let min = ctx.config.credential_restrictions.min_password_length;
        if too_short(&ctx.credential.data.password, min) {
            return Err(RuleFailure::violation(format!(
                "Credential password too short. Should be at least {min} characters."
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Non-secrets in the password
// ---------------------------------------------------------------------------

pub struct ForbidUrl;

#[async_trait]
impl Rule<CredentialContext> for ForbidUrl {
    fn name(&self) -> &'static str {
        "credential/password/complexity/forbid-url"
    }

    fn description(&self) -> &'static str {
        "Ensure that the credential password does not contain part of the website's domain.\n\n\
         Building a password around the site it protects makes it easy to remember and \
         just as easy to guess for anyone who knows the target.\n\n\
         Detection uses fuzzy matching. Only the host name of the URL is considered."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        if !ctx
            .config
            .credential_restrictions
            .password_complexity
            .forbid_url
        {
            return disabled_by("forbid_url");
        }
        let data = &ctx.credential.data;
        if data.url.trim().is_empty() {
            return Activation::disabled("Credential has no URL");
        }
        if host_fragments(&data.url).is_none() {
            return Activation::disabled("Credential URL has no host name");
        }
        if data.password.is_empty() {
            return Activation::disabled("Credential has no password");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        let data = &ctx.credential.data;
        let fragments = host_fragments(&data.url).unwrap_or_default();

        let leaked = fragments
            .iter()
            .filter(|f| f.chars().count() > MAX_IGNORED_FRAGMENT_LEN)
            .any(|f| detect_partial_match(&data.password, f, Strictness::Strict).is_some());
        if leaked {
            return Err(RuleFailure::violation(
                "Password contains (part of) URL domain",
            ));
        }
        Ok(())
    }
}

/// The parts of a URL's host worth checking. An IP address is kept whole,
/// a domain is split on dots. URLs without a scheme are read as `https`.
pub fn host_fragments(input: &str) -> Option<Vec<String>> {
    let input = input.trim();
    let parsed = Url::parse(input)
        .ok()
        .filter(|u| u.host().is_some())
        .or_else(|| Url::parse(&format!("https://{input}")).ok())?;

    match parsed.host()? {
        Host::Domain(domain) => Some(
            domain
                .split('.')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Host::Ipv4(addr) => Some(vec![addr.to_string()]),
        Host::Ipv6(addr) => Some(vec![addr.to_string()]),
    }
}

pub struct ForbidUsername;

#[async_trait]
impl Rule<CredentialContext> for ForbidUsername {
    fn name(&self) -> &'static str {
        "credential/password/complexity/forbid-username"
    }

    fn description(&self) -> &'static str {
        "Ensure that the credential password does not contain the username.\n\n\
         The username is rarely secret. A password built around it falls to the first \
         attacker who tries the obvious.\n\n\
         Detection uses fuzzy matching. For email-like usernames only the part before \
         the '@' is considered."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        if !ctx
            .config
            .credential_restrictions
            .password_complexity
            .forbid_username
        {
            return disabled_by("forbid_username");
        }
        let data = &ctx.credential.data;
        if data.username.is_empty() {
            return Activation::disabled("No username, nothing to check");
        }
        if data.password.is_empty() {
            return Activation::disabled("No password, nothing to check");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        let data = &ctx.credential.data;
        let username = username_stem(&data.username);

        if detect_partial_match(&data.password, username, Strictness::Strict).is_some() {
            return Err(RuleFailure::violation(
                "Password contains (part of) username",
            ));
        }
        Ok(())
    }
}

/// The local part of an email-like username, otherwise the username as is.
pub fn username_stem(username: &str) -> &str {
    let mut parts = username.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && DOMAIN_LIKE.is_match(domain) => {
            local
        }
        _ => username,
    }
}

// ---------------------------------------------------------------------------
// Reuse
// ---------------------------------------------------------------------------

pub struct ForbidReuse;

#[async_trait]
impl Rule<CredentialContext> for ForbidReuse {
    fn name(&self) -> &'static str {
        "credential/password/complexity/forbid-reuse"
    }

    fn description(&self) -> &'static str {
        "Ensure that the credential password is not used by another credential in the vault.\n\n\
         When one account using a shared password is compromised, every account using it is."
    }

    async fn enable(&self, ctx: &CredentialContext) -> Activation {
        if !ctx
            .config
            .credential_restrictions
            .password_complexity
            .forbid_reuse
        {
            return disabled_by("forbid_reuse");
        }
        if ctx.credential.data.password.is_empty() {
            return Activation::disabled("No password, nothing to check");
        }
        Activation::Enabled
    }

    async fn define(&self, ctx: &CredentialContext) -> Verdict {
        let password = &ctx.credential.data.password;
        let others = ctx
            .vault
            .list_credentials()
            .await
            .map_err(RuleFailure::collaborator)?;

        for summary in others.iter().filter(|s| s.id != ctx.credential.id) {
            let Some(other) = ctx
                .vault
                .get_credential_by_id(&summary.id)
                .await
                .map_err(RuleFailure::collaborator)?
            else {
                continue;
            };

            if password.equals(&other.data.password) {
                return Err(RuleFailure::violation(format!(
                    "Credential password is used by another credential: '{}'",
                    other.display_path()
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

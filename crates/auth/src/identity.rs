//! Resource identity parsing/formatting (spec §6, §8 scenario 1).
//!
//! A signed request resolves to either a human `User` (a bare email-shaped
//! string) or a [`ServiceAccount`], which comes in three flavors depending
//! on which suffix its full ID carries: a plain service account, a
//! cloud-provider-prefixed one (`cloud-provider:<name>`), or the
//! infra-provider's own account (`infra-provider:<name>`).

use std::fmt;

/// Which suffix a service account's full ID carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceAccountKind {
    /// `<name>@serviceaccount.<domain>`
    Normal,
    /// `<name>@cloud-provider.serviceaccount.<domain>`, addressed by the
    /// shorthand `cloud-provider:<name>`.
    CloudProvider,
    /// `<name>@infra-provider.serviceaccount.<domain>`, addressed by the
    /// shorthand `infra-provider:<name>` -- the infra provider's own
    /// service account identity (spec §4.6).
    InfraProvider,
}

impl ServiceAccountKind {
    fn host_suffix(self) -> &'static str {
        match self {
            ServiceAccountKind::Normal => "serviceaccount.",
            ServiceAccountKind::CloudProvider => "cloud-provider.serviceaccount.",
            ServiceAccountKind::InfraProvider => "infra-provider.serviceaccount.",
        }
    }

    fn name_prefix(self) -> Option<&'static str> {
        match self {
            ServiceAccountKind::Normal => None,
            ServiceAccountKind::CloudProvider => Some("cloud-provider:"),
            ServiceAccountKind::InfraProvider => Some("infra-provider:"),
        }
    }
}

/// A parsed service-account identity (spec §6 "Resource identity format").
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceAccount {
    pub base_name: String,
    pub kind: ServiceAccountKind,
    pub domain: String,
}

impl ServiceAccount {
    pub fn new(base_name: impl Into<String>, kind: ServiceAccountKind, domain: impl Into<String>) -> Self {
        Self { base_name: base_name.into(), kind, domain: domain.into() }
    }

    pub fn is_cloud_provider(&self) -> bool {
        matches!(self.kind, ServiceAccountKind::CloudProvider)
    }

    pub fn is_infra_provider(&self) -> bool {
        matches!(self.kind, ServiceAccountKind::InfraProvider)
    }

    /// The canonical `<name>@...serviceaccount.<domain>` form.
    pub fn full_id(&self) -> String {
        format!("{}@{}{}", self.base_name, self.kind.host_suffix(), self.domain)
    }

    /// The shorthand form a caller supplies, e.g. `cloud-provider:aws-1`.
    /// Plain service accounts have no prefix: this is just the base name.
    pub fn name_with_prefix(&self) -> String {
        match self.kind.name_prefix() {
            Some(prefix) => format!("{prefix}{}", self.base_name),
            None => self.base_name.clone(),
        }
    }

    /// Parses the shorthand name form (`cloud-provider:aws-1`,
    /// `infra-provider:qemu`, or a bare name) against a known domain.
    pub fn parse_from_name(name: &str, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        if let Some(base) = name.strip_prefix("cloud-provider:") {
            Self::new(base, ServiceAccountKind::CloudProvider, domain)
        } else if let Some(base) = name.strip_prefix("infra-provider:") {
            Self::new(base, ServiceAccountKind::InfraProvider, domain)
        } else {
            Self::new(name, ServiceAccountKind::Normal, domain)
        }
    }

    /// Parses a full ID (`name@...serviceaccount.domain`) back into its
    /// structured form, or `None` if the host part doesn't carry one of the
    /// three recognized suffixes (spec §8 scenario 1: `"foobar@example.org"`
    /// is not a service account).
    pub fn parse_full_id(full_id: &str) -> Option<Self> {
        let (local, host) = full_id.split_once('@')?;
        for kind in [
            ServiceAccountKind::CloudProvider,
            ServiceAccountKind::InfraProvider,
            ServiceAccountKind::Normal,
        ] {
            if let Some(domain) = host.strip_prefix(kind.host_suffix()) {
                return Some(Self::new(local, kind, domain));
            }
        }
        None
    }
}

impl fmt::Display for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_id())
    }
}

/// The resolved signing identity of a request (spec §4.7 step 1).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Identity {
    User(String),
    ServiceAccount(ServiceAccount),
}

impl Identity {
    /// Resolves a raw identity string (either a full service-account ID, a
    /// shorthand-prefixed name, or a plain user email) against a known
    /// domain. A shorthand prefix (`cloud-provider:`, `infra-provider:`)
    /// always wins, since it cannot also be a user email.
    pub fn parse(raw: &str, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        if raw.starts_with("cloud-provider:") || raw.starts_with("infra-provider:") {
            return Identity::ServiceAccount(ServiceAccount::parse_from_name(raw, domain));
        }
        match ServiceAccount::parse_full_id(raw) {
            Some(sa) => Identity::ServiceAccount(sa),
            None => Identity::User(raw.to_owned()),
        }
    }

    pub fn as_service_account(&self) -> Option<&ServiceAccount> {
        match self {
            Identity::ServiceAccount(sa) => Some(sa),
            Identity::User(_) => None,
        }
    }

    /// A stable string for use as an ACL/label key (the full service-account
    /// ID, or the raw user string).
    pub fn key(&self) -> String {
        match self {
            Identity::User(email) => email.clone(),
            Identity::ServiceAccount(sa) => sa.full_id(),
        }
    }
}

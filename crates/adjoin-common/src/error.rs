use serde::Serialize;

/// Process exit codes. Each lifecycle failure class has its own code so
/// supervisors and operators can tell the failing step apart without logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    Success,
    Unknown,
    MissingConfiguration,
    RealmDiscovery,
    CredentialOrRealmJoin,
    DomainJoin,
    DnsRegistration,
    KeytabCreation,
    ServicePrincipal,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Unknown => 1,
            Self::MissingConfiguration => 2,
            Self::RealmDiscovery => 3,
            Self::CredentialOrRealmJoin => 4,
            Self::DomainJoin => 5,
            Self::DnsRegistration => 6,
            Self::KeytabCreation => 7,
            Self::ServicePrincipal => 8,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unknown => "unknown error",
            Self::MissingConfiguration => "missing configuration",
            Self::RealmDiscovery => "realm/DNS discovery failed",
            Self::CredentialOrRealmJoin => "credential or realm-join failure",
            Self::DomainJoin => "domain join failed",
            Self::DnsRegistration => "DNS registration failed",
            Self::KeytabCreation => "keytab creation failed",
            Self::ServicePrincipal => "service-principal registration or verification failed",
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

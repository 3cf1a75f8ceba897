use std::fmt::Display;

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_PUBLISHABLE_KEY: &str = "SUPABASE_PUBLISHABLE_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingVar(&'static str),
    #[error("No {0} key configured")]
    MissingKey(Privilege),
}

/// Which Supabase key a client authenticates with.
///
/// Writes need [`Privilege::ServiceRole`]; the publishable key only reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    ServiceRole,
    Publishable,
}

impl Privilege {
    pub fn can_write(&self) -> bool {
        matches!(self, Privilege::ServiceRole)
    }

    fn env_var(&self) -> &'static str {
        match self {
            Privilege::ServiceRole => ENV_SERVICE_ROLE_KEY,
            Privilege::Publishable => ENV_PUBLISHABLE_KEY,
        }
    }
}

impl Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Privilege::ServiceRole => write!(f, "service-role"),
            Privilege::Publishable => write!(f, "publishable"),
        }
    }
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    service_role_key: Option<String>,
    publishable_key: Option<String>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &self.service_role_key.as_ref().map(|_| "***"))
            .field("publishable_key", &self.publishable_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_role_key: None,
            publishable_key: None,
        }
    }

    pub fn with_service_role_key(mut self, key: impl Into<String>) -> Self {
        self.service_role_key = Some(key.into());
        self
    }

    pub fn with_publishable_key(mut self, key: impl Into<String>) -> Self {
        self.publishable_key = Some(key.into());
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the Supabase settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let url = get(ENV_SUPABASE_URL).ok_or(ConfigError::MissingVar(ENV_SUPABASE_URL))?;
        let mut config = Self::new(url);
        config.service_role_key = get(Privilege::ServiceRole.env_var());
        config.publishable_key = get(Privilege::Publishable.env_var());
        Ok(config)
    }

    pub fn key(&self, privilege: Privilege) -> Result<&str, ConfigError> {
        match privilege {
            Privilege::ServiceRole => self.service_role_key.as_deref(),
            Privilege::Publishable => self.publishable_key.as_deref(),
        }
        .ok_or(ConfigError::MissingKey(privilege))
    }

    /// Publishable when available, otherwise the service-role key.
    pub fn read_privilege(&self) -> Privilege {
        if self.publishable_key.is_some() {
            Privilege::Publishable
        } else {
            Privilege::ServiceRole
        }
    }
}

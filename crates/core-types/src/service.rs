use std::fmt;

/// Backing service a request path is attributed to in trace records.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "kebab-case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ServiceName {
    Database,
    Auth,
    Graphql,
    Realtime,
    Storage,
    Functions,
    Webhooks,
    DeveloperPortal,
}

const PREFIXES: &[(&str, ServiceName)] = &[
    ("/v1/db", ServiceName::Database),
    ("/v1/database", ServiceName::Database),
    ("/v1/auth", ServiceName::Auth),
    ("/v1/graphql", ServiceName::Graphql),
    ("/v1/realtime", ServiceName::Realtime),
    ("/v1/storage", ServiceName::Storage),
    ("/v1/functions", ServiceName::Functions),
    ("/v1/webhooks", ServiceName::Webhooks),
    ("/api/database", ServiceName::Database),
    ("/api/auth", ServiceName::Auth),
    ("/api/graphql", ServiceName::Graphql),
    ("/api/realtime", ServiceName::Realtime),
    ("/api/storage", ServiceName::Storage),
    ("/api/functions", ServiceName::Functions),
    ("/api/webhooks", ServiceName::Webhooks),
];

impl ServiceName {
    /// Prefix match against the routing table; anything else is the developer portal.
    pub fn from_path(path: &str) -> Self {
        PREFIXES
            .iter()
            .find(|(prefix, _)| {
                path.strip_prefix(prefix)
                    .map(|rest| rest.is_empty() || rest.starts_with('/'))
                    .unwrap_or(false)
            })
            .map(|(_, service)| *service)
            .unwrap_or(ServiceName::DeveloperPortal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Database => "database",
            ServiceName::Auth => "auth",
            ServiceName::Graphql => "graphql",
            ServiceName::Realtime => "realtime",
            ServiceName::Storage => "storage",
            ServiceName::Functions => "functions",
            ServiceName::Webhooks => "webhooks",
            ServiceName::DeveloperPortal => "developer-portal",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceName;

    #[test]
    fn paths_map_by_prefix() {
        assert_eq!(ServiceName::from_path("/v1/db/query"), ServiceName::Database);
        assert_eq!(
            ServiceName::from_path("/v1/realtime/subscriptions"),
            ServiceName::Realtime
        );
        assert_eq!(ServiceName::from_path("/api/storage"), ServiceName::Storage);
        assert_eq!(ServiceName::from_path("/healthz"), ServiceName::DeveloperPortal);
        assert_eq!(
            ServiceName::from_path("/v1/dbx/query"),
            ServiceName::DeveloperPortal
        );
    }
}

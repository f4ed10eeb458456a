//! Backend families and connection-string scheme resolution

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::DriverError;

/// Storage engine family behind a connection string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Postgres,
    MySql,
    Sqlite,
    LibSql,
}

/// Scheme tag -> backend family. Resolution matches on the text before the first `:`.
const SCHEME_TABLE: &[(&str, BackendKind)] = &[
    ("postgres", BackendKind::Postgres),
    ("postgresql", BackendKind::Postgres),
    ("mysql", BackendKind::MySql),
    ("mariadb", BackendKind::MySql),
    ("sqlite", BackendKind::Sqlite),
    ("libsql", BackendKind::LibSql),
];

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Postgres,
        BackendKind::MySql,
        BackendKind::Sqlite,
        BackendKind::LibSql,
    ];

    /// Every scheme tag the driver system recognizes
    pub fn supported_schemes() -> impl Iterator<Item = &'static str> {
        SCHEME_TABLE.iter().map(|(scheme, _)| *scheme)
    }

    /// Resolve the backend family from a connection string's scheme
    pub fn from_url(url: &str) -> Result<Self, DriverError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.trim().to_ascii_lowercase())
            .unwrap_or_default();

        SCHEME_TABLE
            .iter()
            .find(|(tag, _)| *tag == scheme)
            .map(|(_, kind)| *kind)
            .ok_or(DriverError::UnsupportedScheme(scheme))
    }

    /// Resolve the backend family and check that a required token is present
    pub fn resolve(url: &str, auth_token: Option<&str>) -> Result<Self, DriverError> {
        let kind = Self::from_url(url)?;
        let has_token = auth_token.is_some_and(|token| !token.trim().is_empty());
        if kind.requires_auth_token() && !has_token {
            return Err(DriverError::MissingAuthToken(kind));
        }
        Ok(kind)
    }

    /// Hosted backends authenticate with a bearer token rather than URL userinfo
    pub fn requires_auth_token(&self) -> bool {
        matches!(self, BackendKind::LibSql)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
            BackendKind::Sqlite => "sqlite",
            BackendKind::LibSql => "libsql",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use crate::config::ProxyConfig;

/// Path-token authentication: when a token is configured every route lives
/// under `/<token>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathAuth {
    Disabled,
    Token(Box<str>),
}

/// Result of checking the token segment of a request path.
#[derive(Debug, PartialEq, Eq)]
pub enum PathAuthOutcome<'a> {
    /// Route on this path.
    Route(&'a str),
    /// Known route reached with the wrong token.
    Unauthorized(&'a str),
    /// Path has no token segment.
    NotFound,
}

impl PathAuth {
    #[must_use]
    pub fn from_config(config: &ProxyConfig) -> Self {
        if config.auth_token.is_empty() {
            PathAuth::Disabled
        } else {
            PathAuth::Token(config.auth_token.clone().into_boxed_str())
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, PathAuth::Token(_))
    }

    /// Split off and verify the token segment.
    ///
    /// The caller still decides whether the remaining path names a real
    /// route; an `Unauthorized` outcome carries that remainder so unknown
    /// paths can be answered with 404 before the token is reported.
    #[must_use]
    pub fn check<'a>(&self, path: &'a str) -> PathAuthOutcome<'a> {
        let PathAuth::Token(expected) = self else {
            return PathAuthOutcome::Route(path);
        };
        let Some((token, rest)) = split_path_token(path) else {
            return PathAuthOutcome::NotFound;
        };
        if token.as_bytes() == expected.as_bytes() {
            PathAuthOutcome::Route(rest)
        } else {
            PathAuthOutcome::Unauthorized(rest)
        }
    }
}

fn split_path_token(path: &str) -> Option<(&str, &str)> {
    let tail = path.strip_prefix('/')?;
    let slash = tail.find('/')?;
    let (token, rest) = tail.split_at(slash);
    if token.is_empty() {
        None
    } else {
        Some((token, rest))
    }
}

//! Subscription keys and socket addressing.

use crate::error::SyncError;
use autocoder_rs_config::ServerConfig;
use std::fmt;
use url::Url;

/// Logical channel a subscription listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Project-wide progress, agent status and log stream.
    Project,
    /// Interactive assistant chat.
    Assistant,
}

impl Channel {
    /// Path prefix under which the server exposes this channel.
    pub fn namespace(self) -> &'static str {
        match self {
            Channel::Project => "ws/projects",
            Channel::Assistant => "api/assistant/ws",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Project => f.write_str("project"),
            Channel::Assistant => f.write_str("assistant"),
        }
    }
}

/// Identity of one logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub name: String,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, name: impl Into<String>) -> Self {
        Self {
            channel,
            name: name.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.name)
    }
}

/// Backend address, resolved once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    socket_base: Url,
    http_base: Url,
}

impl Endpoint {
    pub fn new(host: &str, secure: bool) -> Result<Self, SyncError> {
        let (socket_scheme, http_scheme) = if secure {
            ("wss", "https")
        } else {
            ("ws", "http")
        };
        Ok(Self {
            socket_base: parse_base(socket_scheme, host)?,
            http_base: parse_base(http_scheme, host)?,
        })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self, SyncError> {
        Self::new(&server.host, server.secure)
    }

    /// `{ws|wss}://{host}/{namespace}/{key}` with the key percent-encoded.
    pub fn socket_url(&self, key: &SubscriptionKey) -> Url {
        let namespace = key.channel.namespace().split('/');
        join_segments(&self.socket_base, namespace.chain([key.name.as_str()]))
    }

    /// HTTP(S) URL for a request/response API path, one segment per item.
    pub fn http_url<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        join_segments(&self.http_base, segments)
    }
}

fn parse_base(scheme: &str, host: &str) -> Result<Url, SyncError> {
    Url::parse(&format!("{scheme}://{host}")).map_err(|source| SyncError::InvalidEndpoint {
        host: host.to_string(),
        source,
    })
}

fn join_segments<I>(base: &Url, segments: I) -> Url
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = base.clone();
    // ws/wss/http/https are special schemes and always have a path.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn secure_origin_selects_wss() {
        let key = SubscriptionKey::new(Channel::Project, "todo-app");
        let plain = Endpoint::new("localhost:8888", false).expect("endpoint");
        assert_eq!(
            plain.socket_url(&key).as_str(),
            "ws://localhost:8888/ws/projects/todo-app"
        );
        let secure = Endpoint::new("agents.example.com", true).expect("endpoint");
        assert_eq!(
            secure.socket_url(&key).as_str(),
            "wss://agents.example.com/ws/projects/todo-app"
        );
    }

    #[test]
    fn assistant_channel_uses_its_namespace() {
        let key = SubscriptionKey::new(Channel::Assistant, "my app/v2");
        let endpoint = Endpoint::new("h:1", false).expect("endpoint");
        assert_eq!(
            endpoint.socket_url(&key).as_str(),
            "ws://h:1/api/assistant/ws/my%20app%2Fv2"
        );
    }

    #[test]
    fn encodes_multibyte_names() {
        let key = SubscriptionKey::new(Channel::Project, "é(x)");
        let endpoint = Endpoint::new("h", false).expect("endpoint");
        assert_eq!(endpoint.socket_url(&key).path(), "/ws/projects/%C3%A9(x)");
    }

    #[test]
    fn http_url_follows_security() {
        let endpoint = Endpoint::new("h", true).expect("endpoint");
        assert_eq!(
            endpoint
                .http_url(["api", "projects", "a b", "features"])
                .as_str(),
            "https://h/api/projects/a%20b/features"
        );
    }

    #[test]
    fn unparsable_host_is_rejected() {
        assert!(matches!(
            Endpoint::new("bad host:port", false),
            Err(SyncError::InvalidEndpoint { .. })
        ));
    }
}

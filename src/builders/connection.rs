use serde_json::{Value, json};
use std::fmt::{Display, Write};

/// Builds `mongodb://` style connection strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStringBuilder {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub srv: bool,
    pub auth_source: Option<String>,
}

impl ConnectionStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn set_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn set_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    pub fn set_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn set_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Use the `mongodb+srv://` scheme.
    pub fn use_srv(mut self, srv: bool) -> Self {
        self.srv = srv;
        self
    }

    pub fn set_auth_source(mut self, source: impl Into<String>) -> Self {
        self.auth_source = Some(source.into());
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "host": self.host,
            "port": self.port,
            "dbName": self.db_name,
            "username": self.username,
            "password": self.password,
            "srv": self.srv,
            "authenticationSource": self.auth_source,
        })
    }
}

impl Display for ConnectionStringBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mongodb{}://", if self.srv { "+srv" } else { "" })?;
        if self.username.is_some() || self.password.is_some() {
            write!(
                f,
                "{}:{}@",
                encode_component(self.username.as_deref().unwrap_or_default()),
                encode_component(self.password.as_deref().unwrap_or_default())
            )?;
        }
        f.write_str(self.host.as_deref().unwrap_or("localhost"))?;
        // SRV records carry the port themselves
        if let (Some(port), false) = (self.port, self.srv) {
            write!(f, ":{port}")?;
        }
        write!(
            f,
            "/{}",
            encode_component(self.db_name.as_deref().unwrap_or_default())
        )?;
        if let Some(source) = &self.auth_source {
            write!(f, "?authSource={}", encode_component(source))?;
        }
        Ok(())
    }
}

/// Percent-encodes everything but the URI-component unreserved characters.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}

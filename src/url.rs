//! Entity addresses.
//!
//! A [`FileUrl`] is `scheme://[login[:password]@]host[:port]/path` plus an
//! optional bag of protocol-specific string properties. Identity, parent and
//! child relationships of entities are derived from the path segments of
//! their address alone.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{FsError, FsResult};

/// Path separator used by every address, whatever the protocol.
pub const SEPARATOR: &str = "/";

/// Scheme assumed for strings without `://`.
pub const LOCAL_SCHEME: &str = "file";

/// Login and password attached to an address.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    /// Create credentials from a login and a password.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// The login.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// The password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns `true` if either the login or the password is empty.
    pub fn is_incomplete(&self) -> bool {
        self.login.is_empty() || self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Address of a file entity.
///
/// Cheap to clone. Equality compares scheme, host, port, normalized path and
/// credentials; protocol properties are not part of the identity. When either
/// side was built with case-insensitive paths, paths compare ignoring case.
///
/// # Example
///
/// ```rust
/// use unifs::FileUrl;
///
/// let url = FileUrl::parse("s3://key:secret@storage.example.com/bucket/dir/file.txt").unwrap();
/// assert_eq!(url.scheme(), "s3");
/// assert_eq!(url.host(), "storage.example.com");
/// assert_eq!(url.filename(), Some("file.txt"));
/// assert_eq!(url.parent().unwrap().path(), "/bucket/dir");
/// // Passwords never appear in the display form
/// assert_eq!(url.to_string(), "s3://key@storage.example.com/bucket/dir/file.txt");
/// ```
#[derive(Clone)]
pub struct FileUrl {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    credentials: Option<Credentials>,
    properties: BTreeMap<String, String>,
    case_sensitive: bool,
}

impl FileUrl {
    /// Build an address from its parts. `path` gets a leading separator if missing.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port: None,
            path: absolute(path.as_ref()),
            credentials: None,
            properties: BTreeMap::new(),
            case_sensitive: true,
        }
    }

    /// Build a `file://` address for a local path.
    pub fn local(path: impl AsRef<str>) -> Self {
        let path = path.as_ref().replace('\\', SEPARATOR);
        Self::new(LOCAL_SCHEME, "", path).with_case_sensitivity(!cfg!(any(windows, target_os = "macos")))
    }

    /// Parse an address string.
    ///
    /// Strings without `://` are treated as local paths.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidUrl`] if the scheme is empty or the port is not a number
    pub fn parse(input: &str) -> FsResult<Self> {
        let Some((scheme, rest)) = input.split_once("://") else {
            return Ok(Self::local(input));
        };
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return Err(FsError::InvalidUrl {
                url: input.to_string(),
                reason: "invalid scheme",
            });
        }

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, SEPARATOR),
        };

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };

        let (host, port) = match hostport.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() => {
                let port = port.parse::<u16>().map_err(|_| FsError::InvalidUrl {
                    url: input.to_string(),
                    reason: "invalid port",
                })?;
                (host, Some(port))
            }
            Some((host, _)) => (host, None),
            None => (hostport, None),
        };

        let mut url = Self::new(scheme, host, path);
        url.port = port;
        url.credentials = userinfo.map(|info| match info.split_once(':') {
            Some((login, password)) => Credentials::new(login, password),
            None => Credentials::new(info, ""),
        });
        if url.scheme == LOCAL_SCHEME {
            url.case_sensitive = !cfg!(any(windows, target_os = "macos"));
        }
        Ok(url)
    }

    /// Scheme, lowercased.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host, lowercased. Empty for local addresses.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, if one was given.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path as given, always starting with a separator.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path without a trailing separator (except for the root, `/`).
    pub fn normalized_path(&self) -> &str {
        let trimmed = self.path.trim_end_matches(SEPARATOR);
        if trimmed.is_empty() { SEPARATOR } else { trimmed }
    }

    /// Returns `true` if the path names the root of the host.
    pub fn is_root(&self) -> bool {
        self.normalized_path() == SEPARATOR
    }

    /// Credentials, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Protocol-specific property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns `true` if paths of this address compare case-sensitively.
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Copy of this address with the given credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Copy of this address with a port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Copy of this address with a protocol property set.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Copy of this address with the given path case sensitivity.
    pub fn with_case_sensitivity(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Copy of this address with another path; everything else is kept.
    pub fn with_path(&self, path: impl AsRef<str>) -> Self {
        let mut url = self.clone();
        url.path = absolute(path.as_ref());
        url
    }

    /// Non-empty path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Last path segment; `None` for the root.
    pub fn filename(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Address of the parent; `None` for the root.
    pub fn parent(&self) -> Option<FileUrl> {
        if self.is_root() {
            return None;
        }
        let path = self.normalized_path();
        let parent = match path.rfind(SEPARATOR) {
            Some(0) | None => SEPARATOR,
            Some(i) => &path[..i],
        };
        Some(self.with_path(parent))
    }

    /// Address of a direct child named `name`.
    pub fn child(&self, name: &str) -> FileUrl {
        let base = self.normalized_path();
        let name = name.trim_matches('/');
        if base == SEPARATOR {
            self.with_path(format!("/{name}"))
        } else {
            self.with_path(format!("{base}/{name}"))
        }
    }

    /// Returns `true` if `other` lies strictly below this address.
    pub fn is_ancestor_of(&self, other: &FileUrl) -> bool {
        if !self.same_realm(other) {
            return false;
        }
        let mut prefix = self.normalized_path().to_string();
        if prefix != SEPARATOR {
            prefix.push_str(SEPARATOR);
        }
        let candidate = other.normalized_path();
        candidate.len() > prefix.len()
            && candidate
                .get(..prefix.len())
                .is_some_and(|head| self.paths_eq(head, &prefix))
    }

    /// The root of this address' host: same scheme, host, port and credentials, path `/`.
    pub fn realm(&self) -> FileUrl {
        let mut url = self.with_path(SEPARATOR);
        url.properties.clear();
        url
    }

    /// Returns `true` if both addresses share scheme, host, port and credentials.
    pub fn same_realm(&self, other: &FileUrl) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.port == other.port
            && self.credentials == other.credentials
    }

    fn paths_eq(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }
}

fn absolute(path: &str) -> String {
    if path.starts_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("{SEPARATOR}{path}")
    }
}

impl PartialEq for FileUrl {
    fn eq(&self, other: &Self) -> bool {
        let case_sensitive = self.case_sensitive && other.case_sensitive;
        let (a, b) = (self.normalized_path(), other.normalized_path());
        self.same_realm(other)
            && if case_sensitive {
                a == b
            } else {
                a.eq_ignore_ascii_case(b)
            }
    }
}

impl Eq for FileUrl {}

impl Hash for FileUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.host.hash(state);
        self.port.hash(state);
        // Lowercased so that case-insensitive equality stays consistent with hashing.
        self.normalized_path().to_ascii_lowercase().hash(state);
        self.credentials.hash(state);
    }
}

impl fmt::Display for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(credentials) = &self.credentials {
            write!(f, "{}@", credentials.login)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)
    }
}

impl fmt::Debug for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileUrl({self})")
    }
}

impl std::str::FromStr for FileUrl {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

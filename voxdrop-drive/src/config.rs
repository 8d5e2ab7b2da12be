use std::time::Duration;

/// Default Drive v3 metadata endpoint
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Default Drive v3 media upload endpoint
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Connection settings for [`DriveStore`](crate::DriveStore)
#[derive(Clone)]
pub struct DriveConfig {
    /// OAuth bearer token of the uploading account
    pub access_token: String,
    pub api_base: String,
    pub upload_base: String,

    /// Per-request timeout, covering one chunk PUT
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl DriveConfig {
    pub fn new<S: Into<String>>(access_token: S) -> Self {
        Self {
            access_token: access_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_api_base<S: Into<String>>(mut self, base: S) -> Self {
        self.api_base = trim_base(base.into());
        self
    }

    pub fn with_upload_base<S: Into<String>>(mut self, base: S) -> Self {
        self.upload_base = trim_base(base.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for DriveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveConfig")
            .field("access_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_lose_trailing_slash() {
        let cfg = DriveConfig::new("t")
            .with_api_base("http://127.0.0.1:9000/drive/v3/")
            .with_upload_base("http://127.0.0.1:9000/upload/drive/v3");
        assert_eq!(cfg.api_base, "http://127.0.0.1:9000/drive/v3");
        assert_eq!(cfg.upload_base, "http://127.0.0.1:9000/upload/drive/v3");
    }

    #[test]
    fn debug_hides_the_token() {
        let shown = format!("{:?}", DriveConfig::new("ya29.secret"));
        assert!(!shown.contains("ya29"));
    }
}

// Text Analysis Desktop - Navigation Policy
// Keeps the main window on the backend; everything else goes to the browser

use reqwest::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// Same origin as the backend, load in the main window
    InWindow,
    /// Hand to the system default browser
    External,
    /// Neither; drop the request
    Blocked,
}

#[derive(Clone, Debug)]
pub struct NavigationPolicy {
    backend: Url,
}

impl NavigationPolicy {
    pub fn new(backend_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            backend: Url::parse(backend_url)?,
        })
    }

    pub fn decide(&self, target: &Url) -> Navigation {
        if self.same_origin(target) {
            return Navigation::InWindow;
        }
        match target.scheme() {
            "http" | "https" | "mailto" => Navigation::External,
            _ => Navigation::Blocked,
        }
    }

    fn same_origin(&self, target: &Url) -> bool {
        target.scheme() == self.backend.scheme()
            && target.port_or_known_default() == self.backend.port_or_known_default()
            && match (target.host_str(), self.backend.host_str()) {
                (Some(a), Some(b)) => a == b || (is_loopback(a) && is_loopback(b)),
                _ => false,
            }
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

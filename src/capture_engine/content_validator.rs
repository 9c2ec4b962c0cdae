//! Main-document response check after navigation
//!
//! Only the HTTP status is looked at. A lesson page that renders a soft error
//! inside a 200 response is caught later by the anomaly detector.

use log::{trace, warn};

/// How the main document answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseVerdict {
    Accepted(u16),
    /// The engine reported no status (cached or synthetic documents)
    Unreported,
    /// 4xx or 5xx
    Rejected(u16),
}

impl ResponseVerdict {
    #[must_use]
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub fn rejected_status(self) -> Option<u16> {
        match self {
            Self::Rejected(status) => Some(status),
            _ => None,
        }
    }
}

#[must_use]
pub fn check_response(url: &str, http_status: Option<u16>) -> ResponseVerdict {
    match http_status {
        Some(status) if status >= 400 => {
            warn!("{url} answered HTTP {status}");
            ResponseVerdict::Rejected(status)
        }
        Some(status) => {
            trace!("{url} answered HTTP {status}");
            ResponseVerdict::Accepted(status)
        }
        None => {
            trace!("No document status for {url}, treating as loaded");
            ResponseVerdict::Unreported
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_are_rejected() {
        assert_eq!(check_response("https://x.test", Some(404)), ResponseVerdict::Rejected(404));
        assert_eq!(check_response("https://x.test", Some(503)).rejected_status(), Some(503));
        assert!(!check_response("https://x.test", Some(400)).is_acceptable());
    }

    #[test]
    fn success_redirect_and_missing_status_pass() {
        assert!(check_response("https://x.test", Some(200)).is_acceptable());
        assert!(check_response("https://x.test", Some(304)).is_acceptable());
        assert!(check_response("https://x.test", Some(399)).is_acceptable());
        assert_eq!(check_response("https://x.test", None), ResponseVerdict::Unreported);
    }
}

//! Request context attached to a notice.

use crate::vars::Vars;

/// CGI keys consulted when inferring the request URL.
const CGI_FORWARDED_PROTO: &str = "HTTP_X_FORWARDED_PROTO";
const CGI_HOST: &str = "HTTP_HOST";
const CGI_SERVER_NAME: &str = "SERVER_NAME";
const CGI_SERVER_PORT: &str = "SERVER_PORT";
const CGI_REQUEST_URI: &str = "REQUEST_URI";
const CGI_USER_AGENT: &str = "HTTP_USER_AGENT";

const LOOPBACK_HOST: &str = "127.0.0.1";

/// What the host application was doing when the error happened.
///
/// Every field is optional; unset fields of a per-call context fall back to
/// the ambient one (see [`merge`](Self::merge)).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub url: Option<String>,
    /// Rendered as `component`.
    pub controller: Option<String>,
    pub action: Option<String>,
    pub parameters: Option<Vars>,
    pub session_data: Option<Vars>,
    pub cgi_data: Option<Vars>,
    pub user: Option<Vars>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vars) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_session_data(mut self, session_data: Vars) -> Self {
        self.session_data = Some(session_data);
        self
    }

    pub fn with_cgi_data(mut self, cgi_data: Vars) -> Self {
        self.cgi_data = Some(cgi_data);
        self
    }

    pub fn with_user(mut self, user: Vars) -> Self {
        self.user = Some(user);
        self
    }

    /// Overlay every field set in `other` onto `self`.
    pub fn merge(&mut self, other: &RequestContext) {
        fn overlay<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }

        overlay(&mut self.url, &other.url);
        overlay(&mut self.controller, &other.controller);
        overlay(&mut self.action, &other.action);
        overlay(&mut self.parameters, &other.parameters);
        overlay(&mut self.session_data, &other.session_data);
        overlay(&mut self.cgi_data, &other.cgi_data);
        overlay(&mut self.user, &other.user);
    }

    /// Owned copy of `self` with `other` merged on top.
    pub fn merged(&self, other: &RequestContext) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Whether the notice should carry a `request` block.
    pub fn has_request_data(&self) -> bool {
        non_empty_str(&self.url)
            || non_empty_str(&self.controller)
            || non_empty_str(&self.action)
            || non_empty_vars(&self.parameters)
            || non_empty_vars(&self.session_data)
            || non_empty_vars(&self.cgi_data)
    }

    pub fn has_user(&self) -> bool {
        non_empty_vars(&self.user)
    }

    /// The caller's user agent, from `HTTP_USER_AGENT` in the CGI data.
    pub fn user_agent(&self) -> Option<String> {
        self.cgi_data.as_ref()?.text(CGI_USER_AGENT)
    }

    /// Reconstruct the request URL from CGI data.
    ///
    /// Returns `None` unless `REQUEST_URI` is present. The scheme comes from
    /// `HTTP_X_FORWARDED_PROTO`, else `https` on port 443, else `http`. The
    /// host is `HTTP_HOST`, then `SERVER_NAME`, then the loopback address.
    /// Ports other than 80 and 443 are appended.
    pub fn infer_url(&self) -> Option<String> {
        let cgi = self.cgi_data.as_ref()?;
        let request_uri = cgi.text(CGI_REQUEST_URI)?;
        let port = cgi.text(CGI_SERVER_PORT);

        let scheme = cgi.text(CGI_FORWARDED_PROTO).unwrap_or_else(|| {
            if port.as_deref() == Some("443") {
                "https".to_string()
            } else {
                "http".to_string()
            }
        });

        let host = cgi
            .text(CGI_HOST)
            .or_else(|| cgi.text(CGI_SERVER_NAME))
            .unwrap_or_else(|| LOOPBACK_HOST.to_string());

        let port = match port.as_deref() {
            Some("80") | Some("443") | None => String::new(),
            Some(other) => format!(":{other}"),
        };

        Some(format!("{scheme}://{host}{port}{request_uri}"))
    }

    /// Redact matching top-level keys of parameters, session and CGI data.
    pub(crate) fn redact(&mut self, is_filtered: impl Fn(&str) -> bool) {
        for vars in [
            &mut self.parameters,
            &mut self.session_data,
            &mut self.cgi_data,
        ]
        .into_iter()
        .flatten()
        {
            vars.redact(&is_filtered);
        }
    }
}

fn non_empty_str(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

fn non_empty_vars(value: &Option<Vars>) -> bool {
    value.as_ref().is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cgi(pairs: &[(&str, &str)]) -> RequestContext {
        RequestContext::new().with_cgi_data(pairs.iter().copied().collect())
    }

    #[test]
    fn infer_url_requires_request_uri() {
        assert_eq!(cgi(&[("HTTP_HOST", "example.com")]).infer_url(), None);
        assert_eq!(RequestContext::new().infer_url(), None);
    }

    #[test]
    fn infer_url_defaults_to_loopback_http() {
        assert_eq!(
            cgi(&[("REQUEST_URI", "/a?b=1")]).infer_url().as_deref(),
            Some("http://127.0.0.1/a?b=1")
        );
    }

    #[test]
    fn infer_url_uses_port_and_forwarded_proto() {
        let ctx = cgi(&[
            ("REQUEST_URI", "/x"),
            ("SERVER_NAME", "internal"),
            ("SERVER_PORT", "8080"),
            ("HTTP_X_FORWARDED_PROTO", "https"),
        ]);
        assert_eq!(ctx.infer_url().as_deref(), Some("https://internal:8080/x"));

        let ctx = cgi(&[
            ("REQUEST_URI", "/x"),
            ("HTTP_HOST", "shop.example"),
            ("SERVER_NAME", "internal"),
            ("SERVER_PORT", "443"),
        ]);
        assert_eq!(ctx.infer_url().as_deref(), Some("https://shop.example/x"));
    }

    #[test]
    fn numeric_server_port_is_understood() {
        let ctx = RequestContext::new().with_cgi_data(
            Vars::new()
                .with("REQUEST_URI", "/")
                .with("SERVER_PORT", 443u16),
        );
        assert_eq!(ctx.infer_url().as_deref(), Some("https://127.0.0.1/"));
    }

    #[test]
    fn merge_overrides_only_set_fields() {
        let ambient = RequestContext::new()
            .with_url("http://a/")
            .with_action("index");
        let merged = ambient.merged(&RequestContext::new().with_action("show"));
        assert_eq!(merged.url.as_deref(), Some("http://a/"));
        assert_eq!(merged.action.as_deref(), Some("show"));
    }

    #[test]
    fn request_data_presence() {
        assert!(!RequestContext::new().has_request_data());
        assert!(!RequestContext::new().with_url("").has_request_data());
        assert!(!RequestContext::new().with_parameters(Vars::new()).has_request_data());
        assert!(RequestContext::new().with_controller("Users").has_request_data());
        // User attributes live outside the request block.
        assert!(!RequestContext::new()
            .with_user(Vars::new().with("id", 1))
            .has_request_data());
    }

    #[test]
    fn user_agent_comes_from_cgi() {
        let ctx = cgi(&[("HTTP_USER_AGENT", "Googlebot/2.1")]);
        assert_eq!(ctx.user_agent().as_deref(), Some("Googlebot/2.1"));
        assert_eq!(RequestContext::new().user_agent(), None);
    }
}

//! Notice construction for the Errbit notifier.
//!
//! This crate provides:
//! - [`Notice`] — builds the API v2.2 XML document for one [`ErrorRecord`]
//! - [`NoticeOptions`] — resolved configuration plus [`RequestContext`]
//! - [`Vars`] / [`SharedVars`] — key/value data rendered as `<var>` trees

mod request;
mod vars;

use errbit_errors::{ErrorRecord, StackFrame};
use errbit_shared::{API_VERSION, PROJECT_NAME, PROJECT_URL, ResolvedConfig, VERSION};
use errbit_xml::{NO_ATTRIBUTES, XmlBuilder, XmlDocument};

pub use request::RequestContext;
pub use vars::{
    FILTERED_MARKER, RECURSION_MARKER, SharedVars, Var, Vars, VarsScope, xml_vars_for,
};

const UNKNOWN: &str = "<unknown>";

/// Everything a notice needs besides the error itself.
#[derive(Debug, Clone)]
pub struct NoticeOptions {
    pub config: ResolvedConfig,
    pub request: RequestContext,
}

impl NoticeOptions {
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            request: RequestContext::default(),
        }
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }
}

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// A notice for one error, ready to render.
///
/// Request defaults are inferred and parameter filters applied once, in
/// [`Notice::new`]. Rendering is pure: [`build`](Self::build) can be called
/// repeatedly and yields identical documents.
#[derive(Debug)]
pub struct Notice<'a> {
    record: &'a ErrorRecord,
    config: &'a ResolvedConfig,
    request: RequestContext,
}

impl<'a> Notice<'a> {
    pub fn new(record: &'a ErrorRecord, options: &'a NoticeOptions) -> Self {
        let mut request = options.request.clone();
        if request.url.is_none() {
            request.url = request.infer_url();
        }
        if !options.config.params_filters.is_empty() {
            request.redact(|key| options.config.is_filtered_param(key));
        }

        Self {
            record,
            config: &options.config,
            request,
        }
    }

    /// Request context after URL inference and redaction.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Build the document with a fresh recursion scope.
    pub fn build(&self) -> XmlDocument {
        let mut doc = XmlDocument::new();
        let mut scope = VarsScope::new();

        doc.builder()
            .tag_with("notice", "", [("version", API_VERSION)], |notice| {
                notice.tag("api-key", &self.config.api_key);
                notice.tag_with("notifier", "", NO_ATTRIBUTES, |notifier| {
                    notifier.tag("name", PROJECT_NAME);
                    notifier.tag("version", VERSION);
                    notifier.tag("url", PROJECT_URL);
                });
                notice.tag_with("error", "", NO_ATTRIBUTES, |error| self.build_error(error));

                if self.request.has_request_data() {
                    notice.tag_with("request", "", NO_ATTRIBUTES, |request| {
                        self.build_request(request, &mut scope);
                    });
                }

                if let Some(user) = self.request.user.as_ref().filter(|u| !u.is_empty()) {
                    notice.tag_with("user-attributes", "", NO_ATTRIBUTES, |attrs| {
                        xml_vars_for(attrs, user, &mut scope);
                    });
                }

                notice.tag_with("server-environment", "", NO_ATTRIBUTES, |env| {
                    env.tag("project-root", &self.config.project_root);
                    env.tag("environment-name", &self.config.environment_name);
                });
            });

        doc
    }

    /// Serialized document.
    pub fn to_xml(&self) -> String {
        self.build().to_xml()
    }

    fn build_error(&self, error: &mut XmlBuilder<'_>) {
        let class = self.record.class_name();
        error.tag("class", self.config.filter_trace(class));
        error.tag(
            "message",
            self.config
                .filter_trace(&format!("{class}: {}", self.record.message())),
        );

        error.tag_with("backtrace", "", NO_ATTRIBUTES, |backtrace| {
            let file = self.record.file();
            let file = if file.is_empty() {
                UNKNOWN.to_string()
            } else {
                self.config.filter_trace(file)
            };
            backtrace
                .tag("line", "")
                .attribute("number", self.record.line())
                .attribute("file", file)
                .attribute("method", UNKNOWN);

            let frames = self.record.backtrace();
            if frames.is_empty() {
                backtrace
                    .tag("line", "")
                    .attribute("number", "")
                    .attribute("file", "")
                    .attribute("method", "");
                return;
            }

            for frame in frames {
                let file = frame
                    .file
                    .as_deref()
                    .map_or_else(|| UNKNOWN.to_string(), |f| self.config.filter_trace(f));
                backtrace
                    .tag("line", "")
                    .attribute("number", frame.line.unwrap_or(0))
                    .attribute("file", file)
                    .attribute("method", self.config.filter_trace(&format_method(frame)));
            }
        });
    }

    fn build_request(&self, request: &mut XmlBuilder<'_>, scope: &mut VarsScope) {
        let ctx = &self.request;
        request.tag("url", ctx.url.as_deref().unwrap_or_default());
        request.tag("component", ctx.controller.as_deref().unwrap_or_default());
        request.tag("action", ctx.action.as_deref().unwrap_or_default());

        for (name, vars) in [
            ("params", &ctx.parameters),
            ("session", &ctx.session_data),
            ("cgi-data", &ctx.cgi_data),
        ] {
            if let Some(vars) = vars.as_ref().filter(|v| !v.is_empty()) {
                request.tag_with(name, "", NO_ATTRIBUTES, |block| {
                    xml_vars_for(block, vars, scope);
                });
            }
        }
    }
}

/// Display name for a stack frame: `Class::method()`, `function()` or
/// `<unknown>()`.
pub fn format_method(frame: &StackFrame) -> String {
    fn present(v: &Option<String>) -> Option<&str> {
        v.as_deref().filter(|s| !s.is_empty())
    }

    match (
        present(&frame.class),
        present(&frame.call_type),
        present(&frame.function),
    ) {
        (Some(class), Some(call_type), Some(function)) => {
            format!("{class}{call_type}{function}()")
        }
        (_, _, Some(function)) => format!("{function}()"),
        _ => format!("{UNKNOWN}()"),
    }
}

//! Variable substitution for command and URL templates.
//!
//! Templates use `{name}` placeholders. Substitution is a single pass, so a
//! value that itself contains braces is never expanded again. Unknown
//! placeholders are left as written.

use std::collections::HashMap;

use streamctl_remote::shell;

/// Variable substitution context.
///
/// ```
/// use streamctl::template::TemplateContext;
///
/// let ctx = TemplateContext::new()
///     .with_var("app", "radio1")
///     .with_var("descriptor", "/conf/radio 1/Application.xml");
///
/// assert_eq!(ctx.substitute("start {app}"), "start radio1");
/// assert_eq!(
///     ctx.substitute_shell("ls {descriptor}"),
///     "ls '/conf/radio 1/Application.xml'"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables verbatim.
    pub fn substitute(&self, template: &str) -> String {
        self.render(template, |v| v.to_string())
    }

    /// Substitute variables as single shell words.
    pub fn substitute_shell(&self, template: &str) -> String {
        self.render(template, shell::quote)
    }

    /// Substitute variables percent-encoded for a URL query or path segment.
    pub fn substitute_url(&self, template: &str) -> String {
        self.render(template, percent_encode)
    }

    /// Placeholders in `template` that have no value.
    pub fn missing(&self, template: &str) -> Vec<String> {
        placeholders(template)
            .filter(|name| !self.vars.contains_key(*name))
            .map(str::to_string)
            .collect()
    }

    fn render(&self, template: &str, encode: impl Fn(&str) -> String) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_name(&after[..close]) => {
                    let name = &after[..close];
                    match self.vars.get(name) {
                        Some(value) => out.push_str(&encode(value)),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Names of all well-formed placeholders in `template`.
pub fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    template.split('{').skip(1).filter_map(|chunk| {
        let name = &chunk[..chunk.find('}')?];
        is_name(name).then_some(name)
    })
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute() {
        let ctx = TemplateContext::new()
            .with_var("host", "10.0.0.5")
            .with_var("port", "8086")
            .with_var("login", "radio1");
        assert_eq!(
            ctx.substitute("http://{host}:{port}/schedules?appName={login}"),
            "http://10.0.0.5:8086/schedules?appName=radio1"
        );
    }

    #[test]
    fn test_single_pass() {
        let ctx = TemplateContext::new()
            .with_var("a", "{b}")
            .with_var("b", "nope");
        assert_eq!(ctx.substitute("{a}"), "{b}");
    }

    #[test]
    fn test_unknown_and_malformed_left_alone() {
        let ctx = TemplateContext::new().with_var("app", "x");
        assert_eq!(ctx.substitute("{app} {other} {not closed"), "x {other} {not closed");
        assert_eq!(ctx.substitute("awk '{print $1}' {app}"), "awk '{print $1}' x");
    }

    #[test]
    fn test_shell_and_url_encoding() {
        let ctx = TemplateContext::new().with_var("v", "a b&c");
        assert_eq!(ctx.substitute_shell("echo {v}"), "echo 'a b&c'");
        assert_eq!(ctx.substitute_url("?q={v}"), "?q=a%20b%26c");
    }

    #[test]
    fn test_missing() {
        let ctx = TemplateContext::new().with_var("app", "x");
        assert_eq!(ctx.missing("{app} {host} {port}"), ["host", "port"]);
    }
}

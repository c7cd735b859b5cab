//! Vanity import pages for Go packages hosted under the site's domain.
//!
//! `go get {domain}/{pkg}/...` fetches the page and reads its `go-import` and
//! `go-source` meta tags; browsers follow the meta refresh to pkg.go.dev.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::Uri;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

/// Parameters shared by every import page of a site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportSite {
    pub domain: String,
    pub org: String,
    pub branch: String,
}

/// Package whose major versions are published as separate gopkg.in
/// repositories (`gopkg.in/{org}/{name}.{version}`).
///
/// `/{name}` imports `default_version`; `/{name}/{v}` imports each entry of
/// `versions` under the `{domain}/{name}/{v}` import path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedPackage {
    pub name: String,
    pub default_version: String,
    #[serde(default)]
    pub versions: Vec<String>,
}

impl VersionedPackage {
    /// Version served at request path `path`, and the import path suffix it
    /// lives under (empty for the default version).
    pub fn version_for<'a>(&'a self, path: &str) -> (&'a str, String) {
        let rest = path
            .strip_prefix('/')
            .and_then(|p| p.strip_prefix(self.name.as_str()))
            .unwrap_or("");
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        let first = rest.split('/').next().unwrap_or("");
        match self.versions.iter().find(|v| v.as_str() == first) {
            Some(v) => (v.as_str(), format!("/{v}")),
            None => (self.default_version.as_str(), String::new()),
        }
    }
}

impl ImportSite {
    /// Render the import page of versioned package `pkg` for request path
    /// `path`.
    pub fn render_versioned(&self, pkg: &VersionedPackage, path: &str) -> String {
        let (version, prefix) = pkg.version_for(path);
        let domain = escape(&self.domain);
        let org = escape(&self.org);
        let name = escape(&pkg.name);
        let version = escape(version);
        let prefix = escape(&prefix);
        let repo = format!("https://github.com/{org}/{name}");
        let path = escape(path);
        format!(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en" lang="en-us">
<head>
  <meta http-equiv="content-type" content="text/html; charset=utf-8">
  <!-- Go Imports -->
  <meta name="go-import" content="{domain}/{name}{prefix} git https://gopkg.in/{org}/{name}.{version}">
  <meta name="go-source" content="{domain}/{name}{prefix} {repo} {repo}/tree/{version}/{{/dir}} {repo}/blob/{version}{{/dir}}/{{file}}#L{{line}}">
  <meta http-equiv="refresh" content="0; url=https://pkg.go.dev/{domain}{path}">
</head>
<body>
</body>
</html>
"#
        )
    }

    /// Response for a request to `uri` under versioned package `pkg`.
    pub fn respond_versioned(&self, pkg: &VersionedPackage, uri: &Uri) -> impl IntoResponse {
        (
            [
                (CONTENT_TYPE, "text/html; charset=utf-8"),
                (CACHE_CONTROL, "no-cache"),
            ],
            self.render_versioned(pkg, uri.path()),
        )
    }

    /// Render the import page for package `pkg`, reached at request path
    /// `path`.
    pub fn render(&self, pkg: &str, path: &str) -> String {
        let domain = escape(&self.domain);
        let pkg = escape(pkg);
        let repo = format!("https://github.com/{}/{}", escape(&self.org), pkg);
        let branch = escape(&self.branch);
        let path = escape(path);
        format!(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en" lang="en-us">
<head>
  <meta http-equiv="content-type" content="text/html; charset=utf-8">
  <!-- Go Imports -->
  <meta name="go-import" content="{domain}/{pkg} git {repo}">
  <meta name="go-source" content="{domain}/{pkg} {repo} {repo}/tree/{branch}/{{/dir}} {repo}/blob/{branch}{{/dir}}/{{file}}#L{{line}}">
  <meta http-equiv="refresh" content="0; url=https://pkg.go.dev/{domain}{path}">
</head>
<body>
</body>
</html>
"#
        )
    }

    /// Response for a request to `uri` under package `pkg`.
    pub fn respond(&self, pkg: &str, uri: &Uri) -> impl IntoResponse {
        (
            [
                (CONTENT_TYPE, "text/html; charset=utf-8"),
                (CACHE_CONTROL, "no-cache"),
            ],
            self.render(pkg, uri.path()),
        )
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> ImportSite {
        ImportSite {
            domain: "goa.design".into(),
            org: "goadesign".into(),
            branch: "main".into(),
        }
    }

    #[test]
    fn import_meta_tags() {
        let page = site().render("clue", "/clue/log");
        assert!(page.contains(
            r#"<meta name="go-import" content="goa.design/clue git https://github.com/goadesign/clue">"#
        ));
        assert!(page.contains(
            "https://github.com/goadesign/clue/tree/main/{/dir} https://github.com/goadesign/clue/blob/main{/dir}/{file}#L{line}"
        ));
        assert!(page.contains("url=https://pkg.go.dev/goa.design/clue/log"));
    }

    fn goa() -> VersionedPackage {
        VersionedPackage {
            name: "goa".into(),
            default_version: "v2".into(),
            versions: vec!["v3".into()],
        }
    }

    #[test]
    fn version_from_path() {
        let goa = goa();
        assert_eq!(goa.version_for("/goa"), ("v2", String::new()));
        assert_eq!(goa.version_for("/goa/"), ("v2", String::new()));
        assert_eq!(goa.version_for("/goa/design"), ("v2", String::new()));
        assert_eq!(goa.version_for("/goa/v3"), ("v3", "/v3".to_string()));
        assert_eq!(goa.version_for("/goa/v3/http/codegen"), ("v3", "/v3".to_string()));
        assert_eq!(goa.version_for("/goa/v30"), ("v2", String::new()));
    }

    #[test]
    fn default_version_page() {
        let page = site().render_versioned(&goa(), "/goa");
        assert!(page.contains(
            r#"content="goa.design/goa git https://gopkg.in/goadesign/goa.v2">"#
        ));
        assert!(page.contains("https://github.com/goadesign/goa/tree/v2/{/dir}"));
    }

    #[test]
    fn major_version_page() {
        let page = site().render_versioned(&goa(), "/goa/v3/dsl");
        assert!(page.contains(
            r#"content="goa.design/goa/v3 git https://gopkg.in/goadesign/goa.v3">"#
        ));
        assert!(page.contains(
            "goa.design/goa/v3 https://github.com/goadesign/goa https://github.com/goadesign/goa/tree/v3/{/dir}"
        ));
        assert!(page.contains("url=https://pkg.go.dev/goa.design/goa/v3/dsl"));
    }

    #[test]
    fn request_path_is_escaped() {
        let page = site().render("clue", r#"/clue/"><script>"#);
        assert!(!page.contains("<script>"));
        assert!(page.contains("&#34;&gt;&lt;script&gt;"));
    }
}

//! # Route Table and Dispatch
//!
//! A static, explicitly ordered list of (compiled pattern, method →
//! operation) entries, evaluated top to bottom. The first pattern that
//! matches the path wins; ordering is load-bearing (the catch-all artifact
//! route must come after every `/-/` route). A route whose pattern matches
//! but whose method table has no entry is skipped and later routes are
//! tried, so exhausting the table — not a method miss on one route — is
//! what produces a no-operation failure.
//!
//! Named capture groups carry the package name, artifact path, revision
//! token, dist-tag and user; a package-name capture is URL-decoded for an
//! embedded separator (`%2f` → `/`) before being handed to the handler.

use axum::http::Method;
use once_cell::sync::Lazy;
use regex::Regex;

/// The operations the registry engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    GetPackage,
    PutPackage,
    PutRevision,
    DeletePackage,
    GetDistTags,
    PutDistTag,
    Audit,
    Ping,
    Login,
    UserPassthrough,
    GetArtifact,
    DeleteArtifact,
}

struct Route {
    pattern: &'static str,
    /// Paths with this prefix never match the route, standing in for the
    /// original's negative lookahead (unsupported by the regex engine).
    exclude_prefix: Option<&'static str>,
    ops: &'static [(Method, Op)],
}

/// The route table. Order matters: first match wins.
const ROUTES: &[Route] = &[
    Route {
        pattern: r"^/(?P<pkg>[^/]+)$",
        exclude_prefix: None,
        ops: &[(Method::GET, Op::GetPackage), (Method::PUT, Op::PutPackage)],
    },
    Route {
        pattern: r"^/(?P<pkg>[^/]+)/-rev/(?P<rev>.*)$",
        exclude_prefix: None,
        ops: &[
            (Method::PUT, Op::PutRevision),
            (Method::DELETE, Op::DeletePackage),
        ],
    },
    Route {
        pattern: r"^/-/package/(?P<pkg>[^/]+)/dist-tags$",
        exclude_prefix: None,
        ops: &[
            (Method::GET, Op::GetDistTags),
            (Method::PUT, Op::PutDistTag),
        ],
    },
    Route {
        pattern: r"^/-/package/(?P<pkg>[^/]+)/dist-tags/(?P<tag>[^/]+)$",
        exclude_prefix: None,
        ops: &[(Method::PUT, Op::PutDistTag)],
    },
    Route {
        pattern: r"^/-/npm/v1/security/audits(?:/quick)?$",
        exclude_prefix: None,
        ops: &[(Method::POST, Op::Audit)],
    },
    Route {
        pattern: r"^/-/ping$",
        exclude_prefix: None,
        ops: &[(Method::GET, Op::Ping)],
    },
    Route {
        pattern: r"^/-/v1/login$",
        exclude_prefix: None,
        ops: &[(Method::POST, Op::Login)],
    },
    Route {
        pattern: r"^/-/user/org\.couchdb\.user:(?P<user>[\w*~-]+)$",
        exclude_prefix: None,
        ops: &[(Method::PUT, Op::UserPassthrough)],
    },
    Route {
        pattern: r"^/(?P<path>.+?)(?:/-rev/(?P<rev>.*))?$",
        exclude_prefix: Some("/-/"),
        ops: &[
            (Method::GET, Op::GetArtifact),
            (Method::DELETE, Op::DeleteArtifact),
        ],
    },
];

static COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    ROUTES
        .iter()
        .map(|route| {
            Regex::new(route.pattern).unwrap_or_else(|e| {
                panic!(
                    "Failed to compile route pattern {}: {e}. This is a bug in the route table.",
                    route.pattern
                )
            })
        })
        .collect()
});

/// Captures extracted from a matched route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub op: Op,
    pub pkg: Option<String>,
    pub rev: Option<String>,
    pub tag: Option<String>,
    pub path: Option<String>,
    pub user: Option<String>,
}

impl RouteMatch {
    fn from_captures(op: Op, captures: &regex::Captures<'_>) -> Self {
        let group = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
        RouteMatch {
            op,
            // Scoped package names arrive with an encoded separator
            pkg: group("pkg").map(|pkg| pkg.replace("%2f", "/")),
            rev: group("rev"),
            tag: group("tag"),
            path: group("path"),
            user: group("user"),
        }
    }
}

/// Walk the route table in declared order and return the first operation
/// bound to this method on a matching pattern. `None` means the table was
/// exhausted.
pub fn dispatch(method: &Method, path: &str) -> Option<RouteMatch> {
    for (route, regex) in ROUTES.iter().zip(COMPILED.iter()) {
        if let Some(prefix) = route.exclude_prefix {
            if path.starts_with(prefix) {
                continue;
            }
        }
        if let Some(captures) = regex.captures(path) {
            if let Some((_, op)) = route.ops.iter().find(|(m, _)| m == method) {
                return Some(RouteMatch::from_captures(*op, &captures));
            }
            // Method not bound on this route: keep walking the table
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_routes_capture_the_name() {
        let m = dispatch(&Method::GET, "/express").unwrap();
        assert_eq!(m.op, Op::GetPackage);
        assert_eq!(m.pkg.as_deref(), Some("express"));

        let m = dispatch(&Method::PUT, "/express").unwrap();
        assert_eq!(m.op, Op::PutPackage);
    }

    #[test]
    fn scoped_package_separator_is_decoded() {
        let m = dispatch(&Method::GET, "/@scope%2fpkg").unwrap();
        assert_eq!(m.op, Op::GetPackage);
        assert_eq!(m.pkg.as_deref(), Some("@scope/pkg"));
    }

    #[test]
    fn revision_routes() {
        let m = dispatch(&Method::PUT, "/pkg/-rev/rev-17").unwrap();
        assert_eq!(m.op, Op::PutRevision);
        assert_eq!(m.rev.as_deref(), Some("rev-17"));

        let m = dispatch(&Method::DELETE, "/pkg/-rev/rev-17").unwrap();
        assert_eq!(m.op, Op::DeletePackage);
    }

    #[test]
    fn dist_tag_routes() {
        let m = dispatch(&Method::GET, "/-/package/pkg/dist-tags").unwrap();
        assert_eq!(m.op, Op::GetDistTags);

        let m = dispatch(&Method::PUT, "/-/package/pkg/dist-tags/beta").unwrap();
        assert_eq!(m.op, Op::PutDistTag);
        assert_eq!(m.tag.as_deref(), Some("beta"));
    }

    #[test]
    fn ping_beats_the_artifact_catch_all() {
        let m = dispatch(&Method::GET, "/-/ping").unwrap();
        assert_eq!(m.op, Op::Ping);
    }

    #[test]
    fn registrar_routes_never_fall_to_the_artifact_route() {
        // GET on a /-/ path with no GET-capable route: table exhausted,
        // not captured by the artifact catch-all
        assert!(dispatch(&Method::GET, "/-/v1/login").is_none());
    }

    #[test]
    fn audit_routes_match_both_forms() {
        assert_eq!(
            dispatch(&Method::POST, "/-/npm/v1/security/audits").unwrap().op,
            Op::Audit
        );
        assert_eq!(
            dispatch(&Method::POST, "/-/npm/v1/security/audits/quick")
                .unwrap()
                .op,
            Op::Audit
        );
    }

    #[test]
    fn user_route_matches_couchdb_style_names() {
        let m = dispatch(&Method::PUT, "/-/user/org.couchdb.user:some-user").unwrap();
        assert_eq!(m.op, Op::UserPassthrough);
        assert_eq!(m.user.as_deref(), Some("some-user"));
    }

    #[test]
    fn artifact_route_captures_deep_paths() {
        let m = dispatch(&Method::GET, "/pkg/-/pkg-1.0.0.tgz").unwrap();
        assert_eq!(m.op, Op::GetArtifact);
        assert_eq!(m.path.as_deref(), Some("pkg/-/pkg-1.0.0.tgz"));

        let m = dispatch(&Method::DELETE, "/pkg/-/pkg-1.0.0.tgz/-rev/abc").unwrap();
        assert_eq!(m.op, Op::DeleteArtifact);
        assert_eq!(m.path.as_deref(), Some("pkg/-/pkg-1.0.0.tgz"));
        assert_eq!(m.rev.as_deref(), Some("abc"));
    }

    #[test]
    fn method_miss_falls_through_to_later_routes() {
        // POST /pkg matches the first pattern but has no POST handler, and
        // the artifact route has none either: no operation found
        assert!(dispatch(&Method::POST, "/express").is_none());
    }

    #[test]
    fn unmatched_path_exhausts_the_table() {
        assert!(dispatch(&Method::GET, "/").is_none());
    }
}

//! expansion of branch patterns into concrete branches
//!
//! - literal patterns are branches already
//! - `*` patterns glob over the branches that exist in the repository
//! - `**` patterns list what the configuration knows about: every driver
//!   domain under the pattern's literal base is asked for its branches

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::branch::{base_dir, join, pattern_regex, validate_branch, validate_pattern, PatternKind};
use crate::driver::Listing;
use crate::error::{Error, Result};
use crate::refs::{branch_exists, list_branches_matching};
use crate::repo::Repo;
use crate::tree::{ConfigTree, Resolution};

/// pattern used when a command is given none
pub const ALL_BRANCHES: &str = "**";

/// expansion options
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpandOptions {
    /// literal branches must exist in the repository
    pub existing_only: bool,
}

/// expand patterns into branches, deduplicated, in discovery order
pub fn expand(
    repo: &Repo,
    tree: &ConfigTree,
    patterns: &[String],
    options: ExpandOptions,
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut branches = Vec::new();

    for pattern in patterns {
        for branch in expand_pattern(repo, tree, pattern, options)? {
            if seen.insert(branch.clone()) {
                branches.push(branch);
            }
        }
    }

    Ok(branches)
}

/// expand a single pattern
pub fn expand_pattern(
    repo: &Repo,
    tree: &ConfigTree,
    pattern: &str,
    options: ExpandOptions,
) -> Result<Vec<String>> {
    match validate_pattern(pattern)? {
        PatternKind::Literal => {
            if options.existing_only && !branch_exists(repo, pattern)? {
                return Err(Error::RefNotFound(pattern.to_string()));
            }
            Ok(vec![pattern.to_string()])
        }
        PatternKind::SingleStar => {
            let branches = list_branches_matching(repo, pattern)?;
            debug!(pattern, count = branches.len(), "expanded over existing branches");
            Ok(branches)
        }
        PatternKind::DoubleStar => expand_logical(repo, tree, pattern),
    }
}

/// expand a `**` pattern through the configuration tree and driver listings
fn expand_logical(repo: &Repo, tree: &ConfigTree, pattern: &str) -> Result<Vec<String>> {
    let regex = pattern_regex(pattern)?;

    // a base already inside a driver root has that single driver as scope
    let dir = base_dir(pattern);
    let root = if dir.is_empty() {
        None
    } else {
        tree.resolve_driver_root(dir)
    };
    let domains = match root {
        Some(root) => vec![root],
        None => tree.find_domains(pattern),
    };
    debug!(pattern, ?domains, "driver domains");

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for domain in &domains {
        for branch in domain_branches(repo, tree, domain) {
            if regex.is_match(&branch) && seen.insert(branch.clone()) {
                matches.push(branch);
            }
        }
    }

    if matches.is_empty() {
        return Err(Error::PatternNoMatch(pattern.to_string()));
    }
    Ok(matches)
}

/// branches a driver domain currently knows about; problems only warn
fn domain_branches(repo: &Repo, tree: &ConfigTree, domain: &str) -> Vec<String> {
    let binding = match tree.load(repo, domain) {
        Ok(Resolution::Bound(binding)) => binding,
        Ok(Resolution::Disabled) => {
            warn!("skipping disabled domain {}", domain);
            return vec![];
        }
        Ok(Resolution::NotConfigured) => {
            warn!("skipping unconfigured domain {}", domain);
            return vec![];
        }
        Err(e) => {
            warn!("skipping domain {}: {}", domain, e);
            return vec![];
        }
    };

    let driver = tree.driver(&binding);
    let ctx = binding.context(repo, binding.commit);

    match driver.list(&ctx) {
        Ok(Listing::Flat) => vec![domain.to_string()],
        Ok(Listing::Names(names)) => names
            .iter()
            .map(|name| join(domain, name.trim_matches('/')))
            .filter(|branch| match validate_branch(branch) {
                Ok(()) => true,
                Err(e) => {
                    warn!("driver {} listed an invalid branch: {}", driver.name(), e);
                    false
                }
            })
            .collect(),
        Err(e) => {
            warn!("cannot list domain {}: {}", domain, e);
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_literal_passthrough() {
        let fx = Fixture::new();
        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["a/b", "c"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["a/b", "c"]);
    }

    #[test]
    fn test_literal_existing_only() {
        let fx = Fixture::new();
        fx.seed("there", "there");
        let opts = ExpandOptions {
            existing_only: true,
        };

        assert_eq!(
            expand(&fx.repo, &fx.tree, &patterns(&["there"]), opts).unwrap(),
            vec!["there"]
        );
        assert!(matches!(
            expand(&fx.repo, &fx.tree, &patterns(&["missing"]), opts),
            Err(Error::RefNotFound(_))
        ));
    }

    #[test]
    fn test_trailing_slash_is_rejected() {
        let fx = Fixture::new();
        for p in ["a/", "a/**/", "a/*/"] {
            assert!(matches!(
                expand(&fx.repo, &fx.tree, &patterns(&[p]), ExpandOptions::default()),
                Err(Error::InvalidBranch(_))
            ));
        }
    }

    #[test]
    fn test_single_star_uses_existing_refs() {
        let fx = Fixture::new();
        fx.seed("lxc/web", "web");
        fx.seed("lxc/db", "db");
        fx.seed("sysconf", "sysconf");
        // configured but never committed: not an existing branch
        fx.fake_branch("lxc/new", "");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["lxc/*"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["lxc/db", "lxc/web"]);
    }

    #[test]
    fn test_double_star_over_domains() {
        let fx = Fixture::new();
        fx.fake_branch("prefix/a", "list = \"x y\"");
        fx.fake_branch("prefix/b", "list = \"x y\"");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["prefix/**"]),
            ExpandOptions::default(),
        )
        .unwrap();

        let got: HashSet<_> = out.into_iter().collect();
        let want: HashSet<_> = ["prefix/a/x", "prefix/a/y", "prefix/b/x", "prefix/b/y"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_double_star_flat_domain() {
        let fx = Fixture::new();
        fx.fake_branch("sysconf", "");
        fx.fake_branch("db/main", "");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["**"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["db/main", "sysconf"]);
    }

    #[test]
    fn test_double_star_inside_driver_root() {
        let fx = Fixture::new();
        fx.fake_branch("lxc", "list = \"web/rootfs web/config db/rootfs\"");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["lxc/web/**"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["lxc/web/rootfs", "lxc/web/config"]);

        // the root driver was asked once, for its whole listing
        let calls = fx.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("list root=lxc sub= "));
    }

    #[test]
    fn test_double_star_skips_disabled_domain() {
        let fx = Fixture::new();
        fx.fake_branch("prefix/a", "list = \"x\"");
        fx.fake_branch("prefix/b", "list = \"x\"\nenabled = false");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["prefix/**"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["prefix/a/x"]);
    }

    #[test]
    fn test_double_star_skips_failing_domain() {
        let fx = Fixture::new();
        fx.fake_branch("prefix/a", "list = \"x\"");
        fx.configure("prefix/b", "driver = \"/nonexistent/driver\"");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["prefix/**"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["prefix/a/x"]);
    }

    #[test]
    fn test_double_star_without_match_is_an_error() {
        let fx = Fixture::new();
        fx.fake_branch("prefix/a", "list = \"x\"");

        for p in ["other/**", "prefix/a/z**"] {
            assert!(matches!(
                expand(&fx.repo, &fx.tree, &patterns(&[p]), ExpandOptions::default()),
                Err(Error::PatternNoMatch(_))
            ));
        }
    }

    #[test]
    fn test_expansion_deduplicates_in_order() {
        let fx = Fixture::new();
        fx.fake_branch("prefix/a", "list = \"x y\"");

        let out = expand(
            &fx.repo,
            &fx.tree,
            &patterns(&["prefix/a/y", "prefix/**", "prefix/a/x"]),
            ExpandOptions::default(),
        )
        .unwrap();
        assert_eq!(out, vec!["prefix/a/y", "prefix/a/x"]);
    }
}

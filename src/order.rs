//! Ordering directories for removal so that children are always removed before
//! their parents, without requiring a full tree structure.

use crate::path::VirtualPath;

/// Orders `dirs` for safe removal: lexically descending by path. Since every
/// descendant's path is its ancestor's path extended with a `/`-prefixed suffix,
/// a descendant always sorts before its ancestor under plain string descending
/// order, which guarantees every directory is removed before any of its
/// ancestors.
pub fn order_dirs_to_remove(mut dirs: Vec<VirtualPath>) -> Vec<VirtualPath> {
    dirs.sort_by(|a, b| b.as_str().cmp(a.as_str()));
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn children_precede_parents() {
        let dirs = vec![
            VirtualPath::parse("/dir1"),
            VirtualPath::parse("/dir12"),
            VirtualPath::parse("/dir1/a/b"),
            VirtualPath::parse("/dir1/a"),
        ];
        let ordered = order_dirs_to_remove(dirs);
        let as_strs: Vec<&str> = ordered.iter().map(|p| p.as_str()).collect();
        assert_eq!(as_strs, vec!["/dir12", "/dir1/a/b", "/dir1/a", "/dir1"]);
    }

    #[test]
    fn every_ancestor_appears_after_its_descendants() {
        let dirs = vec![
            VirtualPath::parse("/a/b/c"),
            VirtualPath::parse("/a/b"),
            VirtualPath::parse("/a"),
            VirtualPath::parse("/z"),
        ];
        let ordered = order_dirs_to_remove(dirs);
        for i in 0..ordered.len() {
            for j in 0..ordered.len() {
                if ordered[i].is_ancestor_of(&ordered[j]) {
                    assert!(i > j, "ancestor {} must be removed after descendant {}", ordered[i], ordered[j]);
                }
            }
        }
    }
}

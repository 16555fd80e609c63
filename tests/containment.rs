//! Containment property: every resolvable input stays inside the root,
//! everything else fails with `PathTraversal`.

use anyhow::Result;
use tempfile::TempDir;
use wiki_hub_core::paths::PathResolver;
use wiki_hub_core::StoreError;

#[test]
fn resolved_paths_never_leave_the_root() -> Result<()> {
    let dir = TempDir::new()?;
    let resolver = PathResolver::new(dir.path())?;

    let inputs = [
        "",
        "/",
        ".",
        "a",
        "a/b/c.md",
        "/leading/slash.md",
        "\\windows\\style.md",
        "a/./b",
        "a/../b",
        "deep/../../top",
        "..",
        "../sibling",
        "../../../../etc/passwd",
        "..\\..\\outside",
        "a/b/../../../../x",
        "./../x",
        "trail/.. /odd",
        "  spaced/page.md  ",
    ];

    for input in inputs {
        match resolver.resolve(input) {
            Ok(resolved) => {
                assert!(
                    resolved.starts_with(resolver.root()),
                    "{input:?} resolved outside the root: {resolved:?}"
                );
            }
            Err(StoreError::PathTraversal(_)) => {}
            Err(other) => panic!("{input:?} failed with unexpected error: {other}"),
        }
    }
    Ok(())
}

#[test]
fn prefix_sharing_siblings_are_not_confused() -> Result<()> {
    // /data vs /data-secret: containment must be component-wise, not a
    // string-prefix check
    let parent = TempDir::new()?;
    let root = parent.path().join("data");
    std::fs::create_dir_all(&root)?;
    std::fs::create_dir_all(parent.path().join("data-secret"))?;

    let resolver = PathResolver::new(&root)?;
    let err = resolver.resolve("../data-secret/keys.md").unwrap_err();
    assert!(matches!(err, StoreError::PathTraversal(_)));
    Ok(())
}

#[test]
fn relative_form_uses_forward_slashes() -> Result<()> {
    let dir = TempDir::new()?;
    let resolver = PathResolver::new(dir.path())?;
    let resolved = resolver.resolve("docs/guide/intro.md")?;
    assert_eq!(resolver.relative_of(&resolved), "docs/guide/intro.md");
    assert_eq!(resolver.relative_of(resolver.root()), "");
    Ok(())
}

//! Repository arguments starting with `~` resolve against `$HOME`.
//!
//! Kept in its own test binary because it changes the process environment.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

mod common;

use common::TestContext;

#[tokio::test]
async fn test_create_expands_home() -> Result<()> {
    let ctx = TestContext::new()?;
    let home = ctx.root.join("home");
    let repo = home.join("myrepo");
    std::fs::create_dir_all(&repo)?;
    std::fs::write(repo.join("README.md"), "# home\n")?;
    std::env::set_var("HOME", &home);

    let cancel = CancellationToken::new();
    let named = ctx.manager.create("~/myrepo", Some("ws1"), &cancel).await?;
    assert_eq!(named.mount_path, ctx.overlay_root().join("ws1"));

    let overlay = ctx.mounts.calls_to("fuse-overlayfs");
    assert!(
        overlay[0].args[1].starts_with(&format!("lowerdir={},", repo.display())),
        "{}",
        overlay[0].args[1]
    );

    let generated = ctx.manager.create("~/myrepo/", None, &cancel).await?;
    assert!(generated.name.as_str().starts_with("myrepo-"), "{}", generated.name);
    Ok(())
}

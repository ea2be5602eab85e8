use anyhow::Result;
use vergen_gitcl::{BuildBuilder, Emitter, GitclBuilder};

/// Emits `VERGEN_GIT_SHA` (short) and `VERGEN_BUILD_TIMESTAMP` for `build_info()`. Outside a
/// git checkout the sha is left unset and reported as unknown.
fn main() -> Result<()> {
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let git = GitclBuilder::default().sha(true).build()?;

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&git)?
        .emit()?;
    Ok(())
}

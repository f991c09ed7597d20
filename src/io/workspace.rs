//! Working-tree preparation before the agent starts.
//!
//! The exclusion file is written before anything else so build artifacts and
//! secrets never get staged; the template is then materialized so the agent
//! edits an already-working app instead of scaffolding from zero.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

/// Exclusions staged changes must never include.
const WORKTREE_GITIGNORE: &str = "node_modules/
.next/
out/
dist/
build/
.turbo/
.vercel/
*.tsbuildinfo
.env
.env.*
!.env.example
";

/// Create the working tree: exclusion file plus optional template copy.
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn prepare_working_tree(workdir: &Path, template_dir: Option<&Path>) -> Result<()> {
    fs::create_dir_all(workdir)
        .with_context(|| format!("create working tree {}", workdir.display()))?;
    fs::write(workdir.join(".gitignore"), WORKTREE_GITIGNORE)
        .with_context(|| format!("write {}/.gitignore", workdir.display()))?;

    let Some(template_dir) = template_dir else {
        return Ok(());
    };
    if !template_dir.is_dir() || fs::read_dir(template_dir)?.next().is_none() {
        warn!(template_dir = %template_dir.display(), "template dir is empty or missing");
        return Ok(());
    }
    let copied = copy_dir_recursive(template_dir, workdir)
        .with_context(|| format!("materialize template {}", template_dir.display()))?;
    info!(copied, "template copied into working tree");
    Ok(())
}

/// Copy all files under `src` into `dst`, preserving relative paths.
/// Returns the number of files copied.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in fs::read_dir(src).with_context(|| format!("read dir {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)
                .with_context(|| format!("create {}", dst_path.display()))?;
            copied += copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!("copy {} -> {}", src_path.display(), dst_path.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_gitignore_without_template() {
        let temp = tempfile::tempdir().expect("tempdir");
        let work = temp.path().join("out");
        prepare_working_tree(&work, None).expect("prepare");

        let gitignore = fs::read_to_string(work.join(".gitignore")).expect("read");
        assert!(gitignore.contains("node_modules/"));
        assert!(gitignore.contains("!.env.example"));
    }

    #[test]
    fn copies_template_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let template = temp.path().join("tpl");
        fs::create_dir_all(template.join("src")).expect("mkdir");
        fs::write(template.join("package.json"), "{}").expect("write");
        fs::write(template.join("src/page.tsx"), "export {}").expect("write");

        let work = temp.path().join("out");
        prepare_working_tree(&work, Some(&template)).expect("prepare");

        assert!(work.join("package.json").is_file());
        assert!(work.join("src/page.tsx").is_file());
        assert!(work.join(".gitignore").is_file());
    }

    #[test]
    fn missing_template_dir_is_tolerated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let work = temp.path().join("out");
        prepare_working_tree(&work, Some(&temp.path().join("nope"))).expect("prepare");
        assert!(work.join(".gitignore").is_file());
    }
}

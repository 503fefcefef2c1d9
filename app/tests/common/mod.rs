//! Test helper module for E2E tests
//!
//! Provides `TestFixture` for setting up a corpus directory and running the `nd` CLI.

#![allow(dead_code)] // Test helpers may not be used in all test modules
#![allow(deprecated)] // cargo_bin() deprecation

pub mod mcp;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use std::path::PathBuf;

/// Test fixture providing a temporary corpus directory with helper methods
/// for file operations and running the `nd` CLI against it.
pub struct TestFixture {
    pub dir: TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Default neighbor cache location (.near_diff/cache.db)
    pub fn db_path(&self) -> PathBuf {
        self.root().join(".near_diff").join("cache.db")
    }

    // ============ File Operations ============

    /// Add a text file (creates parent dirs automatically)
    pub fn add_file(&self, path: &str, content: &str) -> &Self {
        self.dir.child(path).write_str(content).unwrap();
        self
    }

    pub fn add_binary(&self, path: &str, bytes: &[u8]) -> &Self {
        self.dir.child(path).write_binary(bytes).unwrap();
        self
    }

    pub fn remove_file(&self, path: &str) -> &Self {
        std::fs::remove_file(self.root().join(path)).unwrap();
        self
    }

    // ============ nd CLI ============

    /// A `nd` command running inside the fixture directory.
    pub fn nd(&self) -> Command {
        let mut cmd = Command::cargo_bin("nd").unwrap();
        cmd.current_dir(self.root());
        cmd
    }

    /// `nd <subcommand> --root <fixture>`
    pub fn nd_at(&self, subcommand: &str) -> Command {
        let mut cmd = self.nd();
        cmd.arg(subcommand).arg("--root").arg(self.root());
        cmd
    }

    pub fn list(&self) -> std::process::Output {
        self.nd_at("list").output().expect("nd list failed")
    }

    pub fn neighbors(&self, path: &str, extra: &[&str]) -> std::process::Output {
        self.nd_at("neighbors")
            .args(extra)
            .arg(path)
            .output()
            .expect("nd neighbors failed")
    }

    pub fn diff(&self, left: &str, right: &str, extra: &[&str]) -> std::process::Output {
        self.nd_at("diff")
            .args(extra)
            .arg(left)
            .arg(right)
            .output()
            .expect("nd diff failed")
    }

    /// Run `nd index` and assert success
    pub fn index(&self, extra: &[&str]) -> &Self {
        self.nd_at("index").args(extra).assert().success();
        self
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

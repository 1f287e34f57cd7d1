//! On-disk project fixtures for operator and CLI tests.

use std::fs;
use std::path::{Path, PathBuf};

use stackctl::testkit::config;
use tempfile::TempDir;

/// Two services with no readiness checks, so probes never hit the network.
pub const UNCHECKED: &str = r#"
[project]
name = "acme"

[services.db]
image = "postgres:16"

[services.api]
image = "acme/api:1"
depends_on = ["db"]
"#;

/// `a -> b -> a`.
pub const CYCLIC: &str = r#"
[project]
name = "acme"

[services.a]
image = "a:1"
depends_on = ["b"]

[services.b]
image = "b:1"
depends_on = ["a"]
"#;

/// A project directory: `stack/` for manifests, `state/` for state and a
/// `stackctl.toml` pointing at both.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new(manifest: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = Self { dir };
        fs::create_dir_all(sandbox.manifest_dir()).expect("manifest dir");
        sandbox.write_manifest("stack.toml", manifest);
        fs::write(sandbox.config_path(), sandbox.config_toml()).expect("config");
        sandbox
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.root().join("stack")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root().join("state")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("stackctl.toml")
    }

    pub fn config_toml(&self) -> String {
        config::toml(&self.manifest_dir(), &self.state_dir())
    }

    pub fn write_manifest(&self, file: &str, contents: &str) {
        fs::write(self.manifest_dir().join(file), contents).expect("manifest");
    }
}

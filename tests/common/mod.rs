// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed fragment repository and a fluent
// builder so each integration test can lay out mod folders without
// repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use cfgpatch::loader;
use cfgpatch::session::{FragmentSource, MergeOutcome, MergeSession, SessionOptions};

/// Text of the sample mission-script fragment shipped in `tests/fixtures/`.
pub const MISSION_SCRIPT_FIXTURE: &str = include_str!("../fixtures/add_mission_script.cpp");

/// Fragment registering `JM_CF_Scripts` and seeding the mission script list
/// that the fixture appends to.
pub const COMMUNITY_FRAMEWORK: &str = r#"
class CfgPatches
{
    class JM_CF_Scripts
    {
        units[] = {};
        weapons[] = {};
        requiredVersion = 0.1;
        requiredAddons[] = { "DZ_Data" };
    };
};

class CfgMods
{
    class JM_CommunityFramework
    {
        name = "Community Framework";
        class defs
        {
            class missionScriptModule
            {
                value = "";
                files[] = { "JM/CF/Scripts/5_Mission" };
            };
        };
    };
};
"#;

/// Fragment registering the base game data module.
pub const GAME_DATA: &str = r#"
class CfgPatches
{
    class DZ_Data
    {
        units[] = {};
        weapons[] = {};
        requiredVersion = 0.1;
        requiredAddons[] = {};
    };
};
"#;

/// An isolated fragment repository backed by a [`tempfile::TempDir`].
///
/// The directory is automatically deleted when dropped (via the underlying
/// [`tempfile::TempDir`]).
pub struct FragmentRepo {
    /// Temporary directory holding one sub-directory per mod.
    pub root: tempfile::TempDir,
}

impl FragmentRepo {
    /// Path to the repository root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Discover and read every `.cpp` fragment under the root.
    pub fn load(&self) -> Vec<FragmentSource> {
        loader::load_fragments(&[self.root.path().to_path_buf()], &["cpp".to_string()])
            .expect("load fragments")
    }

    /// Load every fragment and run a full session with `options`.
    pub fn merge(&self, options: &SessionOptions) -> MergeOutcome {
        MergeSession::run(self.load(), options).expect("merge session")
    }

    /// Source reference the loader assigns to `relative`.
    pub fn source_of(&self, relative: &str) -> String {
        self.root.path().join(relative).display().to_string()
    }
}

/// Fluent builder for [`FragmentRepo`].
pub struct FragmentRepoBuilder {
    repo: FragmentRepo,
}

impl FragmentRepoBuilder {
    /// Begin building an empty repository.
    pub fn new() -> Self {
        Self {
            repo: FragmentRepo {
                root: tempfile::tempdir().expect("create temp dir"),
            },
        }
    }

    /// Write `content` to `<relative>` in the repository, creating parent
    /// directories as needed.
    pub fn with_fragment(self, relative: &str, content: &str) -> Self {
        let path: PathBuf = self.repo.root.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fragment parent");
        }
        std::fs::write(&path, content).expect("write fragment");
        self
    }

    /// Lay out the fixture together with the two modules it depends on.
    pub fn with_mission_script_mods(self) -> Self {
        self.with_fragment("ADD_MISSION_SCRIPT/config.cpp", MISSION_SCRIPT_FIXTURE)
            .with_fragment("JM_CF/Scripts/config.cpp", COMMUNITY_FRAMEWORK)
            .with_fragment("DZ/data/config.cpp", GAME_DATA)
    }

    /// Finish building and return the repository.
    pub fn build(self) -> FragmentRepo {
        self.repo
    }
}

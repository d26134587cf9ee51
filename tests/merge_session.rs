#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing
)]
//! Integration tests for full merge sessions over fragments on disk.
//!
//! These tests lay out mod folders in a temporary directory, load them with
//! the loader exactly as the CLI does, and check the merged tree, the
//! resolved order and the failure modes of a session.

mod common;

use cfgpatch::error::{ResolveError, SessionError};
use cfgpatch::fragment::Scalar;
use cfgpatch::registry::ModuleVersion;
use cfgpatch::render;
use cfgpatch::session::{
    FragmentErrorPolicy, FragmentStatus, MergeOutcome, MergeSession, SessionOptions,
};
use common::{FragmentRepoBuilder, MISSION_SCRIPT_FIXTURE};

const FILES_PATH: &str = "CfgMods.JM_CommunityFramework.defs.missionScriptModule.files";

fn sequential() -> SessionOptions {
    SessionOptions {
        parallel: false,
        ..SessionOptions::default()
    }
}

fn identities(outcome: &MergeOutcome) -> Vec<&str> {
    outcome.order.iter().map(|r| r.identity.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Mission script sample
// ---------------------------------------------------------------------------

#[test]
fn mission_script_is_appended_after_its_dependencies() {
    let repo = FragmentRepoBuilder::new().with_mission_script_mods().build();
    let outcome = repo.merge(&SessionOptions::default());

    assert_eq!(
        identities(&outcome),
        ["DZ_Data", "JM_CF_Scripts", "ADD_MISSION_SCRIPT"]
    );

    let files: Vec<&str> = outcome
        .tree
        .get_array(FILES_PATH)
        .expect("files array")
        .iter()
        .filter_map(Scalar::as_str)
        .collect();
    assert_eq!(files, ["JM/CF/Scripts/5_Mission", "test/path/5_Mission/"]);

    assert_eq!(
        outcome
            .tree
            .get_str("cfgmods.jm_communityframework.name")
            .expect("name survives the append"),
        "Community Framework"
    );
    assert_eq!(outcome.report.count(FragmentStatus::Merged), 3);
}

#[test]
fn merged_framework_class_renders_as_fragment_text() {
    let repo = FragmentRepoBuilder::new().with_mission_script_mods().build();
    let outcome = repo.merge(&SessionOptions::default());
    let entry = outcome
        .tree
        .lookup("CfgMods.JM_CommunityFramework")
        .expect("class exists");

    insta::assert_snapshot!(render::entry_to_text(entry), @r#"
    class JM_CommunityFramework
    {
        name = "Community Framework";
        class defs
        {
            class missionScriptModule
            {
                value = "";
                files[] = {"JM/CF/Scripts/5_Mission", "test/path/5_Mission/"};
            };
        };
    };
    "#);
}

#[test]
fn registry_records_fixture_metadata() {
    let repo = FragmentRepoBuilder::new().with_mission_script_mods().build();
    let mut session = MergeSession::new(sequential());
    session.parse(repo.load()).expect("parse");
    session.register().expect("register");

    let record = session
        .registry()
        .get("add_mission_script")
        .expect("registered case-insensitively");
    assert!(record.registered);
    assert_eq!(
        record.required_version.as_ref().map(ToString::to_string),
        Some("0.1".to_string())
    );
    let deps: Vec<&str> = record
        .dependencies
        .iter()
        .map(|d| d.identity.as_str())
        .collect();
    assert_eq!(deps, ["JM_CF_Scripts", "DZ_Data"]);
    assert_eq!(
        record.provenance.source.as_str(),
        repo.source_of("ADD_MISSION_SCRIPT/config.cpp")
    );
    assert_eq!(record.provenance.digest.len(), 64);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn parallel_sequential_and_permuted_runs_agree() {
    let repo = FragmentRepoBuilder::new()
        .with_mission_script_mods()
        .with_fragment(
            "Zeta/config.cpp",
            "class CfgPatches { class Zeta {}; }; class CfgMods { class Zeta { n = 1; }; };",
        )
        .with_fragment(
            "Alpha/config.cpp",
            "class CfgPatches { class Alpha {}; }; class CfgMods { class Alpha { n = 2; }; };",
        )
        .build();

    let parallel = repo.merge(&SessionOptions::default());
    let serial = repo.merge(&sequential());
    let mut reversed_sources = repo.load();
    reversed_sources.reverse();
    let reversed = MergeSession::run(reversed_sources, &SessionOptions::default())
        .expect("reversed input merges");

    assert_eq!(parallel.tree, serial.tree);
    assert_eq!(parallel.tree, reversed.tree);
    assert_eq!(identities(&parallel), identities(&reversed));
    assert_eq!(
        identities(&parallel),
        ["Alpha", "DZ_Data", "JM_CF_Scripts", "ADD_MISSION_SCRIPT", "Zeta"]
    );
}

#[test]
fn merging_twice_reproduces_the_same_tree() {
    let repo = FragmentRepoBuilder::new().with_mission_script_mods().build();
    let first = repo.merge(&sequential());
    let second = repo.merge(&sequential());
    assert_eq!(first.tree, second.tree);
    assert_eq!(
        render::to_json(&first.tree),
        render::to_json(&second.tree)
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn fixture_alone_reports_missing_dependency() {
    let repo = FragmentRepoBuilder::new()
        .with_fragment("ADD_MISSION_SCRIPT/config.cpp", MISSION_SCRIPT_FIXTURE)
        .build();
    let err = MergeSession::run(repo.load(), &sequential()).expect_err("dependencies missing");
    match err {
        SessionError::Resolve(ResolveError::MissingDependency { module, missing, .. }) => {
            assert_eq!(module, "ADD_MISSION_SCRIPT");
            assert!(missing == "JM_CF_Scripts" || missing == "DZ_Data");
        }
        other => panic_on(&other),
    }
}

#[test]
fn old_host_version_is_rejected() {
    let repo = FragmentRepoBuilder::new().with_mission_script_mods().build();
    let options = SessionOptions {
        host_version: Some(ModuleVersion::parse("0.0").expect("valid version")),
        ..sequential()
    };
    let err = MergeSession::run(repo.load(), &options).expect_err("host too old");
    assert!(
        matches!(
            err,
            SessionError::Resolve(ResolveError::VersionMismatch { ref subject, .. }) if subject == "host"
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn two_digit_required_version_checks_against_host() {
    let repo = FragmentRepoBuilder::new()
        .with_fragment(
            "Legacy/config.cpp",
            "class CfgPatches { class Legacy { requiredVersion = 1.00; }; };",
        )
        .build();

    let host = |version: &str| SessionOptions {
        host_version: Some(ModuleVersion::parse(version).expect("valid version")),
        ..sequential()
    };
    let outcome = MergeSession::run(repo.load(), &host("1.0")).expect("1.00 is met by 1.0");
    assert_eq!(identities(&outcome), ["Legacy"]);

    let err = MergeSession::run(repo.load(), &host("0.99")).expect_err("host too old");
    assert!(
        matches!(
            err,
            SessionError::Resolve(ResolveError::VersionMismatch { ref required, .. }) if required == ">= 1.00"
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn mutual_requirements_are_a_cycle() {
    let repo = FragmentRepoBuilder::new()
        .with_fragment(
            "A/config.cpp",
            "class CfgPatches { class A { requiredAddons[] = {\"B\"}; }; };",
        )
        .with_fragment(
            "B/config.cpp",
            "class CfgPatches { class B { requiredAddons[] = {\"A\"}; }; };",
        )
        .build();
    let err = MergeSession::run(repo.load(), &sequential()).expect_err("cycle");
    match err {
        SessionError::Resolve(ResolveError::CyclicDependency { cycle }) => {
            assert_eq!(cycle, ["A", "B", "A"]);
        }
        other => panic_on(&other),
    }
}

#[test]
fn broken_fragment_is_rejected_by_default_and_skipped_on_request() {
    let repo = FragmentRepoBuilder::new()
        .with_mission_script_mods()
        .with_fragment("Broken/config.cpp", "class Broken { x = ; };")
        .build();

    let err = MergeSession::run(repo.load(), &sequential()).expect_err("reject policy");
    match &err {
        SessionError::Fragments(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(
                errors[0].source_ref().as_str(),
                repo.source_of("Broken/config.cpp")
            );
        }
        other => panic_on(other),
    }

    let options = SessionOptions {
        on_fragment_error: FragmentErrorPolicy::Skip,
        ..sequential()
    };
    let outcome = MergeSession::run(repo.load(), &options).expect("skip policy merges");
    assert_eq!(outcome.report.count(FragmentStatus::Skipped), 1);
    assert_eq!(outcome.report.count(FragmentStatus::Merged), 3);
    assert!(outcome.tree.lookup("Broken").is_err());
}

#[allow(clippy::panic)]
fn panic_on(err: &SessionError) -> ! {
    panic!("unexpected error: {err}")
}

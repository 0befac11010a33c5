use std::path::{Path, PathBuf};
use std::sync::Arc;

use dynload::commands::{
    build_command, build_from_file, build_options, inspect_command, list_capabilities_command,
    load_and_invoke, run_command, BuildSummary, InspectReport,
};
use dynload_core::artifact::decode;
use dynload_core::build;
use dynload_core::model::hello_world_unit;
use dynload_core::services::InterpreterHost;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn no_pool_flag_disables_constant_sharing() {
    assert!(build_options(false).pool_constants);
    assert!(!build_options(true).pool_constants);

    let pooled = build_from_file(&fixture("greeter.yaml"), false).expect("pooled");
    let unpooled = build_from_file(&fixture("greeter.yaml"), true).expect("unpooled");
    // Every constant in the fixture is distinct, so pooling changes nothing.
    assert_eq!(pooled, unpooled);
}

#[test]
fn build_summary_counts_pool_and_members() {
    let artifact = build_from_file(&fixture("greeter.yaml"), false).expect("build");
    let summary = BuildSummary::from_artifact(&artifact).expect("summary");
    assert_eq!(summary.name, "Greeter");
    assert_eq!(summary.members, 2);
    assert_eq!(summary.size, artifact.len());
    assert_eq!(summary.sha256, artifact.digest());
    assert!(summary.pool_entries > 0);
}

#[test]
fn inspect_report_renders_code() {
    let artifact = build(&hello_world_unit("HelloWorld", "Hello, World!")).expect("build");
    let unit = decode(artifact.as_bytes()).expect("decode");
    let report = InspectReport::new(&unit, artifact.digest());

    assert_eq!(report.members.len(), 2);
    let init = &report.members[0];
    assert_eq!(init.kind, "initializer");
    assert_eq!(init.descriptor, "()V");
    assert_eq!(init.code.first().map(String::as_str), Some("load_receiver"));

    let say = &report.members[1];
    assert_eq!(say.name, "sayHello");
    assert!(say.code[0].ends_with("\"Hello, World!\""));
    assert_eq!(say.code.last().map(String::as_str), Some("return"));
    assert!(report.pool.iter().any(|row| row.tag == "external_ref"));
}

#[test]
fn load_and_invoke_writes_through_host() {
    let (host, captured) = InterpreterHost::capturing();
    let artifact = build(&hello_world_unit("HelloWorld", "captured")).expect("build");
    load_and_invoke(Arc::new(host), "HelloWorld", artifact, "sayHello").expect("invoke");
    assert_eq!(captured.stdout(), "captured\n");
}

#[test]
fn command_functions_succeed_on_fixture() {
    let greeter = fixture("greeter.yaml");
    build_command(&greeter, false, false, false).expect("build");
    build_command(&greeter, true, false, true).expect("build hex");
    build_command(&greeter, false, true, false).expect("build json");
    inspect_command(&greeter, false).expect("inspect");
    inspect_command(&greeter, true).expect("inspect json");
    run_command(&greeter, "greet", false).expect("run");
    list_capabilities_command(false).expect("capabilities");
    list_capabilities_command(true).expect("capabilities json");
}

#[test]
fn command_functions_surface_errors() {
    let err = build_command(&fixture("unresolved.json"), false, false, false).unwrap_err();
    assert!(format!("{err:#}").contains("std.net::send(S)V"));

    let err = run_command(&fixture("greeter.yaml"), "nope", false).unwrap_err();
    assert!(err.to_string().contains("Failed to invoke Greeter.nope"));
}

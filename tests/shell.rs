mod common;

use std::path::Path;

use common::{options, pattern};
use pseudo_fs::{
    disk::init::{format_image, staging_path},
    shell::command::{Flow, Session},
};
use tempfile::TempDir;

fn session(tmp: &TempDir, disk_size: u64, cluster_size: u32, inodes: u32) -> Session {
    let image = tmp.path().join("myFS");
    let opts = options(disk_size, cluster_size, inodes);
    let fs = format_image(&image, &opts).unwrap();
    Session::new(fs, image, opts, false)
}

/// 执行若干行命令，返回全部输出
fn run(session: &mut Session, lines: &[&str]) -> String {
    let mut out = Vec::new();
    for line in lines {
        session.run_line(line, &mut out).unwrap();
    }
    String::from_utf8(out).unwrap()
}

fn host_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn import_inspect_and_remove() {
    let tmp = tempfile::tempdir().unwrap();
    let host = tmp.path().join("localfile");
    std::fs::write(&host, pattern(2500)).unwrap();
    let mut session = session(&tmp, 10_000, 1000, 100);

    let out = run(
        &mut session,
        &["mkdir /a", &format!("incp {} /a", host_arg(&host)), "info /a/localfile"],
    );
    assert_eq!(
        out,
        "OK\nOK\nNAME: localfile - SIZE: 2500B - I-NODE_ID: 2 - CLUSTERS: 3 - DIRECT: 2, 3, 4 - INDIRECT1: none - INDIRECT2: none\n"
    );

    let out = run(&mut session, &["rm /a/localfile", "ls /a"]);
    assert_eq!(
        out,
        "OK\n\
         Total items: 2\n\
         + SIZE: 36B, PARENT_ID: 0, NODE_ID: 1, CLUSTERS: 1, NAME: .\n\
         + SIZE: 52B, PARENT_ID: 0, NODE_ID: 0, CLUSTERS: 1, NAME: ..\n"
    );
}

#[test]
fn cat_prints_contents_and_outcp_exports() {
    let tmp = tempfile::tempdir().unwrap();
    let host = tmp.path().join("hello.txt");
    std::fs::write(&host, "hello, pseudo fs").unwrap();
    let exported = tmp.path().join("exported.txt");
    let mut session = session(&tmp, 20_000, 1000, 16);

    let out = run(
        &mut session,
        &[
            &format!("incp {}", host_arg(&host)),
            "cat hello.txt",
            &format!("outcp hello.txt {}", host_arg(&exported)),
        ],
    );
    assert_eq!(out, "OK\nhello, pseudo fs\nOK\n");
    assert_eq!(std::fs::read_to_string(&exported).unwrap(), "hello, pseudo fs");
}

#[test]
fn failures_print_fixed_diagnostics() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);

    let out = run(
        &mut session,
        &[
            "cat nothing",
            "cd nowhere",
            "mkdir a",
            "mkdir a",
            "rmdir a/",
            "frobnicate",
            "cp",
            "incp /definitely/not/here",
        ],
    );
    assert_eq!(
        out,
        "FILE NOT FOUND\n\
         PATH NOT FOUND\n\
         OK\n\
         EXISTS\n\
         OK\n\
         UNKNOWN COMMAND: frobnicate\n\
         USAGE: cp <src> <dst>\n\
         FILE NOT FOUND\n"
    );
}

#[test]
fn cd_and_pwd_follow_the_working_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);

    let out = run(
        &mut session,
        &["mkdir x", "mkdir x/y", "cd x/y", "pwd", "cd ..", "pwd", "cd", "pwd"],
    );
    assert_eq!(out, "OK\nOK\n/x/y\n/x\n/\n");
    assert_eq!(session.working_directory(), "/");
}

#[test]
fn load_echoes_each_line() {
    let tmp = tempfile::tempdir().unwrap();
    let script = tmp.path().join("script.txt");
    std::fs::write(&script, "mkdir x\n\ncd x\npwd\n").unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);

    let out = run(&mut session, &[&format!("load {}", host_arg(&script))]);
    assert_eq!(out, "> mkdir x\nOK\n> cd x\n> pwd\n/x\nOK\n");

    let out = run(&mut session, &["load /no/such/script"]);
    assert_eq!(out, "FILE NOT FOUND\n");
}

#[test]
fn self_loading_script_stops_at_the_depth_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let script = tmp.path().join("again.txt");
    std::fs::write(&script, format!("load {}\n", host_arg(&script))).unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);

    let out = run(&mut session, &[&format!("load {}", host_arg(&script))]);
    assert_eq!(out.matches("IO ERROR").count(), 1);
    assert!(out.ends_with("OK\n"));
}

#[test]
fn format_replaces_the_image() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);

    run(&mut session, &["mkdir old", "cd old"]);
    let out = run(&mut session, &["format 30KB", "pwd", "ls"]);
    assert!(out.starts_with("OK\n/\nTotal items: 2\n"), "{}", out);
    assert_eq!(session.fs().super_block().cluster_count, 30);

    let out = run(&mut session, &["format 0KB"]);
    assert!(out.starts_with("INVALID ARGUMENT"), "{}", out);
}

#[test]
fn failed_format_keeps_the_current_image() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);
    run(&mut session, &["mkdir old"]);

    std::fs::create_dir(staging_path(&tmp.path().join("myFS"))).unwrap();
    let out = run(&mut session, &["format 30KB", "ls"]);
    assert!(out.starts_with("IO ERROR\nTotal items: 3\n"), "{}", out);
    assert_eq!(session.fs().super_block().cluster_count, 20);
    assert_eq!(run(&mut session, &["mkdir new"]), "OK\n");
}

#[test]
fn printfs_reports_consistency() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);

    let out = run(&mut session, &["mkdir d", "printfs"]);
    assert!(out.contains("SUPERBLOCK"), "{}", out);
    assert!(out.ends_with("CONSISTENT\n"), "{}", out);
}

#[test]
fn quit_ends_the_session() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = session(&tmp, 20_000, 1000, 16);
    let mut out = Vec::new();

    assert_eq!(session.run_line("# comment", &mut out).unwrap(), Flow::Continue);
    assert_eq!(session.run_line("   ", &mut out).unwrap(), Flow::Continue);
    assert_eq!(session.run_line("quit", &mut out).unwrap(), Flow::Quit);
    assert_eq!(session.run_line("exit", &mut out).unwrap(), Flow::Quit);
    assert!(out.is_empty());
}

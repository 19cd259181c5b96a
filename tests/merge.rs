use std::fs;
use std::path::{Path, PathBuf};

use classcov::execdata::{ExecutionData, ExecutionDataWriter, SessionInfo};
use classcov::merge::{ExecFileLoader, MergeError};

fn write_exec_file(path: &Path, sessions: &[SessionInfo], data: &[ExecutionData]) {
    let mut out = Vec::new();
    let mut writer = ExecutionDataWriter::new(&mut out).unwrap();
    for info in sessions {
        writer.write_session_info(info).unwrap();
    }
    for record in data {
        writer.write_execution_data(record).unwrap();
    }
    fs::write(path, out).unwrap();
}

fn merge_files(dest: &Path, inputs: &[PathBuf]) {
    classcov::merge::merge_files(dest, inputs).unwrap();
}

/// Three session files where probe (classId=42, idx=7) is hit only in
/// the second input.
fn probe_union_inputs(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for (i, hit_idx) in [(1, None), (2, Some(7)), (3, None)] {
        let mut probes = vec![false; 8];
        if let Some(idx) = hit_idx {
            probes[idx] = true;
        }
        let path = dir.join(format!("part{i}.exec"));
        write_exec_file(
            &path,
            &[SessionInfo::new(format!("s{i}"), i * 100, i * 100 + 50)],
            &[ExecutionData::new(42, "com/ex/Answer", probes)],
        );
        files.push(path);
    }
    files
}

#[test]
fn merge_unions_probes_and_keeps_all_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = probe_union_inputs(dir.path());
    let dest = dir.path().join("merged.exec");
    merge_files(&dest, &inputs);

    let mut merged = ExecFileLoader::new();
    merged.load_file(&dest).unwrap();

    let data = merged.execution_data().get(42).unwrap();
    assert_eq!(data.name, "com/ex/Answer");
    assert!(data.probes[7], "probe hit in one input is hit in the merge");
    assert_eq!(data.probes.iter().filter(|p| **p).count(), 1);

    let ids: Vec<_> = merged.sessions().infos().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s1", "s2", "s3"], "all session records preserved");
}

#[test]
fn merge_is_order_independent() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = probe_union_inputs(dir.path());

    let forward = dir.path().join("forward.exec");
    merge_files(&forward, &inputs);

    let mut reversed_inputs = inputs.clone();
    reversed_inputs.reverse();
    let reversed = dir.path().join("reversed.exec");
    merge_files(&reversed, &reversed_inputs);

    assert_eq!(fs::read(&forward).unwrap(), fs::read(&reversed).unwrap());
}

#[test]
fn merge_is_associative() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = probe_union_inputs(dir.path());

    // merge(merge(1, 2), 3)
    let left_inner = dir.path().join("left_inner.exec");
    merge_files(&left_inner, &inputs[..2].to_vec());
    let left = dir.path().join("left.exec");
    merge_files(&left, &[left_inner, inputs[2].clone()]);

    // merge(1, merge(2, 3))
    let right_inner = dir.path().join("right_inner.exec");
    merge_files(&right_inner, &inputs[1..].to_vec());
    let right = dir.path().join("right.exec");
    merge_files(&right, &[inputs[0].clone(), right_inner]);

    // merge(1, 2, 3)
    let flat = dir.path().join("flat.exec");
    merge_files(&flat, &inputs);

    let flat_bytes = fs::read(&flat).unwrap();
    assert_eq!(fs::read(&left).unwrap(), flat_bytes);
    assert_eq!(fs::read(&right).unwrap(), flat_bytes);
}

#[test]
fn single_file_merge_is_canonicalization() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.exec");
    write_exec_file(
        &input,
        &[SessionInfo::new("only", 10, 20)],
        &[
            ExecutionData::new(2, "com/ex/B", vec![true, false]),
            ExecutionData::new(1, "com/ex/A", vec![false, true, true]),
        ],
    );

    let once = dir.path().join("once.exec");
    merge_files(&once, &[input]);

    // Canonical form is a fixpoint of merging.
    let twice = dir.path().join("twice.exec");
    merge_files(&twice, &[once.clone()]);
    assert_eq!(fs::read(&once).unwrap(), fs::read(&twice).unwrap());
}

#[test]
fn parse_error_aborts_the_merge() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.exec");
    write_exec_file(&good, &[], &[ExecutionData::new(1, "A", vec![true])]);
    let bad = dir.path().join("bad.exec");
    fs::write(&bad, b"definitely not an exec file").unwrap();

    let mut loader = ExecFileLoader::new();
    loader.load_file(&good).unwrap();
    assert!(loader.load_file(&bad).is_err());
}

#[test]
fn missing_input_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut loader = ExecFileLoader::new();
    assert!(loader.load_file(&dir.path().join("absent.exec")).is_err());
}

#[test]
fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nested/deeper/out.exec");
    ExecFileLoader::new().save_file(&dest).unwrap();
    assert!(dest.is_file());
    // Empty accumulator still writes a valid header-only stream.
    assert_eq!(fs::read(&dest).unwrap(), [0x01, 0xC0, 0xC0, 0x10, 0x06]);
}

#[test]
fn directories_among_inputs_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.exec");
    write_exec_file(&input, &[], &[ExecutionData::new(9, "Y", vec![true])]);
    let subdir = dir.path().join("not-a-file");
    fs::create_dir(&subdir).unwrap();

    let dest = dir.path().join("merged.exec");
    let merged = classcov::merge::merge_files(&dest, &[subdir, input]).unwrap();

    assert_eq!(merged, 1, "only the regular file counts");
    let mut loader = ExecFileLoader::new();
    loader.load_file(&dest).unwrap();
    assert!(loader.execution_data().get(9).unwrap().probes[0]);
}

#[test]
fn destination_directory_is_rejected_before_inputs_are_read() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage.exec");
    fs::write(&garbage, b"definitely not an exec file").unwrap();

    // The destination is an existing directory, so validation must fail
    // up front; the unreadable input is never touched.
    let err = classcov::merge::merge_files(dir.path(), &[garbage]).unwrap_err();
    assert!(matches!(err, MergeError::UnwritableDestination { .. }));
}

#[test]
fn readonly_destination_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("merged.exec");
    fs::write(&dest, b"").unwrap();
    let mut perms = fs::metadata(&dest).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(&dest, perms).unwrap();

    let err = classcov::merge::merge_files(&dest, &[]).unwrap_err();
    assert!(matches!(err, MergeError::UnwritableDestination { .. }));
}

#[test]
fn merging_same_file_twice_duplicates_sessions_not_probes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.exec");
    write_exec_file(
        &input,
        &[SessionInfo::new("s", 1, 2)],
        &[ExecutionData::new(5, "X", vec![true, false])],
    );

    let mut loader = ExecFileLoader::new();
    loader.load_file(&input).unwrap();
    loader.load_file(&input).unwrap();

    assert_eq!(loader.sessions().infos().len(), 2, "session records are not deduplicated");
    assert_eq!(loader.execution_data().get(5).unwrap().probes, vec![true, false]);
}
